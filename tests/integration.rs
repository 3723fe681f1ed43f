//! Integration tests for sentinel-rpc.
//!
//! These tests run a real server on a loopback port and talk to it both
//! through raw sockets and through `RpcClient`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use sentinel_rpc::codec::JsonCodec;
use sentinel_rpc::dispatch::error_codes;
use sentinel_rpc::handler::HandlerError;
use sentinel_rpc::protocol::{build_frame, FrameBuffer};
use sentinel_rpc::{RpcClient, RpcError, Server};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Start a server with the test methods and return its address.
async fn start_server(ticks: Arc<AtomicUsize>) -> SocketAddr {
    let server = Server::builder()
        .method("echo", |params: Value| async move {
            Ok::<_, HandlerError>(params)
        })
        .method("tick", move |_: Value| {
            let ticks = Arc::clone(&ticks);
            async move {
                Ok::<_, HandlerError>(ticks.fetch_add(1, Ordering::SeqCst) + 1)
            }
        })
        .blocking_method("slow", |ms: u64| {
            std::thread::sleep(Duration::from_millis(ms));
            Ok::<_, HandlerError>(ms)
        })
        .blocking_method("divide", |(a, b): (i64, i64)| {
            if b == 0 {
                return Err(HandlerError::internal("division by zero"));
            }
            Ok(a / b)
        })
        .bind("127.0.0.1:0")
        .await
        .unwrap();

    let addr = server.local_addr().unwrap();
    tokio::spawn(server.serve());
    addr
}

/// Read frames from a raw socket until one is complete.
async fn read_frame(stream: &mut TcpStream, frames: &mut FrameBuffer) -> Vec<u8> {
    let mut buf = [0u8; 1024];
    loop {
        let n = timeout(TEST_TIMEOUT, stream.read(&mut buf))
            .await
            .expect("Test timed out")
            .expect("Read failed");
        assert!(n > 0, "server closed the connection");
        if let Some(frame) = frames.feed(&buf[..n]).next() {
            return frame.to_vec();
        }
    }
}

/// End-to-end echo with the exact wire bytes.
#[tokio::test]
async fn test_echo_wire_bytes() {
    let addr = start_server(Arc::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut frames = FrameBuffer::new();

    stream
        .write_all(&build_frame(
            br#"{"jsonrpc":"2.0","method":"echo","params":"hi","id":"1"}"#,
        ))
        .await
        .unwrap();

    let reply = read_frame(&mut stream, &mut frames).await;
    assert_eq!(
        String::from_utf8(reply).unwrap(),
        r#"{"jsonrpc":"2.0","result":"hi","id":"1"}"#
    );
}

/// One connection serves many requests in sequence.
#[tokio::test]
async fn test_persistent_connection() {
    let addr = start_server(Arc::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut frames = FrameBuffer::new();

    for i in 0..5 {
        let request = json!({"jsonrpc": "2.0", "method": "echo", "params": [i], "id": i});
        stream
            .write_all(&build_frame(&JsonCodec::encode(&request).unwrap()))
            .await
            .unwrap();

        let response: Value = JsonCodec::decode(&read_frame(&mut stream, &mut frames).await).unwrap();
        assert_eq!(response["result"], json!([i]));
        assert_eq!(response["id"], json!(i));
    }
}

/// Batch over the wire: notifications are skipped, order is kept.
#[tokio::test]
async fn test_batch_over_wire() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let addr = start_server(Arc::clone(&ticks)).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut frames = FrameBuffer::new();

    let batch = json!([
        {"jsonrpc": "2.0", "method": "slow", "params": 50, "id": "a"},
        {"jsonrpc": "2.0", "method": "tick"},
        {"jsonrpc": "2.0", "method": "divide", "params": [9, 3], "id": "c"},
        {"jsonrpc": "2.0", "method": "divide", "params": [1, 0], "id": "d"}
    ]);
    stream
        .write_all(&build_frame(&JsonCodec::encode(&batch).unwrap()))
        .await
        .unwrap();

    let response: Value = JsonCodec::decode(&read_frame(&mut stream, &mut frames).await).unwrap();
    let entries = response.as_array().unwrap();

    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0], json!({"jsonrpc": "2.0", "result": 50, "id": "a"}));
    assert_eq!(entries[1]["result"], json!(3));
    assert_eq!(entries[2]["error"]["code"], json!(error_codes::INTERNAL_ERROR));
    assert_eq!(entries[2]["id"], json!("d"));
    assert_eq!(ticks.load(Ordering::SeqCst), 1);
}

/// The client returns the raw response envelope.
#[tokio::test]
async fn test_client_send_request() {
    let addr = start_server(Arc::default()).await;
    let mut client = RpcClient::new(addr.to_string());

    let response = client.send_request("echo", "hello world").await.unwrap();

    assert_eq!(response["jsonrpc"], json!("2.0"));
    assert_eq!(response["result"], json!("hello world"));
    assert!(response["id"].is_string());
}

/// One client instance can be reused; each request gets a fresh connection.
#[tokio::test]
async fn test_client_reuse() {
    let addr = start_server(Arc::default()).await;
    let mut client = RpcClient::new(addr.to_string());

    let a: i64 = client.call("divide", (10, 2)).await.unwrap();
    let b: Vec<String> = client.call("echo", vec!["x", "y"]).await.unwrap();

    assert_eq!(a, 5);
    assert_eq!(b, vec!["x", "y"]);
}

#[tokio::test]
async fn test_client_error_mapping() {
    let addr = start_server(Arc::default()).await;
    let mut client = RpcClient::new(addr.to_string());

    let missing: Result<Value, _> = client.call("nope", ()).await;
    assert!(matches!(
        missing,
        Err(RpcError::Server { code: error_codes::METHOD_NOT_FOUND, .. })
    ));

    let bad_params: Result<i64, _> = client.call("divide", "ten").await;
    assert!(matches!(
        bad_params,
        Err(RpcError::Server { code: error_codes::INVALID_PARAMS, .. })
    ));

    let failed: Result<i64, _> = client.call("divide", (1, 0)).await;
    match failed {
        Err(RpcError::Server { code, data, .. }) => {
            assert_eq!(code, error_codes::INTERNAL_ERROR);
            assert_eq!(data, Some(json!("division by zero")));
        }
        other => panic!("expected internal error, got {:?}", other),
    }
}

/// Notifications run on the server but nothing comes back.
#[tokio::test]
async fn test_client_notify() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let addr = start_server(Arc::clone(&ticks)).await;
    let mut client = RpcClient::new(addr.to_string());

    client.notify("tick", ()).await.unwrap();

    timeout(TEST_TIMEOUT, async {
        while ticks.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("notification never ran");
}

/// A long blocking handler does not stall other connections.
#[tokio::test]
async fn test_blocking_handler_does_not_stall_others() {
    let addr = start_server(Arc::default()).await;

    let slow = tokio::spawn(async move {
        let mut client = RpcClient::new(addr.to_string());
        client.call::<_, u64>("slow", 1000).await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut client = RpcClient::new(addr.to_string());
    let echoed: String = timeout(Duration::from_millis(800), client.call("echo", "fast"))
        .await
        .expect("echo was held up by the blocking handler")
        .unwrap();

    assert_eq!(echoed, "fast");
    assert!(!slow.is_finished());
    assert_eq!(slow.await.unwrap().unwrap(), 1000);
}

/// Many clients at once, each on its own connection.
#[tokio::test]
async fn test_concurrent_clients() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let addr = start_server(Arc::clone(&ticks)).await;

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            tokio::spawn(async move {
                let mut client = RpcClient::new(addr.to_string());
                let echoed: i64 = client.call("echo", i).await.unwrap();
                assert_eq!(echoed, i);
                let _: usize = client.call("tick", ()).await.unwrap();
            })
        })
        .collect();

    for task in tasks {
        timeout(TEST_TIMEOUT, task).await.expect("Test timed out").unwrap();
    }
    assert_eq!(ticks.load(Ordering::SeqCst), 20);
}

/// A client that disappears mid-frame does not take the server down.
#[tokio::test]
async fn test_abrupt_disconnect() {
    let addr = start_server(Arc::default()).await;

    {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&[0xA5, b'{', b'"', b'j']).await.unwrap();
    }

    let mut client = RpcClient::new(addr.to_string());
    let echoed: String = client.call("echo", "still here").await.unwrap();
    assert_eq!(echoed, "still here");
}

/// A `0xA5` byte inside the JSON text cuts the request short.
#[tokio::test]
async fn test_unescaped_start_sentinel_corrupts_request() {
    let addr = start_server(Arc::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut frames = FrameBuffer::new();

    // "¥" is C2 A5 in UTF-8; the server restarts the frame at the A5.
    stream
        .write_all(&build_frame(
            "{\"jsonrpc\":\"2.0\",\"method\":\"echo\",\"params\":\"\u{a5}\",\"id\":1}".as_bytes(),
        ))
        .await
        .unwrap();

    let response: Value = JsonCodec::decode(&read_frame(&mut stream, &mut frames).await).unwrap();
    assert_eq!(response["error"]["code"], json!(error_codes::PARSE_ERROR));
    assert_eq!(response["id"], Value::Null);
}
