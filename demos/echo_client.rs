//! Echo client - sends one request and prints the reply.
//!
//! # Running
//!
//! ```sh
//! cargo run --example echo_client -- 127.0.0.1:8888
//! ```

use sentinel_rpc::RpcClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8888".to_string());

    let mut client = RpcClient::new(addr);
    let response = client.send_request("echo", "hello world").await?;
    println!("{}", response);

    let total: i64 = client.call("sum", vec![1, 2, 3, 4]).await?;
    println!("sum = {}", total);

    Ok(())
}
