//! Echo server - the reference host.
//!
//! This demo shows:
//! - Loading bind settings from `SENTINEL_RPC_*` environment variables
//! - Registering an async method and a blocking method
//! - Serving connections until the process is killed
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=debug cargo run --example echo_server
//! ```

use sentinel_rpc::config::ServerConfig;
use sentinel_rpc::handler::HandlerError;
use sentinel_rpc::logging::init_logging;
use sentinel_rpc::ServerBuilder;
use serde_json::Value;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let config = ServerConfig::from_env()?;

    let server = ServerBuilder::from_config(&config)
        // Return the params unchanged
        .method("echo", |params: Value| async move { Ok::<_, HandlerError>(params) })
        // CPU-bound work goes to the blocking pool
        .blocking_method("sum", |numbers: Vec<i64>| {
            Ok::<_, HandlerError>(numbers.iter().sum::<i64>())
        })
        .bind(config.bind_socket()?)
        .await?;

    tracing::info!(addr = %server.local_addr()?, "Echo server ready");
    server.serve().await?;

    Ok(())
}
