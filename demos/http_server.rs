use mill_mux::{net::http::HttpProtocolHandler, EventLoop, ServerConfig};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = ServerConfig::from_env()?;
    let mut event_loop = EventLoop::new(config, HttpProtocolHandler::new())?;
    let addr = format!("http://{}", event_loop.local_addr());

    println!("HTTP Server starting on {addr}");
    println!("Available routes:");
    println!("  GET {addr}/        - Home page");
    println!("  GET {addr}/time    - Current server time");
    println!("  GET {addr}/clients - Connection counts");
    println!("  GET {addr}/uptime  - Your connection uptime");
    println!("  GET {addr}/health  - Health check");

    event_loop.run()?;

    Ok(())
}
