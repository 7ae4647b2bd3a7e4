use std::{
    io::{BufRead, BufReader, Write},
    net::TcpStream,
    time::Duration,
};

use mill_mux::{net::line::LineProtocolHandler, EventLoop, ServerConfig};
use tracing_subscriber::EnvFilter;

/// Starts the command server on a background thread, drives one scripted client
/// session against it, then shuts the server down.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_target(false)
        .init();

    let config = ServerConfig::builder()
        .address("127.0.0.1:0".parse()?)
        .idle_timeout(Duration::from_secs(30))
        .build();
    let server = EventLoop::new(config, LineProtocolHandler::new())?.start()?;
    println!("Command server listening on {}", server.local_addr());

    let stream = TcpStream::connect(server.local_addr())?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);

    let mut line = String::new();
    reader.read_line(&mut line)?;
    print!("< {line}");

    for command in ["demo-client", "help", "time", "uptime", "clients", "hello there", "quit"] {
        println!("> {command}");
        writer.write_all(format!("{command}\n").as_bytes())?;
        line.clear();
        reader.read_line(&mut line)?;
        print!("< {line}");
    }

    println!(
        "active={} total={}",
        server.active_connection_count(),
        server.total_connection_count()
    );
    server.stop();
    server.join()?;

    Ok(())
}
