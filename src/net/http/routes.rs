//! The fixed route table served by [`HttpProtocolHandler`](super::HttpProtocolHandler).

use std::time::Duration;

use chrono::Local;

use super::response::{HttpResponse, StatusCode};
use crate::{connection::ConnectionId, handler::ServerContext};

/// What a route may know about the requesting connection.
#[derive(Debug, Clone, Copy)]
pub struct Requester {
    pub conn_id: ConnectionId,
    pub uptime: Duration,
}

/// Routes `path` by exact match.
pub fn route(path: &str, requester: Requester, ctx: &ServerContext) -> HttpResponse {
    match path {
        "/" => HttpResponse::html(StatusCode::Ok, home_page(requester)),
        "/time" => HttpResponse::html(StatusCode::Ok, time_page()),
        "/clients" => HttpResponse::html(StatusCode::Ok, clients_page(ctx)),
        "/uptime" => HttpResponse::html(StatusCode::Ok, uptime_page(requester)),
        "/health" => HttpResponse::html(StatusCode::Ok, health_page(ctx)),
        _ => HttpResponse::html(StatusCode::NotFound, not_found_page(path)),
    }
}

pub fn bad_request(reason: &str) -> HttpResponse {
    HttpResponse::html(
        StatusCode::BadRequest,
        page(
            "400 Bad Request",
            &format!(
                "<h1>400 - Bad Request</h1>\n<p>{}</p>\n",
                escape_html(reason)
            ),
        ),
    )
}

pub fn headers_too_large(limit: usize) -> HttpResponse {
    HttpResponse::html(
        StatusCode::RequestHeaderFieldsTooLarge,
        page(
            "431 Request Header Fields Too Large",
            &format!(
                "<h1>431 - Request Header Fields Too Large</h1>\n<p>Request headers exceed {limit} bytes.</p>\n"
            ),
        ),
    )
}

fn page(title: &str, content: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><title>{title}</title></head>\n<body>\n{content}</body></html>"
    )
}

fn back_link() -> &'static str {
    "<a href=\"/\">Back to home</a>\n"
}

fn home_page(requester: Requester) -> String {
    page(
        "mill-mux HTTP Server",
        &format!(
            "<h1>Welcome to mill-mux HTTP Server</h1>\n\
             <p>You are client ID: {}</p>\n\
             <p>Available endpoints:</p>\n\
             <ul>\n\
             <li><a href=\"/time\">/time</a> - Current server time</li>\n\
             <li><a href=\"/clients\">/clients</a> - Connected clients count</li>\n\
             <li><a href=\"/uptime\">/uptime</a> - Your connection uptime</li>\n\
             <li><a href=\"/health\">/health</a> - Server health status</li>\n\
             </ul>\n",
            requester.conn_id
        ),
    )
}

fn time_page() -> String {
    let now = Local::now();
    page(
        "Server Time",
        &format!(
            "<h1>Current Server Time</h1>\n\
             <p>Server time: {}</p>\n\
             <p>Timestamp: {}</p>\n{}",
            now.format("%Y-%m-%dT%H:%M:%S%.3f"),
            now.timestamp_millis(),
            back_link()
        ),
    )
}

fn clients_page(ctx: &ServerContext) -> String {
    page(
        "Connected Clients",
        &format!(
            "<h1>Connected Clients</h1>\n\
             <p>Active connections: {}</p>\n\
             <p>Total connections: {}</p>\n{}",
            ctx.active_connections(),
            ctx.total_connections(),
            back_link()
        ),
    )
}

fn uptime_page(requester: Requester) -> String {
    let millis = requester.uptime.as_millis();
    page(
        "Connection Uptime",
        &format!(
            "<h1>Your Connection Uptime</h1>\n\
             <p>Connected for: {millis} milliseconds</p>\n\
             <p>That's {} seconds</p>\n{}",
            millis / 1000,
            back_link()
        ),
    )
}

fn health_page(ctx: &ServerContext) -> String {
    let processors = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    page(
        "Server Health",
        &format!(
            "<h1>Server Health Status</h1>\n\
             <p>Status: <span style=\"color: green;\">Healthy</span></p>\n\
             <p>Active connections: {}</p>\n\
             <p>Available processors: {processors}</p>\n{}",
            ctx.active_connections(),
            back_link()
        ),
    )
}

fn not_found_page(path: &str) -> String {
    page(
        "404 Not Found",
        &format!(
            "<h1>404 - Page Not Found</h1>\n\
             <p>The requested path '{}' was not found on this server.</p>\n{}",
            escape_html(path),
            back_link()
        ),
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
