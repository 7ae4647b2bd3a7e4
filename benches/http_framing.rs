use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mill_mux::{
    net::http::{HttpProtocolHandler, HttpState},
    Connection, ConnectionStats, Outcome, ProtocolHandler, ServerContext,
};
use std::sync::Arc;

const REQUEST: &[u8] = b"GET /health HTTP/1.1\r\n\
Host: localhost:8080\r\n\
User-Agent: bench\r\n\
Accept: text/html\r\n\
Connection: keep-alive\r\n\r\n";

fn feed_in_chunks(
    handler: &HttpProtocolHandler,
    ctx: &ServerContext,
    stats: &ConnectionStats,
    chunk_size: usize,
) -> usize {
    let mut conn: Connection<HttpState> =
        Connection::new(stats.next_id(), "127.0.0.1:9999".parse().unwrap());
    for chunk in REQUEST.chunks(chunk_size) {
        conn.inbound.extend_from_slice(chunk);
        if let Outcome::ResponseReady(bytes) = handler.on_data(ctx, &mut conn, chunk) {
            return bytes.len();
        }
    }
    0
}

fn bench_http_framing(c: &mut Criterion) {
    let handler = HttpProtocolHandler::new();
    let stats = Arc::new(ConnectionStats::new());
    let ctx = ServerContext::new(stats.clone());
    let mut group = c.benchmark_group("http_framing");
    group.throughput(Throughput::Bytes(REQUEST.len() as u64));

    for chunk_size in [1, 16, REQUEST.len()] {
        group.bench_with_input(
            BenchmarkId::new("chunk_size", chunk_size),
            &chunk_size,
            |b, &size| b.iter(|| black_box(feed_in_chunks(&handler, &ctx, &stats, size))),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_http_framing);
criterion_main!(benches);
