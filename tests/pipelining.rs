//! End-to-end exercises of keep-alive pipelining, half-close detection, and header limits,
//! driven over real loopback TCP connections against a running [`Server`].

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use loomhttp::config::ServerConfig;
use loomhttp::handler::{HandleOutcome, RequestHandler};
use loomhttp::pipeline::PipelineLike;
use loomhttp::server::Server;

/// Records every header the server hands to it and replies `204 No Content`, keeping the
/// connection alive unless told otherwise.
struct RecordingHandler {
    seen: Mutex<Vec<Vec<u8>>>,
    ready: Condvar,
    keep_alive: bool,
}

impl RecordingHandler {
    fn new(keep_alive: bool) -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            ready: Condvar::new(),
            keep_alive,
        }
    }

    fn wait_for(&self, count: usize) -> Vec<Vec<u8>> {
        let guard = self.seen.lock().unwrap();
        let (guard, timed_out) = self
            .ready
            .wait_timeout_while(guard, Duration::from_secs(5), |seen| seen.len() < count)
            .unwrap();
        assert!(!timed_out.timed_out(), "timed out waiting for {count} requests");
        guard.clone()
    }
}

impl RequestHandler for RecordingHandler {
    fn handle(&self, pipeline: &dyn PipelineLike, header: &[u8]) -> HandleOutcome {
        self.seen.lock().unwrap().push(header.to_vec());
        self.ready.notify_all();

        if header.starts_with(b"__LOOMHTTP_HEADER_TOO_LONG__") {
            let mut output = pipeline.output().lock().unwrap();
            let _ = output.write_all(b"HTTP/1.1 414 URI Too Long\r\nContent-Length: 0\r\n\r\n");
            let _ = output.flush();
            return HandleOutcome::Close;
        }

        let mut output = pipeline.output().lock().unwrap();
        let _ = output.write_all(b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n");
        let _ = output.flush();
        drop(output);

        if self.keep_alive {
            HandleOutcome::KeepAlive
        } else {
            HandleOutcome::Close
        }
    }
}

fn start_server(config: ServerConfig, handler: Arc<RecordingHandler>) -> Server {
    Server::bind("127.0.0.1:0", config, handler).expect("failed to bind test server")
}

fn read_response(client: &mut TcpStream) -> Vec<u8> {
    client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut buf = [0u8; 512];
    let n = client.read(&mut buf).unwrap();
    buf[..n].to_vec()
}

/// S1: a single request over a fresh connection is delivered to the handler exactly once.
#[test]
fn single_request_is_delivered_whole() {
    let handler = Arc::new(RecordingHandler::new(true));
    let server = start_server(ServerConfig::default().with_workers(2), handler.clone());

    let mut client = TcpStream::connect(server.local_addr()).unwrap();
    client.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();

    let seen = handler.wait_for(1);
    assert_eq!(seen[0], b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(read_response(&mut client).starts_with(b"HTTP/1.1 204"));

    server.shutdown();
}

/// S2: two requests written back-to-back on one connection (pipelined) are each delivered to
/// the handler separately, in order, with no cross-contamination of bytes.
#[test]
fn pipelined_requests_are_delivered_separately_and_in_order() {
    let handler = Arc::new(RecordingHandler::new(true));
    let server = start_server(ServerConfig::default().with_workers(2), handler.clone());

    let mut client = TcpStream::connect(server.local_addr()).unwrap();
    let first = b"GET /first HTTP/1.1\r\nHost: x\r\n\r\n".to_vec();
    let second = b"GET /second HTTP/1.1\r\nHost: x\r\n\r\n".to_vec();
    let mut both = first.clone();
    both.extend_from_slice(&second);
    client.write_all(&both).unwrap();

    let seen = handler.wait_for(2);
    assert_eq!(seen[0], first);
    assert_eq!(seen[1], second);

    server.shutdown();
}

/// S3: a header terminator split across two writes, separated by a pause, is still found —
/// the scanner resumes scanning rather than starting over or giving up.
#[test]
fn a_terminator_split_across_a_pause_is_still_found() {
    let handler = Arc::new(RecordingHandler::new(true));
    let server = start_server(ServerConfig::default().with_workers(2), handler.clone());

    let mut client = TcpStream::connect(server.local_addr()).unwrap();
    client.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n").unwrap();
    std::thread::sleep(Duration::from_millis(200));
    client.write_all(b"\r\n").unwrap();

    let seen = handler.wait_for(1);
    assert_eq!(seen[0], b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");

    server.shutdown();
}

/// S4: a header that never completes within the configured limit gets the configurable
/// too-long marker instead of being silently dropped.
#[test]
fn oversize_header_triggers_the_too_long_marker() {
    let handler = Arc::new(RecordingHandler::new(false));
    let config = ServerConfig::default()
        .with_workers(2)
        .with_header_limit_bytes(64)
        .with_emit_header_too_long_response(true);
    let server = start_server(config, handler.clone());

    let mut client = TcpStream::connect(server.local_addr()).unwrap();
    client.write_all(&vec![b'x'; 128]).unwrap();

    let seen = handler.wait_for(1);
    assert!(seen[0].starts_with(b"__LOOMHTTP_HEADER_TOO_LONG__"));
    assert!(read_response(&mut client).starts_with(b"HTTP/1.1 414"));

    server.shutdown();
}

/// S5: closing the client socket without sending a terminator is observed as a dead pipeline,
/// not an indefinite wait.
#[test]
fn half_close_does_not_hang_the_worker() {
    let handler = Arc::new(RecordingHandler::new(true));
    let config = ServerConfig::default()
        .with_workers(1)
        .with_poll_schedule_ms(vec![0])
        .with_max_empty_phases(3);
    let server = start_server(config, handler.clone());

    {
        let client = TcpStream::connect(server.local_addr()).unwrap();
        drop(client);
    }

    // The single worker must recover and stay responsive to a second connection once the
    // half-closed pipeline is declared dead rather than occupying it forever.
    let mut second = TcpStream::connect(server.local_addr()).unwrap();
    second.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    let seen = handler.wait_for(1);
    assert_eq!(seen[0], b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");

    server.shutdown();
}

/// S6: a pool much smaller than the connection count still services every connection, thanks
/// to phased back-off freeing workers from idle pipelines.
#[test]
fn a_small_worker_pool_services_many_idle_connections() {
    let handler = Arc::new(RecordingHandler::new(true));
    let config = ServerConfig::default().with_workers(2);
    let server = start_server(config, handler.clone());

    let mut clients: Vec<TcpStream> = (0..20)
        .map(|_| TcpStream::connect(server.local_addr()).unwrap())
        .collect();

    // Let every connection sit idle for a while, exercising the wait-bucket back-off, before
    // anyone actually sends a request.
    std::thread::sleep(Duration::from_millis(100));

    for (i, client) in clients.iter_mut().enumerate() {
        let req = format!("GET /{i} HTTP/1.1\r\nHost: x\r\n\r\n");
        client.write_all(req.as_bytes()).unwrap();
    }

    let seen = handler.wait_for(20);
    assert_eq!(seen.len(), 20);

    server.shutdown();
}
