//! A minimal server built on the pipeline core: replies `204 No Content` to every request and
//! keeps the connection open for the next pipelined one.
//!
//! Run with `cargo run --example demo_server`, then `curl -v http://127.0.0.1:7878/`.

use std::io::Write;
use std::sync::Arc;

use loomhttp::config::ServerConfig;
use loomhttp::handler::{HandleOutcome, RequestHandler};
use loomhttp::pipeline::PipelineLike;
use loomhttp::server::Server;

struct NoContent;

impl RequestHandler for NoContent {
    fn handle(&self, pipeline: &dyn PipelineLike, header: &[u8]) -> HandleOutcome {
        let request_line = header.split(|&b| b == b'\n').next().unwrap_or(header);
        log::info!(
            "{}: {}",
            pipeline.peer_address(),
            String::from_utf8_lossy(request_line).trim()
        );

        let mut output = match pipeline.output().lock() {
            Ok(output) => output,
            Err(_) => return HandleOutcome::FatalError,
        };

        let wrote = output
            .write_all(b"HTTP/1.1 204 No Content\r\nConnection: keep-alive\r\nContent-Length: 0\r\n\r\n")
            .and_then(|_| output.flush());

        match wrote {
            Ok(()) => HandleOutcome::KeepAlive,
            Err(_) => HandleOutcome::Close,
        }
    }
}

fn main() {
    env_logger::init();

    let config = ServerConfig::default().with_workers(8);
    let server = Server::bind("127.0.0.1:7878", config, Arc::new(NoContent))
        .expect("failed to bind 127.0.0.1:7878");

    log::info!("demo server listening on {}", server.local_addr());
    loop {
        std::thread::park();
    }
}
