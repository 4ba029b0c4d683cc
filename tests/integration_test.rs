//! Tests de integración del servidor de archivos
//! tests/integration_test.rs
//!
//! Cada test levanta el pipeline completo en modo threads sobre un puerto
//! efímero (Acceptor → cola compartida → Dispatcher → ThreadPool →
//! handler) con un document root temporal, y le habla por TCP.

use concurrent_http::config::{Config, RunMode};
use concurrent_http::server::Server;
use concurrent_http::stats::{SharedStats, StatsSnapshot};
use std::fs;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tempfile::TempDir;

const LARGE_FILE_BYTES: usize = 512 * 1024;

struct TestServer {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    stats: Arc<SharedStats>,
    handle: Option<JoinHandle<StatsSnapshot>>,
    dir: TempDir,
}

impl TestServer {
    fn start(workers: usize, threads_per_worker: usize) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("www");
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(root.join("index.html"), "<h1>Hola</h1>").unwrap();
        fs::write(root.join("docs/index.html"), "<h1>Docs</h1>").unwrap();
        fs::write(root.join("app.js"), "console.log('hi');").unwrap();
        let large: Vec<u8> = (0..LARGE_FILE_BYTES).map(|i| (i % 251) as u8).collect();
        fs::write(root.join("large.bin"), large).unwrap();
        fs::write(dir.path().join("secret.txt"), "top secret").unwrap();

        let server = Server::bind(Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            document_root: root,
            log_file: dir.path().join("access.log"),
            mode: RunMode::Threads,
            workers,
            threads_per_worker,
            queue_capacity: 64,
            timeout_seconds: 5,
            stats_interval_secs: 0,
            ..Config::default()
        })
        .expect("bind");

        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        let stats = server.stats();
        let handle = thread::spawn(move || server.run().expect("server run"));

        Self {
            addr,
            shutdown,
            stats,
            handle: Some(handle),
            dir,
        }
    }

    /// Envía `raw` y retorna la response completa
    fn send(&self, raw: &str) -> Vec<u8> {
        send_to(self.addr, raw)
    }

    fn get(&self, path: &str) -> String {
        let response = self.send(&format!("GET {} HTTP/1.0\r\n\r\n", path));
        String::from_utf8_lossy(&response).into_owned()
    }

    /// Detiene el servidor; el document root sigue vivo hasta el drop
    fn stop(&mut self) -> StatsSnapshot {
        self.shutdown.store(true, Ordering::SeqCst);
        self.handle.take().unwrap().join().unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn send_to(addr: SocketAddr, raw: &str) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    stream.write_all(raw.as_bytes()).unwrap();
    stream.flush().unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();
    response
}

/// Helper: separa el body de los headers
fn body(response: &[u8]) -> &[u8] {
    match response.windows(4).position(|w| w == b"\r\n\r\n") {
        Some(pos) => &response[pos + 4..],
        None => &[],
    }
}

#[test]
fn test_second_request_is_served_from_cache() {
    let server = TestServer::start(1, 2);

    let first = server.send("GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n");
    let second = server.send("GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n");

    assert!(first.starts_with(b"HTTP/1.1 200 OK\r\n"));
    assert_eq!(body(&first), b"<h1>Hola</h1>");
    assert_eq!(body(&first), body(&second));

    let snapshot = server.stats.snapshot().unwrap();
    assert_eq!(snapshot.disk_reads, 1);
    assert_eq!(snapshot.cache_hits, 1);
    assert_eq!(snapshot.cache_misses, 1);
    assert_eq!(snapshot.count(200), 2);
}

#[test]
fn test_error_statuses() {
    let mut server = TestServer::start(1, 2);

    let response = server.get("/../secret.txt");
    assert!(response.starts_with("HTTP/1.1 403 Forbidden\r\n"), "got: {}", response);
    assert!(!response.contains("top secret"));

    // Traversal codificado con escapes `%`
    let response = server.get("/docs/%2e%2e/%2e%2e/secret.txt");
    assert!(response.starts_with("HTTP/1.1 403 Forbidden\r\n"), "got: {}", response);

    let response = server.get("/missing.html");
    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));

    let response = String::from_utf8(server.send("POST /index.html HTTP/1.1\r\n\r\n")).unwrap();
    assert!(response.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));
    assert!(response.contains("Allow: GET, HEAD\r\n"));

    let response = String::from_utf8(server.send("NOT-HTTP\r\n\r\n")).unwrap();
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));

    let snapshot = server.stop();
    assert_eq!(snapshot.count(403), 2);
    assert_eq!(snapshot.count(404), 1);
    assert_eq!(snapshot.count(405), 1);
    assert_eq!(snapshot.count(400), 1);
    assert_eq!(snapshot.active_connections, 0);
}

#[test]
fn test_head_and_directory_index() {
    let server = TestServer::start(2, 2);

    let response = String::from_utf8(server.send("HEAD /app.js HTTP/1.1\r\n\r\n")).unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Type: application/javascript\r\n"));
    assert!(response.contains("Content-Length: 18\r\n"));
    assert!(response.ends_with("\r\n\r\n"));

    let response = server.get("/docs/");
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.ends_with("<h1>Docs</h1>"));

    let response = server.get("/");
    assert!(response.ends_with("<h1>Hola</h1>"));
}

#[test]
fn test_concurrent_misses_read_disk_once() {
    let server = TestServer::start(1, 8);
    let clients = 16;
    let barrier = Arc::new(Barrier::new(clients));

    let handles: Vec<_> = (0..clients)
        .map(|_| {
            let addr = server.addr;
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                send_to(addr, "GET /large.bin HTTP/1.1\r\n\r\n")
            })
        })
        .collect();

    let expected: Vec<u8> = (0..LARGE_FILE_BYTES).map(|i| (i % 251) as u8).collect();
    for handle in handles {
        let response = handle.join().unwrap();
        assert!(response.starts_with(b"HTTP/1.1 200 OK\r\n"));
        assert_eq!(body(&response), expected.as_slice());
    }

    let snapshot = server.stats.snapshot().unwrap();
    assert_eq!(snapshot.disk_reads, 1);
    assert_eq!(snapshot.count(200), clients as u64);
    assert_eq!(snapshot.cache_hits + snapshot.cache_misses, clients as u64);
}

#[test]
fn test_access_log_has_one_line_per_request() {
    let mut server = TestServer::start(2, 2);
    for _ in 0..5 {
        server.get("/index.html");
    }
    server.get("/missing.html");

    let log_path = server.dir.path().join("access.log");
    let snapshot = server.stop();
    assert_eq!(snapshot.total_requests, 6);

    let log = fs::read_to_string(log_path).unwrap();
    let lines: Vec<_> = log.lines().collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines.iter().filter(|l| l.contains("\"GET /index.html HTTP/1.0\" 200 13")).count(), 5);
    assert!(lines.iter().any(|l| l.contains("\"GET /missing.html HTTP/1.0\" 404")));
    assert!(lines.iter().all(|l| l.starts_with("127.0.0.1 - - [")));
}
