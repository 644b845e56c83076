use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use micro_engine::{handler_fn, BoxHandler, Config, Engine, EngineError, EngineState, Request, Response};
use micro_http::server::HttpEngine;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing_subscriber::fmt::MakeWriter;

fn hello() -> BoxHandler {
    Arc::new(handler_fn(|req: &mut dyn Request, res: &mut dyn Response| {
        Box::pin(async move {
            let body = format!("hello {} from {}", req.url().path(), req.is_tls());
            res.header_mut().set("content-type", "text/plain");
            res.write_all(body.as_bytes()).unwrap();
        })
    }))
}

fn listening_config(max_conns_per_ip: usize) -> (Config, SocketAddr) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    let config = Config::builder().listener(listener).max_conns_per_ip(max_conns_per_ip).build().unwrap();
    (config, address)
}

async fn get(address: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(address).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    String::from_utf8(buf).unwrap()
}

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test]
async fn serve_and_shutdown() {
    let (config, address) = listening_config(0);
    let mut engine = HttpEngine::new(config);
    engine.set_handler(hello()).unwrap();
    let shutdown = engine.shutdown_handle();

    let server = tokio::spawn(async move {
        let result = engine.start().await;
        (result, engine.state())
    });

    let response = get(address, "/world").await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("content-type: text/plain\r\n"));
    assert!(response.ends_with("hello /world from false"));

    shutdown.shutdown();
    let (result, state) = server.await.unwrap();
    assert!(result.is_ok());
    assert_eq!(state, EngineState::Stopped);
}

#[tokio::test]
async fn shutdown_closes_idle_keep_alive_connection() {
    let (config, address) = listening_config(0);
    let mut engine = HttpEngine::new(config);
    engine.set_handler(hello()).unwrap();
    let shutdown = engine.shutdown_handle();
    let server = tokio::spawn(async move { engine.start().await });

    let mut stream = TcpStream::connect(address).await.unwrap();
    stream.write_all(b"GET /idle HTTP/1.1\r\nHost: localhost\r\n\r\n").await.unwrap();
    let mut buf = [0u8; 1024];
    let n = stream.read(&mut buf).await.unwrap();
    assert!(String::from_utf8_lossy(&buf[..n]).starts_with("HTTP/1.1 200 OK\r\n"));

    shutdown.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
    assert!(result.is_ok());

    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.unwrap();
}

#[tokio::test]
async fn reject_over_connection_limit() {
    let (config, address) = listening_config(1);
    let mut engine = HttpEngine::new(config);
    engine.set_handler(hello()).unwrap();
    let shutdown = engine.shutdown_handle();
    let server = tokio::spawn(async move { engine.start().await });

    let mut held = TcpStream::connect(address).await.unwrap();
    held.write_all(b"GET /held HTTP/1.1\r\nHost: localhost\r\n\r\n").await.unwrap();
    let mut buf = [0u8; 1024];
    let n = held.read(&mut buf).await.unwrap();
    assert!(String::from_utf8_lossy(&buf[..n]).starts_with("HTTP/1.1 200 OK\r\n"));

    let response = get(address, "/second").await;
    assert!(response.starts_with("HTTP/1.1 429 Too Many Requests\r\n"));

    shutdown.shutdown();
    assert!(server.await.unwrap().is_ok());
}

#[tokio::test]
async fn logs_through_bound_logger() {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::fmt().with_writer(captured.clone()).with_ansi(false).finish();

    let (config, address) = listening_config(0);
    let mut engine = HttpEngine::new(config);
    engine.set_handler(hello()).unwrap();
    engine.set_logger(tracing::Dispatch::new(subscriber)).unwrap();
    let shutdown = engine.shutdown_handle();
    let server = tokio::spawn(async move { engine.start().await });

    get(address, "/").await;
    shutdown.shutdown();
    server.await.unwrap().unwrap();

    let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
    assert!(output.contains("start listening"));
    assert!(output.contains("engine stopped"));
}

#[tokio::test]
async fn configure_after_start_fails() {
    let (config, _) = listening_config(0);
    let mut engine = HttpEngine::new(config);
    engine.set_handler(hello()).unwrap();
    engine.shutdown_handle().shutdown();
    engine.start().await.unwrap();

    let logger = tracing::Dispatch::new(tracing_subscriber::fmt().finish());
    assert!(matches!(
        engine.set_logger(logger),
        Err(EngineError::InvalidState { operation: "set logger", state: EngineState::Stopped })
    ));
    assert!(matches!(engine.start().await, Err(EngineError::InvalidState { operation: "start", .. })));
}
