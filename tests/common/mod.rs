//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use bluegreen_proxy::config::{Persistence, SwitchConfig};
use bluegreen_proxy::http::HttpServer;
use bluegreen_proxy::lifecycle::Shutdown;
use bluegreen_proxy::DescriptorStore;

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "200 OK",
        404 => "404 Not Found",
        500 => "500 Internal Server Error",
        502 => "502 Bad Gateway",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    }
}

/// Start a programmable mock backend. The handler receives the request
/// line's path and returns status and body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let head = String::from_utf8_lossy(&buf[..n]);
                let path = head
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .unwrap_or("/")
                    .to_string();

                let (status, body) = f(path).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text(status),
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Handle to a mock environment whose health can be flipped at runtime.
#[derive(Clone)]
pub struct MockEnvironment {
    pub addr: SocketAddr,
    healthy: Arc<AtomicBool>,
}

impl MockEnvironment {
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

/// An environment answering `/health`, `/version` (`{"version": version}`)
/// and any other path with `"<name> <path>"`. Other paths wait `delay`
/// before answering.
pub async fn start_environment(
    name: &'static str,
    version: &'static str,
    healthy: bool,
    delay: Duration,
) -> MockEnvironment {
    let flag = Arc::new(AtomicBool::new(healthy));
    let state = flag.clone();

    let addr = start_programmable_backend(move |path| {
        let state = state.clone();
        async move {
            match path.as_str() {
                "/health" if state.load(Ordering::SeqCst) => (200, "ok".to_string()),
                "/health" => (503, "down".to_string()),
                "/version" => (200, format!(r#"{{"version":"{}"}}"#, version)),
                _ => {
                    tokio::time::sleep(delay).await;
                    (200, format!("{} {}", name, path))
                }
            }
        }
    })
    .await;

    MockEnvironment { addr, healthy: flag }
}

/// An address nothing listens on.
pub async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Configuration pointing at the given environments with a one second
/// probe interval.
pub fn test_config(blue: SocketAddr, green: SocketAddr) -> SwitchConfig {
    let mut config = SwitchConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.environments.blue = blue.to_string();
    config.environments.green = green.to_string();
    config.health_check.interval_secs = 1;
    config.health_check.health_timeout_ms = 300;
    config.health_check.version_timeout_ms = 300;
    config.proxy.upstream_timeout_secs = 2;
    config
}

/// A running switch.
pub struct TestSwitch {
    pub addr: SocketAddr,
    pub store: Arc<DescriptorStore>,
    pub shutdown: Shutdown,
    handle: tokio::task::JoinHandle<()>,
}

impl TestSwitch {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
    }
}

pub async fn start_switch(config: SwitchConfig, persistence: Persistence) -> TestSwitch {
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(config, persistence).unwrap();
    let store = server.store();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();

    let handle = tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });

    TestSwitch { addr, store, shutdown, handle }
}

/// Poll until `check` holds or two seconds pass.
pub async fn wait_until<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..40 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}
