//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use prompt_gateway::config::GatewayConfig;
use prompt_gateway::http::HttpServer;
use prompt_gateway::lifecycle::orchestrator::{LifecycleError, Orchestrator};
use prompt_gateway::lifecycle::pid::PidGuard;
use prompt_gateway::lifecycle::{ExitMode, LifecycleState, ProcessContext, ShutdownHandle};
use prompt_gateway::observability::logging;

/// Requests seen by a mock upstream, raw head plus body.
pub type Captured = Arc<Mutex<Vec<String>>>;

/// Reserve a free local port.
pub fn free_port() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Start a mock upstream answering every request with `status` and `body`.
/// The full request is read before answering so clients never see a reset.
pub async fn start_mock_upstream(status: u16, body: &'static str) -> (SocketAddr, Captured) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&captured);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let seen = Arc::clone(&seen);
            tokio::spawn(async move {
                let request = read_request(&mut socket).await;
                seen.lock().unwrap().push(request);

                let status_text = match status {
                    200 => "200 OK",
                    500 => "500 Internal Server Error",
                    _ => "502 Bad Gateway",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, captured)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Config rooted in a temp dir: pid file and logs live there, the listener
/// takes a free port, the drain is short.
pub fn test_config(root: &std::path::Path, upstream: SocketAddr) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = free_port().to_string();
    config.upstream.endpoint = format!("http://{upstream}/v1/chat/completions");
    config.upstream.api_key_env = "PROMPT_GATEWAY_IT_KEY".to_string();
    config.lifecycle.pid_file = root.join("gateway.pid").display().to_string();
    config.lifecycle.shutdown_wait_ms = 400;
    config.lifecycle.stop_timeout_ms = 2_000;
    config.logger.log_path = root.join("logs").display().to_string();
    config.logger.log_level = 1;
    config
}

pub fn pid_path(config: &GatewayConfig) -> PathBuf {
    PathBuf::from(&config.lifecycle.pid_file)
}

pub async fn wait_for_state(ctx: &ProcessContext, state: LifecycleState) {
    let mut rx = ctx.subscribe_state();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
        .await
        .expect("state not reached in time")
        .expect("state channel closed");
}

/// A gateway running in-process.
pub struct Running {
    pub ctx: Arc<ProcessContext>,
    pub handle: ShutdownHandle,
    pub run: tokio::task::JoinHandle<Result<ExitMode, LifecycleError>>,
    pub base: String,
}

/// Same wiring as `launch`, keeping the shutdown handle for the test.
pub async fn start(config: &GatewayConfig) -> Running {
    let pid = PidGuard::acquire(&config.lifecycle.pid_file).unwrap();
    let ctx = Arc::new(ProcessContext::default());
    logging::init(&config.logger, &config.observability, false, &ctx).unwrap();
    let server = HttpServer::new(config, Arc::clone(&ctx)).unwrap();

    let orchestrator = Orchestrator::new(config.lifecycle.clone(), Arc::clone(&ctx), pid);
    let handle = orchestrator.shutdown_handle();
    let run = tokio::spawn(orchestrator.run(move |lc| server.serve(lc)));
    wait_for_state(&ctx, LifecycleState::Running).await;

    Running {
        ctx,
        handle,
        run,
        base: format!("http://{}", config.listener.bind_address),
    }
}
