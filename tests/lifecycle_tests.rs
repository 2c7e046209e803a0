mod common;

use common::*;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use warden::rpc::proto;
use warden::rpc::proto::account_service_client::AccountServiceClient;
use warden::server::*;

fn local_config() -> LifecycleConfig {
    LifecycleConfig {
        rpc_address: "127.0.0.1:0".parse().unwrap(),
        http_address: "127.0.0.1:0".parse().unwrap(),
        http_shutdown_deadline: Duration::from_secs(5),
        tls: TlsMode::Off,
        rpc_reflection: true,
        rpc_request_timeout: Duration::from_secs(5),
    }
}

async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

async fn http_post_json(addr: SocketAddr, path: &str, body: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "POST {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn serves_both_transports_and_shuts_down_cleanly() {
    let (_repo, server) = fake_server();
    let orchestrator = Orchestrator::new(local_config(), server);
    let state = orchestrator.subscribe();
    assert_eq!(*state.borrow(), LifecycleState::Idle);

    let running = orchestrator.start().await.unwrap();
    assert_eq!(*state.borrow(), LifecycleState::Running);
    let rpc_addr = running.rpc_addr();
    let http_addr = running.http_addr();
    assert_ne!(rpc_addr.port(), 0);
    assert_ne!(http_addr.port(), 0);

    let (stop, stopped) = oneshot::channel::<()>();
    let run = tokio::spawn(running.run_until(async move {
        let _ = stopped.await;
    }));

    let mut client = AccountServiceClient::connect(format!("http://{rpc_addr}"))
        .await
        .unwrap();
    let created = client
        .create_account(proto::CreateAccountRequest {
            username: "alice".to_string(),
            password: "Secr3t!".to_string(),
            email: "a@x.com".to_string(),
        })
        .await
        .unwrap()
        .into_inner()
        .account
        .unwrap();
    assert_eq!(created.id, 1);

    let health = http_get(http_addr, "/health").await;
    assert!(health.starts_with("HTTP/1.1 200"), "{health}");

    // The gateway reaches the account created over gRPC.
    let login = http_post_json(
        http_addr,
        "/v1/login",
        r#"{"username":"alice","password":"Secr3t!"}"#,
    )
    .await;
    assert!(login.starts_with("HTTP/1.1 200"), "{login}");
    assert!(login.contains(r#""username":"alice""#));

    drop(client);
    stop.send(()).unwrap();
    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome, ShutdownOutcome::Clean);
    assert_eq!(outcome.exit_status(), 0);
    assert_eq!(*state.borrow(), LifecycleState::Stopped);

    assert!(TcpStream::connect(http_addr).await.is_err());
}

#[tokio::test]
async fn rpc_port_in_use_is_a_startup_error() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = local_config();
    config.rpc_address = taken.local_addr().unwrap();

    let (_repo, server) = fake_server();
    let orchestrator = Orchestrator::new(config, server);
    let state = orchestrator.subscribe();

    match orchestrator.start().await {
        Err(LifecycleError::RpcBind { address, .. }) => {
            assert_eq!(address, taken.local_addr().unwrap())
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("bind should have failed"),
    }
    assert_eq!(*state.borrow(), LifecycleState::Stopped);
}

#[tokio::test]
async fn http_port_in_use_is_a_startup_error() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = local_config();
    config.http_address = taken.local_addr().unwrap();

    let (_repo, server) = fake_server();
    let orchestrator = Orchestrator::new(config, server);

    match orchestrator.start().await {
        Err(LifecycleError::HttpBind { address, .. }) => {
            assert_eq!(address, taken.local_addr().unwrap())
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("bind should have failed"),
    }
}

#[tokio::test]
async fn health_answers_while_store_is_down() {
    let (repo, server) = fake_server();
    repo.set_available(false);
    let running = Orchestrator::new(local_config(), server)
        .start()
        .await
        .unwrap();
    let http_addr = running.http_addr();

    let (stop, stopped) = oneshot::channel::<()>();
    let run = tokio::spawn(running.run_until(async move {
        let _ = stopped.await;
    }));

    let health = http_get(http_addr, "/health").await;
    assert!(health.starts_with("HTTP/1.1 200"), "{health}");

    let lookup = http_get(http_addr, "/v1/accounts/1").await;
    assert!(lookup.starts_with("HTTP/1.1 500"), "{lookup}");

    stop.send(()).unwrap();
    assert_eq!(run.await.unwrap().unwrap(), ShutdownOutcome::Clean);
}

/// Sends headers announcing a larger body than is written, leaving the
/// request in flight.
async fn stalled_post(addr: SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(
            b"POST /v1/login HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: 100\r\n\r\n{\"user",
        )
        .await
        .unwrap();
    stream
}

#[tokio::test]
async fn stalled_request_forces_shutdown_and_closes_its_socket() {
    let mut config = local_config();
    config.http_shutdown_deadline = Duration::from_millis(300);
    let (_repo, server) = fake_server();
    let running = Orchestrator::new(config, server).start().await.unwrap();
    let http_addr = running.http_addr();

    let mut stalled = stalled_post(http_addr).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let outcome = running.run_until(async {}).await.unwrap();
    assert_eq!(outcome, ShutdownOutcome::Forced);
    assert_eq!(outcome.exit_status(), 1);

    let mut rest = Vec::new();
    // EOF or a reset both mean the server closed its end.
    let _ = tokio::time::timeout(Duration::from_secs(2), stalled.read_to_end(&mut rest))
        .await
        .expect("socket still open after forced shutdown");
    assert!(!String::from_utf8_lossy(&rest).contains("200 OK"));
}

#[tokio::test]
async fn rpc_stops_before_http_finishes_draining() {
    let mut config = local_config();
    config.http_shutdown_deadline = Duration::from_secs(2);
    let (_repo, server) = fake_server();
    let running = Orchestrator::new(config, server).start().await.unwrap();
    let rpc_addr = running.rpc_addr();
    let http_addr = running.http_addr();
    let mut state = running.subscribe();

    let _stalled = stalled_post(http_addr).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (stop, stopped) = oneshot::channel::<()>();
    let run = tokio::spawn(running.run_until(async move {
        let _ = stopped.await;
    }));
    stop.send(()).unwrap();
    state
        .wait_for(|s| *s == LifecycleState::ShuttingDown)
        .await
        .unwrap();

    let mut rpc_closed = false;
    for _ in 0..50 {
        if TcpStream::connect(rpc_addr).await.is_err() {
            rpc_closed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(rpc_closed, "rpc listener still accepting");
    // HTTP is still waiting on the stalled request.
    assert!(!run.is_finished());
    assert_eq!(*state.borrow(), LifecycleState::ShuttingDown);

    assert_eq!(run.await.unwrap().unwrap(), ShutdownOutcome::Forced);
    assert_eq!(*state.borrow(), LifecycleState::Stopped);
}

#[test]
fn dev_settings_build_a_lifecycle_config() {
    let settings = warden::settings::parse_settings(Some("settings/dev.toml")).unwrap();
    let config = LifecycleConfig::try_from_settings(&settings).unwrap();

    assert_eq!(config.tls, TlsMode::Off);
    assert_eq!(config.http_shutdown_deadline, Duration::from_secs(5));
    assert_ne!(config.rpc_address, config.http_address);
}

#[test]
fn missing_tls_cert_is_reported_with_its_path() {
    let mut settings = warden::settings::parse_settings(Some("settings/dev.toml")).unwrap();
    settings.http.tls.mode = "on".to_string();
    settings.http.tls.cert_path = Some("/nonexistent/warden.crt".to_string());
    settings.http.tls.key_path = Some("/nonexistent/warden.key".to_string());

    let err = LifecycleConfig::try_from_settings(&settings).unwrap_err();
    assert!(format!("{err:#}").contains("/nonexistent/warden.crt"), "{err:#}");
}
