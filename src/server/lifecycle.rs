use super::http_listener::{self, ConnectionGuard};
use crate::api;
use crate::logger::*;
use crate::rpc::proto::account_service_server::AccountServiceServer;
use crate::rpc::{AccountRpcService, proto};
use crate::server::Server;
use crate::settings::Settings;
use anyhow::{Context, anyhow};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::process::ExitCode;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_rustls::TlsAcceptor;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Both listeners drained.
    Clean,
    /// The HTTP deadline expired, or the RPC server stopped with an error.
    Forced,
}

impl ShutdownOutcome {
    pub fn exit_code(self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }

    pub fn exit_status(self) -> u8 {
        match self {
            ShutdownOutcome::Clean => 0,
            ShutdownOutcome::Forced => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsMode {
    Off,
    On { cert_path: PathBuf, key_path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub rpc_address: SocketAddr,
    pub http_address: SocketAddr,
    pub http_shutdown_deadline: Duration,
    pub tls: TlsMode,
    pub rpc_reflection: bool,
    pub rpc_request_timeout: Duration,
}

impl LifecycleConfig {
    pub fn try_from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let rpc_address: SocketAddr = settings
            .rpc
            .address
            .parse()
            .with_context(|| format!("invalid rpc.address {:?}", settings.rpc.address))?;
        let http_address: SocketAddr = settings
            .http
            .address
            .parse()
            .with_context(|| format!("invalid http.address {:?}", settings.http.address))?;

        let tls = match settings.http.tls.mode.as_str() {
            "off" => TlsMode::Off,
            "on" => {
                let cert_path = settings
                    .http
                    .tls
                    .cert_path
                    .clone()
                    .ok_or_else(|| anyhow!("http.tls.cert_path is required when TLS is on"))?;
                let key_path = settings
                    .http
                    .tls
                    .key_path
                    .clone()
                    .ok_or_else(|| anyhow!("http.tls.key_path is required when TLS is on"))?;
                if !std::fs::metadata(&cert_path)
                    .with_context(|| format!("TLS cert {cert_path:?}"))?
                    .is_file()
                {
                    return Err(anyhow!("TLS cert is not a regular file: {:?}", cert_path));
                }
                if !std::fs::metadata(&key_path)
                    .with_context(|| format!("TLS key {key_path:?}"))?
                    .is_file()
                {
                    return Err(anyhow!("TLS key is not a regular file: {:?}", key_path));
                }
                TlsMode::On {
                    cert_path: cert_path.into(),
                    key_path: key_path.into(),
                }
            }
            other => return Err(anyhow!("Unknown TLS mode: {}", other)),
        };

        Ok(Self {
            rpc_address,
            http_address,
            http_shutdown_deadline: Duration::from_millis(settings.shutdown.http_deadline_ms),
            tls,
            rpc_reflection: settings.rpc.reflection,
            rpc_request_timeout: Duration::from_millis(settings.rpc.request_timeout_ms),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("failed to bind rpc listener on {address}: {source}")]
    RpcBind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to bind http listener on {address}: {source}")]
    HttpBind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to load TLS material: {0}")]
    HttpTls(String),
    #[error("failed to set up rpc services: {0}")]
    RpcSetup(String),
    #[error("{listener} listener exited before shutdown: {reason}")]
    ListenerExited {
        listener: &'static str,
        reason: String,
    },
}

type RpcTask = JoinHandle<Result<(), tonic::transport::Error>>;

// Bounds the wait for force-closed connections to be dropped.
const FORCE_CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Owns the process lifecycle: `Idle -> Starting -> Running -> ShuttingDown
/// -> Stopped`. Each step consumes the previous handle, so a process goes
/// through the sequence once.
pub struct Orchestrator {
    config: LifecycleConfig,
    server: Arc<Server>,
    state: watch::Sender<LifecycleState>,
}

impl Orchestrator {
    pub fn new(config: LifecycleConfig, server: Arc<Server>) -> Self {
        let (state, _) = watch::channel(LifecycleState::Idle);
        Self {
            config,
            server,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Binds RPC, then HTTP, and spawns both servers. A bind failure is
    /// returned as-is; there is no retry.
    pub async fn start(self) -> Result<RunningServers, LifecycleError> {
        let Orchestrator {
            config,
            server,
            state,
        } = self;
        transition(&state, LifecycleState::Starting);

        let tls_acceptor: Option<TlsAcceptor> = match &config.tls {
            TlsMode::Off => None,
            TlsMode::On {
                cert_path,
                key_path,
            } => match http_listener::load_tls_acceptor(cert_path, key_path) {
                Ok(acceptor) => Some(acceptor),
                Err(e) => {
                    transition(&state, LifecycleState::Stopped);
                    return Err(LifecycleError::HttpTls(format!("{e:#}")));
                }
            },
        };

        // RPC first: the gateway needs the endpoint to forward to.
        let rpc_listener = match TcpListener::bind(config.rpc_address).await {
            Ok(listener) => listener,
            Err(source) => {
                transition(&state, LifecycleState::Stopped);
                return Err(LifecycleError::RpcBind {
                    address: config.rpc_address,
                    source,
                });
            }
        };
        let rpc_addr = rpc_listener
            .local_addr()
            .map_err(|source| LifecycleError::RpcBind {
                address: config.rpc_address,
                source,
            })?;

        let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
        health_reporter
            .set_serving::<AccountServiceServer<AccountRpcService>>()
            .await;

        let reflection_service = if config.rpc_reflection {
            let service = tonic_reflection::server::Builder::configure()
                .register_encoded_file_descriptor_set(proto::FILE_DESCRIPTOR_SET)
                .build_v1()
                .map_err(|e| LifecycleError::RpcSetup(e.to_string()))?;
            Some(service)
        } else {
            None
        };

        let account_service =
            AccountServiceServer::new(AccountRpcService::new(server.credential_service.clone()));

        let rpc_shutdown = CancellationToken::new();
        let rpc_router = tonic::transport::Server::builder()
            .timeout(config.rpc_request_timeout)
            .trace_fn(|request: &tonic::codegen::http::Request<()>| {
                tracing::info_span!("grpc", path = %request.uri().path())
            })
            .add_service(health_service)
            .add_optional_service(reflection_service)
            .add_service(account_service);
        let rpc_task: RpcTask = tokio::spawn(rpc_router.serve_with_incoming_shutdown(
            TcpListenerStream::new(rpc_listener),
            rpc_shutdown.clone().cancelled_owned(),
        ));
        info!("gRPC server listening on {}", rpc_addr);

        let gateway = api::Gateway::connect_lazy(rpc_addr, config.rpc_request_timeout)
            .map_err(|e| LifecycleError::RpcSetup(e.to_string()))?;
        let routes = api::routes(gateway);

        let http_tcp = match TcpListener::bind(config.http_address).await {
            Ok(listener) => listener,
            Err(source) => {
                rpc_shutdown.cancel();
                let _ = rpc_task.await;
                transition(&state, LifecycleState::Stopped);
                return Err(LifecycleError::HttpBind {
                    address: config.http_address,
                    source,
                });
            }
        };
        let http_addr = http_tcp
            .local_addr()
            .map_err(|source| LifecycleError::HttpBind {
                address: config.http_address,
                source,
            })?;

        let http_shutdown = CancellationToken::new();
        let connections = ConnectionGuard::new();
        let (accept, incoming) = http_listener::incoming(
            http_tcp,
            tls_acceptor,
            connections.clone(),
            http_shutdown.clone(),
        );
        let serve = warp::serve(routes).serve_incoming_with_graceful_shutdown(
            incoming,
            http_shutdown.clone().cancelled_owned(),
        );
        let http_task = tokio::spawn(async move {
            tokio::join!(accept, serve);
        });
        info!(
            tls = matches!(config.tls, TlsMode::On { .. }),
            "HTTP server listening on {}", http_addr
        );

        transition(&state, LifecycleState::Running);

        Ok(RunningServers {
            rpc_addr,
            http_addr,
            rpc_task,
            http_task,
            rpc_shutdown,
            http_shutdown,
            connections,
            health_reporter,
            http_shutdown_deadline: config.http_shutdown_deadline,
            server,
            state,
        })
    }
}

/// Both listeners accepting. Dropping this without calling
/// [`RunningServers::run_until`] leaves the tasks running.
pub struct RunningServers {
    rpc_addr: SocketAddr,
    http_addr: SocketAddr,
    rpc_task: RpcTask,
    http_task: JoinHandle<()>,
    rpc_shutdown: CancellationToken,
    http_shutdown: CancellationToken,
    connections: ConnectionGuard,
    health_reporter: tonic_health::server::HealthReporter,
    http_shutdown_deadline: Duration,
    server: Arc<Server>,
    state: watch::Sender<LifecycleState>,
}

impl RunningServers {
    pub fn rpc_addr(&self) -> SocketAddr {
        self.rpc_addr
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Serves until `signal` resolves, then stops RPC (no deadline) and HTTP
    /// (bounded by the configured deadline), in that order. A listener that
    /// exits on its own first is an error.
    pub async fn run_until<S>(mut self, signal: S) -> Result<ShutdownOutcome, LifecycleError>
    where
        S: Future<Output = ()>,
    {
        tokio::select! {
            _ = signal => {
                info!("Shutting down servers...");
            }
            result = &mut self.rpc_task => {
                self.http_task.abort();
                self.force_close_http().await;
                self.server.shutdown().await;
                transition(&self.state, LifecycleState::Stopped);
                return Err(LifecycleError::ListenerExited {
                    listener: "rpc",
                    reason: rpc_exit_reason(result),
                });
            }
            result = &mut self.http_task => {
                self.force_close_http().await;
                self.rpc_shutdown.cancel();
                let _ = (&mut self.rpc_task).await;
                self.server.shutdown().await;
                transition(&self.state, LifecycleState::Stopped);
                return Err(LifecycleError::ListenerExited {
                    listener: "http",
                    reason: match result {
                        Ok(()) => "server future completed".to_string(),
                        Err(e) => e.to_string(),
                    },
                });
            }
        }

        transition(&self.state, LifecycleState::ShuttingDown);
        let mut outcome = ShutdownOutcome::Clean;

        self.health_reporter
            .set_not_serving::<AccountServiceServer<AccountRpcService>>()
            .await;
        self.rpc_shutdown.cancel();
        match (&mut self.rpc_task).await {
            Ok(Ok(())) => info!("gRPC server stopped"),
            other => {
                error!("gRPC server stopped with error: {}", rpc_exit_reason(other));
                outcome = ShutdownOutcome::Forced;
            }
        }

        self.http_shutdown.cancel();
        match tokio::time::timeout(self.http_shutdown_deadline, &mut self.http_task).await {
            Ok(Ok(())) => info!("HTTP server stopped"),
            Ok(Err(e)) => {
                error!("HTTP server task failed: {}", e);
                outcome = ShutdownOutcome::Forced;
            }
            Err(_) => {
                warn!(
                    deadline = ?self.http_shutdown_deadline,
                    open_connections = self.connections.open(),
                    "HTTP server forced to shutdown"
                );
                self.http_task.abort();
                self.force_close_http().await;
                outcome = ShutdownOutcome::Forced;
            }
        }

        self.server.shutdown().await;
        transition(&self.state, LifecycleState::Stopped);
        Ok(outcome)
    }
}

impl RunningServers {
    async fn force_close_http(&self) {
        if tokio::time::timeout(FORCE_CLOSE_GRACE, self.connections.force_close())
            .await
            .is_err()
        {
            error!(
                open_connections = self.connections.open(),
                "HTTP connections still open after force close"
            );
        }
    }
}

fn transition(state: &watch::Sender<LifecycleState>, next: LifecycleState) {
    let previous = state.send_replace(next);
    debug!(?previous, ?next, "lifecycle transition");
}

fn rpc_exit_reason(result: Result<Result<(), tonic::transport::Error>, JoinError>) -> String {
    match result {
        Ok(Ok(())) => "server future completed".to_string(),
        Ok(Err(e)) => e.to_string(),
        Err(e) => e.to_string(),
    }
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(e) = result {
                            error!("Could not listen for SIGINT: {}", e);
                        }
                    }
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!("Could not register SIGTERM: {}", e);
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Could not listen for SIGINT: {}", e);
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl-C: {}", e);
        }
    }
}
