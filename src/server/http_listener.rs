use crate::logger::*;
use anyhow::{Context as _, anyhow};
use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TaskTrackerToken;

const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);
const ACCEPT_QUEUE: usize = 64;

pub type Incoming = ReceiverStream<io::Result<HttpConnection>>;

trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// Tracks every accepted HTTP connection so they can be closed from outside
/// the server that drives them.
#[derive(Clone)]
pub struct ConnectionGuard {
    tracker: TaskTracker,
    force: CancellationToken,
}

impl ConnectionGuard {
    pub fn new() -> Self {
        Self {
            tracker: TaskTracker::new(),
            force: CancellationToken::new(),
        }
    }

    /// Connections (and pending TLS handshakes) not yet dropped.
    pub fn open(&self) -> usize {
        self.tracker.len()
    }

    /// Fails all I/O on open connections, then waits until every one of them
    /// has been dropped by its owner.
    pub async fn force_close(&self) {
        self.force.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    fn wrap(&self, transport: Box<dyn Transport>) -> HttpConnection {
        HttpConnection {
            transport,
            force: Box::pin(self.force.clone().cancelled_owned()),
            forced: false,
            _token: self.tracker.token(),
        }
    }
}

impl Default for ConnectionGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// One accepted connection, plain or TLS. Once its guard is forced every read
/// and write fails with `ConnectionAborted`.
pub struct HttpConnection {
    transport: Box<dyn Transport>,
    force: Pin<Box<WaitForCancellationFutureOwned>>,
    forced: bool,
    _token: TaskTrackerToken,
}

impl HttpConnection {
    fn poll_forced(&mut self, cx: &mut Context<'_>) -> io::Result<()> {
        if !self.forced && self.force.as_mut().poll(cx).is_ready() {
            self.forced = true;
        }
        if self.forced {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "connection force-closed",
            ));
        }
        Ok(())
    }
}

impl AsyncRead for HttpConnection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Err(e) = this.poll_forced(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut *this.transport).poll_read(cx, buf)
    }
}

impl AsyncWrite for HttpConnection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if let Err(e) = this.poll_forced(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut *this.transport).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if let Err(e) = this.poll_forced(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut *this.transport).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.transport.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Err(e) = this.poll_forced(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut *this.transport).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().transport).poll_shutdown(cx)
    }
}

pub fn load_tls_acceptor(cert_path: &Path, key_path: &Path) -> anyhow::Result<TlsAcceptor> {
    let cert_file =
        std::fs::File::open(cert_path).with_context(|| format!("TLS cert {cert_path:?}"))?;
    let certs = rustls_pemfile::certs(&mut io::BufReader::new(cert_file))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("TLS cert {cert_path:?}"))?;
    if certs.is_empty() {
        return Err(anyhow!("no certificate found in {:?}", cert_path));
    }

    let key_file =
        std::fs::File::open(key_path).with_context(|| format!("TLS key {key_path:?}"))?;
    let key = rustls_pemfile::private_key(&mut io::BufReader::new(key_file))
        .with_context(|| format!("TLS key {key_path:?}"))?
        .ok_or_else(|| anyhow!("no private key found in {:?}", key_path))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .context("TLS protocol versions")?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("TLS cert and key do not match")?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Accepts on `listener` until `shutdown` is cancelled. The returned future
/// drives the accept loop; the stream yields connections ready for HTTP.
pub fn incoming(
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    guard: ConnectionGuard,
    shutdown: CancellationToken,
) -> (impl Future<Output = ()> + Send + 'static, Incoming) {
    let (sink, queue) = mpsc::channel(ACCEPT_QUEUE);
    let accept = accept_loop(listener, tls, guard, shutdown, sink);
    (accept, ReceiverStream::new(queue))
}

async fn accept_loop(
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    guard: ConnectionGuard,
    shutdown: CancellationToken,
    sink: mpsc::Sender<io::Result<HttpConnection>>,
) {
    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("HTTP accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            },
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, "set_nodelay failed: {}", e);
        }

        match &tls {
            None => {
                if sink.send(Ok(guard.wrap(Box::new(stream)))).await.is_err() {
                    break;
                }
            }
            Some(acceptor) => {
                let acceptor = acceptor.clone();
                let task_guard = guard.clone();
                let task_sink = sink.clone();
                guard.tracker.spawn(async move {
                    let handshake =
                        tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream));
                    let stream = tokio::select! {
                        _ = task_guard.force.cancelled() => return,
                        result = handshake => match result {
                            Ok(Ok(stream)) => stream,
                            Ok(Err(e)) => {
                                debug!(%peer, "TLS handshake failed: {}", e);
                                return;
                            }
                            Err(_) => {
                                debug!(%peer, "TLS handshake timed out");
                                return;
                            }
                        },
                    };
                    let _ = task_sink.send(Ok(task_guard.wrap(Box::new(stream)))).await;
                });
            }
        }
    }
    debug!("HTTP accept loop stopped");
}
