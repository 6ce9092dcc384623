//! Plaintext and TLS listeners
//!
//! Both listener kinds share the same accept loop; the only difference is
//! the optional TLS handshake before the connection is handed to hyper.
//! Every connection runs in its own task so a slow client never blocks the
//! accept loop or the other listener.

use std::convert::Infallible;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::router::Router;

/// Handshakes that take longer than this are dropped
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Back-off after a failed accept (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
        }
    }
}

/// A bound socket waiting to be run
pub struct Listener {
    scheme: Scheme,
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
}

impl Listener {
    /// Bind a plaintext listener
    pub async fn bind_plain(addr: SocketAddr) -> io::Result<Self> {
        Ok(Self {
            scheme: Scheme::Http,
            listener: TcpListener::bind(addr).await?,
            acceptor: None,
        })
    }

    /// Bind a listener that completes a TLS handshake on every connection
    pub async fn bind_tls(addr: SocketAddr, config: Arc<rustls::ServerConfig>) -> io::Result<Self> {
        Ok(Self {
            scheme: Scheme::Https,
            listener: TcpListener::bind(addr).await?,
            acceptor: Some(TlsAcceptor::from(config)),
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// In-flight connections are aborted once the loop exits.
    pub async fn run(self, router: Arc<Router>, mut shutdown: watch::Receiver<bool>) {
        let scheme = self.scheme;
        let local = self
            .local_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("{} listener serving on {}", scheme, local);

        let mut connections = JoinSet::new();

        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let router = Arc::clone(&router);
                        let acceptor = self.acceptor.clone();
                        connections.spawn(serve_connection(stream, peer, acceptor, router));
                    }
                    Err(e) => {
                        warn!("{} accept failed: {}", scheme, e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        if e.is_panic() {
                            error!("{} connection task panicked: {}", scheme, e);
                        }
                    }
                }
            }
        }

        connections.shutdown().await;
        info!("{} listener on {} stopped", scheme, local);
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: Option<TlsAcceptor>,
    router: Arc<Router>,
) {
    let Some(acceptor) = acceptor else {
        serve_http(TokioIo::new(stream), peer, router).await;
        return;
    };

    match tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
        Ok(Ok(tls)) => serve_http(TokioIo::new(tls), peer, router).await,
        Ok(Err(e)) => warn!("TLS handshake with {} failed: {}", peer, e),
        Err(_) => warn!("TLS handshake with {} timed out", peer),
    }
}

async fn serve_http<I>(io: I, peer: SocketAddr, router: Arc<Router>)
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let service = service_fn(move |req: Request<Incoming>| {
        let router = Arc::clone(&router);
        async move { Ok::<_, Infallible>(router.serve(req, peer).await) }
    });

    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
        debug!("connection from {} ended: {}", peer, e);
    }
}
