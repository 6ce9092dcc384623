//! Dual listener orchestration
//!
//! The TLS listener and the plaintext listener start and fail
//! independently. A missing certificate only disables HTTPS; the process
//! gives up only when neither listener could be started.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use overlay_core::{Config, CA_ROUTE};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::listener::{Listener, Scheme};
use crate::router::Router;
use crate::tls::{load_tls_config, TlsError};

/// Server startup errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to prepare content root: {0}")]
    Content(#[source] io::Error),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),

    #[error("failed to bind {scheme} listener on {addr}: {source}")]
    Bind {
        scheme: Scheme,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("no listener could be started")]
    NoListeners,
}

/// Both listeners over one shared router
pub struct Server {
    config: Config,
    router: Arc<Router>,
}

impl Server {
    pub fn new(config: Config) -> Result<Self, ServerError> {
        let router = Router::from_config(&config).map_err(ServerError::Content)?;
        Ok(Self::with_router(config, Arc::new(router)))
    }

    /// Use an already built router (tests, embedding)
    pub fn with_router(config: Config, router: Arc<Router>) -> Self {
        Self { config, router }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Bind and spawn every listener that can start
    pub async fn start(&self, shutdown: watch::Receiver<bool>) -> Result<RunningServer, ServerError> {
        let bind = self.config.server.bind;
        let mut tasks = JoinSet::new();

        let https_addr = match self
            .bind_tls(SocketAddr::new(bind, self.config.server.https_port))
            .await
        {
            Ok(listener) => {
                let addr = listener.local_addr().ok();
                tasks.spawn(listener.run(Arc::clone(&self.router), shutdown.clone()));
                addr
            }
            Err(ServerError::Tls(e)) if e.is_missing() => {
                warn!("HTTPS disabled: {}", e);
                warn!(
                    "Generate {} and {} to enable it; plaintext HTTP keeps running",
                    self.config.tls.cert.display(),
                    self.config.tls.key.display()
                );
                None
            }
            Err(e) => {
                error!("HTTPS disabled: {}", e);
                None
            }
        };

        let http = SocketAddr::new(bind, self.config.server.http_port);
        let http_addr = match Listener::bind_plain(http).await {
            Ok(listener) => {
                let addr = listener.local_addr().ok();
                tasks.spawn(listener.run(Arc::clone(&self.router), shutdown));
                addr
            }
            Err(source) => {
                error!(
                    "{}",
                    ServerError::Bind {
                        scheme: Scheme::Http,
                        addr: http,
                        source,
                    }
                );
                None
            }
        };

        if tasks.is_empty() {
            return Err(ServerError::NoListeners);
        }

        Ok(RunningServer {
            http_addr,
            https_addr,
            tasks,
        })
    }

    /// Start the listeners and wait until they all stop
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), ServerError> {
        let running = self.start(shutdown).await?;
        for line in self.banner(&running) {
            info!("{}", line);
        }
        running.wait().await;
        Ok(())
    }

    async fn bind_tls(&self, addr: SocketAddr) -> Result<Listener, ServerError> {
        let tls = load_tls_config(&self.config.tls.cert, &self.config.tls.key)?;
        Listener::bind_tls(addr, tls)
            .await
            .map_err(|source| ServerError::Bind {
                scheme: Scheme::Https,
                addr,
                source,
            })
    }

    /// Startup summary: served root, allowed types and where to connect
    pub fn banner(&self, running: &RunningServer) -> Vec<String> {
        let policy = self.router.resolver().policy();
        let mut lines = vec![
            "Starting dual HTTP/HTTPS server...".to_string(),
            format!(
                "Serving web files from: {}",
                self.router.resolver().root().display()
            ),
            format!(
                "Allowed extensions: {}",
                policy.allowed_extensions().join(", ")
            ),
            String::new(),
            "Access URLs:".to_string(),
        ];

        if let Some(addr) = running.http_addr {
            lines.push(format!("  Landing page: http://localhost:{}/", addr.port()));
            lines.push(format!(
                "  HTTP (for streaming software): http://localhost:{}/",
                addr.port()
            ));
        }
        if let Some(addr) = running.https_addr {
            lines.push(format!(
                "  HTTPS (for mobile browsers): https://localhost:{}/",
                addr.port()
            ));
        }

        lines.push(String::new());
        lines.push("Certificate Installation:".to_string());
        if let Some(addr) = running.http_addr.or(running.https_addr) {
            let scheme = if running.http_addr.is_some() {
                Scheme::Http
            } else {
                Scheme::Https
            };
            lines.push(format!(
                "  CA download: {}://localhost:{}{}",
                scheme,
                addr.port(),
                CA_ROUTE
            ));
        }
        lines.push(String::new());
        lines.push("Press Ctrl+C to stop both servers".to_string());
        lines
    }
}

/// Handle to the spawned listeners
pub struct RunningServer {
    http_addr: Option<SocketAddr>,
    https_addr: Option<SocketAddr>,
    tasks: JoinSet<()>,
}

impl RunningServer {
    /// Bound plaintext address, if that listener started
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    /// Bound TLS address, if that listener started
    pub fn https_addr(&self) -> Option<SocketAddr> {
        self.https_addr
    }

    /// Wait for every listener to stop
    pub async fn wait(mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                error!("listener task failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn config(temp: &TempDir) -> Config {
        let public = temp.path().join("public");
        fs::create_dir_all(&public).unwrap();
        fs::write(public.join("speed.html"), "speed").unwrap();

        let mut config = Config::default();
        config.server.bind = IpAddr::V4(Ipv4Addr::LOCALHOST);
        config.server.http_port = 0;
        config.server.https_port = 0;
        config.content.root = public;
        config.content.ca_cert = temp.path().join("ca.crt");
        config.tls.cert = temp.path().join("server.crt");
        config.tls.key = temp.path().join("server.key");
        config
    }

    fn write_tls_material(config: &Config) {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".into()]).unwrap();
        fs::write(&config.tls.cert, cert.serialize_pem().unwrap()).unwrap();
        fs::write(&config.tls.key, cert.serialize_private_key_pem()).unwrap();
    }

    async fn get(addr: SocketAddr, target: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            target
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    #[tokio::test]
    async fn test_missing_certificates_keep_plaintext_running() {
        let temp = TempDir::new().unwrap();
        let server = Server::new(config(&temp)).unwrap();

        let (stop, shutdown) = watch::channel(false);
        let running = server.start(shutdown).await.unwrap();
        assert!(running.https_addr().is_none());
        let http = running.http_addr().unwrap();

        let response = get(http, "/speed.html").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{}", response);

        let banner = server.banner(&running).join("\n");
        assert!(banner.contains(&format!("http://localhost:{}/ca.crt", http.port())));
        assert!(!banner.contains("https://"));

        stop.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), running.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_both_listeners_share_state() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        write_tls_material(&config);
        let server = Server::new(config).unwrap();

        let (stop, shutdown) = watch::channel(false);
        let running = server.start(shutdown).await.unwrap();
        assert!(running.http_addr().is_some());
        assert!(running.https_addr().is_some());

        // A write through one listener's router is visible to the other
        server
            .router()
            .signaling()
            .store_offer(serde_json::json!({"sdp": "A"}));
        let response = get(running.http_addr().unwrap(), "/api/offer").await;
        assert!(response.ends_with(r#"{"offer":{"sdp":"A"}}"#), "{}", response);

        let banner = server.banner(&running).join("\n");
        assert!(banner.contains("https://localhost:"));
        assert!(banner.contains("Allowed extensions: .css, .gif, .html"));

        stop.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), running.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_no_listeners_is_an_error() {
        let temp = TempDir::new().unwrap();
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();

        let mut config = config(&temp);
        config.server.http_port = occupied.local_addr().unwrap().port();
        let server = Server::new(config).unwrap();

        let (_stop, shutdown) = watch::channel(false);
        let err = server.start(shutdown).await.err().unwrap();
        assert!(matches!(err, ServerError::NoListeners));
    }

    #[tokio::test]
    async fn test_unusable_certificate_keeps_plaintext_running() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        fs::write(&config.tls.cert, "garbage").unwrap();
        fs::write(&config.tls.key, "garbage").unwrap();
        let server = Server::new(config).unwrap();

        let (stop, shutdown) = watch::channel(false);
        let running = server.start(shutdown).await.unwrap();
        assert!(running.https_addr().is_none());
        assert!(running.http_addr().is_some());

        drop(stop);
        tokio::time::timeout(Duration::from_secs(5), running.wait())
            .await
            .unwrap();
    }
}
