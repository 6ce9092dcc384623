//! Request routing
//!
//! The exact API routes are checked first; everything else is static
//! content resolved through the confined [`Resolver`]. Every refusal on the
//! static side is the same 404 so clients cannot map out the policy.

use std::error::Error as StdError;
use std::io;
use std::net::SocketAddr;
use std::path::Path;

use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{HeaderValue, CONTENT_DISPOSITION};
use hyper::{Method, Request, StatusCode};

use overlay_core::path::decode_request_path;
use overlay_core::{
    list_directory, render_html, Config, Resolved, Resolver, TargetKind,
    DEFAULT_CA_DOWNLOAD_NAME, DEFAULT_CA_MISSING_HINT, MAX_BODY_BYTES,
};
use overlay_signal::{
    parse_answer, parse_offer, parse_telemetry, AnswerReply, BodyError, ErrorReply, OfferReply,
    SignalingStore, StatusReply, TelemetryReply, TelemetryStore,
};

use crate::access_log::AccessLog;
use crate::response::{self, HttpResponse};
use crate::CA_CONTENT_TYPE;

/// The JSON API route table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiRoute {
    Offer,
    Answer,
    GpsData,
}

impl ApiRoute {
    /// Exact match on the request path (query excluded)
    pub fn from_path(path: &str) -> Option<Self> {
        match path {
            "/api/offer" => Some(ApiRoute::Offer),
            "/api/answer" => Some(ApiRoute::Answer),
            "/api/gps-data" => Some(ApiRoute::GpsData),
            _ => None,
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            ApiRoute::Offer => "/api/offer",
            ApiRoute::Answer => "/api/answer",
            ApiRoute::GpsData => "/api/gps-data",
        }
    }
}

/// Router state shared by both listeners
pub struct Router {
    resolver: Resolver,
    signaling: SignalingStore,
    telemetry: TelemetryStore,
    log: AccessLog,
    ca_download_name: String,
    ca_missing_hint: String,
    max_body_bytes: usize,
}

impl Router {
    pub fn new(resolver: Resolver, telemetry: TelemetryStore) -> Self {
        Self {
            log: AccessLog::new(resolver.shared_policy()),
            resolver,
            signaling: SignalingStore::new(),
            telemetry,
            ca_download_name: DEFAULT_CA_DOWNLOAD_NAME.to_string(),
            ca_missing_hint: DEFAULT_CA_MISSING_HINT.to_string(),
            max_body_bytes: MAX_BODY_BYTES,
        }
    }

    /// Build the router described by a configuration
    pub fn from_config(config: &Config) -> io::Result<Self> {
        let content = &config.content;
        let resolver = Resolver::new(
            &content.root,
            content.ca_cert.clone(),
            std::sync::Arc::new(content.policy()),
        )?
        .with_symlink_confinement(content.confine_symlinks);

        Ok(
            Self::new(resolver, TelemetryStore::with_window(config.api.telemetry_window()))
                .with_ca_download(&content.ca_download_name, &content.ca_missing_hint)
                .with_max_body_bytes(config.api.max_body_bytes),
        )
    }

    /// Download file name and the not-found hint for `/ca.crt`
    pub fn with_ca_download(mut self, name: impl Into<String>, missing_hint: impl Into<String>) -> Self {
        self.ca_download_name = name.into();
        self.ca_missing_hint = missing_hint.into();
        self
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn signaling(&self) -> &SignalingStore {
        &self.signaling
    }

    pub fn telemetry(&self) -> &TelemetryStore {
        &self.telemetry
    }

    pub fn access_log(&self) -> &AccessLog {
        &self.log
    }

    /// Serve a full HTTP request from `peer`, reading the body only for API posts
    pub async fn serve<B>(&self, req: Request<B>, peer: SocketAddr) -> HttpResponse
    where
        B: Body,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let method = req.method().clone();
        let target = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_owned())
            .unwrap_or_else(|| req.uri().path().to_owned());

        let response = if method == Method::POST && ApiRoute::from_path(req.uri().path()).is_some() {
            match Limited::new(req.into_body(), self.max_body_bytes).collect().await {
                Ok(collected) => self.handle(&method, &target, collected.to_bytes()).await,
                Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => finish(response::json(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    &ErrorReply::new("Request body too large"),
                )),
                Err(e) => {
                    self.log.debug(&format!("failed to read request body: {}", e));
                    finish(response::json(
                        StatusCode::BAD_REQUEST,
                        &ErrorReply::new("Error reading request body"),
                    ))
                }
            }
        } else {
            self.handle(&method, &target, Bytes::new()).await
        };

        self.log.request(peer, &method, &target, response.status());
        response
    }

    /// Route a request whose body has already been read
    pub async fn handle(&self, method: &Method, target: &str, body: Bytes) -> HttpResponse {
        finish(self.route(method, target, &body).await)
    }

    async fn route(&self, method: &Method, target: &str, body: &[u8]) -> HttpResponse {
        if method == Method::OPTIONS {
            return response::empty(StatusCode::OK);
        }

        if let Some(route) = ApiRoute::from_path(request_path(target)) {
            return self.handle_api(route, method, body);
        }

        match *method {
            Method::GET => self.serve_static(target).await,
            Method::HEAD => response::without_body(self.serve_static(target).await),
            _ => response::method_not_allowed(),
        }
    }

    fn handle_api(&self, route: ApiRoute, method: &Method, body: &[u8]) -> HttpResponse {
        match (route, method) {
            (ApiRoute::Offer, &Method::GET) => response::json(
                StatusCode::OK,
                &OfferReply {
                    offer: self.signaling.offer(),
                },
            ),
            (ApiRoute::Offer, &Method::POST) => match parse_offer(body) {
                Ok(offer) => {
                    self.signaling.store_offer(offer);
                    response::json(StatusCode::OK, &StatusReply::offer_stored())
                }
                Err(e) => self.bad_request(e),
            },
            (ApiRoute::Answer, &Method::GET) => response::json(
                StatusCode::OK,
                &AnswerReply {
                    answer: self.signaling.answer(),
                },
            ),
            (ApiRoute::Answer, &Method::POST) => match parse_answer(body) {
                Ok(answer) => {
                    self.signaling.store_answer(answer);
                    response::json(StatusCode::OK, &StatusReply::answer_stored())
                }
                Err(e) => self.bad_request(e),
            },
            (ApiRoute::GpsData, &Method::GET) => response::json(
                StatusCode::OK,
                &TelemetryReply::from(self.telemetry.latest()),
            ),
            (ApiRoute::GpsData, &Method::POST) => match parse_telemetry(body) {
                Ok(data) => {
                    self.telemetry.store(data);
                    response::json(StatusCode::OK, &StatusReply::telemetry_stored())
                }
                Err(e) => self.bad_request(e),
            },
            _ => response::method_not_allowed(),
        }
    }

    fn bad_request(&self, err: BodyError) -> HttpResponse {
        self.log.debug(&format!("rejected request body: {}", err));
        response::json(StatusCode::BAD_REQUEST, &ErrorReply::new(err.to_string()))
    }

    async fn serve_static(&self, target: &str) -> HttpResponse {
        match self.resolver.resolve(target) {
            Ok(Resolved::CaCertificate(path)) => self.serve_ca(&path).await,
            Ok(Resolved::Content {
                path,
                kind: TargetKind::File,
            }) => self.serve_file(&path).await,
            Ok(Resolved::Content {
                path,
                kind: TargetKind::Directory,
            }) => self.serve_directory(target, &path).await,
            Ok(Resolved::Content { .. }) => response::not_found(),
            Err(e) => {
                self.log.debug(&format!("refused request path: {}", e));
                response::not_found()
            }
        }
    }

    async fn serve_directory(&self, target: &str, dir: &Path) -> HttpResponse {
        let path = request_path(target);

        // Relative links in the listing need the trailing slash. The location
        // keeps a single leading `/` so it can never turn protocol-relative.
        if !path.ends_with('/') {
            let query = target[path.len()..].split('#').next().unwrap_or("");
            let location = match path.trim_start_matches('/') {
                "" => format!("/{}", query),
                trimmed => format!("/{}/{}", trimmed, query),
            };
            return response::redirect(&location);
        }

        let index = format!("{}index.html", path);
        if let Ok(Resolved::Content {
            path: index_path,
            kind: TargetKind::File,
        }) = self.resolver.resolve(&index)
        {
            return self.serve_file(&index_path).await;
        }

        match list_directory(dir, &self.resolver) {
            Ok(entries) => {
                let display = decode_request_path(path).unwrap_or_else(|_| path.to_owned());
                response::with_body(
                    StatusCode::OK,
                    "text/html; charset=utf-8",
                    render_html(&display, &entries),
                )
            }
            Err(e) => {
                self.log.warn(&format!("directory listing failed: {}", e.cause()));
                response::text(StatusCode::NOT_FOUND, e.to_string())
            }
        }
    }

    async fn serve_file(&self, path: &Path) -> HttpResponse {
        match tokio::fs::read(path).await {
            Ok(contents) => response::with_body(StatusCode::OK, &content_type(path), contents),
            Err(e) => {
                self.log
                    .debug(&format!("cannot read {}: {}", path.display(), e));
                response::not_found()
            }
        }
    }

    async fn serve_ca(&self, path: &Path) -> HttpResponse {
        match tokio::fs::read(path).await {
            Ok(cert) => {
                let mut response = response::with_body(StatusCode::OK, CA_CONTENT_TYPE, cert);
                let disposition = format!("attachment; filename={}", self.ca_download_name);
                if let Ok(value) = HeaderValue::from_str(&disposition) {
                    response.headers_mut().insert(CONTENT_DISPOSITION, value);
                }
                response
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                response::text(StatusCode::NOT_FOUND, self.ca_missing_hint.clone())
            }
            Err(e) => {
                self.log.warn(&format!("cannot read CA certificate: {}", e));
                response::not_found()
            }
        }
    }
}

fn finish(mut response: HttpResponse) -> HttpResponse {
    response::apply_common_headers(response.headers_mut());
    response
}

/// Request target without query string or fragment
fn request_path(target: &str) -> &str {
    target.split(['?', '#']).next().unwrap_or(target)
}

/// `Content-Type` for a served file; textual types are declared UTF-8
pub fn content_type(path: &Path) -> String {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let textual = mime.type_() == mime_guess::mime::TEXT
        || matches!(
            mime.essence_str(),
            "application/javascript" | "application/json"
        );

    if textual && mime.get_param(mime_guess::mime::CHARSET).is_none() {
        format!("{}; charset=utf-8", mime.essence_str())
    } else {
        mime.to_string()
    }
}
