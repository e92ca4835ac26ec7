//! The mutually-authenticated HTTPS front for tap requests.
//!
//! Requests arrive on paths of the form
//! `/apis/tap.linkerd.io/v1alpha1/watch/.../tap` with a length-delimited
//! `TapByResourceRequest` body. The TLS client verifier is built from the
//! cluster's published client CA; certificate common names are checked per
//! request against the allowed-name list. Responses stream one
//! length-delimited `TapEvent` frame per observed event, with fatal errors
//! carried inline as a trailing `ApiError` frame.

use crate::{api, auth::AuthConfig, core::TapError, grpc};
use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::{
    body::{Frame, Incoming},
    http::{header, Method, Request, Response, StatusCode},
    service::service_fn,
};
use linkerd_tap_controller_core::{DiscoverTapPods, HydrateIp};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::{convert::Infallible, net::SocketAddr, path::Path, sync::Arc};
use tokio::{net::TcpListener, sync::mpsc, sync::watch};
use tokio_rustls::TlsAcceptor;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, info_span, warn, Instrument};

type Body = http_body_util::combinators::BoxBody<Bytes, Infallible>;

/// Response frames buffered ahead of a slow client before producers block.
const RESPONSE_BUFFER_CAPACITY: usize = 32;

pub struct ApiServer<D, H> {
    tap: Arc<grpc::TapServer<D, H>>,
    auth_rx: watch::Receiver<Arc<AuthConfig>>,
    disable_common_names: bool,
}

impl<D, H> Clone for ApiServer<D, H> {
    fn clone(&self) -> Self {
        Self {
            tap: self.tap.clone(),
            auth_rx: self.auth_rx.clone(),
            disable_common_names: self.disable_common_names,
        }
    }
}

// === impl ApiServer ===

impl<D, H> ApiServer<D, H>
where
    D: DiscoverTapPods + Send + Sync + 'static,
    H: HydrateIp + Clone + Send + Sync + 'static,
{
    pub fn new(
        tap: grpc::TapServer<D, H>,
        auth_rx: watch::Receiver<Arc<AuthConfig>>,
        disable_common_names: bool,
    ) -> Self {
        Self {
            tap: Arc::new(tap),
            auth_rx,
            disable_common_names,
        }
    }

    async fn handle(&self, req: Request<Incoming>, peer_names: &[String]) -> Response<Body> {
        let auth = self.auth_rx.borrow().clone();
        if !self.disable_common_names && !auth.allowed_names.is_empty() {
            let permitted = peer_names
                .iter()
                .any(|name| auth.allowed_names.iter().any(|allowed| allowed == name));
            if !permitted {
                info!(
                    allowed = ?auth.allowed_names,
                    presented = ?peer_names,
                    "Rejecting tap client: no acceptable common name"
                );
                return error_response(
                    StatusCode::BAD_REQUEST,
                    &TapError::invalid_argument(
                        "no acceptable common name found in client certificates",
                    ),
                );
            }
        }

        if req.method() != Method::POST {
            return not_found();
        }
        let target = match api::path::parse_tap_path(req.uri().path()) {
            Ok(target) => target,
            Err(api::path::PathError::UnknownKind(kind)) => {
                return error_response(
                    StatusCode::OK,
                    &TapError::unimplemented(format!("unimplemented resource type: {kind}")),
                );
            }
            Err(_) => return not_found(),
        };

        let mut body = match req.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(error) => {
                debug!(%error, "Failed to read request body");
                return error_response(
                    StatusCode::OK,
                    &TapError::invalid_argument("failed to read the tap request body"),
                );
            }
        };
        let mut tap_req: api::tap::TapByResourceRequest = match api::decode_frame(&mut body) {
            Ok(req) => req,
            Err(error) => {
                return error_response(
                    StatusCode::OK,
                    &TapError::invalid_argument(format!("invalid tap request: {error}")),
                );
            }
        };

        // The URL names the target authoritatively; the body contributes
        // only the label selector.
        let label_selector = tap_req
            .target
            .take()
            .map(|t| t.label_selector)
            .unwrap_or_default();
        tap_req.target = Some(api::tap::ResourceSelection {
            resource: Some(api::tap::Resource {
                r#type: target.kind.as_str().to_string(),
                namespace: target.namespace,
                name: target.name,
            }),
            label_selector,
        });

        match self.tap.tap_by_resource(tap_req).await {
            Ok(events) => stream_response(events),
            Err(error) => error_response(StatusCode::OK, &error),
        }
    }
}

/// Binds the TLS listener and serves connections until shutdown.
///
/// The TLS acceptor is rebuilt whenever the authentication configuration is
/// republished, so client-CA rotation takes effect for new connections.
pub async fn serve<D, H>(
    addr: SocketAddr,
    tls_certs: impl AsRef<Path>,
    tls_key: impl AsRef<Path>,
    server: ApiServer<D, H>,
    drain: drain::Watch,
) -> Result<()>
where
    D: DiscoverTapPods + Send + Sync + 'static,
    H: HydrateIp + Clone + Send + Sync + 'static,
{
    let (certs, key) = load_tls(tls_certs.as_ref(), tls_key.as_ref())?;
    let mut auth_rx = server.auth_rx.clone();
    let mut acceptor = accept_config(&certs, &key, &auth_rx.borrow_and_update())?;

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "tap API server listening");

    let shutdown = drain.signaled();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => return Ok(()),

            changed = auth_rx.changed() => {
                if changed.is_err() {
                    continue;
                }
                match accept_config(&certs, &key, &auth_rx.borrow_and_update()) {
                    Ok(updated) => {
                        debug!("Rebuilt TLS acceptor");
                        acceptor = updated;
                    }
                    Err(error) => warn!(%error, "Failed to rebuild TLS acceptor"),
                }
            }

            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(error) => {
                        warn!(%error, "Failed to accept connection");
                        continue;
                    }
                };
                tokio::spawn(
                    serve_connection(stream, acceptor.clone(), server.clone())
                        .instrument(info_span!("conn", %peer)),
                );
            }
        }
    }
}

async fn serve_connection<D, H>(
    stream: tokio::net::TcpStream,
    acceptor: TlsAcceptor,
    server: ApiServer<D, H>,
) where
    D: DiscoverTapPods + Send + Sync + 'static,
    H: HydrateIp + Clone + Send + Sync + 'static,
{
    let tls = match acceptor.accept(stream).await {
        Ok(tls) => tls,
        Err(error) => {
            debug!(%error, "TLS handshake failed");
            return;
        }
    };

    let peer_names: Arc<[String]> = {
        let (_, session) = tls.get_ref();
        session
            .peer_certificates()
            .map(client_names)
            .unwrap_or_default()
            .into()
    };

    let svc = service_fn(move |req| {
        let server = server.clone();
        let peer_names = peer_names.clone();
        async move { Ok::<_, Infallible>(server.handle(req, &peer_names).await) }
    });

    if let Err(error) = hyper::server::conn::http1::Builder::new()
        .serve_connection(hyper_util::rt::TokioIo::new(tls), svc)
        .await
    {
        debug!(%error, "Connection closed");
    }
}

/// The common names presented across the peer's certificate chain.
fn client_names(certs: &[CertificateDer<'_>]) -> Vec<String> {
    let mut names = Vec::new();
    for cert in certs {
        match x509_parser::parse_x509_certificate(cert.as_ref()) {
            Ok((_, cert)) => {
                for cn in cert.subject().iter_common_name() {
                    match cn.as_str() {
                        Ok(cn) => names.push(cn.to_string()),
                        Err(error) => debug!(%error, "Skipping non-string common name"),
                    }
                }
            }
            Err(error) => warn!(%error, "Failed to parse a client certificate"),
        }
    }
    names
}

fn load_tls(
    certs_path: &Path,
    key_path: &Path,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let mut certs_pem = std::io::BufReader::new(
        std::fs::File::open(certs_path)
            .with_context(|| format!("failed to open {}", certs_path.display()))?,
    );
    let certs = rustls_pemfile::certs(&mut certs_pem)
        .collect::<Result<Vec<_>, _>>()
        .context("failed to parse the server certificate")?;

    let mut key_pem = std::io::BufReader::new(
        std::fs::File::open(key_path)
            .with_context(|| format!("failed to open {}", key_path.display()))?,
    );
    let key = rustls_pemfile::private_key(&mut key_pem)
        .context("failed to parse the server key")?
        .context("no private key found")?;

    Ok((certs, key))
}

/// Builds a TLS acceptor that requests (but does not require) client
/// certificates verified against the published client CA. Name checks
/// happen per request so that rejections produce an HTTP response rather
/// than a handshake failure.
fn accept_config(
    certs: &[CertificateDer<'static>],
    key: &PrivateKeyDer<'static>,
    auth: &AuthConfig,
) -> Result<TlsAcceptor> {
    let mut roots = rustls::RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut auth.client_ca_pem.as_bytes()) {
        let cert = cert.context("failed to parse the client CA bundle")?;
        roots
            .add(cert)
            .context("failed to add a client CA certificate")?;
    }

    let verifier = rustls::server::WebPkiClientVerifier::builder(Arc::new(roots))
        .allow_unauthenticated()
        .build()
        .context("failed to build the client certificate verifier")?;

    let config = rustls::ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs.to_vec(), key.clone_key())
        .context("invalid server certificate")?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Streams events to the client, one frame per event, ending with an error
/// frame if the tap fails mid-stream.
fn stream_response(events: grpc::TapEventStream) -> Response<Body> {
    use futures::StreamExt;

    let (tx, rx) = mpsc::channel::<Result<Frame<Bytes>, Infallible>>(RESPONSE_BUFFER_CAPACITY);
    tokio::spawn(async move {
        let mut events = events;
        loop {
            // Returning drops the event stream, which cancels the per-pod
            // producers; watching for channel closure catches clients that
            // disconnect while the tap is quiet.
            let event = tokio::select! {
                _ = tx.closed() => return,
                event = events.next() => match event {
                    Some(event) => event,
                    None => return,
                },
            };
            let (frame, fatal) = match event {
                Ok(event) => (api::encode_frame(&event), false),
                Err(error) => (api::encode_frame(&api_error(&error)), true),
            };
            if tx.send(Ok(Frame::data(frame))).await.is_err() || fatal {
                return;
            }
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(BodyExt::boxed(StreamBody::new(ReceiverStream::new(rx))))
        .expect("response must be valid")
}

fn api_error(error: &TapError) -> api::tap::ApiError {
    api::tap::ApiError {
        code: error.grpc_code(),
        message: error.to_string(),
    }
}

fn error_response(status: StatusCode, error: &TapError) -> Response<Body> {
    let frame = api::encode_frame(&api_error(error));
    Response::builder()
        .status(status)
        .header(api::ERROR_HEADER, "true")
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(BodyExt::boxed(Full::new(frame)))
        .expect("response must be valid")
}

fn not_found() -> Response<Body> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(BodyExt::boxed(Full::new(Bytes::new())))
        .expect("response must be valid")
}
