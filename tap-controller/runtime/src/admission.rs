//! The tap-injection admission webhook.
//!
//! Called on pod admission: meshed pods that have not opted out of tapping
//! are patched with the tap-enabled label so the resolver will consider
//! them. Everything else is allowed through unmodified.

use crate::k8s;
use futures::future;
use http_body_util::BodyExt;
use hyper::{http, Request, Response};
use kube::core::{admission::AdmissionResponse, DynamicObject};
use linkerd_tap_controller_k8s_index::{
    CONTROL_PLANE_NS_LABEL, DISABLE_TAP_ANNOTATION, TAP_ENABLED_LABEL,
};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

#[derive(Clone)]
pub struct Admission {}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[from] hyper::Error),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

type Review = kube::core::admission::AdmissionReview<k8s::Pod>;
type AdmissionRequest = kube::core::admission::AdmissionRequest<k8s::Pod>;
type AdmissionReview = kube::core::admission::AdmissionReview<DynamicObject>;

type Body = http_body_util::Full<bytes::Bytes>;

// === impl Admission ===

impl tower::Service<Request<hyper::body::Incoming>> for Admission {
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<hyper::body::Incoming>) -> Self::Future {
        trace!(?req);
        if req.method() != http::Method::POST || req.uri().path() != "/" {
            return Box::pin(future::ok(
                Response::builder()
                    .status(http::StatusCode::NOT_FOUND)
                    .body(Body::default())
                    .expect("not found response must be valid"),
            ));
        }

        let admission = self.clone();
        Box::pin(async move {
            use bytes::Buf;
            let bytes = req.into_body().collect().await?.to_bytes();
            let review: Review = match serde_json::from_reader(bytes.reader()) {
                Ok(review) => review,
                Err(error) => {
                    warn!(%error, "Failed to parse request body");
                    return json_response(AdmissionResponse::invalid(error).into_review());
                }
            };
            trace!(?review);

            let rsp = match review.try_into() {
                Ok(req) => {
                    debug!(?req);
                    admission.admit(req)
                }
                Err(error) => {
                    warn!(%error, "Invalid admission request");
                    AdmissionResponse::invalid(error)
                }
            };
            debug!(?rsp);
            json_response(rsp.into_review())
        })
    }
}

impl Admission {
    pub fn new() -> Self {
        Self {}
    }

    fn admit(self, req: AdmissionRequest) -> AdmissionResponse {
        let rsp = AdmissionResponse::from(&req);

        let Some(pod) = req.object.as_ref() else {
            return rsp;
        };

        if !eligible(pod) || has_tap_label(pod) {
            return rsp;
        }

        let ns = pod.metadata.namespace.as_deref().unwrap_or_default();
        let name = pod.metadata.name.as_deref().unwrap_or_default();
        let patch = match tap_label_patch(pod) {
            Ok(patch) => patch,
            Err(error) => {
                warn!(%error, %ns, %name, "Failed to encode tap label patch");
                return rsp;
            }
        };
        match rsp.clone().with_patch(patch) {
            Ok(patched) => {
                info!(%ns, %name, "Enabling tap");
                patched
            }
            Err(error) => {
                warn!(%error, %ns, %name, "Failed to encode tap label patch");
                rsp
            }
        }
    }
}

/// A pod is patched only when the mesh proxy was injected and tapping was
/// not explicitly disabled.
fn eligible(pod: &k8s::Pod) -> bool {
    let meshed = pod
        .metadata
        .labels
        .as_ref()
        .is_some_and(|labels| labels.contains_key(CONTROL_PLANE_NS_LABEL));
    let disabled = pod
        .metadata
        .annotations
        .as_ref()
        .and_then(|anns| anns.get(DISABLE_TAP_ANNOTATION))
        .is_some_and(|v| v.parse().unwrap_or(false));
    meshed && !disabled
}

fn has_tap_label(pod: &k8s::Pod) -> bool {
    pod.metadata
        .labels
        .as_ref()
        .is_some_and(|labels| labels.contains_key(TAP_ENABLED_LABEL))
}

/// An RFC 6902 patch adding the tap-enabled label ('/' in the label key is
/// escaped as `~1` per JSON-pointer rules).
fn tap_label_patch(pod: &k8s::Pod) -> Result<json_patch::Patch, serde_json::Error> {
    let mut ops = Vec::with_capacity(2);
    if pod.metadata.labels.is_none() {
        ops.push(serde_json::json!({
            "op": "add",
            "path": "/metadata/labels",
            "value": {},
        }));
    }
    let path = format!("/metadata/labels/{}", TAP_ENABLED_LABEL.replace('/', "~1"));
    ops.push(serde_json::json!({
        "op": "add",
        "path": path,
        "value": "true",
    }));
    serde_json::from_value(serde_json::Value::Array(ops))
}

fn json_response(rsp: AdmissionReview) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(&rsp)?;
    Ok(Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("admission review response must be valid"))
}
