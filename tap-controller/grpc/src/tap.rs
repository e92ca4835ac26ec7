//! The tap aggregator.
//!
//! A tap request is validated, its match tree is translated to the proxy
//! contract, the target is resolved to pods, and one observe loop is
//! spawned per pod. Producers feed a bounded channel: when the client
//! drains slowly the producers block, throttling the proxies instead of
//! buffering or dropping. Dropping the returned stream cancels every
//! producer.

use crate::{event, metrics::TapMetrics, observe};
use futures::prelude::*;
use linkerd2_proxy_api::tap as proxy;
use linkerd_tap_controller_api::tap as api;
use linkerd_tap_controller_core::{
    DiscoverTapPods, HydrateIp, ResourceKind, TapError, TapPod, TapTarget,
};
use std::{collections::HashSet, net::SocketAddr, pin::Pin, sync::Arc};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

#[cfg(test)]
mod tests;

pub type TapEventStream = Pin<Box<dyn Stream<Item = Result<api::TapEvent, TapError>> + Send>>;

/// Bounds the fan-in buffer shared by all of a request's producers.
const TAP_BUFFER_CAPACITY: usize = 10_000;

#[derive(Clone, Debug)]
pub struct TapServer<D, H> {
    discover: D,
    hydrate: H,
    controller_namespace: Arc<str>,
    cluster_domain: Arc<str>,
    tap_port: u16,
    metrics: TapMetrics,
}

// === impl TapServer ===

impl<D, H> TapServer<D, H>
where
    D: DiscoverTapPods + Send + Sync + 'static,
    H: HydrateIp + Clone + Send + Sync + 'static,
{
    pub fn new(
        discover: D,
        hydrate: H,
        controller_namespace: impl Into<Arc<str>>,
        cluster_domain: impl Into<Arc<str>>,
        tap_port: u16,
        metrics: TapMetrics,
    ) -> Self {
        Self {
            discover,
            hydrate,
            controller_namespace: controller_namespace.into(),
            cluster_domain: cluster_domain.into(),
            tap_port,
            metrics,
        }
    }

    /// Starts a tap, returning the stream of translated events.
    ///
    /// Validation and resolution failures are returned before any event is
    /// produced; a started stream only ends when it is dropped, when every
    /// producer dies, or when an event fails translation.
    pub async fn tap_by_resource(
        &self,
        req: api::TapByResourceRequest,
    ) -> Result<TapEventStream, TapError> {
        let target = Self::check_target(&req)?;

        if !(req.max_rps > 0.0) {
            return Err(TapError::invalid_argument(format!(
                "TapByResource received invalid maxRps: {}",
                req.max_rps
            )));
        }

        let match_tree = req
            .r#match
            .as_ref()
            .ok_or_else(|| TapError::invalid_argument("TapByResource received nil match"))?;
        let observe_match = translate_match(match_tree)?;
        let extract_headers = wants_headers(&req);

        let pods = self.discover.resolve(&target).await?;

        let per_pod_rps = req.max_rps / pods.len() as f32;
        let limit = observe::window_limit(per_pod_rps);
        let observe_req = proxy::ObserveRequest {
            limit,
            r#match: Some(observe_match),
            extract: extract_headers.then(|| proxy::observe_request::Extract {
                extract: Some(proxy::observe_request::extract::Extract::Http(
                    proxy::observe_request::extract::Http {
                        extract: Some(proxy::observe_request::extract::http::Extract::Headers(
                            proxy::observe_request::extract::http::Headers {},
                        )),
                    },
                )),
            }),
        };

        tracing::debug!(%target, pods = pods.len(), limit, "Starting tap");
        let active = self.metrics.tap_started();
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(TAP_BUFFER_CAPACITY);
        for pod in &pods {
            let addr = SocketAddr::new(pod.ip, self.tap_port);
            tokio::spawn(
                observe::observe_pod(
                    token.child_token(),
                    format!("http://{addr}"),
                    self.expected_identity(&target, &pods, pod),
                    observe_req.clone(),
                    tx.clone(),
                    self.metrics.clone(),
                )
                .instrument(info_span!("pod", ns = %pod.namespace, pod = %pod.name)),
            );
        }
        drop(tx);

        let hydrate = self.hydrate.clone();
        let metrics = self.metrics.clone();
        let events = async_stream::stream! {
            // Held across the stream's lifetime: dropping the stream cancels
            // every producer and closes out the open-stream gauge.
            let _cancel = token.drop_guard();
            let _active = active;

            let mut rx = ReceiverStream::new(rx);
            while let Some(raw) = rx.next().await {
                yield event::translate(raw, &hydrate, extract_headers).map_err(|error| {
                    metrics.translate_failure();
                    error
                });
            }
        };
        Ok(Box::pin(events))
    }

    fn check_target(req: &api::TapByResourceRequest) -> Result<TapTarget, TapError> {
        let selection = req.target.as_ref().ok_or_else(|| {
            TapError::invalid_argument("TapByResource received nil target ResourceSelection")
        })?;
        let resource = selection.resource.as_ref().ok_or_else(|| {
            TapError::invalid_argument("TapByResource received nil target ResourceSelection")
        })?;
        let kind = resource
            .r#type
            .parse::<ResourceKind>()
            .map_err(|error| TapError::unimplemented(error.to_string()))?;

        Ok(TapTarget {
            kind,
            namespace: resource.namespace.clone(),
            name: resource.name.clone(),
            label_selector: (!selection.label_selector.is_empty())
                .then(|| selection.label_selector.clone()),
        })
    }

    /// The transport identity a proxy must present before it is tapped.
    ///
    /// Pod targets always pin to the pod's service account; namespace
    /// targets pin only when every resolved pod implies the same identity.
    /// Other kinds leave verification to the proxy's own policy.
    fn expected_identity(
        &self,
        target: &TapTarget,
        pods: &[TapPod],
        pod: &TapPod,
    ) -> Option<String> {
        match target.kind {
            ResourceKind::Pod => {
                Some(self.service_account_identity(&pod.namespace, &pod.service_account))
            }
            ResourceKind::Namespace => {
                let identities = pods
                    .iter()
                    .map(|p| (p.namespace.as_str(), p.service_account.as_str()))
                    .collect::<HashSet<_>>();
                (identities.len() == 1)
                    .then(|| self.service_account_identity(&pod.namespace, &pod.service_account))
            }
            _ => None,
        }
    }

    fn service_account_identity(&self, ns: &str, sa: &str) -> String {
        format!(
            "{}.{}.serviceaccount.identity.{}.{}",
            sa, ns, self.controller_namespace, self.cluster_domain
        )
    }
}

fn wants_headers(req: &api::TapByResourceRequest) -> bool {
    use api::tap_by_resource_request::extract;
    match req.extract.as_ref().and_then(|e| e.extract.as_ref()) {
        Some(extract::Extract::Http(http)) => {
            matches!(http.extract, Some(extract::http::Extract::Headers(_)))
        }
        None => false,
    }
}

/// Translates the public match tree into the proxy contract.
///
/// `all`, `destinations`, and `http` leaves are total; `any` and `not` are
/// not implemented and fail the request. The error text renders the
/// offending node and is not a stable contract.
fn translate_match(
    m: &api::tap_by_resource_request::Match,
) -> Result<proxy::observe_request::Match, TapError> {
    use api::tap_by_resource_request::r#match as pub_match;
    use proxy::observe_request::r#match as proxy_match;

    let m = m
        .r#match
        .as_ref()
        .ok_or_else(|| TapError::invalid_argument("match must contain a match variant"))?;

    let translated = match m {
        pub_match::Match::All(seq) => proxy_match::Match::All(translate_seq(seq)?),

        unexpected @ (pub_match::Match::Any(_) | pub_match::Match::Not(_)) => {
            return Err(TapError::unimplemented(format!(
                "unexpected match specified: {unexpected:?}"
            )))
        }

        pub_match::Match::Destinations(selection) => destination_labels(selection)?,

        pub_match::Match::Http(http) => translate_http(http)?,
    };
    Ok(proxy::observe_request::Match {
        r#match: Some(translated),
    })
}

fn translate_seq(
    seq: &api::tap_by_resource_request::r#match::Seq,
) -> Result<proxy::observe_request::r#match::Seq, TapError> {
    let matches = seq
        .matches
        .iter()
        .map(translate_match)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(proxy::observe_request::r#match::Seq { matches })
}

/// Expands a destination resource into label-equality leaves on the
/// destination's metadata: `{kind: name}` when a name is given, plus
/// `{namespace: ns}` for namespaced kinds.
fn destination_labels(
    selection: &api::ResourceSelection,
) -> Result<proxy::observe_request::r#match::Match, TapError> {
    use proxy::observe_request::r#match as proxy_match;

    let resource = selection.resource.as_ref().ok_or_else(|| {
        TapError::invalid_argument("destinations match must name a resource")
    })?;
    let kind = resource
        .r#type
        .parse::<ResourceKind>()
        .map_err(|error| TapError::unimplemented(error.to_string()))?;

    let mut matches = Vec::with_capacity(2);
    if !resource.name.is_empty() {
        matches.push(proxy::observe_request::Match {
            r#match: Some(proxy_match::Match::DestinationLabel(proxy_match::Label {
                key: kind.as_str().to_string(),
                value: resource.name.clone(),
            })),
        });
    }
    if kind != ResourceKind::Namespace && !resource.namespace.is_empty() {
        matches.push(proxy::observe_request::Match {
            r#match: Some(proxy_match::Match::DestinationLabel(proxy_match::Label {
                key: "namespace".to_string(),
                value: resource.namespace.clone(),
            })),
        });
    }

    Ok(proxy_match::Match::All(proxy_match::Seq { matches }))
}

fn translate_http(
    http: &api::tap_by_resource_request::r#match::Http,
) -> Result<proxy::observe_request::r#match::Match, TapError> {
    use api::tap_by_resource_request::r#match::http::Match as PubHttp;
    use proxy::observe_request::r#match::{self as proxy_match, http};

    let m = http
        .r#match
        .as_ref()
        .ok_or_else(|| TapError::invalid_argument("http match must contain a match variant"))?;

    let translated = match m {
        PubHttp::Scheme(scheme) => http::Match::Scheme(parse_scheme(scheme)),
        PubHttp::Method(method) => http::Match::Method(parse_method(method)),
        PubHttp::Authority(authority) => http::Match::Authority(http::StringMatch {
            r#match: Some(http::string_match::Match::Exact(authority.clone())),
        }),
        PubHttp::Path(path) => http::Match::Path(http::StringMatch {
            r#match: Some(http::string_match::Match::Prefix(path.clone())),
        }),
    };
    Ok(proxy_match::Match::Http(proxy_match::Http {
        r#match: Some(translated),
    }))
}

/// Maps a method string to the registered wire enum, uppercasing anything
/// unregistered.
fn parse_method(method: &str) -> linkerd2_proxy_api::http_types::HttpMethod {
    use linkerd2_proxy_api::http_types::{http_method, HttpMethod};

    let method = method.to_ascii_uppercase();
    let registered = match method.as_str() {
        "GET" => Some(http_method::Registered::Get),
        "POST" => Some(http_method::Registered::Post),
        "PUT" => Some(http_method::Registered::Put),
        "DELETE" => Some(http_method::Registered::Delete),
        "PATCH" => Some(http_method::Registered::Patch),
        "OPTIONS" => Some(http_method::Registered::Options),
        "CONNECT" => Some(http_method::Registered::Connect),
        "HEAD" => Some(http_method::Registered::Head),
        "TRACE" => Some(http_method::Registered::Trace),
        _ => None,
    };
    HttpMethod {
        r#type: Some(match registered {
            Some(r) => http_method::Type::Registered(r.into()),
            None => http_method::Type::Unregistered(method),
        }),
    }
}

fn parse_scheme(scheme: &str) -> linkerd2_proxy_api::http_types::Scheme {
    use linkerd2_proxy_api::http_types::{scheme, Scheme};

    let scheme = scheme.to_ascii_uppercase();
    let registered = match scheme.as_str() {
        "HTTP" => Some(scheme::Registered::Http),
        "HTTPS" => Some(scheme::Registered::Https),
        _ => None,
    };
    Scheme {
        r#type: Some(match registered {
            Some(r) => scheme::Type::Registered(r.into()),
            None => scheme::Type::Unregistered(scheme),
        }),
    }
}
