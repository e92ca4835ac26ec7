//! The per-pod observe loop.
//!
//! Each tapped pod gets one task running this loop. Event volume is bounded
//! per pod with a windowed budget: at most one `Observe` RPC is issued per
//! window, each RPC is limited to the window's event budget, and the loop
//! sleeps out the remainder of the window before asking for more. The
//! average rate never exceeds the pod's share of the request's `max_rps`
//! and a single window never bursts more than `limit` events.

use crate::metrics::TapMetrics;
use linkerd2_proxy_api::tap::{tap_client::TapClient, ObserveRequest, TapEvent};
use tokio::{sync::mpsc, time};
use tokio_util::sync::CancellationToken;

pub(crate) const TAP_WINDOW: time::Duration = time::Duration::from_secs(10);

const CONNECT_TIMEOUT: time::Duration = time::Duration::from_secs(3);

/// The per-window event budget for a pod's share of the request rate.
pub(crate) fn window_limit(per_pod_rps: f32) -> u32 {
    (per_pod_rps * TAP_WINDOW.as_secs_f32()).round().max(1.0) as u32
}

/// Streams observed events from a single proxy until cancelled or the
/// transport fails.
///
/// Failures end this pod's contribution to the tap without affecting its
/// siblings, so errors are logged rather than propagated.
pub(crate) async fn observe_pod(
    token: CancellationToken,
    target: String,
    require_id: Option<String>,
    request: ObserveRequest,
    tx: mpsc::Sender<TapEvent>,
    metrics: TapMetrics,
) {
    let channel = tokio::select! {
        _ = token.cancelled() => return,
        res = connect(&target) => match res {
            Ok(channel) => channel,
            Err(error) => {
                tracing::warn!(%error, %target, "Failed to dial proxy");
                return;
            }
        },
    };
    let mut client = TapClient::new(channel);
    let limit = request.limit;

    loop {
        let window_start = time::Instant::now();

        let mut rpc = tonic::Request::new(request.clone());
        if let Some(id) = require_id.as_deref() {
            match id.parse() {
                Ok(value) => {
                    rpc.metadata_mut().insert("l5d-require-id", value);
                }
                Err(error) => tracing::warn!(%error, %id, "Invalid identity header value"),
            }
        }

        metrics.observe_rpc();
        let rsp = tokio::select! {
            _ = token.cancelled() => return,
            rsp = client.observe(rpc) => rsp,
        };
        let mut stream = match rsp {
            Ok(rsp) => rsp.into_inner(),
            Err(status) => {
                tracing::warn!(%status, %target, "Observe RPC failed");
                return;
            }
        };

        let mut forwarded = 0;
        while forwarded < limit {
            let msg = tokio::select! {
                _ = token.cancelled() => return,
                msg = stream.message() => msg,
            };
            match msg {
                Ok(Some(event)) => {
                    let sent = tokio::select! {
                        _ = token.cancelled() => return,
                        sent = tx.send(event) => sent,
                    };
                    if sent.is_err() {
                        return;
                    }
                    metrics.event_forwarded();
                    forwarded += 1;
                }
                Ok(None) => break,
                Err(status) => {
                    tracing::warn!(%status, %target, "Tap stream failed");
                    return;
                }
            }
        }
        drop(stream);

        tokio::select! {
            _ = token.cancelled() => return,
            _ = time::sleep_until(window_start + TAP_WINDOW) => {}
        }
    }
}

async fn connect(target: &str) -> anyhow::Result<tonic::transport::Channel> {
    let channel = tonic::transport::Endpoint::from_shared(target.to_string())?
        .connect_timeout(CONNECT_TIMEOUT)
        .connect()
        .await?;
    Ok(channel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_limits_never_starve() {
        // A fractional share still yields one event per window.
        assert_eq!(window_limit(0.01), 1);
        assert_eq!(window_limit(0.1), 1);
    }

    #[test]
    fn window_limits_scale_with_rate() {
        assert_eq!(window_limit(1.0), 10);
        assert_eq!(window_limit(12.5), 125);
        assert_eq!(window_limit(100.0), 1000);
    }
}
