pub use linkerd_tap_controller_api as api;
pub use linkerd_tap_controller_core as core;
pub use linkerd_tap_controller_grpc as grpc;
pub use linkerd_tap_controller_k8s_api as k8s;
pub use linkerd_tap_controller_k8s_index as index;

mod admission;
mod apiserver;
mod args;
mod auth;

pub use self::args::Args;

/// Resolves tap targets against the shared cluster index.
#[derive(Clone, Debug)]
struct IndexDiscover(index::SharedIndex);

/// Answers source-IP hydration lookups against the shared cluster index.
#[derive(Clone, Debug)]
struct IndexHydrate(index::SharedIndex);

#[async_trait::async_trait]
impl core::DiscoverTapPods for IndexDiscover {
    async fn resolve(
        &self,
        target: &core::TapTarget,
    ) -> Result<Vec<core::TapPod>, core::TapError> {
        self.0.read().resolve(target)
    }
}

impl core::HydrateIp for IndexHydrate {
    fn ip_labels(
        &self,
        ip: std::net::IpAddr,
    ) -> Option<std::collections::BTreeMap<String, String>> {
        self.0.read().ip_labels(ip)
    }
}
