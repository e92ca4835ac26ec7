use crate::{ResourceKind, TapError};
use std::{collections::BTreeMap, net::IpAddr};

/// A resolved target of a tap request.
///
/// An empty `name` selects every matching resource in `namespace`; an empty
/// `namespace` widens the selection to all namespaces (where the kind allows
/// it).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TapTarget {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
    /// An equality-based label selector string, e.g. `app=voting,tier=web`.
    pub label_selector: Option<String>,
}

impl std::fmt::Display for TapTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}/{}", self.kind, self.name)
        }
    }
}

/// A single pod eligible for tapping, as produced by the resolver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TapPod {
    pub namespace: String,
    pub name: String,
    pub ip: IpAddr,
    /// May be empty when the pod runs under the default service account
    /// without an explicit name.
    pub service_account: String,
}

/// Resolves a tap target to the concrete set of pods to observe.
#[async_trait::async_trait]
pub trait DiscoverTapPods {
    async fn resolve(&self, target: &TapTarget) -> Result<Vec<TapPod>, TapError>;
}

/// Looks up workload metadata for an event's source IP.
///
/// Lookups are synchronous snapshots of the pod cache; absence is not an
/// error and an ambiguous IP (shared by several running pods) returns
/// nothing so that callers do not attach misleading metadata.
pub trait HydrateIp {
    fn ip_labels(&self, ip: IpAddr) -> Option<BTreeMap<String, String>>;
}
