use crate::{CONTROL_PLANE_NS_LABEL, DISABLE_TAP_ANNOTATION};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use futures::prelude::*;
use linkerd_tap_controller_k8s_api::{self as k8s, watcher, ResourceExt};
use parking_lot::RwLock;
use std::{collections::BTreeMap, net::IpAddr, sync::Arc};
use tracing::info_span;

pub type SharedIndex = Arc<RwLock<Index>>;

/// (namespace, pod name)
type PodKey = (String, String);

/// Holds all indexing state. Owned and updated by the watch tasks,
/// publishing results through the shared handle for lookups by the API
/// server.
#[derive(Debug, Default)]
pub struct Index {
    namespaces: HashMap<String, Namespace>,

    /// Maps a pod IP to every pod that has reported it. At most one of the
    /// pods is running; the rest are terminal pods retained until the
    /// cluster deletes them.
    pod_ips: HashMap<IpAddr, HashSet<PodKey>>,

    /// Cached node internal IPs.
    nodes: HashMap<String, Vec<IpAddr>>,
    node_ips: HashMap<IpAddr, String>,
}

/// Holds pod and intermediate-owner indices for a single namespace.
#[derive(Debug, Default)]
struct Namespace {
    pods: HashMap<String, Pod>,

    /// Controller owners of ReplicaSets and Jobs, so that pod ownership can
    /// be walked up to Deployments and CronJobs.
    replicasets: HashMap<String, Option<OwnerRef>>,
    jobs: HashMap<String, Option<OwnerRef>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct OwnerRef {
    pub kind: String,
    pub name: String,
}

#[derive(Debug)]
pub(crate) struct Pod {
    pub labels: k8s::Labels,
    pub phase: String,
    pub ip: Option<IpAddr>,
    pub service_account: String,
    pub owner: Option<OwnerRef>,
    pub tap_disabled: bool,

    /// The latest container `FinishedAt` time, set only once every container
    /// has terminated.
    pub terminated_at: Option<k8s::Time>,
}

// === impl Index ===

impl Index {
    pub fn shared() -> SharedIndex {
        Arc::new(RwLock::new(Self::default()))
    }

    /// Finds the single pod that owns an IP.
    ///
    /// Prefers the unique running pod. When no pod with the IP is running,
    /// falls back to the terminal pod that finished most recently. An IP
    /// claimed by two or more running pods is ambiguous and resolves to
    /// nothing.
    pub(crate) fn pod_for_ip(&self, ip: IpAddr) -> Option<(&str, &str, &Pod)> {
        let keys = self.pod_ips.get(&ip)?;

        let mut running = None;
        let mut terminal: Option<(&PodKey, &Pod)> = None;
        for key in keys {
            let Some(pod) = self
                .namespaces
                .get(&key.0)
                .and_then(|ns| ns.pods.get(&key.1))
            else {
                continue;
            };
            if pod.phase == "Running" {
                if running.is_some() {
                    return None;
                }
                running = Some((key, pod));
            } else if let Some(finished) = pod.terminated_at.as_ref() {
                let newer = match terminal {
                    Some((_, prior)) => prior.terminated_at.as_ref() < Some(finished),
                    None => true,
                };
                if newer {
                    terminal = Some((key, pod));
                }
            }
        }

        running
            .or(terminal)
            .map(|((ns, name), pod)| (ns.as_str(), name.as_str(), pod))
    }

    /// Builds the label set merged into an event's source metadata.
    pub fn ip_labels(&self, ip: IpAddr) -> Option<BTreeMap<String, String>> {
        if let Some((ns, name, pod)) = self.pod_for_ip(ip) {
            let mut labels = BTreeMap::new();
            labels.insert("namespace".to_string(), ns.to_string());
            labels.insert("pod".to_string(), name.to_string());
            labels.insert("serviceaccount".to_string(), pod.service_account.clone());
            if let Some(owner) = self.workload_owner(ns, pod) {
                labels.insert(owner.kind.to_ascii_lowercase(), owner.name);
            }
            return Some(labels);
        }

        let node = self.node_ips.get(&ip)?;
        let mut labels = BTreeMap::new();
        labels.insert("node".to_string(), node.clone());
        Some(labels)
    }

    /// The topmost controller of a pod: its direct owner, or the owner's
    /// owner when the pod is controlled through a ReplicaSet or Job.
    pub(crate) fn workload_owner(&self, namespace: &str, pod: &Pod) -> Option<OwnerRef> {
        let chain = self.owner_chain(namespace, pod);
        chain.into_iter().last()
    }

    /// The pod's controller owners, nearest first. The walk is bounded: a
    /// pod is at most `{CronJob,Deployment} -> {Job,ReplicaSet} -> Pod`
    /// deep, so two levels suffice.
    pub(crate) fn owner_chain(&self, namespace: &str, pod: &Pod) -> Vec<OwnerRef> {
        let mut chain = Vec::with_capacity(2);
        let Some(owner) = pod.owner.clone() else {
            return chain;
        };

        let grandparent = self.namespaces.get(namespace).and_then(|ns| {
            let indirect = match owner.kind.as_str() {
                "ReplicaSet" => ns.replicasets.get(&owner.name),
                "Job" => ns.jobs.get(&owner.name),
                _ => None,
            };
            indirect.cloned().flatten()
        });

        chain.push(owner);
        chain.extend(grandparent);
        chain
    }

    pub(crate) fn namespace(&self, namespace: &str) -> Option<&HashMap<String, Pod>> {
        self.namespaces.get(namespace).map(|ns| &ns.pods)
    }

    pub(crate) fn namespace_key_value(
        &self,
        namespace: &str,
    ) -> Option<(&str, &HashMap<String, Pod>)> {
        self.namespaces
            .get_key_value(namespace)
            .map(|(ns, ns_entry)| (ns.as_str(), &ns_entry.pods))
    }

    pub(crate) fn namespaces(&self) -> impl Iterator<Item = (&String, &HashMap<String, Pod>)> {
        self.namespaces.iter().map(|(name, ns)| (name, &ns.pods))
    }

    pub(crate) fn apply_node(&mut self, node: k8s::Node) {
        let name = node.name_unchecked();
        let _span = info_span!("apply", %name).entered();

        let ips = node
            .status
            .iter()
            .flat_map(|status| status.addresses.iter().flatten())
            .filter(|addr| addr.type_ == "InternalIP")
            .filter_map(|addr| match addr.address.parse::<IpAddr>() {
                Ok(ip) => Some(ip),
                Err(error) => {
                    tracing::warn!(%error, address = %addr.address, "Invalid node address");
                    None
                }
            })
            .collect::<Vec<_>>();

        if let Some(prior) = self.nodes.insert(name.clone(), ips.clone()) {
            for ip in prior {
                self.node_ips.remove(&ip);
            }
        }
        for ip in ips {
            self.node_ips.insert(ip, name.clone());
        }
    }

    pub(crate) fn delete_node(&mut self, name: &str) {
        tracing::debug!(%name, "delete");
        if let Some(ips) = self.nodes.remove(name) {
            for ip in ips {
                self.node_ips.remove(&ip);
            }
        }
    }

    fn unlink_pod_ip(&mut self, ip: IpAddr, key: &PodKey) {
        if let Some(keys) = self.pod_ips.get_mut(&ip) {
            keys.remove(key);
            if keys.is_empty() {
                self.pod_ips.remove(&ip);
            }
        }
    }

    fn drop_namespace_if_empty(&mut self, namespace: &str) {
        if let Some(ns) = self.namespaces.get(namespace) {
            if ns.pods.is_empty() && ns.replicasets.is_empty() && ns.jobs.is_empty() {
                tracing::debug!(%namespace, "Removing empty namespace index");
                self.namespaces.remove(namespace);
            }
        }
    }
}

impl kubert::index::IndexNamespacedResource<k8s::Pod> for Index {
    fn apply(&mut self, pod: k8s::Pod) {
        let namespace = pod.namespace().unwrap();
        let name = pod.name_unchecked();
        let _span = info_span!("apply", ns = %namespace, %name).entered();

        let meta = Pod::from_resource(&pod);
        let ip = meta.ip;
        let key = (namespace.clone(), name.clone());

        let ns = self.namespaces.entry(namespace).or_default();
        let prior_ip = ns.pods.insert(name, meta).and_then(|prior| prior.ip);

        if prior_ip != ip {
            if let Some(prior) = prior_ip {
                self.unlink_pod_ip(prior, &key);
            }
        }
        if let Some(ip) = ip {
            self.pod_ips.entry(ip).or_default().insert(key);
        }
    }

    fn delete(&mut self, ns: String, name: String) {
        tracing::debug!(%ns, %name, "delete");
        let key = (ns.clone(), name.clone());
        let ip = self
            .namespaces
            .get_mut(&ns)
            .and_then(|ns| ns.pods.remove(&name))
            .and_then(|pod| pod.ip);
        if let Some(ip) = ip {
            self.unlink_pod_ip(ip, &key);
        }
        self.drop_namespace_if_empty(&ns);
    }
}

impl kubert::index::IndexNamespacedResource<k8s::ReplicaSet> for Index {
    fn apply(&mut self, rs: k8s::ReplicaSet) {
        let namespace = rs.namespace().unwrap();
        let name = rs.name_unchecked();
        let _span = info_span!("apply", ns = %namespace, %name).entered();

        let owner = controller_owner(&rs.metadata);
        self.namespaces
            .entry(namespace)
            .or_default()
            .replicasets
            .insert(name, owner);
    }

    fn delete(&mut self, ns: String, name: String) {
        tracing::debug!(%ns, %name, "delete");
        if let Some(namespace) = self.namespaces.get_mut(&ns) {
            namespace.replicasets.remove(&name);
        }
        self.drop_namespace_if_empty(&ns);
    }
}

impl kubert::index::IndexNamespacedResource<k8s::Job> for Index {
    fn apply(&mut self, job: k8s::Job) {
        let namespace = job.namespace().unwrap();
        let name = job.name_unchecked();
        let _span = info_span!("apply", ns = %namespace, %name).entered();

        let owner = controller_owner(&job.metadata);
        self.namespaces
            .entry(namespace)
            .or_default()
            .jobs
            .insert(name, owner);
    }

    fn delete(&mut self, ns: String, name: String) {
        tracing::debug!(%ns, %name, "delete");
        if let Some(namespace) = self.namespaces.get_mut(&ns) {
            namespace.jobs.remove(&name);
        }
        self.drop_namespace_if_empty(&ns);
    }
}

/// Applies node watch events to the shared index.
///
/// Nodes are cluster-scoped, so they cannot go through
/// `kubert::index::namespaced` like the other watches.
pub async fn node_index(
    index: SharedIndex,
    events: impl Stream<Item = watcher::Event<k8s::Node>>,
) {
    tokio::pin!(events);
    while let Some(event) = events.next().await {
        match event {
            watcher::Event::Apply(node) | watcher::Event::InitApply(node) => {
                index.write().apply_node(node)
            }
            watcher::Event::Delete(node) => {
                let name = node.name_unchecked();
                index.write().delete_node(&name)
            }
            watcher::Event::Init | watcher::Event::InitDone => {}
        }
    }
}

// === impl Pod ===

impl Pod {
    fn from_resource(pod: &k8s::Pod) -> Self {
        let status = pod.status.as_ref();
        let phase = status
            .and_then(|s| s.phase.clone())
            .unwrap_or_default();
        let ip = status
            .and_then(|s| s.pod_ip.as_deref())
            .and_then(|ip| match ip.parse() {
                Ok(ip) => Some(ip),
                Err(error) => {
                    tracing::warn!(%error, %ip, "Invalid pod IP");
                    None
                }
            });
        let service_account = pod
            .spec
            .as_ref()
            .and_then(|s| s.service_account_name.clone())
            .unwrap_or_default();

        Self {
            labels: pod.metadata.labels.clone().into(),
            phase,
            ip,
            service_account,
            owner: controller_owner(&pod.metadata),
            tap_disabled: tap_disabled(&pod.metadata),
            terminated_at: terminated_at(status),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.phase == "Running"
    }

    pub(crate) fn is_meshed(&self) -> bool {
        self.labels.contains_key(CONTROL_PLANE_NS_LABEL)
    }
}

fn controller_owner(meta: &k8s::ObjectMeta) -> Option<OwnerRef> {
    meta.owner_references
        .iter()
        .flatten()
        .find(|o| o.controller == Some(true))
        .map(|o| OwnerRef {
            kind: o.kind.clone(),
            name: o.name.clone(),
        })
}

fn tap_disabled(meta: &k8s::ObjectMeta) -> bool {
    match meta
        .annotations
        .as_ref()
        .and_then(|anns| anns.get(DISABLE_TAP_ANNOTATION))
    {
        None => false,
        Some(value) => value.parse().unwrap_or_else(|error| {
            tracing::warn!(%error, %value, "Invalid disable-tap annotation value");
            false
        }),
    }
}

/// A pod's termination time is the latest of its containers' `FinishedAt`
/// times, defined only once every container has terminated.
fn terminated_at(status: Option<&k8s::PodStatus>) -> Option<k8s::Time> {
    let containers = status?.container_statuses.as_ref()?;
    if containers.is_empty() {
        return None;
    }

    let mut latest: Option<k8s::Time> = None;
    for container in containers {
        let terminated = container
            .state
            .as_ref()
            .and_then(|state| state.terminated.as_ref())?;
        if let Some(finished) = terminated.finished_at.clone() {
            if latest.as_ref() < Some(&finished) {
                latest = Some(finished);
            }
        }
    }
    latest
}
