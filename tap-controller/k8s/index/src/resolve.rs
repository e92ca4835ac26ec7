//! Expands a tap target into the concrete set of pods to observe.
//!
//! Workload kinds are expanded by walking pod owner references upward
//! (Pod -> ReplicaSet -> Deployment, Pod -> Job -> CronJob) against the
//! indexed intermediate owners; a pod belongs to a target when the target
//! appears anywhere on its (bounded) owner chain.

use crate::index::Index;
use linkerd_tap_controller_core::{ResourceKind, TapError, TapPod, TapTarget};
use linkerd_tap_controller_k8s_api as k8s;

impl Index {
    pub fn resolve(&self, target: &TapTarget) -> Result<Vec<TapPod>, TapError> {
        let selector = target
            .label_selector
            .as_deref()
            .unwrap_or_default()
            .parse::<k8s::Selector>()
            .map_err(|error| TapError::invalid_argument(error.to_string()))?;

        let mut pods = self.expand(target)?;

        if !selector.selects_all() {
            pods.retain(|(_, _, pod)| selector.matches(&pod.labels));
        }

        // Pods that are not running, not meshed, or not yet addressable
        // cannot serve an observe stream.
        pods.retain(|(_, _, pod)| pod.is_running() && pod.is_meshed() && pod.ip.is_some());
        if pods.is_empty() {
            return Err(TapError::not_found(format!("no pods found for {target}")));
        }

        pods.retain(|(_, _, pod)| !pod.tap_disabled);
        if pods.is_empty() {
            return Err(TapError::not_found(format!(
                "all pods found for {target} have tapping disabled"
            )));
        }

        Ok(pods
            .into_iter()
            .filter_map(|(ns, name, pod)| {
                let ip = pod.ip?;
                Some(TapPod {
                    namespace: ns,
                    name,
                    ip,
                    service_account: pod.service_account.clone(),
                })
            })
            .collect())
    }

    fn expand(
        &self,
        target: &TapTarget,
    ) -> Result<Vec<(String, String, &crate::index::Pod)>, TapError> {
        match target.kind {
            ResourceKind::Service => Err(TapError::unimplemented(
                "a service cannot be tapped directly; services are only valid as a tap destination",
            )),

            ResourceKind::Namespace => Ok(self
                .pods_in(&target.name)
                .map(|(ns, name, pod)| (ns.to_string(), name.to_string(), pod))
                .collect()),

            ResourceKind::Pod if !target.name.is_empty() => {
                let pod = self
                    .namespace(&target.namespace)
                    .and_then(|pods| pods.get(&target.name))
                    .ok_or_else(|| {
                        TapError::not_found(format!("pod \"{}\" not found", target.name))
                    })?;
                Ok(vec![(target.namespace.clone(), target.name.clone(), pod)])
            }

            ResourceKind::Pod => Ok(self
                .pods_in(&target.namespace)
                .map(|(ns, name, pod)| (ns.to_string(), name.to_string(), pod))
                .collect()),

            kind => {
                let owner_kind = kind.owner_ref_kind();
                Ok(self
                    .pods_in(&target.namespace)
                    .filter(|(ns, _, pod)| {
                        self.owner_chain(ns, pod).iter().any(|owner| {
                            owner.kind == owner_kind
                                && (target.name.is_empty() || owner.name == target.name)
                        })
                    })
                    .map(|(ns, name, pod)| (ns.to_string(), name.to_string(), pod))
                    .collect())
            }
        }
    }

    /// All pods in a namespace, or in every namespace when `namespace` is
    /// empty.
    fn pods_in<'a>(
        &'a self,
        namespace: &str,
    ) -> Box<dyn Iterator<Item = (&'a str, &'a str, &'a crate::index::Pod)> + 'a> {
        if namespace.is_empty() {
            Box::new(self.namespaces().flat_map(|(ns, pods)| {
                pods.iter()
                    .map(move |(name, pod)| (ns.as_str(), name.as_str(), pod))
            }))
        } else {
            match self.namespace_key_value(namespace) {
                Some((ns, pods)) => {
                    Box::new(pods.iter().map(move |(name, pod)| (ns, name.as_str(), pod)))
                }
                None => Box::new(std::iter::empty()),
            }
        }
    }
}
