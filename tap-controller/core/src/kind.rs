/// The set of resource kinds a tap request may name.
///
/// Kind names appear in three places that must agree: the `type` field of a
/// wire `Resource`, the plural path segment of the watch URL, and the
/// destination-label keys attached to proxy matches. All three go through
/// this type so the mapping exists exactly once.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    CronJob,
    DaemonSet,
    Deployment,
    Job,
    Namespace,
    Pod,
    ReplicaSet,
    ReplicationController,
    Service,
    StatefulSet,
}

#[derive(Debug, thiserror::Error)]
#[error("unimplemented resource type: {0}")]
pub struct UnknownResourceKind(pub String);

impl ResourceKind {
    /// The canonical singular name, as used for destination labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CronJob => "cronjob",
            Self::DaemonSet => "daemonset",
            Self::Deployment => "deployment",
            Self::Job => "job",
            Self::Namespace => "namespace",
            Self::Pod => "pod",
            Self::ReplicaSet => "replicaset",
            Self::ReplicationController => "replicationcontroller",
            Self::Service => "service",
            Self::StatefulSet => "statefulset",
        }
    }

    /// The plural name, as used in watch URL path segments.
    pub fn plural(&self) -> &'static str {
        match self {
            Self::CronJob => "cronjobs",
            Self::DaemonSet => "daemonsets",
            Self::Deployment => "deployments",
            Self::Job => "jobs",
            Self::Namespace => "namespaces",
            Self::Pod => "pods",
            Self::ReplicaSet => "replicasets",
            Self::ReplicationController => "replicationcontrollers",
            Self::Service => "services",
            Self::StatefulSet => "statefulsets",
        }
    }

    /// The owner-reference `kind` emitted by the API server for this type.
    pub fn owner_ref_kind(&self) -> &'static str {
        match self {
            Self::CronJob => "CronJob",
            Self::DaemonSet => "DaemonSet",
            Self::Deployment => "Deployment",
            Self::Job => "Job",
            Self::Namespace => "Namespace",
            Self::Pod => "Pod",
            Self::ReplicaSet => "ReplicaSet",
            Self::ReplicationController => "ReplicationController",
            Self::Service => "Service",
            Self::StatefulSet => "StatefulSet",
        }
    }

    const ALL: [Self; 10] = [
        Self::CronJob,
        Self::DaemonSet,
        Self::Deployment,
        Self::Job,
        Self::Namespace,
        Self::Pod,
        Self::ReplicaSet,
        Self::ReplicationController,
        Self::Service,
        Self::StatefulSet,
    ];

    pub fn from_plural(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.plural() == s)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = UnknownResourceKind;

    /// Accepts canonical singular names, plural names, and the usual
    /// kubectl short names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(k) = Self::ALL.iter().copied().find(|k| k.as_str() == s) {
            return Ok(k);
        }
        if let Some(k) = Self::from_plural(s) {
            return Ok(k);
        }
        match s {
            "cj" => Ok(Self::CronJob),
            "ds" => Ok(Self::DaemonSet),
            "deploy" => Ok(Self::Deployment),
            "ns" => Ok(Self::Namespace),
            "po" => Ok(Self::Pod),
            "rs" => Ok(Self::ReplicaSet),
            "rc" => Ok(Self::ReplicationController),
            "svc" => Ok(Self::Service),
            "sts" => Ok(Self::StatefulSet),
            _ => Err(UnknownResourceKind(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_singular_plural_and_short_names() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.as_str().parse::<ResourceKind>().unwrap(), kind);
            assert_eq!(kind.plural().parse::<ResourceKind>().unwrap(), kind);
        }
        assert_eq!("deploy".parse::<ResourceKind>().unwrap(), ResourceKind::Deployment);
        assert_eq!("po".parse::<ResourceKind>().unwrap(), ResourceKind::Pod);
        assert_eq!("sts".parse::<ResourceKind>().unwrap(), ResourceKind::StatefulSet);
    }

    #[test]
    fn rejects_unknown_kinds() {
        let err = "bad-type".parse::<ResourceKind>().unwrap_err();
        assert_eq!(err.to_string(), "unimplemented resource type: bad-type");
    }
}
