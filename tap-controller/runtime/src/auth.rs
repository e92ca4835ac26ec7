//! Loads the cluster's extension API server authentication configuration.
//!
//! The kube-system `extension-apiserver-authentication` configmap names the
//! CA that signs aggregated-API client certificates and the certificate
//! names permitted to call us. The configmap must exist at startup; after
//! that a background task republishes it periodically so certificate
//! rotations are picked up without a restart. Publication is
//! single-writer/many-readers over a watch channel.

use crate::k8s;
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tokio::sync::watch;

pub const AUTH_CONFIGMAP_NAMESPACE: &str = "kube-system";
pub const AUTH_CONFIGMAP_NAME: &str = "extension-apiserver-authentication";

const REFRESH_INTERVAL: tokio::time::Duration = tokio::time::Duration::from_secs(300);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthConfig {
    /// PEM bundle for the client certificate authority.
    pub client_ca_pem: String,

    /// Certificate common names permitted to call the API server. Empty
    /// means any authenticated client is permitted.
    pub allowed_names: Vec<String>,

    pub username_header: String,
    pub group_header: String,
}

// === impl AuthConfig ===

impl AuthConfig {
    fn from_configmap(cm: &k8s::ConfigMap) -> Result<Self> {
        let data = cm
            .data
            .as_ref()
            .ok_or_else(|| anyhow!("{AUTH_CONFIGMAP_NAME} has no data"))?;

        let client_ca_pem = data
            .get("requestheader-client-ca-file")
            .cloned()
            .ok_or_else(|| anyhow!("{AUTH_CONFIGMAP_NAME} has no requestheader-client-ca-file"))?;

        let allowed_names = json_list(data.get("requestheader-allowed-names"))
            .context("invalid requestheader-allowed-names")?;
        let username_header = json_list(data.get("requestheader-username-headers"))
            .context("invalid requestheader-username-headers")?
            .into_iter()
            .next()
            .unwrap_or_default();
        let group_header = json_list(data.get("requestheader-group-headers"))
            .context("invalid requestheader-group-headers")?
            .into_iter()
            .next()
            .unwrap_or_default();

        Ok(Self {
            client_ca_pem,
            allowed_names,
            username_header,
            group_header,
        })
    }
}

fn json_list(value: Option<&String>) -> Result<Vec<String>> {
    match value {
        None => Ok(vec![]),
        Some(raw) if raw.is_empty() => Ok(vec![]),
        Some(raw) => serde_json::from_str(raw).map_err(Into::into),
    }
}

/// Fetches the authentication configmap. An absent configmap is fatal at
/// startup.
pub async fn load(client: &k8s::Client) -> Result<Arc<AuthConfig>> {
    let api = k8s::Api::<k8s::ConfigMap>::namespaced(client.clone(), AUTH_CONFIGMAP_NAMESPACE);
    let cm = api.get(AUTH_CONFIGMAP_NAME).await.with_context(|| {
        format!("failed to read configmap {AUTH_CONFIGMAP_NAMESPACE}/{AUTH_CONFIGMAP_NAME}")
    })?;
    Ok(Arc::new(AuthConfig::from_configmap(&cm)?))
}

/// Periodically reloads the configmap, publishing changed values. Load
/// failures are transient: the previous configuration stays in effect.
pub async fn refresh(client: k8s::Client, tx: watch::Sender<Arc<AuthConfig>>) {
    let mut interval = tokio::time::interval(REFRESH_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; the initial value was already
    // published by the caller.
    interval.tick().await;

    loop {
        interval.tick().await;
        match load(&client).await {
            Ok(config) => {
                if *tx.borrow() != config {
                    tracing::info!("Authentication configuration changed");
                    if tx.send(config).is_err() {
                        return;
                    }
                }
            }
            Err(error) => {
                tracing::warn!(%error, "Failed to refresh authentication configuration");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    fn mk_configmap(data: std::collections::BTreeMap<String, String>) -> k8s::ConfigMap {
        k8s::ConfigMap {
            metadata: k8s::ObjectMeta {
                namespace: Some(AUTH_CONFIGMAP_NAMESPACE.to_string()),
                name: Some(AUTH_CONFIGMAP_NAME.to_string()),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        }
    }

    #[test]
    fn parses_a_complete_configmap() {
        let cm = mk_configmap(btreemap! {
            "requestheader-client-ca-file".to_string() => "---PEM---".to_string(),
            "requestheader-allowed-names".to_string() =>
                r#"["front-proxy-client","kube-apiserver-proxy"]"#.to_string(),
            "requestheader-username-headers".to_string() => r#"["X-Remote-User"]"#.to_string(),
            "requestheader-group-headers".to_string() => r#"["X-Remote-Group"]"#.to_string(),
        });

        let config = AuthConfig::from_configmap(&cm).unwrap();
        assert_eq!(config.client_ca_pem, "---PEM---");
        assert_eq!(
            config.allowed_names,
            vec!["front-proxy-client".to_string(), "kube-apiserver-proxy".to_string()]
        );
        assert_eq!(config.username_header, "X-Remote-User");
        assert_eq!(config.group_header, "X-Remote-Group");
    }

    #[test]
    fn empty_allowed_names_allow_any_client() {
        let cm = mk_configmap(btreemap! {
            "requestheader-client-ca-file".to_string() => "---PEM---".to_string(),
        });
        let config = AuthConfig::from_configmap(&cm).unwrap();
        assert!(config.allowed_names.is_empty());
        assert_eq!(config.username_header, "");
    }

    #[test]
    fn missing_client_ca_is_an_error() {
        let cm = mk_configmap(btreemap! {
            "requestheader-allowed-names".to_string() => "[]".to_string(),
        });
        assert!(AuthConfig::from_configmap(&cm).is_err());
    }

    #[test]
    fn malformed_name_lists_are_errors() {
        let cm = mk_configmap(btreemap! {
            "requestheader-client-ca-file".to_string() => "---PEM---".to_string(),
            "requestheader-allowed-names".to_string() => "front-proxy-client".to_string(),
        });
        assert!(AuthConfig::from_configmap(&cm).is_err());
    }
}
