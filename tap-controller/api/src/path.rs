//! The watch URL grammar.
//!
//! ```text
//! /apis/tap.linkerd.io/v1alpha1/watch/namespaces/{ns}/tap
//! /apis/tap.linkerd.io/v1alpha1/watch/namespaces/{ns}/{kindPlural}/{name}/tap
//! ```
//!
//! The first form names a namespace target. Path segments are
//! percent-encoded when a path is built and decoded when one is parsed;
//! kind pluralization goes through [`ResourceKind`] so clients and the
//! server cannot drift.

use linkerd_tap_controller_core::{ResourceKind, TapTarget};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

pub const API_GROUP: &str = "tap.linkerd.io";
pub const API_VERSION: &str = "v1alpha1";

/// Everything a URL path segment must escape beyond controls.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("not a tap watch path: {0}")]
    NotTap(String),

    #[error("unimplemented resource type: {0}")]
    UnknownKind(String),

    #[error("path segment is not valid UTF-8 after unescaping")]
    Escape,
}

/// Builds the watch path for a target.
pub fn tap_path(kind: ResourceKind, namespace: &str, name: &str) -> String {
    let prefix = format!("/apis/{API_GROUP}/{API_VERSION}/watch/namespaces");
    match kind {
        ResourceKind::Namespace => format!("{prefix}/{}/tap", escape(name)),
        kind => format!(
            "{prefix}/{}/{}/{}/tap",
            escape(namespace),
            kind.plural(),
            escape(name)
        ),
    }
}

/// Parses a request path into a target selector.
///
/// The label selector is never carried in the URL; callers merge it from
/// the request body.
pub fn parse_tap_path(path: &str) -> Result<TapTarget, PathError> {
    let not_tap = || PathError::NotTap(path.to_string());

    let rest = path
        .strip_prefix(&format!("/apis/{API_GROUP}/{API_VERSION}/watch/"))
        .ok_or_else(not_tap)?;
    let segments = rest.split('/').collect::<Vec<_>>();

    match *segments.as_slice() {
        ["namespaces", ns, "tap"] => Ok(TapTarget {
            kind: ResourceKind::Namespace,
            namespace: String::new(),
            name: unescape(ns)?,
            label_selector: None,
        }),
        ["namespaces", ns, plural, name, "tap"] => {
            let plural = unescape(plural)?;
            let kind = ResourceKind::from_plural(&plural)
                .ok_or(PathError::UnknownKind(plural))?;
            Ok(TapTarget {
                kind,
                namespace: unescape(ns)?,
                name: unescape(name)?,
                label_selector: None,
            })
        }
        _ => Err(not_tap()),
    }
}

fn escape(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

fn unescape(segment: &str) -> Result<String, PathError> {
    percent_decode_str(segment)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| PathError::Escape)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_targets_use_the_short_form() {
        let path = tap_path(ResourceKind::Namespace, "", "emojivoto");
        assert_eq!(path, "/apis/tap.linkerd.io/v1alpha1/watch/namespaces/emojivoto/tap");

        let target = parse_tap_path(&path).unwrap();
        assert_eq!(target.kind, ResourceKind::Namespace);
        assert_eq!(target.name, "emojivoto");
        assert_eq!(target.namespace, "");
    }

    #[test]
    fn workload_targets_round_trip() {
        let path = tap_path(ResourceKind::Deployment, "emojivoto", "web");
        assert_eq!(
            path,
            "/apis/tap.linkerd.io/v1alpha1/watch/namespaces/emojivoto/deployments/web/tap"
        );

        let target = parse_tap_path(&path).unwrap();
        assert_eq!(target.kind, ResourceKind::Deployment);
        assert_eq!(target.namespace, "emojivoto");
        assert_eq!(target.name, "web");
    }

    #[test]
    fn segments_are_escaped_and_unescaped() {
        let path = tap_path(ResourceKind::Pod, "emojivoto", "emoji 1/2");
        assert!(path.contains("emoji%201%2F2"));

        let target = parse_tap_path(&path).unwrap();
        assert_eq!(target.name, "emoji 1/2");
    }

    #[test]
    fn unknown_plurals_are_rejected() {
        let err = parse_tap_path(
            "/apis/tap.linkerd.io/v1alpha1/watch/namespaces/ns/widgets/x/tap",
        )
        .unwrap_err();
        assert!(matches!(err, PathError::UnknownKind(p) if p == "widgets"));
    }

    #[test]
    fn unrelated_paths_are_rejected() {
        assert!(parse_tap_path("/healthz").is_err());
        assert!(parse_tap_path("/apis/tap.linkerd.io/v1alpha1/watch/pods/x/tap").is_err());
    }
}
