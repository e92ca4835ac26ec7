use super::*;
use std::{collections::BTreeMap, net::IpAddr};

#[derive(Clone)]
struct StaticPods(Vec<TapPod>);

#[async_trait::async_trait]
impl DiscoverTapPods for StaticPods {
    async fn resolve(&self, target: &TapTarget) -> Result<Vec<TapPod>, TapError> {
        if self.0.is_empty() {
            return Err(TapError::not_found(format!("no pods found for {target}")));
        }
        Ok(self.0.clone())
    }
}

#[derive(Clone)]
struct NoHydrate;

impl HydrateIp for NoHydrate {
    fn ip_labels(&self, _: IpAddr) -> Option<BTreeMap<String, String>> {
        None
    }
}

fn server(pods: Vec<TapPod>) -> TapServer<StaticPods, NoHydrate> {
    TapServer::new(
        StaticPods(pods),
        NoHydrate,
        "controller-ns",
        "cluster.local",
        1,
        TapMetrics::default(),
    )
}

fn pod(ns: &str, name: &str, sa: &str) -> TapPod {
    TapPod {
        namespace: ns.to_string(),
        name: name.to_string(),
        ip: "127.0.0.1".parse().unwrap(),
        service_account: sa.to_string(),
    }
}

fn match_all() -> api::tap_by_resource_request::Match {
    api::tap_by_resource_request::Match {
        r#match: Some(api::tap_by_resource_request::r#match::Match::All(
            api::tap_by_resource_request::r#match::Seq { matches: vec![] },
        )),
    }
}

fn request(kind: &str, ns: &str, name: &str) -> api::TapByResourceRequest {
    api::TapByResourceRequest {
        target: Some(api::ResourceSelection {
            resource: Some(api::Resource {
                r#type: kind.to_string(),
                namespace: ns.to_string(),
                name: name.to_string(),
            }),
            label_selector: String::new(),
        }),
        r#match: Some(match_all()),
        max_rps: 100.0,
        extract: None,
    }
}

#[tokio::test]
async fn rejects_nil_target() {
    let req = api::TapByResourceRequest {
        target: None,
        r#match: Some(match_all()),
        max_rps: 100.0,
        extract: None,
    };
    let err = server(vec![pod("emojivoto", "emoji-0", "default")])
        .tap_by_resource(req)
        .await
        .unwrap_err();
    assert!(matches!(&err, TapError::InvalidArgument(_)));
    assert_eq!(
        err.to_string(),
        "TapByResource received nil target ResourceSelection"
    );
}

#[tokio::test]
async fn rejects_unknown_resource_types() {
    let err = server(vec![pod("emojivoto", "x", "default")])
        .tap_by_resource(request("bad-type", "emojivoto", "x"))
        .await
        .unwrap_err();
    assert!(matches!(&err, TapError::Unimplemented(_)));
    assert_eq!(err.to_string(), "unimplemented resource type: bad-type");
}

#[tokio::test]
async fn rejects_any_match_roots() {
    let mut req = request("pod", "emojivoto", "emojivoto-meshed");
    req.r#match = Some(api::tap_by_resource_request::Match {
        r#match: Some(api::tap_by_resource_request::r#match::Match::Any(
            api::tap_by_resource_request::r#match::Seq { matches: vec![] },
        )),
    });
    let err = server(vec![pod("emojivoto", "emojivoto-meshed", "default")])
        .tap_by_resource(req)
        .await
        .unwrap_err();
    assert!(matches!(&err, TapError::Unimplemented(_)));
    assert!(err.to_string().starts_with("unexpected match specified"));
}

#[tokio::test]
async fn rejects_nested_not_matches() {
    let mut req = request("pod", "emojivoto", "emojivoto-meshed");
    req.r#match = Some(api::tap_by_resource_request::Match {
        r#match: Some(api::tap_by_resource_request::r#match::Match::All(
            api::tap_by_resource_request::r#match::Seq {
                matches: vec![api::tap_by_resource_request::Match {
                    r#match: Some(api::tap_by_resource_request::r#match::Match::Not(
                        Box::new(match_all()),
                    )),
                }],
            },
        )),
    });
    let err = server(vec![pod("emojivoto", "emojivoto-meshed", "default")])
        .tap_by_resource(req)
        .await
        .unwrap_err();
    assert!(matches!(&err, TapError::Unimplemented(_)));
}

#[tokio::test]
async fn rejects_non_positive_rates() {
    for rps in [0.0, -1.0] {
        let mut req = request("pod", "emojivoto", "emojivoto-meshed");
        req.max_rps = rps;
        let err = server(vec![pod("emojivoto", "emojivoto-meshed", "default")])
            .tap_by_resource(req)
            .await
            .unwrap_err();
        assert!(matches!(&err, TapError::InvalidArgument(_)));
    }
}

#[tokio::test]
async fn rejects_nil_matches() {
    let mut req = request("pod", "emojivoto", "emojivoto-meshed");
    req.r#match = None;
    let err = server(vec![pod("emojivoto", "emojivoto-meshed", "default")])
        .tap_by_resource(req)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "TapByResource received nil match");
}

#[tokio::test]
async fn resolver_errors_propagate() {
    let err = server(vec![])
        .tap_by_resource(request("pod", "emojivoto", "emojivoto-meshed"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "no pods found for pod/emojivoto-meshed");
}

#[tokio::test]
async fn stream_ends_when_every_producer_dies() {
    // Port 1 refuses connections, so the pod's producer exits immediately
    // and the stream completes without yielding.
    let mut stream = server(vec![pod("emojivoto", "emojivoto-meshed", "default")])
        .tap_by_resource(request("pod", "emojivoto", "emojivoto-meshed"))
        .await
        .unwrap();

    let next = tokio::time::timeout(std::time::Duration::from_secs(30), stream.next())
        .await
        .expect("stream must terminate once its only producer is gone");
    assert!(next.is_none());
}

// === Identity pinning ===

#[test]
fn pod_targets_pin_to_the_pod_identity() {
    let srv = server(vec![]);
    let target = TapTarget {
        kind: ResourceKind::Pod,
        namespace: "emojivoto".to_string(),
        name: "emoji-0".to_string(),
        label_selector: None,
    };
    let pods = vec![pod("emojivoto", "emoji-0", "emoji")];

    assert_eq!(
        srv.expected_identity(&target, &pods, &pods[0]).as_deref(),
        Some("emoji.emojivoto.serviceaccount.identity.controller-ns.cluster.local")
    );
}

#[test]
fn empty_service_accounts_pin_with_an_empty_prefix() {
    let srv = server(vec![]);
    let target = TapTarget {
        kind: ResourceKind::Pod,
        namespace: "emojivoto".to_string(),
        name: "emoji-0".to_string(),
        label_selector: None,
    };
    let pods = vec![pod("emojivoto", "emoji-0", "")];

    assert_eq!(
        srv.expected_identity(&target, &pods, &pods[0]).as_deref(),
        Some(".emojivoto.serviceaccount.identity.controller-ns.cluster.local")
    );
}

#[test]
fn namespace_targets_pin_only_a_single_implied_identity() {
    let srv = server(vec![]);
    let target = TapTarget {
        kind: ResourceKind::Namespace,
        namespace: String::new(),
        name: "emojivoto".to_string(),
        label_selector: None,
    };

    let uniform = vec![
        pod("emojivoto", "emoji-0", "emoji"),
        pod("emojivoto", "emoji-1", "emoji"),
    ];
    assert!(srv.expected_identity(&target, &uniform, &uniform[0]).is_some());

    let mixed = vec![
        pod("emojivoto", "emoji-0", "emoji"),
        pod("emojivoto", "voting-0", "voting"),
    ];
    assert_eq!(srv.expected_identity(&target, &mixed, &mixed[0]), None);
}

#[test]
fn workload_targets_do_not_pin() {
    let srv = server(vec![]);
    let target = TapTarget {
        kind: ResourceKind::Deployment,
        namespace: "emojivoto".to_string(),
        name: "emoji".to_string(),
        label_selector: None,
    };
    let pods = vec![pod("emojivoto", "emoji-0", "emoji")];
    assert_eq!(srv.expected_identity(&target, &pods, &pods[0]), None);
}

// === Match translation ===

#[test]
fn translates_http_leaves() {
    use proxy::observe_request::r#match::{self as proxy_match, http};

    let m = api::tap_by_resource_request::Match {
        r#match: Some(api::tap_by_resource_request::r#match::Match::All(
            api::tap_by_resource_request::r#match::Seq {
                matches: vec![
                    api::tap_by_resource_request::Match {
                        r#match: Some(api::tap_by_resource_request::r#match::Match::Http(
                            api::tap_by_resource_request::r#match::Http {
                                r#match: Some(
                                    api::tap_by_resource_request::r#match::http::Match::Path(
                                        "/api".to_string(),
                                    ),
                                ),
                            },
                        )),
                    },
                    api::tap_by_resource_request::Match {
                        r#match: Some(api::tap_by_resource_request::r#match::Match::Http(
                            api::tap_by_resource_request::r#match::Http {
                                r#match: Some(
                                    api::tap_by_resource_request::r#match::http::Match::Authority(
                                        "web.emojivoto".to_string(),
                                    ),
                                ),
                            },
                        )),
                    },
                ],
            },
        )),
    };

    let translated = translate_match(&m).unwrap();
    let expected = proxy::observe_request::Match {
        r#match: Some(proxy_match::Match::All(proxy_match::Seq {
            matches: vec![
                proxy::observe_request::Match {
                    r#match: Some(proxy_match::Match::Http(proxy_match::Http {
                        r#match: Some(http::Match::Path(http::StringMatch {
                            r#match: Some(http::string_match::Match::Prefix("/api".to_string())),
                        })),
                    })),
                },
                proxy::observe_request::Match {
                    r#match: Some(proxy_match::Match::Http(proxy_match::Http {
                        r#match: Some(http::Match::Authority(http::StringMatch {
                            r#match: Some(http::string_match::Match::Exact(
                                "web.emojivoto".to_string(),
                            )),
                        })),
                    })),
                },
            ],
        })),
    };
    assert_eq!(translated, expected);
}

#[test]
fn expands_destination_resources_into_labels() {
    use proxy::observe_request::r#match as proxy_match;

    let m = api::tap_by_resource_request::Match {
        r#match: Some(api::tap_by_resource_request::r#match::Match::Destinations(
            api::ResourceSelection {
                resource: Some(api::Resource {
                    r#type: "deployment".to_string(),
                    namespace: "emojivoto".to_string(),
                    name: "web".to_string(),
                }),
                label_selector: String::new(),
            },
        )),
    };

    let translated = translate_match(&m).unwrap();
    let expected = proxy::observe_request::Match {
        r#match: Some(proxy_match::Match::All(proxy_match::Seq {
            matches: vec![
                proxy::observe_request::Match {
                    r#match: Some(proxy_match::Match::DestinationLabel(proxy_match::Label {
                        key: "deployment".to_string(),
                        value: "web".to_string(),
                    })),
                },
                proxy::observe_request::Match {
                    r#match: Some(proxy_match::Match::DestinationLabel(proxy_match::Label {
                        key: "namespace".to_string(),
                        value: "emojivoto".to_string(),
                    })),
                },
            ],
        })),
    };
    assert_eq!(translated, expected);
}

#[test]
fn namespace_destinations_omit_the_namespace_label() {
    use proxy::observe_request::r#match as proxy_match;

    let m = api::tap_by_resource_request::Match {
        r#match: Some(api::tap_by_resource_request::r#match::Match::Destinations(
            api::ResourceSelection {
                resource: Some(api::Resource {
                    r#type: "namespace".to_string(),
                    namespace: String::new(),
                    name: "emojivoto".to_string(),
                }),
                label_selector: String::new(),
            },
        )),
    };

    let translated = translate_match(&m).unwrap();
    let expected = proxy::observe_request::Match {
        r#match: Some(proxy_match::Match::All(proxy_match::Seq {
            matches: vec![proxy::observe_request::Match {
                r#match: Some(proxy_match::Match::DestinationLabel(proxy_match::Label {
                    key: "namespace".to_string(),
                    value: "emojivoto".to_string(),
                })),
            }],
        })),
    };
    assert_eq!(translated, expected);
}

#[test]
fn header_extraction_follows_the_request() {
    let mut req = request("pod", "emojivoto", "emoji-0");
    assert!(!wants_headers(&req));

    req.extract = Some(api::tap_by_resource_request::Extract {
        extract: Some(api::tap_by_resource_request::extract::Extract::Http(
            api::tap_by_resource_request::extract::Http {
                extract: Some(
                    api::tap_by_resource_request::extract::http::Extract::Headers(
                        api::tap_by_resource_request::extract::http::Headers {},
                    ),
                ),
            },
        )),
    });
    assert!(wants_headers(&req));

    req.extract = Some(api::tap_by_resource_request::Extract { extract: None });
    assert!(!wants_headers(&req));
}

#[test]
fn methods_and_schemes_normalize() {
    use linkerd2_proxy_api::http_types::{http_method, scheme};

    assert_eq!(
        parse_method("get").r#type,
        Some(http_method::Type::Registered(
            http_method::Registered::Get.into()
        ))
    );
    assert_eq!(
        parse_method("brew").r#type,
        Some(http_method::Type::Unregistered("BREW".to_string()))
    );
    assert_eq!(
        parse_scheme("https").r#type,
        Some(scheme::Type::Registered(scheme::Registered::Https.into()))
    );
    assert_eq!(
        parse_scheme("spdy").r#type,
        Some(scheme::Type::Unregistered("SPDY".to_string()))
    );
}
