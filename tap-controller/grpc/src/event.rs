//! Translates proxy tap events into the client protocol.
//!
//! Translation is variant-by-variant with no buffering and no reordering:
//! what a proxy emits is what the client sees, enriched only by source-IP
//! hydration. An event carrying an unknown payload is an internal error
//! naming the missing variant, so new wire variants fail loudly instead of
//! being dropped.

use anyhow::anyhow;
use linkerd2_proxy_api::{http_types, net, tap as proxy};
use linkerd_tap_controller_api::tap as api;
use linkerd_tap_controller_core::{HydrateIp, TapError};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub fn translate<H: HydrateIp>(
    event: proxy::TapEvent,
    hydrate: &H,
    extract_headers: bool,
) -> Result<api::TapEvent, TapError> {
    let proxy::TapEvent {
        source,
        destination,
        source_meta,
        destination_meta,
        route_meta,
        proxy_direction,
        event,
    } = event;

    let proxy_direction = match proxy::tap_event::ProxyDirection::try_from(proxy_direction) {
        Ok(proxy::tap_event::ProxyDirection::Inbound) => api::tap_event::ProxyDirection::Inbound,
        Ok(proxy::tap_event::ProxyDirection::Outbound) => api::tap_event::ProxyDirection::Outbound,
        _ => api::tap_event::ProxyDirection::Unknown,
    };

    // Merge workload metadata for the source address into whatever labels
    // the proxy already attached.
    let mut source_labels = source_meta.map(|m| m.labels).unwrap_or_default();
    if let Some(ip) = source.as_ref().and_then(ip_addr) {
        if let Some(meta) = hydrate.ip_labels(ip) {
            source_labels.extend(meta);
        }
    }

    let http = match event {
        Some(proxy::tap_event::Event::Http(http)) => http,
        None => return Err(TapError::Internal(anyhow!("tap event has no event payload"))),
    };
    let http_event = http
        .event
        .ok_or_else(|| TapError::Internal(anyhow!("tap event has an empty http payload")))?;

    let http_event = match http_event {
        proxy::tap_event::http::Event::RequestInit(init) => {
            api::tap_event::http::Event::RequestInit(api::tap_event::http::RequestInit {
                id: init.id.map(stream_id),
                method: init.method.map(method),
                scheme: init.scheme.map(scheme),
                authority: init.authority,
                path: init.path,
                headers: filter_headers(init.headers, extract_headers),
            })
        }
        proxy::tap_event::http::Event::ResponseInit(init) => {
            api::tap_event::http::Event::ResponseInit(api::tap_event::http::ResponseInit {
                id: init.id.map(stream_id),
                since_request_init: init.since_request_init,
                http_status: init.http_status,
                headers: filter_headers(init.headers, extract_headers),
            })
        }
        proxy::tap_event::http::Event::ResponseEnd(end) => {
            api::tap_event::http::Event::ResponseEnd(api::tap_event::http::ResponseEnd {
                id: end.id.map(stream_id),
                since_request_init: end.since_request_init,
                since_response_init: end.since_response_init,
                response_bytes: end.response_bytes,
                eos: end.eos.map(eos),
                trailers: filter_headers(end.trailers, extract_headers),
            })
        }
    };

    Ok(api::TapEvent {
        source: source.as_ref().map(tcp_address),
        destination: destination.as_ref().map(tcp_address),
        source_meta: Some(api::tap_event::EndpointMeta {
            labels: source_labels,
        }),
        destination_meta: destination_meta.map(|m| api::tap_event::EndpointMeta { labels: m.labels }),
        route_meta: route_meta.map(|m| api::tap_event::RouteMeta { labels: m.labels }),
        proxy_direction: proxy_direction.into(),
        event: Some(api::tap_event::Event::Http(api::tap_event::Http {
            event: Some(http_event),
        })),
    })
}

/// Extracts the standard address form of a proxy-reported peer.
pub(crate) fn ip_addr(addr: &net::TcpAddress) -> Option<IpAddr> {
    match addr.ip.as_ref()?.ip.as_ref()? {
        net::ip_address::Ip::Ipv4(octets) => Some(IpAddr::V4(Ipv4Addr::from(*octets))),
        net::ip_address::Ip::Ipv6(v6) => {
            let octets = ((v6.first as u128) << 64) | (v6.last as u128);
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
    }
}

fn tcp_address(addr: &net::TcpAddress) -> api::TcpAddress {
    let ip = addr.ip.as_ref().and_then(|ip| ip.ip.as_ref()).map(|ip| match *ip {
        net::ip_address::Ip::Ipv4(octets) => api::ip_address::Ip::Ipv4(octets),
        net::ip_address::Ip::Ipv6(ref v6) => api::ip_address::Ip::Ipv6(api::IPv6 {
            first: v6.first,
            last: v6.last,
        }),
    });
    api::TcpAddress {
        ip: Some(api::IpAddress { ip }),
        port: addr.port,
    }
}

fn stream_id(id: proxy::tap_event::http::StreamId) -> api::tap_event::http::StreamId {
    api::tap_event::http::StreamId {
        base: id.base,
        stream: id.stream,
    }
}

/// Registered methods pass through; unregistered strings are uppercased.
fn method(method: http_types::HttpMethod) -> api::HttpMethod {
    let r#type = method.r#type.map(|t| match t {
        http_types::http_method::Type::Registered(code) => {
            api::http_method::Type::Registered(code)
        }
        http_types::http_method::Type::Unregistered(name) => {
            api::http_method::Type::Unregistered(name.to_ascii_uppercase())
        }
    });
    api::HttpMethod { r#type }
}

fn scheme(scheme: http_types::Scheme) -> api::Scheme {
    let r#type = scheme.r#type.map(|t| match t {
        http_types::scheme::Type::Registered(code) => api::scheme::Type::Registered(code),
        http_types::scheme::Type::Unregistered(name) => {
            api::scheme::Type::Unregistered(name.to_ascii_uppercase())
        }
    });
    api::Scheme { r#type }
}

/// Headers are carried only when the tap request asked for extraction.
fn filter_headers(headers: Option<http_types::Headers>, extract: bool) -> Option<api::Headers> {
    if !extract {
        return None;
    }
    headers.map(|hs| api::Headers {
        headers: hs
            .headers
            .into_iter()
            .map(|h| api::headers::Header {
                name: h.name,
                value: Vec::from(&h.value[..]),
            })
            .collect(),
    })
}

fn eos(eos: proxy::Eos) -> api::Eos {
    let end = eos.end.map(|end| match end {
        proxy::eos::End::GrpcStatusCode(code) => api::eos::End::GrpcStatusCode(code),
        proxy::eos::End::ResetErrorCode(code) => api::eos::End::ResetErrorCode(code),
    });
    api::Eos { end }
}
