//! Tap protocol messages.
//!
//! These definitions are maintained by hand in the shape `prost-build`
//! emits; field tags are part of the wire contract and must never be
//! renumbered.

/// A typed reference to a cluster resource.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Resource {
    /// The singular resource kind, e.g. `deployment`.
    #[prost(string, tag = "1")]
    pub r#type: ::prost::alloc::string::String,
    /// Empty for cluster-wide selections of namespaced kinds.
    #[prost(string, tag = "2")]
    pub namespace: ::prost::alloc::string::String,
    /// Empty to select every resource of the kind.
    #[prost(string, tag = "3")]
    pub name: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResourceSelection {
    #[prost(message, optional, tag = "1")]
    pub resource: ::core::option::Option<Resource>,
    /// An equality-based label selector applied after resource expansion.
    #[prost(string, tag = "2")]
    pub label_selector: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TapByResourceRequest {
    /// The resources to tap.
    #[prost(message, optional, tag = "1")]
    pub target: ::core::option::Option<ResourceSelection>,
    /// Conditions an observed request must satisfy.
    #[prost(message, optional, tag = "2")]
    pub r#match: ::core::option::Option<tap_by_resource_request::Match>,
    /// The aggregate event budget, in requests per second, shared across
    /// every pod the target resolves to.
    #[prost(float, tag = "3")]
    pub max_rps: f32,
    #[prost(message, optional, tag = "4")]
    pub extract: ::core::option::Option<tap_by_resource_request::Extract>,
}

pub mod tap_by_resource_request {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Match {
        #[prost(oneof = "r#match::Match", tags = "1, 2, 3, 4, 5")]
        pub r#match: ::core::option::Option<r#match::Match>,
    }

    pub mod r#match {
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Seq {
            #[prost(message, repeated, tag = "1")]
            pub matches: ::prost::alloc::vec::Vec<super::Match>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Http {
            #[prost(oneof = "http::Match", tags = "1, 2, 3, 4")]
            pub r#match: ::core::option::Option<http::Match>,
        }

        pub mod http {
            #[derive(Clone, PartialEq, ::prost::Oneof)]
            pub enum Match {
                #[prost(string, tag = "1")]
                Scheme(::prost::alloc::string::String),
                #[prost(string, tag = "2")]
                Method(::prost::alloc::string::String),
                /// Exact authority comparison.
                #[prost(string, tag = "3")]
                Authority(::prost::alloc::string::String),
                /// Path prefix comparison.
                #[prost(string, tag = "4")]
                Path(::prost::alloc::string::String),
            }
        }

        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Match {
            #[prost(message, tag = "1")]
            All(Seq),
            #[prost(message, tag = "2")]
            Any(Seq),
            #[prost(message, tag = "3")]
            Not(::prost::alloc::boxed::Box<super::Match>),
            /// Restricts events to those sent to the named resources.
            #[prost(message, tag = "4")]
            Destinations(super::super::ResourceSelection),
            #[prost(message, tag = "5")]
            Http(Http),
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Extract {
        #[prost(oneof = "extract::Extract", tags = "1")]
        pub extract: ::core::option::Option<extract::Extract>,
    }

    pub mod extract {
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Http {
            #[prost(oneof = "http::Extract", tags = "1")]
            pub extract: ::core::option::Option<http::Extract>,
        }

        pub mod http {
            #[derive(Clone, PartialEq, ::prost::Message)]
            pub struct Headers {}

            #[derive(Clone, PartialEq, ::prost::Oneof)]
            pub enum Extract {
                #[prost(message, tag = "1")]
                Headers(Headers),
            }
        }

        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Extract {
            #[prost(message, tag = "1")]
            Http(Http),
        }
    }
}

/// A single observed request lifecycle event.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TapEvent {
    #[prost(message, optional, tag = "1")]
    pub source: ::core::option::Option<TcpAddress>,
    #[prost(message, optional, tag = "2")]
    pub destination: ::core::option::Option<TcpAddress>,
    #[prost(message, optional, tag = "4")]
    pub destination_meta: ::core::option::Option<tap_event::EndpointMeta>,
    #[prost(message, optional, tag = "5")]
    pub source_meta: ::core::option::Option<tap_event::EndpointMeta>,
    #[prost(enumeration = "tap_event::ProxyDirection", tag = "6")]
    pub proxy_direction: i32,
    #[prost(message, optional, tag = "7")]
    pub route_meta: ::core::option::Option<tap_event::RouteMeta>,
    #[prost(oneof = "tap_event::Event", tags = "3")]
    pub event: ::core::option::Option<tap_event::Event>,
}

pub mod tap_event {
    /// Which side of the reporting proxy observed the request.
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum ProxyDirection {
        Unknown = 0,
        Inbound = 1,
        Outbound = 2,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct EndpointMeta {
        #[prost(map = "string, string", tag = "1")]
        pub labels: ::std::collections::HashMap<
            ::prost::alloc::string::String,
            ::prost::alloc::string::String,
        >,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RouteMeta {
        #[prost(map = "string, string", tag = "1")]
        pub labels: ::std::collections::HashMap<
            ::prost::alloc::string::String,
            ::prost::alloc::string::String,
        >,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Http {
        #[prost(oneof = "http::Event", tags = "1, 2, 3")]
        pub event: ::core::option::Option<http::Event>,
    }

    pub mod http {
        /// Identifies one HTTP/2 stream within a connection from the
        /// reporting proxy.
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct StreamId {
            #[prost(uint32, tag = "1")]
            pub base: u32,
            #[prost(uint64, tag = "2")]
            pub stream: u64,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct RequestInit {
            #[prost(message, optional, tag = "1")]
            pub id: ::core::option::Option<StreamId>,
            #[prost(message, optional, tag = "2")]
            pub method: ::core::option::Option<super::super::HttpMethod>,
            #[prost(message, optional, tag = "3")]
            pub scheme: ::core::option::Option<super::super::Scheme>,
            #[prost(string, tag = "4")]
            pub authority: ::prost::alloc::string::String,
            #[prost(string, tag = "5")]
            pub path: ::prost::alloc::string::String,
            /// Populated only when the request asked for header extraction.
            #[prost(message, optional, tag = "6")]
            pub headers: ::core::option::Option<super::super::Headers>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ResponseInit {
            #[prost(message, optional, tag = "1")]
            pub id: ::core::option::Option<StreamId>,
            #[prost(message, optional, tag = "2")]
            pub since_request_init: ::core::option::Option<::prost_types::Duration>,
            #[prost(uint32, tag = "3")]
            pub http_status: u32,
            #[prost(message, optional, tag = "4")]
            pub headers: ::core::option::Option<super::super::Headers>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ResponseEnd {
            #[prost(message, optional, tag = "1")]
            pub id: ::core::option::Option<StreamId>,
            #[prost(message, optional, tag = "2")]
            pub since_request_init: ::core::option::Option<::prost_types::Duration>,
            #[prost(message, optional, tag = "3")]
            pub since_response_init: ::core::option::Option<::prost_types::Duration>,
            #[prost(uint64, tag = "4")]
            pub response_bytes: u64,
            #[prost(message, optional, tag = "5")]
            pub eos: ::core::option::Option<super::super::Eos>,
            #[prost(message, optional, tag = "6")]
            pub trailers: ::core::option::Option<super::super::Headers>,
        }

        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Event {
            #[prost(message, tag = "1")]
            RequestInit(RequestInit),
            #[prost(message, tag = "2")]
            ResponseInit(ResponseInit),
            #[prost(message, tag = "3")]
            ResponseEnd(ResponseEnd),
        }
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Event {
        #[prost(message, tag = "3")]
        Http(Http),
    }
}

/// End-of-stream disposition of an observed response.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Eos {
    #[prost(oneof = "eos::End", tags = "1, 2")]
    pub end: ::core::option::Option<eos::End>,
}

pub mod eos {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum End {
        #[prost(uint32, tag = "1")]
        GrpcStatusCode(u32),
        #[prost(uint32, tag = "2")]
        ResetErrorCode(u32),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TcpAddress {
    #[prost(message, optional, tag = "1")]
    pub ip: ::core::option::Option<IpAddress>,
    #[prost(uint32, tag = "2")]
    pub port: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IpAddress {
    #[prost(oneof = "ip_address::Ip", tags = "1, 2")]
    pub ip: ::core::option::Option<ip_address::Ip>,
}

pub mod ip_address {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Ip {
        #[prost(fixed32, tag = "1")]
        Ipv4(u32),
        #[prost(message, tag = "2")]
        Ipv6(super::IPv6),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IPv6 {
    /// The most significant 64 bits of the address.
    #[prost(fixed64, tag = "1")]
    pub first: u64,
    /// The least significant 64 bits of the address.
    #[prost(fixed64, tag = "2")]
    pub last: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HttpMethod {
    #[prost(oneof = "http_method::Type", tags = "1, 2")]
    pub r#type: ::core::option::Option<http_method::Type>,
}

pub mod http_method {
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum Registered {
        Get = 0,
        Post = 1,
        Put = 2,
        Delete = 3,
        Patch = 4,
        Options = 5,
        Connect = 6,
        Head = 7,
        Trace = 8,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Type {
        #[prost(enumeration = "Registered", tag = "1")]
        Registered(i32),
        #[prost(string, tag = "2")]
        Unregistered(::prost::alloc::string::String),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Scheme {
    #[prost(oneof = "scheme::Type", tags = "1, 2")]
    pub r#type: ::core::option::Option<scheme::Type>,
}

pub mod scheme {
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum Registered {
        Http = 0,
        Https = 1,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Type {
        #[prost(enumeration = "Registered", tag = "1")]
        Registered(i32),
        #[prost(string, tag = "2")]
        Unregistered(::prost::alloc::string::String),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Headers {
    #[prost(message, repeated, tag = "1")]
    pub headers: ::prost::alloc::vec::Vec<headers::Header>,
}

pub mod headers {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Header {
        #[prost(string, tag = "1")]
        pub name: ::prost::alloc::string::String,
        /// Header values are not guaranteed to be UTF-8 and are carried as
        /// opaque bytes.
        #[prost(bytes = "vec", tag = "2")]
        pub value: ::prost::alloc::vec::Vec<u8>,
    }
}

/// Carried as the trailing frame of a response body when a tap request
/// fails after the stream has started.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApiError {
    /// A numeric gRPC status code.
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
}
