#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod labels;

pub use self::labels::{Labels, Selector};
pub use k8s_openapi::{
    api::{
        self,
        apps::v1::ReplicaSet,
        batch::v1::Job,
        core::v1::{
            ConfigMap, Container, ContainerStatus, Namespace, Node, NodeAddress, NodeStatus, Pod,
            PodSpec, PodStatus, ServiceAccount,
        },
    },
    apimachinery::{
        self,
        pkg::apis::meta::v1::{OwnerReference, Time},
    },
    NamespaceResourceScope,
};
pub use kube::{
    api::{Api, ListParams, ObjectMeta, Patch, PatchParams, Resource, ResourceExt},
    error::ErrorResponse,
    runtime::watcher,
    Client, Error,
};
