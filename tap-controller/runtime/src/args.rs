use crate::{admission::Admission, apiserver, auth, grpc, index, k8s, IndexDiscover, IndexHydrate};
use anyhow::{bail, Result};
use clap::Parser;
use crate::k8s::watcher;
use prometheus_client::registry::Registry;
use std::{net::SocketAddr, path::PathBuf};
use tokio::sync::watch;
use tracing::{info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(name = "tap", about = "A mesh traffic introspection controller")]
pub struct Args {
    #[clap(
        long,
        default_value = "linkerd=info,warn",
        env = "LINKERD_TAP_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    /// Serves the tap-injection admission webhook.
    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Disables the tap-injection admission webhook server.
    #[clap(long)]
    injector_disabled: bool,

    /// The mutually-authenticated client-facing listen address.
    #[clap(long, default_value = "0.0.0.0:8089")]
    api_server_addr: SocketAddr,

    /// The port each proxy serves its tap API on.
    #[clap(long, default_value = "4190")]
    tap_port: u16,

    /// Namespace used to derive proxy identity strings.
    #[clap(long, default_value = "linkerd")]
    controller_namespace: String,

    #[clap(long, default_value = "cluster.local")]
    cluster_domain: String,

    #[clap(long, default_value = "/var/run/linkerd/tls/tls.crt")]
    tls_certs: PathBuf,

    #[clap(long, default_value = "/var/run/linkerd/tls/tls.key")]
    tls_key: PathBuf,

    /// Bypasses client common-name allowlisting (development only).
    #[clap(long)]
    disable_common_names: bool,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            server,
            admin,
            injector_disabled,
            api_server_addr,
            tap_port,
            controller_namespace,
            cluster_domain,
            tls_certs,
            tls_key,
            disable_common_names,
        } = self;

        let server = if injector_disabled { None } else { Some(server) };

        let mut prom = <Registry>::default();
        let tap_metrics = grpc::TapMetrics::register(prom.sub_registry_with_prefix("tap"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_optional_server(server)
            .build()
            .await?;

        // Maintain the shared pod/owner/node index from cluster watches.
        let index = index::Index::shared();

        let pods = runtime.watch_all::<k8s::Pod>(watcher::Config::default());
        tokio::spawn(kubert::index::namespaced(index.clone(), pods).instrument(info_span!("pods")));

        let replicasets = runtime.watch_all::<k8s::ReplicaSet>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), replicasets)
                .instrument(info_span!("replicasets")),
        );

        let jobs = runtime.watch_all::<k8s::Job>(watcher::Config::default());
        tokio::spawn(kubert::index::namespaced(index.clone(), jobs).instrument(info_span!("jobs")));

        let nodes = runtime.watch_all::<k8s::Node>(watcher::Config::default());
        tokio::spawn(index::node_index(index.clone(), nodes).instrument(info_span!("nodes")));

        // The authentication configmap must exist at startup; afterwards it
        // is refreshed in the background.
        let auth_config = auth::load(&runtime.client()).await?;
        let (auth_tx, auth_rx) = watch::channel(auth_config);
        tokio::spawn(auth::refresh(runtime.client(), auth_tx).instrument(info_span!("auth")));

        let tap = grpc::TapServer::new(
            IndexDiscover(index.clone()),
            IndexHydrate(index),
            controller_namespace,
            cluster_domain,
            tap_port,
            tap_metrics,
        );
        let api_server = apiserver::ApiServer::new(tap, auth_rx, disable_common_names);
        let drain = runtime.shutdown_handle();
        tokio::spawn(
            async move {
                if let Err(error) =
                    apiserver::serve(api_server_addr, tls_certs, tls_key, api_server, drain).await
                {
                    tracing::error!(%error, "tap API server failed");
                }
            }
            .instrument(info_span!("apiserver")),
        );

        let runtime = runtime.spawn_server(Admission::new);

        // Block the main thread on the shutdown signal. Once it fires, wait for the background
        // tasks to complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
