pub mod diff;
pub mod env;
pub mod names;
pub mod ports;
pub mod reconciler;
pub mod resources;
pub mod secrets;
pub mod status;
pub mod volumes;

use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::watcher::{watcher, Config as WatchConfig, Event as WatchEvent};
use kube::{Client, Config};
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

use crate::crd::EdgeDeployment;
use crate::error::{Error, Result};
use crate::settings::Settings;
use self::reconciler::DeploymentEvent;
use self::status::{ModuleRuntimeInfo, ModuleStatusMap, PodEvent, SystemInfo};

pub struct Context {
    pub client: Client,
    pub settings: Arc<Settings>,
    pub status: Arc<ModuleStatusMap>,
}

impl Context {
    pub fn new(client: Client, settings: Arc<Settings>) -> Arc<Self> {
        Arc::new(Self {
            client,
            settings,
            status: Arc::new(ModuleStatusMap::default()),
        })
    }
}

/// Explicit kubeconfig when given, otherwise in-cluster service account or
/// the local default kubeconfig.
pub async fn init_kube_client(kubeconfig: Option<PathBuf>) -> Result<Client> {
    let client = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(&path).map_err(|err| {
                Error::InvalidConfig(format!(
                    "failed to read kubeconfig {}: {err}",
                    path.display()
                ))
            })?;
            let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|err| {
                    Error::InvalidConfig(format!(
                        "failed to build config from {}: {err}",
                        path.display()
                    ))
                })?;
            Client::try_from(config)?
        }
        None => Client::try_default().await?,
    };
    Ok(client)
}

/// Holds the two long-lived watch tasks: the custom-resource watch feeding
/// the reconciler and the pod watch feeding the status map.
pub struct EdgeOperator {
    ctx: Arc<Context>,
    edge_watch: JoinHandle<Result<()>>,
    pod_watch: JoinHandle<Result<()>>,
}

impl EdgeOperator {
    /// Launch both watches. Neither is awaited for its first event: a watch
    /// blocks until something happens, and the initial custom resource must
    /// be handled regardless.
    pub fn start(client: Client, settings: Arc<Settings>) -> Self {
        let ctx = Context::new(client, settings);
        let edge_watch = tokio::spawn(watch_edge_deployments(ctx.clone()));
        let pod_watch = tokio::spawn(watch_pods(ctx.clone()));
        Self {
            ctx,
            edge_watch,
            pod_watch,
        }
    }

    pub async fn get_modules(&self) -> Vec<ModuleRuntimeInfo> {
        self.ctx.status.get_modules().await
    }

    pub async fn get_system_info(&self) -> Result<SystemInfo> {
        status::system_info(&self.ctx.client).await
    }

    /// Run until either watch task terminates. Termination is fatal; the
    /// surrounding orchestrator restarts the process.
    pub async fn run(&mut self) -> Result<()> {
        tokio::select! {
            result = &mut self.edge_watch => flatten("edge deployment watch", result),
            result = &mut self.pod_watch => flatten("pod watch", result),
        }
    }

    pub async fn close(self) {
        self.edge_watch.abort();
        self.pod_watch.abort();
        let _ = self.edge_watch.await;
        let _ = self.pod_watch.await;
        info!("watches disposed");
    }
}

fn flatten(watch: &str, result: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    match result {
        Ok(Ok(())) => Err(Error::WatchFailed(format!("{watch} ended"))),
        Ok(Err(err)) => Err(err),
        Err(err) => Err(Error::WatchFailed(format!("{watch} panicked: {err}"))),
    }
}

/// Cluster-scoped watch on EdgeDeployment resources. Events are handled in
/// arrival order; a handler failure is absorbed unless fatal.
async fn watch_edge_deployments(ctx: Arc<Context>) -> Result<()> {
    let api: Api<EdgeDeployment> = Api::all(ctx.client.clone());
    let mut stream = watcher(api, WatchConfig::default()).boxed();
    info!(resource = %ctx.settings.resource_name(), "edge deployment watch started");

    while let Some(event) = stream.next().await {
        let event = match event {
            Ok(WatchEvent::Apply(edge)) | Ok(WatchEvent::InitApply(edge)) => {
                DeploymentEvent::Applied(edge)
            }
            Ok(WatchEvent::Delete(edge)) => DeploymentEvent::Deleted(edge),
            Ok(WatchEvent::Init) | Ok(WatchEvent::InitDone) => continue,
            Err(err) => {
                warn!(error = %err, "edge deployment watch error");
                continue;
            }
        };
        if let Err(err) = reconciler::handle_event(&ctx, event).await {
            if err.is_fatal() {
                return Err(err);
            }
            warn!(error = %err, "reconciliation failed, next event will converge");
        }
    }
    Err(Error::WatchFailed("edge deployment watch ended".to_string()))
}

/// Namespaced pod watch feeding the status map. No label selector here; the
/// status map filters on the module label itself.
async fn watch_pods(ctx: Arc<Context>) -> Result<()> {
    let api: Api<Pod> = Api::namespaced(ctx.client.clone(), &ctx.settings.namespace);
    let mut stream = watcher(api, WatchConfig::default()).boxed();
    info!(namespace = %ctx.settings.namespace, "pod watch started");

    while let Some(event) = stream.next().await {
        match event {
            Ok(WatchEvent::Apply(pod)) | Ok(WatchEvent::InitApply(pod)) => {
                ctx.status.handle_pod_event(PodEvent::Applied(pod)).await;
            }
            Ok(WatchEvent::Delete(pod)) => {
                ctx.status.handle_pod_event(PodEvent::Deleted(pod)).await;
            }
            Ok(WatchEvent::Init) | Ok(WatchEvent::InitDone) => {}
            Err(err) => warn!(error = %err, "pod watch error"),
        }
    }
    Err(Error::WatchFailed("pod watch ended".to_string()))
}
