use futures::future::join_all;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::controller::{diff, names, resources, secrets, Context};
use crate::crd::EdgeDeployment;
use crate::error::Result;

/// A custom-resource watch event, already classified by the supervisor.
#[derive(Debug)]
pub enum DeploymentEvent {
    Applied(EdgeDeployment),
    Deleted(EdgeDeployment),
}

/// One end-to-end converge step for a single CR event.
pub async fn handle_event(ctx: &Context, event: DeploymentEvent) -> Result<()> {
    let edge = match &event {
        DeploymentEvent::Applied(edge) | DeploymentEvent::Deleted(edge) => edge,
    };
    let name = edge.metadata.name.clone().unwrap_or_default();
    let resource_name = ctx.settings.resource_name();
    if name != resource_name {
        debug!(name = %name, expected = %resource_name, "ignoring foreign edge deployment");
        return Ok(());
    }

    match event {
        DeploymentEvent::Deleted(_) => remove_all(ctx).await,
        DeploymentEvent::Applied(edge) => converge(ctx, &edge).await,
    }
}

fn service_api(ctx: &Context) -> Api<Service> {
    Api::namespaced(ctx.client.clone(), &ctx.settings.namespace)
}

fn deployment_api(ctx: &Context) -> Api<Deployment> {
    Api::namespaced(ctx.client.clone(), &ctx.settings.namespace)
}

fn owned_objects(ctx: &Context) -> ListParams {
    ListParams::default().labels(&names::device_selector(
        &ctx.settings.hub_hostname,
        &ctx.settings.device_id,
    ))
}

/// The CR is gone: tear down every owned object.
async fn remove_all(ctx: &Context) -> Result<()> {
    let services = service_api(ctx);
    let deployments = deployment_api(ctx);
    let list_params = owned_objects(ctx);

    let service_names: Vec<String> = services
        .list(&list_params)
        .await?
        .items
        .iter()
        .filter_map(|s| s.metadata.name.clone())
        .collect();
    let deployment_names: Vec<String> = deployments
        .list(&list_params)
        .await?
        .items
        .iter()
        .filter_map(|d| d.metadata.name.clone())
        .collect();

    info!(
        services = service_names.len(),
        deployments = deployment_names.len(),
        "edge deployment deleted, removing owned objects"
    );
    delete_batch(&services, &service_names).await;
    delete_batch(&deployments, &deployment_names).await;
    Ok(())
}

async fn converge(ctx: &Context, edge: &EdgeDeployment) -> Result<()> {
    let services = service_api(ctx);
    let deployments = deployment_api(ctx);
    let list_params = owned_objects(ctx);

    let observed_services = services.list(&list_params).await?.items;
    let observed_deployments = deployments.list(&list_params).await?.items;

    let desired = resources::synthesize(&ctx.settings, &edge.spec.modules)?;
    secrets::reconcile_pull_secrets(&ctx.client, &desired.pull_secrets).await?;

    let service_diff = diff::diff_services(&desired.services, &observed_services)?;
    let deployment_diff = diff::diff_deployments(&desired.deployments, &observed_deployments)?;

    info!(
        service_creates = service_diff.create.len(),
        service_removes = service_diff.remove.len(),
        deployment_creates = deployment_diff.create.len(),
        deployment_updates = deployment_diff.update.len(),
        deployment_removes = deployment_diff.remove.len(),
        "reconciling edge deployment"
    );

    // Phases are sequenced; objects within a phase fly concurrently. A
    // failure inside a batch is logged and left for the next event.
    delete_batch(&services, &service_diff.remove).await;
    delete_batch(&deployments, &deployment_diff.remove).await;
    create_batch(&services, &service_diff.create).await;
    create_batch(&deployments, &deployment_diff.create).await;
    replace_batch(&deployments, &deployment_diff.update).await;

    Ok(())
}

async fn delete_batch<K>(api: &Api<K>, object_names: &[String])
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug,
{
    let results = join_all(object_names.iter().map(|name| async move {
        (name, api.delete(name, &DeleteParams::default()).await)
    }))
    .await;
    for (name, result) in results {
        match result {
            Ok(_) => debug!(name = %name, "deleted object"),
            Err(kube::Error::Api(response)) if response.code == 404 => {
                debug!(name = %name, "object already gone")
            }
            Err(err) => warn!(name = %name, error = %err, "delete failed"),
        }
    }
}

async fn create_batch<K>(api: &Api<K>, objects: &[K])
where
    K: Resource + Clone + DeserializeOwned + Serialize + std::fmt::Debug,
{
    let results = join_all(objects.iter().map(|object| async move {
        (
            object.meta().name.clone().unwrap_or_default(),
            api.create(&PostParams::default(), object).await,
        )
    }))
    .await;
    for (name, result) in results {
        match result {
            Ok(_) => debug!(name = %name, "created object"),
            Err(err) => warn!(name = %name, error = %err, "create failed"),
        }
    }
}

async fn replace_batch<K>(api: &Api<K>, objects: &[K])
where
    K: Resource + Clone + DeserializeOwned + Serialize + std::fmt::Debug,
{
    let results = join_all(objects.iter().map(|object| async move {
        let name = object.meta().name.clone().unwrap_or_default();
        let result = api.replace(&name, &PostParams::default(), object).await;
        (name, result)
    }))
    .await;
    for (name, result) in results {
        match result {
            Ok(_) => debug!(name = %name, "replaced object"),
            Err(err) => warn!(name = %name, error = %err, "replace failed"),
        }
    }
}
