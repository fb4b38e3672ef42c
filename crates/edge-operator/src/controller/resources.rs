use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, LocalObjectReference, PodSpec, PodTemplateSpec, Secret, SecurityContext, Service,
    ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use tracing::warn;

use crate::constants;
use crate::controller::{env, names, ports, secrets, volumes};
use crate::crd::{CreateOptions, ModuleEntry};
use crate::error::Result;
use crate::settings::Settings;

/// Everything one reconciliation wants to exist in the cluster.
#[derive(Debug, Default)]
pub struct DesiredState {
    pub services: Vec<Service>,
    pub deployments: Vec<Deployment>,
    pub pull_secrets: BTreeMap<String, Secret>,
}

/// Build the desired object set for a module list. Synthesis is
/// deterministic: the same input yields byte-equal JSON, which is what the
/// creation-string comparison relies on.
pub fn synthesize(settings: &Settings, modules: &[ModuleEntry]) -> Result<DesiredState> {
    let mut desired = DesiredState {
        pull_secrets: secrets::pull_secrets(modules)?,
        ..Default::default()
    };

    for entry in modules {
        if !entry.module.is_docker() {
            warn!(
                module = %entry.module.name,
                module_type = %entry.module.module_type,
                "skipping module with unsupported type"
            );
            continue;
        }
        let (service, deployment) = synthesize_module(settings, entry);
        if let Some(service) = service {
            desired.services.push(service);
        }
        desired.deployments.push(deployment);
    }

    Ok(desired)
}

fn synthesize_module(settings: &Settings, entry: &ModuleEntry) -> (Option<Service>, Deployment) {
    let identity = &entry.module_identity;
    let module = &entry.module;
    let labels = names::identity_labels(
        &identity.hub_hostname,
        &identity.device_id,
        &identity.module_id,
    );
    let create_options = module.create_options.as_ref();

    let service = service_for(settings, entry, &labels, create_options);

    let is_agent = names::is_edge_agent(&identity.module_id);
    let volume_set = volumes::build_volumes(settings, is_agent, create_options);
    let env = env::assemble_env(settings, identity, module);
    let privileged = create_options
        .and_then(|c| c.host_config.as_ref())
        .is_some_and(|h| h.privileged);

    let module_container = Container {
        name: names::canonical_module_name(&identity.module_id),
        image: Some(module.image.clone()),
        env: Some(env.clone()),
        ports: create_options
            .map(ports::container_ports)
            .filter(|ports| !ports.is_empty()),
        volume_mounts: Some(volume_set.module_mounts),
        security_context: privileged.then(|| SecurityContext {
            privileged: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    };
    let proxy_container = Container {
        name: constants::PROXY_CONTAINER_NAME.to_string(),
        image: Some(settings.proxy.image.clone()),
        env: Some(env),
        volume_mounts: Some(volume_set.proxy_mounts),
        ..Default::default()
    };

    // Pod labels are the identity labels plus whatever the create options
    // declare; create-options labels win on conflict.
    let mut pod_labels = labels.clone();
    if let Some(create_options) = create_options {
        pod_labels.extend(
            create_options
                .labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
    }

    let image_pull_secrets = module.auth.as_ref().map(|auth| {
        vec![LocalObjectReference {
            name: secrets::pull_secret_name(auth),
        }]
    });

    let template = PodTemplateSpec {
        metadata: Some(ObjectMeta {
            name: Some(names::canonical_module_name(&identity.module_id)),
            labels: Some(pod_labels),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![module_container, proxy_container],
            volumes: Some(volume_set.volumes),
            image_pull_secrets,
            ..Default::default()
        }),
    };

    let deployment = Deployment {
        metadata: ObjectMeta {
            name: Some(names::deployment_name(
                &identity.hub_hostname,
                &identity.device_id,
                &identity.module_id,
            )),
            namespace: Some(settings.namespace.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels),
                ..Default::default()
            },
            template,
            ..Default::default()
        }),
        ..Default::default()
    };

    (service, deployment)
}

/// A Service exists iff the module exposes at least one valid port.
fn service_for(
    settings: &Settings,
    entry: &ModuleEntry,
    labels: &BTreeMap<String, String>,
    create_options: Option<&CreateOptions>,
) -> Option<Service> {
    let port_set = create_options.map(ports::service_ports)?;
    if port_set.is_empty() {
        return None;
    }
    Some(Service {
        metadata: ObjectMeta {
            name: Some(names::service_name(&entry.module_identity.module_id)),
            namespace: Some(settings.namespace.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some(port_set.service_type().to_string()),
            selector: Some(labels.clone()),
            ports: Some(port_set.ports),
            ..Default::default()
        }),
        ..Default::default()
    })
}
