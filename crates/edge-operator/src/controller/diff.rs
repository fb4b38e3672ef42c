use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::constants;
use crate::error::Result;

/// Changed Services are queued as a delete plus a re-create of the same name
/// because ClusterIP is immutable post-create.
#[derive(Debug, Default)]
pub struct ServiceDiff {
    pub create: Vec<Service>,
    pub remove: Vec<String>,
}

#[derive(Debug, Default)]
pub struct DeploymentDiff {
    pub create: Vec<Deployment>,
    pub update: Vec<Deployment>,
    pub remove: Vec<String>,
}

/// Serialize `desired` and store the result under the creation-string
/// annotation. The annotation value is the JSON of the object as it stood
/// before the annotation was attached.
pub fn with_creation_annotation<K>(desired: &K) -> Result<K>
where
    K: Resource + Serialize + Clone,
{
    let creation_string = serde_json::to_string(desired)?;
    let mut annotated = desired.clone();
    annotated
        .meta_mut()
        .annotations
        .get_or_insert_with(Default::default)
        .insert(
            constants::CREATION_STRING_ANNOTATION.to_string(),
            creation_string,
        );
    Ok(annotated)
}

/// The "last known desired" for an observed object: the decoded
/// creation-string annotation, or the live object when the annotation is
/// missing or unreadable. The fallback produces one extra update on the next
/// pass and then self-heals.
fn annotated_previous<K>(observed: &K) -> K
where
    K: Resource + DeserializeOwned + Clone,
{
    let annotation = observed
        .meta()
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(constants::CREATION_STRING_ANNOTATION));
    match annotation {
        Some(json) => match serde_json::from_str(json) {
            Ok(previous) => previous,
            Err(err) => {
                warn!(
                    name = ?observed.meta().name,
                    error = %err,
                    "unreadable creation-string annotation, comparing against live object"
                );
                observed.clone()
            }
        },
        None => {
            warn!(
                name = ?observed.meta().name,
                "missing creation-string annotation, comparing against live object"
            );
            observed.clone()
        }
    }
}

fn name_of<K: Resource>(object: &K) -> String {
    object.meta().name.clone().unwrap_or_default()
}

pub fn diff_services(desired: &[Service], observed: &[Service]) -> Result<ServiceDiff> {
    let mut diff = ServiceDiff::default();

    for current in observed {
        let name = name_of(current);
        match desired.iter().find(|d| name_of(*d) == name) {
            None => diff.remove.push(name),
            Some(next) => {
                let previous = annotated_previous(current);
                if !services_equal(&previous, next) {
                    diff.remove.push(name);
                    diff.create.push(with_creation_annotation(next)?);
                }
            }
        }
    }
    for next in desired {
        if !observed.iter().any(|c| name_of(c) == name_of(next)) {
            diff.create.push(with_creation_annotation(next)?);
        }
    }

    Ok(diff)
}

pub fn diff_deployments(desired: &[Deployment], observed: &[Deployment]) -> Result<DeploymentDiff> {
    let mut diff = DeploymentDiff::default();

    for current in observed {
        let name = name_of(current);
        match desired.iter().find(|d| name_of(*d) == name) {
            None => diff.remove.push(name),
            Some(next) => {
                let previous = annotated_previous(current);
                if !deployments_equal(&previous, next) {
                    // Optimistic concurrency: the replacement carries the
                    // live object's resourceVersion.
                    let mut update = with_creation_annotation(next)?;
                    update.metadata.resource_version =
                        current.metadata.resource_version.clone();
                    diff.update.push(update);
                }
            }
        }
    }
    for next in desired {
        if !observed.iter().any(|c| name_of(c) == name_of(next)) {
            diff.create.push(with_creation_annotation(next)?);
        }
    }

    Ok(diff)
}

/// Weak structural equality for Services: name, labels, service type, and
/// port count. Anything finer produces spurious diffs from server-populated
/// fields, and a missed diff converges on the next pass anyway.
fn services_equal(previous: &Service, next: &Service) -> bool {
    if previous.metadata.name != next.metadata.name
        || previous.metadata.labels != next.metadata.labels
    {
        return false;
    }
    let (previous_spec, next_spec) = match (&previous.spec, &next.spec) {
        (Some(previous_spec), Some(next_spec)) => (previous_spec, next_spec),
        (None, None) => return true,
        _ => return false,
    };
    previous_spec.type_ == next_spec.type_
        && port_count(previous_spec.ports.as_deref()) == port_count(next_spec.ports.as_deref())
}

fn port_count(ports: Option<&[k8s_openapi::api::core::v1::ServicePort]>) -> usize {
    ports.map(<[_]>::len).unwrap_or(0)
}

/// Weak structural equality for Deployments: name, labels, pod template
/// identity, and pairwise container names and images. Volumes and the rest
/// of the container fields are ignored at this layer.
fn deployments_equal(previous: &Deployment, next: &Deployment) -> bool {
    if previous.metadata.name != next.metadata.name
        || previous.metadata.labels != next.metadata.labels
    {
        return false;
    }
    let (previous_spec, next_spec) = match (&previous.spec, &next.spec) {
        (Some(previous_spec), Some(next_spec)) => (previous_spec, next_spec),
        (None, None) => return true,
        _ => return false,
    };
    let previous_meta = previous_spec.template.metadata.as_ref();
    let next_meta = next_spec.template.metadata.as_ref();
    if previous_meta.map(|m| (&m.name, &m.labels)) != next_meta.map(|m| (&m.name, &m.labels)) {
        return false;
    }
    let previous_containers = previous_spec
        .template
        .spec
        .as_ref()
        .map(|s| s.containers.as_slice())
        .unwrap_or_default();
    let next_containers = next_spec
        .template
        .spec
        .as_ref()
        .map(|s| s.containers.as_slice())
        .unwrap_or_default();
    previous_containers.len() == next_containers.len()
        && previous_containers
            .iter()
            .zip(next_containers)
            .all(|(a, b)| a.name == b.name && a.image == b.image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::resources::synthesize;
    use crate::crd::{ModuleConfig, ModuleEntry, ModuleIdentity};
    use crate::settings::test_settings;

    fn entry(module_id: &str, image: &str, ports: bool) -> ModuleEntry {
        ModuleEntry {
            module: ModuleConfig {
                module_type: "docker".to_string(),
                name: module_id.to_string(),
                version: None,
                image: image.to_string(),
                create_options: ports.then(|| {
                    serde_json::from_value(
                        serde_json::json!({ "exposedPorts": { "80/tcp": {} } }),
                    )
                    .unwrap()
                }),
                env: Default::default(),
                auth: None,
                desired_status: None,
                restart_policy: None,
            },
            module_identity: ModuleIdentity {
                hub_hostname: "hub1".to_string(),
                gateway_hostname: None,
                device_id: "dev1".to_string(),
                module_id: module_id.to_string(),
                credentials: None,
            },
        }
    }

    /// What a later list would observe after this pass applied its objects:
    /// the annotated object, possibly with server-populated noise.
    fn as_observed<K>(sent: &K) -> K
    where
        K: Resource + Serialize + DeserializeOwned + Clone,
    {
        sent.clone()
    }

    #[test]
    fn test_empty_cluster_creates_everything() {
        let settings = test_settings();
        let desired = synthesize(&settings, &[entry("m1", "img:1", true)]).unwrap();

        let services = diff_services(&desired.services, &[]).unwrap();
        assert_eq!(services.create.len(), 1);
        assert!(services.remove.is_empty());

        let deployments = diff_deployments(&desired.deployments, &[]).unwrap();
        assert_eq!(deployments.create.len(), 1);
        assert!(deployments.update.is_empty());
        assert!(deployments.remove.is_empty());
    }

    #[test]
    fn test_created_objects_carry_creation_annotation() {
        let settings = test_settings();
        let desired = synthesize(&settings, &[entry("m1", "img:1", true)]).unwrap();
        let diff = diff_deployments(&desired.deployments, &[]).unwrap();

        let annotations = diff.create[0].metadata.annotations.as_ref().unwrap();
        let stored = &annotations["net.azure-devices.edge.creationstring"];
        assert_eq!(stored, &serde_json::to_string(&desired.deployments[0]).unwrap());
    }

    #[test]
    fn test_second_pass_is_idempotent() {
        let settings = test_settings();
        let modules = vec![entry("m1", "img:1", true), entry("m2", "img:2", false)];
        let desired = synthesize(&settings, &modules).unwrap();

        let observed_services: Vec<_> = diff_services(&desired.services, &[])
            .unwrap()
            .create
            .iter()
            .map(as_observed)
            .collect();
        let observed_deployments: Vec<_> = diff_deployments(&desired.deployments, &[])
            .unwrap()
            .create
            .iter()
            .map(as_observed)
            .collect();

        let desired_again = synthesize(&settings, &modules).unwrap();
        let services = diff_services(&desired_again.services, &observed_services).unwrap();
        let deployments =
            diff_deployments(&desired_again.deployments, &observed_deployments).unwrap();

        assert!(services.create.is_empty());
        assert!(services.remove.is_empty());
        assert!(deployments.create.is_empty());
        assert!(deployments.update.is_empty());
        assert!(deployments.remove.is_empty());
    }

    #[test]
    fn test_deleted_deployment_is_recreated() {
        let settings = test_settings();
        let modules = vec![entry("m1", "img:1", false), entry("m2", "img:2", false)];
        let desired = synthesize(&settings, &modules).unwrap();
        let mut observed: Vec<_> = diff_deployments(&desired.deployments, &[])
            .unwrap()
            .create
            .iter()
            .map(as_observed)
            .collect();
        observed.retain(|d| d.metadata.name.as_deref() != Some("hub1-dev1-m1-deployment"));

        let diff = diff_deployments(&desired.deployments, &observed).unwrap();
        assert_eq!(diff.create.len(), 1);
        assert_eq!(
            diff.create[0].metadata.name.as_deref(),
            Some("hub1-dev1-m1-deployment")
        );
        assert!(diff.update.is_empty());
        assert!(diff.remove.is_empty());
    }

    #[test]
    fn test_image_bump_updates_exactly_one_deployment_and_no_service() {
        let settings = test_settings();
        let before = synthesize(&settings, &[entry("m1", "img:1", true)]).unwrap();
        let observed_services: Vec<_> = diff_services(&before.services, &[])
            .unwrap()
            .create
            .iter()
            .map(as_observed)
            .collect();
        let mut observed_deployments: Vec<_> = diff_deployments(&before.deployments, &[])
            .unwrap()
            .create
            .iter()
            .map(as_observed)
            .collect();
        observed_deployments[0].metadata.resource_version = Some("41".to_string());

        let after = synthesize(&settings, &[entry("m1", "img:2", true)]).unwrap();
        let services = diff_services(&after.services, &observed_services).unwrap();
        let deployments = diff_deployments(&after.deployments, &observed_deployments).unwrap();

        assert!(services.create.is_empty());
        assert!(services.remove.is_empty());
        assert_eq!(deployments.update.len(), 1);
        assert!(deployments.create.is_empty());
        assert!(deployments.remove.is_empty());
        // resourceVersion comes from the live object, annotation from the new
        // desired state.
        let update = &deployments.update[0];
        assert_eq!(update.metadata.resource_version.as_deref(), Some("41"));
        let stored = &update.metadata.annotations.as_ref().unwrap()
            ["net.azure-devices.edge.creationstring"];
        assert!(stored.contains("img:2"));
    }

    #[test]
    fn test_removed_module_deletes_its_objects() {
        let settings = test_settings();
        let before = synthesize(&settings, &[entry("m1", "img:1", true)]).unwrap();
        let observed_services: Vec<_> = diff_services(&before.services, &[])
            .unwrap()
            .create
            .iter()
            .map(as_observed)
            .collect();
        let observed_deployments: Vec<_> = diff_deployments(&before.deployments, &[])
            .unwrap()
            .create
            .iter()
            .map(as_observed)
            .collect();

        let services = diff_services(&[], &observed_services).unwrap();
        let deployments = diff_deployments(&[], &observed_deployments).unwrap();
        assert_eq!(services.remove, vec!["m1".to_string()]);
        assert_eq!(deployments.remove, vec!["hub1-dev1-m1-deployment".to_string()]);
        assert!(services.create.is_empty());
        assert!(deployments.create.is_empty());
    }

    #[test]
    fn test_service_type_change_is_delete_plus_create() {
        let settings = test_settings();
        let before = synthesize(&settings, &[entry("m1", "img:1", true)]).unwrap();
        let observed: Vec<_> = diff_services(&before.services, &[])
            .unwrap()
            .create
            .iter()
            .map(as_observed)
            .collect();

        let mut node_port = entry("m1", "img:1", false);
        node_port.module.create_options = Some(
            serde_json::from_value(serde_json::json!({
                "hostConfig": { "portBindings": { "80/tcp": [{ "hostPort": "30080" }] } }
            }))
            .unwrap(),
        );
        let after = synthesize(&settings, &[node_port]).unwrap();
        let diff = diff_services(&after.services, &observed).unwrap();
        assert_eq!(diff.remove, vec!["m1".to_string()]);
        assert_eq!(diff.create.len(), 1);
    }

    #[test]
    fn test_live_object_noise_does_not_trigger_updates() {
        let settings = test_settings();
        let desired = synthesize(&settings, &[entry("m1", "img:1", false)]).unwrap();
        let mut observed: Vec<_> = diff_deployments(&desired.deployments, &[])
            .unwrap()
            .create
            .iter()
            .map(as_observed)
            .collect();
        // Server-populated fields on the live object are invisible to the
        // annotation-based comparison.
        observed[0].metadata.resource_version = Some("7".to_string());
        observed[0].metadata.uid = Some("abc".to_string());
        observed[0].spec.as_mut().unwrap().progress_deadline_seconds = Some(600);

        let again = synthesize(&settings, &[entry("m1", "img:1", false)]).unwrap();
        let diff = diff_deployments(&again.deployments, &observed).unwrap();
        assert!(diff.update.is_empty());
    }

    #[test]
    fn test_missing_annotation_falls_back_to_live_object() {
        let settings = test_settings();
        let desired = synthesize(&settings, &[entry("m1", "img:1", false)]).unwrap();
        // Live object that we never annotated but that happens to match.
        let observed = vec![desired.deployments[0].clone()];
        let diff = diff_deployments(&desired.deployments, &observed).unwrap();
        assert!(diff.update.is_empty());

        // And one that differs: the fallback comparison flags an update.
        let stale = synthesize(&settings, &[entry("m1", "img:0", false)]).unwrap();
        let diff = diff_deployments(&desired.deployments, &stale.deployments).unwrap();
        assert_eq!(diff.update.len(), 1);
    }
}
