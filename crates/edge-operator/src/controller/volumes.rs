use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, EmptyDirVolumeSource, HostPathVolumeSource, Volume, VolumeMount,
};
use tracing::warn;

use crate::constants;
use crate::crd::CreateOptions;
use crate::settings::Settings;

const HOST_PATH_DIRECTORY_OR_CREATE: &str = "DirectoryOrCreate";
const BIND_MOUNT_TYPE: &str = "bind";

/// Pod volumes plus the mounts for each of the two containers.
#[derive(Debug, Default)]
pub struct VolumeSet {
    pub volumes: Vec<Volume>,
    pub module_mounts: Vec<VolumeMount>,
    pub proxy_mounts: Vec<VolumeMount>,
}

/// Assemble the Pod volume set: the fixed workload and proxy-config volumes,
/// then whatever the module's binds and mounts declare. Order-preserving and
/// additive; duplicate names are the deployment author's problem.
pub fn build_volumes(
    settings: &Settings,
    is_agent: bool,
    create_options: Option<&CreateOptions>,
) -> VolumeSet {
    let mut set = VolumeSet::default();

    set.volumes.push(Volume {
        name: constants::WORKLOAD_VOLUME.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    });
    let socket_mount = VolumeMount {
        name: constants::WORKLOAD_VOLUME.to_string(),
        mount_path: settings.socket_dir.clone(),
        ..Default::default()
    };
    set.module_mounts.push(socket_mount.clone());
    set.proxy_mounts.push(socket_mount);

    let config_map_name = if is_agent {
        settings.proxy.agent_config_map_name.clone()
    } else {
        settings.proxy.module_config_map_name.clone()
    };
    set.volumes.push(Volume {
        name: constants::PROXY_CONFIG_VOLUME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map_name,
            ..Default::default()
        }),
        ..Default::default()
    });
    set.proxy_mounts.push(VolumeMount {
        name: constants::PROXY_CONFIG_VOLUME.to_string(),
        mount_path: settings.proxy.config_path.clone(),
        ..Default::default()
    });

    let host_config = match create_options.and_then(|c| c.host_config.as_ref()) {
        Some(host_config) => host_config,
        None => return set,
    };

    for bind in &host_config.binds {
        let mut parts = bind.splitn(3, ':');
        let (src, dst) = match (parts.next(), parts.next()) {
            (Some(src), Some(dst)) if !src.is_empty() && !dst.is_empty() => (src, dst),
            _ => {
                warn!(bind = %bind, "dropping malformed bind");
                continue;
            }
        };
        let read_only = parts.next().is_some_and(|opts| opts.contains("ro"));
        set.volumes.push(host_path_volume(src));
        set.module_mounts.push(VolumeMount {
            name: src.to_string(),
            mount_path: dst.to_string(),
            read_only: Some(read_only),
            ..Default::default()
        });
    }

    for mount in &host_config.mounts {
        if !mount.mount_type.eq_ignore_ascii_case(BIND_MOUNT_TYPE) {
            warn!(mount_type = %mount.mount_type, "ignoring non-bind mount");
            continue;
        }
        set.volumes.push(host_path_volume(&mount.source));
        set.module_mounts.push(VolumeMount {
            name: mount.source.clone(),
            mount_path: mount.target.clone(),
            read_only: Some(mount.read_only),
            ..Default::default()
        });
    }

    set
}

fn host_path_volume(path: &str) -> Volume {
    Volume {
        name: path.to_string(),
        host_path: Some(HostPathVolumeSource {
            path: path.to_string(),
            type_: Some(HOST_PATH_DIRECTORY_OR_CREATE.to_string()),
        }),
        ..Default::default()
    }
}
