use k8s_openapi::api::core::v1::EnvVar;
use tracing::warn;

use crate::constants;
use crate::controller::names;
use crate::crd::{ModuleConfig, ModuleIdentity};
use crate::settings::Settings;

/// Final container environment: the module's semantic env map, then its
/// create-options `KEY=VALUE` entries, then the injected identity variables.
pub fn assemble_env(
    settings: &Settings,
    identity: &ModuleIdentity,
    module: &ModuleConfig,
) -> Vec<EnvVar> {
    let mut env = Vec::new();

    for (name, value) in &module.env {
        env.push(env_var(name, &value.value));
    }

    if let Some(create_options) = &module.create_options {
        for entry in &create_options.env {
            match entry.split_once('=') {
                Some((name, value)) if !name.is_empty() => env.push(env_var(name, value)),
                _ => warn!(entry = %entry, "dropping one-sided env entry"),
            }
        }
    }

    env.push(env_var("IOTEDGE_IOTHUBHOSTNAME", &identity.hub_hostname));
    env.push(env_var("IOTEDGE_AUTHSCHEME", constants::AUTH_SCHEME_SAS));
    env.push(env_var("RuntimeLogLevel", &settings.runtime_log_level));
    env.push(env_var("IOTEDGE_WORKLOADURI", &settings.workload_uri));
    env.push(env_var(
        "IOTEDGE_GATEWAYHOSTNAME",
        constants::GATEWAY_HOSTNAME,
    ));
    let generation_id = identity
        .credentials
        .as_ref()
        .map(|c| c.generation_id.as_str())
        .unwrap_or_default();
    env.push(env_var("IOTEDGE_MODULEGENERATIONID", generation_id));
    env.push(env_var("IOTEDGE_DEVICEID", &identity.device_id));
    env.push(env_var("IOTEDGE_MODULEID", &identity.module_id));
    env.push(env_var(
        "IOTEDGE_APIVERSION",
        constants::WORKLOAD_API_VERSION,
    ));

    let is_agent = names::is_edge_agent(&identity.module_id);
    if is_agent {
        env.push(env_var("Mode", constants::RUNTIME_MODE_KUBERNETES));
        env.push(env_var("IOTEDGE_MANAGEMENTURI", &settings.management_uri));
        env.push(env_var("NetworkId", constants::NETWORK_ID));
    }
    if is_agent || names::is_edge_hub(&identity.module_id) {
        env.push(env_var("EdgeDeviceHostName", &settings.edge_device_hostname));
    }

    env
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}
