use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::constants;

/// Desired module set for a single device. The resource name encodes the
/// device identity as `<hubHostname>-<deviceId>`; resources with any other
/// name are ignored by the reconciler.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "microsoft.azure.devices.edge",
    version = "v1beta1",
    kind = "EdgeDeployment",
    plural = "edgedeployments"
)]
#[serde(transparent)]
pub struct EdgeDeploymentSpec {
    pub modules: Vec<ModuleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleEntry {
    pub module: ModuleConfig,
    pub module_identity: ModuleIdentity,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConfig {
    /// Only `docker` modules are reconciled; anything else is skipped.
    #[serde(rename = "type")]
    pub module_type: String,
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    pub image: String,
    #[serde(default)]
    pub create_options: Option<CreateOptions>,
    /// Semantic environment overlaid on top of `createOptions.env`.
    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,
    #[serde(default)]
    pub auth: Option<RegistryAuth>,
    #[serde(default)]
    pub desired_status: Option<String>,
    #[serde(default)]
    pub restart_policy: Option<String>,
}

impl ModuleConfig {
    pub fn is_docker(&self) -> bool {
        self.module_type.eq_ignore_ascii_case(constants::DOCKER_MODULE_TYPE)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnvValue {
    pub value: String,
}

/// Container create options in the docker wire shape, camelCased.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOptions {
    /// `"port/proto"` keys; values are empty objects on the wire.
    #[serde(default)]
    pub exposed_ports: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub host_config: Option<HostConfig>,
    /// `KEY=VALUE` entries.
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    /// `"port/proto"` keys mapping to host bindings.
    #[serde(default)]
    pub port_bindings: BTreeMap<String, Vec<PortBinding>>,
    /// `src:dst[:opts]` strings.
    #[serde(default)]
    pub binds: Vec<String>,
    #[serde(default)]
    pub mounts: Vec<MountSpec>,
    #[serde(default)]
    pub privileged: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortBinding {
    #[serde(default)]
    pub host_ip: Option<String>,
    pub host_port: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MountSpec {
    #[serde(rename = "type")]
    pub mount_type: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub read_only: bool,
}

/// Docker registry credential attached to a module's image reference.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
    pub serveraddress: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleIdentity {
    pub hub_hostname: String,
    #[serde(default)]
    pub gateway_hostname: Option<String>,
    pub device_id: String,
    pub module_id: String,
    #[serde(default)]
    pub credentials: Option<ModuleCredentials>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleCredentials {
    pub auth_scheme: String,
    pub generation_id: String,
}
