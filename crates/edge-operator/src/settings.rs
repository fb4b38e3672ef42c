use std::path::Path;

use serde::Deserialize;

use crate::constants;
use crate::error::{Error, Result};

/// Operator settings: the device identity this instance serves plus the
/// reserved values wired into every synthesized Pod.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// IoT hub hostname this device belongs to.
    pub hub_hostname: String,
    /// Device whose deployment this operator reconciles.
    pub device_id: String,
    /// Hostname handed to the agent and hub modules as `EdgeDeviceHostName`.
    #[serde(default)]
    pub edge_device_hostname: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_log_level")]
    pub runtime_log_level: String,
    #[serde(default = "default_workload_uri")]
    pub workload_uri: String,
    #[serde(default = "default_management_uri")]
    pub management_uri: String,
    #[serde(default = "default_socket_dir")]
    pub socket_dir: String,
    #[serde(default)]
    pub proxy: ProxySettings,
}

/// Sidecar proxy configuration shared by every module Pod.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxySettings {
    #[serde(default = "default_proxy_image")]
    pub image: String,
    #[serde(default = "default_proxy_config_path")]
    pub config_path: String,
    /// ConfigMap backing the proxy in the agent's Pod.
    #[serde(default = "default_agent_config_map")]
    pub agent_config_map_name: String,
    /// ConfigMap backing the proxy in every other module's Pod.
    #[serde(default = "default_module_config_map")]
    pub module_config_map_name: String,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            image: default_proxy_image(),
            config_path: default_proxy_config_path(),
            agent_config_map_name: default_agent_config_map(),
            module_config_map_name: default_module_config_map(),
        }
    }
}

fn default_namespace() -> String {
    constants::EDGE_NAMESPACE.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_workload_uri() -> String {
    constants::WORKLOAD_URI_DEFAULT.to_string()
}

fn default_management_uri() -> String {
    constants::MANAGEMENT_URI_DEFAULT.to_string()
}

fn default_socket_dir() -> String {
    constants::SOCKET_DIR_DEFAULT.to_string()
}

fn default_proxy_image() -> String {
    constants::PROXY_IMAGE_DEFAULT.to_string()
}

fn default_proxy_config_path() -> String {
    constants::PROXY_CONFIG_PATH_DEFAULT.to_string()
}

fn default_agent_config_map() -> String {
    "iotedged-proxy-config".to_string()
}

fn default_module_config_map() -> String {
    "module-proxy-config".to_string()
}

impl Settings {
    /// Name of the custom resource this operator instance serves.
    pub fn resource_name(&self) -> String {
        format!(
            "{}{}{}",
            self.hub_hostname,
            constants::NAME_DIVIDER,
            self.device_id
        )
        .to_lowercase()
    }

    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path.as_ref()).required(false));
        }
        let config = builder
            .add_source(config::Environment::with_prefix("IOTEDGE").separator("__"))
            .build()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.hub_hostname.is_empty() {
            return Err(Error::InvalidConfig("hub_hostname must be set".to_string()));
        }
        if self.device_id.is_empty() {
            return Err(Error::InvalidConfig("device_id must be set".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_settings() -> Settings {
    Settings {
        hub_hostname: "hub1".to_string(),
        device_id: "dev1".to_string(),
        edge_device_hostname: "edge-device".to_string(),
        namespace: default_namespace(),
        runtime_log_level: default_log_level(),
        workload_uri: default_workload_uri(),
        management_uri: default_management_uri(),
        socket_dir: default_socket_dir(),
        proxy: ProxySettings::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_name_joins_hub_and_device() {
        let settings = test_settings();
        assert_eq!(settings.resource_name(), "hub1-dev1");
    }

    #[test]
    fn test_resource_name_is_lowercased() {
        let mut settings = test_settings();
        settings.hub_hostname = "Hub1.Azure-Devices.NET".to_string();
        settings.device_id = "Dev1".to_string();
        assert_eq!(settings.resource_name(), "hub1.azure-devices.net-dev1");
    }

    #[test]
    fn test_defaults_carry_reserved_values() {
        let settings = test_settings();
        assert_eq!(settings.namespace, "microsoft-azure-devices-edge");
        assert_eq!(settings.workload_uri, "unix:///var/run/iotedge/workload.sock");
        assert_eq!(settings.management_uri, "unix:///var/run/iotedge/mgmt.sock");
        assert_eq!(settings.proxy.image, "envoyproxy/envoy:latest");
        assert_eq!(settings.proxy.config_path, "/etc/envoy");
    }
}
