//! Wire-level constants shared between the reconciler and the status tracker.

/// Namespace that holds every workload object owned by the operator.
pub const EDGE_NAMESPACE: &str = "microsoft-azure-devices-edge";

pub const EDGE_MODULE_LABEL: &str = "net.azure-devices.edge.module";

pub const EDGE_DEVICE_LABEL: &str = "net.azure-devices.edge.deviceid";

pub const EDGE_HUBNAME_LABEL: &str = "net.azure-devices.edge.hub";

/// Annotation carrying the JSON of the object as last written by us.
pub const CREATION_STRING_ANNOTATION: &str = "net.azure-devices.edge.creationstring";

pub const NAME_DIVIDER: &str = "-";

pub const PULL_SECRET_TYPE: &str = "kubernetes.io/dockerconfigjson";

pub const PULL_SECRET_DATA: &str = ".dockerconfigjson";

/// Image-pull secrets live here, not in [`EDGE_NAMESPACE`].
pub const PULL_SECRET_NAMESPACE: &str = "default";

pub const PROXY_CONTAINER_NAME: &str = "proxy";

pub const PROXY_IMAGE_DEFAULT: &str = "envoyproxy/envoy:latest";

pub const PROXY_CONFIG_PATH_DEFAULT: &str = "/etc/envoy";

pub const PROXY_CONFIG_VOLUME: &str = "config-volume";

pub const WORKLOAD_VOLUME: &str = "workload";

pub const SOCKET_DIR_DEFAULT: &str = "/var/run/iotedge";

pub const WORKLOAD_URI_DEFAULT: &str = "unix:///var/run/iotedge/workload.sock";

pub const MANAGEMENT_URI_DEFAULT: &str = "unix:///var/run/iotedge/mgmt.sock";

pub const WORKLOAD_API_VERSION: &str = "2018-06-28";

pub const EDGE_AGENT_MODULE_ID: &str = "edgeAgent";

pub const EDGE_HUB_MODULE_ID: &str = "edgeHub";

pub const EDGE_AGENT_CANONICAL_NAME: &str = "edgeagent";

pub const EDGE_HUB_CANONICAL_NAME: &str = "edgehub";

/// Gateway hostname injected into every module's environment.
pub const GATEWAY_HOSTNAME: &str = "edgehub";

pub const AUTH_SCHEME_SAS: &str = "sasToken";

pub const RUNTIME_MODE_KUBERNETES: &str = "kubernetes";

pub const NETWORK_ID: &str = "azure-iot-edge";

/// The only module type the reconciler accepts.
pub const DOCKER_MODULE_TYPE: &str = "docker";
