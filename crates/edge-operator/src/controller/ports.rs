use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ContainerPort, ServicePort};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use tracing::warn;

use crate::crd::CreateOptions;

const SERVICE_TYPE_CLUSTER_IP: &str = "ClusterIP";
const SERVICE_TYPE_NODE_PORT: &str = "NodePort";

/// A validated `"port/proto"` entry. Protocol is emitted uppercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposedPort {
    pub port: i32,
    pub protocol: String,
}

/// Service ports for a module plus the service type they imply.
#[derive(Debug, Default)]
pub struct ServicePortSet {
    pub ports: Vec<ServicePort>,
    node_port: bool,
}

impl ServicePortSet {
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn service_type(&self) -> &'static str {
        if self.node_port {
            SERVICE_TYPE_NODE_PORT
        } else {
            SERVICE_TYPE_CLUSTER_IP
        }
    }
}

/// Parse `"port/proto"`. Returns `None` (and logs) on anything malformed;
/// the rest of the module continues without the entry.
pub fn parse_port_proto(entry: &str) -> Option<ExposedPort> {
    let (port, proto) = match entry.split_once('/') {
        Some(parts) => parts,
        None => {
            warn!(entry, "dropping port without protocol");
            return None;
        }
    };
    let port: i32 = match port.parse() {
        Ok(port) if port >= 0 => port,
        _ => {
            warn!(entry, "dropping port with non-numeric value");
            return None;
        }
    };
    let protocol = match proto.to_uppercase().as_str() {
        p @ ("TCP" | "UDP" | "SCTP") => p.to_string(),
        _ => {
            warn!(entry, "dropping port with unknown protocol");
            return None;
        }
    };
    Some(ExposedPort { port, protocol })
}

/// Service ports for a module: exposed ports target themselves, host-port
/// bindings override the target with the host port and force NodePort.
pub fn service_ports(create_options: &CreateOptions) -> ServicePortSet {
    let mut ports: BTreeMap<(i32, String), ServicePort> = BTreeMap::new();
    let mut node_port = false;

    for entry in create_options.exposed_ports.keys() {
        if let Some(exposed) = parse_port_proto(entry) {
            ports.insert(
                (exposed.port, exposed.protocol.clone()),
                to_service_port(&exposed, exposed.port),
            );
        }
    }

    if let Some(host_config) = &create_options.host_config {
        for (entry, bindings) in &host_config.port_bindings {
            let exposed = match parse_port_proto(entry) {
                Some(exposed) => exposed,
                None => continue,
            };
            for binding in bindings {
                let host_port: i32 = match binding.host_port.parse() {
                    Ok(port) => port,
                    Err(_) => {
                        warn!(entry = %entry, host_port = %binding.host_port, "dropping non-numeric host port");
                        continue;
                    }
                };
                ports.insert(
                    (exposed.port, exposed.protocol.clone()),
                    to_service_port(&exposed, host_port),
                );
                node_port = true;
            }
        }
    }

    ServicePortSet {
        ports: ports.into_values().collect(),
        node_port,
    }
}

/// Container ports come from exposed ports only.
pub fn container_ports(create_options: &CreateOptions) -> Vec<ContainerPort> {
    create_options
        .exposed_ports
        .keys()
        .filter_map(|entry| parse_port_proto(entry))
        .map(|exposed| ContainerPort {
            container_port: exposed.port,
            protocol: Some(exposed.protocol),
            ..Default::default()
        })
        .collect()
}

fn to_service_port(exposed: &ExposedPort, target_port: i32) -> ServicePort {
    ServicePort {
        name: Some(format!(
            "{}-{}",
            exposed.protocol.to_lowercase(),
            exposed.port
        )),
        port: exposed.port,
        target_port: Some(IntOrString::Int(target_port)),
        protocol: Some(exposed.protocol.clone()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{HostConfig, PortBinding};

    fn create_options(json: serde_json::Value) -> CreateOptions {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_parse_port_proto() {
        assert_eq!(
            parse_port_proto("80/tcp"),
            Some(ExposedPort {
                port: 80,
                protocol: "TCP".to_string()
            })
        );
        assert_eq!(parse_port_proto("53/UDP").unwrap().protocol, "UDP");
        assert_eq!(parse_port_proto("132/sctp").unwrap().protocol, "SCTP");
    }

    #[test]
    fn test_parse_port_proto_rejects_malformed() {
        assert!(parse_port_proto("80").is_none());
        assert!(parse_port_proto("eighty/tcp").is_none());
        assert!(parse_port_proto("-1/tcp").is_none());
        assert!(parse_port_proto("80/icmp").is_none());
    }

    #[test]
    fn test_exposed_port_targets_itself() {
        let create = create_options(serde_json::json!({
            "exposedPorts": { "80/tcp": {} }
        }));
        let set = service_ports(&create);
        assert_eq!(set.ports.len(), 1);
        assert_eq!(set.ports[0].port, 80);
        assert_eq!(set.ports[0].target_port, Some(IntOrString::Int(80)));
        assert_eq!(set.ports[0].protocol.as_deref(), Some("TCP"));
        assert_eq!(set.service_type(), "ClusterIP");
    }

    #[test]
    fn test_host_binding_overrides_target_and_forces_node_port() {
        let create = create_options(serde_json::json!({
            "hostConfig": {
                "portBindings": { "8080/tcp": [{ "hostPort": "30080" }] }
            }
        }));
        let set = service_ports(&create);
        assert_eq!(set.ports.len(), 1);
        assert_eq!(set.ports[0].port, 8080);
        assert_eq!(set.ports[0].target_port, Some(IntOrString::Int(30080)));
        assert_eq!(set.service_type(), "NodePort");
    }

    #[test]
    fn test_binding_wins_over_exposed_for_same_port() {
        let create = create_options(serde_json::json!({
            "exposedPorts": { "8080/tcp": {} },
            "hostConfig": {
                "portBindings": { "8080/tcp": [{ "hostPort": "30080" }] }
            }
        }));
        let set = service_ports(&create);
        assert_eq!(set.ports.len(), 1);
        assert_eq!(set.ports[0].target_port, Some(IntOrString::Int(30080)));
    }

    #[test]
    fn test_invalid_host_port_is_dropped_without_node_port() {
        let create = CreateOptions {
            host_config: Some(HostConfig {
                port_bindings: [(
                    "8080/tcp".to_string(),
                    vec![PortBinding {
                        host_ip: None,
                        host_port: "not-a-port".to_string(),
                    }],
                )]
                .into_iter()
                .collect(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let set = service_ports(&create);
        assert!(set.is_empty());
        assert_eq!(set.service_type(), "ClusterIP");
    }

    #[test]
    fn test_container_ports_come_from_exposed_only() {
        let create = create_options(serde_json::json!({
            "exposedPorts": { "80/tcp": {}, "bad": {} },
            "hostConfig": {
                "portBindings": { "8080/tcp": [{ "hostPort": "30080" }] }
            }
        }));
        let ports = container_ports(&create);
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].container_port, 80);
    }
}
