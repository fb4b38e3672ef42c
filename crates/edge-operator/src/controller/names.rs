use std::collections::BTreeMap;

use crate::constants;

/// Kubernetes-safe name for a module id. The agent and hub carry reserved
/// names; everything else is lowercased as-is.
pub fn canonical_module_name(module_id: &str) -> String {
    let bare = module_id.trim_start_matches('$');
    if bare.eq_ignore_ascii_case(constants::EDGE_AGENT_MODULE_ID) {
        constants::EDGE_AGENT_CANONICAL_NAME.to_string()
    } else if bare.eq_ignore_ascii_case(constants::EDGE_HUB_MODULE_ID) {
        constants::EDGE_HUB_CANONICAL_NAME.to_string()
    } else {
        bare.to_lowercase()
    }
}

pub fn is_edge_agent(module_id: &str) -> bool {
    canonical_module_name(module_id) == constants::EDGE_AGENT_CANONICAL_NAME
}

pub fn is_edge_hub(module_id: &str) -> bool {
    canonical_module_name(module_id) == constants::EDGE_HUB_CANONICAL_NAME
}

/// The `{module, device, hub}` label triple stamped on every owned object.
pub fn identity_labels(
    hub_hostname: &str,
    device_id: &str,
    module_id: &str,
) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(
        constants::EDGE_MODULE_LABEL.to_string(),
        canonical_module_name(module_id),
    );
    labels.insert(constants::EDGE_DEVICE_LABEL.to_string(), device_id.to_string());
    labels.insert(
        constants::EDGE_HUBNAME_LABEL.to_string(),
        hub_hostname.to_string(),
    );
    labels
}

pub fn deployment_name(hub_hostname: &str, device_id: &str, module_id: &str) -> String {
    format!(
        "{}{div}{}{div}{}{div}deployment",
        hub_hostname,
        device_id,
        canonical_module_name(module_id),
        div = constants::NAME_DIVIDER
    )
    .to_lowercase()
}

pub fn service_name(module_id: &str) -> String {
    canonical_module_name(module_id)
}

/// Label selector matching every object owned by this device's controller.
pub fn device_selector(hub_hostname: &str, device_id: &str) -> String {
    format!(
        "{}={},{}={}",
        constants::EDGE_DEVICE_LABEL,
        device_id,
        constants::EDGE_HUBNAME_LABEL,
        hub_hostname
    )
}
