use std::collections::HashMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{ContainerState, Node, Pod};
use kube::api::{Api, ListParams};
use kube::Client;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::constants;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModuleStatus {
    Running,
    Failed,
    Unknown,
}

/// Synthesized runtime view of one module, derived from its Pod.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleRuntimeInfo {
    pub name: String,
    pub status: ModuleStatus,
    pub description: String,
    pub exit_code: i32,
    pub start_time: Option<DateTime<Utc>>,
    pub exit_time: Option<DateTime<Utc>>,
    pub image: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub os_type: String,
    pub architecture: String,
    pub version: String,
}

/// A pod watch event, already classified by the supervisor.
#[derive(Debug)]
pub enum PodEvent {
    Applied(Pod),
    Deleted(Pod),
}

/// Module-name-to-runtime-record map. The mutex is the only shared mutable
/// state in the operator; holders do no long work under it.
#[derive(Debug, Default)]
pub struct ModuleStatusMap {
    records: Mutex<HashMap<String, ModuleRuntimeInfo>>,
}

impl ModuleStatusMap {
    pub async fn handle_pod_event(&self, event: PodEvent) {
        match event {
            PodEvent::Applied(pod) => {
                if let Some((name, record)) = runtime_info_from_pod(&pod) {
                    self.records.lock().await.insert(name, record);
                }
            }
            PodEvent::Deleted(pod) => {
                if let Some(name) = module_label(&pod) {
                    self.records.lock().await.remove(&name);
                }
            }
        }
    }

    /// Snapshot of the current records; mutating the result does not affect
    /// later reads.
    pub async fn get_modules(&self) -> Vec<ModuleRuntimeInfo> {
        self.records.lock().await.values().cloned().collect()
    }
}

fn module_label(pod: &Pod) -> Option<String> {
    pod.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(constants::EDGE_MODULE_LABEL))
        .cloned()
}

/// Project a Pod onto a module runtime record. Pods without the module
/// label belong to someone else and yield `None`.
pub fn runtime_info_from_pod(pod: &Pod) -> Option<(String, ModuleRuntimeInfo)> {
    let module_name = module_label(pod)?;

    let container_status = pod.status.as_ref().and_then(|status| {
        status
            .container_statuses
            .as_ref()
            .and_then(|statuses| {
                statuses
                    .iter()
                    .find(|cs| cs.name.eq_ignore_ascii_case(&module_name))
            })
    });
    let container_status = match container_status {
        Some(container_status) => container_status,
        None => {
            debug!(module = %module_name, "pod carries no status for its module container");
            let record = ModuleRuntimeInfo {
                name: module_name.clone(),
                status: ModuleStatus::Unknown,
                description: "Unknown".to_string(),
                exit_code: 0,
                start_time: None,
                exit_time: None,
                image: String::new(),
            };
            return Some((module_name, record));
        }
    };

    let (status, description) = describe_state(container_status.state.as_ref());
    let (exit_code, start_time, exit_time) = last_state(container_status.last_state.as_ref());

    let record = ModuleRuntimeInfo {
        name: module_name.clone(),
        status,
        description,
        exit_code,
        start_time,
        exit_time,
        image: container_status.image.clone(),
    };
    Some((module_name, record))
}

fn describe_state(state: Option<&ContainerState>) -> (ModuleStatus, String) {
    let state = match state {
        Some(state) => state,
        None => return (ModuleStatus::Unknown, "Unknown".to_string()),
    };
    if let Some(running) = &state.running {
        let since = running
            .started_at
            .as_ref()
            .map(|t| t.0.to_rfc3339())
            .unwrap_or_default();
        return (ModuleStatus::Running, format!("Started at {since}"));
    }
    if let Some(terminated) = &state.terminated {
        let message = terminated
            .message
            .clone()
            .unwrap_or_else(|| format!("Exited with {}", terminated.exit_code));
        return (ModuleStatus::Failed, message);
    }
    if let Some(waiting) = &state.waiting {
        let message = waiting
            .message
            .clone()
            .or_else(|| waiting.reason.clone())
            .unwrap_or_else(|| "Waiting".to_string());
        return (ModuleStatus::Failed, message);
    }
    (ModuleStatus::Unknown, "Unknown".to_string())
}

fn last_state(
    state: Option<&ContainerState>,
) -> (i32, Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let state = match state {
        Some(state) => state,
        None => return (0, None, None),
    };
    if let Some(running) = &state.running {
        return (0, running.started_at.as_ref().map(|t| t.0), None);
    }
    if let Some(terminated) = &state.terminated {
        return (
            terminated.exit_code,
            terminated.started_at.as_ref().map(|t| t.0),
            terminated.finished_at.as_ref().map(|t| t.0),
        );
    }
    (0, None, None)
}

/// Host facts derived from the first node's status.
pub async fn system_info(client: &Client) -> Result<SystemInfo> {
    let nodes: Api<Node> = Api::all(client.clone());
    let node_list = nodes.list(&ListParams::default()).await?;
    let node_info = node_list
        .items
        .first()
        .and_then(|node| node.status.as_ref())
        .and_then(|status| status.node_info.as_ref())
        .ok_or_else(|| Error::MissingField("node status".to_string()))?;
    Ok(SystemInfo {
        os_type: node_info.operating_system.clone(),
        architecture: node_info.architecture.clone(),
        version: node_info.os_image.clone(),
    })
}
