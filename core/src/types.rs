//! Workflow-engine DTOs returned by the query catalogue.
//!
//! # Design
//! Only the fields the client relies on are modelled; unknown fields are
//! ignored so engine additions do not break decoding. The mock-server crate
//! defines its own copies; the end-to-end tests catch schema drift.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    pub count: u64,
    pub total: u64,
    pub pages: u64,
}

/// A page of results, as returned by the engine's listing endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub results: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessGroup {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessModel {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_file_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessInstance {
    pub id: i64,
    pub process_model_identifier: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub process_instance_id: i64,
    pub state: String,
    #[serde(default)]
    pub data: Value,
}

/// Input of the complete-task write.
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteTask {
    pub process_instance_id: i64,
    pub task_id: String,
    pub form_data: Value,
}
