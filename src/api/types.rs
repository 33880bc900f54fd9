//! Request and response bodies of the viewer API

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::TargetId;
use crate::actors::messages::{TargetReport, TargetSummary};
use crate::storage::{AlertRow, SampleRow};

/// Response for GET /api/v1/health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub storage: StorageHealth,
    pub viewers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageHealth {
    pub healthy: bool,
    pub message: String,
    pub metadata: HashMap<String, String>,
}

/// Response for GET /api/v1/targets/:id/samples
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplesResponse {
    pub target_id: TargetId,
    pub count: usize,
    pub samples: Vec<SampleRow>,
}

/// Query for GET /api/v1/targets/:id/samples
#[derive(Debug, Clone, Deserialize)]
pub struct SamplesQuery {
    #[serde(default = "default_sample_limit")]
    pub limit: usize,
}

fn default_sample_limit() -> usize {
    100
}

/// Query for GET /api/v1/samples
#[derive(Debug, Clone, Deserialize)]
pub struct SampleHistoryQuery {
    pub target_id: Option<TargetId>,
    #[serde(default = "default_history_hours")]
    pub hours: u32,
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_hours() -> u32 {
    24
}

fn default_history_limit() -> usize {
    1000
}

/// Response for GET /api/v1/samples, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleHistoryResponse {
    pub since: DateTime<Utc>,
    pub count: usize,
    pub samples: Vec<SampleRow>,
}

/// Response for DELETE /api/v1/samples
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClearSamplesResponse {
    pub deleted: usize,
}

/// Response for POST /api/v1/targets: the new target and the result of
/// the connection test run right after registering it
#[derive(Debug, Clone, Serialize)]
pub struct CreatedTargetResponse {
    pub target: TargetSummary,
    pub connection: Option<TargetReport>,
}

/// Response for DELETE /api/v1/targets/:id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemovedTargetResponse {
    pub removed: TargetId,
}

/// Response for GET /api/v1/alerts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsResponse {
    pub count: usize,
    pub alerts: Vec<AlertRow>,
}

/// Query for GET /api/v1/alerts
#[derive(Debug, Clone, Deserialize)]
pub struct AlertsQuery {
    #[serde(default)]
    pub resolved: bool,
    #[serde(default = "default_alert_limit")]
    pub limit: usize,
}

fn default_alert_limit() -> usize {
    50
}

/// Response for the alert resolution endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolveResponse {
    pub resolved: usize,
}
