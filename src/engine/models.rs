use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Exit code reported for runs killed by the wall-clock deadline.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub code: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub language: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub workspace_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub file_id: String,
}

/// `null` reads as absent so the gate reports it as a missing field.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Wall-clock milliseconds from provisioning to classification.
    pub execution_time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub execution_id: Uuid,
    pub workspace_id: String,
    pub file_id: String,
    pub language: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub execution_time_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn new(execution_id: Uuid, request: &ExecutionRequest, result: &ExecutionResult) -> Self {
        Self {
            execution_id,
            workspace_id: request.workspace_id.clone(),
            file_id: request.file_id.clone(),
            language: request.language.clone(),
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
            exit_code: result.exit_code,
            execution_time_ms: result.execution_time,
            recorded_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguagesResponse {
    pub languages: Vec<String>,
}
