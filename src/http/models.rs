//! JSON shapes exchanged with the remote judge and with control-plane callers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentDto {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubmissionDto {
    pub environment_id: i64,
    pub source_code: String,
    pub stdin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenDto {
    pub token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmissionDto {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    pub status: Option<i32>,
    pub time_ms: Option<f64>,
    pub memory_kb: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunRequestDto {
    pub language_key: Option<String>,
    pub source_code: Option<String>,
    pub stdin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponseDto {
    pub language_key: String,
    pub stdout_text: String,
    pub stderr_text: String,
    pub time_ms: Option<u64>,
    pub memory_kb: Option<u64>,
    pub status_code: Option<i32>,
}
