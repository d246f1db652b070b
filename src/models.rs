use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::TrimResult;
use crate::time::parse_time;

/// A start or end offset as sent by a client: seconds, or a time string.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum TimeInput {
    Seconds(f64),
    Text(String),
}

impl TimeInput {
    pub fn to_seconds(&self) -> TrimResult<f64> {
        match self {
            TimeInput::Seconds(s) => Ok(*s),
            TimeInput::Text(t) => parse_time(t),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct LoginRequest {
    pub passphrase: String,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct LoginResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct TrimBody {
    pub source_url: String,
    pub start: TimeInput,
    pub end: TimeInput,
}

/// Returned to the caller as soon as the job is launched.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TrimLaunch {
    pub title: String,
}

/// A finished job.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TrimOutcome {
    pub title: String,
    pub artifact_url: String,
    pub artifact_path: PathBuf,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub busy: bool,
    pub last_artifact_url: Option<String>,
}
