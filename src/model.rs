use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse_state(s: &str) -> Option<JobStatus> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "succeeded" => Some(JobStatus::Succeeded),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// Acknowledgement returned by `jobs::submit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub job_id: String,
    pub status: JobStatus,
}

/// One stored panel as exposed through the status query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelView {
    pub index: i64,
    pub image_url: String,
    pub dialogue: String,
}

/// Job snapshot exposed through the status query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub id: String,
    pub status: JobStatus,
    pub progress: i64,
    pub error: Option<String>,
    pub panels: Vec<PanelView>,
}

/// A durable panel row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelRecord {
    pub id: i64,
    pub job_id: String,
    pub panel_index: i64,
    pub image_url: String,
    pub dialogue: String,
}

/// One normalized scenario slot, 1-based index within the sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioPanel {
    pub index: u32,
    pub description: String,
    pub dialogue: Vec<String>,
}
