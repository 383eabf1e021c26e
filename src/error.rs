use thiserror::Error;

/// Rejections raised at submission time, before anything is enqueued.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("image payload is missing")]
    Missing,
    #[error("image payload is too small ({0} bytes)")]
    TooSmall(usize),
    #[error("image payload is not valid base64")]
    NotBase64,
    #[error("decoded image is too small ({0} bytes)")]
    DecodedTooSmall(usize),
    #[error("decoded image exceeds the size limit ({0} bytes)")]
    TooLarge(usize),
}

/// Per-panel failures. Degraded by default: the panel is skipped and the job
/// continues unless `abort_on_panel_failure` is set.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("synthesis failed: {0}")]
    Synthesis(String),
    #[error("storage upload failed: {0}")]
    Storage(String),
    #[error("panel persistence failed: {0}")]
    Persistence(String),
}

/// Failures that terminate a running job.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("upstream call failed: {0}")]
    Upstream(String),
    #[error("scenario response unusable: {0}")]
    ScenarioParse(String),
    #[error("stage timed out: {0}")]
    Timeout(String),
    #[error("panel {index} failed: {source}")]
    Panel {
        index: i64,
        source: PanelError,
    },
}

/// Errors surfaced by `jobs::submit`.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("failed to enqueue job: {0}")]
    Queue(String),
}
