//! The produced interface: submit a generation request and query its status.

use anyhow::Result;
use tracing::info;
use uuid::Uuid;

use crate::db::NewJob;
use crate::error::SubmitError;
use crate::model::{JobStatus, JobView, Submission};
use crate::queue::JobQueue;
use crate::validate;

/// Validate the submission and enqueue it. No stage runs here; the worker
/// picks the job up asynchronously. Rejected submissions leave no trace.
pub async fn submit(
    queue: &dyn JobQueue,
    image: &[u8],
    declared_len: usize,
    prompt: &str,
    language: Option<&str>,
) -> Result<Submission, SubmitError> {
    let image_data_uri = validate::validate_image(image, declared_len)?;

    let job_id = Uuid::new_v4().to_string();
    queue
        .enqueue(NewJob {
            id: job_id.clone(),
            prompt: prompt.to_string(),
            language: language.map(|l| l.to_string()),
            image_data_uri,
        })
        .await
        .map_err(|e| SubmitError::Queue(format!("{e:#}")))?;

    info!(job_id = %job_id, "job queued");
    Ok(Submission {
        job_id,
        status: JobStatus::Queued,
    })
}

/// Snapshot a job's status, progress, error, and stored panels.
/// Unknown ids yield `None`.
pub async fn job_status(queue: &dyn JobQueue, job_id: &str) -> Result<Option<JobView>> {
    queue.job_view(job_id).await
}
