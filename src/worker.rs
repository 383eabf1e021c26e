use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::pipeline::{self, PipelineConfig, Services};
use crate::queue::{JobQueue, PanelStore};

/// Claim and process at most one job. Returns `Ok(true)` when a job was
/// processed (successfully or not), `Ok(false)` when the queue was empty.
#[instrument(skip_all)]
pub async fn process_next_job(
    queue: &dyn JobQueue,
    panels: &dyn PanelStore,
    services: &Services,
    cfg: &PipelineConfig,
) -> Result<bool> {
    let Some(job) = queue.claim_next().await? else {
        return Ok(false);
    };

    match pipeline::run_job(queue, panels, services, cfg, &job).await {
        Ok(stored) => {
            queue.complete(&job.id).await?;
            info!(job_id = %job.id, stored, "job succeeded");
        }
        Err(err) => {
            let message = err.to_string();
            warn!(job_id = %job.id, error = %message, "job failed");
            queue.fail(&job.id, &message).await?;
        }
    }
    Ok(true)
}
