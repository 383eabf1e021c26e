//! The per-job stage sequence: describe the image, generate the scenario,
//! then synthesize, upload, and persist each of the twelve panels in order.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::db::ClaimedJob;
use crate::error::{PanelError, StageError};
use crate::model::ScenarioPanel;
use crate::openai::ChatService;
use crate::queue::{JobQueue, PanelStore};
use crate::scenario;
use crate::stability::ImageSynthesis;
use crate::storage::{content_type_for, ObjectStore};

pub use crate::scenario::PANEL_COUNT;

/// Knobs the pipeline needs from the application config.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub stage_timeout: Duration,
    pub abort_on_panel_failure: bool,
    pub bucket: String,
    pub output_format: String,
}

impl PipelineConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            stage_timeout: Duration::from_secs(cfg.app.stage_timeout_seconds),
            abort_on_panel_failure: cfg.app.abort_on_panel_failure,
            bucket: cfg.storage.bucket.clone(),
            output_format: cfg.stability.output_format.clone(),
        }
    }
}

/// Collaborator handles, constructed once and shared read-only.
#[derive(Clone)]
pub struct Services {
    pub chat: Arc<dyn ChatService>,
    pub synthesis: Arc<dyn ImageSynthesis>,
    pub storage: Arc<dyn ObjectStore>,
}

enum CallError {
    Failed(String),
    TimedOut(String),
}

impl CallError {
    fn into_message(self) -> String {
        match self {
            CallError::Failed(msg) | CallError::TimedOut(msg) => msg,
        }
    }

    fn into_stage_error(self) -> StageError {
        match self {
            CallError::Failed(msg) => StageError::Upstream(msg),
            CallError::TimedOut(msg) => StageError::Timeout(msg),
        }
    }
}

/// Wrap an external call in the stage timeout. A timeout fails the stage
/// rather than wedging the worker.
async fn with_timeout<T, F>(timeout: Duration, stage: &str, fut: F) -> Result<T, CallError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(CallError::Failed(format!("{stage}: {err:#}"))),
        Err(_) => Err(CallError::TimedOut(format!(
            "{stage}: timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

/// Run every stage for one claimed job. Returns the number of panels stored.
///
/// Description and scenario failures are fatal. Panel failures follow the
/// configured policy: skipped by default, fatal under `abort_on_panel_failure`.
#[instrument(skip_all, fields(job_id = %job.id))]
pub async fn run_job(
    queue: &dyn JobQueue,
    panels: &dyn PanelStore,
    services: &Services,
    cfg: &PipelineConfig,
    job: &ClaimedJob,
) -> Result<usize, StageError> {
    let image_description = with_timeout(
        cfg.stage_timeout,
        "describe",
        services.chat.describe_image(&job.image_data_uri),
    )
    .await
    .map_err(CallError::into_stage_error)?;
    if image_description.trim().is_empty() {
        return Err(StageError::Upstream(
            "describe: empty image description".into(),
        ));
    }
    report_progress(queue, &job.id, 30).await;

    let user_prompt = scenario::build_scenario_user_prompt(
        &job.prompt,
        job.language.as_deref(),
        &image_description,
    );
    let raw_scenario = with_timeout(
        cfg.stage_timeout,
        "scenario",
        services
            .chat
            .complete_structured(scenario::SCENARIO_SYSTEM_PROMPT, &user_prompt),
    )
    .await
    .map_err(CallError::into_stage_error)?;
    let slots = scenario::parse_scenario(&raw_scenario)?;
    report_progress(queue, &job.id, 40).await;

    let mut stored = 0usize;
    for slot in &slots {
        let index = slot.index as i64;
        match run_panel(panels, services, cfg, job, &image_description, slot).await {
            Ok(()) => stored += 1,
            Err(source) => {
                if cfg.abort_on_panel_failure {
                    return Err(StageError::Panel { index, source });
                }
                warn!(panel = index, error = %source, "panel failed, continuing");
            }
        }
        let progress = 40 + (55 * index) / PANEL_COUNT as i64;
        report_progress(queue, &job.id, progress.min(95)).await;
    }

    info!(stored, "pipeline finished");
    Ok(stored)
}

async fn run_panel(
    panels: &dyn PanelStore,
    services: &Services,
    cfg: &PipelineConfig,
    job: &ClaimedJob,
    image_description: &str,
    slot: &ScenarioPanel,
) -> Result<(), PanelError> {
    let prompt = scenario::build_panel_prompt(image_description, &slot.description);

    let bytes = with_timeout(
        cfg.stage_timeout,
        "synthesize",
        services.synthesis.synthesize(&prompt, &cfg.output_format),
    )
    .await
    .map_err(|e| PanelError::Synthesis(e.into_message()))?;

    let name = format!("{}/panel-{:02}.{}", job.id, slot.index, cfg.output_format);
    with_timeout(
        cfg.stage_timeout,
        "upload",
        services.storage.upload(
            &cfg.bucket,
            &name,
            bytes,
            content_type_for(&cfg.output_format),
        ),
    )
    .await
    .map_err(|e| PanelError::Storage(e.into_message()))?;
    let image_url = services.storage.public_url(&cfg.bucket, &name);

    let dialogue = scenario::flatten_dialogue(&slot.dialogue);
    panels
        .create_panel_record(&job.id, slot.index as i64, &image_url, &dialogue)
        .await
        .map_err(|e| PanelError::Persistence(format!("{e:#}")))?;
    Ok(())
}

/// Progress writes are best-effort; a failed write never fails the job.
async fn report_progress(queue: &dyn JobQueue, job_id: &str, progress: i64) {
    if let Err(err) = queue.update_progress(job_id, progress).await {
        warn!(job_id = %job_id, progress, error = %format!("{err:#}"), "failed to record progress");
    }
}
