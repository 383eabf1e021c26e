//! Queue and persistence seams. The pipeline and worker only see these
//! traits, so the SQLite backing can be swapped without touching them.

use anyhow::Result;
use async_trait::async_trait;

use crate::db::{self, ClaimedJob, NewJob, Pool};
use crate::model::{JobView, PanelRecord};

/// Job lifecycle operations: enqueue, claim, progress, terminal writes,
/// and the status query.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: NewJob) -> Result<String>;

    /// Claim the oldest queued job, flipping it to running. Returns `None`
    /// when the queue is empty.
    async fn claim_next(&self) -> Result<Option<ClaimedJob>>;

    async fn update_progress(&self, job_id: &str, progress: i64) -> Result<()>;

    async fn complete(&self, job_id: &str) -> Result<()>;

    async fn fail(&self, job_id: &str, error: &str) -> Result<()>;

    async fn job_view(&self, job_id: &str) -> Result<Option<JobView>>;
}

/// Durable per-panel persistence.
#[async_trait]
pub trait PanelStore: Send + Sync {
    async fn create_panel_record(
        &self,
        job_id: &str,
        panel_index: i64,
        image_url: &str,
        dialogue: &str,
    ) -> Result<PanelRecord>;
}

/// SQLite-backed implementation of both seams.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for SqliteStore {
    async fn enqueue(&self, job: NewJob) -> Result<String> {
        let id = job.id.clone();
        db::insert_job(&self.pool, &job).await?;
        Ok(id)
    }

    async fn claim_next(&self) -> Result<Option<ClaimedJob>> {
        db::claim_next_job(&self.pool).await
    }

    async fn update_progress(&self, job_id: &str, progress: i64) -> Result<()> {
        db::update_progress(&self.pool, job_id, progress).await
    }

    async fn complete(&self, job_id: &str) -> Result<()> {
        db::mark_succeeded(&self.pool, job_id).await
    }

    async fn fail(&self, job_id: &str, error: &str) -> Result<()> {
        db::mark_failed(&self.pool, job_id, error).await
    }

    async fn job_view(&self, job_id: &str) -> Result<Option<JobView>> {
        db::fetch_job_view(&self.pool, job_id).await
    }
}

#[async_trait]
impl PanelStore for SqliteStore {
    async fn create_panel_record(
        &self,
        job_id: &str,
        panel_index: i64,
        image_url: &str,
        dialogue: &str,
    ) -> Result<PanelRecord> {
        db::insert_panel(&self.pool, job_id, panel_index, image_url, dialogue).await
    }
}
