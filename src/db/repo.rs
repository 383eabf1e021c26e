use super::model::{ClaimedJob, NewJob};
use crate::model::{JobStatus, JobView, PanelRecord, PanelView};
use anyhow::{anyhow, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    // Pass through non-sqlite schemes
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }

    // In-memory URLs like sqlite::memory: or sqlite::memory:?cache=shared
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    // Strip prefix and optional //
    let rest = &url["sqlite:".len()..];
    let (_had_slashes, path_with_query) = if let Some(r) = rest.strip_prefix("//") {
        (true, r)
    } else {
        (false, rest)
    };

    // Separate query string if any
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    // Expand leading ~/ to HOME
    let expanded_path = if let Some(rest) = path_part.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            path_part.to_string()
        }
    } else {
        path_part.to_string()
    };

    // Ensure parent directory exists if any
    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    // Rebuild URL, prefer sqlite:// form
    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn insert_job(pool: &Pool, job: &NewJob) -> Result<()> {
    sqlx::query(
        "INSERT INTO jobs (id, status, progress, prompt, language, image_data_uri) \
         VALUES (?, 'queued', 0, ?, ?, ?)",
    )
    .bind(&job.id)
    .bind(&job.prompt)
    .bind(&job.language)
    .bind(&job.image_data_uri)
    .execute(pool)
    .await?;
    Ok(())
}

/// Atomically flip the oldest queued job to running. Setting progress to 10
/// doubles as the liveness signal for the status query.
#[instrument(skip_all)]
pub async fn claim_next_job(pool: &Pool) -> Result<Option<ClaimedJob>> {
    let row = sqlx::query(
        "UPDATE jobs SET status = 'running', progress = 10, started_at = ? \
         WHERE id = (SELECT id FROM jobs WHERE status = 'queued' ORDER BY rowid LIMIT 1) \
         RETURNING id, prompt, language, image_data_uri",
    )
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| ClaimedJob {
        id: row.get("id"),
        prompt: row.get("prompt"),
        language: row.get("language"),
        image_data_uri: row.get("image_data_uri"),
    }))
}

/// Progress never moves backwards, and terminal jobs never move at all.
#[instrument(skip_all)]
pub async fn update_progress(pool: &Pool, job_id: &str, progress: i64) -> Result<()> {
    sqlx::query(
        "UPDATE jobs SET progress = max(progress, ?) WHERE id = ? AND status = 'running'",
    )
    .bind(progress)
    .bind(job_id)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn mark_succeeded(pool: &Pool, job_id: &str) -> Result<()> {
    sqlx::query(
        "UPDATE jobs SET status = 'succeeded', progress = 100, finished_at = ? \
         WHERE id = ? AND status = 'running'",
    )
    .bind(Utc::now())
    .bind(job_id)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn mark_failed(pool: &Pool, job_id: &str, error: &str) -> Result<()> {
    sqlx::query(
        "UPDATE jobs SET status = 'failed', progress = 100, error = ?, finished_at = ? \
         WHERE id = ? AND status = 'running'",
    )
    .bind(error)
    .bind(Utc::now())
    .bind(job_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Idempotent per-panel insert: retrying a panel overwrites its previous row.
#[instrument(skip_all)]
pub async fn insert_panel(
    pool: &Pool,
    job_id: &str,
    panel_index: i64,
    image_url: &str,
    dialogue: &str,
) -> Result<PanelRecord> {
    let rec = sqlx::query(
        "INSERT INTO panels (job_id, panel_index, image_url, dialogue) VALUES (?, ?, ?, ?) \
         ON CONFLICT (job_id, panel_index) DO UPDATE \
         SET image_url = excluded.image_url, dialogue = excluded.dialogue \
         RETURNING id",
    )
    .bind(job_id)
    .bind(panel_index)
    .bind(image_url)
    .bind(dialogue)
    .fetch_one(pool)
    .await?;
    Ok(PanelRecord {
        id: rec.get("id"),
        job_id: job_id.to_string(),
        panel_index,
        image_url: image_url.to_string(),
        dialogue: dialogue.to_string(),
    })
}

#[instrument(skip_all)]
pub async fn fetch_job_view(pool: &Pool, job_id: &str) -> Result<Option<JobView>> {
    let row = sqlx::query("SELECT id, status, progress, error FROM jobs WHERE id = ?")
        .bind(job_id)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };

    let status_str: String = row.get("status");
    let status = JobStatus::parse_state(&status_str)
        .ok_or_else(|| anyhow!("job {} has unknown status {}", job_id, status_str))?;

    let panel_rows = sqlx::query(
        "SELECT panel_index, image_url, dialogue FROM panels WHERE job_id = ? ORDER BY panel_index",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    let panels = panel_rows
        .into_iter()
        .map(|row| PanelView {
            index: row.get("panel_index"),
            image_url: row.get("image_url"),
            dialogue: row.get("dialogue"),
        })
        .collect();

    Ok(Some(JobView {
        id: row.get("id"),
        status,
        progress: row.get("progress"),
        error: row.try_get::<Option<String>, _>("error").ok().flatten(),
        panels,
    }))
}
