use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use vcomics::error::SubmitError;
use vcomics::jobs;
use vcomics::model::JobStatus;
use vcomics::openai::ChatService;
use vcomics::pipeline::{PipelineConfig, Services};
use vcomics::queue::SqliteStore;
use vcomics::stability::ImageSynthesis;
use vcomics::storage::ObjectStore;
use vcomics::worker::process_next_job;

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

fn test_config() -> PipelineConfig {
    PipelineConfig {
        stage_timeout: Duration::from_secs(5),
        abort_on_panel_failure: false,
        bucket: "panels".into(),
        output_format: "webp".into(),
    }
}

fn valid_payload() -> Vec<u8> {
    STANDARD.encode(vec![0x5au8; 50_000]).into_bytes()
}

fn scenario_json(count: usize) -> String {
    let panels: Vec<serde_json::Value> = (1..=count)
        .map(|i| {
            serde_json::json!({
                "panel": i,
                "description": format!("scene {i}, a tall man in a red coat"),
                "text": [format!("Max: line {i}")],
            })
        })
        .collect();
    serde_json::json!({ "panels": panels }).to_string()
}

#[derive(Debug, Clone)]
struct ScenarioCall {
    system: String,
    user: String,
}

#[derive(Clone, Default)]
struct ScriptedChat {
    describe_responses: Arc<Mutex<VecDeque<Result<String>>>>,
    scenario_responses: Arc<Mutex<VecDeque<Result<String>>>>,
    describe_calls: Arc<Mutex<Vec<String>>>,
    scenario_calls: Arc<Mutex<Vec<ScenarioCall>>>,
}

impl ScriptedChat {
    fn with_scenario(raw: &str) -> Self {
        Self {
            scenario_responses: Arc::new(Mutex::new(VecDeque::from(vec![Ok(raw.to_string())]))),
            ..Default::default()
        }
    }

    fn with_responses(describe: Vec<Result<String>>, scenario: Vec<Result<String>>) -> Self {
        Self {
            describe_responses: Arc::new(Mutex::new(VecDeque::from(describe))),
            scenario_responses: Arc::new(Mutex::new(VecDeque::from(scenario))),
            ..Default::default()
        }
    }

    async fn scenario_calls(&self) -> Vec<ScenarioCall> {
        self.scenario_calls.lock().await.clone()
    }
}

#[async_trait]
impl ChatService for ScriptedChat {
    async fn describe_image(&self, image_data_uri: &str) -> Result<String> {
        self.describe_calls
            .lock()
            .await
            .push(image_data_uri.to_string());
        let mut guard = self.describe_responses.lock().await;
        guard
            .pop_front()
            .unwrap_or_else(|| Ok("a tall man in a red coat, rainy city street".into()))
    }

    async fn complete_structured(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.scenario_calls.lock().await.push(ScenarioCall {
            system: system_prompt.to_string(),
            user: user_prompt.to_string(),
        });
        let mut guard = self.scenario_responses.lock().await;
        guard
            .pop_front()
            .unwrap_or_else(|| Ok(scenario_json(12)))
    }
}

#[derive(Clone, Default)]
struct RecordingSynthesis {
    responses: Arc<Mutex<VecDeque<Result<Vec<u8>>>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl RecordingSynthesis {
    fn with_responses(responses: Vec<Result<Vec<u8>>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl ImageSynthesis for RecordingSynthesis {
    async fn synthesize(&self, prompt: &str, _output_format: &str) -> Result<Vec<u8>> {
        self.prompts.lock().await.push(prompt.to_string());
        let mut guard = self.responses.lock().await;
        guard.pop_front().unwrap_or_else(|| Ok(vec![1, 2, 3]))
    }
}

#[derive(Debug, Clone)]
struct UploadCall {
    bucket: String,
    name: String,
    size: usize,
    content_type: String,
}

#[derive(Clone, Default)]
struct RecordingStorage {
    responses: Arc<Mutex<VecDeque<Result<()>>>>,
    uploads: Arc<Mutex<Vec<UploadCall>>>,
}

impl RecordingStorage {
    async fn uploads(&self) -> Vec<UploadCall> {
        self.uploads.lock().await.clone()
    }
}

#[async_trait]
impl ObjectStore for RecordingStorage {
    async fn upload(
        &self,
        bucket: &str,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        self.uploads.lock().await.push(UploadCall {
            bucket: bucket.to_string(),
            name: name.to_string(),
            size: bytes.len(),
            content_type: content_type.to_string(),
        });
        let mut guard = self.responses.lock().await;
        guard.pop_front().unwrap_or(Ok(()))
    }

    fn public_url(&self, bucket: &str, name: &str) -> String {
        format!("https://cdn.example/{bucket}/{name}")
    }
}

fn services(
    chat: &ScriptedChat,
    synthesis: &RecordingSynthesis,
    storage: &RecordingStorage,
) -> Services {
    Services {
        chat: Arc::new(chat.clone()),
        synthesis: Arc::new(synthesis.clone()),
        storage: Arc::new(storage.clone()),
    }
}

#[tokio::test]
async fn tiny_payload_rejected_without_a_job_row() {
    let pool = setup_pool().await;
    let store = SqliteStore::new(pool.clone());

    let err = jobs::submit(&store, b"0123456789", 10, "a heist", None)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::Invalid(_)));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn submission_is_immediately_visible_as_queued() {
    let pool = setup_pool().await;
    let store = SqliteStore::new(pool);
    let payload = valid_payload();

    let first = jobs::submit(&store, &payload, payload.len(), "a heist", None)
        .await
        .unwrap();
    let second = jobs::submit(&store, &payload, payload.len(), "a heist", None)
        .await
        .unwrap();
    assert_ne!(first.job_id, second.job_id);
    assert_eq!(first.status, JobStatus::Queued);

    let view = jobs::job_status(&store, &first.job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view.status, JobStatus::Queued);
    assert_eq!(view.progress, 0);
    assert!(view.panels.is_empty());
}

#[tokio::test]
async fn unknown_job_id_yields_none() {
    let pool = setup_pool().await;
    let store = SqliteStore::new(pool);
    assert!(jobs::job_status(&store, "no-such-job")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn full_pipeline_stores_twelve_panels() {
    let pool = setup_pool().await;
    let store = SqliteStore::new(pool);
    let chat = ScriptedChat::with_scenario(&scenario_json(12));
    let synthesis = RecordingSynthesis::default();
    let storage = RecordingStorage::default();
    let services = services(&chat, &synthesis, &storage);
    let cfg = test_config();

    let payload = valid_payload();
    let submitted = jobs::submit(&store, &payload, payload.len(), "a quiet heist", Some("French"))
        .await
        .unwrap();

    let processed = process_next_job(&store, &store, &services, &cfg)
        .await
        .unwrap();
    assert!(processed);

    let view = jobs::job_status(&store, &submitted.job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view.status, JobStatus::Succeeded);
    assert_eq!(view.progress, 100);
    assert!(view.error.is_none());
    assert_eq!(view.panels.len(), 12);
    for (i, panel) in view.panels.iter().enumerate() {
        assert_eq!(panel.index, i as i64 + 1);
        assert!(panel.image_url.contains(&submitted.job_id));
    }
    assert_eq!(view.panels[0].dialogue, "Max: line 1");
    assert!(view.panels[2]
        .image_url
        .ends_with(&format!("{}/panel-03.webp", submitted.job_id)));

    let prompts = synthesis.prompts().await;
    assert_eq!(prompts.len(), 12);
    assert!(prompts.iter().all(|p| p.contains("comics style")));
    assert!(prompts[0].starts_with("scene 1"));

    let uploads = storage.uploads().await;
    assert_eq!(uploads.len(), 12);
    assert!(uploads.iter().all(|u| u.bucket == "panels"));
    assert!(uploads.iter().all(|u| u.content_type == "image/webp"));
    assert!(uploads.iter().all(|u| u.size > 0));

    let scenario_calls = chat.scenario_calls().await;
    assert_eq!(scenario_calls.len(), 1);
    assert!(scenario_calls[0].system.contains("12"));
    assert!(scenario_calls[0].user.contains("a quiet heist"));
    assert!(scenario_calls[0].user.contains("French"));

    // queue drained
    let processed = process_next_job(&store, &store, &services, &cfg)
        .await
        .unwrap();
    assert!(!processed);
}

#[tokio::test]
async fn short_scenario_still_yields_twelve_slots() {
    let pool = setup_pool().await;
    let store = SqliteStore::new(pool);
    let chat = ScriptedChat::with_scenario(&scenario_json(5));
    let synthesis = RecordingSynthesis::default();
    let storage = RecordingStorage::default();
    let services = services(&chat, &synthesis, &storage);
    let cfg = test_config();

    let payload = valid_payload();
    let submitted = jobs::submit(&store, &payload, payload.len(), "a heist", None)
        .await
        .unwrap();
    process_next_job(&store, &store, &services, &cfg)
        .await
        .unwrap();

    let view = jobs::job_status(&store, &submitted.job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view.status, JobStatus::Succeeded);
    assert_eq!(view.panels.len(), 12);
    assert_eq!(view.panels[4].dialogue, "Max: line 5");
    for panel in &view.panels[5..] {
        assert!(panel.dialogue.is_empty());
        assert!(!panel.image_url.is_empty());
    }

    // placeholder prompts fall back to the image description plus style
    let prompts = synthesis.prompts().await;
    assert!(prompts[11].starts_with("a tall man in a red coat"));
}

#[tokio::test]
async fn invalid_scenario_fails_the_job() {
    let pool = setup_pool().await;
    let store = SqliteStore::new(pool);
    let chat = ScriptedChat::with_scenario("twelve panels about a dog");
    let synthesis = RecordingSynthesis::default();
    let storage = RecordingStorage::default();
    let services = services(&chat, &synthesis, &storage);
    let cfg = test_config();

    let payload = valid_payload();
    let submitted = jobs::submit(&store, &payload, payload.len(), "a heist", None)
        .await
        .unwrap();
    let processed = process_next_job(&store, &store, &services, &cfg)
        .await
        .unwrap();
    assert!(processed);

    let view = jobs::job_status(&store, &submitted.job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view.status, JobStatus::Failed);
    assert_eq!(view.progress, 100);
    assert!(view.error.as_deref().unwrap().contains("scenario"));
    assert!(view.panels.is_empty());
    assert!(synthesis.prompts().await.is_empty());
}

#[tokio::test]
async fn description_failure_fails_before_the_scenario_stage() {
    let pool = setup_pool().await;
    let store = SqliteStore::new(pool);
    let chat = ScriptedChat::with_responses(vec![Err(anyhow!("vision unavailable"))], vec![]);
    let synthesis = RecordingSynthesis::default();
    let storage = RecordingStorage::default();
    let services = services(&chat, &synthesis, &storage);
    let cfg = test_config();

    let payload = valid_payload();
    let submitted = jobs::submit(&store, &payload, payload.len(), "a heist", None)
        .await
        .unwrap();
    process_next_job(&store, &store, &services, &cfg)
        .await
        .unwrap();

    let view = jobs::job_status(&store, &submitted.job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view.status, JobStatus::Failed);
    assert!(view.error.as_deref().unwrap().contains("vision unavailable"));
    assert!(chat.scenario_calls().await.is_empty());
}

#[tokio::test]
async fn panel_failure_is_skipped_by_default() {
    let pool = setup_pool().await;
    let store = SqliteStore::new(pool);
    let chat = ScriptedChat::with_scenario(&scenario_json(12));
    let synthesis = RecordingSynthesis::with_responses(vec![
        Ok(vec![1]),
        Ok(vec![2]),
        Err(anyhow!("synthesis overloaded")),
    ]);
    let storage = RecordingStorage::default();
    let services = services(&chat, &synthesis, &storage);
    let cfg = test_config();

    let payload = valid_payload();
    let submitted = jobs::submit(&store, &payload, payload.len(), "a heist", None)
        .await
        .unwrap();
    process_next_job(&store, &store, &services, &cfg)
        .await
        .unwrap();

    let view = jobs::job_status(&store, &submitted.job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view.status, JobStatus::Succeeded);
    assert_eq!(view.progress, 100);
    assert_eq!(view.panels.len(), 11);
    assert!(view.panels.iter().all(|p| p.index != 3));
    // remaining panels keep their original indices in order
    let indices: Vec<i64> = view.panels.iter().map(|p| p.index).collect();
    let mut sorted = indices.clone();
    sorted.sort_unstable();
    assert_eq!(indices, sorted);
}

#[tokio::test]
async fn terminal_status_queries_are_idempotent() {
    let pool = setup_pool().await;
    let store = SqliteStore::new(pool);
    let chat = ScriptedChat::default();
    let synthesis = RecordingSynthesis::default();
    let storage = RecordingStorage::default();
    let services = services(&chat, &synthesis, &storage);
    let cfg = test_config();

    let payload = valid_payload();
    let submitted = jobs::submit(&store, &payload, payload.len(), "a heist", None)
        .await
        .unwrap();
    process_next_job(&store, &store, &services, &cfg)
        .await
        .unwrap();

    let first = jobs::job_status(&store, &submitted.job_id)
        .await
        .unwrap()
        .unwrap();
    let second = jobs::job_status(&store, &submitted.job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.status, JobStatus::Succeeded);
    assert_eq!(second.status, first.status);
    assert_eq!(second.progress, first.progress);
    assert_eq!(second.panels.len(), first.panels.len());
}
