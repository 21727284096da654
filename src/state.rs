//! Application state: prompts, generators, and the used-vocabulary store.
//!
//! This module owns:
//!   - the prompts struct and lesson settings (from TOML or defaults)
//!   - the optional generators (lesson model + top-up model)
//!   - the per-topic store of words already taught

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::config::{load_lesson_config_from_env, LessonSettings, Prompts};
use crate::legacy::BlocksToCanonical;
use crate::openai::OpenAI;
use crate::service::{GenerativeService, UsedVocabularySource};
use crate::words::normalize_word;

/// The two generators the pipeline talks to.
#[derive(Clone)]
pub struct Generators {
    pub lesson: Arc<dyn GenerativeService>,
    pub topup: Arc<dyn GenerativeService>,
}

#[derive(Clone)]
pub struct AppState {
    pub prompts: Prompts,
    pub settings: LessonSettings,
    pub generators: Option<Generators>,
    pub vocabulary: Arc<InMemoryVocabulary>,
    pub legacy: BlocksToCanonical,
}

impl AppState {
    /// Build state from env: load config, init OpenAI.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_lesson_config_from_env().unwrap_or_default();

        let generators = OpenAI::from_env().map(|oa| {
            info!(target: "lesson_forge", base_url = %oa.base_url, fast_model = %oa.fast_model, strong_model = %oa.strong_model, "OpenAI enabled.");
            Generators {
                lesson: Arc::new(oa.lesson_model()) as Arc<dyn GenerativeService>,
                topup: Arc::new(oa.topup_model()) as Arc<dyn GenerativeService>,
            }
        });
        if generators.is_none() {
            info!(target: "lesson_forge", "OpenAI disabled (no OPENAI_API_KEY). Lesson generation unavailable.");
        }

        Self::with_parts(cfg.prompts, cfg.lesson, generators)
    }

    pub fn with_parts(prompts: Prompts, settings: LessonSettings, generators: Option<Generators>) -> Self {
        Self {
            prompts,
            settings,
            generators,
            vocabulary: Arc::new(InMemoryVocabulary::default()),
            legacy: BlocksToCanonical,
        }
    }
}

/// Per-topic list of words taught by accepted lessons.
#[derive(Default)]
pub struct InMemoryVocabulary {
    by_topic: RwLock<HashMap<String, Vec<String>>>,
}

fn topic_key(topic: &str) -> String {
    topic.trim().to_lowercase()
}

#[async_trait]
impl UsedVocabularySource for InMemoryVocabulary {
    async fn read_used_words(&self, topic: &str) -> Vec<String> {
        self.by_topic
            .read()
            .await
            .get(&topic_key(topic))
            .cloned()
            .unwrap_or_default()
    }

    /// Appends words not already present under normalization.
    #[instrument(level = "debug", skip(self, words), fields(%topic, count = words.len()))]
    async fn append_words(&self, topic: &str, words: &[String]) {
        let mut by_topic = self.by_topic.write().await;
        let list = by_topic.entry(topic_key(topic)).or_default();
        let mut seen: std::collections::HashSet<String> = list.iter().map(|w| normalize_word(w)).collect();
        for w in words {
            let key = normalize_word(w);
            if !key.is_empty() && seen.insert(key) {
                list.push(w.clone());
            }
        }
    }
}
