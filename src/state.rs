use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::cache::RedisCache;
use crate::config::Config;
use crate::db::DatabaseProxy;
use crate::services::evaluation_guard::EvaluationGuard;
use crate::services::llm_provider::LLMProvider;
use crate::services::sessions::Evaluators;
use crate::services::speech::SpeechAnalyzer;

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    started_at_system: SystemTime,
    config: Arc<Config>,
    db_proxy: Arc<DatabaseProxy>,
    cache: Option<Arc<RedisCache>>,
    llm: Arc<LLMProvider>,
    speech: Arc<SpeechAnalyzer>,
    evaluation_guard: Arc<EvaluationGuard>,
}

impl AppState {
    pub fn new(
        config: Config,
        db_proxy: Arc<DatabaseProxy>,
        cache: Option<Arc<RedisCache>>,
        llm: LLMProvider,
        speech: SpeechAnalyzer,
    ) -> Self {
        let evaluation_guard = Arc::new(EvaluationGuard::new(config.evaluation_guard_ttl));
        Self {
            started_at: Instant::now(),
            started_at_system: SystemTime::now(),
            config: Arc::new(config),
            db_proxy,
            cache,
            llm: Arc::new(llm),
            speech: Arc::new(speech),
            evaluation_guard,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn started_at_system(&self) -> SystemTime {
        self.started_at_system
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn db_proxy(&self) -> Arc<DatabaseProxy> {
        Arc::clone(&self.db_proxy)
    }

    pub fn cache(&self) -> Option<Arc<RedisCache>> {
        self.cache.clone()
    }

    pub fn llm(&self) -> &LLMProvider {
        &self.llm
    }

    pub fn speech(&self) -> &SpeechAnalyzer {
        &self.speech
    }

    pub fn evaluators(&self) -> Evaluators<'_> {
        Evaluators {
            llm: &self.llm,
            speech: &self.speech,
            guard: &self.evaluation_guard,
        }
    }
}
