use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{env_string, env_u64};
use crate::services::grading::{clamp_score, string_similarity, word_count, word_overlap_ratio};

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Reference speaking rate used by the heuristic fluency estimate.
const FLUENT_WORDS_RATIO: f64 = 0.9;

#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub api_key: Option<String>,
    pub api_endpoint: Option<String>,
    pub timeout: Duration,
}

impl SpeechConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: env_string("SPEECH_API_KEY"),
            api_endpoint: env_string("SPEECH_API_ENDPOINT"),
            timeout: Duration::from_millis(env_u64("SPEECH_TIMEOUT").unwrap_or(DEFAULT_TIMEOUT_MS)),
        }
    }

    pub fn disabled() -> Self {
        Self {
            api_key: None,
            api_endpoint: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechScores {
    pub pronunciation: f64,
    pub fluency: f64,
    pub accuracy: f64,
    pub completeness: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

impl SpeechScores {
    pub fn overall(&self) -> f64 {
        clamp_score(
            self.pronunciation * 0.3 + self.fluency * 0.2 + self.accuracy * 0.3 + self.completeness * 0.2,
        )
    }
}

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech analysis not configured")]
    NotConfigured,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest<'a> {
    reference_text: &'a str,
    audio: &'a str,
    language: &'a str,
}

/// Client for the external pronunciation assessment service.
#[derive(Clone)]
pub struct SpeechAnalyzer {
    config: SpeechConfig,
    client: reqwest::Client,
}

impl SpeechAnalyzer {
    pub fn new(config: SpeechConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    pub fn from_env() -> Self {
        Self::new(SpeechConfig::from_env())
    }

    pub fn is_available(&self) -> bool {
        self.config.api_key.is_some() && self.config.api_endpoint.is_some()
    }

    pub async fn analyze(
        &self,
        reference_text: &str,
        audio_base64: &str,
    ) -> Result<SpeechScores, SpeechError> {
        let (Some(api_key), Some(endpoint)) =
            (self.config.api_key.as_deref(), self.config.api_endpoint.as_deref())
        else {
            return Err(SpeechError::NotConfigured);
        };

        let resp = self
            .client
            .post(endpoint)
            .bearer_auth(api_key)
            .json(&AnalyzeRequest {
                reference_text,
                audio: audio_base64,
                language: "en-US",
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SpeechError::HttpStatus { status, body });
        }

        let mut scores: SpeechScores = resp.json().await?;
        scores.pronunciation = clamp_score(scores.pronunciation);
        scores.fluency = clamp_score(scores.fluency);
        scores.accuracy = clamp_score(scores.accuracy);
        scores.completeness = clamp_score(scores.completeness);
        Ok(scores)
    }
}

/// Scores a recognised transcript against the reference text without the provider.
pub fn heuristic_scores(reference_text: &str, transcript: &str) -> SpeechScores {
    let reference_words = word_count(reference_text).max(1) as f64;
    let spoken_words = word_count(transcript) as f64;
    let ratio = spoken_words / reference_words;

    let accuracy = word_overlap_ratio(reference_text, transcript) * 100.0;
    let completeness = ratio.min(1.0) * 100.0;
    // penalise both rushing through (far too few words) and rambling
    let fluency = if ratio >= FLUENT_WORDS_RATIO && ratio <= 1.0 / FLUENT_WORDS_RATIO {
        100.0
    } else if ratio < FLUENT_WORDS_RATIO {
        ratio / FLUENT_WORDS_RATIO * 100.0
    } else {
        (1.0 / ratio) / FLUENT_WORDS_RATIO * 100.0
    };
    let pronunciation = string_similarity(reference_text, transcript) * 100.0;

    SpeechScores {
        pronunciation: clamp_score(pronunciation),
        fluency: clamp_score(fluency),
        accuracy: clamp_score(accuracy),
        completeness: clamp_score(completeness),
        transcript: Some(transcript.to_string()),
    }
}
