//! Scoring for submitted exercises.
//!
//! Every path that consults an external provider has a deterministic
//! fallback, so a provider outage degrades feedback quality but never fails
//! the submission.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::services::content::{ContentSource, Question, SpeakingContent, WritingContent};
use crate::services::grading::{
    clamp_score, is_answer_correct, lexical_variety, percentage, sentence_count, string_similarity,
    word_count, ScoreBand,
};
use crate::services::llm_provider::LLMProvider;
use crate::services::speech::{heuristic_scores, SpeechAnalyzer, SpeechScores};

const IDEAL_SENTENCE_WORDS: (f64, f64) = (8.0, 25.0);
const MAX_CORRECTIONS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    pub prompt: String,
    pub given: String,
    pub expected: String,
    pub correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictationResult {
    pub expected: String,
    pub given: String,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WritingEvaluation {
    pub score: f64,
    pub grammar: f64,
    pub vocabulary: f64,
    pub coherence: f64,
    pub task_response: f64,
    pub feedback: String,
    #[serde(default)]
    pub corrections: Vec<String>,
    pub word_count: usize,
    pub source: ContentSource,
}

/// Shape requested from the text generator for essay feedback.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedWritingFeedback {
    score: f64,
    grammar: f64,
    vocabulary: f64,
    coherence: f64,
    task_response: f64,
    feedback: String,
    #[serde(default)]
    corrections: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GeneratedExplanations {
    explanations: Vec<String>,
}

/// Per-question marking; `answers` must line up with `questions`.
pub fn grade_questions(questions: &[Question], answers: &[String]) -> Vec<QuestionResult> {
    questions
        .iter()
        .zip(answers)
        .map(|(question, given)| QuestionResult {
            prompt: question.prompt.clone(),
            given: given.clone(),
            expected: question.answer.clone(),
            correct: is_answer_correct(&question.answer, given),
            feedback: None,
            rule: question.explanation.clone(),
        })
        .collect()
}

pub fn question_score(results: &[QuestionResult]) -> f64 {
    percentage(results.iter().filter(|r| r.correct).count(), results.len())
}

pub fn fallback_explanation(expected: &str) -> String {
    format!("Incorrect, the answer is {expected}.")
}

/// Fills `feedback` for every wrong answer, asking the generator first.
pub async fn explain_mistakes(llm: &LLMProvider, results: &mut [QuestionResult]) {
    let wrong: Vec<usize> = results
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.correct)
        .map(|(i, _)| i)
        .collect();
    if wrong.is_empty() {
        return;
    }

    let mut generated: Option<Vec<String>> = None;
    if llm.is_available() {
        let items: Vec<serde_json::Value> = wrong
            .iter()
            .map(|&i| {
                serde_json::json!({
                    "exercise": results[i].prompt,
                    "learnerAnswer": results[i].given,
                    "correctAnswer": results[i].expected,
                })
            })
            .collect();
        let user = format!(
            "Explain briefly, in one or two sentences each, why every learner answer below is wrong. \
             Shape: {{\"explanations\": [string]}} in the same order.\n{}",
            serde_json::Value::Array(items)
        );
        match llm
            .complete_json::<GeneratedExplanations>("You are a patient English grammar tutor.", &user)
            .await
        {
            Ok(reply) if reply.explanations.len() == wrong.len() => generated = Some(reply.explanations),
            Ok(_) => warn!("explanation count mismatch, using fallback"),
            Err(err) => warn!(error = %err, "grammar explanation failed, using fallback"),
        }
    }

    for (n, &i) in wrong.iter().enumerate() {
        let text = generated
            .as_ref()
            .and_then(|g| g.get(n))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| fallback_explanation(&results[i].expected));
        results[i].feedback = Some(text);
    }
}

pub fn grade_dictation(expected: &str, given: &str) -> DictationResult {
    DictationResult {
        expected: expected.to_string(),
        given: given.to_string(),
        accuracy: clamp_score(string_similarity(expected, given) * 100.0),
    }
}

pub fn question_feedback(results: &[QuestionResult], score: f64) -> String {
    let correct = results.iter().filter(|r| r.correct).count();
    format!(
        "{} You answered {correct} of {} questions correctly.",
        ScoreBand::from_score(score).message(),
        results.len()
    )
}

pub async fn evaluate_writing(llm: &LLMProvider, task: &WritingContent, text: &str) -> WritingEvaluation {
    let words = word_count(text);
    if llm.is_available() {
        let user = format!(
            "Task: {}\nTarget length: {}-{} words.\nEssay:\n{}\n\nScore the essay from 0 to 100 overall and for grammar, vocabulary, coherence and taskResponse. \
             Shape: {{\"score\": number, \"grammar\": number, \"vocabulary\": number, \"coherence\": number, \"taskResponse\": number, \"feedback\": string, \"corrections\": [string]}}.",
            task.prompt, task.min_words, task.max_words, text
        );
        match llm
            .complete_json::<GeneratedWritingFeedback>("You are an experienced English writing examiner.", &user)
            .await
        {
            Ok(reply) if !reply.feedback.trim().is_empty() => {
                let mut corrections = reply.corrections;
                corrections.truncate(MAX_CORRECTIONS);
                return WritingEvaluation {
                    score: clamp_score(reply.score),
                    grammar: clamp_score(reply.grammar),
                    vocabulary: clamp_score(reply.vocabulary),
                    coherence: clamp_score(reply.coherence),
                    task_response: clamp_score(reply.task_response),
                    feedback: reply.feedback.trim().to_string(),
                    corrections,
                    word_count: words,
                    source: ContentSource::Ai,
                };
            }
            Ok(_) => warn!("writing feedback was empty, using heuristic"),
            Err(err) => warn!(error = %err, "writing evaluation failed, using heuristic"),
        }
    }
    heuristic_writing(task, text)
}

/// Length, lexical variety and sentence shape stand in for an examiner.
pub fn heuristic_writing(task: &WritingContent, text: &str) -> WritingEvaluation {
    let words = word_count(text);
    let min = task.min_words.max(1) as f64;
    let max = task.max_words.max(task.min_words + 1) as f64;
    let count = words as f64;

    let task_response = if count < min {
        count / min * 100.0
    } else if count > max {
        100.0 - (count - max) / max * 100.0
    } else {
        100.0
    };

    let vocabulary = lexical_variety(text) * 100.0;

    let sentences = sentence_count(text).max(1) as f64;
    let avg_len = count / sentences;
    let coherence = if avg_len < IDEAL_SENTENCE_WORDS.0 {
        avg_len / IDEAL_SENTENCE_WORDS.0 * 100.0
    } else if avg_len > IDEAL_SENTENCE_WORDS.1 {
        IDEAL_SENTENCE_WORDS.1 / avg_len * 100.0
    } else {
        100.0
    };

    let grammar = well_formed_sentence_ratio(text) * 100.0;

    let (grammar, vocabulary, coherence, task_response) = (
        clamp_score(grammar),
        clamp_score(vocabulary),
        clamp_score(coherence),
        clamp_score(task_response),
    );
    let score = clamp_score((grammar + vocabulary + coherence + task_response) / 4.0);

    let mut feedback = vec![ScoreBand::from_score(score).message().to_string()];
    if count < min || count > max {
        feedback.push(format!(
            "Aim for {} to {} words; you wrote {words}.",
            task.min_words, task.max_words
        ));
    }
    if vocabulary < 50.0 {
        feedback.push("Try to use a wider range of vocabulary and avoid repeating words.".to_string());
    }
    if coherence < 70.0 {
        feedback.push("Vary your sentence length so ideas connect more naturally.".to_string());
    }
    if grammar < 80.0 {
        feedback.push("Start each sentence with a capital letter and end it with punctuation.".to_string());
    }

    WritingEvaluation {
        score,
        grammar,
        vocabulary,
        coherence,
        task_response,
        feedback: feedback.join(" "),
        corrections: Vec::new(),
        word_count: words,
        source: ContentSource::Fallback,
    }
}

/// Share of sentences that start with a capital and end with terminal punctuation.
fn well_formed_sentence_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut good = 0usize;
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            total += 1;
            if current.trim_start().chars().next().is_some_and(char::is_uppercase) {
                good += 1;
            }
            current.clear();
        }
    }
    if word_count(&current) > 0 {
        // trailing sentence without terminal punctuation
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }
    good as f64 / total as f64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakingEvaluation {
    #[serde(flatten)]
    pub scores: SpeechScores,
    pub score: f64,
    pub feedback: String,
    pub source: ContentSource,
}

pub async fn evaluate_speaking(
    speech: &SpeechAnalyzer,
    task: &SpeakingContent,
    transcript: Option<&str>,
    audio_base64: Option<&str>,
) -> SpeakingEvaluation {
    if let Some(audio) = audio_base64 {
        if speech.is_available() {
            match speech.analyze(&task.reference_text, audio).await {
                Ok(scores) => return speaking_result(scores, ContentSource::Ai, None),
                Err(err) => warn!(error = %err, "speech analysis failed, using heuristic"),
            }
        }
    }

    let scores = heuristic_scores(&task.reference_text, transcript.unwrap_or_default());
    let note = transcript
        .is_none()
        .then_some("Speech analysis is unavailable right now; include a transcript for a better score.");
    speaking_result(scores, ContentSource::Fallback, note)
}

fn speaking_result(scores: SpeechScores, source: ContentSource, note: Option<&str>) -> SpeakingEvaluation {
    let score = scores.overall();
    let weakest = [
        (scores.pronunciation, "Focus on pronouncing each word clearly."),
        (scores.fluency, "Try to speak at a steady pace without long pauses."),
        (scores.accuracy, "Stick closely to the reference text."),
        (scores.completeness, "Make sure you read the whole text."),
    ]
    .into_iter()
    .min_by(|a, b| a.0.total_cmp(&b.0))
    .map(|(_, tip)| tip);

    let mut feedback = vec![ScoreBand::from_score(score).message()];
    if score < 90.0 {
        feedback.extend(weakest);
    }
    feedback.extend(note);

    SpeakingEvaluation {
        scores,
        score,
        feedback: feedback.join(" "),
        source,
    }
}
