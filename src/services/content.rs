//! Exercise content: AI generation with built-in fallbacks.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::services::llm_provider::LLMProvider;
use crate::services::types::{CefrLevel, Module};

const MAX_QUESTIONS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Question {
    fn is_valid(&self) -> bool {
        !self.prompt.trim().is_empty()
            && !self.answer.trim().is_empty()
            && (self.options.is_empty()
                || self
                    .options
                    .iter()
                    .any(|o| o.trim().eq_ignore_ascii_case(self.answer.trim())))
    }

    fn view(&self) -> QuestionView {
        QuestionView {
            prompt: self.prompt.clone(),
            options: self.options.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub prompt: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingContent {
    pub title: String,
    pub passage: String,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListeningContent {
    pub title: String,
    pub script: String,
    pub questions: Vec<Question>,
    pub dictation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WritingContent {
    pub prompt: String,
    pub min_words: usize,
    pub max_words: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakingContent {
    pub prompt: String,
    pub reference_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrammarContent {
    pub topic: String,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExerciseContent {
    Reading(ReadingContent),
    Listening(ListeningContent),
    Writing(WritingContent),
    Speaking(SpeakingContent),
    Grammar(GrammarContent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentSource {
    Ai,
    Fallback,
}

impl ExerciseContent {
    pub fn module(&self) -> Module {
        match self {
            Self::Reading(_) => Module::Reading,
            Self::Listening(_) => Module::Listening,
            Self::Writing(_) => Module::Writing,
            Self::Speaking(_) => Module::Speaking,
            Self::Grammar(_) => Module::Grammar,
        }
    }

    pub fn questions(&self) -> &[Question] {
        match self {
            Self::Reading(c) => &c.questions,
            Self::Listening(c) => &c.questions,
            Self::Grammar(c) => &c.questions,
            Self::Writing(_) | Self::Speaking(_) => &[],
        }
    }

    fn is_valid(&self) -> bool {
        match self {
            Self::Reading(c) => {
                !c.passage.trim().is_empty() && questions_valid(&c.questions)
            }
            Self::Listening(c) => {
                !c.script.trim().is_empty()
                    && !c.dictation.trim().is_empty()
                    && questions_valid(&c.questions)
            }
            Self::Writing(c) => !c.prompt.trim().is_empty() && c.min_words < c.max_words,
            Self::Speaking(c) => !c.reference_text.trim().is_empty(),
            Self::Grammar(c) => questions_valid(&c.questions),
        }
    }

    /// What the learner is shown: everything except the answer key.
    pub fn client_view(&self) -> serde_json::Value {
        let strip = |qs: &[Question]| qs.iter().map(Question::view).collect::<Vec<_>>();
        match self {
            Self::Reading(c) => serde_json::json!({
                "kind": "reading",
                "title": c.title,
                "passage": c.passage,
                "questions": strip(&c.questions),
            }),
            Self::Listening(c) => serde_json::json!({
                "kind": "listening",
                "title": c.title,
                "script": c.script,
                "questions": strip(&c.questions),
                "dictation": c.dictation,
            }),
            Self::Writing(c) => serde_json::json!({
                "kind": "writing",
                "prompt": c.prompt,
                "minWords": c.min_words,
                "maxWords": c.max_words,
            }),
            Self::Speaking(c) => serde_json::json!({
                "kind": "speaking",
                "prompt": c.prompt,
                "referenceText": c.reference_text,
            }),
            Self::Grammar(c) => serde_json::json!({
                "kind": "grammar",
                "topic": c.topic,
                "questions": strip(&c.questions),
            }),
        }
    }
}

fn questions_valid(questions: &[Question]) -> bool {
    !questions.is_empty() && questions.len() <= MAX_QUESTIONS && questions.iter().all(Question::is_valid)
}

/// Generates content with the LLM, falling back to the built-in set on any failure.
pub async fn generate(
    llm: &LLMProvider,
    module: Module,
    level: CefrLevel,
    topic: Option<&str>,
) -> (ExerciseContent, ContentSource) {
    let fallback = || fallback_content(module, level, topic);
    if !llm.is_available() {
        return (fallback(), ContentSource::Fallback);
    }

    let (system, user) = prompts(module, level, topic);
    let generated: Result<ExerciseContent, _> = match module {
        Module::Reading => llm
            .complete_json::<ReadingContent>(&system, &user)
            .await
            .map(ExerciseContent::Reading),
        Module::Listening => llm
            .complete_json::<ListeningContent>(&system, &user)
            .await
            .map(ExerciseContent::Listening),
        Module::Writing => llm
            .complete_json::<WritingContent>(&system, &user)
            .await
            .map(ExerciseContent::Writing),
        Module::Speaking => llm
            .complete_json::<SpeakingContent>(&system, &user)
            .await
            .map(ExerciseContent::Speaking),
        Module::Grammar | Module::Vocabulary => llm
            .complete_json::<GrammarContent>(&system, &user)
            .await
            .map(ExerciseContent::Grammar),
    };

    match generated {
        Ok(content) if content.is_valid() => (content, ContentSource::Ai),
        Ok(_) => {
            warn!(%module, %level, "generated content failed validation, using fallback");
            (fallback(), ContentSource::Fallback)
        }
        Err(err) => {
            warn!(%module, %level, error = %err, "content generation failed, using fallback");
            (fallback(), ContentSource::Fallback)
        }
    }
}

fn prompts(module: Module, level: CefrLevel, topic: Option<&str>) -> (String, String) {
    let audience = format!(
        "You write English-learning material for {} ({}) learners.",
        level.description(),
        level
    );
    let topic = topic.unwrap_or("everyday life");
    let question_shape = r#"each question is {"prompt": string, "options": [string], "answer": string, "explanation": string}; "answer" must be one of "options""#;
    let user = match module {
        Module::Reading => format!(
            r#"Write a short reading passage about "{topic}" and 3-5 comprehension questions. Shape: {{"title": string, "passage": string, "questions": [...]}}; {question_shape}."#
        ),
        Module::Listening => format!(
            r#"Write a short spoken dialogue or monologue about "{topic}", 3-5 comprehension questions and one dictation sentence taken from it. Shape: {{"title": string, "script": string, "questions": [...], "dictation": string}}; {question_shape}."#
        ),
        Module::Writing => format!(
            r#"Write one writing task about "{topic}". Shape: {{"prompt": string, "minWords": number, "maxWords": number}}."#
        ),
        Module::Speaking => format!(
            r#"Write one speaking task about "{topic}" with a reference text of 2-3 sentences to read aloud. Shape: {{"prompt": string, "referenceText": string}}."#
        ),
        Module::Grammar | Module::Vocabulary => format!(
            r#"Write 5 fill-in-the-blank grammar exercises on "{topic}". Mark the blank with ___. Shape: {{"topic": string, "questions": [...]}}; {question_shape}."#
        ),
    };
    (audience, user)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Band {
    Beginner,
    Intermediate,
    Advanced,
}

fn band(level: CefrLevel) -> Band {
    match level {
        CefrLevel::A1 | CefrLevel::A2 => Band::Beginner,
        CefrLevel::B1 | CefrLevel::B2 => Band::Intermediate,
        CefrLevel::C1 | CefrLevel::C2 => Band::Advanced,
    }
}

fn mc(prompt: &str, options: &[&str], answer: &str) -> Question {
    Question {
        prompt: prompt.to_string(),
        options: options.iter().map(|o| o.to_string()).collect(),
        answer: answer.to_string(),
        explanation: None,
    }
}

fn short(prompt: &str, answer: &str) -> Question {
    Question {
        prompt: prompt.to_string(),
        options: Vec::new(),
        answer: answer.to_string(),
        explanation: None,
    }
}

fn explained(mut question: Question, explanation: &str) -> Question {
    question.explanation = Some(explanation.to_string());
    question
}

/// Deterministic content used when the text generator is unavailable.
pub fn fallback_content(module: Module, level: CefrLevel, topic: Option<&str>) -> ExerciseContent {
    match module {
        Module::Reading => ExerciseContent::Reading(fallback_reading(level)),
        Module::Listening => ExerciseContent::Listening(fallback_listening(level)),
        Module::Writing => ExerciseContent::Writing(fallback_writing(level)),
        Module::Speaking => ExerciseContent::Speaking(fallback_speaking(level)),
        Module::Grammar | Module::Vocabulary => {
            ExerciseContent::Grammar(fallback_grammar(topic.unwrap_or("past simple")))
        }
    }
}

pub fn fallback_reading(level: CefrLevel) -> ReadingContent {
    match band(level) {
        Band::Beginner => ReadingContent {
            title: "A Day at the Market".to_string(),
            passage: "Anna goes to the market every Saturday. She buys apples, bread and cheese. \
                      The market opens at eight o'clock. Anna likes to talk to the farmers. \
                      Her favourite fruit is oranges, but they are expensive in winter."
                .to_string(),
            questions: vec![
                mc("When does Anna go to the market?", &["Friday", "Saturday", "Sunday"], "Saturday"),
                mc("What time does the market open?", &["Seven", "Eight", "Nine"], "Eight"),
                short("What is Anna's favourite fruit?", "oranges"),
            ],
        },
        Band::Intermediate => ReadingContent {
            title: "Working from Home".to_string(),
            passage: "More people than ever now work from home at least part of the week. \
                      Many say they save time because they no longer commute, and they can \
                      organise their day more flexibly. However, some workers feel isolated \
                      and miss chatting with colleagues. Companies are experimenting with \
                      hybrid schedules, where staff spend two or three days in the office."
                .to_string(),
            questions: vec![
                mc(
                    "Why do many people save time when working from home?",
                    &["They sleep less", "They no longer commute", "They work fewer hours"],
                    "They no longer commute",
                ),
                mc(
                    "What problem do some home workers mention?",
                    &["Feeling isolated", "Higher salaries", "Longer meetings"],
                    "Feeling isolated",
                ),
                short("What is a schedule mixing office and home days called?", "hybrid"),
            ],
        },
        Band::Advanced => ReadingContent {
            title: "The Paradox of Choice".to_string(),
            passage: "Conventional wisdom holds that more options make consumers happier, yet \
                      psychologists have documented the opposite effect. When faced with an \
                      overwhelming array of alternatives, people often defer decisions \
                      altogether or feel less satisfied with what they eventually choose, \
                      haunted by the options they forwent. Researchers describe this \
                      phenomenon as choice overload."
                .to_string(),
            questions: vec![
                mc(
                    "According to the passage, what can too many options cause?",
                    &["Faster decisions", "Deferred decisions", "Lower prices"],
                    "Deferred decisions",
                ),
                mc(
                    "Why might people feel less satisfied with their choice?",
                    &[
                        "They regret the alternatives they gave up",
                        "The products are of poor quality",
                        "They were pressured by sellers",
                    ],
                    "They regret the alternatives they gave up",
                ),
                short("What name do researchers give this phenomenon?", "choice overload"),
            ],
        },
    }
}

pub fn fallback_listening(level: CefrLevel) -> ListeningContent {
    match band(level) {
        Band::Beginner => ListeningContent {
            title: "Ordering Coffee".to_string(),
            script: "Hello, can I have a small coffee with milk, please? Of course. Anything \
                     else? Yes, a chocolate muffin. That is four dollars. Here you are. Thank you!"
                .to_string(),
            questions: vec![
                mc("What size is the coffee?", &["Small", "Medium", "Large"], "Small"),
                mc("What food does the customer buy?", &["A sandwich", "A muffin", "A cookie"], "A muffin"),
                short("How much does it cost, in dollars?", "four"),
            ],
            dictation: "Can I have a small coffee with milk, please?".to_string(),
        },
        Band::Intermediate => ListeningContent {
            title: "Train Announcement".to_string(),
            script: "Attention please. The 10:15 service to Manchester has been delayed by \
                     approximately twenty minutes due to a signal failure. It will now depart \
                     from platform six. We apologise for any inconvenience."
                .to_string(),
            questions: vec![
                mc(
                    "Where is the train going?",
                    &["London", "Manchester", "Leeds"],
                    "Manchester",
                ),
                mc(
                    "Why is the train delayed?",
                    &["Bad weather", "A signal failure", "A missing driver"],
                    "A signal failure",
                ),
                short("Which platform will the train leave from?", "six"),
            ],
            dictation: "The train will now depart from platform six.".to_string(),
        },
        Band::Advanced => ListeningContent {
            title: "Podcast: Urban Gardens".to_string(),
            script: "Community gardens have quietly transformed neglected city lots into \
                     thriving green spaces. Beyond supplying fresh produce, they foster a sense \
                     of belonging among residents who might otherwise never interact. Critics, \
                     however, argue that such projects can accelerate gentrification."
                .to_string(),
            questions: vec![
                mc(
                    "What have community gardens replaced?",
                    &["Parking garages", "Neglected city lots", "Old factories"],
                    "Neglected city lots",
                ),
                mc(
                    "What social benefit is mentioned?",
                    &["Lower taxes", "A sense of belonging", "Better schools"],
                    "A sense of belonging",
                ),
                short("What do critics say the projects can accelerate?", "gentrification"),
            ],
            dictation: "Community gardens foster a sense of belonging among residents.".to_string(),
        },
    }
}

pub fn fallback_writing(level: CefrLevel) -> WritingContent {
    match band(level) {
        Band::Beginner => WritingContent {
            prompt: "Write about your best friend. What do they look like and what do you do together?"
                .to_string(),
            min_words: 40,
            max_words: 100,
        },
        Band::Intermediate => WritingContent {
            prompt: "Some people think students should wear school uniforms. Do you agree? Give reasons and examples."
                .to_string(),
            min_words: 120,
            max_words: 200,
        },
        Band::Advanced => WritingContent {
            prompt: "To what extent should governments regulate artificial intelligence? Discuss both sides and give your opinion."
                .to_string(),
            min_words: 220,
            max_words: 350,
        },
    }
}

pub fn fallback_speaking(level: CefrLevel) -> SpeakingContent {
    match band(level) {
        Band::Beginner => SpeakingContent {
            prompt: "Read the sentences aloud, then say one thing about your morning.".to_string(),
            reference_text: "I wake up at seven o'clock. I drink a cup of tea and eat some toast."
                .to_string(),
        },
        Band::Intermediate => SpeakingContent {
            prompt: "Read the text aloud, then describe a trip you enjoyed.".to_string(),
            reference_text: "Last summer we travelled along the coast by train. The views were \
                             beautiful and the weather was perfect for swimming."
                .to_string(),
        },
        Band::Advanced => SpeakingContent {
            prompt: "Read the text aloud, then argue for or against remote learning.".to_string(),
            reference_text: "Although remote learning offers unprecedented flexibility, it \
                             demands considerable self-discipline and can deepen existing inequalities."
                .to_string(),
        },
    }
}

pub fn fallback_grammar(topic: &str) -> GrammarContent {
    let key = topic.trim().to_ascii_lowercase();
    if key.contains("article") {
        return GrammarContent {
            topic: "articles".to_string(),
            questions: vec![
                explained(mc("She is ___ engineer.", &["a", "an", "the"], "an"), "Use 'an' before a vowel sound."),
                explained(mc("___ sun rises in the east.", &["A", "An", "The"], "The"), "Unique things take 'the'."),
                explained(mc("I bought ___ new bike yesterday.", &["a", "an", "the"], "a"), "First mention of a countable noun takes 'a'."),
                explained(mc("He plays ___ piano beautifully.", &["a", "an", "the"], "the"), "Musical instruments usually take 'the'."),
                explained(mc("We had ___ lunch at noon.", &["a", "the", "no article"], "no article"), "Meals normally take no article."),
            ],
        };
    }
    if key.contains("preposition") {
        return GrammarContent {
            topic: "prepositions".to_string(),
            questions: vec![
                explained(mc("The meeting is ___ Monday.", &["in", "on", "at"], "on"), "Days take 'on'."),
                explained(mc("I was born ___ 1995.", &["in", "on", "at"], "in"), "Years take 'in'."),
                explained(mc("See you ___ six o'clock.", &["in", "on", "at"], "at"), "Clock times take 'at'."),
                explained(mc("The keys are ___ the drawer.", &["in", "on", "at"], "in"), "Enclosed spaces take 'in'."),
                explained(mc("She is good ___ maths.", &["in", "on", "at"], "at"), "'Good at' is a fixed phrase."),
            ],
        };
    }
    GrammarContent {
        topic: "past simple".to_string(),
        questions: vec![
            explained(short("Yesterday I ___ (go) to the cinema.", "went"), "'Go' is irregular: go, went, gone."),
            explained(short("She ___ (not / like) the film.", "didn't like"), "Negatives use 'didn't' plus the base verb."),
            explained(short("They ___ (buy) a new car last week.", "bought"), "'Buy' is irregular: buy, bought, bought."),
            explained(short("___ you ___ (see) Tom? (write both words)", "did see"), "Questions use 'did' plus the base verb."),
            explained(short("We ___ (study) all night.", "studied"), "Consonant + y becomes -ied."),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::llm_provider::LLMConfig;

    #[test]
    fn test_all_fallbacks_are_valid() {
        for level in CefrLevel::ALL {
            for module in [
                Module::Reading,
                Module::Listening,
                Module::Writing,
                Module::Speaking,
                Module::Grammar,
            ] {
                let content = fallback_content(module, level, None);
                assert!(content.is_valid(), "{module} {level} fallback invalid");
                assert_eq!(content.module(), module);
            }
        }
        for topic in ["articles", "prepositions", "past simple", "unknown"] {
            assert!(ExerciseContent::Grammar(fallback_grammar(topic)).is_valid());
        }
    }

    #[test]
    fn test_client_view_hides_answers() {
        let content = ExerciseContent::Reading(fallback_reading(CefrLevel::B1));
        let view = content.client_view();
        let text = view.to_string();
        assert!(!text.contains("\"answer\""));
        assert_eq!(view["questions"].as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn test_question_with_answer_outside_options_is_invalid() {
        let q = mc("pick", &["a", "b"], "c");
        assert!(!q.is_valid());
    }

    #[test]
    fn test_content_serde_is_tagged() {
        let content = ExerciseContent::Writing(fallback_writing(CefrLevel::A1));
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["kind"], "writing");
        let back: ExerciseContent = serde_json::from_value(json).unwrap();
        assert_eq!(back, content);
    }

    #[tokio::test]
    async fn test_generate_without_llm_uses_fallback() {
        let llm = LLMProvider::new(LLMConfig::disabled());
        let (content, source) = generate(&llm, Module::Listening, CefrLevel::A2, None).await;
        assert_eq!(source, ContentSource::Fallback);
        assert_eq!(content, fallback_content(Module::Listening, CefrLevel::A2, None));
    }
}
