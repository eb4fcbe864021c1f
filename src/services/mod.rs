pub mod content;
pub mod evaluation;
pub mod evaluation_guard;
pub mod feedback;
pub mod gamification;
pub mod grading;
pub mod groups;
pub mod leaderboard;
pub mod llm_provider;
pub mod sessions;
pub mod speech;
pub mod types;
pub mod users;
pub mod vocabulary;
