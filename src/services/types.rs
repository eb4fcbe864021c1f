use std::fmt;

use serde::{Deserialize, Serialize};

/// Learning modules that produce sessions or activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    Reading,
    Listening,
    Writing,
    Speaking,
    Grammar,
    Vocabulary,
}

impl Module {
    pub const ALL: [Module; 6] = [
        Module::Reading,
        Module::Listening,
        Module::Writing,
        Module::Speaking,
        Module::Grammar,
        Module::Vocabulary,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reading => "reading",
            Self::Listening => "listening",
            Self::Writing => "writing",
            Self::Speaking => "speaking",
            Self::Grammar => "grammar",
            Self::Vocabulary => "vocabulary",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(value.trim()))
    }

    /// Modules whose work is recorded as a learning session document.
    pub fn has_sessions(self) -> bool {
        !matches!(self, Self::Vocabulary)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common European Framework of Reference proficiency tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CefrLevel {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl CefrLevel {
    pub const ALL: [CefrLevel; 6] = [
        CefrLevel::A1,
        CefrLevel::A2,
        CefrLevel::B1,
        CefrLevel::B2,
        CefrLevel::C1,
        CefrLevel::C2,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A1 => "A1",
            Self::A2 => "A2",
            Self::B1 => "B1",
            Self::B2 => "B2",
            Self::C1 => "C1",
            Self::C2 => "C2",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(value.trim()))
    }

    fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1).min(Self::ALL.len() - 1)]
    }

    pub fn prev(self) -> Self {
        Self::ALL[self.index().saturating_sub(1)]
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::A1 => "beginner",
            Self::A2 => "elementary",
            Self::B1 => "intermediate",
            Self::B2 => "upper intermediate",
            Self::C1 => "advanced",
            Self::C2 => "proficient",
        }
    }
}

impl Default for CefrLevel {
    fn default() -> Self {
        Self::B1
    }
}

impl fmt::Display for CefrLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_parse_roundtrip() {
        for module in Module::ALL {
            assert_eq!(Module::parse(module.as_str()), Some(module));
        }
        assert_eq!(Module::parse("READING"), Some(Module::Reading));
        assert_eq!(Module::parse("math"), None);
    }

    #[test]
    fn test_level_neighbours_saturate() {
        assert_eq!(CefrLevel::A1.prev(), CefrLevel::A1);
        assert_eq!(CefrLevel::A1.next(), CefrLevel::A2);
        assert_eq!(CefrLevel::C2.next(), CefrLevel::C2);
        assert_eq!(CefrLevel::B2.prev(), CefrLevel::B1);
    }

    #[test]
    fn test_level_serde_uses_tier_name() {
        let json = serde_json::to_string(&CefrLevel::B2).unwrap();
        assert_eq!(json, "\"B2\"");
        assert_eq!(CefrLevel::parse(" c1 "), Some(CefrLevel::C1));
    }
}
