//! Keyword-based routing.

use crate::domain::Route;
use crate::ports::RoutingPolicy;

/// Prompts containing any of these run in the background by default.
pub const DEFAULT_SLOW_KEYWORDS: &[&str] = &[
    "client analysis",
    "分析公司",
    "生成报告",
    "详细分析",
    "战略分析",
    "市场调研",
    "竞品分析",
];

/// Routes to the slow path when the prompt contains a configured keyword.
///
/// Matching is a case-insensitive substring test.
#[derive(Debug, Clone)]
pub struct KeywordRoutingPolicy {
    keywords: Vec<String>,
}

impl KeywordRoutingPolicy {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// First keyword found in `prompt`, if any.
    pub fn matched_keyword(&self, prompt: &str) -> Option<&str> {
        let prompt = prompt.to_lowercase();
        self.keywords
            .iter()
            .find(|k| prompt.contains(k.as_str()))
            .map(String::as_str)
    }
}

impl Default for KeywordRoutingPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_SLOW_KEYWORDS)
    }
}

impl RoutingPolicy for KeywordRoutingPolicy {
    fn classify(&self, prompt: &str) -> Route {
        match self.matched_keyword(prompt) {
            Some(keyword) => {
                tracing::debug!(keyword, "slow-path keyword matched");
                Route::Slow
            }
            None => Route::Fast,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("生成报告 for Acme Corp", Route::Slow)]
    #[case("Please run a CLIENT ANALYSIS on them", Route::Slow)]
    #[case("帮我做一下竞品分析", Route::Slow)]
    #[case("你好", Route::Fast)]
    #[case("analysis of clients", Route::Fast)]
    #[case("", Route::Fast)]
    fn default_keywords(#[case] prompt: &str, #[case] route: Route) {
        assert_eq!(KeywordRoutingPolicy::default().classify(prompt), route);
    }

    #[test]
    fn classification_is_deterministic() {
        let policy = KeywordRoutingPolicy::default();
        let prompt = "市场调研 and more";
        let first = policy.classify(prompt);
        for _ in 0..10 {
            assert_eq!(policy.classify(prompt), first);
        }
    }

    #[test]
    fn custom_keywords_are_normalised() {
        let policy = KeywordRoutingPolicy::new(["  Deep Dive ", ""]);
        assert_eq!(policy.keywords(), ["deep dive".to_string()]);
        assert_eq!(policy.classify("a deep dive please"), Route::Slow);
        assert_eq!(policy.matched_keyword("DEEP DIVE"), Some("deep dive"));
    }
}
