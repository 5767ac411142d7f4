//! The default admission agents.
//!
//! Reference policy set, installed at broker startup in strictly descending
//! priority: spam blacklist (10), content analysis (8), channel rules (7),
//! length bounds (5). The heuristics inside each agent are example policies;
//! the chain contract in [`super::chain`] is what matters.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::core::agents::FilterAgent;

/// Rejects messages containing any of a case-insensitive set of spam markers.
#[derive(Debug)]
pub struct SpamFilterAgent {
    keywords: Vec<&'static str>,
}

const SPAM_KEYWORDS: &[&str] = &[
    "spam",
    "phishing",
    "malware",
    "virus",
    "hack",
    "free reward",
    "won",
    "claim now",
    "urgent",
    "click here",
    "limited offer",
];

impl Default for SpamFilterAgent {
    fn default() -> Self {
        Self {
            keywords: SPAM_KEYWORDS.to_vec(),
        }
    }
}

impl FilterAgent for SpamFilterAgent {
    fn name(&self) -> &str {
        "SpamFilterAgent"
    }

    fn description(&self) -> String {
        "Filters messages containing keywords related to spam".into()
    }

    fn priority(&self) -> i32 {
        10
    }

    fn evaluate(&self, content: &str, _queue_name: &str) -> anyhow::Result<bool> {
        let lowered = content.to_lowercase();
        for keyword in &self.keywords {
            if lowered.contains(keyword) {
                debug!(keyword, "spam filter rejected message");
                return Ok(false);
            }
        }
        Ok(true)
    }
}

static MALICIOUS_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(eval\(|exec\(|<script|javascript:|onclick=|onerror=)")
        .expect("malicious-code pattern is valid")
});

/// Rejects script/eval-style substrings and messages whose special-character
/// ratio exceeds 30%.
#[derive(Debug, Default)]
pub struct ContentAnalysisAgent;

impl FilterAgent for ContentAnalysisAgent {
    fn name(&self) -> &str {
        "ContentAnalysisAgent"
    }

    fn description(&self) -> String {
        "Analyzes message content to detect malicious code or excessive special characters".into()
    }

    fn priority(&self) -> i32 {
        8
    }

    fn evaluate(&self, content: &str, _queue_name: &str) -> anyhow::Result<bool> {
        if MALICIOUS_CODE.is_match(content) {
            debug!("content analysis rejected message: potentially malicious code");
            return Ok(false);
        }

        let total = content.chars().count();
        let special = content
            .chars()
            .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
            .count();
        // more than 30% special characters is suspicious
        if total > 0 && special * 10 > total * 3 {
            debug!(special, total, "content analysis rejected message: too many special characters");
            return Ok(false);
        }

        Ok(true)
    }
}

/// Per-queue format rules; queues without a rule always pass.
#[derive(Debug)]
pub struct ChannelRulesAgent {
    rules: HashMap<String, Regex>,
}

impl Default for ChannelRulesAgent {
    fn default() -> Self {
        let mut rules = HashMap::new();
        // Default queues carry a mandatory bracketed prefix; `general` is
        // deliberately unconstrained.
        rules.insert(
            "notification".to_string(),
            Regex::new(r"(?i)^\[NOTIFICATION\].*").expect("notification rule is valid"),
        );
        rules.insert(
            "alert".to_string(),
            Regex::new(r"(?i)^\[ALERT\].*").expect("alert rule is valid"),
        );
        rules.insert(
            "info".to_string(),
            Regex::new(r"(?i)^\[INFO\].*").expect("info rule is valid"),
        );
        Self { rules }
    }
}

impl ChannelRulesAgent {
    /// Adds or replaces the rule for one queue.
    pub fn with_rule(mut self, queue_name: impl Into<String>, rule: Regex) -> Self {
        self.rules.insert(queue_name.into(), rule);
        self
    }
}

impl FilterAgent for ChannelRulesAgent {
    fn name(&self) -> &str {
        "ChannelRulesAgent"
    }

    fn description(&self) -> String {
        "Validates that messages comply with the format rules of specific queues".into()
    }

    fn priority(&self) -> i32 {
        7
    }

    fn evaluate(&self, content: &str, queue_name: &str) -> anyhow::Result<bool> {
        let Some(rule) = self.rules.get(queue_name) else {
            return Ok(true);
        };
        let ok = rule.is_match(content);
        if !ok {
            debug!(queue = queue_name, "channel rules rejected message");
        }
        Ok(ok)
    }
}

/// Rejects messages shorter than `min` or longer than `max` characters.
#[derive(Debug)]
pub struct LengthFilterAgent {
    min: usize,
    max: usize,
}

impl LengthFilterAgent {
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }
}

impl Default for LengthFilterAgent {
    fn default() -> Self {
        Self::new(5, 500)
    }
}

impl FilterAgent for LengthFilterAgent {
    fn name(&self) -> &str {
        "LengthFilterAgent"
    }

    fn description(&self) -> String {
        format!("Filters messages based on their length (min: {}, max: {})", self.min, self.max)
    }

    fn priority(&self) -> i32 {
        5
    }

    fn evaluate(&self, content: &str, _queue_name: &str) -> anyhow::Result<bool> {
        let len = content.chars().count();
        if len < self.min {
            debug!(len, min = self.min, "length filter rejected message: too short");
            return Ok(false);
        }
        if len > self.max {
            debug!(len, max = self.max, "length filter rejected message: too long");
            return Ok(false);
        }
        Ok(true)
    }
}
