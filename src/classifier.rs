//! Notification triage: block/allow by app, spam scoring, and text shaping.
//!
//! Rules apply in a fixed order and the first match wins:
//! 1. blocked app → `FilteredOut`
//! 2. allowlist configured and app not on it → `FilteredOut`
//! 3. two or more distinct spam keywords in the text → `SpamFiltered`
//! 4. otherwise `Accepted` with the shaped, speakable text
//!
//! The verdict is a pure function of the input and the policy tables. The
//! optional AI rewrite only replaces the text of an accepted notification.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ClassifierConfig;
use crate::ollama::OllamaError;

/// Fewest distinct keywords that mark a text as spam.
const MIN_SPAM_THRESHOLD: usize = 2;

/// Longest AI rewrite that is delivered, in sentences.
const MAX_REWRITE_SENTENCES: usize = 2;

/// One externally observed phone notification.
#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    pub app: String,
    #[serde(default)]
    pub sender: Option<String>,
    pub text: String,
    #[serde(default)]
    pub package_name: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub priority: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    FilteredOut,
    SpamFiltered,
    Accepted(String),
}

impl Classification {
    /// Wire label used in API responses.
    pub fn label(&self) -> &'static str {
        match self {
            Self::FilteredOut => "filtered_out",
            Self::SpamFiltered => "spam_filtered",
            Self::Accepted(_) => "success",
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Accepted(text) => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error(transparent)]
    Ollama(#[from] OllamaError),
}

/// Rewrites an accepted notification into speakable text.
#[async_trait]
pub trait Rewriter: Send + Sync {
    async fn rewrite(
        &self,
        app: &str,
        sender: Option<&str>,
        text: &str,
    ) -> Result<String, RewriteError>;
}

pub struct Classifier {
    filtering_enabled: bool,
    ai_rewrite_enabled: bool,
    blocked_apps: HashSet<String>,
    allowed_apps: HashSet<String>,
    spam_keywords: Vec<String>,
    spam_threshold: usize,
    rewriter: Option<Arc<dyn Rewriter>>,
}

impl Classifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        let spam_threshold = if config.spam_threshold < MIN_SPAM_THRESHOLD {
            warn!(
                "spam_threshold {} is too aggressive, using {MIN_SPAM_THRESHOLD}",
                config.spam_threshold
            );
            MIN_SPAM_THRESHOLD
        } else {
            config.spam_threshold
        };

        let normalize = |items: &[String]| -> HashSet<String> {
            items
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };

        // Dedup while keeping config order so match lists read naturally.
        let mut seen = HashSet::new();
        let spam_keywords = config
            .spam_keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty() && seen.insert(k.clone()))
            .collect();

        Self {
            filtering_enabled: config.filtering_enabled,
            ai_rewrite_enabled: config.ai_rewrite_enabled,
            blocked_apps: normalize(&config.blocked_apps),
            allowed_apps: normalize(&config.allowed_apps),
            spam_keywords,
            spam_threshold,
            rewriter: None,
        }
    }

    pub fn with_rewriter(mut self, rewriter: Arc<dyn Rewriter>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    pub fn filtering_enabled(&self) -> bool {
        self.filtering_enabled
    }

    /// Whether accepted notifications go through the AI rewrite.
    pub fn ai_enabled(&self) -> bool {
        self.ai_rewrite_enabled && self.rewriter.is_some()
    }

    /// Decide on a notification using the default (non-AI) text shaping.
    pub fn classify(&self, app: &str, sender: Option<&str>, text: &str) -> Classification {
        if self.filtering_enabled {
            let app_key = app.trim().to_lowercase();

            if self.blocked_apps.contains(&app_key) {
                debug!("Notification from blocked app {app}");
                return Classification::FilteredOut;
            }

            if !self.allowed_apps.is_empty() && !self.allowed_apps.contains(&app_key) {
                debug!("Notification from {app} is not on the allowlist");
                return Classification::FilteredOut;
            }

            let matches = self.spam_matches(text);
            if matches.len() >= self.spam_threshold {
                info!("Spam filtered from {app}: matched {}", matches.join(", "));
                return Classification::SpamFiltered;
            }
        }

        Classification::Accepted(shape_text(app, sender, text))
    }

    /// Like [`Classifier::classify`], but accepted text is rewritten by the
    /// AI path when enabled. Rewrite failures fall back to default shaping.
    pub async fn classify_with_rewrite(&self, notification: &Notification) -> Classification {
        let sender = notification.sender.as_deref();
        let default_text = match self.classify(&notification.app, sender, &notification.text) {
            Classification::Accepted(text) => text,
            rejected => return rejected,
        };
        let Some(rewriter) = self.rewriter.as_ref().filter(|_| self.ai_rewrite_enabled) else {
            return Classification::Accepted(default_text);
        };

        match rewriter
            .rewrite(&notification.app, sender, &notification.text)
            .await
        {
            Ok(rewritten) if !rewritten.trim().is_empty() => {
                Classification::Accepted(first_sentences(&rewritten, MAX_REWRITE_SENTENCES))
            }
            Ok(_) => {
                warn!("AI rewrite returned blank text, using default shaping");
                Classification::Accepted(default_text)
            }
            Err(e) => {
                warn!("AI rewrite failed: {e}, using default shaping");
                Classification::Accepted(default_text)
            }
        }
    }

    /// Distinct spam keywords found in `text`, in keyword-list order.
    pub fn spam_matches(&self, text: &str) -> Vec<&str> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let haystack = text.to_lowercase();
        self.spam_keywords
            .iter()
            .filter(|k| haystack.contains(k.as_str()))
            .map(String::as_str)
            .collect()
    }
}

/// Default speakable text for an accepted notification.
pub fn shape_text(app: &str, sender: Option<&str>, text: &str) -> String {
    match sender.map(str::trim) {
        Some(sender) if !sender.is_empty() && !sender.eq_ignore_ascii_case(app.trim()) => {
            format!("Message from {sender} on {app}: {text}")
        }
        _ => format!("{app}: {text}"),
    }
}

/// Keep at most `n` sentences (split on `.`, `!`, `?`).
pub fn first_sentences(text: &str, n: usize) -> String {
    let text = text.trim();
    let mut count = 0;
    let mut end = text.len();
    for (i, b) in text.bytes().enumerate() {
        if b == b'.' || b == b'!' || b == b'?' {
            count += 1;
            if count >= n {
                end = i + 1;
                break;
            }
        }
    }
    text[..end].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new(&ClassifierConfig::default())
    }

    struct FixedRewriter(Result<&'static str, &'static str>);

    #[async_trait]
    impl Rewriter for FixedRewriter {
        async fn rewrite(
            &self,
            _app: &str,
            _sender: Option<&str>,
            _text: &str,
        ) -> Result<String, RewriteError> {
            self.0
                .map(String::from)
                .map_err(|e| RewriteError::Ollama(OllamaError::Connect(e.to_string())))
        }
    }

    fn notification(app: &str, sender: Option<&str>, text: &str) -> Notification {
        Notification {
            app: app.into(),
            sender: sender.map(String::from),
            text: text.into(),
            package_name: None,
            timestamp: None,
            priority: None,
        }
    }

    fn ai_classifier(rewriter: FixedRewriter) -> Classifier {
        let config = ClassifierConfig {
            ai_rewrite_enabled: true,
            ..ClassifierConfig::default()
        };
        Classifier::new(&config).with_rewriter(Arc::new(rewriter))
    }

    #[test]
    fn single_spam_keyword_is_not_spam() {
        let c = classifier();
        for text in [
            "are you free for lunch",
            "Hey, are you free for lunch today?",
            "Meeting starts in 10 minutes",
            "Can you please send me the report?",
        ] {
            let decision = c.classify("WhatsApp", Some("John"), text);
            assert_ne!(decision, Classification::SpamFiltered, "{text}");
        }
    }

    #[test]
    fn two_or_more_spam_keywords_is_spam() {
        let c = classifier();
        for text in [
            "FREE prize! Click here now!",
            "You won a free prize! Click here!",
            "Urgent! Act now to claim your lottery winnings!",
            "Congratulations! You are the winner of a million dollars!",
        ] {
            let decision = c.classify("WhatsApp", Some("Spam Sender"), text);
            assert_eq!(decision, Classification::SpamFiltered, "{text}");
        }
    }

    #[test]
    fn spam_matches_are_distinct() {
        let c = classifier();
        assert_eq!(c.spam_matches("free FREE free"), vec!["free"]);
        assert_eq!(
            c.spam_matches("FREE prize! Click here now!"),
            vec!["free", "click here", "prize"]
        );
        assert!(c.spam_matches("").is_empty());
    }

    #[test]
    fn blocked_app_wins_over_everything() {
        let c = classifier();
        assert_eq!(c.classify("Facebook", Some("Friend"), ""), Classification::FilteredOut);
        let decision = c.classify("facebook", None, "Check out this post");
        assert_eq!(decision, Classification::FilteredOut);
        assert_eq!(
            c.classify("Facebook", Some("x"), "free prize click here"),
            Classification::FilteredOut
        );
    }

    #[test]
    fn allowlist_rejects_unlisted_apps() {
        let config = ClassifierConfig {
            allowed_apps: vec!["WhatsApp".into(), "Messages".into()],
            ..ClassifierConfig::default()
        };
        let c = Classifier::new(&config);
        assert_eq!(c.classify("Telegram", Some("Ann"), "hi"), Classification::FilteredOut);
        assert!(matches!(c.classify("whatsapp", Some("Ann"), "hi"), Classification::Accepted(_)));
    }

    #[test]
    fn default_shaping_with_sender() {
        let c = classifier();
        assert_eq!(
            c.classify("WhatsApp", Some("John Doe"), "Hey, free for lunch?"),
            Classification::Accepted("Message from John Doe on WhatsApp: Hey, free for lunch?".into())
        );
    }

    #[test]
    fn default_shaping_without_usable_sender() {
        assert_eq!(shape_text("Gmail", None, "New mail"), "Gmail: New mail");
        assert_eq!(shape_text("Gmail", Some("  "), "New mail"), "Gmail: New mail");
        assert_eq!(shape_text("Gmail", Some("gmail"), "New mail"), "Gmail: New mail");
    }

    #[test]
    fn disabled_filtering_accepts_everything() {
        let config = ClassifierConfig {
            filtering_enabled: false,
            ..ClassifierConfig::default()
        };
        let c = Classifier::new(&config);
        assert_eq!(
            c.classify("Facebook", None, "free prize"),
            Classification::Accepted("Facebook: free prize".into())
        );
    }

    #[test]
    fn threshold_below_two_is_raised() {
        let config = ClassifierConfig {
            spam_threshold: 1,
            ..ClassifierConfig::default()
        };
        let c = Classifier::new(&config);
        assert!(matches!(c.classify("SMS", None, "are you free"), Classification::Accepted(_)));
    }

    #[test]
    fn first_sentences_keeps_at_most_n() {
        assert_eq!(first_sentences("One. Two! Three?", 2), "One. Two!");
        assert_eq!(first_sentences("No terminator", 2), "No terminator");
        assert_eq!(first_sentences("  Only one.  ", 2), "Only one.");
    }

    #[tokio::test]
    async fn ai_rewrite_replaces_accepted_text() {
        let c = ai_classifier(FixedRewriter(Ok("John is asking about lunch.")));
        let decision = c
            .classify_with_rewrite(&notification("Messages", Some("John"), "lunch?"))
            .await;
        assert_eq!(decision, Classification::Accepted("John is asking about lunch.".into()));
    }

    #[tokio::test]
    async fn long_ai_rewrite_is_cut_to_two_sentences() {
        let c = ai_classifier(FixedRewriter(Ok("One. Two. Three. Four.")));
        let decision = c.classify_with_rewrite(&notification("SMS", None, "hi")).await;
        assert_eq!(decision, Classification::Accepted("One. Two.".into()));
    }

    #[tokio::test]
    async fn ai_failure_falls_back_to_default_shaping() {
        let c = ai_classifier(FixedRewriter(Err("model offline")));
        let decision = c
            .classify_with_rewrite(&notification("WhatsApp", Some("John"), "Original message"))
            .await;
        assert_eq!(
            decision,
            Classification::Accepted("Message from John on WhatsApp: Original message".into())
        );
    }

    #[tokio::test]
    async fn blank_ai_output_falls_back_to_default_shaping() {
        let c = ai_classifier(FixedRewriter(Ok("   ")));
        let decision = c.classify_with_rewrite(&notification("SMS", None, "Code 1234")).await;
        assert_eq!(decision, Classification::Accepted("SMS: Code 1234".into()));
    }

    #[tokio::test]
    async fn ai_never_overrides_a_rejection() {
        let c = ai_classifier(FixedRewriter(Ok("should not appear")));
        let decision = c
            .classify_with_rewrite(&notification("WhatsApp", None, "free prize, click here"))
            .await;
        assert_eq!(decision, Classification::SpamFiltered);
    }

    #[tokio::test]
    async fn rewriter_is_ignored_when_disabled() {
        let c = classifier().with_rewriter(Arc::new(FixedRewriter(Ok("rewritten"))));
        assert!(!c.ai_enabled());
        let decision = c.classify_with_rewrite(&notification("SMS", None, "hello")).await;
        assert_eq!(decision, Classification::Accepted("SMS: hello".into()));
    }
}
