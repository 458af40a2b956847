use crate::error::{bounded, QuarryError, Result};
use crate::generation::TextGenerator;
use crate::types::{Message, Role};
use std::sync::Arc;
use std::time::Duration;

/// Earlier user turns included in the prompt.
const CONTEXT_TURNS: usize = 3;

const LABELS: &[&str] = &[
    "improved query:",
    "optimized query:",
    "refined query:",
    "search query:",
    "retrieval query:",
    "query:",
];

/// Rewrites screened input into a retrieval-oriented query.
///
/// Without a generator, or whenever the generator fails, the input is
/// returned unchanged.
pub struct QueryTransformer {
    generator: Option<Arc<dyn TextGenerator>>,
    timeout: Duration,
}

impl QueryTransformer {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self {
            generator: Some(generator),
            timeout,
        }
    }

    /// A transformer that always passes its input through.
    pub fn passthrough() -> Self {
        Self {
            generator: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn transform_timeout(&self) -> Duration {
        self.timeout
    }

    /// Rewrite `text`, falling back to the input on any failure.
    pub async fn transform(&self, text: &str) -> String {
        match self.try_transform(text, &[]).await {
            Ok(query) => query,
            Err(e) => {
                log::warn!("Query transformation failed, using input unchanged: {}", e);
                text.to_string()
            }
        }
    }

    /// Rewrite `text`, reporting why it could not be rewritten. Recent
    /// user turns from `history` are offered as context.
    pub async fn try_transform(&self, text: &str, history: &[Message]) -> Result<String> {
        let Some(generator) = &self.generator else {
            return Ok(text.to_string());
        };

        let prompt = build_prompt(text, history);
        let raw = bounded("query transformation", self.timeout, generator.complete(&prompt)).await?;
        let query = clean_query(&raw)?;

        log::debug!("Transformed query '{}' -> '{}'", text, query);
        Ok(query)
    }
}

fn build_prompt(text: &str, history: &[Message]) -> String {
    let earlier: Vec<&str> = history
        .iter()
        .rev()
        .filter(|m| m.role == Role::User && m.content != text)
        .take(CONTEXT_TURNS)
        .map(|m| m.content.as_str())
        .collect();

    let mut context = String::new();
    if !earlier.is_empty() {
        context.push_str("EARLIER QUESTIONS (most recent first):\n");
        for q in earlier {
            context.push_str("- ");
            context.push_str(q);
            context.push('\n');
        }
        context.push('\n');
    }

    format!(
        "You refine research questions into search queries for academic databases.\n\
         Rewrite the question below as a single focused search query:\n\
         - use standard technical terminology\n\
         - keep the user's intent\n\
         - no explanations, no quotes, no labels\n\n\
         {}QUESTION:\n{}\n\n\
         Return ONLY the query text.",
        context, text
    )
}

/// Extract a bare query from a free-form generator reply.
pub fn clean_query(raw: &str) -> Result<String> {
    let text = strip_code_fence(raw.trim());

    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(text) {
        let picked = ["query", "query_summary"]
            .iter()
            .filter_map(|k| map.get(*k).and_then(|v| v.as_str()))
            .map(strip_quotes)
            .find(|s| !s.is_empty());
        return picked
            .map(str::to_string)
            .ok_or_else(|| malformed("JSON reply without a query field"));
    }

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let lower = line.to_lowercase();
        if lower.starts_with("here") && lower.ends_with(':') {
            continue;
        }

        let body = match LABELS.iter().find(|l| lower.starts_with(*l)) {
            Some(label) => line.get(label.len()..).unwrap_or(line).trim(),
            None => line,
        };

        let body = strip_quotes(body);
        if !body.is_empty() {
            return Ok(body.to_string());
        }
    }

    Err(malformed("empty reply"))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop an optional language tag on the opening fence.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

fn strip_quotes(s: &str) -> &str {
    s.trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '`' | '\u{201c}' | '\u{201d}'))
        .trim()
}

fn malformed(reason: &str) -> QuarryError {
    QuarryError::Capability(format!("malformed query reply: {}", reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Scripted(std::result::Result<&'static str, &'static str>);

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            self.0
                .map(str::to_string)
                .map_err(|e| QuarryError::Capability(e.to_string()))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    struct Stalled;

    #[async_trait]
    impl TextGenerator for Stalled {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("never".to_string())
        }

        fn model_name(&self) -> &str {
            "stalled"
        }
    }

    fn with(reply: std::result::Result<&'static str, &'static str>) -> QueryTransformer {
        QueryTransformer::new(Arc::new(Scripted(reply)), Duration::from_secs(1))
    }

    #[test]
    fn test_clean_plain_reply() {
        assert_eq!(clean_query("  graph neural networks  ").unwrap(), "graph neural networks");
    }

    #[test]
    fn test_clean_strips_label_and_quotes() {
        assert_eq!(
            clean_query("Improved query: \"sparse attention transformers\"").unwrap(),
            "sparse attention transformers"
        );
        assert_eq!(
            clean_query("Here is the refined query:\n\n`federated learning privacy`\n").unwrap(),
            "federated learning privacy"
        );
    }

    #[test]
    fn test_clean_json_reply() {
        let raw = r#"{"main_topic":"ml","query_summary":"gradient descent convergence"}"#;
        assert_eq!(clean_query(raw).unwrap(), "gradient descent convergence");

        let raw = "```json\n{\"query\": \"protein folding\"}\n```";
        assert_eq!(clean_query(raw).unwrap(), "protein folding");
    }

    #[test]
    fn test_clean_rejects_empty() {
        assert!(clean_query("   ").is_err());
        assert!(clean_query("\"\"").is_err());
        assert!(clean_query(r#"{"main_topic":"x"}"#).is_err());
    }

    #[tokio::test]
    async fn test_transform_uses_cleaned_reply() {
        let t = with(Ok("Query: contrastive learning"));
        assert_eq!(t.transform("ml stuff").await, "contrastive learning");
    }

    #[tokio::test]
    async fn test_transform_falls_back_on_failure() {
        let t = with(Err("service unavailable"));
        assert_eq!(t.transform("original text").await, "original text");
        assert!(t.try_transform("original text", &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_transform_falls_back_on_malformed() {
        let t = with(Ok("  \n "));
        assert_eq!(t.transform("original text").await, "original text");
    }

    #[tokio::test]
    async fn test_transform_falls_back_on_timeout() {
        let t = QueryTransformer::new(Arc::new(Stalled), Duration::from_millis(20));
        let err = t.try_transform("slow", &[]).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(t.transform("slow").await, "slow");
    }

    #[test]
    fn test_prompt_includes_recent_user_turns() {
        let history = vec![
            Message::user("what is attention"),
            Message::assistant("a long answer"),
            Message::user("and sparse variants?"),
        ];
        let prompt = build_prompt("and sparse variants?", &history);

        assert!(prompt.contains("- what is attention\n"));
        assert!(!prompt.contains("a long answer"));
        assert!(prompt.ends_with("QUESTION:\nand sparse variants?\n\nReturn ONLY the query text."));
        assert!(!build_prompt("q", &[]).contains("EARLIER"));
    }

    #[tokio::test]
    async fn test_passthrough() {
        let t = QueryTransformer::passthrough();
        assert_eq!(t.transform("as is").await, "as is");
    }
}
