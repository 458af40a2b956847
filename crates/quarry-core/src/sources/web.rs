use super::{squash_whitespace, WebSource};
use crate::error::{QuarryError, Result};
use crate::types::WebResult;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

const SOURCE_NAME: &str = "duckduckgo";
const ANSWER_LABEL: &str = "DuckDuckGo Instant Answer";
const TOPIC_LABEL: &str = "DuckDuckGo Related Topics";

#[derive(Debug, Clone)]
pub struct DuckDuckGoConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for DuckDuckGoConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.duckduckgo.com/".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// DuckDuckGo instant-answer API
pub struct DuckDuckGoSource {
    client: reqwest::Client,
    config: DuckDuckGoConfig,
}

impl DuckDuckGoSource {
    pub fn new(config: DuckDuckGoConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl WebSource for DuckDuckGoSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>> {
        if max_results == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .get(&self.config.base_url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(QuarryError::source_failure(
                SOURCE_NAME,
                format!("API returned status {}", status),
            ));
        }

        let body: Value = response.json().await?;
        let results = parse_instant_answer(&body, max_results);
        log::info!("Found {} web results for '{}'", results.len(), query);
        Ok(results)
    }
}

/// Abstract first, then related topics (topic groups flattened), capped at
/// `max_results`.
pub fn parse_instant_answer(body: &Value, max_results: usize) -> Vec<WebResult> {
    let mut results = Vec::new();

    let abstract_text = str_field(body, "Abstract");
    if !abstract_text.is_empty() {
        let heading = str_field(body, "Heading");
        results.push(WebResult {
            title: if heading.is_empty() {
                ANSWER_LABEL.to_string()
            } else {
                heading.to_string()
            },
            url: str_field(body, "AbstractURL").to_string(),
            snippet: squash_whitespace(abstract_text),
            source: ANSWER_LABEL.to_string(),
        });
    }

    let mut topics: Vec<&Value> = Vec::new();
    if let Some(related) = body.get("RelatedTopics").and_then(Value::as_array) {
        for topic in related {
            match topic.get("Topics").and_then(Value::as_array) {
                Some(group) => topics.extend(group.iter()),
                None => topics.push(topic),
            }
        }
    }

    for topic in topics {
        if results.len() >= max_results {
            break;
        }
        let text = str_field(topic, "Text");
        if text.is_empty() {
            continue;
        }
        let title = text.split(" - ").next().unwrap_or(text);
        results.push(WebResult {
            title: title.trim().to_string(),
            url: str_field(topic, "FirstURL").to_string(),
            snippet: squash_whitespace(text),
            source: TOPIC_LABEL.to_string(),
        });
    }

    results.truncate(max_results);
    results
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "Heading": "Reinforcement learning",
            "Abstract": "Reinforcement learning is an area of machine learning.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Reinforcement_learning",
            "RelatedTopics": [
                {
                    "Text": "Q-learning - A model-free reinforcement learning algorithm.",
                    "FirstURL": "https://duckduckgo.com/Q-learning"
                },
                {
                    "Name": "See also",
                    "Topics": [
                        {
                            "Text": "Markov decision process - A discrete-time stochastic control process.",
                            "FirstURL": "https://duckduckgo.com/MDP"
                        },
                        { "FirstURL": "https://duckduckgo.com/empty" }
                    ]
                },
                {
                    "Text": "Temporal difference learning",
                    "FirstURL": "https://duckduckgo.com/TD"
                }
            ]
        })
    }

    #[test]
    fn test_abstract_then_topics() {
        let results = parse_instant_answer(&sample(), 10);
        assert_eq!(results.len(), 4);

        assert_eq!(results[0].title, "Reinforcement learning");
        assert_eq!(results[0].source, ANSWER_LABEL);

        assert_eq!(results[1].title, "Q-learning");
        assert_eq!(results[1].url, "https://duckduckgo.com/Q-learning");
        assert_eq!(results[1].source, TOPIC_LABEL);

        // Grouped topics are flattened in place
        assert_eq!(results[2].title, "Markov decision process");
        assert_eq!(results[3].title, "Temporal difference learning");
    }

    #[test]
    fn test_cap_applies_across_kinds() {
        let results = parse_instant_answer(&sample(), 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].title, "Q-learning");
    }

    #[test]
    fn test_missing_heading_uses_label() {
        let body = json!({ "Abstract": "Something", "RelatedTopics": [] });
        let results = parse_instant_answer(&body, 5);
        assert_eq!(results[0].title, ANSWER_LABEL);
        assert_eq!(results[0].url, "");
    }

    #[test]
    fn test_empty_answer() {
        assert!(parse_instant_answer(&json!({}), 5).is_empty());
        assert!(parse_instant_answer(&json!({ "Abstract": "" }), 5).is_empty());
    }
}
