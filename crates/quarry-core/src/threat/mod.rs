//! Pattern-based input screening.
//!
//! Every query is classified before anything else touches it:
//! - tiered regular-expression tables (critical > high > medium > low)
//! - a denylist of credential/system-access keywords
//! - sanitization that strips high-risk spans and denylisted words
//!
//! Any failure inside the analysis yields the worst-case verdict.

mod patterns;

use crate::error::{QuarryError, Result};
use crate::types::Severity;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Tag recorded when the analysis itself failed.
pub const ANALYSIS_ERROR_TAG: &str = "security_analysis_error";

/// Configuration for the threat screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatScreenConfig {
    /// Inputs longer than this (in chars) are treated as an analysis failure.
    pub max_input_chars: usize,
    /// Innocuous query substituted when sanitization leaves too little.
    pub fallback_query: String,
}

impl Default for ThreatScreenConfig {
    fn default() -> Self {
        Self {
            max_input_chars: 10_000,
            fallback_query: "artificial intelligence research".to_string(),
        }
    }
}

/// Verdict for one input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreatAssessment {
    pub safe: bool,
    pub severity: Severity,
    /// Tags of the form `"<tier>:<pattern>"` or `"suspicious_keyword:<word>"`.
    pub threats: Vec<String>,
    /// Always at least 3 non-space characters.
    pub sanitized: String,
    /// 0.0 to 1.0
    pub confidence: f32,
    /// Set when the analysis failed and the worst case was assumed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct Tier {
    severity: Severity,
    patterns: Vec<(&'static str, Regex)>,
}

/// Stateless after construction; all checks are pure functions of the input.
pub struct ThreatScreen {
    tiers: Vec<Tier>,
    keywords: Vec<(&'static str, Regex)>,
    config: ThreatScreenConfig,
}

impl ThreatScreen {
    pub fn new() -> Result<Self> {
        Self::with_config(ThreatScreenConfig::default())
    }

    pub fn with_config(config: ThreatScreenConfig) -> Result<Self> {
        if non_space_len(&config.fallback_query) < 3 {
            return Err(QuarryError::Validation(
                "fallback_query must contain at least 3 non-space characters".to_string(),
            ));
        }

        let mut tiers = Vec::with_capacity(patterns::TIERS.len());
        for (severity, sources) in patterns::TIERS {
            let mut compiled = Vec::with_capacity(sources.len());
            for source in sources.iter() {
                compiled.push((*source, Regex::new(&format!("(?i){}", source))?));
            }
            tiers.push(Tier {
                severity: *severity,
                patterns: compiled,
            });
        }

        let mut keywords = Vec::with_capacity(patterns::SUSPICIOUS_KEYWORDS.len());
        for word in patterns::SUSPICIOUS_KEYWORDS {
            let re = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(word)))?;
            keywords.push((*word, re));
        }

        Ok(Self {
            tiers,
            keywords,
            config,
        })
    }

    pub fn config(&self) -> &ThreatScreenConfig {
        &self.config
    }

    /// Classify an input. Never fails: an internal error produces the
    /// worst-case verdict instead.
    pub fn classify(&self, text: &str) -> ThreatAssessment {
        match self.try_classify(text) {
            Ok(assessment) => assessment,
            Err(e) => {
                log::error!("Threat analysis failed, assuming worst case: {}", e);
                self.worst_case(e.to_string())
            }
        }
    }

    fn try_classify(&self, text: &str) -> Result<ThreatAssessment> {
        let chars = text.chars().count();
        if chars > self.config.max_input_chars {
            return Err(QuarryError::Validation(format!(
                "input too long for analysis ({} chars, maximum {})",
                chars, self.config.max_input_chars
            )));
        }

        let folded = text.to_lowercase();
        let mut threats = Vec::new();
        let mut severity = Severity::None;

        for tier in &self.tiers {
            for (source, re) in &tier.patterns {
                if re.is_match(&folded) {
                    threats.push(format!("{}:{}", tier.severity, source));
                    severity = severity.max(tier.severity);
                }
            }
        }
        let pattern_hit = !threats.is_empty();

        for (word, re) in &self.keywords {
            if re.is_match(&folded) {
                threats.push(format!("suspicious_keyword:{}", word));
            }
        }
        if !pattern_hit && !threats.is_empty() {
            severity = Severity::Low;
        }

        let safe = !pattern_hit;
        let confidence = confidence(safe, severity, threats.len());

        Ok(ThreatAssessment {
            safe,
            severity,
            threats,
            sanitized: self.sanitize(text),
            confidence,
            error: None,
        })
    }

    /// Strip critical/high spans and denylisted words, collapse whitespace,
    /// and substitute the fallback query if too little is left.
    pub fn sanitize(&self, text: &str) -> String {
        let mut cleaned = text.to_string();

        for tier in &self.tiers {
            if tier.severity < Severity::High {
                continue;
            }
            for (_, re) in &tier.patterns {
                cleaned = re.replace_all(&cleaned, "").into_owned();
            }
        }

        for (_, re) in &self.keywords {
            cleaned = re.replace_all(&cleaned, "").into_owned();
        }

        let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

        if non_space_len(&collapsed) < 3 {
            self.config.fallback_query.clone()
        } else {
            collapsed
        }
    }

    fn worst_case(&self, error: String) -> ThreatAssessment {
        ThreatAssessment {
            safe: false,
            severity: Severity::Critical,
            threats: vec![ANALYSIS_ERROR_TAG.to_string()],
            sanitized: self.config.fallback_query.clone(),
            confidence: 1.0,
            error: Some(error),
        }
    }
}

fn non_space_len(s: &str) -> usize {
    s.chars().filter(|c| !c.is_whitespace()).count()
}

fn confidence(safe: bool, severity: Severity, tag_count: usize) -> f32 {
    let base = if safe {
        0.9
    } else {
        match severity {
            Severity::None => 0.0,
            Severity::Low => 0.3,
            Severity::Medium => 0.6,
            Severity::High => 0.8,
            Severity::Critical => 0.95,
        }
    };
    (base + tag_count as f32 * 0.1).min(1.0)
}
