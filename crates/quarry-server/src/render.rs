use quarry_core::{Document, ResearchResult};
use std::fmt::Write as _;

/// Papers listed in a chat reply.
const LISTED_DOCUMENTS: usize = 5;

/// Render a result as the assistant's chat reply.
pub fn chat_reply(result: &ResearchResult) -> String {
    let mut out = String::new();

    if let Some(summary) = &result.summary {
        out.push_str(summary.trim());
        out.push('\n');
    }

    if !result.documents.is_empty() {
        let _ = write!(out, "\nPapers ({} found):\n", result.total_found);
        for (i, doc) in result.documents.iter().take(LISTED_DOCUMENTS).enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, document_line(doc));
        }
        if result.documents.len() > LISTED_DOCUMENTS {
            let _ = writeln!(out, "... and {} more", result.documents.len() - LISTED_DOCUMENTS);
        }
    }

    if !result.sources.is_empty() {
        let _ = write!(out, "\nSources: {}\n", result.sources.join(", "));
    }

    out.trim_end().to_string()
}

fn document_line(doc: &Document) -> String {
    let mut line = doc.title().to_string();

    let authors = doc.authors();
    match authors.len() {
        0 => {}
        1 | 2 => {
            let _ = write!(line, " ({})", authors.join(", "));
        }
        _ => {
            let _ = write!(line, " ({} et al.)", authors[0]);
        }
    }
    if let Some(score) = doc.similarity_score() {
        let _ = write!(line, " [similarity {:.2}]", score);
    }
    let url = &doc.provenance().url;
    if !url.is_empty() {
        let _ = write!(line, " - {}", url);
    }
    line
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
