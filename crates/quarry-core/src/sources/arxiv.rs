use super::{squash_whitespace, PaperSource};
use crate::error::{QuarryError, Result};
use crate::types::{Document, Provenance};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::time::Duration;

const SOURCE_NAME: &str = "arxiv";

#[derive(Debug, Clone)]
pub struct ArxivConfig {
    pub base_url: String,
    /// Hard cap on results per query, whatever the caller asks for.
    pub max_results: usize,
    pub request_timeout: Duration,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            base_url: "https://export.arxiv.org/api/query".to_string(),
            max_results: 50,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// arXiv Atom API client
pub struct ArxivSource {
    client: reqwest::Client,
    config: ArxivConfig,
}

impl ArxivSource {
    pub fn new(config: ArxivConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("quarry/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl PaperSource for ArxivSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Document>> {
        let limit = max_results.min(self.config.max_results);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let search_query = format!("all:{}", query);
        let limit_param = limit.to_string();
        let response = self
            .client
            .get(&self.config.base_url)
            .query(&[
                ("search_query", search_query.as_str()),
                ("start", "0"),
                ("max_results", limit_param.as_str()),
                ("sortBy", "relevance"),
                ("sortOrder", "descending"),
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

        let body = response.text().await?;
        let mut documents = parse_feed(&body)?;
        documents.truncate(limit);

        log::info!("Found {} papers on arXiv for '{}'", documents.len(), query);
        Ok(documents)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    None,
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
}

#[derive(Default)]
struct EntryBuilder {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
    link: Option<String>,
    categories: Vec<String>,
}

impl EntryBuilder {
    fn apply_link_or_category(&mut self, tag: &BytesStart<'_>) -> Result<()> {
        match tag.local_name().as_ref() {
            b"link" => {
                let rel = attribute(tag, b"rel")?;
                if rel.as_deref() == Some("alternate") {
                    self.link = attribute(tag, b"href")?;
                }
            }
            b"category" => {
                if let Some(term) = attribute(tag, b"term")? {
                    if !self.categories.contains(&term) {
                        self.categories.push(term);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn push_text(&mut self, field: Field, text: &str) {
        match field {
            Field::Id => self.id.push_str(text),
            Field::Title => self.title.push_str(text),
            Field::Summary => self.summary.push_str(text),
            Field::Published => self.published.push_str(text),
            Field::AuthorName => {
                if let Some(last) = self.authors.last_mut() {
                    last.push_str(text);
                }
            }
            Field::None => {}
        }
    }

    fn finish(self) -> Result<Document> {
        let url = self.link.unwrap_or_else(|| self.id.trim().to_string());
        let mut doc = Document::new(
            squash_whitespace(&self.title),
            self.authors.iter().map(|a| squash_whitespace(a)).collect(),
            squash_whitespace(&self.summary),
            Provenance::new(SOURCE_NAME, url),
        )?
        .with_tags(self.categories);

        if let Ok(published) = DateTime::parse_from_rfc3339(self.published.trim()) {
            doc = doc.with_published(published.with_timezone(&Utc));
        }
        Ok(doc)
    }
}

fn attribute(tag: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in tag.attributes() {
        let attr = attr.map_err(|e| QuarryError::source_failure(SOURCE_NAME, e))?;
        if attr.key.local_name().as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|e| QuarryError::source_failure(SOURCE_NAME, e))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Parse an arXiv Atom feed. Entries missing a title or authors are
/// skipped; malformed XML is an error.
pub fn parse_feed(xml: &str) -> Result<Vec<Document>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut documents = Vec::new();
    let mut entry: Option<EntryBuilder> = None;
    let mut field = Field::None;
    let mut in_author = false;

    loop {
        match reader.read_event()? {
            Event::Start(tag) => {
                let name = tag.local_name();
                if let Some(e) = entry.as_mut() {
                    match name.as_ref() {
                        b"id" => field = Field::Id,
                        b"title" => field = Field::Title,
                        b"summary" => field = Field::Summary,
                        b"published" => field = Field::Published,
                        b"author" => in_author = true,
                        b"name" if in_author => {
                            e.authors.push(String::new());
                            field = Field::AuthorName;
                        }
                        _ => e.apply_link_or_category(&tag)?,
                    }
                } else if name.as_ref() == b"entry" {
                    entry = Some(EntryBuilder::default());
                }
            }
            Event::Empty(tag) => {
                if let Some(e) = entry.as_mut() {
                    e.apply_link_or_category(&tag)?;
                }
            }
            Event::Text(text) => {
                if let Some(e) = entry.as_mut() {
                    let text = text
                        .unescape()
                        .map_err(|err| QuarryError::source_failure(SOURCE_NAME, err))?;
                    e.push_text(field, &text);
                }
            }
            Event::CData(data) => {
                if let Some(e) = entry.as_mut() {
                    e.push_text(field, &String::from_utf8_lossy(&data));
                }
            }
            Event::End(tag) => match tag.local_name().as_ref() {
                b"entry" => {
                    if let Some(done) = entry.take() {
                        match done.finish() {
                            Ok(doc) => documents.push(doc),
                            Err(e) => log::debug!("Skipping arXiv entry: {}", e),
                        }
                    }
                    field = Field::None;
                    in_author = false;
                }
                b"author" => {
                    in_author = false;
                    field = Field::None;
                }
                _ => field = Field::None,
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(documents)
}
