//! Literature metadata service abstraction
//!
//! Resolves PubMed identifiers into bibliographic metadata:
//! - Europe PMC REST search endpoint
//! - In-memory mock for tests and offline runs

use crate::config::LiteratureConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Bibliographic metadata returned by a literature service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiteratureRecord {
    pub pubmed_id: i64,
    pub title: String,
    pub authors: Option<String>,
    pub journal: Option<String>,
    pub year: Option<i32>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pages: Option<String>,
    pub doi: Option<String>,
    pub url: Option<String>,
}

impl LiteratureRecord {
    /// Minimal record with only a title
    pub fn new(pubmed_id: i64, title: impl Into<String>) -> Self {
        Self {
            pubmed_id,
            title: title.into(),
            authors: None,
            journal: None,
            year: None,
            volume: None,
            issue: None,
            pages: None,
            doi: None,
            url: None,
        }
    }
}

/// Trait for literature metadata lookups
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    /// Look up a batch of PubMed identifiers.
    ///
    /// Identifiers the service does not know are simply absent from the
    /// result; an `Err` means the service itself could not be reached.
    async fn fetch(&self, pubmed_ids: &[i64]) -> Result<Vec<LiteratureRecord>>;

    /// Get the provider name
    fn name(&self) -> &str;
}

/// Europe PMC client
pub struct EuropePmcClient {
    client: reqwest::Client,
    base_url: String,
    batch_size: usize,
    slow_lookup: Duration,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    result_list: ResultList,
}

#[derive(Deserialize)]
struct ResultList {
    #[serde(default)]
    result: Vec<EuropePmcResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EuropePmcResult {
    pmid: Option<String>,
    title: Option<String>,
    author_string: Option<String>,
    journal_info: Option<JournalInfo>,
    page_info: Option<String>,
    pub_year: Option<String>,
    doi: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JournalInfo {
    volume: Option<String>,
    issue: Option<String>,
    year_of_publication: Option<i32>,
    journal: Option<JournalName>,
}

#[derive(Deserialize)]
struct JournalName {
    #[serde(rename = "isoabbreviation")]
    iso_abbreviation: Option<String>,
    title: Option<String>,
}

impl EuropePmcResult {
    fn into_record(self) -> Option<LiteratureRecord> {
        let pubmed_id = self.pmid?.trim().parse::<i64>().ok()?;
        let journal_info = self.journal_info;
        let year = journal_info
            .as_ref()
            .and_then(|j| j.year_of_publication)
            .or_else(|| self.pub_year.as_deref().and_then(|y| y.parse().ok()));
        let (volume, issue, journal) = match journal_info {
            Some(info) => (
                info.volume,
                info.issue,
                info.journal.and_then(|j| j.iso_abbreviation.or(j.title)),
            ),
            None => (None, None, None),
        };

        Some(LiteratureRecord {
            pubmed_id,
            title: self.title.unwrap_or_default(),
            authors: self.author_string,
            journal,
            year,
            volume,
            issue,
            pages: self.page_info,
            url: Some(format!("https://europepmc.org/article/MED/{}", pubmed_id)),
            doi: self.doi,
        })
    }
}

impl EuropePmcClient {
    /// Create a new Europe PMC client
    pub fn new(config: &LiteratureConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            batch_size: config.batch_size.max(1),
            slow_lookup: Duration::from_millis(config.slow_lookup_ms),
        })
    }

    /// Query string matching every identifier of the batch
    fn query_for(pubmed_ids: &[i64]) -> String {
        let ids = pubmed_ids
            .iter()
            .map(|id| format!("EXT_ID:{}", id))
            .collect::<Vec<_>>()
            .join(" OR ");
        format!("({}) AND SRC:MED", ids)
    }

    async fn make_request(&self, pubmed_ids: &[i64]) -> Result<Vec<LiteratureRecord>> {
        let url = format!("{}/search", self.base_url);
        let page_size = pubmed_ids.len().to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("query", Self::query_for(pubmed_ids).as_str()),
                ("format", "json"),
                ("resultType", "core"),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::LiteratureService {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LiteratureService {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: SearchResponse =
            response
                .json()
                .await
                .map_err(|e| AppError::LiteratureService {
                    message: format!("Failed to parse response: {}", e),
                })?;

        Ok(result
            .result_list
            .result
            .into_iter()
            .filter_map(EuropePmcResult::into_record)
            .collect())
    }
}

#[async_trait]
impl LiteratureSource for EuropePmcClient {
    async fn fetch(&self, pubmed_ids: &[i64]) -> Result<Vec<LiteratureRecord>> {
        let start = Instant::now();
        let mut records = Vec::with_capacity(pubmed_ids.len());

        // No retry: a failed lookup aborts the enclosing edit
        for chunk in pubmed_ids.chunks(self.batch_size) {
            match self.make_request(chunk).await {
                Ok(found) => records.extend(found),
                Err(e) => {
                    crate::metrics::record_literature_lookup(
                        start.elapsed().as_secs_f64(),
                        self.name(),
                        pubmed_ids.len(),
                        false,
                    );
                    return Err(e);
                }
            }
        }

        let elapsed = start.elapsed();
        crate::metrics::record_literature_lookup(
            elapsed.as_secs_f64(),
            self.name(),
            pubmed_ids.len(),
            true,
        );

        if elapsed > self.slow_lookup {
            tracing::warn!(
                requested = pubmed_ids.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Slow literature lookup while a transaction is open"
            );
        }

        Ok(records)
    }

    fn name(&self) -> &str {
        "europepmc"
    }
}

/// Mock literature source for testing
#[derive(Default)]
pub struct MockLiteratureSource {
    records: HashMap<i64, LiteratureRecord>,
    unavailable: bool,
    calls: AtomicUsize,
}

impl MockLiteratureSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source that fails every lookup, as an unreachable service would
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn with_record(mut self, record: LiteratureRecord) -> Self {
        self.records.insert(record.pubmed_id, record);
        self
    }

    /// Number of batch lookups served so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiteratureSource for MockLiteratureSource {
    async fn fetch(&self, pubmed_ids: &[i64]) -> Result<Vec<LiteratureRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.unavailable {
            return Err(AppError::LiteratureService {
                message: "mock literature service unavailable".to_string(),
            });
        }

        Ok(pubmed_ids
            .iter()
            .filter_map(|id| self.records.get(id).cloned())
            .collect())
    }

    fn name(&self) -> &str {
        "mock-literature"
    }
}

/// Create a literature source based on configuration
pub fn create_literature_source(config: &LiteratureConfig) -> Result<Arc<dyn LiteratureSource>> {
    match config.provider.as_str() {
        "europepmc" => Ok(Arc::new(EuropePmcClient::new(config)?)),
        "mock" => Ok(Arc::new(MockLiteratureSource::new())),
        other => Err(AppError::Configuration {
            message: format!("Unknown literature provider: {}", other),
        }),
    }
}
