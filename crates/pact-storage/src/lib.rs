//! Cache persistence port, access-credential types, and HTTP fetch utilities for PACT.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pact_core::{CanonicalAgreement, ConflictRecord};
pub use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info_span;

pub const CRATE_NAME: &str = "pact-storage";

/// The whole-set sync output: agreements, conflicts, and the sync timestamp.
///
/// One cache slot exists; a successful sync replaces it entirely. There is
/// no incremental merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCache {
    pub agreements: Vec<CanonicalAgreement>,
    pub conflicts: Vec<ConflictRecord>,
    pub last_sync_time: DateTime<Utc>,
}

/// Persistence boundary for the sync cache. Implementations must treat
/// `save` as a whole-set swap.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn load(&self) -> anyhow::Result<Option<SyncCache>>;
    async fn save(&self, cache: &SyncCache) -> anyhow::Result<()>;
}

/// File-backed cache store writing one JSON document, atomically via a
/// temp-file rename so readers never observe a half-written cache.
#[derive(Debug, Clone)]
pub struct JsonFileCacheStore {
    path: PathBuf,
}

impl JsonFileCacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CacheStore for JsonFileCacheStore {
    async fn load(&self) -> anyhow::Result<Option<SyncCache>> {
        if !fs::try_exists(&self.path)
            .await
            .with_context(|| format!("checking cache path {}", self.path.display()))?
        {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading cache {}", self.path.display()))?;
        let cache = serde_json::from_str(&text)
            .with_context(|| format!("parsing cache {}", self.path.display()))?;
        Ok(Some(cache))
    }

    async fn save(&self, cache: &SyncCache) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec_pretty(cache).context("serializing sync cache")?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating cache directory {}", parent.display()))?;
        }

        let temp_name = format!(
            ".{}.{}.tmp",
            cache.last_sync_time.timestamp_millis(),
            bytes.len()
        );
        let temp_path = self
            .path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(temp_name);

        let mut file = fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp cache file {}", temp_path.display()))?;
        file.write_all(&bytes)
            .await
            .with_context(|| format!("writing temp cache file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp cache file {}", temp_path.display()))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "atomically renaming temp cache {} -> {}",
                    temp_path.display(),
                    self.path.display()
                )
            });
        }
        Ok(())
    }
}

/// In-memory cache store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    slot: Mutex<Option<SyncCache>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(cache: SyncCache) -> Self {
        Self {
            slot: Mutex::new(Some(cache)),
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn load(&self) -> anyhow::Result<Option<SyncCache>> {
        Ok(self.slot.lock().await.clone())
    }

    async fn save(&self, cache: &SyncCache) -> anyhow::Result<()> {
        *self.slot.lock().await = Some(cache.clone());
        Ok(())
    }
}

/// Bearer credential yielded by the (out-of-scope) auth handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessCredential {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessCredential {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.trim().is_empty() && self.expires_at > now
    }
}

/// Yields the current credential, if any. The sync pipeline fails fast when
/// no valid credential is available.
pub trait CredentialProvider: Send + Sync {
    fn credential(&self) -> Option<AccessCredential>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticCredentialProvider {
    credential: Option<AccessCredential>,
}

impl StaticCredentialProvider {
    pub fn new(credential: Option<AccessCredential>) -> Self {
        Self { credential }
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn credential(&self) -> Option<AccessCredential> {
        self.credential.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedJson {
    pub status: StatusCode,
    pub final_url: String,
    pub body: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("invalid JSON body from {url}: {message}")]
    InvalidBody { url: String, message: String },
}

/// Bearer-authenticated JSON GET client with retry classification and
/// exponential capped backoff. Requests are issued one at a time; the
/// pipeline never fans out concurrently.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            backoff: config.backoff,
        })
    }

    pub async fn fetch_json(
        &self,
        url: &str,
        bearer_token: &str,
    ) -> Result<FetchedJson, FetchError> {
        let span = info_span!("http_fetch", url);
        let _guard = span.enter();

        let mut last_request_error: Option<reqwest::Error> = None;

        for attempt in 0..=self.backoff.max_retries {
            let resp_result = self
                .client
                .get(url)
                .bearer_auth(bearer_token)
                .header(reqwest::header::ACCEPT, "application/json")
                .send()
                .await;

            match resp_result {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();

                    if status.is_success() {
                        let bytes = resp.bytes().await?;
                        let body = serde_json::from_slice(&bytes).map_err(|err| {
                            FetchError::InvalidBody {
                                url: final_url.clone(),
                                message: err.to_string(),
                            }
                        })?;
                        return Ok(FetchedJson {
                            status,
                            final_url,
                            body,
                        });
                    }

                    let disposition = classify_status(status);
                    if disposition == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }

                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                    });
                }
                Err(err) => {
                    let disposition = classify_reqwest_error(&err);
                    if disposition == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        last_request_error = Some(err);
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(FetchError::Request(err));
                }
            }
        }

        Err(FetchError::Request(
            last_request_error.expect("retry loop should capture a request error"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pact_core::{ExclusivityStatus, RenewalUrgency, RiskTier};
    use tempfile::tempdir;

    fn frozen_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).single().unwrap()
    }

    fn sample_cache() -> SyncCache {
        let now = frozen_now();
        SyncCache {
            agreements: vec![CanonicalAgreement {
                id: "agr-1".into(),
                source_id: "nav-1".into(),
                source_url: "https://example.test/agreements/nav-1".into(),
                execution_date: None,
                effective_date: Some(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
                expiration_date: chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                expiration_is_estimated: false,
                distributor_name: "MedEquip GmbH".into(),
                business_line: "Imaging".into(),
                initial_term_length: "2 years".into(),
                status: "Active".into(),
                territories: vec!["Germany".into()],
                product_categories: vec!["MRI Systems".into()],
                exclusivity_status: ExclusivityStatus::Exclusive,
                performance_based_exclusivity: "false".into(),
                customer_segment_restrictions: String::new(),
                currency: "USD".into(),
                standard_discount_percent: Some(12.5),
                volume_discount_percent: None,
                promotional_discount_percent: None,
                service_discount_percent: None,
                software_revenue_share: None,
                price_cap_increase_percent: None,
                annual_minimums: vec![],
                minimum_performance_threshold: 85.0,
                current_performance: 92.0,
                non_renewal_notice_days: 90,
                non_renewal_deadline: chrono::NaiveDate::from_ymd_opt(2025, 10, 3).unwrap(),
                days_until_expiration: 200,
                days_until_deadline: 110,
                renewal_urgency: RenewalUrgency::OnTrack,
                current_year_commitment: 0.0,
                risk_tier: RiskTier::Low,
                synced_at: now,
            }],
            conflicts: vec![],
            last_sync_time: now,
        }
    }

    #[tokio::test]
    async fn file_store_round_trips_and_loads_none_when_missing() {
        let dir = tempdir().expect("tempdir");
        let store = JsonFileCacheStore::new(dir.path().join("cache.json"));

        assert!(store.load().await.expect("load empty").is_none());

        let cache = sample_cache();
        store.save(&cache).await.expect("save");
        let loaded = store.load().await.expect("load").expect("some cache");
        assert_eq!(loaded, cache);
    }

    #[tokio::test]
    async fn file_store_save_replaces_whole_set() {
        let dir = tempdir().expect("tempdir");
        let store = JsonFileCacheStore::new(dir.path().join("cache.json"));

        let mut first = sample_cache();
        store.save(&first).await.expect("first save");

        first.agreements.clear();
        first.last_sync_time = frozen_now() + chrono::Duration::hours(1);
        store.save(&first).await.expect("second save");

        let loaded = store.load().await.expect("load").expect("some cache");
        assert!(loaded.agreements.is_empty());
        assert_eq!(loaded.last_sync_time, first.last_sync_time);
    }

    #[tokio::test]
    async fn cache_file_exposes_camel_case_keys() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("cache.json");
        let store = JsonFileCacheStore::new(&path);
        store.save(&sample_cache()).await.expect("save");

        let text = std::fs::read_to_string(&path).expect("read raw cache");
        let value: serde_json::Value = serde_json::from_str(&text).expect("parse raw cache");
        assert!(value.get("agreements").is_some());
        assert!(value.get("conflicts").is_some());
        assert!(value.get("lastSyncTime").is_some());
        assert!(value["agreements"][0].get("nonRenewalDeadline").is_some());
    }

    #[tokio::test]
    async fn in_memory_store_round_trips() {
        let store = InMemoryCacheStore::new();
        assert!(store.load().await.unwrap().is_none());
        let cache = sample_cache();
        store.save(&cache).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(cache));
    }

    #[test]
    fn credential_validity_checks_token_and_expiry() {
        let now = frozen_now();
        let valid = AccessCredential {
            access_token: "tok".into(),
            expires_at: now + chrono::Duration::minutes(30),
        };
        let expired = AccessCredential {
            access_token: "tok".into(),
            expires_at: now - chrono::Duration::seconds(1),
        };
        let blank = AccessCredential {
            access_token: "   ".into(),
            expires_at: now + chrono::Duration::minutes(30),
        };
        assert!(valid.is_valid(now));
        assert!(!expired.is_valid(now));
        assert!(!blank.is_valid(now));
    }

    #[test]
    fn backoff_logic_is_exponential_and_capped() {
        let policy = BackoffPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(350));
    }
}
