//! Sync pipeline: derived-field computation, risk scoring, conflict detection,
//! and the staged orchestrator that ties credential check, fetch, processing,
//! and the whole-set cache swap together.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use pact_adapters::{
    demo_agreements, normalize, AgreementSource, NavigatorSource, PacingPolicy,
};
use pact_core::{
    non_renewal_deadline, CanonicalAgreement, Clock, ConflictRecord, ConflictSeverity,
    ExclusivityStatus, RenewalUrgency, RiskTier, SystemClock,
};
use pact_storage::{
    AccessCredential, CacheStore, CredentialProvider, HttpClientConfig, HttpFetcher,
    JsonFileCacheStore, StaticCredentialProvider, SyncCache,
};
use thiserror::Error;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "pact-sync";

const SECONDS_PER_DAY: i64 = 86_400;

/// Ceiling-rounded whole days from `now` until midnight UTC of `date`.
/// Negative when the date has passed.
pub fn days_until(date: NaiveDate, now: DateTime<Utc>) -> i64 {
    let target = date
        .and_hms_opt(0, 0, 0)
        .expect("midnight exists for every calendar date")
        .and_utc();
    let seconds = (target - now).num_seconds();
    seconds.div_euclid(SECONDS_PER_DAY) + i64::from(seconds.rem_euclid(SECONDS_PER_DAY) > 0)
}

/// Urgency bands over the days remaining until the non-renewal deadline.
///
/// A deadline that has already passed (<= 0) reports OnTrack, not an
/// escalated state. That mirrors the upstream platform's policy verbatim;
/// it reads as unintended there but is preserved rather than second-guessed.
pub fn renewal_urgency(days_until_deadline: i64) -> RenewalUrgency {
    if days_until_deadline > 0 && days_until_deadline <= 30 {
        RenewalUrgency::Urgent
    } else if days_until_deadline > 0 && days_until_deadline <= 90 {
        RenewalUrgency::Warning
    } else {
        RenewalUrgency::OnTrack
    }
}

/// Weighted point rule over already-derived fields. Each rule fires at most
/// once; points are additive and independent.
pub fn risk_tier(agreement: &CanonicalAgreement) -> RiskTier {
    let mut points = 0u32;

    if agreement.current_performance < agreement.minimum_performance_threshold {
        points += 3;
    } else if agreement.current_performance < agreement.minimum_performance_threshold + 5.0 {
        points += 1;
    }

    // Same open/closed band convention as the urgency classification,
    // evaluated independently; a passed deadline scores nothing here either.
    let days = agreement.days_until_deadline;
    if days > 0 && days <= 30 {
        points += 3;
    } else if days > 0 && days <= 90 {
        points += 1;
    }

    if agreement.exclusivity_status == ExclusivityStatus::ConditionalExclusive
        && agreement.current_performance < 90.0
    {
        points += 2;
    }

    if points >= 5 {
        RiskTier::High
    } else if points >= 2 {
        RiskTier::Medium
    } else {
        RiskTier::Low
    }
}

/// Populate every derived field of an agreement relative to `now`.
///
/// The non-renewal deadline is calendar subtraction, so it never drifts
/// across month or year boundaries the way elapsed-time subtraction would;
/// absurd notice periods saturate at the calendar bounds.
pub fn enrich(mut agreement: CanonicalAgreement, now: DateTime<Utc>) -> CanonicalAgreement {
    agreement.non_renewal_deadline =
        non_renewal_deadline(agreement.expiration_date, agreement.non_renewal_notice_days);
    agreement.days_until_expiration = days_until(agreement.expiration_date, now);
    agreement.days_until_deadline = days_until(agreement.non_renewal_deadline, now);
    agreement.renewal_urgency = renewal_urgency(agreement.days_until_deadline);
    agreement.current_year_commitment = agreement
        .annual_minimums
        .iter()
        .find(|minimum| minimum.year == now.year())
        .map(|minimum| minimum.amount)
        .unwrap_or(0.0);
    agreement.risk_tier = risk_tier(&agreement);
    agreement.synced_at = now;
    agreement
}

fn overlap(left: &[String], right: &[String]) -> Vec<String> {
    left.iter()
        .filter(|item| right.contains(item))
        .cloned()
        .collect()
}

/// Exhaustive unordered pairwise scan for exclusivity conflicts.
///
/// A pair conflicts when territories and product categories both intersect
/// and at least one side holds an Exclusive grant (Conditional Exclusive
/// does not count). Severity is High only when both sides are Exclusive.
/// Output order follows pair-generation order (ascending i, then j).
pub fn detect_conflicts(agreements: &[CanonicalAgreement]) -> Vec<ConflictRecord> {
    let mut conflicts = Vec::new();

    for i in 0..agreements.len() {
        for j in (i + 1)..agreements.len() {
            let a = &agreements[i];
            let b = &agreements[j];

            let territories = overlap(&a.territories, &b.territories);
            if territories.is_empty() {
                continue;
            }
            let products = overlap(&a.product_categories, &b.product_categories);
            if products.is_empty() {
                continue;
            }

            let a_exclusive = a.exclusivity_status == ExclusivityStatus::Exclusive;
            let b_exclusive = b.exclusivity_status == ExclusivityStatus::Exclusive;
            if !a_exclusive && !b_exclusive {
                continue;
            }

            let severity = if a_exclusive && b_exclusive {
                ConflictSeverity::High
            } else {
                ConflictSeverity::Medium
            };

            conflicts.push(ConflictRecord {
                id: format!("{}::{}", a.id, b.id),
                agreement_a_id: a.id.clone(),
                agreement_a_name: a.distributor_name.clone(),
                agreement_a_exclusivity: a.exclusivity_status,
                agreement_b_id: b.id.clone(),
                agreement_b_name: b.distributor_name.clone(),
                agreement_b_exclusivity: b.exclusivity_status,
                severity,
                overlapping_territories: territories,
                overlapping_products: products,
            });
        }
    }

    conflicts
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Authenticating,
    Fetching,
    Processing,
    Caching,
    Complete,
    Error,
}

/// Stage-transition observer. Progress percentages are informational
/// checkpoints (0/20/60/80/100), never control flow.
pub trait ProgressObserver: Send + Sync {
    fn on_stage(&self, stage: SyncStage, percent: u8);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgressObserver;

impl ProgressObserver for NoopProgressObserver {
    fn on_stage(&self, _stage: SyncStage, _percent: u8) {}
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no valid access credential available")]
    AuthenticationMissing,
    #[error("upstream fetch failed: {0}")]
    UpstreamFetchFailed(String),
    #[error("cache persistence failed: {0}")]
    Cache(String),
}

/// Outcome of one sync cycle. A failed live fetch is not a failure: the
/// pipeline degrades to the sample dataset and reports `used_sample_data`.
#[derive(Debug)]
pub enum SyncReport {
    Completed {
        agreement_count: usize,
        conflict_count: usize,
        elapsed_seconds: f64,
        last_sync_time: DateTime<Utc>,
        used_sample_data: bool,
    },
    Failed {
        error: SyncError,
        /// Whether a previously cached result remains available for display.
        using_cache: bool,
    },
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub api_base_url: String,
    pub access_token: String,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub cache_path: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub detail_delay_ms: u64,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            api_base_url: std::env::var("PACT_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.navigator.example.com/v1".to_string()),
            access_token: std::env::var("PACT_ACCESS_TOKEN").unwrap_or_default(),
            token_expires_at: std::env::var("PACT_TOKEN_EXPIRES_AT")
                .ok()
                .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            cache_path: std::env::var("PACT_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./pact-cache.json")),
            user_agent: std::env::var("PACT_USER_AGENT")
                .unwrap_or_else(|_| "pact-bot/0.1".to_string()),
            http_timeout_secs: std::env::var("PACT_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            detail_delay_ms: std::env::var("PACT_DETAIL_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(400),
        }
    }

    fn credential(&self) -> Option<AccessCredential> {
        if self.access_token.trim().is_empty() {
            return None;
        }
        Some(AccessCredential {
            access_token: self.access_token.clone(),
            expires_at: self
                .token_expires_at
                .unwrap_or_else(|| Utc::now() + chrono::Duration::hours(1)),
        })
    }
}

/// Staged sync orchestrator.
///
/// `sync` takes `&mut self`: concurrent invocation is not supported, and the
/// exclusive borrow makes callers serialize cycles instead of relying on a
/// lock that does not exist.
pub struct SyncPipeline {
    credentials: Box<dyn CredentialProvider>,
    source: Box<dyn AgreementSource>,
    store: Arc<dyn CacheStore>,
    clock: Box<dyn Clock>,
}

impl SyncPipeline {
    pub fn new(
        credentials: Box<dyn CredentialProvider>,
        source: Box<dyn AgreementSource>,
        store: Arc<dyn CacheStore>,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            credentials,
            source,
            store,
            clock,
        }
    }

    pub fn from_config(config: &SyncConfig) -> anyhow::Result<Self> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
            ..Default::default()
        })?;
        let pacing = PacingPolicy {
            delay: Duration::from_millis(config.detail_delay_ms),
        };
        Ok(Self::new(
            Box::new(StaticCredentialProvider::new(config.credential())),
            Box::new(NavigatorSource::new(
                config.api_base_url.as_str(),
                http,
                pacing,
            )),
            Arc::new(JsonFileCacheStore::new(config.cache_path.clone())),
            Box::new(SystemClock),
        ))
    }

    async fn cached_result_available(&self) -> bool {
        matches!(self.store.load().await, Ok(Some(_)))
    }

    /// Run one full cycle: authenticate, fetch (with sample-data fallback),
    /// normalize + enrich, detect conflicts, and swap the cache wholesale.
    pub async fn sync(&mut self, observer: &dyn ProgressObserver) -> SyncReport {
        let started = Instant::now();
        let now = self.clock.now();

        observer.on_stage(SyncStage::Authenticating, 0);
        let credential = match self.credentials.credential() {
            Some(credential) if credential.is_valid(now) => credential,
            _ => {
                observer.on_stage(SyncStage::Error, 0);
                return SyncReport::Failed {
                    error: SyncError::AuthenticationMissing,
                    using_cache: self.cached_result_available().await,
                };
            }
        };

        observer.on_stage(SyncStage::Fetching, 20);
        let (raw_records, used_sample_data) = match self.source.fetch_agreements(&credential).await
        {
            Ok(records) => (records, false),
            Err(err) => {
                // Graceful degradation: a failed live fetch serves the fixed
                // sample dataset so the pipeline and its consumers stay
                // exercisable.
                warn!(
                    error = %SyncError::UpstreamFetchFailed(err.to_string()),
                    "falling back to sample dataset"
                );
                (demo_agreements(), true)
            }
        };

        observer.on_stage(SyncStage::Processing, 60);
        let agreements: Vec<CanonicalAgreement> = raw_records
            .iter()
            .map(|raw| enrich(normalize(raw, now), now))
            .collect();
        let conflicts = detect_conflicts(&agreements);

        observer.on_stage(SyncStage::Caching, 80);
        let cache = SyncCache {
            agreements,
            conflicts,
            last_sync_time: now,
        };
        if let Err(err) = self.store.save(&cache).await {
            observer.on_stage(SyncStage::Error, 80);
            return SyncReport::Failed {
                error: SyncError::Cache(format!("{err:#}")),
                using_cache: self.cached_result_available().await,
            };
        }

        observer.on_stage(SyncStage::Complete, 100);
        info!(
            agreements = cache.agreements.len(),
            conflicts = cache.conflicts.len(),
            used_sample_data,
            "sync complete"
        );
        SyncReport::Completed {
            agreement_count: cache.agreements.len(),
            conflict_count: cache.conflicts.len(),
            elapsed_seconds: started.elapsed().as_secs_f64(),
            last_sync_time: now,
            used_sample_data,
        }
    }
}

/// Convenience entry point for the CLI: env config, live source, file cache.
pub async fn run_sync_once_from_env() -> anyhow::Result<SyncReport> {
    let config = SyncConfig::from_env();
    let mut pipeline = SyncPipeline::from_config(&config)?;
    Ok(pipeline.sync(&NoopProgressObserver).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pact_core::AnnualMinimum;

    fn frozen_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).single().unwrap()
    }

    fn base_agreement(id: &str) -> CanonicalAgreement {
        let now = frozen_now();
        CanonicalAgreement {
            id: id.to_string(),
            source_id: id.to_string(),
            source_url: String::new(),
            execution_date: None,
            effective_date: None,
            expiration_date: NaiveDate::from_ymd_opt(2026, 6, 15).unwrap(),
            expiration_is_estimated: false,
            distributor_name: format!("Distributor {id}"),
            business_line: String::new(),
            initial_term_length: String::new(),
            status: "Active".into(),
            territories: vec![],
            product_categories: vec![],
            exclusivity_status: ExclusivityStatus::NonExclusive,
            performance_based_exclusivity: "false".into(),
            customer_segment_restrictions: String::new(),
            currency: "USD".into(),
            standard_discount_percent: None,
            volume_discount_percent: None,
            promotional_discount_percent: None,
            service_discount_percent: None,
            software_revenue_share: None,
            price_cap_increase_percent: None,
            annual_minimums: vec![],
            minimum_performance_threshold: 85.0,
            current_performance: 100.0,
            non_renewal_notice_days: 90,
            non_renewal_deadline: NaiveDate::from_ymd_opt(2026, 3, 17).unwrap(),
            days_until_expiration: 0,
            days_until_deadline: 0,
            renewal_urgency: RenewalUrgency::OnTrack,
            current_year_commitment: 0.0,
            risk_tier: RiskTier::Low,
            synced_at: now,
        }
    }

    /// Agreement whose enriched `days_until_deadline` equals `days` under
    /// the frozen clock.
    fn agreement_with_deadline_in(days: i64) -> CanonicalAgreement {
        let mut agreement = base_agreement("deadline");
        let deadline = frozen_now().date_naive() + chrono::Duration::days(days);
        agreement.expiration_date =
            deadline + chrono::Duration::days(agreement.non_renewal_notice_days);
        agreement
    }

    #[test]
    fn deadline_is_exact_calendar_subtraction_across_year_boundary() {
        let mut agreement = base_agreement("a");
        agreement.expiration_date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        agreement.non_renewal_notice_days = 31;
        let enriched = enrich(agreement, frozen_now());
        assert_eq!(
            enriched.non_renewal_deadline,
            NaiveDate::from_ymd_opt(2024, 12, 15).unwrap()
        );
    }

    #[test]
    fn day_counts_are_ceiling_rounded_and_may_be_negative() {
        let now = frozen_now(); // 2025-06-15T12:00:00Z
        assert_eq!(days_until(NaiveDate::from_ymd_opt(2025, 6, 16).unwrap(), now), 1);
        assert_eq!(days_until(NaiveDate::from_ymd_opt(2025, 6, 15).unwrap(), now), 0);
        assert_eq!(days_until(NaiveDate::from_ymd_opt(2025, 6, 14).unwrap(), now), -1);
        assert_eq!(days_until(NaiveDate::from_ymd_opt(2025, 7, 15).unwrap(), now), 30);
    }

    #[test]
    fn enrich_saturates_extreme_notice_periods_instead_of_overflowing() {
        let mut agreement = base_agreement("a");
        agreement.non_renewal_notice_days = i64::MAX;
        let enriched = enrich(agreement, frozen_now());
        assert_eq!(enriched.non_renewal_deadline, NaiveDate::MIN);
        assert_eq!(enriched.renewal_urgency, RenewalUrgency::OnTrack);
    }

    #[test]
    fn urgency_band_boundaries() {
        assert_eq!(renewal_urgency(1), RenewalUrgency::Urgent);
        assert_eq!(renewal_urgency(30), RenewalUrgency::Urgent);
        assert_eq!(renewal_urgency(31), RenewalUrgency::Warning);
        assert_eq!(renewal_urgency(90), RenewalUrgency::Warning);
        assert_eq!(renewal_urgency(91), RenewalUrgency::OnTrack);
    }

    // Documented-but-suspicious upstream policy: an already-passed deadline
    // is OnTrack, not escalated. Preserved verbatim.
    #[test]
    fn passed_deadline_is_reported_on_track_not_escalated() {
        assert_eq!(renewal_urgency(0), RenewalUrgency::OnTrack);
        assert_eq!(renewal_urgency(-15), RenewalUrgency::OnTrack);

        let enriched = enrich(agreement_with_deadline_in(-10), frozen_now());
        assert_eq!(enriched.renewal_urgency, RenewalUrgency::OnTrack);
    }

    #[test]
    fn risk_example_shortfall_plus_warning_band_is_medium() {
        // perf 78 < 85 (+3), deadline in 45 days (+1) => 4 => Medium.
        let mut agreement = agreement_with_deadline_in(45);
        agreement.current_performance = 78.0;
        let enriched = enrich(agreement, frozen_now());
        assert_eq!(enriched.days_until_deadline, 45);
        assert_eq!(enriched.renewal_urgency, RenewalUrgency::Warning);
        assert_eq!(enriched.risk_tier, RiskTier::Medium);
    }

    #[test]
    fn risk_tier_thresholds_are_inclusive_on_the_lower_bound() {
        // 85 <= perf < 90 scores exactly +1 => Low.
        let mut agreement = agreement_with_deadline_in(200);
        agreement.current_performance = 87.0;
        assert_eq!(risk_tier(&enrich(agreement, frozen_now())), RiskTier::Low);

        // +1 (near-threshold) +1 (warning band) = 2 => Medium.
        let mut agreement = agreement_with_deadline_in(45);
        agreement.current_performance = 87.0;
        assert_eq!(risk_tier(&enrich(agreement, frozen_now())), RiskTier::Medium);

        // +3 (shortfall) +2 (conditional, perf < 90) = 5 => High.
        let mut agreement = agreement_with_deadline_in(200);
        agreement.current_performance = 70.0;
        agreement.exclusivity_status = ExclusivityStatus::ConditionalExclusive;
        assert_eq!(risk_tier(&enrich(agreement, frozen_now())), RiskTier::High);
    }

    #[test]
    fn conditional_penalty_requires_performance_below_ninety() {
        let mut agreement = agreement_with_deadline_in(200);
        agreement.exclusivity_status = ExclusivityStatus::ConditionalExclusive;
        agreement.current_performance = 95.0;
        assert_eq!(risk_tier(&enrich(agreement, frozen_now())), RiskTier::Low);
    }

    #[test]
    fn passed_deadline_scores_no_proximity_points() {
        let mut agreement = agreement_with_deadline_in(-5);
        agreement.current_performance = 100.0;
        assert_eq!(risk_tier(&enrich(agreement, frozen_now())), RiskTier::Low);
    }

    #[test]
    fn current_year_commitment_matches_the_evaluation_year() {
        let mut agreement = base_agreement("a");
        agreement.annual_minimums = vec![
            AnnualMinimum { year: 2024, amount: 100.0 },
            AnnualMinimum { year: 2025, amount: 250.0 },
            AnnualMinimum { year: 2025, amount: 999.0 },
        ];
        let enriched = enrich(agreement, frozen_now());
        // First match wins; year uniqueness is expected upstream, not enforced.
        assert_eq!(enriched.current_year_commitment, 250.0);

        let mut agreement = base_agreement("b");
        agreement.annual_minimums = vec![AnnualMinimum { year: 2030, amount: 1.0 }];
        assert_eq!(enrich(agreement, frozen_now()).current_year_commitment, 0.0);
    }

    #[test]
    fn enrich_stamps_synced_at_with_the_evaluation_instant() {
        let enriched = enrich(base_agreement("a"), frozen_now());
        assert_eq!(enriched.synced_at, frozen_now());
    }

    fn scoped(
        id: &str,
        territories: &[&str],
        products: &[&str],
        exclusivity: ExclusivityStatus,
    ) -> CanonicalAgreement {
        let mut agreement = base_agreement(id);
        agreement.territories = territories.iter().map(|t| t.to_string()).collect();
        agreement.product_categories = products.iter().map(|p| p.to_string()).collect();
        agreement.exclusivity_status = exclusivity;
        agreement
    }

    #[test]
    fn one_exclusive_side_over_shared_scope_is_a_medium_conflict() {
        let agreements = vec![
            scoped(
                "a",
                &["Germany", "Austria"],
                &["MRI Systems", "CT Scanners"],
                ExclusivityStatus::Exclusive,
            ),
            scoped(
                "b",
                &["Germany", "Switzerland"],
                &["MRI Systems"],
                ExclusivityStatus::NonExclusive,
            ),
        ];
        let conflicts = detect_conflicts(&agreements);
        assert_eq!(conflicts.len(), 1);
        let conflict = &conflicts[0];
        assert_eq!(conflict.severity, ConflictSeverity::Medium);
        assert_eq!(conflict.overlapping_territories, vec!["Germany"]);
        assert_eq!(conflict.overlapping_products, vec!["MRI Systems"]);
        assert_eq!(conflict.agreement_a_id, "a");
        assert_eq!(conflict.agreement_b_id, "b");
    }

    #[test]
    fn two_exclusive_sides_are_a_high_conflict() {
        let agreements = vec![
            scoped("a", &["Germany"], &["MRI Systems"], ExclusivityStatus::Exclusive),
            scoped("b", &["Germany"], &["MRI Systems"], ExclusivityStatus::Exclusive),
        ];
        let conflicts = detect_conflicts(&agreements);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].severity, ConflictSeverity::High);
    }

    #[test]
    fn no_overlap_means_no_conflict_regardless_of_exclusivity() {
        let agreements = vec![
            scoped("a", &["Germany"], &["MRI Systems"], ExclusivityStatus::Exclusive),
            scoped("b", &["Spain"], &["MRI Systems"], ExclusivityStatus::Exclusive),
            scoped("c", &["Germany"], &["Ultrasound"], ExclusivityStatus::Exclusive),
        ];
        assert!(detect_conflicts(&agreements[..2]).is_empty());
        assert!(detect_conflicts(&[agreements[0].clone(), agreements[2].clone()]).is_empty());
    }

    #[test]
    fn non_exclusive_and_conditional_pairs_are_not_flagged() {
        let agreements = vec![
            scoped(
                "a",
                &["Germany"],
                &["MRI Systems"],
                ExclusivityStatus::NonExclusive,
            ),
            scoped(
                "b",
                &["Germany"],
                &["MRI Systems"],
                ExclusivityStatus::ConditionalExclusive,
            ),
        ];
        assert!(detect_conflicts(&agreements).is_empty());
    }

    #[test]
    fn conflicts_follow_pair_generation_order() {
        let agreements = vec![
            scoped("a", &["Germany"], &["MRI Systems"], ExclusivityStatus::Exclusive),
            scoped("b", &["Germany"], &["MRI Systems"], ExclusivityStatus::NonExclusive),
            scoped("c", &["Germany"], &["MRI Systems"], ExclusivityStatus::Exclusive),
        ];
        let conflicts = detect_conflicts(&agreements);
        let ids: Vec<_> = conflicts.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a::b", "a::c", "b::c"]);
        assert_eq!(conflicts[1].severity, ConflictSeverity::High);
    }

    #[test]
    fn detect_conflicts_does_not_mutate_inputs() {
        let agreements = vec![
            scoped("a", &["Germany"], &["MRI Systems"], ExclusivityStatus::Exclusive),
            scoped("b", &["Germany"], &["MRI Systems"], ExclusivityStatus::NonExclusive),
        ];
        let before = agreements.clone();
        let _ = detect_conflicts(&agreements);
        assert_eq!(agreements, before);
    }
}
