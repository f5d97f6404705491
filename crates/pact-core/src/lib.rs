//! Core domain model for PACT: canonical agreements, conflicts, and the clock seam.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "pact-core";

/// Exclusivity grant carried by an agreement, as labeled by the upstream platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExclusivityStatus {
    Exclusive,
    #[serde(rename = "Conditional Exclusive")]
    ConditionalExclusive,
    #[default]
    #[serde(rename = "Non-Exclusive")]
    NonExclusive,
}

impl ExclusivityStatus {
    /// Parse an upstream label. Anything unrecognized is Non-Exclusive,
    /// the weakest claim.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "exclusive" => Self::Exclusive,
            "conditional exclusive" | "conditional-exclusive" | "conditional" => {
                Self::ConditionalExclusive
            }
            _ => Self::NonExclusive,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Exclusive => "Exclusive",
            Self::ConditionalExclusive => "Conditional Exclusive",
            Self::NonExclusive => "Non-Exclusive",
        }
    }
}

/// How close an agreement is to its non-renewal notice deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RenewalUrgency {
    Urgent,
    Warning,
    #[default]
    OnTrack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum RiskTier {
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictSeverity {
    High,
    Medium,
}

/// One committed minimum purchase volume for a calendar year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualMinimum {
    pub year: i32,
    pub amount: f64,
}

/// Canonical, fully reconciled agreement record.
///
/// Produced by the normalizer and finished by the derived-field pass; after
/// that pass every derived field holds a real value (no "not computed yet"
/// state survives the pipeline). Serializes camelCase because the persisted
/// cache is read by a JavaScript UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalAgreement {
    pub id: String,
    pub source_id: String,
    pub source_url: String,

    pub execution_date: Option<NaiveDate>,
    pub effective_date: Option<NaiveDate>,
    pub expiration_date: NaiveDate,
    /// True when `expiration_date` came from the fallback estimate rather
    /// than the source record. Fallback dates are lower-confidence.
    pub expiration_is_estimated: bool,

    pub distributor_name: String,
    pub business_line: String,
    pub initial_term_length: String,
    pub status: String,

    pub territories: Vec<String>,
    pub product_categories: Vec<String>,

    pub exclusivity_status: ExclusivityStatus,
    pub performance_based_exclusivity: String,
    pub customer_segment_restrictions: String,

    pub currency: String,
    pub standard_discount_percent: Option<f64>,
    pub volume_discount_percent: Option<f64>,
    pub promotional_discount_percent: Option<f64>,
    pub service_discount_percent: Option<f64>,
    pub software_revenue_share: Option<f64>,
    pub price_cap_increase_percent: Option<f64>,
    pub annual_minimums: Vec<AnnualMinimum>,

    pub minimum_performance_threshold: f64,
    pub current_performance: f64,

    pub non_renewal_notice_days: i64,

    // Derived fields, recomputed on every sync.
    pub non_renewal_deadline: NaiveDate,
    pub days_until_expiration: i64,
    pub days_until_deadline: i64,
    pub renewal_urgency: RenewalUrgency,
    pub current_year_commitment: f64,
    pub risk_tier: RiskTier,
    pub synced_at: DateTime<Utc>,
}

/// A detected exclusivity conflict between two agreements with overlapping
/// territory and product scope. Carries the literal overlapping subsets so
/// downstream consumers can explain the conflict, not just count it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    pub id: String,
    pub agreement_a_id: String,
    pub agreement_a_name: String,
    pub agreement_a_exclusivity: ExclusivityStatus,
    pub agreement_b_id: String,
    pub agreement_b_name: String,
    pub agreement_b_exclusivity: ExclusivityStatus,
    pub severity: ConflictSeverity,
    pub overlapping_territories: Vec<String>,
    pub overlapping_products: Vec<String>,
}

/// Calendar deadline for serving non-renewal notice: `expiration` minus the
/// notice period. Total over the whole `i64` range; notice periods that
/// would land outside the representable calendar saturate at its bounds.
pub fn non_renewal_deadline(expiration: NaiveDate, notice_days: i64) -> NaiveDate {
    chrono::Duration::try_days(notice_days)
        .and_then(|notice| expiration.checked_sub_signed(notice))
        .unwrap_or(if notice_days >= 0 {
            NaiveDate::MIN
        } else {
            NaiveDate::MAX
        })
}

/// Source of "now" for every relative-date computation, injected so derived
/// fields are reproducible in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Frozen clock for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
