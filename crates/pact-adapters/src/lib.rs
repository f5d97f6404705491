//! Field normalization for raw agreement payloads + the agreement source boundary.
//!
//! Upstream records arrive in several shapes at once: flat fields vs. a
//! custom-field map, arrays vs. delimited strings vs. JSON-encoded strings,
//! numbers vs. numeric strings. The normalizer reconciles all of them into
//! one `CanonicalAgreement` and never fails; a field that cannot be parsed
//! gets its documented default instead.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Months, NaiveDate, Utc};
use pact_core::{
    non_renewal_deadline, AnnualMinimum, CanonicalAgreement, ExclusivityStatus, RenewalUrgency,
    RiskTier,
};
use pact_storage::{AccessCredential, FetchError, FetchedJson, HttpFetcher};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

pub const CRATE_NAME: &str = "pact-adapters";

/// Notice periods outside [0, 36500] days are treated as unparseable and
/// take the 90-day default, like any other garbage numeric input.
const MAX_NOTICE_DAYS: i64 = 36_500;

/// Term lengths cap at a century; longer claims are clearly data entry noise.
const MAX_TERM_YEARS: u32 = 100;

/// One candidate location for a canonical field. Custom-field entries take
/// priority over top-level keys, which take priority over synonym keys;
/// chains below are evaluated left to right and the first non-empty
/// candidate wins.
#[derive(Debug, Clone, Copy)]
pub enum FieldKey {
    /// Entry in the record's custom-field map (`customFields`, either an
    /// object or an array of `{name, value}` pairs).
    Custom(&'static str),
    /// Top-level key on the raw record.
    Top(&'static str),
}

fn custom_field<'a>(raw: &'a JsonValue, name: &str) -> Option<&'a JsonValue> {
    let fields = raw.get("customFields")?;
    match fields {
        JsonValue::Object(map) => map.get(name),
        JsonValue::Array(entries) => entries.iter().find_map(|entry| {
            let entry_name = entry.get("name")?.as_str()?;
            if entry_name == name {
                entry.get("value")
            } else {
                None
            }
        }),
        _ => None,
    }
}

fn is_empty_candidate(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.trim().is_empty(),
        JsonValue::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Resolve a field from its ordered candidate chain.
pub fn resolve<'a>(raw: &'a JsonValue, keys: &[FieldKey]) -> Option<&'a JsonValue> {
    keys.iter()
        .filter_map(|key| match key {
            FieldKey::Custom(name) => custom_field(raw, name),
            FieldKey::Top(name) => raw.get(*name),
        })
        .find(|candidate| !is_empty_candidate(candidate))
}

fn as_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Numeric parse with the null case kept distinct from zero: empty string,
/// null, and non-numeric text all yield `None`.
pub fn parse_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Multi-value text field parse. Arrays pass through; strings first try a
/// JSON-array decode and on failure split on `,`/`;`/`|`; anything else is
/// an empty sequence.
pub fn parse_string_list(value: &JsonValue) -> Vec<String> {
    match value {
        JsonValue::Array(items) => items.iter().filter_map(as_text).collect(),
        JsonValue::String(s) => {
            if let Ok(JsonValue::Array(items)) = serde_json::from_str::<JsonValue>(s) {
                return items.iter().filter_map(as_text).collect();
            }
            s.split([',', ';', '|'])
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string)
                .collect()
        }
        _ => Vec::new(),
    }
}

/// Annual-minimum parse. Accepted only as a sequence or a JSON-encoded
/// string decoding to a sequence; there is no delimiter fallback here,
/// unlike the text multi-value fields.
pub fn parse_annual_minimums(value: &JsonValue) -> Vec<AnnualMinimum> {
    let items = match value {
        JsonValue::Array(items) => items.clone(),
        JsonValue::String(s) => match serde_json::from_str::<JsonValue>(s) {
            Ok(JsonValue::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    items
        .iter()
        .filter_map(|entry| {
            let year = entry.get("year").and_then(parse_number)? as i32;
            let amount = entry.get("amount").and_then(parse_number)?;
            Some(AnnualMinimum { year, amount })
        })
        .collect()
}

/// Calendar-date parse: `%Y-%m-%d`, or an RFC 3339 timestamp whose date
/// part is taken.
pub fn parse_date(value: &JsonValue) -> Option<NaiveDate> {
    let text = as_text(value)?;
    if let Ok(date) = NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(&text)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Leading integer of a free-text term length ("3 years" -> 3), capped at
/// `MAX_TERM_YEARS`. Unparseable text defaults to a single year.
fn term_length_years(term: &str) -> u32 {
    let digits: String = term
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits
        .parse::<u32>()
        .ok()
        .filter(|y| *y > 0)
        .unwrap_or(1)
        .min(MAX_TERM_YEARS)
}

fn resolve_text(raw: &JsonValue, keys: &[FieldKey]) -> Option<String> {
    resolve(raw, keys).and_then(as_text)
}

fn resolve_number(raw: &JsonValue, keys: &[FieldKey]) -> Option<f64> {
    resolve(raw, keys).and_then(parse_number)
}

fn resolve_date(raw: &JsonValue, keys: &[FieldKey]) -> Option<NaiveDate> {
    resolve(raw, keys).and_then(parse_date)
}

fn resolve_list(raw: &JsonValue, keys: &[FieldKey]) -> Vec<String> {
    resolve(raw, keys).map(parse_string_list).unwrap_or_default()
}

/// Reconcile one raw agreement payload into the canonical schema.
///
/// Total over any JSON input. `now` feeds the expiration-date fallback and
/// the deterministic seeds of the derived fields; the derived-field pass in
/// the pipeline recomputes those seeds.
pub fn normalize(raw: &JsonValue, now: DateTime<Utc>) -> CanonicalAgreement {
    use FieldKey::{Custom, Top};

    let source_id =
        resolve_text(raw, &[Top("id"), Top("agreementId")]).unwrap_or_default();
    let id = if source_id.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        source_id.clone()
    };
    let source_url =
        resolve_text(raw, &[Top("uri"), Top("url"), Top("sourceUrl")]).unwrap_or_default();

    let distributor_name = resolve_text(
        raw,
        &[
            Custom("distributorName"),
            Top("distributorName"),
            Top("title"),
        ],
    )
    .unwrap_or_default();
    let business_line = resolve_text(
        raw,
        &[
            Custom("businessLine"),
            Top("businessLine"),
            Top("productFamily"),
        ],
    )
    .unwrap_or_default();
    let initial_term_length = resolve_text(
        raw,
        &[
            Custom("initialTermLength"),
            Top("initialTermLength"),
            Top("termLength"),
        ],
    )
    .unwrap_or_default();
    let status = resolve_text(raw, &[Top("status"), Top("agreementStatus")])
        .unwrap_or_else(|| "Active".to_string());

    let execution_date = resolve_date(
        raw,
        &[Custom("executionDate"), Top("executionDate"), Top("signedDate")],
    );
    let effective_date = resolve_date(
        raw,
        &[Custom("effectiveDate"), Top("effectiveDate"), Top("startDate")],
    );
    let sourced_expiration = resolve_date(
        raw,
        &[Custom("expirationDate"), Top("expirationDate"), Top("endDate")],
    );

    // Fallback policy when the source carries no expiration: effective date
    // plus the parsed term length when both exist, otherwise one year from
    // now. Either way the date is an estimate, not a sourced fact.
    let (expiration_date, expiration_is_estimated) = match sourced_expiration {
        Some(date) => (date, false),
        None => match effective_date {
            Some(effective) if !initial_term_length.is_empty() => {
                let years = term_length_years(&initial_term_length);
                let estimated = effective
                    .checked_add_months(Months::new(12 * years))
                    .unwrap_or_else(|| now.date_naive() + Months::new(12));
                (estimated, true)
            }
            _ => (now.date_naive() + Months::new(12), true),
        },
    };

    let territories = resolve_list(
        raw,
        &[
            Custom("territories"),
            Custom("territory"),
            Top("territories"),
            Top("territory"),
        ],
    );
    let product_categories = resolve_list(
        raw,
        &[
            Custom("productCategories"),
            Custom("products"),
            Top("productCategories"),
            Top("products"),
        ],
    );

    let exclusivity_status = resolve_text(
        raw,
        &[
            Custom("exclusivityStatus"),
            Top("exclusivityStatus"),
            Top("exclusivity"),
        ],
    )
    .map(|label| ExclusivityStatus::from_label(&label))
    .unwrap_or_default();
    let performance_based_exclusivity = resolve_text(
        raw,
        &[
            Custom("performanceBasedExclusivity"),
            Top("performanceBasedExclusivity"),
        ],
    )
    .unwrap_or_else(|| "false".to_string());
    let customer_segment_restrictions = resolve_text(
        raw,
        &[
            Custom("customerSegmentRestrictions"),
            Top("customerSegmentRestrictions"),
        ],
    )
    .unwrap_or_default();

    let currency = resolve_text(raw, &[Custom("currency"), Top("currency")])
        .unwrap_or_else(|| "USD".to_string());
    let standard_discount_percent = resolve_number(
        raw,
        &[Custom("standardDiscountPercent"), Top("standardDiscountPercent")],
    );
    let volume_discount_percent = resolve_number(
        raw,
        &[Custom("volumeDiscountPercent"), Top("volumeDiscountPercent")],
    );
    let promotional_discount_percent = resolve_number(
        raw,
        &[
            Custom("promotionalDiscountPercent"),
            Top("promotionalDiscountPercent"),
        ],
    );
    let service_discount_percent = resolve_number(
        raw,
        &[Custom("serviceDiscountPercent"), Top("serviceDiscountPercent")],
    );
    let software_revenue_share = resolve_number(
        raw,
        &[Custom("softwareRevenueShare"), Top("softwareRevenueShare")],
    );
    let price_cap_increase_percent = resolve_number(
        raw,
        &[Custom("priceCapIncreasePercent"), Top("priceCapIncreasePercent")],
    );
    let annual_minimums = resolve(raw, &[Custom("annualMinimums"), Top("annualMinimums")])
        .map(parse_annual_minimums)
        .unwrap_or_default();

    let minimum_performance_threshold = resolve_number(
        raw,
        &[
            Custom("minimumPerformanceThreshold"),
            Top("minimumPerformanceThreshold"),
        ],
    )
    .unwrap_or(85.0);
    let current_performance = resolve_number(
        raw,
        &[Custom("currentPerformance"), Top("currentPerformance")],
    )
    .unwrap_or(0.0);

    let non_renewal_notice_days = resolve_number(
        raw,
        &[
            Custom("nonRenewalNoticeDays"),
            Top("nonRenewalNoticeDays"),
            Top("noticePeriodDays"),
        ],
    )
    .map(|n| n as i64)
    .filter(|n| (0..=MAX_NOTICE_DAYS).contains(n))
    .unwrap_or(90);

    CanonicalAgreement {
        id,
        source_id,
        source_url,
        execution_date,
        effective_date,
        expiration_date,
        expiration_is_estimated,
        distributor_name,
        business_line,
        initial_term_length,
        status,
        territories,
        product_categories,
        exclusivity_status,
        performance_based_exclusivity,
        customer_segment_restrictions,
        currency,
        standard_discount_percent,
        volume_discount_percent,
        promotional_discount_percent,
        service_discount_percent,
        software_revenue_share,
        price_cap_increase_percent,
        annual_minimums,
        minimum_performance_threshold,
        current_performance,
        non_renewal_notice_days,
        // Deterministic seeds so no derived field is ever unset; the
        // derived-field pass recomputes all of them.
        non_renewal_deadline: non_renewal_deadline(expiration_date, non_renewal_notice_days),
        days_until_expiration: 0,
        days_until_deadline: 0,
        renewal_urgency: RenewalUrgency::OnTrack,
        current_year_commitment: 0.0,
        risk_tier: RiskTier::Low,
        synced_at: now,
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Per-record detail fetch failure. Recovered locally: the coarse list
    /// record is kept and the sync continues.
    #[error("detail fetch failed for agreement {agreement_id}: {message}")]
    DetailFetch { agreement_id: String, message: String },
    #[error("{0}")]
    Message(String),
}

/// Boundary to the upstream agreement platform. The pipeline only cares
/// whether the fetch succeeded; raw payload shape is the normalizer's job.
#[async_trait]
pub trait AgreementSource: Send + Sync {
    async fn fetch_agreements(
        &self,
        credential: &AccessCredential,
    ) -> Result<Vec<JsonValue>, SourceError>;
}

/// Inter-request delay for sequential per-record detail fetches, injected
/// so tests can run with zero delay.
#[derive(Debug, Clone, Copy)]
pub struct PacingPolicy {
    pub delay: Duration,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(400),
        }
    }
}

impl PacingPolicy {
    pub fn zero() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }
}

/// Transport seam for the Navigator API. `HttpFetcher` satisfies it in
/// production; tests script responses against it.
#[async_trait]
pub trait JsonGateway: Send + Sync {
    async fn get_json(&self, url: &str, bearer_token: &str) -> Result<FetchedJson, FetchError>;
}

#[async_trait]
impl JsonGateway for HttpFetcher {
    async fn get_json(&self, url: &str, bearer_token: &str) -> Result<FetchedJson, FetchError> {
        self.fetch_json(url, bearer_token).await
    }
}

/// Live source talking to the platform's Navigator API with bearer auth.
///
/// Lists agreements first, then fetches details strictly sequentially (with
/// the pacing delay between requests) for records whose list payload lacks
/// the custom-field map. A failed detail fetch keeps the coarse record.
pub struct NavigatorSource {
    base_url: String,
    http: Box<dyn JsonGateway>,
    pacing: PacingPolicy,
}

impl NavigatorSource {
    pub fn new(
        base_url: impl Into<String>,
        http: impl JsonGateway + 'static,
        pacing: PacingPolicy,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: Box::new(http),
            pacing,
        }
    }

    fn extract_records(body: JsonValue) -> Vec<JsonValue> {
        match body {
            JsonValue::Array(items) => items,
            JsonValue::Object(mut map) => {
                for key in ["agreements", "data", "items"] {
                    if let Some(JsonValue::Array(items)) = map.remove(key) {
                        return items;
                    }
                }
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn needs_detail(record: &JsonValue) -> bool {
        record.get("customFields").is_none()
    }
}

#[async_trait]
impl AgreementSource for NavigatorSource {
    async fn fetch_agreements(
        &self,
        credential: &AccessCredential,
    ) -> Result<Vec<JsonValue>, SourceError> {
        let list_url = format!("{}/agreements", self.base_url);
        let listed = self
            .http
            .get_json(&list_url, &credential.access_token)
            .await?;
        let mut records = Self::extract_records(listed.body);

        for record in records.iter_mut() {
            if !Self::needs_detail(record) {
                continue;
            }
            let Some(id) = record.get("id").and_then(|v| v.as_str()).map(str::to_string)
            else {
                continue;
            };

            tokio::time::sleep(self.pacing.delay).await;
            let detail_url = format!("{}/agreements/{}", self.base_url, id);
            match self.http.get_json(&detail_url, &credential.access_token).await {
                Ok(detail) if detail.body.is_object() => {
                    *record = detail.body;
                }
                Ok(detail) => {
                    warn!(agreement_id = %id, status = %detail.status, "detail fetch returned non-object body; keeping coarse record");
                }
                Err(err) => {
                    let recovered = SourceError::DetailFetch {
                        agreement_id: id.clone(),
                        message: err.to_string(),
                    };
                    warn!(error = %recovered, "keeping coarse record");
                }
            }
        }

        Ok(records)
    }
}

/// Fixed-payload source for tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    records: Vec<JsonValue>,
    fail_with: Option<String>,
}

impl StaticSource {
    pub fn new(records: Vec<JsonValue>) -> Self {
        Self {
            records,
            fail_with: None,
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            records: Vec::new(),
            fail_with: Some(message.into()),
        }
    }
}

#[async_trait]
impl AgreementSource for StaticSource {
    async fn fetch_agreements(
        &self,
        _credential: &AccessCredential,
    ) -> Result<Vec<JsonValue>, SourceError> {
        if let Some(message) = &self.fail_with {
            return Err(SourceError::Message(message.clone()));
        }
        Ok(self.records.clone())
    }
}

/// Fixed five-record demo dataset used when the live fetch fails, so the
/// pipeline stays exercisable offline. The records deliberately cover every
/// raw shape variant the normalizer handles.
pub fn demo_agreements() -> Vec<JsonValue> {
    vec![
        // Flat record, proper arrays and numbers.
        serde_json::json!({
            "id": "nav-1001",
            "uri": "https://navigator.example.test/agreements/nav-1001",
            "distributorName": "MedEquip GmbH",
            "businessLine": "Diagnostic Imaging",
            "executionDate": "2024-02-20",
            "effectiveDate": "2024-03-01",
            "expirationDate": "2026-02-28",
            "initialTermLength": "2 years",
            "status": "Active",
            "territories": ["Germany", "Austria"],
            "productCategories": ["MRI Systems", "CT Scanners"],
            "exclusivityStatus": "Exclusive",
            "currency": "EUR",
            "standardDiscountPercent": 12.5,
            "volumeDiscountPercent": 3.0,
            "minimumPerformanceThreshold": 85,
            "currentPerformance": 92,
            "nonRenewalNoticeDays": 120,
            "annualMinimums": [
                {"year": 2024, "amount": 1_500_000.0},
                {"year": 2025, "amount": 1_750_000.0}
            ]
        }),
        // Synonym keys, delimiter-joined strings, string-encoded numbers.
        serde_json::json!({
            "id": "nav-1002",
            "url": "https://navigator.example.test/agreements/nav-1002",
            "distributorName": "Alpine Diagnostics AG",
            "businessLine": "Diagnostic Imaging",
            "effectiveDate": "2024-06-15",
            "expirationDate": "2025-12-31",
            "territory": "Germany, Switzerland",
            "products": "MRI Systems; Ultrasound",
            "exclusivity": "Non-Exclusive",
            "minimumPerformanceThreshold": "85",
            "currentPerformance": "88",
            "standardDiscountPercent": "10"
        }),
        // Custom-field map (object form) with JSON-encoded string arrays.
        serde_json::json!({
            "agreementId": "nav-1003",
            "uri": "https://navigator.example.test/agreements/nav-1003",
            "title": "Iberia Medical SL Distribution Agreement",
            "effectiveDate": "2025-01-01",
            "expirationDate": "2027-01-01",
            "customFields": {
                "distributorName": "Iberia Medical SL",
                "territories": "[\"Spain\",\"Portugal\"]",
                "productCategories": "[\"Ultrasound\"]",
                "exclusivityStatus": "Exclusive",
                "annualMinimums": "[{\"year\":2025,\"amount\":600000}]",
                "currentPerformance": 79,
                "minimumPerformanceThreshold": 85
            }
        }),
        // Custom fields as a {name, value} array; no expiration date, so
        // the effective-date + term-length fallback kicks in.
        serde_json::json!({
            "id": "nav-1004",
            "uri": "https://navigator.example.test/agreements/nav-1004",
            "effectiveDate": "2024-09-01",
            "initialTermLength": "3 years",
            "customFields": [
                {"name": "distributorName", "value": "Nordic Care AB"},
                {"name": "territories", "value": "Sweden|Norway|Denmark"},
                {"name": "productCategories", "value": ["Patient Monitors"]},
                {"name": "exclusivityStatus", "value": "Conditional Exclusive"},
                {"name": "currentPerformance", "value": "83"},
                {"name": "performanceBasedExclusivity", "value": "true"}
            ]
        }),
        // Second exclusive record overlapping nav-1001 on Austria / CT Scanners.
        serde_json::json!({
            "id": "nav-1005",
            "uri": "https://navigator.example.test/agreements/nav-1005",
            "distributorName": "Danube Health Kft",
            "businessLine": "Diagnostic Imaging",
            "effectiveDate": "2025-02-01",
            "expirationDate": "2026-01-31",
            "territories": ["Austria", "Hungary"],
            "productCategories": ["CT Scanners"],
            "exclusivityStatus": "Exclusive",
            "nonRenewalNoticeDays": "60",
            "currentPerformance": 81,
            "annualMinimums": [{"year": 2025, "amount": 450_000.0}]
        }),
    ]
}
