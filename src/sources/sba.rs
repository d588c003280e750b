//! SBA loan data: the program rate table, a live loan search with a sample
//! fallback, a synthetic quarterly rate history, and state-code resolution.

use chrono::{Datelike, Duration, NaiveDate};
use reqwest::blocking::Client;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::config::require_key;
use crate::eligibility::LOAN_PROGRAMS;
use crate::error::{MalformedItem, Result, ToolError};
use crate::model::{Dataset, Query, Record, ScalarValue, Summary};
use crate::pipeline::{ContinuationToken, Page, PageFetcher, Pagination, fetch_all};
use crate::sources::places::REQUEST_TIMEOUT;

const SERVICE: &str = "SBA loan API";

pub const RATES_SHEET: &str = "Current Rates";
pub const HISTORY_SHEET: &str = "Historical Rates";
pub const DEFAULT_STATE: &str = "MA";
/// Longest rate history `historical_rates` will produce.
pub const MAX_HISTORY_YEARS: u32 = 50;

pub const RATE_COLUMNS: &[&str] = &[
    "program",
    "max_loan_amount",
    "rate_type",
    "base_rate",
    "typical_spread",
    "guarantee",
    "use_case",
    "last_updated",
];

pub const LOAN_COLUMNS: &[&str] = &[
    "loan_number",
    "borrower_name",
    "borrower_state",
    "approval_date",
    "loan_amount",
    "program",
    "term_months",
    "jobs_supported",
    "business_type",
];

pub const HISTORY_COLUMNS: &[&str] = &[
    "date",
    "quarter",
    "prime_rate",
    "sba_7a_rate",
    "sba_504_rate",
    "treasury_10yr",
];

const SAMPLE_NOTE: &str = "This is sample data. Connect to actual SBA API for real data.";
const HISTORY_NOTE: &str = "Sample historical data. Connect to actual data source for real rates.";

/// Location keywords and the state they resolve to, checked in order.
const STATE_KEYWORDS: &[(&str, &str)] = &[
    ("massachusetts", "MA"),
    ("ma", "MA"),
    ("new york", "NY"),
    ("ny", "NY"),
    ("connecticut", "CT"),
    ("ct", "CT"),
    ("vermont", "VT"),
    ("vt", "VT"),
    ("new hampshire", "NH"),
    ("nh", "NH"),
    ("rhode island", "RI"),
    ("ri", "RI"),
];

/// Resolves a free-text location to a two-letter state code. Short codes
/// only match as whole words; anything unrecognised resolves to `MA`.
pub fn state_code(location: &str) -> &'static str {
    let lower = location.to_lowercase();
    let words: Vec<&str> = lower
        .split(|ch: char| !ch.is_ascii_alphabetic())
        .filter(|word| !word.is_empty())
        .collect();

    STATE_KEYWORDS
        .iter()
        .find(|(keyword, _)| {
            if keyword.len() == 2 {
                words.contains(keyword)
            } else {
                lower.contains(keyword)
            }
        })
        .map(|(_, code)| *code)
        .unwrap_or(DEFAULT_STATE)
}

fn loans_sheet(state: &str) -> String {
    format!("Loans in {state}")
}

/// The program rate table stamped with `today`.
pub fn loan_rates(today: NaiveDate) -> Dataset {
    let last_updated = today.format("%Y-%m-%d").to_string();
    let records = LOAN_PROGRAMS
        .iter()
        .map(|program| {
            Record::new()
                .with("program", program.name)
                .with("max_loan_amount", program.max_loan_amount)
                .with("rate_type", program.rate_type)
                .with("base_rate", program.base_rate)
                .with("typical_spread", program.typical_spread)
                .with("guarantee", program.guarantee)
                .with("use_case", program.use_case)
                .with("last_updated", last_updated.as_str())
        })
        .collect();
    Dataset::new(RATES_SHEET, RATE_COLUMNS, records)
}

/// Quarterly rate points for the last `years` years, oldest first. `years`
/// must lie in `1..=MAX_HISTORY_YEARS`.
pub fn historical_rates(years: u32, today: NaiveDate) -> Result<Dataset> {
    if !(1..=MAX_HISTORY_YEARS).contains(&years) {
        return Err(ToolError::InvalidArgument(format!(
            "years must be between 1 and {MAX_HISTORY_YEARS}, got {years}"
        )));
    }

    let mut records: Vec<Record> = (0..i64::from(years) * 4)
        .map(|i| {
            let date = today.checked_sub_signed(Duration::days(i * 90)).ok_or_else(|| {
                ToolError::InvalidArgument(format!("{years} years before {today} is out of range"))
            })?;
            let step = i as f64;
            Ok(Record::new()
                .with("date", date.format("%Y-%m-%d").to_string())
                .with("quarter", format!("Q{} {}", (date.month() - 1) / 3 + 1, date.year()))
                .with("prime_rate", round2(8.5 - step * 0.05))
                .with("sba_7a_rate", round2(10.75 - step * 0.05))
                .with("sba_504_rate", round2(6.5 - step * 0.03))
                .with("treasury_10yr", round2(4.2 - step * 0.04)))
        })
        .collect::<Result<_>>()?;
    // ISO dates sort chronologically as strings.
    records.sort_by(|lhs, rhs| {
        let key = |record: &Record| record.get("date").map(ScalarValue::display).unwrap_or_default();
        key(lhs).cmp(&key(rhs))
    });

    Ok(Dataset::new(HISTORY_SHEET, HISTORY_COLUMNS, records)
        .with_summary([("note", HISTORY_NOTE)].into_iter().collect()))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Three illustrative loans for `state`, used when live data is unavailable.
pub fn sample_loans(state: &str) -> Vec<Record> {
    [
        ("SBA-2024-001", "Sample Business 1", "2024-01-15", 250_000.0, "7(a)", 120.0, 5.0, "Retail"),
        ("SBA-2024-002", "Sample Business 2", "2024-02-20", 500_000.0, "504", 240.0, 12.0, "Manufacturing"),
        ("SBA-2024-003", "Sample Business 3", "2024-03-10", 35_000.0, "Microloan", 72.0, 2.0, "Service"),
    ]
    .into_iter()
    .map(|(number, borrower, approved, amount, program, term, jobs, kind)| {
        Record::new()
            .with("loan_number", number)
            .with("borrower_name", borrower)
            .with("borrower_state", state)
            .with("approval_date", approved)
            .with("loan_amount", amount)
            .with("program", program)
            .with("term_months", term)
            .with("jobs_supported", jobs)
            .with("business_type", kind)
    })
    .collect()
}

/// Maps one loan object onto the loan columns. Numbers given as strings are
/// kept as text.
pub fn normalize_loan(raw: &Value) -> std::result::Result<Record, MalformedItem> {
    let object = raw
        .as_object()
        .ok_or_else(|| MalformedItem::new("loan entry is not an object"))?;

    Ok(LOAN_COLUMNS
        .iter()
        .fold(Record::new(), |record, column| {
            let value = match object.get(*column) {
                Some(Value::String(text)) => ScalarValue::String(text.clone()),
                Some(Value::Number(number)) => number.as_f64().into(),
                Some(Value::Bool(flag)) => ScalarValue::Boolean(*flag),
                _ => ScalarValue::Null,
            };
            record.with(*column, value)
        }))
}

#[derive(Debug, Clone)]
pub struct SbaClient {
    http: Client,
    api_key: Option<String>,
    base_url: String,
}

impl SbaClient {
    /// The loan source works without a key; one is sent when configured.
    pub fn new(api_key: Option<&str>, base_url: &str) -> Result<Self> {
        let api_key = require_key(api_key, "SBA_API_KEY", "optional").ok();
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT / 3)
            .build()
            .map_err(|error| ToolError::upstream(SERVICE, format!("failed to build client: {error}")))?;

        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Raw loan entries for `state`. Accepts a bare array or an object with a
    /// `results` array.
    pub fn loans(&self, state: &str, limit: u32) -> Result<Vec<Value>> {
        let url = format!("{}/loans", self.base_url);
        let limit = limit.to_string();
        let mut params = vec![("state", state), ("limit", limit.as_str())];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.as_str()));
        }

        let response = self
            .http
            .get(&url)
            .query(&params)
            .send()
            .map_err(|error| ToolError::upstream(SERVICE, format!("request failed: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::upstream(SERVICE, format!("HTTP {status}")));
        }

        let body: Value = response
            .json()
            .map_err(|error| ToolError::upstream(SERVICE, format!("invalid response body: {error}")))?;
        match body {
            Value::Array(items) => Ok(items),
            Value::Object(mut object) => match object.remove("results") {
                Some(Value::Array(items)) => Ok(items),
                _ => Err(ToolError::upstream(SERVICE, "response has no results array")),
            },
            _ => Err(ToolError::upstream(SERVICE, "unexpected response shape")),
        }
    }
}

struct StateLoans<'a> {
    client: &'a SbaClient,
    limit: u32,
}

impl PageFetcher for StateLoans<'_> {
    type Item = Value;

    fn fetch_page(&mut self, query: &Query, _token: Option<&ContinuationToken>) -> Result<Page<Value>> {
        Ok(Page::last(self.client.loans(&query.subject, self.limit)?))
    }
}

pub struct SbaTool {
    client: SbaClient,
}

impl SbaTool {
    pub fn new(client: SbaClient) -> Self {
        Self { client }
    }

    /// Loans approved in `state`. Falls back to sample loans, flagged in the
    /// summary, when the live source is unavailable.
    #[instrument(level = "info", skip(self))]
    pub fn search_loans_by_state(&self, state: &str, limit: u32) -> Result<Dataset> {
        let state = normalize_state(state)?;
        if limit == 0 {
            return Err(ToolError::InvalidArgument("limit must be at least 1".to_string()));
        }

        let query = Query::new(state.as_str(), state.as_str());
        let mut fetcher = StateLoans {
            client: &self.client,
            limit,
        };
        let (records, summary) =
            match fetch_all(&query, &mut fetcher, normalize_loan, Pagination::with_max_pages(1)) {
                Ok(records) => {
                    info!(loan_count = records.len(), "live loan data retrieved");
                    (records, [("source", "live")].into_iter().collect::<Summary>())
                }
                Err(error @ ToolError::UpstreamUnavailable { .. }) => {
                    warn!(%error, "live loan data unavailable; returning sample loans");
                    (
                        sample_loans(&state),
                        [("source", "sample"), ("note", SAMPLE_NOTE)]
                            .into_iter()
                            .collect(),
                    )
                }
                Err(error) => return Err(error),
            };

        Ok(Dataset::new(loans_sheet(&state), LOAN_COLUMNS, records).with_summary(summary))
    }
}

fn normalize_state(state: &str) -> Result<String> {
    let state = state.trim().to_uppercase();
    if state.len() != 2 || !state.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return Err(ToolError::InvalidArgument(format!(
            "state must be a two-letter code, got '{state}'"
        )));
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn state_codes_resolve_names_and_whole_word_codes() {
        assert_eq!(state_code("Springfield, MA"), "MA");
        assert_eq!(state_code("Hartford Connecticut"), "CT");
        assert_eq!(state_code("Burlington, VT"), "VT");
        assert_eq!(state_code("Providence, Rhode Island"), "RI");
        assert_eq!(state_code("Concord NH"), "NH");
        assert_eq!(state_code("Albany New York"), "NY");
        // "ma" inside "Miami" must not count.
        assert_eq!(state_code("Miami Beach"), DEFAULT_STATE);
        assert_eq!(state_code("Chicago, IL"), DEFAULT_STATE);
    }

    #[test]
    fn rate_table_lists_every_program() {
        let dataset = loan_rates(day(2024, 6, 1));
        assert_eq!(dataset.len(), LOAN_PROGRAMS.len());
        assert!(
            dataset
                .records
                .iter()
                .all(|r| r.get("last_updated") == Some(&ScalarValue::from("2024-06-01")))
        );
    }

    #[test]
    fn history_is_quarterly_and_chronological() {
        let dataset = historical_rates(2, day(2024, 6, 1)).expect("history builds");
        assert_eq!(dataset.len(), 8);

        let first = &dataset.records[0];
        let last = &dataset.records[7];
        assert_eq!(last.get("date"), Some(&ScalarValue::from("2024-06-01")));
        assert_eq!(last.get("quarter"), Some(&ScalarValue::from("Q2 2024")));
        assert_eq!(last.number("prime_rate"), Some(8.5));
        assert_eq!(first.number("prime_rate"), Some(8.15));
        assert_eq!(first.number("treasury_10yr"), Some(3.92));
        assert!(dataset.summary.get("note").is_some());
    }

    #[test]
    fn history_rejects_out_of_range_years() {
        for years in [0, MAX_HISTORY_YEARS + 1, 1_000_000] {
            assert!(
                matches!(
                    historical_rates(years, day(2024, 6, 1)),
                    Err(ToolError::InvalidArgument(_))
                ),
                "years {years}"
            );
        }
        assert!(historical_rates(1, NaiveDate::MIN).is_err());
        let longest = historical_rates(MAX_HISTORY_YEARS, day(2024, 6, 1)).expect("longest history");
        assert_eq!(longest.len(), MAX_HISTORY_YEARS as usize * 4);
    }

    #[test]
    fn loans_normalize_onto_fixed_columns() {
        let record = normalize_loan(&json!({
            "loan_number": "L-1",
            "loan_amount": 125000,
            "program": "7(a)",
            "unexpected": "ignored"
        }))
        .expect("loan normalizes");

        assert_eq!(record.field_names().collect::<Vec<_>>(), LOAN_COLUMNS);
        assert_eq!(record.number("loan_amount"), Some(125_000.0));
        assert_eq!(record.get("borrower_name"), Some(&ScalarValue::Null));
        assert!(normalize_loan(&json!([1, 2])).is_err());
    }

    #[test]
    fn sample_loans_carry_the_requested_state() {
        let loans = sample_loans("CT");
        assert_eq!(loans.len(), 3);
        assert!(loans.iter().all(|r| r.get("borrower_state") == Some(&ScalarValue::from("CT"))));
    }

    #[test]
    fn state_argument_is_validated() {
        assert_eq!(normalize_state(" ma ").expect("valid"), "MA");
        assert!(normalize_state("Mass").is_err());
        assert!(normalize_state("M1").is_err());
    }
}
