//! Sequential fetch-normalize pipeline shared by every upstream tool.
//!
//! A [`PageFetcher`] issues one request per call and reports whether the
//! upstream handed out a [`ContinuationToken`]. [`fetch_all`] follows tokens
//! one at a time, honouring the source's activation delay, and normalizes
//! each raw item into a [`Record`]. Items that fail normalization are
//! skipped; transport failures abort the whole fetch.

use std::cmp::Ordering;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::error::{MalformedItem, Result};
use crate::model::{Query, Record};

/// Default upper bound on the number of pages a single fetch may request.
pub const DEFAULT_MAX_PAGES: usize = 10;

/// Opaque pagination cursor. Passed back verbatim on the follow-up request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One upstream response: raw items in response order plus an optional
/// cursor for the next page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<ContinuationToken>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }

    pub fn empty() -> Self {
        Self::last(Vec::new())
    }

    /// Builds a page, treating a blank token as "no more pages".
    pub fn with_token(items: Vec<T>, token: Option<String>) -> Self {
        let next = token
            .filter(|token| !token.trim().is_empty())
            .map(ContinuationToken::new);
        Self { items, next }
    }
}

/// Capability over a single page request against a remote API.
pub trait PageFetcher {
    type Item;

    /// Fetches the first page when `token` is `None`, otherwise the page the
    /// token points at.
    fn fetch_page(&mut self, query: &Query, token: Option<&ContinuationToken>)
    -> Result<Page<Self::Item>>;

    /// Minimum wait before a freshly issued token is accepted upstream.
    fn continuation_delay(&self) -> Duration {
        Duration::ZERO
    }
}

/// Bounds applied to a single [`fetch_all`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    max_pages: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl Pagination {
    /// A cap of zero is raised to one; every fetch issues at least one
    /// request.
    pub fn with_max_pages(max_pages: usize) -> Self {
        Self {
            max_pages: max_pages.max(1),
        }
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }
}

/// Fetches every page for `query`, normalizing items in order.
///
/// Returns an empty vector when the upstream reports no results. Upstream
/// failures are returned as-is and nothing gathered so far is kept. When the
/// page cap is reached while a token is still outstanding, the records
/// gathered so far are returned.
#[instrument(level = "info", skip_all, fields(subject = %query.subject, max_pages = pagination.max_pages))]
pub fn fetch_all<F, N>(
    query: &Query,
    fetcher: &mut F,
    normalizer: N,
    pagination: Pagination,
) -> Result<Vec<Record>>
where
    F: PageFetcher,
    N: Fn(&F::Item) -> std::result::Result<Record, MalformedItem>,
{
    let mut records: Vec<Record> = Vec::new();
    let mut token: Option<ContinuationToken> = None;
    let mut skipped = 0usize;
    let mut page_number = 0usize;

    loop {
        if page_number == pagination.max_pages {
            warn!(
                page_limit = pagination.max_pages,
                record_count = records.len(),
                "page limit reached with a continuation token outstanding; stopping"
            );
            break;
        }
        if token.is_some() {
            let delay = fetcher.continuation_delay();
            if !delay.is_zero() {
                debug!(delay_ms = delay.as_millis() as u64, "waiting for token activation");
                thread::sleep(delay);
            }
        }

        let page = fetcher.fetch_page(query, token.as_ref())?;
        page_number += 1;
        debug!(
            page = page_number,
            item_count = page.items.len(),
            has_next = page.next.is_some(),
            "page fetched"
        );

        for (index, item) in page.items.iter().enumerate() {
            match normalizer(item) {
                Ok(record) => match records.first() {
                    Some(first) if !first.same_schema(&record) => {
                        skipped += 1;
                        warn!(page = page_number, index, "record schema differs from first record; skipping");
                    }
                    _ => records.push(record),
                },
                Err(error) => {
                    skipped += 1;
                    warn!(page = page_number, index, %error, "skipping item");
                }
            }
        }

        token = page.next;
        if token.is_none() {
            break;
        }
    }

    info!(
        pages = page_number,
        record_count = records.len(),
        skipped,
        "fetch complete"
    );
    Ok(records)
}

/// Stable sort by the given numeric fields, descending. Null, missing, and
/// non-numeric values rank below every number.
pub fn rank(records: &mut [Record], keys: &[&str]) {
    records.sort_by(|lhs, rhs| {
        keys.iter()
            .map(|key| compare_descending(lhs.number(key), rhs.number(key)))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

fn compare_descending(lhs: Option<f64>, rhs: Option<f64>) -> Ordering {
    match (lhs, rhs) {
        (Some(lhs), Some(rhs)) => rhs.total_cmp(&lhs),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::model::ScalarValue;
    use serde_json::{Value, json};

    /// Serves canned pages and records every token it was asked for.
    struct ScriptedFetcher {
        pages: Vec<Result<Page<Value>>>,
        requests: Vec<Option<String>>,
    }

    impl ScriptedFetcher {
        fn new(pages: Vec<Result<Page<Value>>>) -> Self {
            Self {
                pages,
                requests: Vec::new(),
            }
        }
    }

    impl PageFetcher for ScriptedFetcher {
        type Item = Value;

        fn fetch_page(
            &mut self,
            _query: &Query,
            token: Option<&ContinuationToken>,
        ) -> Result<Page<Value>> {
            self.requests.push(token.map(|token| token.as_str().to_string()));
            if self.pages.is_empty() {
                return Ok(Page::empty());
            }
            self.pages.remove(0)
        }
    }

    fn normalize(item: &Value) -> std::result::Result<Record, MalformedItem> {
        let name = item
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| MalformedItem::new("missing name"))?;
        Ok(Record::new()
            .with("name", name)
            .with("rating", item.get("rating").and_then(Value::as_f64)))
    }

    fn query() -> Query {
        Query::new("grocery store", "Springfield, MA")
    }

    fn names(records: &[Record]) -> Vec<String> {
        records
            .iter()
            .map(|record| record.get("name").map(ScalarValue::display).unwrap_or_default())
            .collect()
    }

    #[test]
    fn empty_response_yields_empty_sequence() {
        let mut fetcher = ScriptedFetcher::new(vec![Ok(Page::empty())]);
        let records = fetch_all(&query(), &mut fetcher, normalize, Pagination::default())
            .expect("empty fetch succeeds");

        assert!(records.is_empty());
        assert_eq!(fetcher.requests, vec![None]);
    }

    #[test]
    fn follows_each_token_exactly_once_in_order() {
        let mut fetcher = ScriptedFetcher::new(vec![
            Ok(Page::with_token(
                vec![json!({"name": "a"}), json!({"name": "b"})],
                Some("t1".into()),
            )),
            Ok(Page::with_token(vec![json!({"name": "c"})], Some("t2".into()))),
            Ok(Page::last(vec![json!({"name": "d"})])),
        ]);

        let records = fetch_all(&query(), &mut fetcher, normalize, Pagination::default())
            .expect("paginated fetch succeeds");

        assert_eq!(names(&records), ["a", "b", "c", "d"]);
        assert_eq!(
            fetcher.requests,
            vec![None, Some("t1".to_string()), Some("t2".to_string())]
        );
    }

    #[test]
    fn blank_token_ends_pagination() {
        let mut fetcher = ScriptedFetcher::new(vec![Ok(Page::with_token(
            vec![json!({"name": "a"})],
            Some("  ".into()),
        ))]);

        let records = fetch_all(&query(), &mut fetcher, normalize, Pagination::default())
            .expect("fetch succeeds");

        assert_eq!(records.len(), 1);
        assert_eq!(fetcher.requests.len(), 1);
    }

    #[test]
    fn malformed_items_are_skipped() {
        let mut fetcher = ScriptedFetcher::new(vec![Ok(Page::last(vec![
            json!({"name": "a"}),
            json!({"rating": 4.0}),
            json!("not an object"),
            json!({"name": "b", "rating": 3.5}),
        ]))]);

        let records = fetch_all(&query(), &mut fetcher, normalize, Pagination::default())
            .expect("fetch succeeds");

        assert_eq!(names(&records), ["a", "b"]);
    }

    #[test]
    fn records_with_a_different_schema_are_skipped() {
        let mut fetcher = ScriptedFetcher::new(vec![Ok(Page::last(vec![
            json!({"name": "a"}),
            json!({"name": "odd", "extra": true}),
            json!({"name": "b"}),
        ]))]);
        let normalizer = |item: &Value| -> std::result::Result<Record, MalformedItem> {
            let mut record = normalize(item)?;
            if item.get("extra").is_some() {
                record.insert("extra", true);
            }
            Ok(record)
        };

        let records = fetch_all(&query(), &mut fetcher, normalizer, Pagination::default())
            .expect("fetch succeeds");

        assert_eq!(names(&records), ["a", "b"]);
    }

    #[test]
    fn upstream_failure_surfaces_even_after_earlier_pages() {
        let mut fetcher = ScriptedFetcher::new(vec![
            Ok(Page::with_token(vec![json!({"name": "a"})], Some("t1".into()))),
            Err(ToolError::upstream("places", "HTTP 500")),
        ]);

        let error = fetch_all(&query(), &mut fetcher, normalize, Pagination::default())
            .expect_err("second page fails");

        assert!(matches!(error, ToolError::UpstreamUnavailable { .. }));
    }

    #[test]
    fn page_cap_stops_a_runaway_upstream() {
        let pages = (0..5)
            .map(|index| {
                Ok(Page::with_token(
                    vec![json!({"name": format!("p{index}")})],
                    Some(format!("t{index}")),
                ))
            })
            .collect();
        let mut fetcher = ScriptedFetcher::new(pages);

        let records = fetch_all(&query(), &mut fetcher, normalize, Pagination::with_max_pages(3))
            .expect("capped fetch succeeds");

        assert_eq!(names(&records), ["p0", "p1", "p2"]);
        assert_eq!(fetcher.requests.len(), 3);
    }

    #[test]
    fn zero_page_cap_still_fetches_first_page() {
        let pagination = Pagination::with_max_pages(0);
        assert_eq!(pagination.max_pages(), 1);

        let mut fetcher = ScriptedFetcher::new(vec![Ok(Page::with_token(
            vec![json!({"name": "a"})],
            Some("t1".into()),
        ))]);
        let records = fetch_all(&query(), &mut fetcher, normalize, pagination)
            .expect("capped fetch succeeds");

        assert_eq!(names(&records), ["a"]);
        assert_eq!(fetcher.requests, vec![None]);
    }

    #[test]
    fn waits_for_token_activation_between_pages() {
        struct Delayed(ScriptedFetcher);

        impl PageFetcher for Delayed {
            type Item = Value;

            fn fetch_page(
                &mut self,
                query: &Query,
                token: Option<&ContinuationToken>,
            ) -> Result<Page<Value>> {
                self.0.fetch_page(query, token)
            }

            fn continuation_delay(&self) -> Duration {
                Duration::from_millis(20)
            }
        }

        let mut fetcher = Delayed(ScriptedFetcher::new(vec![
            Ok(Page::with_token(vec![json!({"name": "a"})], Some("t1".into()))),
            Ok(Page::last(vec![json!({"name": "b"})])),
        ]));

        let started = std::time::Instant::now();
        let records = fetch_all(&query(), &mut fetcher, normalize, Pagination::default())
            .expect("fetch succeeds");

        assert_eq!(records.len(), 2);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn rank_sorts_descending_with_missing_values_last() {
        let mut records = vec![
            Record::new().with("name", "none").with("rating", ScalarValue::Null),
            Record::new().with("name", "low").with("rating", 3.0),
            Record::new().with("name", "text").with("rating", "N/A"),
            Record::new().with("name", "high").with("rating", 4.8),
        ];

        rank(&mut records, &["rating"]);

        assert_eq!(names(&records), ["high", "low", "none", "text"]);
    }

    #[test]
    fn rank_is_stable_and_uses_secondary_keys() {
        let mut records = vec![
            Record::new().with("name", "a").with("rating", 4.0).with("count", 10.0),
            Record::new().with("name", "b").with("rating", 4.0).with("count", 50.0),
            Record::new().with("name", "c").with("rating", 4.0).with("count", 10.0),
            Record::new().with("name", "d").with("rating", 5.0).with("count", 1.0),
        ];

        rank(&mut records, &["rating", "count"]);

        assert_eq!(names(&records), ["d", "b", "a", "c"]);
    }
}
