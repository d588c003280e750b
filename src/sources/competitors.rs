use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument};

use crate::error::{MalformedItem, Result};
use crate::model::{Dataset, Query, Record, ScalarValue, Summary};
use crate::pipeline::{Pagination, fetch_all, rank};
use crate::sources::places::{NearbySearch, PlacesClient};

pub const COMPETITORS_SHEET: &str = "Competitors";

/// Search radius in metres when the query carries none.
pub const DEFAULT_RADIUS: u32 = 25_000;

pub const COMPETITOR_COLUMNS: &[&str] = &[
    "name",
    "address",
    "rating",
    "user_ratings_total",
    "place_id",
    "types",
    "price_level",
    "business_status",
];

/// Competitors are listed best-rated first, then by review volume.
pub const RANK_KEYS: &[&str] = &["rating", "user_ratings_total"];

#[derive(Debug, Deserialize)]
struct NearbyPlace {
    name: Option<String>,
    vicinity: Option<String>,
    rating: Option<f64>,
    user_ratings_total: Option<u64>,
    place_id: Option<String>,
    #[serde(default)]
    types: Vec<String>,
    price_level: Option<u8>,
    business_status: Option<String>,
}

/// Maps one nearby-search result onto the competitor columns. A result
/// without a place identifier is rejected.
pub fn normalize_competitor(raw: &Value) -> std::result::Result<Record, MalformedItem> {
    let place: NearbyPlace = serde_json::from_value(raw.clone())?;
    let place_id = place
        .place_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| MalformedItem::new("result has no place_id"))?;

    Ok(Record::new()
        .with("name", place.name.unwrap_or_default())
        .with("address", place.vicinity.unwrap_or_default())
        .with("rating", place.rating.unwrap_or(0.0))
        .with("user_ratings_total", place.user_ratings_total.unwrap_or(0))
        .with("place_id", place_id)
        .with("types", place.types.join(", "))
        .with(
            "price_level",
            place
                .price_level
                .map(|level| ScalarValue::Number(f64::from(level)))
                .unwrap_or_else(|| ScalarValue::from("N/A")),
        )
        .with(
            "business_status",
            place.business_status.unwrap_or_else(|| "UNKNOWN".to_string()),
        ))
}

/// Market statistics over the competitor set. Empty when there are no
/// competitors.
pub fn market_summary(records: &[Record]) -> Summary {
    if records.is_empty() {
        return Summary::empty();
    }

    let ratings: Vec<f64> = records.iter().filter_map(|r| r.number("rating")).collect();
    let reviews: Vec<f64> = records
        .iter()
        .filter_map(|r| r.number("user_ratings_total"))
        .collect();
    let total_reviews: f64 = reviews.iter().sum();

    [
        ("Total Competitors", ScalarValue::from(records.len())),
        ("Average Rating", ScalarValue::from(mean(&ratings))),
        ("Median Rating", ScalarValue::from(median(&ratings))),
        ("Total Reviews", ScalarValue::from(total_reviews)),
        ("Average Reviews per Business", ScalarValue::from(mean(&reviews))),
    ]
    .into_iter()
    .collect()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

pub struct CompetitorsTool {
    client: PlacesClient,
    pagination: Pagination,
}

impl CompetitorsTool {
    pub fn new(client: PlacesClient, pagination: Pagination) -> Self {
        Self { client, pagination }
    }

    /// Finds businesses matching `query.subject` around `query.location`,
    /// following every results page, ranked best first.
    ///
    /// A location the geocoder cannot resolve yields an empty dataset.
    #[instrument(level = "info", skip(self), fields(subject = %query.subject, location = %query.location))]
    pub fn search(&self, query: &Query) -> Result<Dataset> {
        let records = match self.client.geocode(&query.location)? {
            Some(location) => {
                let mut fetcher = NearbySearch::new(&self.client, location, DEFAULT_RADIUS);
                let mut records = fetch_all(query, &mut fetcher, normalize_competitor, self.pagination)?;
                rank(&mut records, RANK_KEYS);
                records
            }
            None => {
                info!("location could not be geocoded");
                Vec::new()
            }
        };

        let summary = market_summary(&records);
        info!(competitor_count = records.len(), "competitor search complete");
        Ok(Dataset::new(COMPETITORS_SHEET, COMPETITOR_COLUMNS, records).with_summary(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn result_fields_are_flattened_with_defaults() {
        let record = normalize_competitor(&json!({
            "name": "Stop & Shop",
            "vicinity": "Main St",
            "place_id": "p1",
            "types": ["grocery_or_supermarket", "store"]
        }))
        .expect("result normalizes");

        assert_eq!(record.field_names().collect::<Vec<_>>(), COMPETITOR_COLUMNS);
        assert_eq!(
            record.get("types"),
            Some(&ScalarValue::from("grocery_or_supermarket, store"))
        );
        assert_eq!(record.get("price_level"), Some(&ScalarValue::from("N/A")));
        assert_eq!(record.get("business_status"), Some(&ScalarValue::from("UNKNOWN")));
        assert_eq!(record.number("rating"), Some(0.0));
    }

    #[test]
    fn result_without_place_id_is_malformed() {
        assert!(normalize_competitor(&json!({"name": "Ghost"})).is_err());
        assert!(normalize_competitor(&json!({"place_id": "", "name": "Blank"})).is_err());
    }

    #[test]
    fn summary_reports_market_statistics() {
        let records: Vec<Record> = [(4.0, 100), (5.0, 20), (3.0, 30), (4.5, 50)]
            .into_iter()
            .map(|(rating, total)| {
                Record::new()
                    .with("rating", rating)
                    .with("user_ratings_total", total as u64)
            })
            .collect();

        let summary = market_summary(&records);

        assert_eq!(summary.get("Total Competitors"), Some(&ScalarValue::Number(4.0)));
        assert_eq!(summary.get("Average Rating"), Some(&ScalarValue::Number(4.125)));
        assert_eq!(summary.get("Median Rating"), Some(&ScalarValue::Number(4.25)));
        assert_eq!(summary.get("Total Reviews"), Some(&ScalarValue::Number(200.0)));
        assert_eq!(
            summary.get("Average Reviews per Business"),
            Some(&ScalarValue::Number(50.0))
        );
    }

    #[test]
    fn empty_competitor_set_has_empty_summary() {
        assert!(market_summary(&[]).is_empty());
    }
}
