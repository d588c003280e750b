use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument};

use crate::error::{MalformedItem, Result};
use crate::model::{Dataset, Query, Record, ScalarValue, Summary};
use crate::pipeline::{ContinuationToken, Page, PageFetcher, Pagination, fetch_all};
use crate::sources::places::{PlaceDetails, PlacesClient};

pub const REVIEWS_SHEET: &str = "Reviews";

pub const REVIEW_COLUMNS: &[&str] = &[
    "business_name",
    "author",
    "rating",
    "text",
    "time",
    "relative_time",
];

/// A raw review tagged with the business name it was fetched for.
#[derive(Debug, Clone)]
pub struct ReviewItem {
    pub business_name: String,
    pub raw: Value,
}

#[derive(Debug, Deserialize)]
struct RawReview {
    author_name: Option<String>,
    rating: Option<f64>,
    text: Option<String>,
    time: Option<i64>,
    relative_time_description: Option<String>,
}

/// Resolves the subject to a place and serves its reviews as a single page.
/// Keeps the details it saw so the summary can be built afterwards.
struct PlaceReviews<'a> {
    client: &'a PlacesClient,
    details: Option<PlaceDetails>,
}

impl PageFetcher for PlaceReviews<'_> {
    type Item = ReviewItem;

    fn fetch_page(&mut self, query: &Query, _token: Option<&ContinuationToken>) -> Result<Page<ReviewItem>> {
        let text = format!("{} {}", query.subject, query.location);
        let Some(place_id) = self.client.find_place(&text)? else {
            info!(subject = %query.subject, location = %query.location, "no place found");
            return Ok(Page::empty());
        };
        let Some(details) = self.client.place_details(&place_id)? else {
            return Ok(Page::empty());
        };

        let business_name = details.name.clone().unwrap_or_else(|| query.subject.clone());
        let items = details
            .reviews
            .iter()
            .map(|raw| ReviewItem {
                business_name: business_name.clone(),
                raw: raw.clone(),
            })
            .collect();
        self.details = Some(details);
        Ok(Page::last(items))
    }
}

/// Maps one raw review onto the review columns, defaulting absent fields.
pub fn normalize_review(item: &ReviewItem) -> std::result::Result<Record, MalformedItem> {
    let review: RawReview = serde_json::from_value(item.raw.clone())?;
    Ok(Record::new()
        .with("business_name", item.business_name.as_str())
        .with("author", review.author_name.unwrap_or_else(|| "Anonymous".to_string()))
        .with("rating", review.rating.unwrap_or(0.0))
        .with("text", review.text.unwrap_or_default())
        .with(
            "time",
            review.time.map(|time| time.to_string()).unwrap_or_default(),
        )
        .with("relative_time", review.relative_time_description.unwrap_or_default()))
}

/// Business-level attributes reported next to the reviews.
pub fn business_summary(details: &PlaceDetails) -> Summary {
    let text = |value: &Option<String>| ScalarValue::from(value.clone().unwrap_or_default());
    [
        ("business_address", text(&details.formatted_address)),
        ("overall_rating", ScalarValue::from(details.rating.unwrap_or(0.0))),
        ("total_ratings", ScalarValue::from(details.user_ratings_total.unwrap_or(0))),
        ("website", text(&details.website)),
        ("phone", text(&details.formatted_phone_number)),
    ]
    .into_iter()
    .collect()
}

pub struct ReviewsTool {
    client: PlacesClient,
    pagination: Pagination,
}

impl ReviewsTool {
    pub fn new(client: PlacesClient, pagination: Pagination) -> Self {
        Self { client, pagination }
    }

    /// Fetches the reviews of the business named by `query.subject`.
    ///
    /// An unknown business yields an empty dataset with an empty summary.
    #[instrument(level = "info", skip(self), fields(subject = %query.subject))]
    pub fn get_reviews(&self, query: &Query) -> Result<Dataset> {
        let mut fetcher = PlaceReviews {
            client: &self.client,
            details: None,
        };
        let records = fetch_all(query, &mut fetcher, normalize_review, self.pagination)?;
        let summary = fetcher
            .details
            .as_ref()
            .map(business_summary)
            .unwrap_or_default();

        info!(review_count = records.len(), "reviews collected");
        Ok(Dataset::new(REVIEWS_SHEET, REVIEW_COLUMNS, records).with_summary(summary))
    }
}
