//! Blocking client for the places search, details, nearby-search, and
//! geocoding endpoints.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::config::require_key;
use crate::error::{Result, ToolError};
use crate::model::Query;
use crate::pipeline::{ContinuationToken, Page, PageFetcher};

const SERVICE: &str = "places API";

/// The places API rejects a `next_page_token` used sooner than this after
/// it was issued.
pub const PAGE_TOKEN_ACTIVATION: Duration = Duration::from_secs(2);

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const DETAIL_FIELDS: &str =
    "name,formatted_address,rating,user_ratings_total,reviews,price_level,website,formatted_phone_number";

/// Latitude/longitude pair returned by the geocoder.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Place metadata returned by the details endpoint. Reviews stay raw so each
/// one can be normalized, or rejected, on its own.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaceDetails {
    pub name: Option<String>,
    pub formatted_address: Option<String>,
    pub rating: Option<f64>,
    pub user_ratings_total: Option<u64>,
    pub price_level: Option<u8>,
    pub website: Option<String>,
    pub formatted_phone_number: Option<String>,
    #[serde(default)]
    pub reviews: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(flatten)]
    body: T,
}

#[derive(Debug, Default, Deserialize)]
struct CandidatesBody {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    place_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct DetailsBody {
    #[serde(default)]
    result: Option<PlaceDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct GeocodeBody {
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Coordinates,
}

#[derive(Debug, Default, Deserialize)]
struct ResultsBody {
    #[serde(default)]
    results: Vec<Value>,
}

/// Outcome of interpreting an envelope's `status` field.
enum Status<T> {
    Found(T, Option<String>),
    Empty,
}

#[derive(Debug, Clone)]
pub struct PlacesClient {
    http: Client,
    api_key: String,
    base_url: String,
    token_activation: Duration,
}

impl PlacesClient {
    /// Builds a client. Fails immediately when the API key is missing.
    pub fn new(api_key: Option<&str>, base_url: &str) -> Result<Self> {
        let api_key = require_key(
            api_key,
            "GOOGLE_API_KEY",
            "set it in the environment or .env file",
        )?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| ToolError::upstream(SERVICE, format!("failed to build client: {error}")))?;

        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            token_activation: PAGE_TOKEN_ACTIVATION,
        })
    }

    /// Overrides the token activation wait. Only local test servers, which
    /// accept tokens immediately, should need this.
    pub fn with_token_activation(mut self, delay: Duration) -> Self {
        self.token_activation = delay;
        self
    }

    /// Resolves free text to a place identifier. `None` when nothing matches.
    #[instrument(level = "debug", skip(self))]
    pub fn find_place(&self, text: &str) -> Result<Option<String>> {
        let status = self.get::<CandidatesBody>(
            "/place/findplacefromtext/json",
            &[
                ("input", text),
                ("inputtype", "textquery"),
                ("fields", "place_id,name,formatted_address"),
            ],
        )?;
        Ok(match status {
            Status::Found(body, _) => body.candidates.into_iter().next().map(|c| c.place_id),
            Status::Empty => None,
        })
    }

    #[instrument(level = "debug", skip(self))]
    pub fn place_details(&self, place_id: &str) -> Result<Option<PlaceDetails>> {
        let status = self.get::<DetailsBody>(
            "/place/details/json",
            &[("place_id", place_id), ("fields", DETAIL_FIELDS)],
        )?;
        Ok(match status {
            Status::Found(body, _) => body.result,
            Status::Empty => None,
        })
    }

    #[instrument(level = "debug", skip(self))]
    pub fn geocode(&self, address: &str) -> Result<Option<Coordinates>> {
        let status = self.get::<GeocodeBody>("/geocode/json", &[("address", address)])?;
        Ok(match status {
            Status::Found(body, _) => body.results.into_iter().next().map(|r| r.geometry.location),
            Status::Empty => None,
        })
    }

    /// One nearby-search page. The follow-up request carries only the token.
    pub fn nearby_page(
        &self,
        location: Coordinates,
        keyword: &str,
        radius: u32,
        token: Option<&ContinuationToken>,
    ) -> Result<Page<Value>> {
        let status = match token {
            Some(token) => self.get::<ResultsBody>(
                "/place/nearbysearch/json",
                &[("pagetoken", token.as_str())],
            )?,
            None => {
                let location = format!("{},{}", location.lat, location.lng);
                let radius = radius.to_string();
                self.get::<ResultsBody>(
                    "/place/nearbysearch/json",
                    &[
                        ("location", location.as_str()),
                        ("radius", radius.as_str()),
                        ("keyword", keyword),
                    ],
                )?
            }
        };
        Ok(match status {
            Status::Found(body, next) => Page::with_token(body.results, next),
            Status::Empty => Page::empty(),
        })
    }

    fn get<T>(&self, path: &str, params: &[(&str, &str)]) -> Result<Status<T>>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "places request");

        let response = self
            .http
            .get(&url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .map_err(|error| ToolError::upstream(SERVICE, format!("request failed: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ToolError::upstream(SERVICE, format!("HTTP {status}: {body}")));
        }

        let envelope: Envelope<T> = response
            .json()
            .map_err(|error| ToolError::upstream(SERVICE, format!("invalid response body: {error}")))?;

        match envelope.status.as_str() {
            "OK" => Ok(Status::Found(envelope.body, envelope.next_page_token)),
            "ZERO_RESULTS" | "NOT_FOUND" => {
                info!(%path, status = %envelope.status, "no results");
                Ok(Status::Empty)
            }
            other => Err(ToolError::upstream(
                SERVICE,
                match envelope.error_message {
                    Some(message) => format!("status {other}: {message}"),
                    None => format!("status {other}"),
                },
            )),
        }
    }
}

/// Nearby search around fixed coordinates, as a page fetcher. The query's
/// subject is the keyword and its radius the search radius.
pub struct NearbySearch<'a> {
    client: &'a PlacesClient,
    location: Coordinates,
    default_radius: u32,
}

impl<'a> NearbySearch<'a> {
    pub fn new(client: &'a PlacesClient, location: Coordinates, default_radius: u32) -> Self {
        Self {
            client,
            location,
            default_radius,
        }
    }
}

impl PageFetcher for NearbySearch<'_> {
    type Item = Value;

    fn fetch_page(&mut self, query: &Query, token: Option<&ContinuationToken>) -> Result<Page<Value>> {
        let radius = query.radius.unwrap_or(self.default_radius);
        self.client
            .nearby_page(self.location, &query.subject, radius, token)
    }

    fn continuation_delay(&self) -> Duration {
        self.client.token_activation
    }
}
