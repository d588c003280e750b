//! Upstream data sources. Each tool wraps one HTTP client and exposes its
//! results as [`Dataset`](crate::model::Dataset)s built by the shared
//! pipeline.

pub mod competitors;
pub mod openai;
pub mod places;
pub mod reviews;
pub mod sba;

pub use competitors::CompetitorsTool;
pub use openai::{OpenAiClient, ResearchTool};
pub use places::PlacesClient;
pub use reviews::ReviewsTool;
pub use sba::{SbaClient, SbaTool};
