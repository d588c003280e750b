//! Core library for the valley-tools command line application.
//!
//! Every tool follows the same path: a [`pipeline::PageFetcher`] pulls pages
//! from an upstream API, [`pipeline::fetch_all`] normalizes the raw items
//! into [`model::Record`]s, and [`export`] writes the records together with
//! their [`model::Summary`] as a spreadsheet. HTTP clients and the tools
//! built on them live under [`sources`], the static loan eligibility screen
//! in [`eligibility`], and the multi-tool run in [`workflow`].

pub mod config;
pub mod eligibility;
pub mod error;
pub mod export;
pub mod flatten;
pub mod io;
pub mod model;
pub mod pipeline;
pub mod sources;
pub mod workflow;

pub use error::{MalformedItem, Result, ToolError};
