use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::error::{Result, ToolError};
use crate::export;
use crate::model::{Dataset, Query};
use crate::sources::competitors::DEFAULT_RADIUS;
use crate::sources::openai::analysis_markdown;
use crate::sources::sba::{self, state_code};
use crate::sources::{
    CompetitorsTool, OpenAiClient, PlacesClient, ResearchTool, ReviewsTool, SbaClient, SbaTool,
};

/// Loans requested per state in a comprehensive analysis.
const ANALYSIS_LOAN_LIMIT: u32 = 50;
/// Years of rate history included in a comprehensive analysis.
const ANALYSIS_HISTORY_YEARS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Reviews,
    Competitors,
    Research,
    Loans,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Reviews => write!(f, "reviews"),
            Step::Competitors => write!(f, "competitors"),
            Step::Research => write!(f, "research"),
            Step::Loans => write!(f, "sba loans"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepStatus {
    /// Data was fetched and exported.
    Completed { records: usize },
    /// The upstream had nothing for this business; no artifact was written.
    NoResults,
    /// The tool could not be constructed, usually for lack of a credential.
    Unavailable(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub step: Step,
    pub status: StepStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisReport {
    pub artifacts: Vec<PathBuf>,
    pub steps: Vec<StepOutcome>,
}

impl AnalysisReport {
    pub fn status(&self, step: Step) -> Option<&StepStatus> {
        self.steps
            .iter()
            .find(|outcome| outcome.step == step)
            .map(|outcome| &outcome.status)
    }
}

/// Every tool the toolkit knows about. Tools whose credentials are missing
/// are kept as the reason they are unavailable.
pub struct Toolkit {
    reviews: std::result::Result<ReviewsTool, String>,
    competitors: std::result::Result<CompetitorsTool, String>,
    research: std::result::Result<ResearchTool, String>,
    sba: SbaTool,
    output_dir: PathBuf,
}

impl Toolkit {
    pub fn from_config(config: &Config) -> Result<Self> {
        let places = PlacesClient::new(config.google_api_key.as_deref(), &config.google_base_url)
            .map_err(|error| unavailable("places tools", error));
        let research = OpenAiClient::new(
            config.openai_api_key.as_deref(),
            &config.openai_base_url,
            &config.openai_model,
        )
        .map(ResearchTool::new)
        .map_err(|error| unavailable("research tool", error));
        let sba = SbaTool::new(SbaClient::new(
            config.sba_api_key.as_deref(),
            &config.sba_base_url,
        )?);

        Ok(Self {
            reviews: places
                .clone()
                .map(|client| ReviewsTool::new(client, config.pagination)),
            competitors: places.map(|client| CompetitorsTool::new(client, config.pagination)),
            research,
            sba,
            output_dir: config.output_dir.clone(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Runs every available tool for one business and exports each result
    /// under the output directory. A failing step is recorded and the
    /// remaining steps still run.
    #[instrument(level = "info", skip(self, started_at))]
    pub fn comprehensive_analysis(
        &self,
        business_name: &str,
        business_type: &str,
        location: &str,
        started_at: NaiveDateTime,
    ) -> AnalysisReport {
        let base = base_filename(business_name, started_at);
        let mut report = AnalysisReport::default();

        let status = match &self.reviews {
            Ok(tool) => self.export_step(
                tool.get_reviews(&Query::new(business_name, location)),
                &base,
                "reviews",
                &mut report,
            ),
            Err(reason) => StepStatus::Unavailable(reason.clone()),
        };
        record(&mut report, Step::Reviews, status);

        let status = match &self.competitors {
            Ok(tool) => self.export_step(
                tool.search(&Query::new(business_type, location).with_radius(DEFAULT_RADIUS)),
                &base,
                "competitors",
                &mut report,
            ),
            Err(reason) => StepStatus::Unavailable(reason.clone()),
        };
        record(&mut report, Step::Competitors, status);

        let status = match &self.research {
            Ok(tool) => {
                let context = format!("Private equity acquisition target in {location}");
                match tool.analyze_business(business_name, business_type, location, Some(&context)) {
                    Ok(dataset) if dataset.is_empty() => StepStatus::NoResults,
                    Ok(dataset) => {
                        let markdown = self.output_dir.join(format!("{base}_analysis.md"));
                        match export::export_text(&analysis_markdown(&dataset), &markdown) {
                            Ok(()) => {
                                report.artifacts.push(markdown);
                                self.export_step(Ok(dataset), &base, "analysis", &mut report)
                            }
                            Err(error) => StepStatus::Failed(error.to_string()),
                        }
                    }
                    Err(error) => StepStatus::Failed(error.to_string()),
                }
            }
            Err(reason) => StepStatus::Unavailable(reason.clone()),
        };
        record(&mut report, Step::Research, status);

        let status = match self.loan_workbook(location, started_at, &base) {
            Ok((path, records)) => {
                report.artifacts.push(path);
                StepStatus::Completed { records }
            }
            Err(error) => StepStatus::Failed(error.to_string()),
        };
        record(&mut report, Step::Loans, status);

        info!(artifacts = report.artifacts.len(), "comprehensive analysis complete");
        report
    }

    fn export_step(
        &self,
        fetched: Result<Dataset>,
        base: &str,
        kind: &str,
        report: &mut AnalysisReport,
    ) -> StepStatus {
        let dataset = match fetched {
            Ok(dataset) if dataset.is_empty() => return StepStatus::NoResults,
            Ok(dataset) => dataset,
            Err(error) => return StepStatus::Failed(error.to_string()),
        };
        let path = self.output_dir.join(format!("{base}_{kind}.xlsx"));
        match export::export(&dataset, &path) {
            Ok(()) => {
                report.artifacts.push(path);
                StepStatus::Completed {
                    records: dataset.len(),
                }
            }
            Err(error) => StepStatus::Failed(error.to_string()),
        }
    }

    fn loan_workbook(
        &self,
        location: &str,
        started_at: NaiveDateTime,
        base: &str,
    ) -> Result<(PathBuf, usize)> {
        let today = started_at.date();
        let state = state_code(location);
        let sheets = [
            sba::loan_rates(today),
            self.sba.search_loans_by_state(state, ANALYSIS_LOAN_LIMIT)?,
            sba::historical_rates(ANALYSIS_HISTORY_YEARS, today)?,
        ];
        let records = sheets.iter().map(Dataset::len).sum();
        let path = self.output_dir.join(format!("{base}_sba_loans.xlsx"));
        export::export_workbook(&sheets, &path)?;
        Ok((path, records))
    }
}

fn record(report: &mut AnalysisReport, step: Step, status: StepStatus) {
    match &status {
        StepStatus::Failed(message) => warn!(%step, %message, "step failed"),
        StepStatus::Unavailable(reason) => warn!(%step, %reason, "step skipped"),
        StepStatus::NoResults => info!(%step, "no results"),
        StepStatus::Completed { records } => info!(%step, records, "step complete"),
    }
    report.steps.push(StepOutcome { step, status });
}

fn unavailable(tool: &str, error: ToolError) -> String {
    warn!(tool, %error, "tool not initialised");
    error.to_string()
}

/// `<Business_Name>_<YYYYMMDD_HHMMSS>`, safe to use as a file name.
pub fn base_filename(business_name: &str, started_at: NaiveDateTime) -> String {
    let name: String = business_name
        .trim()
        .chars()
        .map(|ch| if ch.is_whitespace() || matches!(ch, '/' | '\\' | ':') { '_' } else { ch })
        .collect();
    format!("{name}_{}", started_at.format("%Y%m%d_%H%M%S"))
}
