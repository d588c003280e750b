use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use valley_tools::config::Config;
use valley_tools::eligibility::{self, BusinessProfile};
use valley_tools::export;
use valley_tools::model::{DEFAULT_LOCATION, Dataset, Query};
use valley_tools::sources::competitors::DEFAULT_RADIUS;
use valley_tools::sources::openai::analysis_markdown;
use valley_tools::sources::sba::{self, DEFAULT_STATE};
use valley_tools::sources::{
    CompetitorsTool, OpenAiClient, PlacesClient, ResearchTool, ReviewsTool, SbaClient, SbaTool,
};
use valley_tools::workflow::{StepStatus, Toolkit};
use valley_tools::{Result, ToolError};

fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_tracing().and_then(|()| run(cli)) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| ToolError::Logging(error.to_string()))
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env()?;
    match cli.command {
        Command::Reviews {
            business,
            location,
            output,
        } => {
            let client = PlacesClient::new(config.google_api_key.as_deref(), &config.google_base_url)?;
            let dataset = ReviewsTool::new(client, config.pagination)
                .get_reviews(&Query::new(business.as_str(), location))?;
            report_and_export(&dataset, "reviews", &output_path(&config, output, "google_reviews"))
        }
        Command::Competitors {
            business_type,
            location,
            radius,
            output,
        } => {
            let client = PlacesClient::new(config.google_api_key.as_deref(), &config.google_base_url)?;
            let query = Query::new(business_type, location).with_radius(radius);
            let dataset = CompetitorsTool::new(client, config.pagination).search(&query)?;
            report_and_export(&dataset, "competitors", &output_path(&config, output, "competitors"))
        }
        Command::Research {
            business,
            business_type,
            location,
            context,
            output,
        } => {
            let tool = research_tool(&config)?;
            let dataset =
                tool.analyze_business(&business, &business_type, &location, context.as_deref())?;
            let stem = output.unwrap_or_else(|| "openai_analysis".to_string());
            let markdown = config.output_dir.join(format!("{stem}.md"));
            export::export_text(&analysis_markdown(&dataset), &markdown)?;
            println!("Analysis written to {}", markdown.display());
            report_and_export(&dataset, "analysis sections", &config.output_dir.join(format!("{stem}.xlsx")))
        }
        Command::Market {
            industry,
            region,
            questions,
            output,
        } => {
            let findings = research_tool(&config)?.market_research(&industry, &region, &questions)?;
            let path = config
                .output_dir
                .join(format!("{}.md", output.unwrap_or_else(|| "market_research".to_string())));
            export::export_text(&findings, &path)?;
            println!("Market research written to {}", path.display());
            Ok(())
        }
        Command::Sba { command } => run_sba(&config, command),
        Command::Analyze {
            business,
            business_type,
            location,
        } => {
            let toolkit = Toolkit::from_config(&config)?;
            let started_at = chrono::Local::now().naive_local();
            let report =
                toolkit.comprehensive_analysis(&business, &business_type, &location, started_at);
            for outcome in &report.steps {
                let line = match &outcome.status {
                    StepStatus::Completed { records } => format!("done ({records} records)"),
                    StepStatus::NoResults => "no results".to_string(),
                    StepStatus::Unavailable(reason) => format!("unavailable: {reason}"),
                    StepStatus::Failed(message) => format!("failed: {message}"),
                };
                println!("{:<12} {line}", outcome.step.to_string());
            }
            println!("All files saved to: {}", toolkit.output_dir().display());
            Ok(())
        }
    }
}

fn run_sba(config: &Config, command: SbaCommand) -> Result<()> {
    let today = chrono::Local::now().date_naive();
    match command {
        SbaCommand::Rates { output } => {
            let dataset = sba::loan_rates(today);
            export_sheet(dataset, &output_path(config, output, "sba_rates"))
        }
        SbaCommand::Loans {
            state,
            limit,
            output,
        } => {
            let client = SbaClient::new(config.sba_api_key.as_deref(), &config.sba_base_url)?;
            let dataset = SbaTool::new(client).search_loans_by_state(&state, limit)?;
            if let Some(note) = dataset.summary.get("note") {
                println!("Note: {}", note.display());
            }
            let default_stem = format!("sba_loans_{}", state.to_uppercase());
            export_sheet(dataset, &output_path(config, output, &default_stem))
        }
        SbaCommand::History { years, output } => {
            let dataset = sba::historical_rates(years, today)?;
            export_sheet(dataset, &output_path(config, output, "sba_historical_rates"))
        }
        SbaCommand::Eligibility {
            revenue,
            employees,
            years,
            credit_score,
        } => {
            let report = eligibility::classify(&BusinessProfile {
                annual_revenue: revenue,
                employees,
                years_in_business: years,
                credit_score,
            });
            println!("Annual Revenue: ${:.2}", report.profile.annual_revenue);
            println!("Employees: {}", report.profile.employees);
            println!("Years in Business: {}", report.profile.years_in_business);
            println!("Credit Score: {}", report.profile.credit_score);
            println!("\nRecommended Programs:");
            for program in &report.recommended_programs {
                println!("\n  - {}", program.program);
                println!("    Status: {}", program.eligible);
                println!("    Max Amount: {}", program.max_amount);
                println!("    Notes: {}", program.notes);
            }
            println!("\n{}", report.general_notes);
            Ok(())
        }
    }
}

fn research_tool(config: &Config) -> Result<ResearchTool> {
    let client = OpenAiClient::new(
        config.openai_api_key.as_deref(),
        &config.openai_base_url,
        &config.openai_model,
    )?;
    Ok(ResearchTool::new(client))
}

fn output_path(config: &Config, output: Option<PathBuf>, default_stem: &str) -> PathBuf {
    output.unwrap_or_else(|| config.output_dir.join(format!("{default_stem}.xlsx")))
}

fn report_and_export(dataset: &Dataset, noun: &str, path: &Path) -> Result<()> {
    if dataset.is_empty() {
        println!("No {noun} found");
        return Ok(());
    }
    println!("Found {} {noun}", dataset.len());
    if is_csv(path) {
        export::export_csv(dataset, path)?;
    } else {
        export::export(dataset, path)?;
    }
    println!("Exported to {}", path.display());
    Ok(())
}

fn export_sheet(dataset: Dataset, path: &Path) -> Result<()> {
    if is_csv(path) {
        export::export_csv(&dataset, path)?;
    } else {
        export::export_workbook(&[dataset], path)?;
    }
    println!("Exported to {}", path.display());
    Ok(())
}

/// A `.csv` destination gets the records only; anything else a workbook.
fn is_csv(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("csv"))
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Business data extraction for private equity financial modelling."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch the reviews of one business.
    Reviews {
        /// Business name.
        #[arg(long)]
        business: String,

        #[arg(long, default_value = DEFAULT_LOCATION)]
        location: String,

        /// Output path; a `.csv` extension writes CSV instead of a workbook.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Find competing businesses around a location.
    Competitors {
        /// Business type or keyword to search for.
        #[arg(long)]
        business_type: String,

        #[arg(long, default_value = DEFAULT_LOCATION)]
        location: String,

        /// Search radius in metres.
        #[arg(long, default_value_t = DEFAULT_RADIUS)]
        radius: u32,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Produce an AI-assisted analysis of one business.
    Research {
        #[arg(long)]
        business: String,

        #[arg(long)]
        business_type: String,

        #[arg(long, default_value = DEFAULT_LOCATION)]
        location: String,

        /// Extra context or questions for the analysis.
        #[arg(long)]
        context: Option<String>,

        /// Output file stem; `.md` and `.xlsx` files are written.
        #[arg(long)]
        output: Option<String>,
    },

    /// Produce AI-assisted market research for an industry.
    Market {
        #[arg(long)]
        industry: String,

        #[arg(long, default_value = DEFAULT_LOCATION)]
        region: String,

        /// Specific question to address; may be repeated.
        #[arg(long = "question")]
        questions: Vec<String>,

        /// Output file stem.
        #[arg(long)]
        output: Option<String>,
    },

    /// SBA loan rates, loans, history, and eligibility.
    Sba {
        #[command(subcommand)]
        command: SbaCommand,
    },

    /// Run every available tool for one business.
    Analyze {
        #[arg(long)]
        business: String,

        #[arg(long)]
        business_type: String,

        #[arg(long, default_value = DEFAULT_LOCATION)]
        location: String,
    },
}

#[derive(Subcommand)]
enum SbaCommand {
    /// Current loan program rates.
    Rates {
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Loans approved in a state.
    Loans {
        #[arg(long, default_value = DEFAULT_STATE)]
        state: String,

        #[arg(long, default_value_t = 50)]
        limit: u32,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Historical quarterly rates.
    History {
        #[arg(long, default_value_t = 5)]
        years: u32,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Screen a business against the loan programs.
    Eligibility {
        /// Annual revenue in dollars.
        #[arg(long, default_value_t = 0.0)]
        revenue: f64,

        #[arg(long, default_value_t = 0)]
        employees: u32,

        /// Years in business.
        #[arg(long, default_value_t = 0)]
        years: u32,

        #[arg(long, default_value_t = 0)]
        credit_score: u32,
    },
}
