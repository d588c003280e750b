//! Chat-completion client and the research prompts built on top of it.

use std::fmt::Write as _;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::require_key;
use crate::error::{MalformedItem, Result, ToolError};
use crate::model::{Dataset, Query, Record, ScalarValue, Summary};
use crate::pipeline::{ContinuationToken, Page, PageFetcher, Pagination, fetch_all};
use crate::sources::places::REQUEST_TIMEOUT;

const SERVICE: &str = "chat completion API";

pub const ANALYSIS_SHEET: &str = "Full Analysis";
pub const ANALYSIS_COLUMNS: &[&str] = &["analysis"];

const ANALYST_ROLE: &str = "You are an expert business analyst specializing in private equity due diligence and financial modeling. Provide comprehensive, data-driven insights.";
const MARKET_ROLE: &str = "You are a market research expert with deep knowledge of various industries and regional markets. Provide comprehensive, well-researched insights.";
const FINANCE_ROLE: &str = "You are a financial modeling expert specializing in private equity investments. Provide detailed, quantitative financial analysis.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: Option<ChoiceMessage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatCompletion {
    /// Text of the first choice that carries any.
    pub fn first_text(&self) -> Option<&str> {
        self.choices
            .iter()
            .find_map(|choice| choice.message.as_ref()?.content.as_deref())
    }

    pub fn total_tokens(&self) -> u64 {
        self.usage.as_ref().map(|usage| usage.total_tokens).unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    /// Builds a client. Fails immediately when the API key is missing.
    pub fn new(api_key: Option<&str>, base_url: &str, model: &str) -> Result<Self> {
        let api_key = require_key(
            api_key,
            "OPENAI_API_KEY",
            "set it in the environment or .env file",
        )?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT * 4)
            .build()
            .map_err(|error| ToolError::upstream(SERVICE, format!("failed to build client: {error}")))?;

        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Builds a request for the configured model.
    pub fn request(&self, messages: Vec<Message>, temperature: f32, max_tokens: u32) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages,
            temperature,
            max_tokens,
        }
    }

    #[instrument(level = "debug", skip_all, fields(model = %request.model, max_tokens = request.max_tokens))]
    pub fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(%url, message_count = request.messages.len(), "chat completion request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .map_err(|error| ToolError::upstream(SERVICE, format!("request failed: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ToolError::upstream(SERVICE, format!("HTTP {status}: {body}")));
        }

        let completion: ChatCompletion = response
            .json()
            .map_err(|error| ToolError::upstream(SERVICE, format!("invalid response body: {error}")))?;
        debug!(
            choices = completion.choices.len(),
            total_tokens = completion.total_tokens(),
            "chat completion received"
        );
        Ok(completion)
    }
}

/// A single chat request presented as a one-page source. Model and usage of
/// the response are kept for the summary.
struct CompletionPage<'a> {
    client: &'a OpenAiClient,
    request: ChatRequest,
    model_used: Option<String>,
    usage: Option<Usage>,
}

impl PageFetcher for CompletionPage<'_> {
    type Item = Choice;

    fn fetch_page(&mut self, _query: &Query, _token: Option<&ContinuationToken>) -> Result<Page<Choice>> {
        let completion = self.client.complete(&self.request)?;
        self.model_used = Some(completion.model);
        self.usage = completion.usage;
        Ok(Page::last(completion.choices))
    }
}

/// A choice without message text is unusable.
pub fn normalize_choice(choice: &Choice) -> std::result::Result<Record, MalformedItem> {
    let content = choice
        .message
        .as_ref()
        .and_then(|message| message.content.as_deref())
        .ok_or_else(|| MalformedItem::new(format!("choice {} has no content", choice.index)))?;
    Ok(Record::new().with("analysis", content))
}

pub struct ResearchTool {
    client: OpenAiClient,
}

impl ResearchTool {
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }

    /// Due-diligence style analysis of one business.
    ///
    /// The record sheet holds the analysis text; the summary echoes the
    /// inputs together with the model and token count reported upstream.
    #[instrument(level = "info", skip(self, additional_context))]
    pub fn analyze_business(
        &self,
        business_name: &str,
        business_type: &str,
        location: &str,
        additional_context: Option<&str>,
    ) -> Result<Dataset> {
        let prompt = business_prompt(business_name, business_type, location, additional_context);
        let mut fetcher = CompletionPage {
            client: &self.client,
            request: self.client.request(
                vec![Message::system(ANALYST_ROLE), Message::user(prompt)],
                0.7,
                4000,
            ),
            model_used: None,
            usage: None,
        };
        let query = Query::new(business_name, location);
        let records = fetch_all(&query, &mut fetcher, normalize_choice, Pagination::with_max_pages(1))?;

        let tokens_used = fetcher.usage.as_ref().map(|usage| usage.total_tokens).unwrap_or(0);
        info!(tokens_used, "business analysis complete");

        let summary: Summary = [
            ("business_name", ScalarValue::from(business_name)),
            ("business_type", ScalarValue::from(business_type)),
            ("location", ScalarValue::from(location)),
            (
                "model_used",
                ScalarValue::from(fetcher.model_used.unwrap_or_else(|| self.client.model().to_string())),
            ),
            ("tokens_used", ScalarValue::from(tokens_used)),
        ]
        .into_iter()
        .collect();

        Ok(Dataset::new(ANALYSIS_SHEET, ANALYSIS_COLUMNS, records).with_summary(summary))
    }

    /// Industry research for a region, optionally steered by questions.
    #[instrument(level = "info", skip(self, questions))]
    pub fn market_research(&self, industry: &str, region: &str, questions: &[String]) -> Result<String> {
        let request = self.client.request(
            vec![
                Message::system(MARKET_ROLE),
                Message::user(market_prompt(industry, region, questions)),
            ],
            0.7,
            4000,
        );
        self.text_of(&request)
    }

    /// Modelling guidance for the given `key: value` business facts.
    #[instrument(level = "info", skip_all, fields(facts = business_data.len()))]
    pub fn financial_model_insights(&self, business_data: &[(String, String)]) -> Result<String> {
        let request = self.client.request(
            vec![
                Message::system(FINANCE_ROLE),
                Message::user(financial_prompt(business_data)),
            ],
            0.5,
            3000,
        );
        self.text_of(&request)
    }

    fn text_of(&self, request: &ChatRequest) -> Result<String> {
        let completion = self.client.complete(request)?;
        completion
            .first_text()
            .map(str::to_string)
            .ok_or_else(|| ToolError::upstream(SERVICE, "response contained no message text"))
    }
}

/// Renders an analysis dataset as a markdown document.
pub fn analysis_markdown(dataset: &Dataset) -> String {
    dataset
        .records
        .iter()
        .filter_map(|record| record.get("analysis").and_then(ScalarValue::as_str))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

fn business_prompt(
    business_name: &str,
    business_type: &str,
    location: &str,
    additional_context: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Conduct a comprehensive business analysis for the following company:\n\n\
         Business Name: {business_name}\n\
         Industry/Type: {business_type}\n\
         Location: {location}\n"
    );
    if let Some(context) = additional_context.filter(|context| !context.trim().is_empty()) {
        let _ = write!(prompt, "\nAdditional Context: {context}\n");
    }
    prompt.push_str(
        "\nPlease provide a detailed analysis covering:\n\
         1. Market Overview: Current state of the industry and market trends\n\
         2. Competitive Landscape: Key competitors and market positioning\n\
         3. Growth Opportunities: Potential areas for expansion and improvement\n\
         4. Risk Factors: Potential challenges and threats\n\
         5. Financial Considerations: Key financial metrics and considerations for acquisition\n\
         6. Strategic Recommendations: Actionable recommendations for private equity investment\n\n\
         Format the response in a structured way with clear sections.",
    );
    prompt
}

fn market_prompt(industry: &str, region: &str, questions: &[String]) -> String {
    let mut prompt = format!(
        "Conduct comprehensive market research for:\n\n\
         Industry: {industry}\n\
         Region: {region}\n\n\
         Provide insights on:\n\
         1. Market Size and Growth Rate\n\
         2. Key Market Trends\n\
         3. Consumer Demographics and Behavior\n\
         4. Regulatory Environment\n\
         5. Technology and Innovation Trends\n\
         6. Market Entry Barriers\n\
         7. Investment Outlook\n"
    );
    if !questions.is_empty() {
        prompt.push_str("\nSpecifically address these questions:\n");
        for question in questions {
            let _ = writeln!(prompt, "- {question}");
        }
    }
    prompt.push_str("\nProvide data-driven insights where possible.");
    prompt
}

fn financial_prompt(business_data: &[(String, String)]) -> String {
    let facts = business_data
        .iter()
        .map(|(key, value)| format!("{key}: {value}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Based on the following business data, provide financial modeling insights:\n\n\
         {facts}\n\n\
         Provide analysis on:\n\
         1. Revenue projections and growth assumptions\n\
         2. Cost structure analysis\n\
         3. Key financial ratios and metrics\n\
         4. Valuation considerations\n\
         5. Cash flow projections\n\
         6. ROI and IRR considerations for PE investment\n\
         7. Exit strategy considerations\n\n\
         Be specific and provide quantitative insights where possible."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL};
    use serde_json::json;

    fn default_client(api_key: Option<&str>) -> Result<OpenAiClient> {
        OpenAiClient::new(api_key, DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL)
    }

    #[test]
    fn missing_key_fails_construction() {
        assert!(matches!(
            default_client(None),
            Err(ToolError::ConfigurationMissing {
                variable: "OPENAI_API_KEY",
                ..
            })
        ));
    }

    #[test]
    fn request_serializes_role_tagged_messages() {
        let client = default_client(Some("sk-test")).expect("client builds");
        let request = client.request(vec![Message::system("be brief"), Message::user("hi")], 0.5, 10);
        let body = serde_json::to_value(&request).expect("serializes");

        assert_eq!(body["model"], json!(DEFAULT_OPENAI_MODEL));
        assert_eq!(body["messages"][0], json!({"role": "system", "content": "be brief"}));
        assert_eq!(body["messages"][1]["role"], json!("user"));
        assert_eq!(body["max_tokens"], json!(10));
    }

    #[test]
    fn completion_without_usage_reports_zero_tokens() {
        let completion: ChatCompletion = serde_json::from_value(json!({
            "model": "gpt-4o-2024",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Summary"}}]
        }))
        .expect("completion parses");

        assert_eq!(completion.first_text(), Some("Summary"));
        assert_eq!(completion.total_tokens(), 0);
    }

    #[test]
    fn choice_without_content_is_malformed() {
        let choice = Choice {
            index: 2,
            message: Some(ChoiceMessage { content: None }),
            finish_reason: Some("content_filter".into()),
        };
        assert!(normalize_choice(&choice).is_err());
    }

    #[test]
    fn prompts_include_optional_sections_only_when_given() {
        let with_context = business_prompt("Big Y", "Grocery", "Springfield", Some("acquisition"));
        let without = business_prompt("Big Y", "Grocery", "Springfield", Some("  "));
        assert!(with_context.contains("Additional Context: acquisition"));
        assert!(!without.contains("Additional Context"));

        let market = market_prompt("Dental", "New England", &["Who leads?".to_string()]);
        assert!(market.contains("- Who leads?"));
        assert!(!market_prompt("Dental", "New England", &[]).contains("Specifically address"));

        let finance = financial_prompt(&[("revenue".into(), "5000000".into())]);
        assert!(finance.contains("revenue: 5000000"));
    }

    #[test]
    fn markdown_joins_analysis_records() {
        let dataset = Dataset::new(
            ANALYSIS_SHEET,
            ANALYSIS_COLUMNS,
            vec![
                Record::new().with("analysis", "first"),
                Record::new().with("analysis", "second"),
            ],
        );
        assert_eq!(analysis_markdown(&dataset), "first\n\n---\n\nsecond");
    }
}
