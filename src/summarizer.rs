//! LLM summarization via Gemini.
//!
//! Uses rstructor's Gemini client for plain-text generation. The reply stays
//! in the language of the source content, and its shape follows the user's
//! chosen [`Style`].

use rstructor::{GeminiClient, GeminiModel, LLMClient};
use thiserror::Error;

use crate::config::Config;

#[derive(Error, Debug)]
pub enum SummarizeError {
    #[error("LLM request failed: {0}")]
    RequestFailed(String),
    #[error("configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),
}

/// How a summary should read. Chosen per user with `/style`; the default
/// lets the model decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Auto,
    Bullets,
    Short,
    Detailed,
}

impl Style {
    pub const ALL: [Style; 4] = [Style::Auto, Style::Bullets, Style::Short, Style::Detailed];

    pub fn parse(input: &str) -> Option<Style> {
        match input.trim().to_lowercase().as_str() {
            "auto" => Some(Style::Auto),
            "bullets" => Some(Style::Bullets),
            "short" => Some(Style::Short),
            "detailed" => Some(Style::Detailed),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Style::Auto => "auto",
            Style::Bullets => "bullets",
            Style::Short => "short",
            Style::Detailed => "detailed",
        }
    }

    fn instruction(&self) -> &'static str {
        match self {
            Style::Auto => {
                "Summarize the following content concisely. \
                 Answer in the same language as the content."
            }
            Style::Bullets => {
                "Summarize the following content as 3-6 short bullet points. \
                 Answer in the same language as the content."
            }
            Style::Short => {
                "Summarize the following content in 2-3 sentences. \
                 Answer in the same language as the content."
            }
            Style::Detailed => {
                "Write a detailed summary of the following content: a short \
                 overview, then the key points, then the main takeaways. \
                 Answer in the same language as the content."
            }
        }
    }
}

/// Summarize text with the configured model in the given style.
pub async fn summarize(
    text: &str,
    style: Style,
    config: &Config,
) -> Result<String, SummarizeError> {
    let api_key = config.gemini_key()?;

    // Parse the model from config
    let model = parse_gemini_model(&config.agent.model);

    // Build the client
    let client = GeminiClient::new(api_key)
        .map_err(|e| SummarizeError::RequestFailed(e.to_string()))?
        .model(model);

    let prompt = format!(
        "{}\n\n{}\n\n---\n\n{}",
        config.agent.persona,
        style.instruction(),
        text
    );

    let result = client
        .generate_with_metadata(&prompt)
        .await
        .map_err(|e| SummarizeError::RequestFailed(e.to_string()))?;

    let summary = result.text.trim();
    if summary.is_empty() {
        return Err(SummarizeError::RequestFailed(
            "model returned an empty response".to_string(),
        ));
    }
    Ok(summary.to_string())
}

/// Parse a model string into a GeminiModel
fn parse_gemini_model(model: &str) -> GeminiModel {
    match model {
        "gemini-2.0-flash" => GeminiModel::Gemini20Flash,
        "gemini-2.5-flash" => GeminiModel::Gemini25Flash,
        "gemini-2.5-pro" => GeminiModel::Gemini25Pro,
        _ => GeminiModel::Gemini20Flash, // Default
    }
}
