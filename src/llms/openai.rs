use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use patrol_analyzer::AnalysisProvider;
use patrol_core::{Diagnosis, ErrorRecord, PatrolError, RepositoryContext};

const SYSTEM_PROMPT: &str = "You are an expert software engineer specializing in error diagnosis and debugging.
Your task is to analyze error logs and identify root causes, suggesting fixes.

Provide your analysis in the following JSON format:
{
  \"rootCause\": \"Brief explanation of the root cause\",
  \"suggestedFix\": \"Concrete steps to fix the issue\",
  \"confidenceScore\": 85
}

Be concise but thorough. Focus on actionable insights.";

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

pub struct OpenAIProvider {
    pub model: String,
    pub base_url: String,
    client: Client,
}

impl OpenAIProvider {
    pub fn new(model: String, base_url: String) -> Self {
        Self {
            model,
            base_url,
            client: Client::new(),
        }
    }

    async fn make_request(&self, messages: Vec<ChatMessage>) -> Result<String, PatrolError> {
        #[derive(Serialize)]
        struct Request {
            model: String,
            messages: Vec<ChatMessage>,
            temperature: f32,
            max_tokens: u32,
        }

        #[derive(Deserialize)]
        struct Response {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ResponseMessage,
        }

        #[derive(Deserialize)]
        struct ResponseMessage {
            content: String,
        }

        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| PatrolError::AnalysisFailure("OPENAI_API_KEY is not set".to_string()))?;

        let request = Request {
            model: self.model.clone(),
            messages,
            temperature: 0.7,
            max_tokens: 1000,
        };

        let response = self
            .client
            .post(&self.base_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&request)
            .send()
            .await
            .map_err(|e| PatrolError::AnalysisFailure(format!("OpenAI request failed: {e}")))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| PatrolError::AnalysisFailure(format!("OpenAI response error: {e}")))?;

        if !status.is_success() {
            return Err(PatrolError::AnalysisFailure(format!(
                "OpenAI API error: {status} {response_text}"
            )));
        }

        let parsed: Response = serde_json::from_str(&response_text).map_err(|e| {
            PatrolError::AnalysisFailure(format!("failed to parse OpenAI response: {e}"))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| PatrolError::AnalysisFailure("no choices in response".to_string()))
    }
}

fn build_user_prompt(record: &ErrorRecord, context: Option<&RepositoryContext>) -> String {
    let mut prompt = String::from("Analyze the following error:\n\n");
    prompt.push_str(&format!("Error Message: {}\n", record.message));

    if let Some(code) = &record.code {
        prompt.push_str(&format!("Error Code: {code}\n"));
    }

    if let Some(file_path) = &record.file_path {
        match record.line_number {
            Some(line) => prompt.push_str(&format!("File: {file_path}:{line}\n")),
            None => prompt.push_str(&format!("File: {file_path}\n")),
        }
    }

    if let Some(stack_trace) = &record.stack_trace {
        prompt.push_str(&format!("Stack Trace:\n{stack_trace}\n"));
    }

    if !record.context.is_empty() {
        let mut keys: Vec<&String> = record.context.keys().collect();
        keys.sort();
        prompt.push_str("Context:\n");
        for key in keys {
            prompt.push_str(&format!("  {key}: {}\n", record.context[key]));
        }
    }

    if let Some(context) = context {
        prompt.push_str(&format!("\nRepository: {}\n", context.repository_url));
        prompt.push_str(&format!(
            "Ref: {}\n",
            context.reference.as_deref().unwrap_or("default")
        ));
        if context.has_snippets() {
            prompt.push_str(&format!("\nRelevant Code:\n{}\n", context.snippets));
        }
    }

    prompt.push_str("\nProvide the analysis in JSON format.");
    prompt
}

/// Pull the diagnosis out of a model response: the JSON object when one is
/// present, otherwise scrape the text sections with reduced confidence.
pub(crate) fn parse_diagnosis(content: &str) -> Diagnosis {
    if let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&content[start..=end]) {
                return Diagnosis {
                    root_cause: value["rootCause"].as_str().unwrap_or_default().to_string(),
                    suggested_fix: value["suggestedFix"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                    confidence_score: value["confidenceScore"].as_i64().unwrap_or(75) as i32,
                };
            }
        }
    }

    log::warn!("model response was not valid JSON, scraping text sections");
    let root_cause = extract_section(content, "root cause")
        .or_else(|| content.lines().find(|line| !line.trim().is_empty()).map(str::to_string))
        .unwrap_or_default();
    let suggested_fix =
        extract_section(content, "suggested fix|solution|fix").unwrap_or_default();

    Diagnosis {
        root_cause,
        suggested_fix,
        confidence_score: 60,
    }
}

fn extract_section(text: &str, section_name: &str) -> Option<String> {
    let regex = Regex::new(&format!(r"(?i)(?:{section_name})[:\s]+([^\n]+)")).ok()?;
    regex
        .captures(text)
        .map(|captures| captures[1].trim().to_string())
}

#[async_trait]
impl AnalysisProvider for OpenAIProvider {
    async fn analyze(
        &self,
        record: &ErrorRecord,
        context: Option<&RepositoryContext>,
    ) -> Result<Diagnosis, PatrolError> {
        let messages = vec![
            ChatMessage {
                role: "system".to_string(),
                content: SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: build_user_prompt(record, context),
            },
        ];

        let content = self.make_request(messages).await?;
        Ok(parse_diagnosis(&content))
    }
}
