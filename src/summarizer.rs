// Summarisation via an external LLM over HTTPS. The trait keeps the
// processor testable; the HTTP implementation targets an OpenAI-compatible
// chat-completions endpoint with a strict response schema. Model choice is
// by input size; schema violations get exactly one repair retry.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};

use crate::errors::ProcessingError;
use crate::topics::taxonomy;
use crate::types::Confidence;

/// Inputs above this many characters go to the larger model.
const SMALL_MODEL_MAX_CHARS: usize = 200_000;
const SMALL_MODEL: &str = "gpt-4o-mini";
const LARGE_MODEL: &str = "gpt-4o";

/// Hard cap on text shipped in one request; beyond this we truncate and
/// note it in the prompt rather than fail.
const MAX_PROMPT_CHARS: usize = 600_000;

#[derive(Debug, Clone)]
pub struct SummaryRequest {
    /// What is being summarised ("City Council 2025-07-22, item 4.1 ...").
    pub context: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryResult {
    pub summary: String,
    pub topics: Vec<String>,
    pub confidence: Confidence,
    pub thinking_trace: Option<String>,
    pub model: String,
}

/// The summarisation contract. `summarize_batch` must return results in
/// input order and length; implementations that cannot guarantee that for
/// a given call must fail the whole batch so the caller can fall back to
/// per-item requests.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, request: &SummaryRequest) -> Result<SummaryResult, ProcessingError>;

    fn supports_batch(&self) -> bool {
        false
    }

    async fn summarize_batch(
        &self,
        requests: &[SummaryRequest],
    ) -> Result<Vec<SummaryResult>, ProcessingError> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.summarize(request).await?);
        }
        Ok(results)
    }
}

pub struct LlmSummarizer {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Shape the model must produce, mirrored by `response_schema()`.
#[derive(Debug, Deserialize, Serialize)]
struct SummaryPayload {
    summary: String,
    topics: Vec<String>,
    confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thinking: Option<String>,
}

impl LlmSummarizer {
    /// The LLM client is shared process-wide; reqwest's pool is built for
    /// concurrent use.
    pub fn new(api_base: &str, api_key: &str, timeout: Duration) -> Result<Self, ProcessingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProcessingError::Llm(format!("client construction failed: {e}")))?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn pick_model(text_len: usize) -> &'static str {
        if text_len < SMALL_MODEL_MAX_CHARS {
            SMALL_MODEL
        } else {
            LARGE_MODEL
        }
    }

    async fn chat(&self, model: &str, prompt: &str, schema: JsonValue) -> Result<String, ProcessingError> {
        let body = json!({
            "model": model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {"name": "agenda_summary", "strict": true, "schema": schema},
            },
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProcessingError::Llm(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(ProcessingError::Llm(format!(
                "llm returned {status}: {detail}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProcessingError::Llm(format!("unreadable response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProcessingError::Llm("response had no content".into()))
    }

    /// One call, one repair retry on schema violation.
    async fn call_validated<T>(
        &self,
        model: &str,
        prompt: String,
        schema: JsonValue,
        parse: impl Fn(&str) -> Result<T, String> + Send + Sync,
    ) -> Result<T, ProcessingError> {
        let first = self.chat(model, &prompt, schema.clone()).await?;
        match parse(&first) {
            Ok(value) => Ok(value),
            Err(problem) => {
                warn!(model, problem, "llm response failed validation, sending repair prompt");
                let repair = format!(
                    "{prompt}\n\nYour previous response was rejected: {problem}\n\
                     Respond again with JSON that satisfies the schema exactly.\n\
                     Previous response:\n{first}"
                );
                let second = self.chat(model, &repair, schema).await?;
                parse(&second).map_err(ProcessingError::InvalidResponse)
            }
        }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<SummaryResult, ProcessingError> {
        let model = Self::pick_model(request.text.len());
        let prompt = single_prompt(request);
        debug!(model, context = %request.context, chars = request.text.len(), "summarising");

        let payload = self
            .call_validated(model, prompt, single_schema(), validate_single)
            .await?;
        Ok(into_result(payload, model))
    }

    fn supports_batch(&self) -> bool {
        true
    }

    /// All items of one meeting in a single call. A partial or misshapen
    /// batch is all-failure by contract.
    async fn summarize_batch(
        &self,
        requests: &[SummaryRequest],
    ) -> Result<Vec<SummaryResult>, ProcessingError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let total: usize = requests.iter().map(|r| r.text.len()).sum();
        let model = Self::pick_model(total);
        let prompt = batch_prompt(requests);

        let expected = requests.len();
        let payloads = self
            .call_validated(model, prompt, batch_schema(), move |raw| {
                validate_batch(raw, expected)
            })
            .await?;
        Ok(payloads.into_iter().map(|p| into_result(p, model)).collect())
    }
}

const SYSTEM_PROMPT: &str = "You summarise municipal meeting agendas for residents. \
Write plain, concrete markdown. Name dollar amounts, addresses, and deadlines when present. \
Tag each summary with topics from the provided list only.";

fn single_prompt(request: &SummaryRequest) -> String {
    let text = clip(&request.text);
    format!(
        "Summarise the following agenda material.\n\
         Context: {}\n\
         Allowed topics: {}\n\n\
         ---\n{}\n---",
        request.context,
        taxonomy().tags().join(", "),
        text,
    )
}

fn batch_prompt(requests: &[SummaryRequest]) -> String {
    let mut prompt = format!(
        "Summarise each numbered agenda item separately. Return one result per \
         item, in the same order.\nAllowed topics: {}\n",
        taxonomy().tags().join(", ")
    );
    for (index, request) in requests.iter().enumerate() {
        prompt.push_str(&format!(
            "\n### Item {} — {}\n{}\n",
            index + 1,
            request.context,
            clip(&request.text)
        ));
    }
    prompt
}

fn clip(text: &str) -> &str {
    if text.len() <= MAX_PROMPT_CHARS {
        return text;
    }
    let mut end = MAX_PROMPT_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn summary_item_schema() -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "summary": {"type": "string", "minLength": 1},
            "topics": {
                "type": "array",
                "items": {"type": "string", "enum": taxonomy().tags()},
            },
            "confidence": {"type": "string", "enum": ["low", "medium", "high"]},
            "thinking": {"type": "string"},
        },
        "required": ["summary", "topics", "confidence"],
        "additionalProperties": false,
    })
}

fn single_schema() -> JsonValue {
    summary_item_schema()
}

fn batch_schema() -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "results": {"type": "array", "items": summary_item_schema()},
        },
        "required": ["results"],
        "additionalProperties": false,
    })
}

/// Parse and check one summary payload against the contract.
fn validate_single(raw: &str) -> Result<SummaryPayload, String> {
    let payload: SummaryPayload =
        serde_json::from_str(raw).map_err(|e| format!("not valid JSON: {e}"))?;
    check_payload(&payload)?;
    Ok(payload)
}

fn validate_batch(raw: &str, expected: usize) -> Result<Vec<SummaryPayload>, String> {
    #[derive(Deserialize)]
    struct Batch {
        results: Vec<SummaryPayload>,
    }
    let batch: Batch = serde_json::from_str(raw).map_err(|e| format!("not valid JSON: {e}"))?;
    if batch.results.len() != expected {
        return Err(format!(
            "expected {expected} results, got {}",
            batch.results.len()
        ));
    }
    for payload in &batch.results {
        check_payload(payload)?;
    }
    Ok(batch.results)
}

fn check_payload(payload: &SummaryPayload) -> Result<(), String> {
    if payload.summary.trim().is_empty() {
        return Err("summary is empty".into());
    }
    for topic in &payload.topics {
        if !taxonomy().is_canonical(topic) {
            return Err(format!("topic {topic:?} is not in the taxonomy"));
        }
    }
    Ok(())
}

fn into_result(payload: SummaryPayload, model: &str) -> SummaryResult {
    SummaryResult {
        summary: payload.summary,
        topics: taxonomy().normalize_all(&payload.topics),
        confidence: payload.confidence,
        thinking_trace: payload.thinking,
        model: model.to_string(),
    }
}
