//! Domain extraction fan-out. Four domains (`zones`, `windows`,
//! `hvac`, `dhw`) run concurrently under a global, process-wide counting
//! semaphore, each with one retry on failure.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::agent::{extract_json_object, AgentExecutor};
use crate::model::building::{ExtractionOutcome, ExtractionStatus};

const DOMAIN_TIMEOUT: Duration = Duration::from_secs(600);
const RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Default semaphore capacity gating concurrent agent invocations. Shared
/// across orientation passes and domain extractors for one evaluation.
pub const DEFAULT_SEMAPHORE_CAPACITY: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainName {
    Zones,
    Windows,
    Hvac,
    Dhw,
}

impl DomainName {
    pub const ALL: [DomainName; 4] = [DomainName::Zones, DomainName::Windows, DomainName::Hvac, DomainName::Dhw];

    pub fn as_str(self) -> &'static str {
        match self {
            DomainName::Zones => "zones",
            DomainName::Windows => "windows",
            DomainName::Hvac => "hvac",
            DomainName::Dhw => "dhw",
        }
    }

    /// Parses a CLI `--domains` entry, case-insensitive.
    pub fn parse(name: &str) -> Option<DomainName> {
        match name.trim().to_lowercase().as_str() {
            "zones" => Some(DomainName::Zones),
            "windows" => Some(DomainName::Windows),
            "hvac" => Some(DomainName::Hvac),
            "dhw" => Some(DomainName::Dhw),
            _ => None,
        }
    }

    /// Whether this domain's prompt needs the front-orientation context.
    /// Only `zones` and `windows` need to know which wall is which compass
    /// direction.
    pub fn needs_orientation_context(self) -> bool {
        matches!(self, DomainName::Zones | DomainName::Windows)
    }
}

pub struct DomainExtractionResult {
    pub domain: DomainName,
    pub status: ExtractionStatus,
    /// `None` when both attempts failed.
    pub payload: Option<serde_json::Value>,
}

fn build_prompt(domain: DomainName, doc_map_json: &str, page_instructions: &str, front_orientation: Option<f64>, instruction_pointers: &str) -> String {
    let mut prompt = format!(
        "Domain: {}\n\nDocument map:\n{}\n\nRelevant pages:\n{}\n",
        domain.as_str(),
        doc_map_json,
        page_instructions
    );
    if let Some(bearing) = front_orientation {
        // The `east` key names the building's front, not true East; `west`
        // is the back, `north` the left side (front - 90deg), `south` the
        // right side (front + 90deg). This is an input to the extractor,
        // not something it should "correct".
        prompt.push_str(&format!(
            "\nFront-orientation context (front bearing = {bearing:.1}): east=front, west=back, north=front-90, south=front+90.\n"
        ));
    }
    prompt.push_str(&format!("\nInstruction files:\n{instruction_pointers}\n"));
    prompt
}

async fn extract_with_retry(
    executor: &dyn AgentExecutor,
    semaphore: &Semaphore,
    domain: DomainName,
    prompt: &str,
) -> DomainExtractionResult {
    let attempt = |retry_count: u32| {
        let prompt = prompt.to_string();
        async move {
            let _permit = semaphore.acquire().await.expect("semaphore closed");
            let reply = executor.run(domain.as_str(), &prompt, DOMAIN_TIMEOUT).await?;
            let json = extract_json_object(&reply)?;
            Ok::<_, crate::error::Error>((json, retry_count))
        }
    };

    match attempt(0).await {
        Ok((json, retry_count)) => success_result(domain, json, retry_count),
        Err(first_error) => {
            warn!(domain = domain.as_str(), error = %first_error, "first attempt failed, retrying after backoff");
            tokio::time::sleep(RETRY_BACKOFF).await;
            match attempt(1).await {
                Ok((json, retry_count)) => success_result(domain, json, retry_count),
                Err(second_error) => {
                    warn!(domain = domain.as_str(), error = %second_error, "retry failed");
                    DomainExtractionResult {
                        domain,
                        status: ExtractionStatus {
                            status: ExtractionOutcome::Failed,
                            retry_count: 1,
                            item_count: None,
                            error: Some(second_error.to_string()),
                        },
                        payload: None,
                    }
                }
            }
        }
    }
}

fn success_result(domain: DomainName, json: serde_json::Value, retry_count: u32) -> DomainExtractionResult {
    let item_count = item_count_of(&json);
    info!(domain = domain.as_str(), retry_count, item_count, "domain extraction succeeded");
    DomainExtractionResult {
        domain,
        status: ExtractionStatus {
            status: ExtractionOutcome::Success,
            retry_count,
            item_count: Some(item_count),
            error: None,
        },
        payload: Some(json),
    }
}

fn item_count_of(json: &serde_json::Value) -> u32 {
    match json {
        serde_json::Value::Array(items) => items.len() as u32,
        serde_json::Value::Object(map) => map
            .values()
            .map(|v| if let serde_json::Value::Array(a) = v { a.len() as u32 } else { 0 })
            .sum(),
        _ => 0,
    }
}

/// Per-domain prompt inputs, assembled by the caller from the document map
/// and page router output.
pub struct DomainPromptInputs<'a> {
    pub doc_map_json: &'a str,
    pub page_instructions: &'a str,
    pub instruction_pointers: &'a str,
}

/// Launches the selected domains concurrently under `semaphore` — the same
/// process-wide bound shared with discovery and both orientation passes
/// for this evaluation, so the surplus above its capacity queues rather
/// than spawning unbounded agent processes. An empty `selected` runs all
/// four — the CLI's default when `--domains` is not passed. Partial
/// failure is not fatal — the caller merges whatever succeeded.
pub async fn fan_out<'a>(
    executor: &dyn AgentExecutor,
    semaphore: &Arc<Semaphore>,
    inputs: impl Fn(DomainName) -> DomainPromptInputs<'a>,
    front_orientation: Option<f64>,
    selected: &[DomainName],
) -> Vec<DomainExtractionResult> {
    let domains: Vec<DomainName> = if selected.is_empty() { DomainName::ALL.to_vec() } else { selected.to_vec() };

    let futures = domains.into_iter().map(|domain| {
        let semaphore = Arc::clone(semaphore);
        let input = inputs(domain);
        let orientation = if domain.needs_orientation_context() {
            front_orientation
        } else {
            None
        };
        let prompt = build_prompt(domain, input.doc_map_json, input.page_instructions, orientation, input.instruction_pointers);
        async move { extract_with_retry(executor, &semaphore, domain, &prompt).await }
    });

    futures::future::join_all(futures).await
}
