//! Discovery. A single invocation of an external LLM agent classifies
//! every page of every source PDF into type + subtype + content tags;
//! cached by `cache_version`.

use std::path::Path;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::agent::{extract_json_object, AgentExecutor};
use crate::error::{Error, Result};
use crate::model::document::{DocumentMap, SourcePdf};

pub const CURRENT_CACHE_VERSION: u32 = 1;
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(300);

/// Per-PDF page range passed to the agent along with the global↔local
/// page-numbering rule.
pub struct PageRange {
    pub filename: String,
    pub page_count: u32,
}

fn build_prompt(sources: &[PageRange]) -> String {
    let mut prompt = String::from(
        "Classify every page of the following source PDFs into a DocumentMap. \
         Page numbers are global across all PDFs and 1-indexed; each PDF also has \
         a local 1-indexed page number within itself.\n\n",
    );
    for source in sources {
        prompt.push_str(&format!("- {} ({} pages)\n", source.filename, source.page_count));
    }
    prompt
}

/// Runs discovery: loads the cache if its version is current enough,
/// otherwise invokes the agent once and persists the result. No retry —
/// a failed or invalid agent reply is fatal to the evaluation. `semaphore`
/// is the same process-wide bound shared with orientation and domain
/// fan-out — every agent invocation for one evaluation goes through it.
pub async fn discover(
    executor: &dyn AgentExecutor,
    semaphore: &Semaphore,
    sources: &[PageRange],
    cache_path: &Path,
) -> Result<DocumentMap> {
    if let Some(cached) = try_load_cache(cache_path)? {
        if cached.cache_version >= CURRENT_CACHE_VERSION {
            info!(cache_version = cached.cache_version, "discovery cache hit");
            return Ok(cached);
        }
        warn!(
            found = cached.cache_version,
            current = CURRENT_CACHE_VERSION,
            "discovery cache is stale, rebuilding"
        );
    }

    let prompt = build_prompt(sources);
    let _permit = semaphore.acquire().await.expect("semaphore closed");
    let reply = executor
        .run("discovery", &prompt, DISCOVERY_TIMEOUT)
        .await
        .map_err(|e| Error::DiscoveryFailed(e.to_string()))?;

    let json = extract_json_object(&reply).map_err(|e| Error::DiscoveryFailed(e.to_string()))?;
    let mut map: DocumentMap =
        serde_json::from_value(json).map_err(|e| Error::DiscoveryFailed(format!("invalid DocumentMap: {e}")))?;

    if map.cache_version == 0 {
        map.cache_version = CURRENT_CACHE_VERSION;
    }

    if !map.validate_page_numbering() {
        return Err(Error::DiscoveryFailed(
            "DocumentMap page numbering invariant violated".into(),
        ));
    }

    write_cache(cache_path, &map)?;
    Ok(map)
}

fn try_load_cache(cache_path: &Path) -> Result<Option<DocumentMap>> {
    if !cache_path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(cache_path)?;
    let map: DocumentMap = serde_json::from_str(&text)
        .map_err(|e| Error::InvalidCache(format!("{}: {e}", cache_path.display())))?;
    Ok(Some(map))
}

fn write_cache(cache_path: &Path, map: &DocumentMap) -> Result<()> {
    if let Some(parent) = cache_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(map)?;
    std::fs::write(cache_path, text)?;
    Ok(())
}

/// Builds the `source_pdfs` portion of the discovery prompt's context from
/// filesystem-discovered PDFs, enumerating every evaluation's source PDFs
/// up front before any agent call is made.
pub fn enumerate_sources(pdf_paths: &[std::path::PathBuf]) -> Vec<SourcePdf> {
    pdf_paths
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .map(|filename| SourcePdf { filename, page_count: 0 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::FixedReplyExecutor;
    use crate::model::document::{Confidence, PageInfo, PageOrigin, PageType};
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn sample_map() -> DocumentMap {
        DocumentMap {
            cache_version: 1,
            total_pages: 1,
            pages: vec![PageInfo {
                page_number: 1,
                origin: PageOrigin {
                    source_pdf: "plans.pdf".into(),
                    local_page_number: 1,
                },
                page_type: PageType::Drawing,
                subtype: None,
                tags: vec![],
                confidence: Confidence::High,
                description: String::new(),
            }],
            source_pdfs: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_discovery_calls_agent_when_no_cache() {
        let dir = tempdir().unwrap();
        let cache_path = dir.path().join("discovery.json");
        let reply = serde_json::to_string(&sample_map()).unwrap();
        let executor = FixedReplyExecutor::ok(reply);
        let sources = vec![PageRange { filename: "plans.pdf".into(), page_count: 1 }];

        let map = discover(&executor, &Semaphore::new(3), &sources, &cache_path).await.unwrap();
        assert_eq!(map.total_pages, 1);
        assert!(cache_path.exists());
    }

    #[tokio::test]
    async fn test_discovery_uses_cache_without_calling_agent() {
        let dir = tempdir().unwrap();
        let cache_path = dir.path().join("discovery.json");
        std::fs::write(&cache_path, serde_json::to_string(&sample_map()).unwrap()).unwrap();

        let executor = FixedReplyExecutor::err("should not be called");
        let sources = vec![PageRange { filename: "plans.pdf".into(), page_count: 1 }];

        let map = discover(&executor, &Semaphore::new(3), &sources, &cache_path).await.unwrap();
        assert_eq!(map.total_pages, 1);
    }

    #[tokio::test]
    async fn test_discovery_fails_fatally_on_agent_error() {
        let dir = tempdir().unwrap();
        let cache_path = dir.path().join("discovery.json");
        let executor = FixedReplyExecutor::err("agent crashed");
        let sources = vec![PageRange { filename: "plans.pdf".into(), page_count: 1 }];

        let err = discover(&executor, &Semaphore::new(3), &sources, &cache_path).await.unwrap_err();
        assert!(matches!(err, Error::DiscoveryFailed(_)));
    }

    #[tokio::test]
    async fn test_discovery_fails_on_invalid_page_numbering() {
        let dir = tempdir().unwrap();
        let cache_path = dir.path().join("discovery.json");
        let mut bad_map = sample_map();
        bad_map.total_pages = 5;
        let reply = serde_json::to_string(&bad_map).unwrap();
        let executor = FixedReplyExecutor::ok(reply);
        let sources = vec![PageRange { filename: "plans.pdf".into(), page_count: 5 }];

        let err = discover(&executor, &Semaphore::new(3), &sources, &cache_path).await.unwrap_err();
        assert!(matches!(err, Error::DiscoveryFailed(_)));
    }
}
