//! The orchestrator. Sequences discovery, orientation fusion, project
//! extraction, domain fan-out, and merge into one evaluation run, timing
//! every stage.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::agent::{extract_json_object, AgentExecutor};
use crate::cv::compute_cv_hints;
use crate::cv::detectors::{ContourDetector, LineDetector};
use crate::cv::geometry::RasterDims;
use crate::discovery::{self, PageRange};
use crate::error::{Error, Result};
use crate::extraction;
use crate::merge;
use crate::model::building::{BuildingSpec, ExtractionStatus};
use crate::model::cv::{CvHints, NorthArrowResult};
use crate::model::document::DocumentMap;
use crate::model::orientation::OrientationVerification;
use crate::model::takeoff::ProjectInfo;
use crate::orientation;
use crate::router::{self, Domain};

const PROJECT_TIMEOUT: Duration = Duration::from_secs(600);

/// Per-stage wall-clock plus total. The concurrent
/// orientation/project branch reports one figure — `tokio::join!` already
/// drives both futures to completion on a single await, so its elapsed
/// time is the max of the two, not their sum.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Timing {
    pub discovery_ms: u64,
    pub orientation_and_project_ms: u64,
    pub domain_fanout_ms: u64,
    pub merge_ms: u64,
    pub total_ms: u64,
}

/// Everything one call to [`run_extraction`] needs beyond the executor and
/// CV detectors — the PDF rasterizer, the agent process, and the image
/// primitives all live outside this crate and are supplied by the caller.
pub struct RunConfig<'a> {
    pub eval_id: &'a str,
    pub eval_dir: &'a Path,
    pub semaphore_capacity: usize,
    /// Raster dimensions of the orientation site-plan page, as produced by
    /// the external rasterizer.
    pub page_dims: RasterDims,
    pub instruction_pointers: &'a str,
    /// Domains to run in the extraction fan-out; empty runs all four.
    pub domains: &'a [extraction::DomainName],
}

/// Always returned, even on a fatal failure — per SPEC_FULL §D.1, "pick
/// the richest superset": a full `Timing` block (rather than just
/// `{total}`) and, when a `BuildingSpec` is produced at all, its
/// `extraction_status`/`conflicts` are always populated rather than left
/// at merge's empty defaults.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub eval_id: String,
    pub building_spec: Option<BuildingSpec>,
    pub document_map: Option<DocumentMap>,
    pub orientation: Option<OrientationVerification>,
    pub timing: Timing,
    pub error: Option<String>,
}

fn fatal(eval_id: &str, error: Error, mut timing: Timing, total_start: Instant) -> RunOutcome {
    timing.total_ms = total_start.elapsed().as_millis() as u64;
    warn!(eval_id, error = %error, "evaluation aborted");
    RunOutcome {
        eval_id: eval_id.to_string(),
        building_spec: None,
        document_map: None,
        orientation: None,
        timing,
        error: Some(error.to_string()),
    }
}

/// Runs the full extraction sequence for one evaluation:
/// enumerate PDFs, discover page structure, fuse orientation while
/// extracting project info, fan out to the four domain extractors,
/// merge twice, and transform to the canonical `BuildingSpec`.
pub async fn run_extraction(
    executor: &dyn AgentExecutor,
    lines: &dyn LineDetector,
    contours: &dyn ContourDetector,
    config: &RunConfig<'_>,
) -> RunOutcome {
    let total_start = Instant::now();
    let mut timing = Timing::default();

    // One process-wide semaphore for the whole evaluation: discovery, both
    // orientation passes, project extraction, and the four-domain fan-out
    // all acquire from this same instance, per spec §5's "shared across all
    // domains and both orientation passes for one evaluation."
    let semaphore = Arc::new(Semaphore::new(config.semaphore_capacity.max(1)));

    let sources = match enumerate_pdf_sources(config.eval_dir) {
        Ok(sources) if !sources.is_empty() => sources,
        Ok(_) => return fatal(config.eval_id, Error::NoSourcePdfs(config.eval_id.to_string()), timing, total_start),
        Err(e) => return fatal(config.eval_id, e, timing, total_start),
    };

    let discovery_start = Instant::now();
    let cache_path = config.eval_dir.join(".cache").join(format!("{}_discovery.json", config.eval_id));
    let doc_map = match discovery::discover(executor, &semaphore, &sources, &cache_path).await {
        Ok(map) => map,
        Err(e) => {
            timing.discovery_ms = discovery_start.elapsed().as_millis() as u64;
            return fatal(config.eval_id, e, timing, total_start);
        }
    };
    timing.discovery_ms = discovery_start.elapsed().as_millis() as u64;

    let branch_start = Instant::now();
    let (orientation_verification, project_result) = tokio::join!(
        run_orientation_stage(executor, &semaphore, lines, contours, &doc_map, config.eval_dir, config.page_dims),
        run_project_extraction(executor, &semaphore, &doc_map),
    );
    timing.orientation_and_project_ms = branch_start.elapsed().as_millis() as u64;

    let mut project = match project_result {
        Ok(project) => project,
        Err(e) => return fatal(config.eval_id, e, timing, total_start),
    };
    project.orientation = Some(orientation_verification.final_bearing);

    let fanout_start = Instant::now();
    let doc_map_json = serde_json::to_string(&doc_map).unwrap_or_default();
    let page_instructions: Vec<(extraction::DomainName, String)> = extraction::DomainName::ALL
        .into_iter()
        .map(|domain| {
            let pages = router::route(&doc_map, router_domain_for(domain)).unwrap_or_default();
            (domain, format!("pages: {pages:?}"))
        })
        .collect();

    let results = extraction::fan_out(
        executor,
        &semaphore,
        |domain| extraction::DomainPromptInputs {
            doc_map_json: &doc_map_json,
            page_instructions: page_instructions
                .iter()
                .find(|(d, _)| *d == domain)
                .map(|(_, s)| s.as_str())
                .unwrap_or(""),
            instruction_pointers: config.instruction_pointers,
        },
        Some(orientation_verification.final_bearing),
        config.domains,
    )
    .await;
    timing.domain_fanout_ms = fanout_start.elapsed().as_millis() as u64;

    let merge_start = Instant::now();
    let payloads = parse_domain_payloads(&results);
    let extraction_status = extraction_status_map(&results);
    let (takeoff, conflicts) = merge::build_takeoff(project, &payloads);

    let mut building = merge::transform(&takeoff);
    building.extraction_status = extraction_status;
    building.conflicts = conflicts;
    timing.merge_ms = merge_start.elapsed().as_millis() as u64;

    timing.total_ms = total_start.elapsed().as_millis() as u64;
    info!(eval_id = config.eval_id, total_ms = timing.total_ms, "evaluation completed");

    RunOutcome {
        eval_id: config.eval_id.to_string(),
        building_spec: Some(building),
        document_map: Some(doc_map),
        orientation: Some(orientation_verification),
        timing,
        error: None,
    }
}

fn router_domain_for(domain: extraction::DomainName) -> Domain {
    match domain {
        extraction::DomainName::Zones => Domain::Zones,
        extraction::DomainName::Windows => Domain::Windows,
        extraction::DomainName::Hvac => Domain::Hvac,
        extraction::DomainName::Dhw => Domain::Dhw,
    }
}

/// Resolves the site-plan page for orientation (via the page router),
/// maps it back to its preprocessed raster path, and computes CV hints.
/// Falls back to an empty `CvHints` block when no orientation page is
/// routable — orientation reconciliation still runs and degrades
/// gracefully/§7.
fn compute_orientation_cv_hints(
    doc_map: &DocumentMap,
    eval_dir: &Path,
    dims: RasterDims,
    lines: &dyn LineDetector,
    contours: &dyn ContourDetector,
) -> CvHints {
    let empty = CvHints { north_arrow: NorthArrowResult::none(), wall_edges: Vec::new(), rotation: None };

    let Ok(pages) = router::route(doc_map, Domain::Orientation) else { return empty };
    let Some(&first_page) = pages.first() else { return empty };
    let Some(page) = doc_map.page(first_page) else { return empty };

    let stem = Path::new(&page.origin.source_pdf)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let page_path = eval_dir
        .join("preprocessed")
        .join(&stem)
        .join(format!("page-{:03}.png", page.origin.local_page_number));

    compute_cv_hints(&page_path.to_string_lossy(), dims, lines, contours)
}

async fn run_orientation_stage(
    executor: &dyn AgentExecutor,
    semaphore: &Semaphore,
    lines: &dyn LineDetector,
    contours: &dyn ContourDetector,
    doc_map: &DocumentMap,
    eval_dir: &Path,
    dims: RasterDims,
) -> OrientationVerification {
    let cv_hints = compute_orientation_cv_hints(doc_map, eval_dir, dims, lines, contours);
    let (p1, p2) = orientation::run_both_passes(executor, semaphore, &cv_hints).await;
    orientation::reconcile(&p1, &p2)
}

/// Project-info extraction: a single agent call outside the four-domain
/// fan-out, scoped to schedule/CBECC/energy-summary pages.
async fn run_project_extraction(executor: &dyn AgentExecutor, semaphore: &Semaphore, doc_map: &DocumentMap) -> Result<ProjectInfo> {
    let pages = router::route(doc_map, Domain::Project).unwrap_or_default();
    let doc_map_json = serde_json::to_string(doc_map).unwrap_or_default();
    let prompt = format!(
        "Extract project information from the relevant pages.\n\n\
         Document map:\n{doc_map_json}\n\nRelevant pages: {pages:?}\n\n\
         Reply as JSON: {{\"project\": {{\"identity\": ..., \"location\": ..., \
         \"climate_zone\": ..., \"fuel_type\": ..., \"house_type\": ..., \"stories\": ..., \
         \"bedrooms\": ..., \"conditioned_floor_area\": ..., \"envelope_area\": ...}}, \"notes\": \"...\"}}"
    );

    let _permit = semaphore.acquire().await.expect("semaphore closed");
    let reply = executor
        .run("project-extractor", &prompt, PROJECT_TIMEOUT)
        .await
        .map_err(|e| Error::ProjectInfoFailed(e.to_string()))?;

    let json = extract_json_object(&reply).map_err(|e| Error::ProjectInfoFailed(e.to_string()))?;
    let project_value = json
        .get("project")
        .cloned()
        .ok_or_else(|| Error::ProjectInfoFailed("reply missing 'project' key".to_string()))?;

    serde_json::from_value(project_value).map_err(|e| Error::ProjectInfoFailed(format!("invalid ProjectInfo: {e}")))
}

/// Converts whatever domain extraction returned into typed merge payloads.
/// A domain whose JSON doesn't parse into its expected shape is treated
/// the same as a missing payload — `merge::build_takeoff` already handles
/// `None` by contributing nothing from that domain.
fn parse_domain_payloads(results: &[extraction::DomainExtractionResult]) -> merge::DomainPayloads {
    let mut payloads = merge::DomainPayloads::default();

    for result in results {
        let Some(json) = &result.payload else { continue };
        match result.domain {
            extraction::DomainName::Zones => {
                payloads.zones = serde_json::from_value(json.clone()).ok();
            }
            extraction::DomainName::Windows => {
                payloads.windows = parse_windows_payload(json);
            }
            extraction::DomainName::Hvac => {
                payloads.hvac = serde_json::from_value(json.clone()).ok();
            }
            extraction::DomainName::Dhw => {
                payloads.dhw = serde_json::from_value(json.clone()).ok();
            }
        }
    }

    payloads
}

/// Distinguishes the preferred nested windows form (`walls: [...]`) from
/// the legacy flat form (`windows: [...]`) by which top-level key the
/// reply carries.
fn parse_windows_payload(json: &serde_json::Value) -> Option<merge::WindowsPayload> {
    if let Some(walls) = json.get("walls") {
        serde_json::from_value(walls.clone()).ok().map(merge::WindowsPayload::Nested)
    } else if let Some(windows) = json.get("windows") {
        serde_json::from_value(windows.clone()).ok().map(merge::WindowsPayload::Flat)
    } else {
        None
    }
}

/// Builds per-domain `ExtractionStatus` directly from fan-out results rather
/// than from whatever made it into the typed `TakeoffSpec`. Both are pure
/// CPU so there is no suspension to actually run concurrently — what
/// matters is that this path doesn't depend on the other one parsing
/// successfully.
fn extraction_status_map(results: &[extraction::DomainExtractionResult]) -> HashMap<String, ExtractionStatus> {
    results.iter().map(|r| (r.domain.as_str().to_string(), r.status.clone())).collect()
}

fn enumerate_pdf_sources(eval_dir: &Path) -> Result<Vec<PageRange>> {
    let mut sources = Vec::new();
    for entry in std::fs::read_dir(eval_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.extension().map(|e| e.eq_ignore_ascii_case("pdf")).unwrap_or(false) {
            continue;
        }
        let filename = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let page_count = count_preprocessed_pages(eval_dir, &stem);
        sources.push(PageRange { filename, page_count });
    }
    sources.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(sources)
}

/// Page count per source PDF comes from counting its preprocessed raster
/// pages, not from reading the PDF itself — the rasterizer that produced
/// `preprocessed/<stem>/page-NNN.png` is the only thing that knows PDF
/// structure, and it is out of this crate's scope.
fn count_preprocessed_pages(eval_dir: &Path, stem: &str) -> u32 {
    let dir = eval_dir.join("preprocessed").join(stem);
    std::fs::read_dir(&dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().map(|x| x.eq_ignore_ascii_case("png")).unwrap_or(false))
                .count() as u32
        })
        .unwrap_or(0)
}
