//! The CLI surface: `extract`, `verify`, `improve`, each with `one`/`all`
//! (or `rollback`) subcommands. Glue only — argument parsing and wiring the
//! library's stage functions together; every actual behavior lives in the
//! modules this dispatches to.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};

use crate::agent::ProcessAgentExecutor;
use crate::config::{self, FieldMappingConfig, Manifest};
use crate::cv::detectors::{Contour, ContourDetector, LineDetector};
use crate::cv::geometry::{LineSegment, RasterDims, Rect};
use crate::error::Result;
use crate::extraction::{DomainName, DEFAULT_SEMAPHORE_CAPACITY};
use crate::improve::{self, EvalSnapshot};
use crate::model::value::Value;
use crate::orchestrator::{self, RunConfig, RunOutcome};
use crate::store::{self, IterationStore};
use crate::verify;

#[derive(Parser)]
#[command(name = "takeoff")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Title-24 takeoff extraction, verification, and improvement loop", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Root directory holding `evals/<eval_id>/...`.
    #[arg(long, global = true, default_value = "evals")]
    pub evals_root: PathBuf,

    /// Path to the field-mapping config (csv_to_json, tolerances, ...).
    #[arg(long, global = true, default_value = "field_mapping.toml")]
    pub field_mapping: PathBuf,

    /// Command used to invoke the external agent executor.
    #[arg(long, global = true, default_value = "agent-runner")]
    pub agent_command: String,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the extraction orchestrator.
    Extract(ExtractArgs),
    /// Run the field-level verifier against ground truth.
    Verify(VerifyArgs),
    /// Run or roll back one improvement-loop iteration.
    Improve(ImproveArgs),
}

#[derive(Args)]
pub struct ExtractArgs {
    #[command(subcommand)]
    pub target: ExtractTarget,

    /// Restrict the extraction fan-out to these domains (zones, windows,
    /// hvac, dhw); omit to run all four.
    #[arg(long, value_delimiter = ',')]
    pub domains: Vec<String>,

    /// Process-wide semaphore capacity bounding concurrent agent calls.
    #[arg(long, default_value_t = DEFAULT_SEMAPHORE_CAPACITY)]
    pub workers: usize,

    /// Re-run even if a cached discovery / prior iteration already exists.
    #[arg(long)]
    pub force: bool,

    /// Skip evaluations that already have at least one saved iteration.
    #[arg(long)]
    pub skip_existing: bool,
}

#[derive(Subcommand)]
pub enum ExtractTarget {
    /// Run extraction for a single evaluation.
    One {
        eval_id: String,
    },
    /// Run extraction for every evaluation in the manifest.
    All,
}

#[derive(Args)]
pub struct VerifyArgs {
    #[command(subcommand)]
    pub target: VerifyTarget,

    /// Persist an iteration directory via the iteration store.
    #[arg(long)]
    pub save: bool,
}

#[derive(Subcommand)]
pub enum VerifyTarget {
    /// Verify one evaluation's already-extracted record against its
    /// ground-truth CSV.
    One { eval_id: String, extracted_json: PathBuf },
    /// Verify every evaluation's latest extracted record.
    All,
}

#[derive(Args)]
pub struct ImproveArgs {
    #[command(subcommand)]
    pub target: ImproveTarget,
}

#[derive(Subcommand)]
pub enum ImproveTarget {
    /// Run one improvement iteration.
    One {
        /// Accept the critic's proposal without an interactive review.
        #[arg(long)]
        auto: bool,
        /// Scope the critic's analysis to one agent's instruction files.
        #[arg(long)]
        focus: Option<String>,
        /// Skip re-running extraction/verification after applying the change.
        #[arg(long)]
        skip_extraction: bool,
    },
    /// Restore instruction files from an iteration's snapshots.
    Rollback {
        iteration: u32,
        /// Root directory holding the instruction files to restore.
        #[arg(long, default_value = "instructions")]
        instructions_root: PathBuf,
    },
}

/// Dispatches a parsed [`Cli`] to the matching stage. Returns a process
/// exit code: 0 on success, non-zero if the evaluation or iteration
/// failed.
pub async fn run(cli: Cli) -> i32 {
    match cli.command {
        Command::Extract(args) => run_extract(&cli, args).await,
        Command::Verify(args) => run_verify(&cli, args).await,
        Command::Improve(args) => run_improve(&cli, args).await,
    }
}

fn manifest_eval_ids(cli: &Cli) -> Result<Vec<String>> {
    let manifest: Manifest = config::load_manifest(&cli.evals_root.join("manifest.yaml"))?;
    Ok(manifest.eval_ids())
}

async fn run_extract(cli: &Cli, args: ExtractArgs) -> i32 {
    let eval_ids = match &args.target {
        ExtractTarget::One { eval_id } => vec![eval_id.clone()],
        ExtractTarget::All => match manifest_eval_ids(cli) {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "failed to load manifest");
                return 1;
            }
        },
    };

    let executor = ProcessAgentExecutor::new(cli.agent_command.clone());
    let lines = NullLineDetector;
    let contours = NullContourDetector;
    let store = IterationStore::new(&cli.evals_root);

    let domains: Vec<DomainName> = args
        .domains
        .iter()
        .filter_map(|name| match DomainName::parse(name) {
            Some(d) => Some(d),
            None => {
                warn!(domain = name.as_str(), "unrecognized --domains entry, ignoring");
                None
            }
        })
        .collect();

    let mut failures = 0;
    for eval_id in eval_ids {
        if args.skip_existing && !args.force {
            if let Ok(Some(_)) = store.latest_iteration(&eval_id) {
                info!(eval_id, "skipping: iteration already exists");
                continue;
            }
        }

        let eval_dir = cli.evals_root.join(&eval_id);
        let config = RunConfig {
            eval_id: &eval_id,
            eval_dir: &eval_dir,
            semaphore_capacity: args.workers,
            page_dims: RasterDims { width: 2550, height: 3300 },
            instruction_pointers: "instructions/",
            domains: &domains,
        };

        let outcome = orchestrator::run_extraction(&executor, &lines, &contours, &config).await;
        if let Err(e) = save_extraction(&store, &eval_id, &outcome) {
            error!(eval_id, error = %e, "failed to persist extraction output");
            failures += 1;
            continue;
        }
        if outcome.error.is_some() {
            failures += 1;
        }
        report_outcome(&outcome);
    }

    if failures > 0 {
        1
    } else {
        0
    }
}

/// Writes the raw `BuildingSpec` (or the error record) to
/// `<eval>/results/latest-extracted.json`, separate from the iteration
/// store proper — `verify` reads this path by default, and `improve`
/// re-running extraction produces a fresh one each pass.
fn save_extraction(store: &IterationStore, eval_id: &str, outcome: &RunOutcome) -> Result<()> {
    let path = store.results_dir(eval_id).join("latest-extracted.json");
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let body = match &outcome.building_spec {
        Some(spec) => serde_json::to_value(spec)?,
        None => serde_json::json!({ "error": outcome.error }),
    };
    std::fs::write(&path, serde_json::to_string_pretty(&body)?)?;
    Ok(())
}

fn report_outcome(outcome: &RunOutcome) {
    match &outcome.error {
        Some(msg) => warn!(eval_id = outcome.eval_id, error = msg, total_ms = outcome.timing.total_ms, "evaluation failed"),
        None => info!(eval_id = outcome.eval_id, total_ms = outcome.timing.total_ms, "evaluation succeeded"),
    }
}

async fn run_verify(cli: &Cli, args: VerifyArgs) -> i32 {
    let mapping = match config::load_field_mapping(&cli.field_mapping) {
        Ok(m) => m,
        Err(e) => {
            error!(error = %e, "failed to load field-mapping config");
            return 1;
        }
    };

    let store = IterationStore::new(&cli.evals_root);

    let targets: Vec<(String, Option<PathBuf>)> = match args.target {
        VerifyTarget::One { eval_id, extracted_json } => vec![(eval_id, Some(extracted_json))],
        VerifyTarget::All => match manifest_eval_ids(cli) {
            Ok(ids) => ids.into_iter().map(|id| (id, None)).collect(),
            Err(e) => {
                error!(error = %e, "failed to load manifest");
                return 1;
            }
        },
    };

    let mut failures = 0;
    let mut per_eval_metrics = Vec::new();

    for (eval_id, extracted_path) in targets {
        let extracted_path = extracted_path.unwrap_or_else(|| store.results_dir(&eval_id).join("latest-extracted.json"));
        match verify_one(cli, &mapping, &store, &eval_id, &extracted_path, args.save) {
            Ok(metrics) => {
                info!(eval_id, f1 = metrics.f1, precision = metrics.precision, recall = metrics.recall, "verification complete");
                per_eval_metrics.push(metrics);
            }
            Err(e) => {
                error!(eval_id, error = %e, "verification failed");
                failures += 1;
            }
        }
    }

    if per_eval_metrics.len() > 1 {
        let agg = verify::aggregate_metrics(&per_eval_metrics);
        info!(macro_f1 = agg.macro_f1, micro_f1 = agg.micro_f1, num_evals = agg.num_evals, "aggregate across evaluations");
    }

    if failures > 0 {
        1
    } else {
        0
    }
}

fn verify_one(
    cli: &Cli,
    mapping: &FieldMappingConfig,
    store: &IterationStore,
    eval_id: &str,
    extracted_path: &Path,
    save: bool,
) -> Result<crate::model::iteration::MetricsBlock> {
    let gt_path = cli.evals_root.join(eval_id).join("ground_truth.csv");
    let ground_truth = config::parse_ground_truth_csv(&gt_path, mapping)?;

    let extracted_text = std::fs::read_to_string(extracted_path)?;
    let extracted_json: serde_json::Value = serde_json::from_str(&extracted_text)?;
    let extracted: Value = extracted_json.clone().into();

    let tolerances = mapping.to_tolerance_config();
    let discrepancies = verify::discrepancies(&ground_truth, &extracted, &tolerances);
    let total_fields_gt = verify::leaf_count(&ground_truth) as u32;
    let metrics = verify::compute_metrics(&discrepancies, total_fields_gt);

    if save {
        let iteration = store.next_iteration(eval_id)?;
        let result = store::build_result(iteration, metrics, discrepancies);
        store.save_iteration(eval_id, &extracted_json, &result)?;
    }

    Ok(metrics)
}

async fn run_improve(cli: &Cli, args: ImproveArgs) -> i32 {
    match args.target {
        ImproveTarget::One { auto, focus, skip_extraction } => run_improve_one(cli, auto, focus.as_deref(), skip_extraction).await,
        ImproveTarget::Rollback { iteration, instructions_root } => run_rollback(cli, iteration, &instructions_root),
    }
}

async fn run_improve_one(cli: &Cli, auto: bool, focus: Option<&str>, skip_extraction: bool) -> i32 {
    let store = IterationStore::new(&cli.evals_root);
    let eval_ids = match manifest_eval_ids(cli) {
        Ok(ids) => ids,
        Err(e) => {
            error!(error = %e, "failed to load manifest");
            return 1;
        }
    };

    let snapshots: Vec<EvalSnapshot> = eval_ids
        .iter()
        .filter_map(|eval_id| {
            let latest = store.latest_iteration(eval_id).ok().flatten()?;
            let result = store.load_iteration(eval_id, latest).ok().flatten()?;
            Some(EvalSnapshot {
                f1: result.metrics.f1,
                precision: result.metrics.precision,
                recall: result.metrics.recall,
                discrepancies: result.discrepancies,
            })
        })
        .collect();

    if snapshots.is_empty() {
        error!("no prior iterations found; run `extract` and `verify --save` first");
        return 1;
    }

    let before_f1 = snapshots.iter().map(|s| s.f1).sum::<f64>() / snapshots.len() as f64;
    let analysis = improve::aggregate_failure_analysis(&snapshots);

    let executor = ProcessAgentExecutor::new(cli.agent_command.clone());
    let proposal = match improve::invoke_critic(&executor, &analysis, focus).await {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "critic invocation failed");
            return 1;
        }
    };

    if !auto {
        info!(
            target_file = proposal.target_file,
            hypothesis = proposal.hypothesis,
            "proposal ready for review (pass --auto to accept without prompting)"
        );
        return 0;
    }

    let target_path = PathBuf::from(&proposal.target_file);
    let current_content = match std::fs::read_to_string(&target_path) {
        Ok(c) => c,
        Err(e) => {
            error!(path = %target_path.display(), error = %e, "failed to read instruction file");
            return 1;
        }
    };

    let (old_version, _new_version, new_content) = match improve::apply_proposal(&proposal, &current_content) {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "failed to apply proposal");
            return 1;
        }
    };

    let agent_name = target_path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    for eval_id in &eval_ids {
        let iteration = match store.next_iteration(eval_id) {
            Ok(n) => n,
            Err(e) => {
                error!(eval_id, error = %e, "failed to compute next iteration");
                return 1;
            }
        };
        if let Err(e) = store.save_instruction_snapshot(eval_id, iteration, &agent_name, &target_path, &old_version) {
            error!(eval_id, error = %e, "failed to snapshot instruction file");
            return 1;
        }
    }

    if let Err(e) = std::fs::write(&target_path, &new_content) {
        error!(path = %target_path.display(), error = %e, "failed to write updated instruction file");
        return 1;
    }

    info!(target_file = proposal.target_file, before_f1, "applied instruction proposal");

    if skip_extraction {
        return 0;
    }

    info!("re-running extraction and verification across all evaluations");
    let extract_args = ExtractArgs {
        target: ExtractTarget::All,
        domains: Vec::new(),
        workers: DEFAULT_SEMAPHORE_CAPACITY,
        force: true,
        skip_existing: false,
    };
    let extract_code = run_extract(cli, extract_args).await;

    let verify_args = VerifyArgs { target: VerifyTarget::All, save: true };
    let verify_code = run_verify(cli, verify_args).await;

    if extract_code != 0 || verify_code != 0 {
        1
    } else {
        0
    }
}

fn run_rollback(cli: &Cli, iteration: u32, instructions_root: &Path) -> i32 {
    let store = IterationStore::new(&cli.evals_root);
    let eval_ids = match manifest_eval_ids(cli) {
        Ok(ids) => ids,
        Err(e) => {
            error!(error = %e, "failed to load manifest");
            return 1;
        }
    };

    let mut failures = 0;
    for eval_id in eval_ids {
        let instructions_root = instructions_root.to_path_buf();
        let result = store.rollback(&eval_id, iteration, move |key| {
            let (agent, stem) = key.split_once('/')?;
            Some(instructions_root.join(agent).join(format!("{stem}.md")))
        });
        match result {
            Ok(restored) => info!(eval_id, iteration, count = restored.len(), "rollback complete"),
            Err(e) => {
                error!(eval_id, iteration, error = %e, "rollback failed");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        1
    } else {
        0
    }
}

/// Stand-in for a real line-detection backend: detects nothing, so CV hints
/// degrade gracefully to "none" confidence rather than crash. A real
/// deployment swaps this for a detector backed by an actual vision library.
struct NullLineDetector;
impl LineDetector for NullLineDetector {
    fn detect_lines(&self, _page_path: &str, _region: Rect) -> Vec<LineSegment> {
        Vec::new()
    }
}

struct NullContourDetector;
impl ContourDetector for NullContourDetector {
    fn find_contours(&self, _page_path: &str, _region: Rect) -> Vec<Contour> {
        Vec::new()
    }
}
