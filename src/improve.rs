//! The improvement loop. Loads iteration history, aggregates
//! failures into a critic prompt, parses the critic's reply into an
//! `InstructionProposal`, applies it with a version bump and a
//! pre-change snapshot, and supports rollback.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use regex::Regex;

use crate::agent::{extract_fields_manual, extract_json_object, AgentExecutor};
use crate::error::{Error, Result};
use crate::model::iteration::{ChangeKind, InstructionProposal, VersionBump};
use crate::model::value::FieldDiscrepancy;
use crate::store::errors_by_domain;
use crate::verify::errors_by_type;

const CRITIC_TIMEOUT: Duration = Duration::from_secs(300);
const SAMPLE_LIMIT: usize = 20;

/// Aggregated failure analysis across every evaluation's latest iteration
/// result, implementation-blind — it only looks at discrepancies and
/// metrics.
#[derive(Debug, Clone)]
pub struct FailureAnalysis {
    pub num_evals: usize,
    pub total_discrepancies: usize,
    pub aggregate_f1: f64,
    pub aggregate_precision: f64,
    pub aggregate_recall: f64,
    pub errors_by_type: HashMap<String, u32>,
    pub errors_by_domain: HashMap<String, u32>,
    pub dominant_error_type: Option<String>,
    pub dominant_domain: Option<String>,
    pub sample_discrepancies: Vec<FieldDiscrepancy>,
}

/// One evaluation's latest-iteration result, as loaded from the iteration
/// store for aggregation.
pub struct EvalSnapshot {
    pub f1: f64,
    pub precision: f64,
    pub recall: f64,
    pub discrepancies: Vec<FieldDiscrepancy>,
}

pub fn aggregate_failure_analysis(evals: &[EvalSnapshot]) -> FailureAnalysis {
    if evals.is_empty() {
        return FailureAnalysis {
            num_evals: 0,
            total_discrepancies: 0,
            aggregate_f1: 0.0,
            aggregate_precision: 0.0,
            aggregate_recall: 0.0,
            errors_by_type: HashMap::new(),
            errors_by_domain: HashMap::new(),
            dominant_error_type: None,
            dominant_domain: None,
            sample_discrepancies: Vec::new(),
        };
    }

    let n = evals.len() as f64;
    let all_discrepancies: Vec<FieldDiscrepancy> = evals.iter().flat_map(|e| e.discrepancies.clone()).collect();

    let mut by_type: HashMap<String, u32> = HashMap::new();
    for e in evals {
        for (kind, count) in errors_by_type(&e.discrepancies) {
            *by_type.entry(kind).or_insert(0) += count;
        }
    }
    let by_domain = errors_by_domain(&all_discrepancies);

    let dominant_error_type = by_type.iter().filter(|(_, &c)| c > 0).max_by_key(|(_, &c)| c).map(|(k, _)| k.clone());
    let dominant_domain = by_domain.iter().max_by_key(|(_, &c)| c).map(|(k, _)| k.clone());

    FailureAnalysis {
        num_evals: evals.len(),
        total_discrepancies: all_discrepancies.len(),
        aggregate_f1: evals.iter().map(|e| e.f1).sum::<f64>() / n,
        aggregate_precision: evals.iter().map(|e| e.precision).sum::<f64>() / n,
        aggregate_recall: evals.iter().map(|e| e.recall).sum::<f64>() / n,
        errors_by_type: by_type,
        errors_by_domain: by_domain,
        dominant_error_type,
        dominant_domain,
        sample_discrepancies: all_discrepancies.into_iter().take(SAMPLE_LIMIT).collect(),
    }
}

/// Renders a `FailureAnalysis` as prompt text for the critic agent, the
/// way `format_analysis_for_critic` does in the source.
pub fn format_analysis_for_critic(analysis: &FailureAnalysis, focus_agent: Option<&str>) -> String {
    let mut out = String::new();
    out.push_str("## Summary Statistics\n\n");
    out.push_str(&format!("- Evaluations analyzed: {}\n", analysis.num_evals));
    out.push_str(&format!("- Total discrepancies: {}\n", analysis.total_discrepancies));
    out.push_str(&format!("- Aggregate F1: {:.3}\n", analysis.aggregate_f1));
    out.push_str(&format!("- Aggregate Precision: {:.3}\n", analysis.aggregate_precision));
    out.push_str(&format!("- Aggregate Recall: {:.3}\n\n", analysis.aggregate_recall));

    out.push_str("## Errors by Type\n\n");
    let mut by_type: Vec<_> = analysis.errors_by_type.iter().collect();
    by_type.sort_by(|a, b| b.1.cmp(a.1));
    for (kind, count) in by_type {
        if *count > 0 {
            out.push_str(&format!("- **{kind}**: {count}\n"));
        }
    }
    if let Some(dominant) = &analysis.dominant_error_type {
        out.push_str(&format!("\n**Dominant error type:** {dominant}\n"));
    }

    out.push_str("\n## Errors by Domain\n\n");
    let mut by_domain: Vec<_> = analysis.errors_by_domain.iter().collect();
    by_domain.sort_by(|a, b| b.1.cmp(a.1));
    for (domain, count) in by_domain {
        out.push_str(&format!("- **{domain}**: {count} errors\n"));
    }
    if let Some(dominant) = &analysis.dominant_domain {
        out.push_str(&format!("\n**Dominant domain:** {dominant}\n"));
    }

    if let Some(agent) = focus_agent {
        out.push_str(&format!("\nFocus scope: instruction files for agent `{agent}` only.\n"));
    }

    out.push_str("\n## Sample Discrepancies\n\n");
    for (i, d) in analysis.sample_discrepancies.iter().enumerate() {
        out.push_str(&format!("{}. **{}** ({:?})\n", i + 1, d.path, d.kind));
    }

    out
}

/// JSON-field names used for the `InstructionProposal` manual repair
/// fallback.
const SIMPLE_FIELDS: [&str; 4] = ["target_file", "current_version", "proposed_version", "change_kind"];
const TEXT_FIELDS: [&str; 3] = ["failure_pattern", "hypothesis", "text_to_insert"];

fn parse_change_kind(s: &str) -> Result<ChangeKind> {
    match s {
        "add_section" => Ok(ChangeKind::AddSection),
        "modify_section" => Ok(ChangeKind::ModifySection),
        "clarify_rule" => Ok(ChangeKind::ClarifyRule),
        "add_example" => Ok(ChangeKind::AddExample),
        "fix_typo" => Ok(ChangeKind::FixTypo),
        "restructure" => Ok(ChangeKind::Restructure),
        other => Err(Error::Internal(format!("unknown change_kind: {other}"))),
    }
}

/// Parses the critic's reply into an `InstructionProposal`: first the
/// standard JSON-extraction precedence chain, then the manual
/// field-by-field regex repair for replies that violate strict JSON
/// escaping.
pub fn parse_proposal(reply: &str) -> Result<InstructionProposal> {
    if let Ok(json) = extract_json_object(reply) {
        if let Ok(proposal) = serde_json::from_value(json) {
            return Ok(proposal);
        }
    }

    let fields = extract_fields_manual(reply, &SIMPLE_FIELDS, &TEXT_FIELDS);
    let get = |name: &str| fields.get(name).cloned().ok_or_else(|| Error::JsonExtractionFailed(format!("missing field {name}")));

    Ok(InstructionProposal {
        target_file: get("target_file")?,
        current_version: get("current_version")?,
        proposed_version: fields.get("proposed_version").cloned().unwrap_or_default(),
        change_kind: parse_change_kind(&get("change_kind")?)?,
        failure_pattern: get("failure_pattern")?,
        hypothesis: get("hypothesis")?,
        text_to_insert: get("text_to_insert")?,
        affected_error_types: Vec::new(),
        affected_domains: Vec::new(),
    })
}

/// Invokes the critic agent with the rendered analysis and parses its
/// reply into a proposal.
pub async fn invoke_critic(executor: &dyn AgentExecutor, analysis: &FailureAnalysis, focus_agent: Option<&str>) -> Result<InstructionProposal> {
    let prompt = format_analysis_for_critic(analysis, focus_agent);
    let reply = executor.run("critic", &prompt, CRITIC_TIMEOUT).await?;
    parse_proposal(&reply)
}

fn version_header_re() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[Vv](\d+\.\d+\.\d+)").unwrap())
}

/// Extracts the semantic version from an instruction file's first 10
/// lines, defaulting to `1.0.0` if none is found.
pub fn parse_instruction_version(content: &str) -> String {
    let header: String = content.lines().take(10).collect::<Vec<_>>().join("\n");
    version_header_re()
        .captures(&header)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| "1.0.0".to_string())
}

pub fn bump_version(current: &str, bump: VersionBump) -> Result<String> {
    let parts: Vec<u32> = current.split('.').filter_map(|p| p.parse::<u32>().ok()).collect();
    if parts.len() != 3 {
        return Err(Error::InvalidVersion(current.to_string()));
    }
    let (major, minor, patch) = (parts[0], parts[1], parts[2]);
    Ok(match bump {
        VersionBump::Major => format!("{}.0.0", major + 1),
        VersionBump::Minor => format!("{major}.{}.0", minor + 1),
        VersionBump::Patch => format!("{major}.{minor}.{}", patch + 1),
    })
}

/// Replaces the first `vX.Y.Z` occurrence with `new_version`, or appends
/// it to the first `# ` heading if none is found.
fn apply_version_to_content(content: &str, new_version: &str) -> String {
    if version_header_re().is_match(content) {
        let re = Regex::new(r"([Vv])\d+\.\d+\.\d+").unwrap();
        return re.replacen(content, 1, format!("${{1}}{new_version}")).into_owned();
    }
    let mut lines: Vec<String> = content.lines().map(|l| l.to_string()).collect();
    if let Some(line) = lines.iter_mut().find(|l| l.starts_with("# ")) {
        line.push_str(&format!(" v{new_version}"));
    }
    lines.join("\n") + "\n"
}

/// Applies `proposal` to `target_path`'s content, returning
/// `(old_version, new_version, new_content)`. The caller is responsible
/// for snapshotting the file (via `IterationStore`) before writing this
/// back.
pub fn apply_proposal(proposal: &InstructionProposal, current_content: &str) -> Result<(String, String, String)> {
    let current_version = parse_instruction_version(current_content);
    let new_content = current_content.trim_end().to_string() + "\n\n" + proposal.text_to_insert.trim_end() + "\n";
    let new_version = bump_version(&current_version, proposal.change_kind.version_bump())?;
    let final_content = apply_version_to_content(&new_content, &new_version);
    Ok((current_version, new_version, final_content))
}

/// `<agent>/<file-stem>` key used to locate a snapshot for rollback,
/// matching `IterationStore::save_instruction_snapshot`'s naming.
pub fn snapshot_key(target_path: &Path) -> String {
    let agent = target_path.parent().and_then(|p| p.file_name()).map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let stem = target_path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    format!("{agent}/{stem}")
}
