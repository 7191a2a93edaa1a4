//! Planning pass over a directory: scan, extract, group, decide, place. Nothing is moved.

use crate::classifier::FolderResolution;
use crate::engine::{DecisionEngine, FolderHint};
use crate::extractor;
use crate::models::{ConfidenceLevel, Decision, FileSignature};
use crate::naming::Placement;
use crate::scanner::{self, FolderGroup, ScanOptions};
use crate::series;
use crate::suggester::{Suggestion, SuggestionContext, SuggestionSource};
use anyhow::Context;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub root: PathBuf,
    pub scan: ScanOptions,
    /// Batch folders with at least this many files; `None` decides every file alone.
    pub min_folder_files: Option<usize>,
    /// Files per suggestion request for loose files.
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedFile {
    pub path: PathBuf,
    pub signature: FileSignature,
    pub decision: Decision,
    pub level: ConfidenceLevel,
    pub placement: Placement,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedFolder {
    pub path: PathBuf,
    pub name: String,
    pub resolution: Option<FolderResolution>,
    pub auto_apply: bool,
    pub files: Vec<PlannedFile>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Plan {
    pub folders: Vec<PlannedFolder>,
    pub loose: Vec<PlannedFile>,
    /// Files that disappeared or could not be read during extraction.
    pub skipped: Vec<PathBuf>,
    pub suggestion_requests: usize,
    /// Numbered file-name runs (`hw1`, `hw2`, ...) seen among the planned files.
    pub series: BTreeMap<String, Vec<(String, u64)>>,
    pub warnings: Vec<String>,
}

impl Plan {
    pub fn files(&self) -> impl Iterator<Item = &PlannedFile> {
        self.folders.iter().flat_map(|f| f.files.iter()).chain(&self.loose)
    }

    pub fn len(&self) -> usize {
        self.files().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub async fn plan(
    engine: &mut DecisionEngine,
    source: &dyn SuggestionSource,
    request: &PlanRequest,
) -> anyhow::Result<Plan> {
    let root = request.root.clone();
    let options = request.scan.clone();
    let files = tokio::task::spawn_blocking(move || scanner::scan(&root, &options))
        .await
        .context("scan task")??;
    info!(files = files.len(), root = %request.root.display(), "scan complete");

    let grouping = match request.min_folder_files {
        Some(min) => scanner::group_by_folder(&files, &request.root, min.max(1)),
        None => scanner::Grouping {
            folders: Vec::new(),
            loose: files,
        },
    };
    debug!(
        folders = grouping.folders.len(),
        loose = grouping.loose.len(),
        "grouped files"
    );

    let mut plan = Plan::default();
    for group in grouping.folders {
        let folder = plan_folder(engine, source, group, &mut plan).await;
        plan.folders.push(folder);
    }

    let batch_size = request.batch_size.max(1);
    for chunk in grouping.loose.chunks(batch_size) {
        let (paths, signatures) = extract(chunk, &mut plan).await;
        let decisions = decide_all(engine, source, &signatures, None, &mut plan).await;
        plan.loose
            .extend(finish(engine, paths, signatures, decisions));
    }

    plan.series = series::detect_from_filenames(plan.files().map(|f| f.signature.stem.as_str()));
    plan.warnings.extend(engine.persistence_warnings());
    info!(
        planned = plan.len(),
        skipped = plan.skipped.len(),
        requests = plan.suggestion_requests,
        "plan complete"
    );
    Ok(plan)
}

async fn plan_folder(
    engine: &mut DecisionEngine,
    source: &dyn SuggestionSource,
    group: FolderGroup,
    plan: &mut Plan,
) -> PlannedFolder {
    let (paths, signatures) = extract(&group.files, plan).await;
    let resolution = engine.resolve_folder(&group.name);
    let hint = match &resolution {
        Some(r) => FolderHint::Resolved(r.clone()),
        None => FolderHint::Inconclusive,
    };
    let auto_apply = resolution.as_ref().is_some_and(FolderResolution::auto_apply);
    if auto_apply {
        info!(folder = %group.name, files = signatures.len(), "auto-applying folder category");
    }
    let decisions = decide_all(engine, source, &signatures, Some(&hint), plan).await;
    PlannedFolder {
        path: group.path,
        name: group.name,
        resolution,
        auto_apply,
        files: finish(engine, paths, signatures, decisions),
    }
}

async fn extract(paths: &[PathBuf], plan: &mut Plan) -> (Vec<PathBuf>, Vec<FileSignature>) {
    let mut kept_paths = Vec::with_capacity(paths.len());
    let mut signatures = Vec::with_capacity(paths.len());
    for (path, signature) in paths.iter().zip(extractor::extract_signatures(paths).await) {
        match signature {
            Some(signature) => {
                kept_paths.push(path.clone());
                signatures.push(signature);
            }
            None => plan.skipped.push(path.clone()),
        }
    }
    (kept_paths, signatures)
}

/// Resolves locally where possible and asks the source only for the rest.
async fn decide_all(
    engine: &mut DecisionEngine,
    source: &dyn SuggestionSource,
    signatures: &[FileSignature],
    hint: Option<&FolderHint>,
    plan: &mut Plan,
) -> Vec<Decision> {
    let mut decisions: Vec<Option<Decision>> = signatures
        .iter()
        .map(|sig| engine.try_resolve_local(sig, hint))
        .collect();
    let pending: Vec<usize> = (0..signatures.len())
        .filter(|&i| decisions[i].is_none())
        .collect();
    if pending.is_empty() {
        return decisions.into_iter().flatten().collect();
    }

    let batch: Vec<FileSignature> = pending.iter().map(|&i| signatures[i].clone()).collect();
    let context = SuggestionContext {
        categories: engine.categories().categories_for_prompt(),
        corrections: engine.memory().prompt_context(&batch),
    };
    plan.suggestion_requests += 1;
    let suggestions: Vec<Option<Suggestion>> = match source.suggest(&batch, &context).await {
        Ok(suggestions) => suggestions,
        Err(err) => {
            warn!(%err, files = batch.len(), "suggestion source failed, using local signals");
            plan.warnings.push(err.to_string());
            Vec::new()
        }
    };

    for (slot, &i) in pending.iter().enumerate() {
        let suggestion = suggestions.get(slot).and_then(Option::as_ref);
        decisions[i] = Some(engine.decide(&signatures[i], suggestion, hint));
    }
    decisions.into_iter().flatten().collect()
}

fn finish(
    engine: &mut DecisionEngine,
    paths: Vec<PathBuf>,
    signatures: Vec<FileSignature>,
    decisions: Vec<Decision>,
) -> Vec<PlannedFile> {
    let thresholds = engine.settings().thresholds.clone();
    paths
        .into_iter()
        .zip(signatures)
        .zip(decisions)
        .map(|((path, signature), decision)| {
            let placement = engine.place(&signature, &decision);
            PlannedFile {
                level: decision.level(&thresholds),
                path,
                signature,
                decision,
                placement,
            }
        })
        .collect()
}
