//! The ordered report run.
//!
//! A run goes normalize → analyze → assemble → narrate → render → write.
//! All run state lives in a [`RunContext`] passed in and handed back; no
//! stage writes to process-wide storage.

use crate::analysis::normalize;
use crate::error::{ExportError, PipelineError};
use crate::models::{QueryResult, Selection};
use crate::narrative::{NarrativeOrchestrator, NarrativeOutcome};
use crate::progress::{Checkpoint, ProgressSink};
use crate::report::builder::{analyze, ReportBuilder};
use crate::report::model::ReportModel;
use crate::report::{Artifact, Exporter};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Owner side of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Observer side of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelHandle {
    pub fn channel() -> (CancelHandle, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelToken { rx })
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the run is cancelled; never resolves otherwise.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                if *rx.borrow() {
                    return;
                }
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Explicit per-run state.
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub cancel: CancelToken,
    pub progress: Arc<dyn ProgressSink>,
    /// Checkpoints passed so far, in order.
    pub history: Vec<Checkpoint>,
}

impl RunContext {
    pub fn new(cancel: CancelToken, progress: Arc<dyn ProgressSink>) -> Self {
        let started_at = Utc::now();
        Self {
            run_id: format!("run-{}", started_at.format("%Y%m%d-%H%M%S%3f")),
            started_at,
            cancel,
            progress,
            history: Vec::new(),
        }
    }

    /// Record and publish a checkpoint.
    pub fn checkpoint(&mut self, checkpoint: Checkpoint) {
        debug!("{}: {}", self.run_id, checkpoint);
        self.progress.checkpoint(checkpoint);
        self.history.push(checkpoint);
    }

    fn ensure_active(&self) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Run-level settings.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub output_dir: PathBuf,
    pub file_stem: String,
    pub title: Option<String>,
    pub concentration_threshold: f64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("reports"),
            file_stem: "branch_trends".to_string(),
            title: None,
            concentration_threshold: 0.5,
        }
    }
}

/// Counts describing a finished run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub rows_seen: usize,
    pub rows_rejected: usize,
    pub records: usize,
    pub narratives_generated: usize,
    pub narratives_fallback: usize,
    /// No narrative backend was configured.
    pub narrative_offline: bool,
}

/// Everything a successful run produces.
pub struct RunOutcome {
    pub context: RunContext,
    pub model: ReportModel,
    /// Paths written, in exporter order.
    pub written: Vec<PathBuf>,
    pub stats: RunStats,
}

/// Executes report runs.
pub struct Pipeline {
    options: PipelineOptions,
    narrator: NarrativeOrchestrator,
    exporters: Vec<Box<dyn Exporter>>,
}

impl Pipeline {
    pub fn new(
        options: PipelineOptions,
        narrator: NarrativeOrchestrator,
        exporters: Vec<Box<dyn Exporter>>,
    ) -> Self {
        Self {
            options,
            narrator,
            exporters,
        }
    }

    /// Normalize, analyze and assemble the model without narratives.
    pub fn assemble(
        &self,
        selection: &Selection,
        results: &[QueryResult],
        ctx: &mut RunContext,
    ) -> Result<ReportModel, PipelineError> {
        ctx.checkpoint(Checkpoint::Normalizing);
        let normalized = normalize(results);
        if !normalized.rejected.is_empty() {
            info!(
                "Rejected {} of {} rows",
                normalized.rejected.len(),
                normalized.rows_seen
            );
        }

        let parts = analyze(
            selection,
            normalized,
            self.options.concentration_threshold,
            |c| ctx.checkpoint(c),
        );

        ctx.checkpoint(Checkpoint::AssemblingReport);
        ReportBuilder::new(ctx.run_id.clone(), ctx.started_at)
            .provider(self.narrator.provider_name())
            .title(self.options.title.clone())
            .build(parts)
    }

    /// Run the whole pipeline.
    ///
    /// Nothing is written unless every exporter rendered successfully and
    /// the run was not cancelled.
    pub async fn run(
        &self,
        selection: &Selection,
        results: &[QueryResult],
        mut ctx: RunContext,
    ) -> Result<RunOutcome, PipelineError> {
        let result = self.run_inner(selection, results, &mut ctx).await;
        ctx.progress.finish();

        let (model, outcome, written) = result?;
        let stats = RunStats {
            rows_seen: model.metadata.rows_seen,
            rows_rejected: model.metadata.rows_rejected,
            records: model.metadata.records,
            narratives_generated: outcome.generated.len(),
            narratives_fallback: model.narratives.len() - outcome.generated.len(),
            narrative_offline: outcome.offline,
        };

        info!(
            "Run {} complete: {} records, {} artifacts",
            ctx.run_id,
            stats.records,
            written.len()
        );

        Ok(RunOutcome {
            context: ctx,
            model,
            written,
            stats,
        })
    }

    async fn run_inner(
        &self,
        selection: &Selection,
        results: &[QueryResult],
        ctx: &mut RunContext,
    ) -> Result<(ReportModel, NarrativeOutcome, Vec<PathBuf>), PipelineError> {
        ctx.ensure_active()?;
        let model = self.assemble(selection, results, ctx)?;

        ctx.ensure_active()?;
        let progress = Arc::clone(&ctx.progress);
        let (model, outcome) = self.narrator.narrate(model, &ctx.cancel, &progress).await?;

        let mut artifacts = Vec::new();
        for exporter in &self.exporters {
            ctx.ensure_active()?;
            ctx.checkpoint(Checkpoint::Exporting(exporter.name()));
            artifacts.extend(exporter.render(&model, &self.options.file_stem)?);
        }

        ctx.ensure_active()?;
        let written = write_artifacts(&self.options.output_dir, &artifacts)?;
        ctx.checkpoint(Checkpoint::Completed);

        Ok((model, outcome, written))
    }
}

/// Write rendered artifacts below `dir`.
///
/// Every artifact is written into a staging directory inside `dir` first
/// and moved into place only once all writes succeeded. On failure no new
/// file is left in `dir`.
pub fn write_artifacts(dir: &Path, artifacts: &[Artifact]) -> Result<Vec<PathBuf>, ExportError> {
    std::fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
    let staging = tempfile::Builder::new()
        .prefix(".branch-trends-")
        .tempdir_in(dir)
        .map_err(|e| io_error(dir, e))?;

    for artifact in artifacts {
        let staged = staging.path().join(&artifact.relative_path);
        if let Some(parent) = staged.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        std::fs::write(&staged, &artifact.bytes).map_err(|e| io_error(&staged, e))?;
    }

    for artifact in artifacts {
        let target = dir.join(&artifact.relative_path);
        if target.is_dir() {
            return Err(io_error(
                &target,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "a directory is in the way"),
            ));
        }
    }

    let mut written: Vec<PathBuf> = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let staged = staging.path().join(&artifact.relative_path);
        let target = dir.join(&artifact.relative_path);

        if let Err(e) = move_into_place(&staged, &target) {
            for path in &written {
                if let Err(cleanup) = std::fs::remove_file(path) {
                    warn!("Could not remove {}: {}", path.display(), cleanup);
                }
            }
            return Err(io_error(&target, e));
        }
        debug!("Wrote {}", target.display());
        written.push(target);
    }

    Ok(written)
}

fn move_into_place(staged: &Path, target: &Path) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(staged, target)
}

fn io_error(path: &Path, source: std::io::Error) -> ExportError {
    ExportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::backend::NarrativeBackend;
    use crate::narrative::{NarrativeRequest, RetryPolicy};
    use crate::error::BackendError;
    use crate::progress::RecordingProgress;
    use crate::report::builder::tests::{sample_results, sample_selection, COOK};
    use crate::report::default_exporters;
    use crate::report::model::NarrativeSection;
    use async_trait::async_trait;

    struct FixedBackend;

    #[async_trait]
    impl NarrativeBackend for FixedBackend {
        fn name(&self) -> String {
            "fixed".to_string()
        }

        async fn generate(&self, request: &NarrativeRequest) -> Result<String, BackendError> {
            Ok(format!("Fixed text for {}.", request.section.title()))
        }
    }

    fn pipeline(output_dir: &Path) -> Pipeline {
        let narrator = NarrativeOrchestrator::new(
            Some(Arc::new(FixedBackend)),
            RetryPolicy::default(),
            4,
            10,
        );
        let options = PipelineOptions {
            output_dir: output_dir.to_path_buf(),
            ..PipelineOptions::default()
        };
        Pipeline::new(options, narrator, default_exporters())
    }

    fn context() -> (CancelHandle, RunContext, Arc<RecordingProgress>) {
        let (handle, token) = CancelHandle::channel();
        let recorder = Arc::new(RecordingProgress::default());
        let ctx = RunContext::new(token, recorder.clone());
        (handle, ctx, recorder)
    }

    #[tokio::test]
    async fn test_run_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let (_handle, ctx, recorder) = context();

        let outcome = pipeline(dir.path())
            .run(&sample_selection(), &sample_results(), ctx)
            .await
            .unwrap();

        assert_eq!(outcome.stats.records, 4);
        assert_eq!(outcome.stats.narratives_generated, NarrativeSection::ALL.len());
        assert!(!outcome.stats.narrative_offline);
        assert!(!outcome.written.is_empty());
        assert!(outcome.written.iter().all(|p| p.exists()));

        let seen = recorder.checkpoints();
        assert_eq!(seen.first(), Some(&Checkpoint::Normalizing));
        assert_eq!(seen.last(), Some(&Checkpoint::Completed));
        assert!(seen.contains(&Checkpoint::GeneratingNarrative(NarrativeSection::Trends)));
        assert_eq!(outcome.context.history.last(), Some(&Checkpoint::Completed));
    }

    #[tokio::test]
    async fn test_runs_are_structurally_identical() {
        let first_dir = tempfile::tempdir().unwrap();
        let second_dir = tempfile::tempdir().unwrap();

        let (_h1, ctx1, _) = context();
        let (_h2, ctx2, _) = context();
        let first = pipeline(first_dir.path())
            .run(&sample_selection(), &sample_results(), ctx1)
            .await
            .unwrap();

        let mut reordered = sample_results();
        reordered.reverse();
        for result in &mut reordered {
            result.rows.reverse();
        }
        let second = pipeline(second_dir.path())
            .run(&sample_selection(), &reordered, ctx2)
            .await
            .unwrap();

        assert_eq!(first.model.summary, second.model.summary);
        assert_eq!(first.model.by_bank, second.model.by_bank);
        assert_eq!(first.model.by_county, second.model.by_county);
        assert_eq!(first.model.trends, second.model.trends);
        assert_eq!(first.model.raw_data, second.model.raw_data);
        assert_eq!(first.model.narratives, second.model.narratives);
    }

    #[tokio::test]
    async fn test_empty_selection_produces_no_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let (_handle, ctx, _) = context();
        let empty = vec![QueryResult {
            county_state: COOK.to_string(),
            year: 2021,
            rows: Vec::new(),
        }];

        let err = pipeline(dir.path())
            .run(&sample_selection(), &empty, ctx)
            .await
            .err()
            .unwrap();

        assert!(matches!(err, PipelineError::EmptyDataset { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, ctx, _) = context();
        handle.cancel();

        let result = pipeline(dir.path())
            .run(&sample_selection(), &sample_results(), ctx)
            .await;

        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_partial_report() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("branch_trends.json")).unwrap();
        let (_handle, ctx, _) = context();

        let result = pipeline(dir.path())
            .run(&sample_selection(), &sample_results(), ctx)
            .await;

        assert!(matches!(result, Err(PipelineError::Export(ExportError::Io { .. }))));
        let entries: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["branch_trends.json".to_string()]);
        assert_eq!(
            std::fs::read_dir(dir.path().join("branch_trends.json")).unwrap().count(),
            0
        );
    }

    #[test]
    fn test_write_artifacts_creates_nested_paths() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reports");
        let artifacts = vec![
            Artifact::new("cook.md", "# Report"),
            Artifact::new("extra/cook.json", "{}"),
        ];

        let written = write_artifacts(&out, &artifacts).unwrap();

        assert_eq!(written, vec![out.join("cook.md"), out.join("extra/cook.json")]);
        assert_eq!(std::fs::read_to_string(out.join("cook.md")).unwrap(), "# Report");
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 2);
    }

    #[test]
    fn test_cancel_token_observes_dropped_handle() {
        let (handle, token) = CancelHandle::channel();
        assert!(!token.is_cancelled());

        handle.cancel();
        drop(handle);
        tokio_test::block_on(token.cancelled());
        assert!(token.is_cancelled());
    }
}
