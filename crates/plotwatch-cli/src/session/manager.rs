//! Snapshot lifecycle, input loading, and run publication.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use plotwatch::io::{read_observations_file, read_requests_file, read_rules_file};
use plotwatch::{
    BatchPipeline, CancelToken, ObservationStore, PipelineConfig, Snapshot, SnapshotReader,
    SnapshotStore, SnapshotWriter, ThresholdCatalog,
};

use crate::error::{CliError, CliResult};

/// The three input tables of a run.
#[derive(Debug, Clone)]
pub struct RunInputs {
    pub observations: PathBuf,
    pub rules: PathBuf,
    pub requests: PathBuf,
}

/// Owns the snapshot file and the in-memory current snapshot.
pub struct RunSession {
    store: SnapshotStore,
    file_path: PathBuf,
}

impl RunSession {
    /// Open a snapshot file. A missing file starts an empty session.
    pub fn open(path: &str) -> CliResult<Self> {
        let file_path = PathBuf::from(path);

        let store = if file_path.exists() {
            tracing::info!("Opening snapshot file: {}", file_path.display());
            let snapshot = SnapshotReader::read_from_file(&file_path)?;
            SnapshotStore::with_snapshot(snapshot)
        } else {
            tracing::info!("No snapshot yet at {}", file_path.display());
            SnapshotStore::new()
        };

        Ok(Self { store, file_path })
    }

    /// Open a session for a new run.
    ///
    /// The run replaces whatever the file holds, so an unreadable previous
    /// snapshot is logged and ignored instead of blocking the run.
    pub fn for_run(path: &str) -> Self {
        match Self::open(path) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(
                    path,
                    error = %e,
                    "Previous snapshot is unreadable; it will be replaced by this run"
                );
                Self {
                    store: SnapshotStore::new(),
                    file_path: PathBuf::from(path),
                }
            }
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// The published snapshot, if any run has completed.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.store.current()
    }

    /// The published snapshot, or an error naming the file.
    pub fn require_current(&self) -> CliResult<Arc<Snapshot>> {
        self.current()
            .ok_or_else(|| CliError::NoSnapshot(self.file_path.display().to_string()))
    }

    /// Load the inputs, run the batch, publish and save the new snapshot.
    pub fn run(&self, inputs: &RunInputs, config: PipelineConfig) -> CliResult<Arc<Snapshot>> {
        self.run_with_cancel(inputs, config, &CancelToken::new())
    }

    /// Like [`RunSession::run`], stopping early if `cancel` fires.
    ///
    /// Any fatal error, including cancellation, leaves the previous snapshot
    /// published and on disk.
    pub fn run_with_cancel(
        &self,
        inputs: &RunInputs,
        config: PipelineConfig,
        cancel: &CancelToken,
    ) -> CliResult<Arc<Snapshot>> {
        let observations = ObservationStore::from_observations(read_observations_file(
            &inputs.observations,
        )?)?;
        tracing::info!(
            observations = observations.count(),
            plots = observations.plot_count(),
            "Loaded observations"
        );

        let catalog =
            ThresholdCatalog::with_default(read_rules_file(&inputs.rules)?, &config.default_land_type)?;
        let rejected_rules = catalog.diagnostics().len();
        if rejected_rules > 0 {
            tracing::warn!(rejected_rules, "Some threshold rules will always evaluate to false");
        }

        let batch = read_requests_file(&inputs.requests)?;

        let pipeline = BatchPipeline::new(&observations, &catalog, config);
        let snapshot = pipeline.run_batch(&batch, cancel)?;

        SnapshotWriter::write_to_file(&snapshot, &self.file_path)?;
        self.store.publish(snapshot);
        tracing::info!("Saved snapshot to {}", self.file_path.display());

        self.require_current()
    }
}
