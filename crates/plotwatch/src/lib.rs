//! plotwatch: change classification between dated remote-sensing observations per plot.

pub mod catalog;
pub mod classify;
pub mod delta;
pub mod io;
pub mod observations;
pub mod pipeline;
pub mod report;
pub mod rules;
pub mod snapshot;
pub mod storage;
pub mod temporal;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{CompiledRuleSet, ThresholdCatalog, DEFAULT_LAND_TYPE};
pub use classify::{classify, classify_axis, Direction, Intensity, RuleGating, NO_CHANGE};
pub use delta::compute_delta;
pub use io::ExportFormat;
pub use observations::{ObservationSource, ObservationStore};
pub use pipeline::{
    BatchPipeline, CancelToken, PipelineConfig, RecordError, RecordErrorKind, RequestBatch,
    RequestStage, RunSummary,
};
pub use report::{Report, DEFAULT_TOP_N};
pub use rules::{evaluate, Bindings, Rule, RuleError};
pub use snapshot::{Snapshot, SnapshotStore};
pub use storage::{SnapshotReader, SnapshotWriter};
pub use temporal::{find_nearest, TemporalMatcher, DEFAULT_TOLERANCE_DAYS};
pub use types::*;
