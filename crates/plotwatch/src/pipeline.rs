//! Batch classification: match dates, compute deltas, classify, collect.
//!
//! Every request moves through [`RequestStage`] in order. A request that
//! cannot be matched is skipped, one that fails unexpectedly is recorded as
//! failed, and the batch always carries on with the next request.

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::catalog::{ThresholdCatalog, DEFAULT_LAND_TYPE};
use crate::classify::{classify_axis, RuleGating};
use crate::delta::compute_delta;
use crate::observations::ObservationSource;
use crate::snapshot::Snapshot;
use crate::temporal::{find_nearest, TemporalMatcher, DEFAULT_TOLERANCE_DAYS};
use crate::types::{
    Axis, ChangeResult, ClassificationRequest, Observation, PlotwatchError, PlotwatchResult,
};

/// Run-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Half-width of the date matching window, in days.
    pub tolerance_days: i64,
    /// Worker threads. 0 or 1 runs sequentially on the calling thread.
    pub workers: usize,
    pub gating: RuleGating,
    /// Fallback land type for requests with none or an unknown one.
    pub default_land_type: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tolerance_days: DEFAULT_TOLERANCE_DAYS,
            workers: 1,
            gating: RuleGating::Advisory,
            default_land_type: DEFAULT_LAND_TYPE.to_string(),
        }
    }
}

/// Progress of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStage {
    Received,
    DatesMatched,
    ObservationsFetched,
    DeltasComputed,
    Classified,
    Persisted,
}

impl std::fmt::Display for RequestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestStage::Received => "received",
            RequestStage::DatesMatched => "dates_matched",
            RequestStage::ObservationsFetched => "observations_fetched",
            RequestStage::DeltasComputed => "deltas_computed",
            RequestStage::Classified => "classified",
            RequestStage::Persisted => "persisted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordErrorKind {
    /// No observation within tolerance for the baseline or target date.
    DataGap,
    /// Anything unexpected while processing the request.
    RowProcessing,
    /// The input row could not be parsed into a request.
    MalformedRow,
}

/// Why a request produced no result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordError {
    pub request_id: String,
    pub plot_id: String,
    /// Last stage the request reached.
    pub stage: RequestStage,
    pub kind: RecordErrorKind,
    pub reason: String,
}

impl RecordError {
    fn new(
        req: &ClassificationRequest,
        stage: RequestStage,
        kind: RecordErrorKind,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            request_id: req.request_id.clone(),
            plot_id: req.plot_id.clone(),
            stage,
            kind,
            reason: reason.into(),
        }
    }
}

/// Requests read from the batch input plus rows that failed to parse.
#[derive(Debug, Clone, Default)]
pub struct RequestBatch {
    pub requests: Vec<ClassificationRequest>,
    pub rejected: Vec<RecordError>,
}

impl From<Vec<ClassificationRequest>> for RequestBatch {
    fn from(requests: Vec<ClassificationRequest>) -> Self {
        Self {
            requests,
            rejected: Vec::new(),
        }
    }
}

/// Processed-vs-error counts for a run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    /// Requests received, including rows rejected at parse time.
    pub total: usize,
    pub persisted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub rejected: usize,
    pub errors: Vec<RecordError>,
}

impl RunSummary {
    pub fn error_count(&self) -> usize {
        self.skipped + self.failed + self.rejected
    }
}

/// Cooperative cancellation flag shared with whoever may abort a run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Classifies a batch of requests against an observation source and a
/// threshold catalog. Both are only read.
pub struct BatchPipeline<'a, S: ObservationSource + ?Sized> {
    source: &'a S,
    catalog: &'a ThresholdCatalog,
    matcher: TemporalMatcher,
    config: PipelineConfig,
}

impl<'a, S: ObservationSource + ?Sized> BatchPipeline<'a, S> {
    /// Build a pipeline.
    ///
    /// The catalog's fallback rule set is the one applied, so it replaces
    /// `config.default_land_type` when the two disagree.
    pub fn new(source: &'a S, catalog: &'a ThresholdCatalog, mut config: PipelineConfig) -> Self {
        let fallback = &catalog.default_rule_set().land_type;
        if catalog.get(&config.default_land_type).map(|set| &set.land_type) != Some(fallback) {
            tracing::warn!(
                configured = %config.default_land_type,
                catalog = %fallback,
                "Configured default land type differs from the catalog fallback; using the catalog's"
            );
        }
        config.default_land_type = fallback.clone();
        Self {
            source,
            catalog,
            matcher: TemporalMatcher::new(config.tolerance_days),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run a list of requests.
    pub fn run(
        &self,
        requests: &[ClassificationRequest],
        cancel: &CancelToken,
    ) -> PlotwatchResult<Snapshot> {
        self.run_batch(&RequestBatch::from(requests.to_vec()), cancel)
    }

    /// Run a batch, producing a new snapshot of every persisted request.
    ///
    /// Returns [`PlotwatchError::Cancelled`] if `cancel` fires before the run
    /// completes; no snapshot is produced in that case.
    pub fn run_batch(&self, batch: &RequestBatch, cancel: &CancelToken) -> PlotwatchResult<Snapshot> {
        let run_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(
            run_id = %run_id,
            requests = batch.requests.len(),
            rejected = batch.rejected.len(),
            workers = self.config.workers,
            "Starting classification run"
        );

        let outcomes: Vec<Option<Result<ChangeResult, RecordError>>> = if self.config.workers <= 1 {
            batch
                .requests
                .iter()
                .map(|req| self.process_guarded(req, cancel))
                .collect()
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.workers)
                .build()
                .map_err(|e| PlotwatchError::InvalidInput(format!("Failed to start worker pool: {e}")))?;
            pool.install(|| {
                batch
                    .requests
                    .par_iter()
                    .map(|req| self.process_guarded(req, cancel))
                    .collect()
            })
        };

        if cancel.is_cancelled() {
            tracing::warn!(run_id = %run_id, "Run cancelled; discarding partial results");
            return Err(PlotwatchError::Cancelled);
        }

        // Outcomes are in input order, so the result set does not depend on
        // the worker count.
        let mut summary = RunSummary {
            run_id: run_id.clone(),
            total: batch.requests.len() + batch.rejected.len(),
            rejected: batch.rejected.len(),
            errors: batch.rejected.clone(),
            ..RunSummary::default()
        };
        let mut results = Vec::with_capacity(batch.requests.len());

        for outcome in outcomes.into_iter().flatten() {
            match outcome {
                Ok(result) => {
                    tracing::trace!(request_id = %result.request_id, stage = %RequestStage::Persisted);
                    results.push(result);
                }
                Err(err) => {
                    tracing::warn!(
                        request_id = %err.request_id,
                        plot_id = %err.plot_id,
                        stage = %err.stage,
                        kind = ?err.kind,
                        reason = %err.reason,
                        "Request not classified"
                    );
                    match err.kind {
                        RecordErrorKind::DataGap => summary.skipped += 1,
                        _ => summary.failed += 1,
                    }
                    summary.errors.push(err);
                }
            }
        }
        summary.persisted = results.len();

        tracing::info!(
            run_id = %run_id,
            persisted = summary.persisted,
            skipped = summary.skipped,
            failed = summary.failed,
            rejected = summary.rejected,
            "Classification run finished"
        );

        Ok(Snapshot::new(run_id, self.config.clone(), summary, results))
    }

    fn process_guarded(
        &self,
        req: &ClassificationRequest,
        cancel: &CancelToken,
    ) -> Option<Result<ChangeResult, RecordError>> {
        if cancel.is_cancelled() {
            return None;
        }
        // Lives outside the unwind boundary so a panic reports the stage reached.
        let stage = Cell::new(RequestStage::Received);
        let outcome = catch_unwind(AssertUnwindSafe(|| self.process_staged(req, &stage)))
            .unwrap_or_else(|payload| {
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic while processing request".to_string());
                Err(RecordError::new(
                    req,
                    stage.get(),
                    RecordErrorKind::RowProcessing,
                    msg,
                ))
            });
        Some(outcome)
    }

    /// Classify a single request.
    pub fn process(&self, req: &ClassificationRequest) -> Result<ChangeResult, RecordError> {
        self.process_staged(req, &Cell::new(RequestStage::Received))
    }

    fn process_staged(
        &self,
        req: &ClassificationRequest,
        stage: &Cell<RequestStage>,
    ) -> Result<ChangeResult, RecordError> {
        tracing::debug!(request_id = %req.request_id, plot_id = %req.plot_id, "Processing request");
        let advance = |next: RequestStage| {
            stage.set(next);
            tracing::trace!(request_id = %req.request_id, stage = %next);
        };
        let failed = |e: PlotwatchError| {
            RecordError::new(req, stage.get(), RecordErrorKind::RowProcessing, e.to_string())
        };

        let dates = self.source.observation_dates(&req.plot_id).map_err(failed)?;
        let tolerance = self.matcher.tolerance_days();
        let nearest = |which: &str, date: NaiveDate| {
            find_nearest(dates.iter().copied(), date, tolerance).ok_or_else(|| {
                RecordError::new(
                    req,
                    stage.get(),
                    RecordErrorKind::DataGap,
                    format!("no observation within {tolerance} days of {which} date {date}"),
                )
            })
        };
        let baseline_date = nearest("baseline", req.baseline_date)?;
        let target_date = nearest("target", req.target_date)?;
        advance(RequestStage::DatesMatched);

        let fetch = |date: NaiveDate| -> Result<Observation, RecordError> {
            self.source
                .observation(&req.plot_id, date)
                .map_err(failed)?
                .ok_or_else(|| {
                    RecordError::new(
                        req,
                        stage.get(),
                        RecordErrorKind::RowProcessing,
                        format!("observation for {date} disappeared from the source"),
                    )
                })
        };
        let baseline = fetch(baseline_date)?;
        let target = fetch(target_date)?;
        advance(RequestStage::ObservationsFetched);

        let delta = compute_delta(&baseline, &target);
        advance(RequestStage::DeltasComputed);

        let rules = self.catalog.resolve(req.land_type.as_deref());
        let gating = self.config.gating;
        let [vegetation, construction, flooding] =
            Axis::ALL.map(|axis| classify_axis(axis, &delta, rules, gating));
        advance(RequestStage::Classified);

        Ok(ChangeResult {
            request_id: req.request_id.clone(),
            plot_id: req.plot_id.clone(),
            matched_baseline_date: baseline.date,
            matched_target_date: target.date,
            baseline,
            target,
            delta,
            rules_used: rules.land_type.clone(),
            vegetation,
            construction,
            flooding,
        })
    }
}
