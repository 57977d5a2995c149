//! Read-only access to dated plot observations.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::types::{Observation, PlotwatchError, PlotwatchResult};

/// A source of observations, owned by whatever pipeline acquired them.
///
/// Implementations are only read during a run, so they must be shareable
/// across worker threads.
pub trait ObservationSource: Sync {
    /// All observations for a plot, ordered by date. An unknown plot yields
    /// an empty list.
    fn observations(&self, plot_id: &str) -> PlotwatchResult<Vec<Observation>>;

    /// Dates with an observation for a plot, ordered.
    fn observation_dates(&self, plot_id: &str) -> PlotwatchResult<Vec<NaiveDate>> {
        Ok(self.observations(plot_id)?.into_iter().map(|o| o.date).collect())
    }

    /// The observation for a plot on an exact date, if there is one.
    fn observation(&self, plot_id: &str, date: NaiveDate) -> PlotwatchResult<Option<Observation>> {
        Ok(self
            .observations(plot_id)?
            .into_iter()
            .find(|o| o.date == date))
    }
}

/// In-memory observation store keyed by plot, unique per (plot, date).
#[derive(Debug, Clone, Default)]
pub struct ObservationStore {
    plots: BTreeMap<String, Vec<Observation>>,
}

impl ObservationStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a list of observations, rejecting duplicates.
    pub fn from_observations(
        observations: impl IntoIterator<Item = Observation>,
    ) -> PlotwatchResult<Self> {
        let mut store = Self::new();
        for obs in observations {
            store.insert(obs)?;
        }
        Ok(store)
    }

    /// Add an observation, keeping the plot's list ordered by date.
    pub fn insert(&mut self, obs: Observation) -> PlotwatchResult<()> {
        let series = self.plots.entry(obs.plot_id.clone()).or_default();
        match series.binary_search_by(|o| o.date.cmp(&obs.date)) {
            Ok(_) => Err(PlotwatchError::DuplicateObservation {
                plot_id: obs.plot_id,
                date: obs.date,
            }),
            Err(idx) => {
                series.insert(idx, obs);
                Ok(())
            }
        }
    }

    /// Number of plots with at least one observation.
    pub fn plot_count(&self) -> usize {
        self.plots.len()
    }

    /// Total number of observations.
    pub fn count(&self) -> usize {
        self.plots.values().map(Vec::len).sum()
    }

    /// Observations for a plot, ordered by date.
    pub fn series(&self, plot_id: &str) -> &[Observation] {
        self.plots.get(plot_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl ObservationSource for ObservationStore {
    fn observations(&self, plot_id: &str) -> PlotwatchResult<Vec<Observation>> {
        Ok(self.series(plot_id).to_vec())
    }

    fn observation_dates(&self, plot_id: &str) -> PlotwatchResult<Vec<NaiveDate>> {
        Ok(self.series(plot_id).iter().map(|o| o.date).collect())
    }

    fn observation(&self, plot_id: &str, date: NaiveDate) -> PlotwatchResult<Option<Observation>> {
        let series = self.series(plot_id);
        Ok(series
            .binary_search_by(|o| o.date.cmp(&date))
            .ok()
            .map(|idx| series[idx].clone()))
    }
}
