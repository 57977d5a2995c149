//! Nearest-date matching within a tolerance window.

use chrono::NaiveDate;

use crate::observations::ObservationSource;
use crate::types::{Observation, PlotwatchResult};

/// Default half-width of the matching window, in days.
pub const DEFAULT_TOLERANCE_DAYS: i64 = 15;

/// Find the date closest to `target` that lies within `tolerance_days`.
///
/// Equidistant candidates resolve to the earlier date. Returns `None` when
/// nothing qualifies; a negative tolerance only accepts an exact match.
pub fn find_nearest<I>(dates: I, target: NaiveDate, tolerance_days: i64) -> Option<NaiveDate>
where
    I: IntoIterator<Item = NaiveDate>,
{
    let tolerance = tolerance_days.max(0);
    let mut best: Option<(i64, NaiveDate)> = None;

    for date in dates {
        let distance = date.signed_duration_since(target).num_days().abs();
        if distance > tolerance {
            continue;
        }
        best = match best {
            Some((d, current)) if d < distance || (d == distance && current <= date) => {
                Some((d, current))
            }
            _ => Some((distance, date)),
        };
    }

    best.map(|(_, date)| date)
}

/// Matches requested dates against a plot's observation series.
#[derive(Debug, Clone, Copy)]
pub struct TemporalMatcher {
    tolerance_days: i64,
}

impl Default for TemporalMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE_DAYS)
    }
}

impl TemporalMatcher {
    pub fn new(tolerance_days: i64) -> Self {
        Self { tolerance_days }
    }

    pub fn tolerance_days(&self) -> i64 {
        self.tolerance_days
    }

    /// Nearest matching date for a plot, or `None` for a data gap.
    pub fn find_nearest<S: ObservationSource + ?Sized>(
        &self,
        source: &S,
        plot_id: &str,
        date: NaiveDate,
    ) -> PlotwatchResult<Option<NaiveDate>> {
        let series = source.observations(plot_id)?;
        Ok(find_nearest(
            series.iter().map(|o| o.date),
            date,
            self.tolerance_days,
        ))
    }

    /// Nearest matching observation for a plot, or `None` for a data gap.
    pub fn match_observation<S: ObservationSource + ?Sized>(
        &self,
        source: &S,
        plot_id: &str,
        date: NaiveDate,
    ) -> PlotwatchResult<Option<Observation>> {
        let series = source.observations(plot_id)?;
        Ok(self.pick(&series, date).cloned())
    }

    /// Nearest matching observation from an already-fetched series.
    pub fn pick<'a>(&self, series: &'a [Observation], date: NaiveDate) -> Option<&'a Observation> {
        let matched = find_nearest(series.iter().map(|o| o.date), date, self.tolerance_days)?;
        series.iter().find(|o| o.date == matched)
    }
}
