//! Sliding truth window behind `OverHowManyHours` / `PercentageOfTime`.

use std::collections::VecDeque;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use twinwatch_core::PercentagePolicy;

use crate::schema::WindowSettings;

/// Slack for comparing a float fraction against the configured percentage.
const FRACTION_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub at: DateTime<Utc>,
    pub value: bool,
}

/// Raw truth observations inside the current window. The newest
/// observation at or before the window start is kept as well, so the
/// duration policy can carry it forward into the window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TruthWindow {
    observations: VecDeque<Observation>,
}

impl TruthWindow {
    /// Record the raw truth at `t` and return the windowed truth.
    ///
    /// A window of zero hours passes the raw truth straight through.
    /// Otherwise the fraction of truth over `(t - window, t]` must be
    /// positive and at least `settings.percentage`.
    pub fn observe(&mut self, t: DateTime<Utc>, raw: bool, settings: &WindowSettings, policy: PercentagePolicy) -> bool {
        if settings.window_hours <= 0.0 {
            self.observations.clear();
            return raw;
        }

        self.observations.push_back(Observation { at: t, value: raw });
        let cutoff = window_start(t, settings.window_hours);
        while self.observations.len() > 1 && self.observations[1].at <= cutoff {
            self.observations.pop_front();
        }

        let fraction = match policy {
            PercentagePolicy::SampleCount => self.sample_fraction(cutoff),
            PercentagePolicy::Duration => self.duration_fraction(cutoff, t).unwrap_or(if raw { 1.0 } else { 0.0 }),
        };
        fraction > 0.0 && fraction + FRACTION_EPSILON >= settings.percentage
    }

    fn sample_fraction(&self, cutoff: DateTime<Utc>) -> f64 {
        let (total, trues) = self
            .observations
            .iter()
            .filter(|o| o.at > cutoff)
            .fold((0u32, 0u32), |(n, k), o| (n + 1, k + u32::from(o.value)));
        if total == 0 {
            return 0.0;
        }
        f64::from(trues) / f64::from(total)
    }

    /// Time-weighted share of truth, each observation holding until the
    /// next. `None` when the covered span is empty.
    fn duration_fraction(&self, cutoff: DateTime<Utc>, t: DateTime<Utc>) -> Option<f64> {
        let first = self.observations.front()?;
        let span_start = first.at.max(cutoff);
        let span = (t - span_start).num_milliseconds();
        if span <= 0 {
            return None;
        }

        let mut true_ms = 0i64;
        let mut iter = self.observations.iter().peekable();
        while let Some(obs) = iter.next() {
            let end = iter.peek().map_or(t, |next| next.at);
            let start = obs.at.max(cutoff);
            if obs.value && end > start {
                true_ms += (end - start).num_milliseconds();
            }
        }
        Some(true_ms as f64 / span as f64)
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Exclusive start of a window of `hours` ending at `t`. A window too long
/// to represent covers all of history.
fn window_start(t: DateTime<Utc>, hours: f64) -> DateTime<Utc> {
    let ms = hours * 3_600_000.0;
    // `as` saturates; anything near i64::MAX is rejected by try_milliseconds or checked_sub.
    TimeDelta::try_milliseconds(ms.round() as i64)
        .and_then(|window| t.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
