use serde::{Deserialize, Serialize};

use crate::run::PlaybookRun;

// ---------------------------------------------------------------------------
// Rate helpers
// ---------------------------------------------------------------------------

/// `num / den * 100`, or 0 when the denominator is zero.
pub fn percentage(num: f64, den: f64) -> f64 {
    checked_percentage(num, den).unwrap_or(0.0)
}

/// `num / den * 100`, or `None` when the denominator is zero.
pub fn checked_percentage(num: f64, den: f64) -> Option<f64> {
    if den > 0.0 {
        Some(num / den * 100.0)
    } else {
        None
    }
}

/// Percentage change from `prior` to `current`; `None` without a usable baseline.
pub fn pct_change(current: f64, prior: f64) -> Option<f64> {
    if prior > 0.0 && prior.is_finite() && current.is_finite() {
        Some((current - prior) / prior * 100.0)
    } else {
        None
    }
}

/// Arithmetic mean; 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Raw telemetry counters for a cell or run set.
///
/// Stored as `f64` because channel attribution splits a run's counters
/// proportionally across its playbook's channel mix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Counters {
    pub leads_targeted: f64,
    pub emails_sent: f64,
    pub responses: f64,
    pub meetings: f64,
}

impl Counters {
    pub fn from_run(run: &PlaybookRun) -> Self {
        Self {
            leads_targeted: run.leads_targeted as f64,
            emails_sent: run.emails_sent as f64,
            responses: run.responses as f64,
            meetings: run.meetings_booked as f64,
        }
    }

    pub fn add_scaled(&mut self, other: &Counters, factor: f64) {
        self.leads_targeted += other.leads_targeted * factor;
        self.emails_sent += other.emails_sent * factor;
        self.responses += other.responses * factor;
        self.meetings += other.meetings * factor;
    }

    pub fn add(&mut self, other: &Counters) {
        self.add_scaled(other, 1.0);
    }

    pub fn response_rate(&self) -> f64 {
        percentage(self.responses, self.emails_sent)
    }

    pub fn meeting_rate(&self) -> f64 {
        percentage(self.meetings, self.responses)
    }

    pub fn is_empty(&self) -> bool {
        self.leads_targeted == 0.0
            && self.emails_sent == 0.0
            && self.responses == 0.0
            && self.meetings == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_handles_zero_denominator() {
        assert_eq!(percentage(5.0, 0.0), 0.0);
        assert_eq!(checked_percentage(5.0, 0.0), None);
        assert_eq!(percentage(20.0, 100.0), 20.0);
    }

    #[test]
    fn pct_change_requires_positive_prior() {
        assert_eq!(pct_change(12.0, 10.0), Some(20.0));
        assert_eq!(pct_change(8.0, 10.0), Some(-20.0));
        assert_eq!(pct_change(8.0, 0.0), None);
    }

    #[test]
    fn mean_of_empty_is_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[1.0, 2.0, 3.0]), 2.0);
    }

    #[test]
    fn counters_rates() {
        let c = Counters {
            leads_targeted: 200.0,
            emails_sent: 100.0,
            responses: 20.0,
            meetings: 5.0,
        };
        assert_eq!(c.response_rate(), 20.0);
        assert_eq!(c.meeting_rate(), 25.0);
        assert_eq!(Counters::default().meeting_rate(), 0.0);
    }

    #[test]
    fn add_scaled_splits_counts() {
        let run = Counters {
            leads_targeted: 100.0,
            emails_sent: 80.0,
            responses: 10.0,
            meetings: 2.0,
        };
        let mut cell = Counters::default();
        cell.add_scaled(&run, 0.25);
        assert_eq!(cell.leads_targeted, 25.0);
        assert_eq!(cell.meetings, 0.5);
    }

    #[test]
    fn round_to_decimals() {
        assert_eq!(round_to(4.4608, 2), 4.46);
    }
}
