//! Cross-stream timing comparison.
//!
//! Only the sub-second suffix of each [`Timestamp`] is compared. In
//! [`SkewMode::Suffix`] a pair straddling a whole-second boundary
//! (`...999999999` vs `...000000001`) therefore reports close to a full second.
//! [`SkewMode::WrapAware`] takes the shorter way around the one-second circle,
//! which is correct whenever the true skew is under half a second.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::stamp::Timestamp;
use crate::Result;

const NANOS_PER_SEC: u64 = 1_000_000_000;
const NANOS_PER_MS: f64 = 1e6;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkewMode {
    #[default]
    Suffix,
    WrapAware,
}

/// Absolute difference between two capture instants, in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SkewSample(pub f64);

impl SkewSample {
    pub fn millis(self) -> f64 {
        self.0
    }
}

impl fmt::Display for SkewSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SkewEstimator {
    mode: SkewMode,
}

impl SkewEstimator {
    pub fn new(mode: SkewMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> SkewMode {
        self.mode
    }

    pub fn estimate(&self, a: &Timestamp, b: &Timestamp) -> Result<SkewSample> {
        let na = a.suffix_nanos()?;
        let nb = b.suffix_nanos()?;
        let mut diff = na.abs_diff(nb);
        if self.mode == SkewMode::WrapAware {
            diff = diff.min(NANOS_PER_SEC - diff);
        }
        Ok(SkewSample(diff as f64 / NANOS_PER_MS))
    }
}

/// Every sample recorded during one session.
#[derive(Clone, Debug, Default)]
pub struct SkewStats {
    samples: Vec<SkewSample>,
}

impl SkewStats {
    pub fn record(&mut self, sample: SkewSample) {
        self.samples.push(sample);
    }

    pub fn samples(&self) -> &[SkewSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// `None` when nothing was recorded.
    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.iter().map(|s| s.0).sum();
        Some(sum / self.samples.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(suffix: &str) -> Timestamp {
        Timestamp::parse(&format!("2024-01-01_12-00-00.{suffix}")).unwrap()
    }

    #[test]
    fn difference_in_millis() {
        let est = SkewEstimator::default();
        let s = est.estimate(&ts("100000000"), &ts("102345678")).unwrap();
        assert_eq!(s.to_string(), "2.346");
        let s = est.estimate(&ts("102345678"), &ts("100000000")).unwrap();
        assert!((s.millis() - 2.345678).abs() < 1e-9);
    }

    #[test]
    fn aligned_suffixes_are_zero() {
        let est = SkewEstimator::default();
        let s = est.estimate(&ts("500000000"), &ts("500000000")).unwrap();
        assert_eq!(s.to_string(), "0.000");
    }

    #[test]
    fn second_boundary_suffix_mode_reports_spurious_skew() {
        let est = SkewEstimator::new(SkewMode::Suffix);
        let s = est.estimate(&ts("999000000"), &ts("001000000")).unwrap();
        assert_eq!(s.to_string(), "998.000");
    }

    #[test]
    fn second_boundary_wrap_aware_mode() {
        let est = SkewEstimator::new(SkewMode::WrapAware);
        let s = est.estimate(&ts("999000000"), &ts("001000000")).unwrap();
        assert_eq!(s.to_string(), "2.000");
        let s = est.estimate(&ts("999999999"), &ts("000000001")).unwrap();
        assert!((s.millis() - 0.000002).abs() < 1e-12);
        let s = est.estimate(&ts("100000000"), &ts("102345678")).unwrap();
        assert_eq!(s.to_string(), "2.346");
    }

    #[test]
    fn mean_of_empty_set_is_none() {
        let mut stats = SkewStats::default();
        assert!(stats.mean().is_none());
        stats.record(SkewSample(1.0));
        stats.record(SkewSample(2.0));
        assert_eq!(stats.mean(), Some(1.5));
        assert_eq!(stats.len(), 2);
    }
}
