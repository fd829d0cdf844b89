//! Aggregate outcome of a distribution run.

use serde::Serialize;

use crate::error::{DistributionFailures, DistributionWriteError, Error, Result};

use super::target::TargetKind;

/// Outcome for one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetReport {
    pub target: String,
    pub kind: TargetKind,
    /// Keys (or blob name) written in this run
    pub written: Vec<String>,
    /// Already up to date
    pub unchanged: Vec<String>,
    /// Blank values, intentionally not written
    pub skipped: Vec<String>,
    /// Not attempted because the run was cancelled
    pub incomplete: Vec<String>,
    pub failures: Vec<DistributionWriteError>,
}

impl TargetReport {
    pub fn new(target: impl Into<String>, kind: TargetKind) -> Self {
        Self {
            target: target.into(),
            kind,
            written: Vec::new(),
            unchanged: Vec::new(),
            skipped: Vec::new(),
            incomplete: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Every attempted write landed and nothing was left behind
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.incomplete.is_empty()
    }

    pub(crate) fn sort(&mut self) {
        self.written.sort();
        self.unchanged.sort();
        self.skipped.sort();
        self.incomplete.sort();
        self.failures
            .sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.reason.cmp(&b.reason)));
    }
}

/// Outcome of a whole run, one entry per target in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistributionReport {
    pub targets: Vec<TargetReport>,
    pub cancelled: bool,
}

impl DistributionReport {
    pub fn target(&self, name: &str) -> Option<&TargetReport> {
        self.targets.iter().find(|t| t.target == name)
    }

    pub fn failures(&self) -> Vec<DistributionWriteError> {
        self.targets
            .iter()
            .flat_map(|t| t.failures.iter().cloned())
            .collect()
    }

    pub fn written_count(&self) -> usize {
        self.targets.iter().map(|t| t.written.len()).sum()
    }

    pub fn is_success(&self) -> bool {
        !self.cancelled && self.targets.iter().all(TargetReport::is_success)
    }

    /// `Err(Error::Distribution)` when any write failed
    pub fn into_result(self) -> Result<Self> {
        let failures = self.failures();
        if failures.is_empty() {
            Ok(self)
        } else {
            Err(Error::Distribution(DistributionFailures(failures)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_result_aggregates_failures() {
        let ok = TargetReport::new("a", TargetKind::Build);
        let mut bad = TargetReport::new("b", TargetKind::Runtime);
        bad.failures.push(DistributionWriteError {
            target: "b".to_string(),
            key: "K".to_string(),
            reason: "403 Forbidden".to_string(),
        });
        let report = DistributionReport {
            targets: vec![ok, bad],
            cancelled: false,
        };

        assert!(report.target("a").unwrap().is_success());
        let err = report.into_result().unwrap_err();
        assert_eq!(
            err.to_string(),
            "secret distribution failed: 1 write(s) failed; b/K: 403 Forbidden"
        );
    }

    #[test]
    fn incomplete_target_is_not_success() {
        let mut report = TargetReport::new("a", TargetKind::Build);
        report.incomplete.push("K".to_string());
        assert!(!report.is_success());
    }
}
