//! Doctor service - soft-reference integrity report
//!
//! Payer and payee ids are never enforced at insert time. The doctor counts
//! what does not resolve and reports it; nothing is repaired.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::adapters::duckdb::{DuckDbRepository, ReferenceCounts};

/// Doctor service for health checks
pub struct DoctorService {
    repository: Arc<DuckDbRepository>,
}

impl DoctorService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Run all health checks
    pub fn run_checks(&self) -> Result<DoctorResult> {
        let counts = self.repository.get_reference_counts()?;
        Ok(DoctorResult::from_counts(&counts))
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorResult {
    pub checks: BTreeMap<String, CheckResult>,
    pub summary: DoctorSummary,
}

impl DoctorResult {
    fn from_counts(counts: &ReferenceCounts) -> Self {
        let mut checks = BTreeMap::new();
        let mut add = |name: &str, count: i64, ok: &str, problem: String| {
            checks.insert(name.to_string(), CheckResult::warn_if(count, ok, problem));
        };

        add(
            "unresolved_payers",
            counts.unresolved_payers,
            "Every payer id resolves to a user",
            format!("{} transaction(s) reference payers missing from users", counts.unresolved_payers),
        );
        add(
            "unresolved_payees",
            counts.unresolved_payees,
            "Every payee id resolves to a recipient",
            format!("{} transaction(s) reference payees missing from recipients", counts.unresolved_payees),
        );
        add(
            "missing_payers",
            counts.null_payers,
            "Every transaction has a payer",
            format!("{} transaction(s) have no payer id", counts.null_payers),
        );
        add(
            "missing_payees",
            counts.null_payees,
            "Every transaction has a payee",
            format!("{} transaction(s) have no payee id", counts.null_payees),
        );
        add(
            "missing_amounts",
            counts.null_amounts,
            "Every transaction has an amount",
            format!("{} transaction(s) have no amount", counts.null_amounts),
        );
        add(
            "missing_sent_time",
            counts.null_sent_at,
            "Every transaction has a sent time",
            format!("{} transaction(s) have no sent time and are left out of time-based reports", counts.null_sent_at),
        );
        add(
            "pending_staging",
            counts.pending_staged_ids,
            "All staged transactions are normalized",
            format!("{} staged transaction id(s) not normalized yet, run `wf normalize`", counts.pending_staged_ids),
        );

        let passed = checks.values().filter(|c| c.status == CheckStatus::Pass).count() as i64;
        let warnings = checks.values().filter(|c| c.status == CheckStatus::Warning).count() as i64;

        Self {
            checks,
            summary: DoctorSummary { passed, warnings },
        }
    }

    pub fn is_clean(&self) -> bool {
        self.summary.warnings == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warning,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    pub message: String,
    pub count: i64,
}

impl CheckResult {
    fn warn_if(count: i64, ok: &str, problem: String) -> Self {
        if count == 0 {
            Self {
                status: CheckStatus::Pass,
                message: ok.to_string(),
                count,
            }
        } else {
            Self {
                status: CheckStatus::Warning,
                message: problem,
                count,
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorSummary {
    pub passed: i64,
    pub warnings: i64,
}
