//! Report service - runs the analytics catalogue against the store

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::adapters::duckdb::{DuckDbRepository, QueryResult};
use crate::domain::result::Error;
use crate::domain::{Transaction, User};
use crate::services::analytics::{
    self, to_query_result, AgeBracketStats, AnalyticsSettings, CohortSpend, Corridor,
    DailyAnomaly, HourlyBucket, RankDimension, RankedGroup, Summary,
};

/// One entry of the report catalogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    Summary,
    Top(RankDimension),
    Hourly,
    CohortSpend,
    Anomalies,
    Corridors,
    AgeBrackets,
}

impl ReportKind {
    /// Catalogue order
    pub const ALL: [ReportKind; 9] = [
        Self::Summary,
        Self::Top(RankDimension::Recipient),
        Self::Top(RankDimension::ChannelApp),
        Self::Top(RankDimension::OriginState),
        Self::Hourly,
        Self::CohortSpend,
        Self::Anomalies,
        Self::Corridors,
        Self::AgeBrackets,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Top(RankDimension::Recipient) => "top-recipients",
            Self::Top(RankDimension::ChannelApp) => "top-channel-apps",
            Self::Top(RankDimension::OriginState) => "top-origin-states",
            Self::Hourly => "hourly",
            Self::CohortSpend => "cohort-spend",
            Self::Anomalies => "anomalies",
            Self::Corridors => "corridors",
            Self::AgeBrackets => "age-brackets",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        if let Some(kind) = Self::ALL.iter().find(|k| k.name() == wanted) {
            return Ok(*kind);
        }
        // "top-<dimension>" with any spelling the dimension accepts
        if let Some(dimension) = wanted.strip_prefix("top-") {
            return dimension.parse().map(Self::Top);
        }
        Err(Error::validation(format!("unknown report: {}", s)))
    }
}

/// Typed output of one report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Report {
    Summary(Summary),
    Ranked(Vec<RankedGroup>),
    Hourly(Vec<HourlyBucket>),
    CohortSpend(Vec<CohortSpend>),
    Anomalies(Vec<DailyAnomaly>),
    Corridors(Vec<Corridor>),
    AgeBrackets(Vec<AgeBracketStats>),
}

impl Report {
    /// Tabular form for table and CSV rendering
    pub fn to_query_result(&self) -> Result<QueryResult> {
        let table = match self {
            Self::Summary(s) => to_query_result(std::slice::from_ref(s)),
            Self::Ranked(rows) => to_query_result(rows),
            Self::Hourly(rows) => to_query_result(rows),
            Self::CohortSpend(rows) => to_query_result(rows),
            Self::Anomalies(rows) => to_query_result(rows),
            Self::Corridors(rows) => to_query_result(rows),
            Self::AgeBrackets(rows) => to_query_result(rows),
        };
        Ok(table?)
    }

    pub fn row_count(&self) -> usize {
        match self {
            Self::Summary(_) => 1,
            Self::Ranked(rows) => rows.len(),
            Self::Hourly(rows) => rows.len(),
            Self::CohortSpend(rows) => rows.len(),
            Self::Anomalies(rows) => rows.len(),
            Self::Corridors(rows) => rows.len(),
            Self::AgeBrackets(rows) => rows.len(),
        }
    }
}

/// Evaluate one report over already-loaded relations
pub fn evaluate(
    kind: ReportKind,
    users: &[User],
    transactions: &[Transaction],
    settings: &AnalyticsSettings,
) -> Report {
    match kind {
        ReportKind::Summary => Report::Summary(analytics::summary(transactions)),
        ReportKind::Top(dimension) => {
            Report::Ranked(analytics::top_n(transactions, dimension, settings.top_n))
        }
        ReportKind::Hourly => Report::Hourly(analytics::hourly(transactions)),
        ReportKind::CohortSpend => Report::CohortSpend(analytics::cohort_spend(transactions)),
        ReportKind::Anomalies => Report::Anomalies(analytics::anomalies(
            transactions,
            settings.anomaly_window_days,
            settings.anomaly_sigma,
            settings.anomaly_row_limit,
        )),
        ReportKind::Corridors => {
            Report::Corridors(analytics::corridors(transactions, settings.corridor_limit))
        }
        ReportKind::AgeBrackets => Report::AgeBrackets(analytics::age_brackets(users, transactions)),
    }
}

/// Report service
pub struct ReportService {
    repository: Arc<DuckDbRepository>,
    settings: AnalyticsSettings,
}

impl ReportService {
    pub fn new(repository: Arc<DuckDbRepository>, settings: AnalyticsSettings) -> Self {
        Self {
            repository,
            settings,
        }
    }

    /// Run a single report
    pub fn run(&self, kind: ReportKind) -> Result<Report> {
        Ok(self.run_many(&[kind])?.remove(0).1)
    }

    /// Run several reports over one read of the store
    pub fn run_many(&self, kinds: &[ReportKind]) -> Result<Vec<(ReportKind, Report)>> {
        let transactions = self.repository.get_transactions()?;
        let users = if kinds.contains(&ReportKind::AgeBrackets) {
            self.repository.get_users()?
        } else {
            Vec::new()
        };
        debug!(
            transactions = transactions.len(),
            users = users.len(),
            "relations loaded for reporting"
        );

        let reports: Vec<(ReportKind, Report)> = kinds
            .iter()
            .map(|kind| (*kind, evaluate(*kind, &users, &transactions, &self.settings)))
            .collect();

        for (kind, report) in &reports {
            info!(report = %kind, rows = report.row_count(), "report evaluated");
        }
        Ok(reports)
    }

    /// Run the whole catalogue in order
    pub fn run_all(&self) -> Result<Vec<(ReportKind, Report)>> {
        self.run_many(&ReportKind::ALL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    fn txn(id: &str, payer: &str, amount: i64) -> Transaction {
        let mut t = Transaction::new(id, Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        t.payer_id = Some(payer.to_string());
        t.payee_id = Some("R1".to_string());
        t.amount = Some(Decimal::new(amount, 0));
        t.sent_at = Some(Utc.with_ymd_and_hms(2024, 3, 10, 14, 0, 0).unwrap());
        t
    }

    #[test]
    fn test_report_names_round_trip() {
        for kind in ReportKind::ALL {
            assert_eq!(kind.name().parse::<ReportKind>().unwrap(), kind);
        }
        assert_eq!(
            "top_recipients".parse::<ReportKind>().unwrap(),
            ReportKind::Top(RankDimension::Recipient)
        );
        assert_eq!(
            "top-state".parse::<ReportKind>().unwrap(),
            ReportKind::Top(RankDimension::OriginState)
        );
        assert!("weekly".parse::<ReportKind>().is_err());
    }

    #[test]
    fn test_summary_renders_as_single_row() {
        let txns = vec![txn("T1", "C1", 10), txn("T2", "C2", 20)];
        let report = evaluate(ReportKind::Summary, &[], &txns, &AnalyticsSettings::default());
        let table = report.to_query_result().unwrap();
        assert_eq!(table.columns, vec!["total_transactions", "first_txn_at", "last_txn_at"]);
        assert_eq!(table.row_count, 1);
        assert_eq!(table.rows[0][0], 2);
    }

    #[test]
    fn test_settings_cap_rankings() {
        let txns: Vec<Transaction> = (0..5)
            .map(|i| {
                let mut t = txn(&format!("T{}", i), "C1", 10 * (i + 1));
                t.channel_app = Some(format!("App{}", i));
                t
            })
            .collect();
        let settings = AnalyticsSettings {
            top_n: 2,
            ..Default::default()
        };

        let report = evaluate(ReportKind::Top(RankDimension::ChannelApp), &[], &txns, &settings);
        let Report::Ranked(rows) = report else {
            panic!("expected ranked rows");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key.as_deref(), Some("App4"));
    }

    #[test]
    fn test_empty_store_reports_are_empty_not_errors() {
        let settings = AnalyticsSettings::default();
        for kind in ReportKind::ALL {
            let report = evaluate(kind, &[], &[], &settings);
            match report {
                Report::Summary(s) => assert_eq!(s.total_transactions, 0),
                other => assert_eq!(other.row_count(), 0, "{} not empty", kind),
            }
        }
    }
}
