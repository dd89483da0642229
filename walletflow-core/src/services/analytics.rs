//! Analytics catalogue - read-only aggregations over normalized relations
//!
//! Each report is a pure function of the transactions (and users) handed to
//! it. Row types serialize with the column names the reporting layer reads,
//! in declaration order.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::adapters::duckdb::QueryResult;
use crate::domain::result::{Error, Result};
use crate::domain::{Transaction, User};

/// Tunables for the catalogue. Defaults are the published contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsSettings {
    pub top_n: usize,
    pub corridor_limit: usize,
    pub anomaly_window_days: usize,
    pub anomaly_sigma: f64,
    pub anomaly_row_limit: usize,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            top_n: 20,
            corridor_limit: 50,
            anomaly_window_days: 30,
            anomaly_sigma: 3.0,
            anomaly_row_limit: 200,
        }
    }
}

/// A report row with a fixed column order
pub trait ReportRow: Serialize {
    /// Column names, matching the serialized field names
    const COLUMNS: &'static [&'static str];

    /// Cell values in column order.
    ///
    /// A row that does not serialize to a JSON object is an error; a column
    /// missing from the object is a NULL cell.
    fn values(&self) -> Result<Vec<serde_json::Value>> {
        let object = match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => map,
            other => {
                return Err(Error::validation(format!(
                    "report row serialized to {} instead of an object",
                    other
                )))
            }
        };
        Ok(Self::COLUMNS
            .iter()
            .map(|c| object.get(*c).cloned().unwrap_or(serde_json::Value::Null))
            .collect())
    }
}

/// Render report rows in the same shape as an ad-hoc query result
pub fn to_query_result<R: ReportRow>(rows: &[R]) -> Result<QueryResult> {
    Ok(QueryResult {
        columns: R::COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows: rows.iter().map(|r| r.values()).collect::<Result<_>>()?,
        row_count: rows.len(),
    })
}

/// SQL-style SUM: NULLs are skipped, and a group with only NULLs sums to NULL.
/// Sums past the decimal range saturate at `Decimal::MAX` / `Decimal::MIN`.
fn add_amount(total: &mut Option<Decimal>, amount: Option<Decimal>) {
    if let Some(a) = amount {
        let current = total.unwrap_or(Decimal::ZERO);
        let sum = current.checked_add(a).unwrap_or(if a.is_sign_negative() {
            Decimal::MIN
        } else {
            Decimal::MAX
        });
        *total = Some(sum);
    }
}

fn to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or_default()
}

fn month_start(ts: DateTime<Utc>) -> NaiveDate {
    let date = ts.date_naive();
    date - Duration::days(date.day0() as i64)
}

#[derive(Debug, Default, Clone, Copy)]
struct GroupTotals {
    count: i64,
    total: Option<Decimal>,
}

impl GroupTotals {
    fn add(&mut self, amount: Option<Decimal>) {
        self.count += 1;
        add_amount(&mut self.total, amount);
    }
}

// ============================================================================
// 1. Global summary
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_transactions: i64,
    pub first_txn_at: Option<DateTime<Utc>>,
    pub last_txn_at: Option<DateTime<Utc>>,
}

impl ReportRow for Summary {
    const COLUMNS: &'static [&'static str] = &["total_transactions", "first_txn_at", "last_txn_at"];
}

pub fn summary(transactions: &[Transaction]) -> Summary {
    let sent = transactions.iter().filter_map(|t| t.sent_at);
    Summary {
        total_transactions: transactions.len() as i64,
        first_txn_at: sent.clone().min(),
        last_txn_at: sent.max(),
    }
}

// ============================================================================
// 2. Top-N rankings
// ============================================================================

/// Grouping key for a top-N ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankDimension {
    Recipient,
    ChannelApp,
    OriginState,
}

impl RankDimension {
    pub const ALL: [RankDimension; 3] = [Self::Recipient, Self::ChannelApp, Self::OriginState];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recipient => "recipient",
            Self::ChannelApp => "channel_app",
            Self::OriginState => "origin_state",
        }
    }

    fn key<'a>(&self, t: &'a Transaction) -> Option<&'a str> {
        match self {
            Self::Recipient => t.payee_id.as_deref(),
            Self::ChannelApp => t.channel_app.as_deref(),
            Self::OriginState => t.origin_state.as_deref(),
        }
    }
}

impl fmt::Display for RankDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RankDimension {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "recipient" | "recipients" | "payee" => Ok(Self::Recipient),
            "channel_app" | "app" | "channel" => Ok(Self::ChannelApp),
            "origin_state" | "state" => Ok(Self::OriginState),
            other => Err(Error::validation(format!("unknown ranking dimension: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedGroup {
    pub key: Option<String>,
    pub txn_count: i64,
    pub total_amount: Option<Decimal>,
}

impl ReportRow for RankedGroup {
    const COLUMNS: &'static [&'static str] = &["key", "txn_count", "total_amount"];
}

/// Groups by `dimension`, sorted by summed amount descending, at most `n` rows.
///
/// Groups whose amounts are all NULL sort last.
pub fn top_n(transactions: &[Transaction], dimension: RankDimension, n: usize) -> Vec<RankedGroup> {
    let mut groups: BTreeMap<Option<&str>, GroupTotals> = BTreeMap::new();
    for t in transactions {
        groups.entry(dimension.key(t)).or_default().add(t.amount);
    }

    let mut ranked: Vec<RankedGroup> = groups
        .into_iter()
        .map(|(key, g)| RankedGroup {
            key: key.map(str::to_string),
            txn_count: g.count,
            total_amount: g.total,
        })
        .collect();
    ranked.sort_by(|a, b| b.total_amount.cmp(&a.total_amount));
    ranked.truncate(n);
    ranked
}

// ============================================================================
// 3. Hour-of-day rollup
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyBucket {
    pub hour: u32,
    pub txn_count: i64,
    pub total_amount: Option<Decimal>,
}

impl ReportRow for HourlyBucket {
    const COLUMNS: &'static [&'static str] = &["hour", "txn_count", "total_amount"];
}

/// Hour 0-23 of `sent_at` as stored (UTC); untimed rows are left out
pub fn hourly(transactions: &[Transaction]) -> Vec<HourlyBucket> {
    let mut buckets: BTreeMap<u32, GroupTotals> = BTreeMap::new();
    for t in transactions {
        if let Some(sent) = t.sent_at {
            buckets.entry(sent.hour()).or_default().add(t.amount);
        }
    }
    buckets
        .into_iter()
        .map(|(hour, g)| HourlyBucket {
            hour,
            txn_count: g.count,
            total_amount: g.total,
        })
        .collect()
}

// ============================================================================
// 4. Cohort cumulative spend
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortSpend {
    pub cohort_month: NaiveDate,
    pub activity_month: NaiveDate,
    pub monthly_spend: Option<Decimal>,
    pub cumulative_spend: Option<Decimal>,
}

impl ReportRow for CohortSpend {
    const COLUMNS: &'static [&'static str] =
        &["cohort_month", "activity_month", "monthly_spend", "cumulative_spend"];
}

/// Spend per (cohort, month) with a running total inside each cohort.
///
/// A payer's cohort is the month of their first `sent_at`. Rows without a
/// payer or a timestamp cannot be placed and are skipped.
pub fn cohort_spend(transactions: &[Transaction]) -> Vec<CohortSpend> {
    let mut first_seen: HashMap<&str, DateTime<Utc>> = HashMap::new();
    for t in transactions {
        if let (Some(payer), Some(sent)) = (t.payer_id.as_deref(), t.sent_at) {
            first_seen
                .entry(payer)
                .and_modify(|first| *first = (*first).min(sent))
                .or_insert(sent);
        }
    }

    let mut spend: BTreeMap<(NaiveDate, NaiveDate), Option<Decimal>> = BTreeMap::new();
    for t in transactions {
        let (Some(payer), Some(sent)) = (t.payer_id.as_deref(), t.sent_at) else {
            continue;
        };
        let Some(first) = first_seen.get(payer) else {
            continue;
        };
        let cell = spend.entry((month_start(*first), month_start(sent))).or_default();
        add_amount(cell, t.amount);
    }

    let mut rows = Vec::with_capacity(spend.len());
    let mut current_cohort = None;
    let mut running: Option<Decimal> = None;
    for ((cohort, month), monthly) in spend {
        if current_cohort != Some(cohort) {
            current_cohort = Some(cohort);
            running = None;
        }
        add_amount(&mut running, monthly);
        rows.push(CohortSpend {
            cohort_month: cohort,
            activity_month: month,
            monthly_spend: monthly,
            cumulative_spend: running,
        });
    }
    rows
}

// ============================================================================
// 5. Rolling z-score anomalies
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnomalyStatus {
    #[serde(rename = "ANOMALY")]
    Anomaly,
    #[serde(rename = "normal")]
    Normal,
}

impl fmt::Display for AnomalyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anomaly => f.write_str("ANOMALY"),
            Self::Normal => f.write_str("normal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyAnomaly {
    pub day: NaiveDate,
    pub daily_volume: Option<Decimal>,
    pub rolling_mean: Option<f64>,
    pub rolling_std: Option<f64>,
    pub status: AnomalyStatus,
}

impl ReportRow for DailyAnomaly {
    const COLUMNS: &'static [&'static str] =
        &["day", "daily_volume", "rolling_mean", "rolling_std", "status"];
}

/// Mean and sample standard deviation, ignoring NULLs like SQL AVG/STDDEV
fn window_stats(window: &[Option<Decimal>]) -> (Option<f64>, Option<f64>) {
    let values: Vec<f64> = window.iter().flatten().map(|d| to_f64(*d)).collect();
    let n = values.len();
    if n == 0 {
        return (None, None);
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    if n < 2 {
        return (Some(mean), None);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (Some(mean), Some(variance.sqrt()))
}

/// Flags days whose volume sits more than `sigma` standard deviations from
/// the mean of the preceding `window` day buckets.
///
/// The window never includes the current day. Days with activity are the
/// buckets; calendar gaps are not filled. Newest day first, at most `limit`
/// rows.
pub fn anomalies(
    transactions: &[Transaction],
    window: usize,
    sigma: f64,
    limit: usize,
) -> Vec<DailyAnomaly> {
    let mut daily: BTreeMap<NaiveDate, Option<Decimal>> = BTreeMap::new();
    for t in transactions {
        if let Some(sent) = t.sent_at {
            add_amount(daily.entry(sent.date_naive()).or_default(), t.amount);
        }
    }

    let days: Vec<(NaiveDate, Option<Decimal>)> = daily.into_iter().collect();
    let volumes: Vec<Option<Decimal>> = days.iter().map(|(_, v)| *v).collect();

    let mut rows: Vec<DailyAnomaly> = days
        .iter()
        .enumerate()
        .map(|(i, (day, volume))| {
            let start = i.saturating_sub(window);
            let (mean, std) = window_stats(&volumes[start..i]);
            let is_anomaly = match (volume, mean, std) {
                (Some(v), Some(m), Some(s)) => (to_f64(*v) - m).abs() > sigma * s,
                _ => false,
            };
            DailyAnomaly {
                day: *day,
                daily_volume: *volume,
                rolling_mean: mean,
                rolling_std: std,
                status: if is_anomaly {
                    AnomalyStatus::Anomaly
                } else {
                    AnomalyStatus::Normal
                },
            }
        })
        .collect();

    rows.reverse();
    rows.truncate(limit);
    rows
}

// ============================================================================
// 6. Payer -> payee corridors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Corridor {
    pub payer_id: Option<String>,
    pub payee_id: Option<String>,
    pub txn_count: i64,
    pub total_amount: Option<Decimal>,
}

impl ReportRow for Corridor {
    const COLUMNS: &'static [&'static str] = &["payer_id", "payee_id", "txn_count", "total_amount"];
}

pub fn corridors(transactions: &[Transaction], limit: usize) -> Vec<Corridor> {
    let mut pairs: BTreeMap<(Option<&str>, Option<&str>), GroupTotals> = BTreeMap::new();
    for t in transactions {
        pairs
            .entry((t.payer_id.as_deref(), t.payee_id.as_deref()))
            .or_default()
            .add(t.amount);
    }

    let mut ranked: Vec<Corridor> = pairs
        .into_iter()
        .map(|((payer, payee), g)| Corridor {
            payer_id: payer.map(str::to_string),
            payee_id: payee.map(str::to_string),
            txn_count: g.count,
            total_amount: g.total,
        })
        .collect();
    ranked.sort_by(|a, b| b.total_amount.cmp(&a.total_amount));
    ranked.truncate(limit);
    ranked
}

// ============================================================================
// 7. Age brackets
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgeBracket {
    #[serde(rename = "<25")]
    Under25,
    #[serde(rename = "25-34")]
    From25To34,
    #[serde(rename = "35-44")]
    From35To44,
    #[serde(rename = "45-54")]
    From45To54,
    #[serde(rename = "55+")]
    From55,
}

impl AgeBracket {
    /// Inclusive bounds: 25 and 34 are both `25-34`
    pub fn from_age(age: i32) -> Self {
        match age {
            i32::MIN..=24 => Self::Under25,
            25..=34 => Self::From25To34,
            35..=44 => Self::From35To44,
            45..=54 => Self::From45To54,
            _ => Self::From55,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Under25 => "<25",
            Self::From25To34 => "25-34",
            Self::From35To44 => "35-44",
            Self::From45To54 => "45-54",
            Self::From55 => "55+",
        }
    }
}

impl fmt::Display for AgeBracket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgeBracketStats {
    pub age_bracket: AgeBracket,
    pub user_count: i64,
    pub avg_txn_count: f64,
    pub avg_txn_amount: Option<f64>,
}

impl ReportRow for AgeBracketStats {
    const COLUMNS: &'static [&'static str] =
        &["age_bracket", "user_count", "avg_txn_count", "avg_txn_amount"];
}

#[derive(Default)]
struct UserActivity {
    count: i64,
    amount_sum: Decimal,
    amount_count: i64,
}

/// Two-level average: per-user count and mean amount first, then the mean
/// of those per bracket.
///
/// Only users with a known age and at least one transaction as payer take
/// part; brackets nobody falls into are left out.
pub fn age_brackets(users: &[User], transactions: &[Transaction]) -> Vec<AgeBracketStats> {
    let mut activity: HashMap<&str, UserActivity> = HashMap::new();
    for t in transactions {
        if let Some(payer) = t.payer_id.as_deref() {
            let entry = activity.entry(payer).or_default();
            entry.count += 1;
            if let Some(a) = t.amount {
                entry.amount_sum += a;
                entry.amount_count += 1;
            }
        }
    }

    #[derive(Default)]
    struct BracketAcc {
        users: i64,
        count_sum: f64,
        mean_sum: f64,
        mean_users: i64,
    }

    let mut brackets: BTreeMap<AgeBracket, BracketAcc> = BTreeMap::new();
    for user in users {
        let (Some(age), Some(act)) = (user.age, activity.get(user.customer_id.as_str())) else {
            continue;
        };
        let acc = brackets.entry(AgeBracket::from_age(age)).or_default();
        acc.users += 1;
        acc.count_sum += act.count as f64;
        if act.amount_count > 0 {
            acc.mean_sum += to_f64(act.amount_sum / Decimal::from(act.amount_count));
            acc.mean_users += 1;
        }
    }

    brackets
        .into_iter()
        .map(|(bracket, acc)| AgeBracketStats {
            age_bracket: bracket,
            user_count: acc.users,
            avg_txn_count: acc.count_sum / acc.users as f64,
            avg_txn_amount: if acc.mean_users > 0 {
                Some(acc.mean_sum / acc.mean_users as f64)
            } else {
                None
            },
        })
        .collect()
}
