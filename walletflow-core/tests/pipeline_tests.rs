//! Integration tests for the load → normalize → report pipeline
//!
//! Every test runs against a real DuckDB file in a temp directory.
//!
//! Run with: cargo test --test pipeline_tests -- --nocapture

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use tempfile::TempDir;

use walletflow_core::adapters::duckdb::DuckDbRepository;
use walletflow_core::services::analytics::{AgeBracket, AnomalyStatus, RankDimension};
use walletflow_core::services::{
    AnalyticsSettings, LoadOptions, LoadService, NormalizeService, Report, ReportKind,
    ReportService,
};
use walletflow_core::Error;

// ============================================================================
// Test Helpers
// ============================================================================

const HEADER: &str = "customer_id,transaction_id,amount,sent_time,received_time,recipient_id,category,payment_method,status,age,sender_bank,receiver_bank,origin_state,destination_state,channel_app,device";

/// Create a test repository with schema initialized
fn create_test_repo(temp_dir: &TempDir) -> Arc<DuckDbRepository> {
    let db_path = temp_dir.path().join("test.duckdb");
    let repo = DuckDbRepository::new(&db_path).expect("Failed to create repository");
    repo.ensure_schema().expect("Failed to initialize schema");
    Arc::new(repo)
}

/// One CSV line in input column order
fn csv_row(customer: &str, txn: &str, amount: &str, sent: &str, recipient: &str, age: &str) -> String {
    format!(
        "{customer},{txn},{amount},{sent},,{recipient},Food,UPI,SUCCESS,{age},SBI,HDFC,Goa,Assam,PhonePe,Android"
    )
}

fn write_csv(dir: &TempDir, name: &str, rows: &[String]) -> PathBuf {
    let path = dir.path().join(name);
    let mut content = String::from(HEADER);
    for row in rows {
        content.push('\n');
        content.push_str(row);
    }
    content.push('\n');
    std::fs::write(&path, content).expect("Failed to write CSV");
    path
}

fn sample_rows() -> Vec<String> {
    vec![
        csv_row("C1", "T1", "\"1,234.56\"", "2024-01-15 10:00:00", "R1", "24"),
        csv_row("C1", "T2", "₹100", "2024-02-03 11:30:00", "R2", "24"),
        csv_row("C2", "T3", "-50.5", "2024-02-10T09:15:00+00:00", "R1", "40"),
        // Duplicate id: the first T1 wins
        csv_row("C1", "T1", "999", "2024-03-01 00:00:00", "R1", "24"),
        // Unresolvable payee and a NULL age
        csv_row("C3", "T4", "20", "2024-02-10 22:00:00", "", ""),
    ]
}

fn ingested_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn load(repo: &Arc<DuckDbRepository>, path: &Path) -> anyhow::Result<walletflow_core::services::LoadResult> {
    LoadService::new(Arc::clone(repo)).load(path, &LoadOptions::default())
}

// ============================================================================
// Load Tests
// ============================================================================

#[test]
fn test_load_appends_rows_verbatim() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);
    let path = write_csv(&temp_dir, "batch.csv", &sample_rows());

    let result = load(&repo, &path).unwrap();
    assert_eq!(result.rows_loaded, 5);
    assert!(!result.batch_id.is_empty());

    let staged = repo.get_staging_records().unwrap();
    assert_eq!(staged.len(), 5);
    assert_eq!(staged[0].amount, "1,234.56");
    assert_eq!(staged[1].amount, "₹100");
    assert_eq!(staged[4].recipient_id, "");
}

#[test]
fn test_repeated_load_duplicates_staging() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);
    let path = write_csv(&temp_dir, "batch.csv", &sample_rows());

    let first = load(&repo, &path).unwrap();
    let second = load(&repo, &path).unwrap();

    assert_ne!(first.batch_id, second.batch_id);
    assert_eq!(repo.get_table_sizes().unwrap().staging_rows, 10);
}

#[test]
fn test_replace_load_clears_previous_batches() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);
    let path = write_csv(&temp_dir, "batch.csv", &sample_rows());
    load(&repo, &path).unwrap();

    let options = LoadOptions {
        replace: true,
        ..Default::default()
    };
    let result = LoadService::new(Arc::clone(&repo)).load(&path, &options).unwrap();

    assert!(result.replaced);
    assert_eq!(repo.get_table_sizes().unwrap().staging_rows, 5);
}

#[test]
fn test_structural_error_commits_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);
    let good = write_csv(&temp_dir, "good.csv", &sample_rows());
    load(&repo, &good).unwrap();

    let mut rows = sample_rows();
    rows.push("C9,T9,10".to_string());
    let bad = write_csv(&temp_dir, "bad.csv", &rows);

    let err = load(&repo, &bad).unwrap_err();
    let core = err.downcast_ref::<Error>().expect("core error in chain");
    assert!(matches!(core, Error::Load(_)));

    // Only the earlier good batch is present
    assert_eq!(repo.get_table_sizes().unwrap().staging_rows, 5);
}

#[test]
fn test_structural_error_with_replace_keeps_staging() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);
    load(&repo, &write_csv(&temp_dir, "good.csv", &sample_rows())).unwrap();

    let bad = temp_dir.path().join("bad.csv");
    std::fs::write(&bad, "a,b,c\n1,2,3\n").unwrap();
    let options = LoadOptions {
        replace: true,
        ..Default::default()
    };
    assert!(LoadService::new(Arc::clone(&repo)).load(&bad, &options).is_err());

    assert_eq!(repo.get_table_sizes().unwrap().staging_rows, 5);
}

// ============================================================================
// Normalize Tests
// ============================================================================

#[test]
fn test_normalize_projects_all_three_relations() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);
    load(&repo, &write_csv(&temp_dir, "batch.csv", &sample_rows())).unwrap();

    let result = NormalizeService::new(Arc::clone(&repo)).run(ingested_at()).unwrap();
    assert_eq!(result.staged_rows, 5);
    assert_eq!(result.users.inserted, 3);
    assert_eq!(result.recipients.inserted, 2);
    assert_eq!(result.transactions.inserted, 4);

    let txns = repo.get_transactions().unwrap();
    let t1 = txns.iter().find(|t| t.transaction_id == "T1").unwrap();
    assert_eq!(t1.amount, Some(Decimal::new(123456, 2)));
    assert_eq!(t1.payee_id.as_deref(), Some("R1"));

    let t3 = txns.iter().find(|t| t.transaction_id == "T3").unwrap();
    assert_eq!(t3.amount.unwrap().to_string(), "-50.50");

    let t4 = txns.iter().find(|t| t.transaction_id == "T4").unwrap();
    assert_eq!(t4.payee_id, None);
    assert!(txns.iter().all(|t| t.ingested_at == ingested_at()));

    let users = repo.get_users().unwrap();
    assert!(users.iter().all(|u| !u.customer_id.is_empty()));
    let c3 = users.iter().find(|u| u.customer_id == "C3").unwrap();
    assert_eq!(c3.age, None);
}

#[test]
fn test_normalize_twice_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);
    load(&repo, &write_csv(&temp_dir, "batch.csv", &sample_rows())).unwrap();
    let service = NormalizeService::new(Arc::clone(&repo));

    service.run(ingested_at()).unwrap();
    let users = repo.get_users().unwrap();
    let recipients = repo.get_recipients().unwrap();
    let transactions = repo.get_transactions().unwrap();

    // A later ingestion time must not rewrite existing rows
    let second = service.run(Utc::now()).unwrap();
    assert_eq!(second.users.inserted, 0);
    assert_eq!(second.recipients.inserted, 0);
    assert_eq!(second.transactions.inserted, 0);
    assert_eq!(second.transactions.skipped(), 4);

    assert_eq!(repo.get_users().unwrap(), users);
    assert_eq!(repo.get_recipients().unwrap(), recipients);
    assert_eq!(repo.get_transactions().unwrap(), transactions);
}

#[test]
fn test_reload_then_normalize_keeps_first_version() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);
    load(&repo, &write_csv(&temp_dir, "a.csv", &sample_rows())).unwrap();
    let service = NormalizeService::new(Arc::clone(&repo));
    service.run(ingested_at()).unwrap();

    let changed = vec![csv_row("C1", "T1", "5", "2024-05-05 05:05:05", "R1", "99")];
    load(&repo, &write_csv(&temp_dir, "b.csv", &changed)).unwrap();
    service.run(ingested_at()).unwrap();

    let txns = repo.get_transactions().unwrap();
    let t1 = txns.iter().find(|t| t.transaction_id == "T1").unwrap();
    assert_eq!(t1.amount, Some(Decimal::new(123456, 2)));
    let c1 = repo.get_users().unwrap().into_iter().find(|u| u.customer_id == "C1").unwrap();
    assert_eq!(c1.age, Some(24));
}

#[test]
fn test_cast_failure_leaves_transactions_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);
    let mut rows = sample_rows();
    rows.push(csv_row("C4", "T5", "12-34.56.78", "2024-02-10 10:00:00", "R1", "30"));
    load(&repo, &write_csv(&temp_dir, "batch.csv", &rows)).unwrap();

    let err = NormalizeService::new(Arc::clone(&repo)).run(ingested_at()).unwrap_err();
    let core = err.downcast_ref::<Error>().expect("core error in chain");
    assert!(core.is_cast());

    // Earlier projections are idempotent and stay; the failing one wrote nothing
    assert_eq!(repo.get_table_sizes().unwrap().users, 4);
    assert_eq!(repo.get_table_sizes().unwrap().transactions, 0);
}

#[test]
fn test_bad_age_fails_before_any_write() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);
    let rows = vec![csv_row("C1", "T1", "10", "2024-01-01 00:00:00", "R1", "thirty")];
    load(&repo, &write_csv(&temp_dir, "batch.csv", &rows)).unwrap();

    assert!(NormalizeService::new(Arc::clone(&repo)).run(ingested_at()).is_err());

    let sizes = repo.get_table_sizes().unwrap();
    assert_eq!((sizes.users, sizes.recipients, sizes.transactions), (0, 0, 0));
}

// ============================================================================
// Report Tests
// ============================================================================

#[test]
fn test_reports_over_normalized_store() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);
    load(&repo, &write_csv(&temp_dir, "batch.csv", &sample_rows())).unwrap();
    NormalizeService::new(Arc::clone(&repo)).run(ingested_at()).unwrap();

    let reports = ReportService::new(Arc::clone(&repo), AnalyticsSettings::default());

    let Report::Summary(summary) = reports.run(ReportKind::Summary).unwrap() else {
        panic!("expected summary");
    };
    assert_eq!(summary.total_transactions, 4);
    assert_eq!(summary.first_txn_at, Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()));

    let Report::Ranked(top) = reports.run(ReportKind::Top(RankDimension::Recipient)).unwrap() else {
        panic!("expected ranking");
    };
    assert_eq!(top[0].key.as_deref(), Some("R1"));
    assert_eq!(top[0].total_amount, Some(Decimal::new(118406, 2)));

    let Report::AgeBrackets(brackets) = reports.run(ReportKind::AgeBrackets).unwrap() else {
        panic!("expected age brackets");
    };
    let labels: Vec<AgeBracket> = brackets.iter().map(|b| b.age_bracket).collect();
    assert_eq!(labels, vec![AgeBracket::Under25, AgeBracket::From35To44]);

    let all = reports.run_all().unwrap();
    assert_eq!(all.len(), ReportKind::ALL.len());
}

#[test]
fn test_anomaly_report_through_store() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);

    let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    let rows: Vec<String> = (0..40)
        .map(|day| {
            let sent = start + chrono::Duration::days(day);
            let amount = if day == 39 { "10000" } else { "100" };
            csv_row(
                "C1",
                &format!("T{}", day),
                amount,
                &sent.format("%Y-%m-%d %H:%M:%S").to_string(),
                "R1",
                "30",
            )
        })
        .collect();
    load(&repo, &write_csv(&temp_dir, "series.csv", &rows)).unwrap();
    NormalizeService::new(Arc::clone(&repo)).run(ingested_at()).unwrap();

    let reports = ReportService::new(Arc::clone(&repo), AnalyticsSettings::default());
    let Report::Anomalies(days) = reports.run(ReportKind::Anomalies).unwrap() else {
        panic!("expected anomalies");
    };

    assert_eq!(days.len(), 40);
    assert_eq!(days[0].status, AnomalyStatus::Anomaly);
    assert!(days[1..].iter().all(|d| d.status == AnomalyStatus::Normal));
}

// ============================================================================
// Store Tests
// ============================================================================

#[test]
fn test_store_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let repo = create_test_repo(&temp_dir);
        load(&repo, &write_csv(&temp_dir, "batch.csv", &sample_rows())).unwrap();
        NormalizeService::new(Arc::clone(&repo)).run(ingested_at()).unwrap();
    }

    let repo = create_test_repo(&temp_dir);
    let sizes = repo.get_table_sizes().unwrap();
    assert_eq!(sizes.staging_rows, 5);
    assert_eq!(sizes.transactions, 4);
    assert!(repo.run_migrations().unwrap().applied.is_empty());
}

#[test]
fn test_doctor_counts_soft_references() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);
    load(&repo, &write_csv(&temp_dir, "batch.csv", &sample_rows())).unwrap();

    // Nothing normalized yet: every distinct staged id is pending
    assert_eq!(repo.get_reference_counts().unwrap().pending_staged_ids, 4);

    NormalizeService::new(Arc::clone(&repo)).run(ingested_at()).unwrap();
    let counts = repo.get_reference_counts().unwrap();
    assert_eq!(counts.pending_staged_ids, 0);
    assert_eq!(counts.unresolved_payers, 0);
    assert_eq!(counts.unresolved_payees, 0);
    assert_eq!(counts.null_payees, 1);
}

#[test]
fn test_query_is_read_only() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);
    load(&repo, &write_csv(&temp_dir, "batch.csv", &sample_rows())).unwrap();

    let result = repo
        .execute_query("SELECT COUNT(*) AS n FROM staging_transactions")
        .unwrap();
    assert_eq!(result.columns, vec!["n"]);
    assert_eq!(result.rows[0][0], 5);

    assert!(repo.execute_query("DELETE FROM staging_transactions").is_err());
    assert_eq!(repo.get_table_sizes().unwrap().staging_rows, 5);
}
