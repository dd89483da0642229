//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and the DuckDB repository. Each service
//! covers one stage of the batch or one read-only view of the store.

pub mod analytics;
mod doctor;
pub mod load;
pub mod migration;
pub mod normalize;
mod query;
pub mod report;
mod status;

pub use analytics::AnalyticsSettings;
pub use doctor::{CheckResult, CheckStatus, DoctorResult, DoctorService, DoctorSummary};
pub use load::{LoadOptions, LoadResult, LoadService};
pub use migration::{MigrationResult, MigrationService};
pub use normalize::{NormalizeResult, NormalizeService, TableCounts};
pub use query::QueryService;
pub use report::{Report, ReportKind, ReportService};
pub use status::{DateRange, StatusService, StatusSummary};
