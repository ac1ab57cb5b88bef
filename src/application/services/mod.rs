//! Application services

pub mod performance;
pub mod qualification;
pub mod snapshot;

pub use performance::{BonusTotals, CohortAggregate, CohortReport, PerformanceAggregator};
pub use qualification::{
    b1_checker, b2_checker, bq_checker, CheckReport, CheckSummary, LevelChecker,
    QualificationService, RuleSet,
};
pub use snapshot::SnapshotService;
