//! Service container for dependency injection
//!
//! Wires up all services with their dependencies.

use std::io::ErrorKind;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::application::services::{
    PerformanceAggregator, QualificationService, RuleSet, SnapshotService,
};
use crate::application::{ApplicationError, ApplicationResult, ThresholdConfig, ThresholdRule};
use crate::config::Settings;
use crate::domain::{DayWindow, TreeBuilder};
use crate::infrastructure::error::{InfraError, InfraResult};
use crate::infrastructure::traits::{Clock, Ledger, MemoryLedger, PartnerFeed, SystemClock, TomlFeed};

/// Container holding all application services.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Relationship feed the snapshot is built from
    pub feed: Arc<dyn PartnerFeed>,

    /// Published partner tree
    pub snapshots: Arc<SnapshotService>,

    /// Ledger-backed aggregation
    pub aggregator: Arc<PerformanceAggregator>,

    /// Wall clock for promotions and trailing windows
    pub clock: Arc<dyn Clock>,
}

impl ServiceContainer {
    /// Create a service container from settings with file-backed feed and ledger.
    pub fn new(settings: Settings) -> InfraResult<Self> {
        let feed_path = settings.feed_path.clone().ok_or_else(|| {
            InfraError::from(ApplicationError::Config {
                message: "no partner feed configured (feed_path / --feed)".to_string(),
            })
        })?;
        let ledger: Arc<dyn Ledger> = match &settings.ledger_path {
            Some(path) => Arc::new(MemoryLedger::from_toml_file(path).map_err(|e| {
                let context = format!("load ledger {}", path.display());
                match e.kind() {
                    ErrorKind::InvalidData => InfraError::Parse {
                        context,
                        message: e.to_string(),
                    },
                    _ => InfraError::io(context, e),
                }
            })?),
            None => Arc::new(MemoryLedger::default()),
        };
        Self::with_deps(
            settings,
            Arc::new(TomlFeed::new(feed_path)),
            ledger,
            Arc::new(SystemClock),
        )
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(
        settings: Settings,
        feed: Arc<dyn PartnerFeed>,
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn Clock>,
    ) -> InfraResult<Self> {
        let builder = if settings.lenient_upgrade_times {
            TreeBuilder::new().lenient_upgrade_times()
        } else {
            TreeBuilder::new()
        };
        let snapshots = Arc::new(SnapshotService::load(feed.as_ref(), builder)?);
        let aggregator =
            Arc::new(PerformanceAggregator::new(ledger).with_timeout(settings.ledger_timeout()));

        Ok(Self {
            settings: Arc::new(settings),
            feed,
            snapshots,
            aggregator,
            clock,
        })
    }

    /// Calendar-day window in the configured offset.
    pub fn window(&self, start: &str, end: &str) -> ApplicationResult<DayWindow> {
        Ok(DayWindow::parse(start, end, self.settings.utc_offset()?)?)
    }

    /// Threshold rules for every level, GMV measured over trailing windows ending today.
    pub fn rule_set(&self) -> ApplicationResult<RuleSet> {
        let rules = &self.settings.rules;
        Ok(RuleSet {
            bq: Arc::new(self.threshold_rule(&rules.bq)?),
            b1: Arc::new(self.threshold_rule(&rules.b1)?),
            b2: Arc::new(self.threshold_rule(&rules.b2)?),
        })
    }

    pub fn qualification(&self) -> ApplicationResult<QualificationService> {
        Ok(
            QualificationService::new(Arc::clone(&self.snapshots), self.rule_set()?)
                .with_clock(Arc::clone(&self.clock)),
        )
    }

    /// Rebuild the snapshot from the feed and swap it in.
    pub fn reload(&self) -> ApplicationResult<()> {
        self.snapshots.rebuild(self.feed.as_ref()).map(|_| ())
    }

    fn threshold_rule(&self, config: &ThresholdConfig) -> ApplicationResult<ThresholdRule> {
        let offset = self.settings.utc_offset()?;
        let today = DateTime::<Utc>::from_timestamp(self.clock.now(), 0)
            .unwrap_or_default()
            .with_timezone(&offset)
            .date_naive();
        let window = DayWindow::trailing_days(today, config.gmv_window_days, offset)?;
        Ok(ThresholdRule::new(config.clone()).with_performance(Arc::clone(&self.aggregator), window))
    }
}
