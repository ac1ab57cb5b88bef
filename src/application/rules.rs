//! Promotion predicates evaluated by the level checkers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::application::services::PerformanceAggregator;
use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::{DayWindow, Level, Partner, PartnerTree};

/// Which neighbours' state a rule reads. Checkers order their pass so that
/// those neighbours are final before the rule sees them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleDependency {
    /// Reads recruiters' levels: evaluate top-down
    Ancestors,
    /// Reads recruits' levels: evaluate bottom-up
    Descendants,
    /// Reads only the partner itself and external data
    Independent,
}

/// A level-specific promotion predicate.
pub trait PromotionRule: Send + Sync {
    fn dependency(&self) -> RuleDependency;

    /// Whether `partner` currently satisfies the promotion requirements.
    fn evaluate(&self, tree: &PartnerTree, partner: &Partner) -> ApplicationResult<bool>;
}

/// Rule from a closure, handy for ad-hoc policies and tests.
pub struct FnRule<F> {
    dependency: RuleDependency,
    f: F,
}

impl<F> FnRule<F>
where
    F: Fn(&PartnerTree, &Partner) -> ApplicationResult<bool> + Send + Sync,
{
    pub fn new(dependency: RuleDependency, f: F) -> Self {
        Self { dependency, f }
    }
}

impl<F> PromotionRule for FnRule<F>
where
    F: Fn(&PartnerTree, &Partner) -> ApplicationResult<bool> + Send + Sync,
{
    fn dependency(&self) -> RuleDependency {
        self.dependency
    }

    fn evaluate(&self, tree: &PartnerTree, partner: &Partner) -> ApplicationResult<bool> {
        (self.f)(tree, partner)
    }
}

/// Thresholds for one target level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Direct recruits required, regardless of level
    pub min_direct_recruits: usize,
    /// Direct recruits at or above `qualified_recruit_level` required
    pub min_qualified_recruits: usize,
    pub qualified_recruit_level: Level,
    /// Team GMV (partner included) over the trailing window; 0 disables the check
    pub min_team_gmv: i64,
    /// Length of the trailing GMV window in days
    pub gmv_window_days: u32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_direct_recruits: 0,
            min_qualified_recruits: 0,
            qualified_recruit_level: Level::BQ,
            min_team_gmv: 0,
            gmv_window_days: 30,
        }
    }
}

impl ThresholdConfig {
    pub fn default_for(target: Level) -> Self {
        match target {
            Level::None | Level::BQ => Self {
                min_direct_recruits: 3,
                ..Self::default()
            },
            Level::B1 => Self {
                min_qualified_recruits: 3,
                qualified_recruit_level: Level::BQ,
                min_team_gmv: 100_000,
                ..Self::default()
            },
            Level::B2 => Self {
                min_qualified_recruits: 3,
                qualified_recruit_level: Level::B1,
                min_team_gmv: 500_000,
                ..Self::default()
            },
        }
    }
}

/// Recruit-count and team-performance thresholds.
pub struct ThresholdRule {
    config: ThresholdConfig,
    aggregator: Option<Arc<PerformanceAggregator>>,
    window: Option<DayWindow>,
}

impl ThresholdRule {
    /// Rule without a GMV requirement source; `min_team_gmv` must be 0.
    pub fn new(config: ThresholdConfig) -> Self {
        Self {
            config,
            aggregator: None,
            window: None,
        }
    }

    pub fn with_performance(mut self, aggregator: Arc<PerformanceAggregator>, window: DayWindow) -> Self {
        self.aggregator = Some(aggregator);
        self.window = Some(window);
        self
    }
}

impl PromotionRule for ThresholdRule {
    fn dependency(&self) -> RuleDependency {
        RuleDependency::Descendants
    }

    fn evaluate(&self, tree: &PartnerTree, partner: &Partner) -> ApplicationResult<bool> {
        let id = partner.user_id;
        let direct = tree.family_member_ids(id, true, false).len();
        if direct < self.config.min_direct_recruits {
            trace!(user_id = id, direct, "not enough direct recruits");
            return Ok(false);
        }
        let qualified = tree.direct_recruits_at_least(id, self.config.qualified_recruit_level);
        if qualified < self.config.min_qualified_recruits {
            trace!(user_id = id, qualified, "not enough qualified recruits");
            return Ok(false);
        }
        if self.config.min_team_gmv <= 0 {
            return Ok(true);
        }
        let (Some(aggregator), Some(window)) = (&self.aggregator, &self.window) else {
            return Err(ApplicationError::Rule {
                user_id: id,
                message: "team GMV threshold configured without a ledger".to_string(),
            });
        };
        let gmv = aggregator.team_gmv(tree, id, window, false, &aggregator.token())?;
        Ok(gmv >= self.config.min_team_gmv)
    }
}
