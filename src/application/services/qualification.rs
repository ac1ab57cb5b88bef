//! Qualification engine: level checkers that promote eligible partners.
//!
//! A checker makes one pass over the live tree. Every partner below the
//! target level with `is_qualified` set is evaluated at most once; a partner
//! that satisfies the rule is promoted in place. A failing evaluation is
//! logged and collected, and the pass moves on to the next partner.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::application::rules::{PromotionRule, RuleDependency};
use crate::application::services::SnapshotService;
use crate::application::ApplicationError;
use crate::domain::{Level, PartnerNode, PartnerTree, UserId};
use crate::infrastructure::traits::{Clock, SystemClock};

/// Outcome of one checker pass.
#[derive(Debug, Default)]
pub struct CheckReport {
    pub target: Level,
    /// Partners whose rule was evaluated
    pub evaluated: usize,
    /// Candidates skipped because `is_qualified` is off
    pub exempt: usize,
    pub promoted: Vec<UserId>,
    pub errors: Vec<(UserId, ApplicationError)>,
}

impl CheckReport {
    pub fn summary(&self) -> CheckSummary {
        CheckSummary {
            target: self.target,
            evaluated: self.evaluated,
            exempt: self.exempt,
            promoted: self.promoted.len(),
            errors: self.errors.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    pub target: Level,
    pub evaluated: usize,
    pub exempt: usize,
    pub promoted: usize,
    pub errors: usize,
}

/// Promotes partners of one tree to one target level.
pub struct LevelChecker<'t, R: PromotionRule + ?Sized> {
    tree: &'t PartnerTree,
    target: Level,
    rule: &'t R,
    clock: Arc<dyn Clock>,
}

impl<'t, R: PromotionRule + ?Sized> LevelChecker<'t, R> {
    pub fn new(tree: &'t PartnerTree, target: Level, rule: &'t R) -> Self {
        Self {
            tree,
            target,
            rule,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run one pass over the tree.
    ///
    /// Rules reading recruiters are evaluated top-down, rules reading recruits
    /// bottom-up, so every neighbour the rule reads is already final for this
    /// pass and an immediate second pass promotes nobody.
    #[instrument(level = "debug", skip(self), fields(target_level = %self.target))]
    pub fn process(&self) -> CheckReport {
        let mut report = CheckReport {
            target: self.target,
            ..CheckReport::default()
        };
        let arena = self.tree.arena();
        match self.rule.dependency() {
            RuleDependency::Ancestors | RuleDependency::Independent => {
                for (_, node) in arena.iter() {
                    self.visit(node, &mut report);
                }
            }
            RuleDependency::Descendants => {
                for (_, node) in arena.iter_postorder() {
                    self.visit(node, &mut report);
                }
            }
        }
        info!(
            target_level = %self.target,
            evaluated = report.evaluated,
            promoted = report.promoted.len(),
            errors = report.errors.len(),
            "checker pass finished"
        );
        report
    }

    fn visit(&self, node: &PartnerNode, report: &mut CheckReport) {
        let partner = &node.partner;
        if partner.level() >= self.target {
            return;
        }
        if !partner.is_qualified() {
            report.exempt += 1;
            return;
        }
        report.evaluated += 1;
        match self.rule.evaluate(self.tree, partner) {
            Ok(true) => {
                if partner.promote_to(self.target, self.clock.now()) {
                    report.promoted.push(partner.user_id);
                }
            }
            Ok(false) => {}
            Err(e) => {
                warn!(user_id = partner.user_id, "promotion check failed: {}", e);
                report.errors.push((partner.user_id, e));
            }
        }
    }
}

pub fn bq_checker<'t, R: PromotionRule + ?Sized>(tree: &'t PartnerTree, rule: &'t R) -> LevelChecker<'t, R> {
    LevelChecker::new(tree, Level::BQ, rule)
}

pub fn b1_checker<'t, R: PromotionRule + ?Sized>(tree: &'t PartnerTree, rule: &'t R) -> LevelChecker<'t, R> {
    LevelChecker::new(tree, Level::B1, rule)
}

pub fn b2_checker<'t, R: PromotionRule + ?Sized>(tree: &'t PartnerTree, rule: &'t R) -> LevelChecker<'t, R> {
    LevelChecker::new(tree, Level::B2, rule)
}

/// Rules for every promotable level.
#[derive(Clone)]
pub struct RuleSet {
    pub bq: Arc<dyn PromotionRule>,
    pub b1: Arc<dyn PromotionRule>,
    pub b2: Arc<dyn PromotionRule>,
}

impl RuleSet {
    pub fn for_level(&self, level: Level) -> Option<&Arc<dyn PromotionRule>> {
        match level {
            Level::None => None,
            Level::BQ => Some(&self.bq),
            Level::B1 => Some(&self.b1),
            Level::B2 => Some(&self.b2),
        }
    }
}

/// Runs checkers against the current snapshot ("run now" trigger).
pub struct QualificationService {
    snapshots: Arc<SnapshotService>,
    rules: RuleSet,
    clock: Arc<dyn Clock>,
}

impl QualificationService {
    pub fn new(snapshots: Arc<SnapshotService>, rules: RuleSet) -> Self {
        Self {
            snapshots,
            rules,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// One pass for `level`; `None` if the level has no checker.
    pub fn run(&self, level: Level) -> Option<CheckReport> {
        let rule = self.rules.for_level(level)?;
        let tree = self.snapshots.current();
        let report = LevelChecker::new(&tree, level, rule.as_ref())
            .with_clock(Arc::clone(&self.clock))
            .process();
        Some(report)
    }

    /// One pass per level in ascending order, so a partner can climb
    /// several levels in one run.
    pub fn run_all(&self) -> Vec<CheckReport> {
        [Level::BQ, Level::B1, Level::B2]
            .into_iter()
            .filter_map(|level| self.run(level))
            .collect()
    }
}
