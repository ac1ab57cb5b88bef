//! Performance aggregation service
//!
//! Windowed sales volume (GMV) and bonus receipts over sets of partners.
//! Input id sets are de-duplicated before anything is summed, so a partner
//! listed twice contributes once.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use itertools::Itertools;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::{BonusType, DayWindow, PartnerTree, SiteFilter, SiteId, UserId};
use crate::infrastructure::traits::{BonusEntry, Ledger};
use crate::infrastructure::CancelToken;

/// Received amounts per bonus category; every category is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BonusTotals(BTreeMap<BonusType, i64>);

impl Default for BonusTotals {
    fn default() -> Self {
        Self(BonusType::ALL.iter().map(|t| (*t, 0)).collect())
    }
}

impl BonusTotals {
    pub fn get(&self, bonus_type: BonusType) -> i64 {
        self.0.get(&bonus_type).copied().unwrap_or(0)
    }

    pub fn total(&self) -> i64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BonusType, i64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    fn add(&mut self, bonus_type: BonusType, amount: i64) {
        *self.0.entry(bonus_type).or_insert(0) += amount;
    }

    fn minus(&self, other: &BonusTotals) -> BonusTotals {
        let mut out = BonusTotals::default();
        for t in BonusType::ALL {
            out.add(t, self.get(t) - other.get(t));
        }
        out
    }
}

/// Aggregates for one cohort of partners.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CohortAggregate {
    pub members: usize,
    pub gmv: i64,
    pub bonus: BonusTotals,
}

/// Side-by-side aggregates of a new cohort and the all-time cohort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CohortReport {
    pub new: CohortAggregate,
    pub all: CohortAggregate,
}

impl CohortReport {
    /// What the all-time cohort achieved beyond the new cohort.
    pub fn delta(&self) -> CohortAggregate {
        CohortAggregate {
            members: self.all.members.saturating_sub(self.new.members),
            gmv: self.all.gmv - self.new.gmv,
            bonus: self.all.bonus.minus(&self.new.bonus),
        }
    }
}

/// Stateless aggregator over an external ledger; safe to share between threads.
pub struct PerformanceAggregator {
    ledger: Arc<dyn Ledger>,
    timeout: Option<Duration>,
}

impl PerformanceAggregator {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self {
            ledger,
            timeout: None,
        }
    }

    /// Default deadline for tokens created with [`token`](Self::token).
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fresh cancellation token carrying the configured timeout.
    pub fn token(&self) -> CancelToken {
        match self.timeout {
            Some(timeout) => CancelToken::with_timeout(timeout),
            None => CancelToken::new(),
        }
    }

    /// GMV per partner; partners without sales map to zero.
    #[instrument(level = "debug", skip(self, user_ids, cancel), fields(ids = user_ids.len()))]
    pub fn gmv_by_user_ids(
        &self,
        user_ids: &[UserId],
        window: &DayWindow,
        cancel: &CancelToken,
    ) -> ApplicationResult<BTreeMap<UserId, i64>> {
        let ids = unique(user_ids);
        let context = || format!("gmv of {} partners in {}", ids.len(), window);
        cancel
            .check()
            .map_err(|e| ApplicationError::data_source(context(), e))?;
        let found = self
            .ledger
            .gmv_by_user(&ids, window, cancel)
            .map_err(|e| ApplicationError::data_source(context(), e))?;
        Ok(ids
            .iter()
            .map(|id| (*id, found.get(id).copied().unwrap_or(0)))
            .collect())
    }

    /// GMV summed across the set.
    pub fn total_gmv(
        &self,
        user_ids: &[UserId],
        window: &DayWindow,
        cancel: &CancelToken,
    ) -> ApplicationResult<i64> {
        Ok(self
            .gmv_by_user_ids(user_ids, window, cancel)?
            .values()
            .sum())
    }

    /// GMV of the team under `user_id`; `exclude_self` leaves out the
    /// partner's own sales.
    pub fn team_gmv(
        &self,
        tree: &PartnerTree,
        user_id: UserId,
        window: &DayWindow,
        exclude_self: bool,
        cancel: &CancelToken,
    ) -> ApplicationResult<i64> {
        let members: Vec<UserId> = tree
            .team_member_ids(user_id, false, exclude_self)
            .into_iter()
            .collect();
        self.total_gmv(&members, window, cancel)
    }

    /// Team GMV for many partners with a single ledger query.
    pub fn team_gmvs(
        &self,
        tree: &PartnerTree,
        user_ids: &[UserId],
        window: &DayWindow,
        exclude_self: bool,
        cancel: &CancelToken,
    ) -> ApplicationResult<BTreeMap<UserId, i64>> {
        let leaders = unique(user_ids);
        let teams: Vec<(UserId, BTreeSet<UserId>)> = leaders
            .par_iter()
            .map(|id| (*id, tree.team_member_ids(*id, false, exclude_self)))
            .collect();
        let everyone: Vec<UserId> = teams
            .iter()
            .flat_map(|(_, members)| members.iter().copied())
            .collect();
        let gmv = self.gmv_by_user_ids(&everyone, window, cancel)?;

        Ok(teams
            .par_iter()
            .map(|(id, members)| {
                let sum = members.iter().filter_map(|m| gmv.get(m)).sum();
                (*id, sum)
            })
            .collect())
    }

    /// Bonus received by the set, per category.
    #[instrument(level = "debug", skip(self, user_ids, cancel), fields(ids = user_ids.len()))]
    pub fn received_amounts(
        &self,
        user_ids: &[UserId],
        window: &DayWindow,
        cancel: &CancelToken,
    ) -> ApplicationResult<BonusTotals> {
        let ids = unique(user_ids);
        let entries = self.bonus_entries(&ids, window, cancel)?;
        let mut totals = BonusTotals::default();
        for entry in entries {
            totals.add(entry.bonus_type, entry.amount);
        }
        debug!("received bonus total {} for {} partners", totals.total(), ids.len());
        Ok(totals)
    }

    /// Recruitment bonus `recipient` received that was generated by any of
    /// `from_ids`.
    pub fn received_bred_amount_from(
        &self,
        recipient: UserId,
        from_ids: &[UserId],
        window: &DayWindow,
        cancel: &CancelToken,
    ) -> ApplicationResult<i64> {
        let sources: BTreeSet<UserId> = from_ids.iter().copied().collect();
        let entries = self.bonus_entries(&[recipient], window, cancel)?;
        Ok(entries
            .iter()
            .filter(|e| e.bonus_type == BonusType::Bred)
            .filter(|e| e.source_user_id.is_some_and(|s| sources.contains(&s)))
            .map(|e| e.amount)
            .sum())
    }

    /// Aggregates a new cohort next to the all-time cohort.
    pub fn cohort_compare(
        &self,
        new_ids: &[UserId],
        all_ids: &[UserId],
        window: &DayWindow,
        cancel: &CancelToken,
    ) -> ApplicationResult<CohortReport> {
        Ok(CohortReport {
            new: self.cohort(new_ids, window, cancel)?,
            all: self.cohort(all_ids, window, cancel)?,
        })
    }

    /// GMV of every partner, summed per master site.
    pub fn gmv_by_site(
        &self,
        tree: &PartnerTree,
        window: &DayWindow,
        filter: &SiteFilter,
        cancel: &CancelToken,
    ) -> ApplicationResult<BTreeMap<SiteId, i64>> {
        self.site_gmv(&tree.partners_by_site(filter), window, cancel)
    }

    /// GMV of partners that joined within the window, summed per master site.
    pub fn new_gmv_by_site(
        &self,
        tree: &PartnerTree,
        window: &DayWindow,
        filter: &SiteFilter,
        cancel: &CancelToken,
    ) -> ApplicationResult<BTreeMap<SiteId, i64>> {
        self.site_gmv(&tree.new_partners_by_site(window, filter), window, cancel)
    }

    fn site_gmv(
        &self,
        sites: &BTreeMap<SiteId, Vec<UserId>>,
        window: &DayWindow,
        cancel: &CancelToken,
    ) -> ApplicationResult<BTreeMap<SiteId, i64>> {
        let everyone: Vec<UserId> = sites.values().flatten().copied().collect();
        let gmv = self.gmv_by_user_ids(&everyone, window, cancel)?;
        Ok(sites
            .iter()
            .map(|(site, ids)| (*site, ids.iter().filter_map(|id| gmv.get(id)).sum()))
            .collect())
    }

    fn cohort(
        &self,
        user_ids: &[UserId],
        window: &DayWindow,
        cancel: &CancelToken,
    ) -> ApplicationResult<CohortAggregate> {
        let ids = unique(user_ids);
        Ok(CohortAggregate {
            members: ids.len(),
            gmv: self.total_gmv(&ids, window, cancel)?,
            bonus: self.received_amounts(&ids, window, cancel)?,
        })
    }

    fn bonus_entries(
        &self,
        ids: &[UserId],
        window: &DayWindow,
        cancel: &CancelToken,
    ) -> ApplicationResult<Vec<BonusEntry>> {
        let context = || format!("bonus of {} partners in {}", ids.len(), window);
        cancel
            .check()
            .map_err(|e| ApplicationError::data_source(context(), e))?;
        self.ledger
            .bonus_entries(ids, window, cancel)
            .map_err(|e| ApplicationError::data_source(context(), e))
    }
}

/// De-duplicated ids, first occurrence order.
fn unique(ids: &[UserId]) -> Vec<UserId> {
    ids.iter().copied().unique().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_keeps_first_occurrence() {
        assert_eq!(unique(&[3, 1, 3, 2, 1]), vec![3, 1, 2]);
    }

    #[test]
    fn test_bonus_totals_have_every_category() {
        let totals = BonusTotals::default();
        for t in BonusType::ALL {
            assert_eq!(totals.get(t), 0);
        }
        assert_eq!(totals.total(), 0);
    }
}
