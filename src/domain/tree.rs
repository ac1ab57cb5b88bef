//! Partner tree: read-only hierarchy queries over a built snapshot.
//!
//! Every query goes through [`PartnerTree::walk`], a bounded walk from one
//! partner either down its team or up its recruiter chain, with an optional
//! depth limit and inclusion filter. Misses are values: querying an unknown
//! id yields an empty result, never an error.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use tracing::instrument;

use crate::domain::arena::PartnerArena;
use crate::domain::entities::{Level, Partner, SiteId, UserId};
use crate::domain::error::{DomainError, TreeResult};
use crate::domain::window::DayWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards recruits
    Down,
    /// Towards recruiters
    Up,
}

/// Parameters of a single traversal.
pub struct Walk<'f> {
    direction: Direction,
    max_depth: Option<usize>,
    include_start: bool,
    filter: Option<Box<dyn Fn(&Partner) -> bool + 'f>>,
}

impl<'f> Walk<'f> {
    pub fn down() -> Self {
        Self {
            direction: Direction::Down,
            max_depth: None,
            include_start: false,
            filter: None,
        }
    }

    pub fn up() -> Self {
        Self {
            direction: Direction::Up,
            ..Self::down()
        }
    }

    /// Stop `depth` edges away from the start; `None` walks to the end.
    pub fn max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    /// Restrict the walk to the immediate neighbours of the start.
    pub fn direct_only(self, direct_only: bool) -> Self {
        if direct_only {
            self.max_depth(Some(1))
        } else {
            self
        }
    }

    pub fn include_start(mut self, include: bool) -> Self {
        self.include_start = include;
        self
    }

    /// Keep only partners matching `f`; non-matching partners are still walked through.
    pub fn filter(mut self, f: impl Fn(&Partner) -> bool + 'f) -> Self {
        self.filter = Some(Box::new(f));
        self
    }

    fn accepts(&self, partner: &Partner) -> bool {
        self.filter.as_ref().map_or(true, |f| f(partner))
    }

    fn within(&self, distance: usize) -> bool {
        self.max_depth.map_or(true, |max| distance <= max)
    }
}

/// Site restriction for grouping queries; `None` accepts every site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteFilter {
    pub master_site_ids: Option<HashSet<SiteId>>,
    pub slave_site_ids: Option<HashSet<SiteId>>,
}

impl SiteFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn masters(ids: impl IntoIterator<Item = SiteId>) -> Self {
        Self {
            master_site_ids: Some(ids.into_iter().collect()),
            slave_site_ids: None,
        }
    }

    pub fn matches(&self, partner: &Partner) -> bool {
        let master_ok = self
            .master_site_ids
            .as_ref()
            .map_or(true, |ids| ids.contains(&partner.master_site_id));
        let slave_ok = self
            .slave_site_ids
            .as_ref()
            .map_or(true, |ids| ids.contains(&partner.slave_site_id));
        master_ok && slave_ok
    }
}

/// An immutable-topology partner forest. Only qualification state changes
/// after construction, through the partners' atomic fields.
#[derive(Debug)]
pub struct PartnerTree {
    arena: PartnerArena,
}

impl PartnerTree {
    pub(crate) fn new(arena: PartnerArena) -> Self {
        Self { arena }
    }

    pub fn arena(&self) -> &PartnerArena {
        &self.arena
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Direct lookup, absent if unknown.
    pub fn partner(&self, user_id: UserId) -> Option<&Partner> {
        self.arena.find(user_id).map(|n| &n.partner)
    }

    /// Lookup for callers that need the miss as an error.
    pub fn get(&self, user_id: UserId) -> TreeResult<&Partner> {
        self.partner(user_id).ok_or(DomainError::NotFound(user_id))
    }

    pub fn root_ids(&self) -> Vec<UserId> {
        self.arena
            .roots()
            .iter()
            .filter_map(|idx| self.arena.node(*idx))
            .map(|n| n.partner.user_id)
            .collect()
    }

    /// All partners in pre-order (recruiters before recruits).
    pub fn partners(&self) -> impl Iterator<Item = &Partner> {
        self.arena.iter().map(|(_, n)| &n.partner)
    }

    /// The traversal primitive behind every hierarchy query.
    ///
    /// Downward walks are breadth-first, upward walks go from the direct
    /// recruiter to the root; either way results are ordered by distance.
    #[instrument(level = "trace", skip(self, walk), fields(direction = ?walk.direction))]
    pub fn walk(&self, user_id: UserId, walk: &Walk<'_>) -> Vec<UserId> {
        let Some(start) = self.arena.index_of(user_id) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut queue = VecDeque::from([(start, 0usize)]);

        while let Some((idx, distance)) = queue.pop_front() {
            let Some(node) = self.arena.node(idx) else {
                continue;
            };
            let is_start = distance == 0;
            if (!is_start || walk.include_start) && walk.accepts(&node.partner) {
                out.push(node.partner.user_id);
            }
            if !walk.within(distance + 1) {
                continue;
            }
            match walk.direction {
                Direction::Down => {
                    queue.extend(node.children.iter().map(|&c| (c, distance + 1)));
                }
                Direction::Up => {
                    if let Some(parent) = node.parent {
                        queue.push_back((parent, distance + 1));
                    }
                }
            }
        }
        out
    }

    /// Team members below `user_id`.
    pub fn family_member_ids(
        &self,
        user_id: UserId,
        direct_only: bool,
        include_self: bool,
    ) -> BTreeSet<UserId> {
        let walk = Walk::down()
            .direct_only(direct_only)
            .include_start(include_self);
        self.walk(user_id, &walk).into_iter().collect()
    }

    /// Recruits whose level has caught up with or passed the level of `user_id`.
    pub fn surpassed_ids(&self, user_id: UserId, direct_only: bool) -> BTreeSet<UserId> {
        let Some(me) = self.partner(user_id) else {
            return BTreeSet::new();
        };
        let my_level = me.level();
        let walk = Walk::down()
            .direct_only(direct_only)
            .filter(move |p| p.level() >= my_level);
        self.walk(user_id, &walk).into_iter().collect()
    }

    /// Surpassed recruits plus their own teams, `team_depth` levels below each
    /// surpassed partner (`None` for the whole subtree).
    pub fn surpassed_team_ids(
        &self,
        user_id: UserId,
        direct_only: bool,
        team_depth: Option<usize>,
    ) -> BTreeSet<UserId> {
        let surpassed = self.surpassed_ids(user_id, direct_only);
        let mut team = surpassed.clone();
        for id in surpassed {
            let walk = Walk::down().max_depth(team_depth);
            team.extend(self.walk(id, &walk));
        }
        team
    }

    /// Recruits at exactly `level`, optionally without those that already
    /// surpassed `user_id`.
    pub fn my_level_ids(
        &self,
        user_id: UserId,
        level: Level,
        direct_only: bool,
        ignore_surpassed: bool,
    ) -> BTreeSet<UserId> {
        let walk = Walk::down()
            .direct_only(direct_only)
            .filter(move |p| p.level() == level);
        let mut ids: BTreeSet<UserId> = self.walk(user_id, &walk).into_iter().collect();
        if ignore_surpassed {
            let surpassed = self.surpassed_ids(user_id, direct_only);
            ids.retain(|id| !surpassed.contains(id));
        }
        ids
    }

    pub fn my_bq_ids(
        &self,
        user_id: UserId,
        direct_only: bool,
        ignore_surpassed: bool,
    ) -> BTreeSet<UserId> {
        self.my_level_ids(user_id, Level::BQ, direct_only, ignore_surpassed)
    }

    /// Partner records for [`my_level_ids`](Self::my_level_ids), e.g. to inspect upgrade times.
    pub fn my_partners_at(
        &self,
        user_id: UserId,
        level: Level,
        direct_only: bool,
        ignore_surpassed: bool,
    ) -> Vec<&Partner> {
        self.my_level_ids(user_id, level, direct_only, ignore_surpassed)
            .into_iter()
            .filter_map(|id| self.partner(id))
            .collect()
    }

    /// Recruiter chain from the direct recruiter up to the root.
    pub fn bred_by_ids(&self, user_id: UserId) -> Vec<UserId> {
        self.walk(user_id, &Walk::up())
    }

    /// Organisational team for performance aggregation, the partner included
    /// unless `exclude_self`.
    pub fn team_member_ids(
        &self,
        user_id: UserId,
        direct_only: bool,
        exclude_self: bool,
    ) -> BTreeSet<UserId> {
        self.family_member_ids(user_id, direct_only, !exclude_self)
    }

    /// Number of recruits at or above `level` directly under `user_id`.
    pub fn direct_recruits_at_least(&self, user_id: UserId, level: Level) -> usize {
        let walk = Walk::down()
            .direct_only(true)
            .filter(move |p| p.level() >= level);
        self.walk(user_id, &walk).len()
    }

    /// Partner ids grouped by master site.
    pub fn partners_by_site(&self, filter: &SiteFilter) -> BTreeMap<SiteId, Vec<UserId>> {
        self.group_by_site(|p| filter.matches(p))
    }

    /// Partners that joined within `window`, grouped by master site.
    pub fn new_partners_by_site(
        &self,
        window: &DayWindow,
        filter: &SiteFilter,
    ) -> BTreeMap<SiteId, Vec<UserId>> {
        self.group_by_site(|p| filter.matches(p) && window.contains(p.joined_at))
    }

    fn group_by_site(&self, keep: impl Fn(&Partner) -> bool) -> BTreeMap<SiteId, Vec<UserId>> {
        let mut sites: BTreeMap<SiteId, Vec<UserId>> = BTreeMap::new();
        for partner in self.partners().filter(|p| keep(p)) {
            sites
                .entry(partner.master_site_id)
                .or_default()
                .push(partner.user_id);
        }
        for ids in sites.values_mut() {
            ids.sort_unstable();
        }
        sites
    }
}
