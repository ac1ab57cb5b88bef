//! Domain entities: partners, levels and the raw feed record

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique partner (user) identifier.
pub type UserId = i64;

/// Organisational site identifier (master site or sub-site).
pub type SiteId = i64;

/// Qualification tier, ordered `None < BQ < B1 < B2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Level {
    #[default]
    None = 0,
    BQ = 1,
    B1 = 2,
    B2 = 3,
}

impl Level {
    /// All levels in ascending order.
    pub const ALL: [Level; 4] = [Level::None, Level::BQ, Level::B1, Level::B2];

    pub fn from_u8(raw: u8) -> Level {
        match raw {
            0 => Level::None,
            1 => Level::BQ,
            2 => Level::B1,
            _ => Level::B2,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Levels that carry an upgrade timestamp, up to and including `self`.
    pub fn reached(self) -> impl Iterator<Item = Level> {
        Level::ALL
            .into_iter()
            .filter(move |l| *l != Level::None && *l <= self)
    }

    /// Index into the upgrade-time slots; `None` has no slot.
    fn slot(self) -> Option<usize> {
        match self {
            Level::None => None,
            Level::BQ => Some(0),
            Level::B1 => Some(1),
            Level::B2 => Some(2),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::None => "None",
            Level::BQ => "BQ",
            Level::B1 => "B1",
            Level::B2 => "B2",
        };
        f.write_str(s)
    }
}

/// Per-transition timestamps (unix seconds). Absent if the level was never reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeTime {
    pub to_bq: Option<i64>,
    pub to_b1: Option<i64>,
    pub to_b2: Option<i64>,
}

impl UpgradeTime {
    pub fn get(&self, level: Level) -> Option<i64> {
        match level {
            Level::None => None,
            Level::BQ => self.to_bq,
            Level::B1 => self.to_b1,
            Level::B2 => self.to_b2,
        }
    }

    /// Timestamp for `level` as a UTC datetime.
    pub fn at(&self, level: Level) -> Option<DateTime<Utc>> {
        self.get(level)
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
    }

    /// Checks the invariant that every reached level has a timestamp and the
    /// timestamps never go backwards. A zero timestamp counts as absent.
    pub fn validate_for(&self, level: Level) -> Result<(), String> {
        let set = |l: Level| self.get(l).filter(|ts| *ts != UNSET);
        let mut previous: Option<i64> = None;
        for reached in level.reached() {
            let ts = set(reached)
                .ok_or_else(|| format!("level {} reached without upgrade time to {}", level, reached))?;
            if let Some(prev) = previous {
                if ts < prev {
                    return Err(format!("upgrade time to {} precedes the previous level", reached));
                }
            }
            previous = Some(ts);
        }
        for unreached in Level::ALL.into_iter().filter(|l| *l > level) {
            if set(unreached).is_some() {
                return Err(format!("upgrade time to {} set but level is {}", unreached, level));
            }
        }
        Ok(())
    }
}

/// One row of the relationship + attribute feed consumed by the tree builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerRecord {
    pub user_id: UserId,
    /// Direct recruiter; absent for roots
    #[serde(default)]
    pub bred_by: Option<UserId>,
    #[serde(default)]
    pub master_site_id: SiteId,
    #[serde(default)]
    pub slave_site_id: SiteId,
    #[serde(default)]
    pub level: Level,
    #[serde(default = "default_qualified")]
    pub is_qualified: bool,
    #[serde(default)]
    pub upgrade_time: UpgradeTime,
    /// Unix seconds when the partner joined the hierarchy
    #[serde(default)]
    pub joined_at: i64,
}

fn default_qualified() -> bool {
    true
}

impl PartnerRecord {
    /// Minimal record, mostly useful for fixtures.
    pub fn new(user_id: UserId, bred_by: Option<UserId>) -> Self {
        Self {
            user_id,
            bred_by,
            master_site_id: 0,
            slave_site_id: 0,
            level: Level::None,
            is_qualified: true,
            upgrade_time: UpgradeTime::default(),
            joined_at: 0,
        }
    }

    pub fn with_level(mut self, level: Level, at: i64) -> Self {
        self.level = level;
        self.upgrade_time = UpgradeTime::default();
        for reached in level.reached() {
            match reached {
                Level::BQ => self.upgrade_time.to_bq = Some(at),
                Level::B1 => self.upgrade_time.to_b1 = Some(at),
                Level::B2 => self.upgrade_time.to_b2 = Some(at),
                Level::None => {}
            }
        }
        self
    }

    pub fn with_site(mut self, master: SiteId, slave: SiteId) -> Self {
        self.master_site_id = master;
        self.slave_site_id = slave;
        self
    }

    pub fn with_qualified(mut self, is_qualified: bool) -> Self {
        self.is_qualified = is_qualified;
        self
    }

    pub fn with_joined_at(mut self, joined_at: i64) -> Self {
        self.joined_at = joined_at;
        self
    }
}

/// Sentinel for an unset upgrade slot.
const UNSET: i64 = 0;

/// A partner in a live tree snapshot.
///
/// Identity and placement are immutable. Qualification state is held in
/// atomics so that checker passes can update it in place while readers keep
/// querying: the level only ever rises and each timestamp is written once.
#[derive(Debug)]
pub struct Partner {
    pub user_id: UserId,
    pub master_site_id: SiteId,
    pub slave_site_id: SiteId,
    pub bred_by: Option<UserId>,
    pub joined_at: i64,
    level: AtomicU8,
    is_qualified: AtomicBool,
    upgrade_time: [AtomicI64; 3],
}

impl Partner {
    pub fn from_record(record: &PartnerRecord) -> Self {
        let slot = |ts: Option<i64>| AtomicI64::new(ts.unwrap_or(UNSET));
        Self {
            user_id: record.user_id,
            master_site_id: record.master_site_id,
            slave_site_id: record.slave_site_id,
            bred_by: record.bred_by,
            joined_at: record.joined_at,
            level: AtomicU8::new(record.level.as_u8()),
            is_qualified: AtomicBool::new(record.is_qualified),
            upgrade_time: [
                slot(record.upgrade_time.to_bq),
                slot(record.upgrade_time.to_b1),
                slot(record.upgrade_time.to_b2),
            ],
        }
    }

    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Acquire))
    }

    pub fn is_qualified(&self) -> bool {
        self.is_qualified.load(Ordering::Acquire)
    }

    /// Manual override: a partner flagged unqualified is skipped by every checker.
    pub fn set_qualified(&self, qualified: bool) {
        self.is_qualified.store(qualified, Ordering::Release);
    }

    pub fn upgrade_time(&self) -> UpgradeTime {
        let read = |i: usize| match self.upgrade_time[i].load(Ordering::Acquire) {
            UNSET => None,
            ts => Some(ts),
        };
        UpgradeTime {
            to_bq: read(0),
            to_b1: read(1),
            to_b2: read(2),
        }
    }

    /// Raises the partner to `target`, stamping `now` into every slot up to the
    /// target that is still unset. Returns `false` if the partner was already
    /// at or above `target`.
    ///
    /// Timestamps are written before the level is published, so a reader that
    /// observes the new level also observes its timestamps.
    pub fn promote_to(&self, target: Level, now: i64) -> bool {
        if self.level() >= target {
            return false;
        }
        for reached in target.reached() {
            if let Some(i) = reached.slot() {
                // set-once: a lost race keeps the earlier value
                let _ = self.upgrade_time[i].compare_exchange(
                    UNSET,
                    now,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
            }
        }
        let previous = self.level.fetch_max(target.as_u8(), Ordering::AcqRel);
        previous < target.as_u8()
    }

    /// Consistent copy of the partner's state for reporting and export.
    pub fn snapshot(&self) -> PartnerSnapshot {
        PartnerSnapshot {
            user_id: self.user_id,
            bred_by: self.bred_by,
            master_site_id: self.master_site_id,
            slave_site_id: self.slave_site_id,
            level: self.level(),
            is_qualified: self.is_qualified(),
            upgrade_time: self.upgrade_time(),
            joined_at: self.joined_at,
        }
    }
}

/// Plain-data view of a [`Partner`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerSnapshot {
    pub user_id: UserId,
    pub bred_by: Option<UserId>,
    pub master_site_id: SiteId,
    pub slave_site_id: SiteId,
    pub level: Level,
    pub is_qualified: bool,
    pub upgrade_time: UpgradeTime,
    pub joined_at: i64,
}

/// Closed set of bonus payout categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BonusType {
    Training,
    Team,
    Bred,
}

impl BonusType {
    pub const ALL: [BonusType; 3] = [BonusType::Training, BonusType::Team, BonusType::Bred];
}

impl fmt::Display for BonusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BonusType::Training => "training",
            BonusType::Team => "team",
            BonusType::Bred => "bred",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::None < Level::BQ);
        assert!(Level::BQ < Level::B1);
        assert!(Level::B1 < Level::B2);
        assert_eq!(Level::from_u8(Level::B1.as_u8()), Level::B1);
    }

    #[test]
    fn test_promote_backfills_lower_slots_once() {
        let partner = Partner::from_record(&PartnerRecord::new(1, None));
        assert!(partner.promote_to(Level::B1, 100));
        assert_eq!(partner.level(), Level::B1);
        assert_eq!(partner.upgrade_time().to_bq, Some(100));
        assert_eq!(partner.upgrade_time().to_b1, Some(100));

        assert!(!partner.promote_to(Level::B1, 200));
        assert!(!partner.promote_to(Level::BQ, 300));
        assert_eq!(partner.upgrade_time().to_b1, Some(100));
    }

    #[test]
    fn test_validate_upgrade_time() {
        let ok = PartnerRecord::new(1, None).with_level(Level::B1, 10);
        assert!(ok.upgrade_time.validate_for(ok.level).is_ok());

        let missing = UpgradeTime {
            to_bq: None,
            to_b1: Some(10),
            to_b2: None,
        };
        assert!(missing.validate_for(Level::B1).is_err());

        let backwards = UpgradeTime {
            to_bq: Some(20),
            to_b1: Some(10),
            to_b2: None,
        };
        assert!(backwards.validate_for(Level::B1).is_err());

        let ahead = UpgradeTime {
            to_bq: Some(10),
            to_b1: None,
            to_b2: Some(30),
        };
        assert!(ahead.validate_for(Level::BQ).is_err());
    }
}
