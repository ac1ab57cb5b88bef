//! Tree builder: turns a flat relationship feed into a partner tree snapshot.

use tracing::{debug, info, instrument};

use crate::domain::arena::PartnerArena;
use crate::domain::entities::{Partner, PartnerRecord};
use crate::domain::error::{DomainError, TreeResult};
use crate::domain::tree::PartnerTree;

/// Constructs a [`PartnerTree`] from feed records.
///
/// Construction is all-or-nothing: any structural error aborts the build and
/// no partially linked tree is returned.
pub struct TreeBuilder {
    check_upgrade_times: bool,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            check_upgrade_times: true,
        }
    }

    /// Skip the upgrade-time consistency check (legacy feeds without history).
    pub fn lenient_upgrade_times(mut self) -> Self {
        self.check_upgrade_times = false;
        self
    }

    /// Build a tree in two phases: insert every node, then link each node to
    /// its recruiter after an ancestor walk proves the link keeps the forest
    /// acyclic.
    #[instrument(level = "debug", skip(self, records), fields(records = records.len()))]
    pub fn build(&self, records: &[PartnerRecord]) -> TreeResult<PartnerTree> {
        let mut arena = PartnerArena::with_capacity(records.len());

        for record in records {
            if self.check_upgrade_times {
                record
                    .upgrade_time
                    .validate_for(record.level)
                    .map_err(|reason| DomainError::InvalidUpgradeTime {
                        user_id: record.user_id,
                        reason,
                    })?;
            }
            arena.insert(Partner::from_record(record))?;
        }

        for record in records {
            let Some(recruiter_id) = record.bred_by else {
                continue;
            };
            if recruiter_id == record.user_id {
                return Err(DomainError::CycleDetected(record.user_id));
            }
            let child = arena
                .index_of(record.user_id)
                .ok_or(DomainError::NotFound(record.user_id))?;
            let parent = arena
                .index_of(recruiter_id)
                .ok_or(DomainError::OrphanRecruiter {
                    user_id: record.user_id,
                    recruiter_id,
                })?;

            // Cycle detection: the child must not already be an ancestor of its recruiter
            let mut cursor = Some(parent);
            while let Some(current) = cursor {
                if current == child {
                    debug!(user_id = record.user_id, recruiter_id, "link would close a cycle");
                    return Err(DomainError::CycleDetected(record.user_id));
                }
                cursor = arena.node(current).and_then(|n| n.parent);
            }

            arena.attach(child, parent);
        }

        arena.seal();
        info!(
            partners = arena.len(),
            roots = arena.roots().len(),
            depth = arena.depth(),
            "partner tree built"
        );
        Ok(PartnerTree::new(arena))
    }
}
