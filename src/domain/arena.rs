use std::collections::HashMap;

use generational_arena::{Arena, Index};
use tracing::instrument;

use crate::domain::entities::{Partner, UserId};
use crate::domain::error::{DomainError, TreeResult};

/// Node in the arena-based partner forest.
#[derive(Debug)]
pub struct PartnerNode {
    /// Partner record owned by this node
    pub partner: Partner,
    /// Recruiter's node, None for roots
    pub parent: Option<Index>,
    /// Direct recruits (structural relation, the arena owns the nodes)
    pub children: Vec<Index>,
    /// Distance from the root of this node's tree, roots are at depth 0
    pub depth: usize,
}

/// Node store: one node per partner, O(1) lookup by user id.
///
/// Uses a generational arena for the nodes and a hash index from user id to
/// arena slot. The store holds a whole forest; every tree root is recorded.
#[derive(Debug, Default)]
pub struct PartnerArena {
    arena: Arena<PartnerNode>,
    index: HashMap<UserId, Index>,
    roots: Vec<Index>,
}

impl PartnerArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            arena: Arena::with_capacity(n),
            index: HashMap::with_capacity(n),
            roots: Vec::new(),
        }
    }

    /// Inserts an unlinked node. Fails if the id is already present.
    #[instrument(level = "trace", skip(self, partner), fields(user_id = partner.user_id))]
    pub fn insert(&mut self, partner: Partner) -> TreeResult<Index> {
        let user_id = partner.user_id;
        if self.index.contains_key(&user_id) {
            return Err(DomainError::DuplicateId(user_id));
        }
        let idx = self.arena.insert(PartnerNode {
            partner,
            parent: None,
            children: Vec::new(),
            depth: 0,
        });
        self.index.insert(user_id, idx);
        Ok(idx)
    }

    /// Attaches `child` under `parent`. The caller guarantees acyclicity.
    pub(crate) fn attach(&mut self, child: Index, parent: Index) {
        if let Some(node) = self.arena.get_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.arena.get_mut(parent) {
            node.children.push(child);
        }
    }

    /// Records roots and assigns depths once all links are in place.
    pub(crate) fn seal(&mut self) {
        self.roots = self
            .arena
            .iter()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(idx, _)| idx)
            .collect();
        // deterministic root order
        self.roots
            .sort_by_key(|idx| self.arena.get(*idx).map(|n| n.partner.user_id));

        let mut stack: Vec<(Index, usize)> = self.roots.iter().map(|&r| (r, 0)).collect();
        while let Some((idx, depth)) = stack.pop() {
            if let Some(node) = self.arena.get_mut(idx) {
                node.depth = depth;
                stack.extend(node.children.iter().map(|&c| (c, depth + 1)));
            }
        }
    }

    /// Lookup that treats a miss as an error.
    pub fn get(&self, user_id: UserId) -> TreeResult<&PartnerNode> {
        self.find(user_id).ok_or(DomainError::NotFound(user_id))
    }

    pub fn find(&self, user_id: UserId) -> Option<&PartnerNode> {
        self.index.get(&user_id).and_then(|idx| self.arena.get(*idx))
    }

    pub fn index_of(&self, user_id: UserId) -> Option<Index> {
        self.index.get(&user_id).copied()
    }

    pub fn node(&self, idx: Index) -> Option<&PartnerNode> {
        self.arena.get(idx)
    }

    pub fn roots(&self) -> &[Index] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Pre-order over the whole forest: every recruiter before its recruits.
    pub fn iter(&self) -> PreOrderIterator<'_> {
        PreOrderIterator::new(self, self.roots.iter().copied())
    }

    /// Pre-order over the subtree rooted at `start`.
    pub fn iter_from(&self, start: Index) -> PreOrderIterator<'_> {
        PreOrderIterator::new(self, std::iter::once(start))
    }

    /// Post-order over the whole forest: every recruit before its recruiter.
    pub fn iter_postorder(&self) -> PostOrderIterator<'_> {
        PostOrderIterator::new(self)
    }

    /// Number of levels in the deepest tree of the forest.
    #[instrument(level = "debug", skip(self))]
    pub fn depth(&self) -> usize {
        self.arena
            .iter()
            .map(|(_, node)| node.depth + 1)
            .max()
            .unwrap_or(0)
    }
}

pub struct PreOrderIterator<'a> {
    arena: &'a PartnerArena,
    stack: Vec<Index>,
}

impl<'a> PreOrderIterator<'a> {
    fn new(arena: &'a PartnerArena, starts: impl DoubleEndedIterator<Item = Index>) -> Self {
        // reversed so the first start is popped first
        let stack = starts.rev().collect();
        Self { arena, stack }
    }
}

impl<'a> Iterator for PreOrderIterator<'a> {
    type Item = (Index, &'a PartnerNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current_idx) = self.stack.pop() {
            if let Some(node) = self.arena.node(current_idx) {
                // Push children in reverse order for left-to-right traversal
                for &child in node.children.iter().rev() {
                    self.stack.push(child);
                }
                return Some((current_idx, node));
            }
        }
        None
    }
}

pub struct PostOrderIterator<'a> {
    arena: &'a PartnerArena,
    stack: Vec<(Index, bool)>,
}

impl<'a> PostOrderIterator<'a> {
    fn new(arena: &'a PartnerArena) -> Self {
        let stack = arena.roots.iter().rev().map(|&r| (r, false)).collect();
        Self { arena, stack }
    }
}

impl<'a> Iterator for PostOrderIterator<'a> {
    type Item = (Index, &'a PartnerNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current_idx, visited)) = self.stack.pop() {
            if let Some(node) = self.arena.node(current_idx) {
                if !visited {
                    self.stack.push((current_idx, true));
                    for &child in node.children.iter().rev() {
                        self.stack.push((child, false));
                    }
                } else {
                    return Some((current_idx, node));
                }
            }
        }
        None
    }
}
