//! Text rendering of partner subtrees.

use generational_arena::Index;
use termtree::Tree;

use crate::domain::arena::PartnerArena;
use crate::domain::entities::UserId;
use crate::domain::tree::PartnerTree;

pub trait TreeRender {
    /// Render the subtree rooted at `user_id`, `None` if the id is unknown.
    fn to_tree_string(&self, user_id: UserId, max_depth: Option<usize>) -> Option<Tree<String>>;
}

impl TreeRender for PartnerTree {
    fn to_tree_string(&self, user_id: UserId, max_depth: Option<usize>) -> Option<Tree<String>> {
        let arena = self.arena();
        let root_idx = arena.index_of(user_id)?;

        fn label(arena: &PartnerArena, idx: Index) -> String {
            arena
                .node(idx)
                .map(|n| format!("{} [{}]", n.partner.user_id, n.partner.level()))
                .unwrap_or_default()
        }

        fn build_tree(
            arena: &PartnerArena,
            node_idx: Index,
            parent_tree: &mut Tree<String>,
            remaining: Option<usize>,
        ) {
            if remaining == Some(0) {
                return;
            }
            if let Some(node) = arena.node(node_idx) {
                for &child_idx in &node.children {
                    let mut child_tree = Tree::new(label(arena, child_idx));
                    build_tree(arena, child_idx, &mut child_tree, remaining.map(|r| r - 1));
                    parent_tree.push(child_tree);
                }
            }
        }

        let mut tree = Tree::new(label(arena, root_idx));
        build_tree(arena, root_idx, &mut tree, max_depth);
        Some(tree)
    }
}
