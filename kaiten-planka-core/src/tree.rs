//! Space hierarchy built from the flat source listing.
//!
//! Parents may appear after their children in the listing, so the tree is
//! built in two passes: collect every space by uid, then link each child into
//! its parent's child list. A parent uid missing from the listing makes the
//! space a root.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::model::Space;

#[derive(Debug, Clone)]
pub struct SpaceNode {
    pub space: Space,
    pub children: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SpaceTree {
    nodes: HashMap<String, SpaceNode>,
    /// uids in listing order, for deterministic iteration.
    order: Vec<String>,
}

impl SpaceTree {
    pub fn build(spaces: Vec<Space>) -> Self {
        let mut nodes = HashMap::with_capacity(spaces.len());
        let mut order = Vec::with_capacity(spaces.len());

        for space in spaces {
            if nodes.contains_key(&space.uid) {
                warn!(uid = %space.uid, "[TREE] Duplicate space uid in listing, keeping first");
                continue;
            }
            order.push(space.uid.clone());
            nodes.insert(
                space.uid.clone(),
                SpaceNode {
                    space,
                    children: Vec::new(),
                },
            );
        }

        for uid in &order {
            let Some(parent_uid) = nodes[uid].space.parent_uid.clone() else {
                continue;
            };
            match nodes.get_mut(&parent_uid) {
                Some(parent) => {
                    debug!(parent = %parent.space.name, child = %uid, "[TREE] Linked child space");
                    parent.children.push(uid.clone());
                }
                None => {
                    warn!(uid = %uid, parent_uid = %parent_uid, "[TREE] Parent space not in listing, treating as root");
                    if let Some(node) = nodes.get_mut(uid) {
                        node.space.parent_uid = None;
                    }
                }
            }
        }

        SpaceTree { nodes, order }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, uid: &str) -> Option<&SpaceNode> {
        self.nodes.get(uid)
    }

    /// Every space, roots and children alike, in listing order.
    pub fn spaces(&self) -> impl Iterator<Item = &Space> {
        self.order.iter().map(move |uid| &self.nodes[uid].space)
    }

    pub fn roots(&self) -> impl Iterator<Item = &Space> {
        self.spaces().filter(|s| s.parent_uid.is_none())
    }

    /// Walks parent links up to the nearest space without a parent. Returns
    /// `None` for an unknown uid or a parent chain that loops.
    pub fn root_of(&self, uid: &str) -> Option<&Space> {
        let mut current = &self.nodes.get(uid)?.space;
        for _ in 0..=self.nodes.len() {
            match &current.parent_uid {
                None => return Some(current),
                Some(parent_uid) => current = &self.nodes.get(parent_uid)?.space,
            }
        }
        None
    }
}
