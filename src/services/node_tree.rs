//! Arena-backed release node tree.
//!
//! Releases store their nodes as a nested forest. For lookups and mutation
//! the forest is flattened into an arena: one slot per node, an id → slot
//! index, and explicit parent/children links. This gives O(1) lookup by id,
//! rejects duplicate ids (and therefore cycles) when nodes enter the tree,
//! and walks the tree with an explicit stack instead of recursion.
//!
//! Inside the arena `ReleaseNode::children` is always empty; the links live
//! in the slots. [`NodeTree::into_forest`] rebuilds the nested shape.

use crate::error::AppError;
use crate::models::{GitHubIssueRef, NodePatch, NodeStatus, Release, ReleaseNode};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
struct Slot {
    /// `None` once the node has been removed or moved out by `into_forest`.
    node: Option<ReleaseNode>,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// Flattened view of a release's node forest.
#[derive(Debug, Clone, Default)]
pub struct NodeTree {
    slots: Vec<Slot>,
    index: HashMap<String, usize>,
    roots: Vec<usize>,
}

/// A node visited during traversal, with its position in the tree.
#[derive(Debug, Clone, Copy)]
pub struct TreeEntry<'a> {
    pub node: &'a ReleaseNode,
    pub parent_id: Option<&'a str>,
    pub depth: usize,
}

/// Depth-first, pre-order iterator over a [`NodeTree`].
pub struct Preorder<'a> {
    tree: &'a NodeTree,
    stack: Vec<(usize, usize)>,
}

impl<'a> Iterator for Preorder<'a> {
    type Item = TreeEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (idx, depth) = self.stack.pop()?;
        let slot = &self.tree.slots[idx];

        for &child in slot.children.iter().rev() {
            self.stack.push((child, depth + 1));
        }

        let parent_id = slot
            .parent
            .and_then(|p| self.tree.slots[p].node.as_ref())
            .map(|n| n.id.as_str());

        slot.node.as_ref().map(|node| TreeEntry {
            node,
            parent_id,
            depth,
        })
    }
}

fn duplicate_id(id: &str) -> AppError {
    AppError::invalid_input_field(format!("Duplicate node id '{}'", id), "nodes")
}

fn node_not_found(id: &str) -> AppError {
    AppError::not_found_with_id("ReleaseNode", id)
}

impl NodeTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from a nested forest, rejecting empty or duplicate ids.
    pub fn from_forest(nodes: Vec<ReleaseNode>) -> Result<Self, AppError> {
        let mut tree = Self::new();
        for node in nodes {
            tree.validate_subtree(&node)?;
            tree.attach(None, node);
        }
        Ok(tree)
    }

    /// Build a tree from a copy of the release's nodes.
    pub fn from_release(release: &Release) -> Result<Self, AppError> {
        Self::from_forest(release.nodes.clone())
    }

    /// Number of nodes in the tree.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Find a node by id.
    pub fn find(&self, id: &str) -> Option<&ReleaseNode> {
        self.index
            .get(id)
            .and_then(|&idx| self.slots[idx].node.as_ref())
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut ReleaseNode> {
        let idx = *self.index.get(id)?;
        self.slots[idx].node.as_mut()
    }

    /// Copy of the node with its whole subtree nested under it.
    pub fn subtree(&self, id: &str) -> Option<ReleaseNode> {
        let root = *self.index.get(id)?;
        let order = self.subtree_preorder(root);
        let mut built: HashMap<usize, ReleaseNode> = HashMap::with_capacity(order.len());

        for &idx in order.iter().rev() {
            let Some(node) = &self.slots[idx].node else {
                continue;
            };
            let mut node = node.clone();
            node.children = self.slots[idx]
                .children
                .iter()
                .filter_map(|c| built.remove(c))
                .collect();
            built.insert(idx, node);
        }

        built.remove(&root)
    }

    /// Id of the node's parent, `None` for roots and unknown ids.
    pub fn parent_id(&self, id: &str) -> Option<&str> {
        let idx = *self.index.get(id)?;
        let parent = self.slots[idx].parent?;
        self.slots[parent].node.as_ref().map(|n| n.id.as_str())
    }

    /// Ids of the node's direct children, in order.
    pub fn children_ids(&self, id: &str) -> Vec<&str> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        self.slots[idx]
            .children
            .iter()
            .filter_map(|&c| self.slots[c].node.as_ref())
            .map(|n| n.id.as_str())
            .collect()
    }

    /// Walk the forest depth-first, parents before children, roots in order.
    pub fn preorder(&self) -> Preorder<'_> {
        let stack = self.roots.iter().rev().map(|&r| (r, 0)).collect();
        Preorder { tree: self, stack }
    }

    /// Merge `patch` into the node with `id`. Returns false if there is no
    /// such node; nothing else in the tree is touched.
    pub fn update(&mut self, id: &str, patch: &NodePatch) -> bool {
        match self.find_mut(id) {
            Some(node) => {
                patch.apply(node);
                true
            }
            None => false,
        }
    }

    /// Append `node` (with its subtree) under `parent_id`, or as a new root.
    ///
    /// Issue links carried by the new nodes are dropped: only publishing
    /// links a node.
    pub fn insert(&mut self, parent_id: Option<&str>, node: ReleaseNode) -> Result<(), AppError> {
        let parent = match parent_id {
            Some(pid) => Some(*self.index.get(pid).ok_or_else(|| node_not_found(pid))?),
            None => None,
        };
        self.validate_subtree(&node)?;
        let root = self.slots.len();
        self.attach(parent, node);
        for idx in self.subtree_preorder(root) {
            if let Some(node) = self.slots[idx].node.as_mut() {
                node.github_issue = None;
            }
        }
        Ok(())
    }

    /// Replace every node's issue link with the one `stored` holds for the
    /// same id, or none.
    ///
    /// Used when a client sends a whole forest: links it carries are ignored
    /// and nodes that were already published keep their issue.
    pub fn keep_issue_links(&mut self, stored: &NodeTree) {
        for slot in &mut self.slots {
            if let Some(node) = slot.node.as_mut() {
                node.github_issue = stored.find(&node.id).and_then(|n| n.github_issue.clone());
            }
        }
    }

    /// Move a node (and its subtree) under a new parent, or to the root level.
    ///
    /// `position` is the index among the new siblings; out-of-range or `None`
    /// appends. Moving a node under itself or one of its descendants is
    /// rejected.
    pub fn move_node(
        &mut self,
        id: &str,
        new_parent_id: Option<&str>,
        position: Option<usize>,
    ) -> Result<(), AppError> {
        let idx = *self.index.get(id).ok_or_else(|| node_not_found(id))?;

        let new_parent = match new_parent_id {
            Some(pid) => {
                let pidx = *self.index.get(pid).ok_or_else(|| node_not_found(pid))?;
                let mut cursor = Some(pidx);
                while let Some(current) = cursor {
                    if current == idx {
                        return Err(AppError::invalid_input_field(
                            format!("Cannot move node '{}' under itself or its descendant '{}'", id, pid),
                            "parentId",
                        ));
                    }
                    cursor = self.slots[current].parent;
                }
                Some(pidx)
            }
            None => None,
        };

        self.detach(idx);

        let siblings = match new_parent {
            Some(p) => &mut self.slots[p].children,
            None => &mut self.roots,
        };
        let at = position.unwrap_or(siblings.len()).min(siblings.len());
        siblings.insert(at, idx);
        self.slots[idx].parent = new_parent;

        Ok(())
    }

    /// Remove a node and its subtree, returning it in nested form.
    pub fn remove(&mut self, id: &str) -> Option<ReleaseNode> {
        let idx = *self.index.get(id)?;
        self.detach(idx);
        for i in self.subtree_preorder(idx) {
            if let Some(node) = &self.slots[i].node {
                self.index.remove(&node.id);
            }
        }
        self.build_subtree(idx)
    }

    /// Record the GitHub issue created for a node.
    ///
    /// A node is linked once; relinking an already linked node is a conflict.
    pub fn link_issue(&mut self, id: &str, issue: GitHubIssueRef) -> Result<(), AppError> {
        let node = self.find_mut(id).ok_or_else(|| node_not_found(id))?;
        if let Some(existing) = &node.github_issue {
            return Err(AppError::conflict(format!(
                "Node {} is already linked to issue #{}",
                id, existing.issue_number
            )));
        }
        node.github_issue = Some(issue);
        Ok(())
    }

    /// Stamp `last_synced` on a linked node and optionally record its new status.
    pub fn record_sync(
        &mut self,
        id: &str,
        status: Option<NodeStatus>,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let node = self.find_mut(id).ok_or_else(|| node_not_found(id))?;
        let issue = node
            .github_issue
            .as_mut()
            .ok_or_else(|| AppError::not_published(id))?;
        issue.last_synced = Some(at);
        if let Some(status) = status {
            node.properties.status = status;
        }
        Ok(())
    }

    /// Percentage (rounded down) of nodes that are released or completed.
    pub fn completion(&self) -> u8 {
        if self.is_empty() {
            return 0;
        }
        let done = self
            .preorder()
            .filter(|e| e.node.properties.status.is_done())
            .count();
        ((done * 100) / self.len()) as u8
    }

    /// Rebuild the nested forest.
    pub fn into_forest(mut self) -> Vec<ReleaseNode> {
        let roots = std::mem::take(&mut self.roots);
        roots
            .into_iter()
            .filter_map(|root| self.build_subtree(root))
            .collect()
    }

    /// Store the tree back into `release`, refreshing its derived counters.
    pub fn write_back(self, release: &mut Release) {
        release.node_count = self.len();
        release.completion = self.completion();
        release.nodes = self.into_forest();
    }

    fn validate_subtree(&self, root: &ReleaseNode) -> Result<(), AppError> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if node.id.trim().is_empty() {
                return Err(AppError::invalid_input_field(
                    "Node ids must not be empty",
                    "nodes",
                ));
            }
            if self.index.contains_key(&node.id) || !seen.insert(node.id.as_str()) {
                return Err(duplicate_id(&node.id));
            }
            stack.extend(node.children.iter());
        }
        Ok(())
    }

    fn attach(&mut self, parent: Option<usize>, root: ReleaseNode) {
        let mut stack = vec![(root, parent)];
        while let Some((mut node, parent)) = stack.pop() {
            let children = std::mem::take(&mut node.children);
            let idx = self.slots.len();
            self.index.insert(node.id.clone(), idx);
            self.slots.push(Slot {
                node: Some(node),
                parent,
                children: Vec::new(),
            });
            match parent {
                Some(p) => self.slots[p].children.push(idx),
                None => self.roots.push(idx),
            }
            for child in children.into_iter().rev() {
                stack.push((child, Some(idx)));
            }
        }
    }

    fn detach(&mut self, idx: usize) {
        let siblings = match self.slots[idx].parent {
            Some(p) => &mut self.slots[p].children,
            None => &mut self.roots,
        };
        siblings.retain(|&s| s != idx);
        self.slots[idx].parent = None;
    }

    fn subtree_preorder(&self, root: usize) -> Vec<usize> {
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            order.push(idx);
            stack.extend(self.slots[idx].children.iter().rev());
        }
        order
    }

    /// Move the subtree rooted at `root` out of the arena as nested nodes.
    /// Children are assembled before their parents, so no recursion is needed.
    fn build_subtree(&mut self, root: usize) -> Option<ReleaseNode> {
        let order = self.subtree_preorder(root);
        let mut built: HashMap<usize, ReleaseNode> = HashMap::with_capacity(order.len());

        for &idx in order.iter().rev() {
            let Some(mut node) = self.slots[idx].node.take() else {
                continue;
            };
            node.children = self.slots[idx]
                .children
                .iter()
                .filter_map(|c| built.remove(c))
                .collect();
            built.insert(idx, node);
        }

        built.remove(&root)
    }
}
