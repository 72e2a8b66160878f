//! Broad Phase
//!
//! Incremental AABB tree over all body bounds. Leaves store fat AABBs so
//! slowly moving bodies rarely re-insert, internal nodes are kept balanced
//! with AVL-style rotations, and insertion picks siblings by the surface area
//! heuristic. On top of the tree, [`BroadPhase`] maps body handles to proxies
//! and produces the candidate pair list for the narrow phase.

use std::collections::HashMap;

use glam::Vec3;

use crate::aabb::Aabb;
use crate::math::PhysicsTransform;
use crate::shape::CollisionShape;

/// Null node sentinel
const NULL_NODE: u32 = u32::MAX;

#[derive(Clone, Debug)]
struct TreeNode {
    /// Fat bounds for leaves, merged child bounds for internal nodes.
    aabb: Aabb,
    parent: u32,
    left: u32,
    right: u32,
    /// 0 for leaves, -1 for freed nodes.
    height: i32,
    /// Body handle for leaves.
    user_data: u32,
}

impl TreeNode {
    fn new() -> Self {
        Self {
            aabb: Aabb::new(Vec3::ZERO, Vec3::ZERO),
            parent: NULL_NODE,
            left: NULL_NODE,
            right: NULL_NODE,
            height: 0,
            user_data: NULL_NODE,
        }
    }

    #[inline]
    fn is_leaf(&self) -> bool {
        self.left == NULL_NODE
    }
}

/// Self-balancing AABB tree with O(log n) insert, remove, and move.
pub struct AabbTree {
    nodes: Vec<TreeNode>,
    free_list: Vec<u32>,
    root: u32,
    /// Leaf AABBs are enlarged by this margin in every direction.
    pub fat_margin: f32,
}

impl AabbTree {
    pub fn new(fat_margin: f32) -> Self {
        Self {
            nodes: Vec::new(),
            free_list: Vec::new(),
            root: NULL_NODE,
            fat_margin,
        }
    }

    /// Insert a leaf, returning its proxy id.
    pub fn insert(&mut self, aabb: Aabb, user_data: u32) -> u32 {
        let leaf = self.alloc_node();
        self.nodes[leaf as usize].aabb = aabb.expand(self.fat_margin);
        self.nodes[leaf as usize].user_data = user_data;
        self.nodes[leaf as usize].height = 0;
        self.insert_leaf(leaf);
        leaf
    }

    pub fn remove(&mut self, proxy: u32) {
        if (proxy as usize) < self.nodes.len() {
            self.remove_leaf(proxy);
            self.free_node(proxy);
        }
    }

    /// Move a proxy to a new tight AABB. Returns true when the leaf had to be
    /// re-inserted (the tight bounds escaped the fat bounds).
    pub fn update(&mut self, proxy: u32, aabb: Aabb) -> bool {
        if (proxy as usize) >= self.nodes.len() {
            return false;
        }
        if self.nodes[proxy as usize].aabb.contains(&aabb) {
            return false;
        }
        self.remove_leaf(proxy);
        self.nodes[proxy as usize].aabb = aabb.expand(self.fat_margin);
        self.insert_leaf(proxy);
        true
    }

    #[inline]
    pub fn fat_aabb(&self, proxy: u32) -> &Aabb {
        &self.nodes[proxy as usize].aabb
    }

    /// Visit the user data of every leaf whose fat AABB overlaps `aabb`.
    pub fn query<F: FnMut(u32)>(&self, aabb: &Aabb, mut visitor: F) {
        let mut stack = Vec::with_capacity(64);
        if self.root != NULL_NODE {
            stack.push(self.root);
        }
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id as usize];
            if !node.aabb.intersects(aabb) {
                continue;
            }
            if node.is_leaf() {
                visitor(node.user_data);
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
    }

    /// Visit the user data of every leaf whose fat AABB is hit by the ray
    /// within `max_distance`.
    pub fn ray_query<F: FnMut(u32)>(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mut visitor: F,
    ) {
        let mut stack = Vec::with_capacity(64);
        if self.root != NULL_NODE {
            stack.push(self.root);
        }
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id as usize];
            if node.aabb.ray_hit(origin, direction, max_distance).is_none() {
                continue;
            }
            if node.is_leaf() {
                visitor(node.user_data);
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
    }

    /// Unique unordered pairs of user data with overlapping fat AABBs.
    pub fn overlapping_pairs(&self) -> Vec<(u32, u32)> {
        let mut pairs = Vec::new();
        if self.root == NULL_NODE {
            return pairs;
        }
        let mut leaves = Vec::new();
        self.collect_leaves(self.root, &mut leaves);
        for &leaf in &leaves {
            let aabb = self.nodes[leaf as usize].aabb;
            let a = self.nodes[leaf as usize].user_data;
            self.query(&aabb, |b| {
                if a < b {
                    pairs.push((a, b));
                }
            });
        }
        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.height == 0 && n.user_data != NULL_NODE)
            .count()
    }

    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root as usize].height
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn alloc_node(&mut self) -> u32 {
        match self.free_list.pop() {
            Some(id) => {
                self.nodes[id as usize] = TreeNode::new();
                id
            }
            None => {
                self.nodes.push(TreeNode::new());
                (self.nodes.len() - 1) as u32
            }
        }
    }

    fn free_node(&mut self, id: u32) {
        self.nodes[id as usize].height = -1;
        self.nodes[id as usize].user_data = NULL_NODE;
        self.free_list.push(id);
    }

    fn insert_leaf(&mut self, leaf: u32) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf as usize].parent = NULL_NODE;
            return;
        }

        // Descend toward the cheapest sibling (surface area heuristic).
        let leaf_aabb = self.nodes[leaf as usize].aabb;
        let mut index = self.root;
        while !self.nodes[index as usize].is_leaf() {
            let left = self.nodes[index as usize].left;
            let right = self.nodes[index as usize].right;

            let combined_area = leaf_aabb.merge(&self.nodes[index as usize].aabb).surface_area();
            let cost_here = 2.0 * combined_area;
            let inheritance =
                2.0 * (combined_area - self.nodes[index as usize].aabb.surface_area());

            let descend_cost = |child: u32| -> f32 {
                let child_aabb = &self.nodes[child as usize].aabb;
                let merged_area = leaf_aabb.merge(child_aabb).surface_area();
                if self.nodes[child as usize].is_leaf() {
                    merged_area + inheritance
                } else {
                    merged_area - child_aabb.surface_area() + inheritance
                }
            };
            let cost_left = descend_cost(left);
            let cost_right = descend_cost(right);

            if cost_here < cost_left && cost_here < cost_right {
                break;
            }
            index = if cost_left < cost_right { left } else { right };
        }

        // Splice a fresh parent above the chosen sibling.
        let sibling = index;
        let old_parent = self.nodes[sibling as usize].parent;
        let new_parent = self.alloc_node();
        self.nodes[new_parent as usize].parent = old_parent;
        self.nodes[new_parent as usize].aabb =
            leaf_aabb.merge(&self.nodes[sibling as usize].aabb);
        self.nodes[new_parent as usize].height = self.nodes[sibling as usize].height + 1;
        self.nodes[new_parent as usize].left = sibling;
        self.nodes[new_parent as usize].right = leaf;
        self.nodes[sibling as usize].parent = new_parent;
        self.nodes[leaf as usize].parent = new_parent;

        if old_parent == NULL_NODE {
            self.root = new_parent;
        } else if self.nodes[old_parent as usize].left == sibling {
            self.nodes[old_parent as usize].left = new_parent;
        } else {
            self.nodes[old_parent as usize].right = new_parent;
        }

        self.refit_upward(new_parent);
    }

    fn remove_leaf(&mut self, leaf: u32) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }
        let parent = self.nodes[leaf as usize].parent;
        let grandparent = self.nodes[parent as usize].parent;
        let sibling = if self.nodes[parent as usize].left == leaf {
            self.nodes[parent as usize].right
        } else {
            self.nodes[parent as usize].left
        };

        if grandparent == NULL_NODE {
            self.root = sibling;
            self.nodes[sibling as usize].parent = NULL_NODE;
            self.free_node(parent);
        } else {
            if self.nodes[grandparent as usize].left == parent {
                self.nodes[grandparent as usize].left = sibling;
            } else {
                self.nodes[grandparent as usize].right = sibling;
            }
            self.nodes[sibling as usize].parent = grandparent;
            self.free_node(parent);
            self.refit_upward(grandparent);
        }
    }

    /// Walk to the root, rebalancing and refreshing heights and bounds.
    fn refit_upward(&mut self, start: u32) {
        let mut index = start;
        while index != NULL_NODE {
            index = self.balance(index);
            let left = self.nodes[index as usize].left;
            let right = self.nodes[index as usize].right;
            self.nodes[index as usize].height = 1 + self.nodes[left as usize]
                .height
                .max(self.nodes[right as usize].height);
            self.nodes[index as usize].aabb = self.nodes[left as usize]
                .aabb
                .merge(&self.nodes[right as usize].aabb);
            index = self.nodes[index as usize].parent;
        }
    }

    /// Rotate the taller grandchild of `a` up when the subtree is more than
    /// one level out of balance. Returns the index now occupying `a`'s slot.
    fn balance(&mut self, a: u32) -> u32 {
        if self.nodes[a as usize].is_leaf() || self.nodes[a as usize].height < 2 {
            return a;
        }

        let left = self.nodes[a as usize].left;
        let right = self.nodes[a as usize].right;
        let imbalance = self.nodes[right as usize].height - self.nodes[left as usize].height;

        if imbalance > 1 {
            self.rotate_up(a, right, left)
        } else if imbalance < -1 {
            self.rotate_up(a, left, right)
        } else {
            a
        }
    }

    /// Promote child `b` above its parent `a`; `other` is a's other child.
    /// The taller of b's children stays with b, the shorter moves under a.
    fn rotate_up(&mut self, a: u32, b: u32, other: u32) -> u32 {
        let b_left = self.nodes[b as usize].left;
        let b_right = self.nodes[b as usize].right;
        let parent = self.nodes[a as usize].parent;

        self.nodes[b as usize].left = a;
        self.nodes[b as usize].parent = parent;
        self.nodes[a as usize].parent = b;

        if parent == NULL_NODE {
            self.root = b;
        } else if self.nodes[parent as usize].left == a {
            self.nodes[parent as usize].left = b;
        } else {
            self.nodes[parent as usize].right = b;
        }

        let (keep, demote) =
            if self.nodes[b_left as usize].height >= self.nodes[b_right as usize].height {
                (b_left, b_right)
            } else {
                (b_right, b_left)
            };
        self.nodes[b as usize].right = keep;
        self.nodes[keep as usize].parent = b;

        self.nodes[a as usize].left = other;
        self.nodes[a as usize].right = demote;
        self.nodes[other as usize].parent = a;
        self.nodes[demote as usize].parent = a;

        // Refresh a first, then b, since b now sits above a.
        for &n in &[a, b] {
            let l = self.nodes[n as usize].left;
            let r = self.nodes[n as usize].right;
            self.nodes[n as usize].aabb =
                self.nodes[l as usize].aabb.merge(&self.nodes[r as usize].aabb);
            self.nodes[n as usize].height =
                1 + self.nodes[l as usize].height.max(self.nodes[r as usize].height);
        }

        b
    }

    fn collect_leaves(&self, id: u32, out: &mut Vec<u32>) {
        if id == NULL_NODE {
            return;
        }
        let node = &self.nodes[id as usize];
        if node.is_leaf() {
            out.push(id);
        } else {
            self.collect_leaves(node.left, out);
            self.collect_leaves(node.right, out);
        }
    }
}

// ============================================================================
// BroadPhase
// ============================================================================

/// A broad-phase candidate pair of body handles.
pub type BroadPhasePair = (u32, u32);

/// Maintains the AABB tree across body additions, removals, and movement, and
/// extracts candidate pairs each step.
pub struct BroadPhase {
    tree: AabbTree,
    proxies: HashMap<u32, u32>,
}

impl BroadPhase {
    pub fn new(fat_margin: f32) -> Self {
        Self {
            tree: AabbTree::new(fat_margin),
            proxies: HashMap::new(),
        }
    }

    /// Register a body. Degenerate bounds are refused and logged.
    pub fn add_body(&mut self, handle: u32, shape: &CollisionShape, transform: &PhysicsTransform) {
        let aabb = shape.to_aabb(transform);
        if !aabb.is_valid() {
            log::warn!("broad phase: refusing degenerate AABB for body {handle}");
            return;
        }
        let proxy = self.tree.insert(aabb, handle);
        self.proxies.insert(handle, proxy);
    }

    pub fn remove_body(&mut self, handle: u32) {
        if let Some(proxy) = self.proxies.remove(&handle) {
            self.tree.remove(proxy);
        }
    }

    /// Track a moved body. Bodies whose bounds went degenerate keep their
    /// previous proxy bounds.
    pub fn update_body(
        &mut self,
        handle: u32,
        shape: &CollisionShape,
        transform: &PhysicsTransform,
    ) {
        let aabb = shape.to_aabb(transform);
        if !aabb.is_valid() {
            log::warn!("broad phase: ignoring degenerate AABB update for body {handle}");
            return;
        }
        match self.proxies.get(&handle) {
            Some(&proxy) => {
                self.tree.update(proxy, aabb);
            }
            None => {
                let proxy = self.tree.insert(aabb, handle);
                self.proxies.insert(handle, proxy);
            }
        }
    }

    pub fn contains(&self, handle: u32) -> bool {
        self.proxies.contains_key(&handle)
    }

    /// Candidate pairs whose fat bounds overlap, after `filter` approves the
    /// pair (the world uses it to drop static-static pairs).
    pub fn compute_overlapping_pairs<F>(&self, mut filter: F) -> Vec<BroadPhasePair>
    where
        F: FnMut(u32, u32) -> bool,
    {
        self.tree
            .overlapping_pairs()
            .into_iter()
            .filter(|&(a, b)| filter(a, b))
            .collect()
    }

    /// Handles of every body whose fat bounds overlap the query box.
    pub fn bodies_in_aabb(&self, aabb: &Aabb) -> Vec<u32> {
        let mut out = Vec::new();
        self.tree.query(aabb, |h| out.push(h));
        out
    }

    /// Handles of every body whose fat bounds the ray passes through.
    pub fn bodies_on_ray(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Vec<u32> {
        let mut out = Vec::new();
        self.tree
            .ray_query(origin, direction, max_distance, |h| out.push(h));
        out
    }

    pub fn body_count(&self) -> usize {
        self.proxies.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_aabb(x: f32, y: f32, z: f32) -> Aabb {
        Aabb::new(Vec3::new(x, y, z), Vec3::new(x + 1.0, y + 1.0, z + 1.0))
    }

    #[test]
    fn test_insert_and_query() {
        let mut tree = AabbTree::new(0.2);
        tree.insert(unit_aabb(0.0, 0.0, 0.0), 0);
        tree.insert(unit_aabb(10.0, 10.0, 10.0), 1);
        tree.insert(unit_aabb(20.0, 20.0, 20.0), 2);
        assert_eq!(tree.leaf_count(), 3);

        let mut near_origin = Vec::new();
        tree.query(&unit_aabb(-1.0, -1.0, -1.0), |h| near_origin.push(h));
        assert!(near_origin.contains(&0));
        assert!(!near_origin.contains(&2));

        let mut all = Vec::new();
        tree.query(
            &Aabb::new(Vec3::splat(-100.0), Vec3::splat(100.0)),
            |h| all.push(h),
        );
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_remove() {
        let mut tree = AabbTree::new(0.2);
        tree.insert(unit_aabb(0.0, 0.0, 0.0), 0);
        let p1 = tree.insert(unit_aabb(5.0, 5.0, 5.0), 1);
        tree.insert(unit_aabb(10.0, 10.0, 10.0), 2);

        tree.remove(p1);
        assert_eq!(tree.leaf_count(), 2);

        let mut all = Vec::new();
        tree.query(
            &Aabb::new(Vec3::splat(-100.0), Vec3::splat(100.0)),
            |h| all.push(h),
        );
        assert!(!all.contains(&1));
    }

    #[test]
    fn test_small_move_stays_in_fat_bounds() {
        let mut tree = AabbTree::new(0.2);
        let p = tree.insert(unit_aabb(0.0, 0.0, 0.0), 0);
        let moved = unit_aabb(0.1, 0.0, 0.0);
        assert!(!tree.update(p, moved), "move within fat margin must not reinsert");
    }

    #[test]
    fn test_large_move_reinserts() {
        let mut tree = AabbTree::new(0.2);
        let p = tree.insert(unit_aabb(0.0, 0.0, 0.0), 0);
        assert!(tree.update(p, unit_aabb(50.0, 0.0, 0.0)));

        let mut hits = Vec::new();
        tree.query(&unit_aabb(49.5, 0.0, 0.0), |h| hits.push(h));
        assert!(hits.contains(&0), "moved leaf must be found at its new spot");
    }

    #[test]
    fn test_overlapping_pairs() {
        let mut tree = AabbTree::new(0.0);
        tree.insert(Aabb::new(Vec3::ZERO, Vec3::splat(2.0)), 0);
        tree.insert(Aabb::new(Vec3::ONE, Vec3::splat(3.0)), 1);
        tree.insert(unit_aabb(100.0, 100.0, 100.0), 2);

        let pairs = tree.overlapping_pairs();
        assert!(pairs.contains(&(0, 1)));
        assert!(!pairs.contains(&(0, 2)));
    }

    #[test]
    fn test_tree_stays_balanced() {
        let mut tree = AabbTree::new(0.2);
        for i in 0..100 {
            tree.insert(unit_aabb(i as f32 * 3.0, 0.0, 0.0), i);
        }
        assert_eq!(tree.leaf_count(), 100);
        assert!(tree.height() < 20, "height={}", tree.height());
    }

    #[test]
    fn test_ray_query() {
        let mut tree = AabbTree::new(0.0);
        tree.insert(unit_aabb(5.0, -0.5, -0.5), 0);
        tree.insert(unit_aabb(5.0, 10.0, 0.0), 1);

        let mut hits = Vec::new();
        tree.ray_query(Vec3::ZERO, Vec3::X, 100.0, |h| hits.push(h));
        assert_eq!(hits, vec![0]);

        let mut short = Vec::new();
        tree.ray_query(Vec3::ZERO, Vec3::X, 2.0, |h| short.push(h));
        assert!(short.is_empty(), "ray too short to reach the box");
    }

    #[test]
    fn test_broad_phase_pair_filter() {
        let mut bp = BroadPhase::new(0.2);
        let shape = CollisionShape::cuboid(Vec3::ONE).unwrap();
        bp.add_body(1, &shape, &PhysicsTransform::from_position(Vec3::ZERO));
        bp.add_body(
            2,
            &shape,
            &PhysicsTransform::from_position(Vec3::new(1.0, 0.0, 0.0)),
        );

        let pairs = bp.compute_overlapping_pairs(|_, _| true);
        assert_eq!(pairs, vec![(1, 2)]);

        let none = bp.compute_overlapping_pairs(|_, _| false);
        assert!(none.is_empty());
    }

    #[test]
    fn test_broad_phase_remove_body() {
        let mut bp = BroadPhase::new(0.2);
        let shape = CollisionShape::sphere(0.5).unwrap();
        bp.add_body(7, &shape, &PhysicsTransform::IDENTITY);
        assert!(bp.contains(7));
        bp.remove_body(7);
        assert!(!bp.contains(7));
        assert_eq!(bp.body_count(), 0);
    }
}
