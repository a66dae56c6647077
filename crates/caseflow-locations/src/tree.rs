//! Order-independent construction of nested location trees from flat lists.
//!
//! The builder runs over an arena of integer-handle nodes with explicit
//! parent/child links, so records can arrive in any order: a child seen
//! before its parent parks under a placeholder, and the placeholder is filled
//! in place when the parent's record shows up. Relinking a subtree is a
//! handle swap, never a deep move.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use caseflow_core::Location;

/// One node of the emitted tree. `location` is `None` only for placeholder
/// nodes that survive into the output (an unfilled parent reference below a
/// real root), which normal input never produces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HierarchicalNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<HierarchicalNode>,
}

impl HierarchicalNode {
    pub fn new(location: Location) -> Self {
        Self {
            location: Some(location),
            children: Vec::new(),
        }
    }

    /// Total number of nodes in this subtree, itself included.
    pub fn size(&self) -> usize {
        let mut total = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            total += 1;
            stack.extend(node.children.iter());
        }
        total
    }
}

/// Output shaping for [`build_tree`].
#[derive(Debug, Clone, Default)]
pub struct BuildTreeOptions {
    /// Strip the `identifiers` list from every emitted location.
    pub remove_identifiers: bool,
    /// Treat locations at this geographical level as roots even when they
    /// have a parent, cutting the tree off at that level.
    pub base_level: Option<String>,
    /// Stamp `updatedAt = now` on every emitted location.
    pub refresh_timestamp: bool,
}

struct ArenaNode {
    location: Option<Location>,
    parent: Option<usize>,
    children: Vec<usize>,
}

impl ArenaNode {
    fn placeholder() -> Self {
        Self {
            location: None,
            parent: None,
            children: Vec::new(),
        }
    }
}

struct Arena {
    nodes: Vec<ArenaNode>,
    index: HashMap<String, usize>,
}

impl Arena {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn handle_for(&mut self, id: &str) -> usize {
        if let Some(&handle) = self.index.get(id) {
            return handle;
        }
        let handle = self.nodes.len();
        self.nodes.push(ArenaNode::placeholder());
        self.index.insert(id.to_string(), handle);
        handle
    }

    /// Unhooks `handle` from its current parent, if any.
    fn detach(&mut self, handle: usize) {
        if let Some(parent) = self.nodes[handle].parent.take() {
            self.nodes[parent].children.retain(|&c| c != handle);
        }
    }

    /// Moves `handle` (and implicitly its whole subtree) under `parent`.
    fn attach(&mut self, handle: usize, parent: usize) {
        if self.nodes[handle].parent == Some(parent) {
            return;
        }
        self.detach(handle);
        self.nodes[handle].parent = Some(parent);
        self.nodes[parent].children.push(handle);
    }
}

/// Builds the nested tree for a flat list of locations, in any input order.
///
/// Roots are locations without a parent, or at `options.base_level` when one
/// is set. Children whose parent never appears in the input are dropped with
/// their subtrees, as is any parent cycle (a cycle leaves no root to emit
/// under). Top-level nodes are sorted case-insensitively by name; deeper
/// levels keep discovery order.
pub fn build_tree(locations: Vec<Location>, options: &BuildTreeOptions) -> Vec<HierarchicalNode> {
    let mut arena = Arena::new();

    for location in locations {
        let handle = arena.handle_for(&location.id);
        let is_root = location.parent_location_id.is_none()
            || (options.base_level.is_some()
                && location.geographical_level_id == options.base_level);
        let parent_id = location.parent_location_id.clone();
        arena.nodes[handle].location = Some(location);

        if is_root {
            // May have been parked under a placeholder by an earlier child.
            arena.detach(handle);
        } else if let Some(parent_id) = parent_id {
            let parent = arena.handle_for(&parent_id);
            arena.attach(handle, parent);
        }
    }

    let mut roots: Vec<usize> = (0..arena.nodes.len())
        .filter(|&h| arena.nodes[h].parent.is_none() && arena.nodes[h].location.is_some())
        .collect();
    roots.sort_by_key(|&h| {
        arena.nodes[h]
            .location
            .as_ref()
            .map(|l| l.normalized_name())
            .unwrap_or_default()
    });

    let mut visited: HashSet<usize> = HashSet::new();
    roots
        .into_iter()
        .filter_map(|root| convert(&mut arena, root, &mut visited, options))
        .collect()
}

/// Iterative post-order conversion of one arena subtree into nested nodes.
///
/// The shared visited set guards against revisits, so malformed input that
/// loops in the arena terminates with the looping edge dropped.
fn convert(
    arena: &mut Arena,
    root: usize,
    visited: &mut HashSet<usize>,
    options: &BuildTreeOptions,
) -> Option<HierarchicalNode> {
    if !visited.insert(root) {
        return None;
    }

    struct Frame {
        handle: usize,
        node: HierarchicalNode,
        next_child: usize,
    }

    let mut stack = vec![Frame {
        handle: root,
        node: emit(arena, root, options),
        next_child: 0,
    }];
    let mut result = None;

    while let Some(top) = stack.len().checked_sub(1) {
        let handle = stack[top].handle;
        let cursor = stack[top].next_child;
        if cursor < arena.nodes[handle].children.len() {
            stack[top].next_child += 1;
            let child = arena.nodes[handle].children[cursor];
            if visited.insert(child) {
                stack.push(Frame {
                    handle: child,
                    node: emit(arena, child, options),
                    next_child: 0,
                });
            }
        } else {
            let Some(frame) = stack.pop() else { break };
            match stack.last_mut() {
                Some(parent) => parent.node.children.push(frame.node),
                None => result = Some(frame.node),
            }
        }
    }

    result
}

fn emit(arena: &mut Arena, handle: usize, options: &BuildTreeOptions) -> HierarchicalNode {
    let mut location = arena.nodes[handle].location.take();
    if let Some(loc) = location.as_mut() {
        if options.remove_identifiers {
            loc.identifiers.clear();
        }
        if options.refresh_timestamp {
            loc.touch();
        }
    }
    HierarchicalNode {
        location,
        children: Vec::new(),
    }
}

/// Flattens a tree back into depth-first dotted id paths, one per node
/// (`parentId.childId.grandchildId`). Placeholder nodes contribute no path
/// segment of their own but their children are still visited.
pub fn flatten_to_references(nodes: &[HierarchicalNode]) -> Vec<String> {
    let mut paths = Vec::new();
    let mut stack: Vec<(&HierarchicalNode, String)> = Vec::new();
    for node in nodes.iter().rev() {
        stack.push((node, String::new()));
    }

    while let Some((node, prefix)) = stack.pop() {
        let path = match &node.location {
            Some(location) if prefix.is_empty() => location.id.clone(),
            Some(location) => format!("{prefix}.{}", location.id),
            None => prefix,
        };
        if !path.is_empty() {
            paths.push(path.clone());
        }
        for child in node.children.iter().rev() {
            stack.push((child, path.clone()));
        }
    }

    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn loc(id: &str, name: &str, parent: Option<&str>) -> Location {
        let mut location = Location::new(id, name);
        location.parent_location_id = parent.map(String::from);
        location
    }

    fn sample() -> Vec<Location> {
        vec![
            loc("country", "Country", None),
            loc("region-a", "Region A", Some("country")),
            loc("region-b", "Region B", Some("country")),
            loc("city-1", "City 1", Some("region-a")),
            loc("city-2", "City 2", Some("region-a")),
        ]
    }

    fn ids(nodes: &[HierarchicalNode]) -> Vec<&str> {
        nodes
            .iter()
            .filter_map(|n| n.location.as_ref().map(|l| l.id.as_str()))
            .collect()
    }

    #[test]
    fn test_builds_nested_tree() {
        let tree = build_tree(sample(), &BuildTreeOptions::default());
        assert_eq!(tree.len(), 1);
        let root = &tree[0];
        assert_eq!(root.location.as_ref().unwrap().id, "country");
        assert_eq!(ids(&root.children), vec!["region-a", "region-b"]);
        assert_eq!(ids(&root.children[0].children), vec!["city-1", "city-2"]);
        assert_eq!(root.size(), 5);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let mut reversed = sample();
        reversed.reverse();
        let tree = build_tree(reversed, &BuildTreeOptions::default());

        assert_eq!(tree.len(), 1);
        let root = &tree[0];
        assert_eq!(root.location.as_ref().unwrap().id, "country");
        assert_eq!(root.size(), 5);
        let mut children = ids(&root.children);
        children.sort();
        assert_eq!(children, vec!["region-a", "region-b"]);
    }

    #[test]
    fn test_child_before_parent_fills_placeholder_in_place() {
        let tree = build_tree(
            vec![
                loc("city", "City", Some("region")),
                loc("region", "Region", None),
            ],
            &BuildTreeOptions::default(),
        );
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].location.as_ref().unwrap().id, "region");
        assert_eq!(ids(&tree[0].children), vec!["city"]);
    }

    #[test]
    fn test_orphan_subtree_is_dropped() {
        let tree = build_tree(
            vec![
                loc("root", "Root", None),
                loc("stray", "Stray", Some("missing")),
                loc("stray-child", "Stray Child", Some("stray")),
            ],
            &BuildTreeOptions::default(),
        );
        assert_eq!(ids(&tree), vec!["root"]);
        assert!(tree[0].children.is_empty());
    }

    #[test]
    fn test_top_level_sorted_case_insensitively() {
        let tree = build_tree(
            vec![
                loc("z", "zeta", None),
                loc("a", "Alpha", None),
                loc("m", "MIDDLE", None),
            ],
            &BuildTreeOptions::default(),
        );
        assert_eq!(ids(&tree), vec!["a", "m", "z"]);
    }

    #[test]
    fn test_base_level_cuts_roots() {
        let mut region = loc("region", "Region", Some("country"));
        region.geographical_level_id = Some("admin-1".to_string());
        let tree = build_tree(
            vec![loc("country", "Country", None), region, loc(
                "city",
                "City",
                Some("region"),
            )],
            &BuildTreeOptions {
                base_level: Some("admin-1".to_string()),
                ..BuildTreeOptions::default()
            },
        );
        // The region becomes a root even though it has a parent.
        let mut roots = ids(&tree);
        roots.sort();
        assert_eq!(roots, vec!["country", "region"]);
        let region_node = tree
            .iter()
            .find(|n| n.location.as_ref().is_some_and(|l| l.id == "region"))
            .unwrap();
        assert_eq!(ids(&region_node.children), vec!["city"]);
    }

    #[test]
    fn test_cycle_terminates_and_is_dropped() {
        let tree = build_tree(
            vec![
                loc("a", "A", Some("b")),
                loc("b", "B", Some("a")),
                loc("root", "Root", None),
            ],
            &BuildTreeOptions::default(),
        );
        // The cycle has no root, so neither node is emitted.
        assert_eq!(ids(&tree), vec!["root"]);
    }

    #[test]
    fn test_self_parent_is_dropped() {
        let tree = build_tree(
            vec![loc("a", "A", Some("a")), loc("root", "Root", None)],
            &BuildTreeOptions::default(),
        );
        assert_eq!(ids(&tree), vec!["root"]);
    }

    #[test]
    fn test_remove_identifiers() {
        let mut root = loc("root", "Root", None);
        root.identifiers = vec![caseflow_core::LocationIdentifier {
            code: "ISO-1".to_string(),
            description: None,
        }];
        let tree = build_tree(
            vec![root],
            &BuildTreeOptions {
                remove_identifiers: true,
                ..BuildTreeOptions::default()
            },
        );
        assert!(tree[0].location.as_ref().unwrap().identifiers.is_empty());
    }

    #[test]
    fn test_refresh_timestamp() {
        let mut root = loc("root", "Root", None);
        root.updated_at = datetime!(2020-01-01 0:00 UTC);
        let tree = build_tree(
            vec![root],
            &BuildTreeOptions {
                refresh_timestamp: true,
                ..BuildTreeOptions::default()
            },
        );
        let updated = tree[0].location.as_ref().unwrap().updated_at;
        assert!(updated > datetime!(2020-01-01 0:00 UTC));
    }

    #[test]
    fn test_flatten_to_references() {
        let tree = build_tree(sample(), &BuildTreeOptions::default());
        let paths = flatten_to_references(&tree);
        assert_eq!(
            paths,
            vec![
                "country",
                "country.region-a",
                "country.region-a.city-1",
                "country.region-a.city-2",
                "country.region-b",
            ]
        );
    }

    #[test]
    fn test_flatten_roundtrip_recovers_parents() {
        let mut shuffled = sample();
        shuffled.swap(0, 4);
        shuffled.swap(1, 3);
        let paths = flatten_to_references(&build_tree(shuffled, &BuildTreeOptions::default()));
        // Every path's prefix is its parent's path.
        for path in &paths {
            if let Some((prefix, _)) = path.rsplit_once('.') {
                assert!(paths.contains(&prefix.to_string()), "missing {prefix}");
            }
        }
        assert_eq!(paths.len(), 5);
    }

    #[test]
    fn test_empty_input() {
        let tree = build_tree(Vec::new(), &BuildTreeOptions::default());
        assert!(tree.is_empty());
        assert!(flatten_to_references(&tree).is_empty());
    }
}
