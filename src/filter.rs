use std::collections::HashSet;

use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::models::{NodeId, Tree};

/// Case-insensitive search pattern applied to node names.
///
/// The pattern is tried as a regular expression first; text that doesn't
/// compile (an unbalanced `(`, a lone `*`) is matched literally instead.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pattern: String,
    regex: Option<Regex>,
}

impl Filter {
    pub fn new(pattern: &str) -> Self {
        if pattern.is_empty() {
            return Self::default();
        }
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .or_else(|e| {
                debug!(pattern, "not a valid regex, matching literally: {e}");
                RegexBuilder::new(&regex::escape(pattern))
                    .case_insensitive(true)
                    .build()
            })
            .ok();
        Self {
            pattern: pattern.to_string(),
            regex,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_active(&self) -> bool {
        !self.pattern.is_empty()
    }

    pub fn matches(&self, name: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(name),
            None => !self.is_active() || name.to_lowercase().contains(&self.pattern.to_lowercase()),
        }
    }
}

/// Which nodes of a tree survive a filter, indexed by [`NodeId`].
#[derive(Debug, Clone)]
pub struct Visibility {
    visible: Vec<bool>,
}

impl Visibility {
    pub fn is_visible(&self, id: NodeId) -> bool {
        self.visible.get(id.index()).copied().unwrap_or(false)
    }

    pub fn count(&self) -> usize {
        self.visible.iter().filter(|v| **v).count()
    }
}

/// A node is visible when its name matches or anything below it does.
pub fn apply_filter(tree: &Tree, filter: &Filter) -> Visibility {
    let mut visible = vec![false; tree.capacity()];
    mark(tree, filter, tree.root(), &mut visible);
    visible[tree.root().index()] = true;
    Visibility { visible }
}

fn mark(tree: &Tree, filter: &Filter, id: NodeId, visible: &mut [bool]) -> bool {
    let mut any_child = false;
    for child in tree.children(id) {
        // no short-circuit: every descendant needs its own verdict
        if mark(tree, filter, *child, visible) {
            any_child = true;
        }
    }
    let shown = any_child || filter.matches(&tree.node(id).name);
    visible[id.index()] = shown;
    shown
}

/// One line of the flattened tree view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Row {
    pub id: NodeId,
    pub depth: usize,
}

/// Flatten visible nodes in pre-order.
///
/// Folders are descended into when expanded; while `filtering`, every folder
/// with visible content is opened so matches are never hidden.
pub fn visible_rows(
    tree: &Tree,
    visibility: &Visibility,
    expanded: &HashSet<NodeId>,
    filtering: bool,
) -> Vec<Row> {
    let mut rows = Vec::new();
    push_rows(tree, visibility, expanded, filtering, tree.root(), 0, &mut rows);
    rows
}

fn push_rows(
    tree: &Tree,
    visibility: &Visibility,
    expanded: &HashSet<NodeId>,
    filtering: bool,
    parent: NodeId,
    depth: usize,
    rows: &mut Vec<Row>,
) {
    for child in tree.children(parent) {
        if !visibility.is_visible(*child) {
            continue;
        }
        rows.push(Row { id: *child, depth });
        let node = tree.node(*child);
        let open = expanded.contains(child)
            || filtering && tree.children(*child).iter().any(|c| visibility.is_visible(*c));
        if node.is_dir() && open {
            push_rows(tree, visibility, expanded, filtering, *child, depth + 1, rows);
        }
    }
}
