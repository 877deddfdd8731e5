use tracing::warn;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::store::PasswordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    Entry,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl Node {
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}

/// Mirror of the store's folder hierarchy.
///
/// Nodes live in an arena and refer to each other by [`NodeId`]. Removed
/// nodes stay in the arena but are unreachable from the root; the tree is
/// rebuilt from scratch on refresh.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                name: String::new(),
                kind: NodeKind::Directory,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Arena size, including detached nodes.
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn add_child(&mut self, parent: NodeId, name: impl Into<String>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.into(),
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Slash-joined names from the top-level ancestor down to `id`.
    pub fn full_path(&self, id: NodeId) -> String {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.node(node_id);
            if node.parent.is_none() {
                break;
            }
            names.push(node.name.as_str());
            current = node.parent;
        }
        names.reverse();
        names.join("/")
    }

    /// Folder a new sibling of `id` would go into; always ends with `/`.
    pub fn containing_folder(&self, id: NodeId) -> String {
        let node = self.node(id);
        let mut path = self.full_path(id);
        if !node.is_dir() {
            path.truncate(path.len() - node.name.len());
        }
        if !path.ends_with('/') {
            path.push('/');
        }
        path
    }

    pub fn find(&self, path: &str) -> Option<NodeId> {
        let mut current = self.root();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = *self
                .children(current)
                .iter()
                .find(|child| self.node(**child).name == segment)?;
        }
        Some(current)
    }

    /// Like [`Tree::find`], but the last segment must be of `kind` and every
    /// segment before it a directory. Folders and entries may share a name.
    pub fn find_kind(&self, path: &str, kind: NodeKind) -> Option<NodeId> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let (last, folders) = segments.split_last()?;
        let mut current = self.root();
        for segment in folders {
            current = *self.children(current).iter().find(|child| {
                let node = self.node(**child);
                node.is_dir() && node.name == *segment
            })?;
        }
        self.children(current).iter().copied().find(|child| {
            let node = self.node(*child);
            node.kind == kind && node.name == *last
        })
    }

    /// Whether `id` is still reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            match self.parent(current) {
                None => return current == self.root(),
                Some(parent) => {
                    if !self.children(parent).contains(&current) {
                        return false;
                    }
                    current = parent;
                }
            }
        }
    }

    /// Detach `id` (and with it its subtree) from its parent.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.parent(id) else {
            return false;
        };
        let siblings = &mut self.nodes[parent.0].children;
        let before = siblings.len();
        siblings.retain(|child| *child != id);
        before != siblings.len()
    }

    /// Pre-order walk of every attached node, root excluded.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }
}

/// Walk the store depth-first and mirror it as a [`Tree`].
///
/// Folders that can't be listed are logged and left empty.
pub fn build_tree(store: &dyn PasswordStore) -> Tree {
    let mut tree = Tree::new();
    let root = tree.root();
    add_items(store, &mut tree, root, "");
    tree
}

fn add_items(store: &dyn PasswordStore, tree: &mut Tree, parent: NodeId, path: &str) {
    let (directories, entries) = match store.list_dir(path) {
        Ok(listing) => listing,
        Err(e) => {
            warn!(path, "error accessing store folder: {e}");
            return;
        }
    };

    for directory in directories {
        let name = basename(&directory).to_string();
        let child_path = if path.is_empty() {
            name.clone()
        } else {
            format!("{path}/{name}")
        };
        let child = tree.add_child(parent, name, NodeKind::Directory);
        add_items(store, tree, child, &child_path);
    }

    for entry in entries {
        tree.add_child(parent, basename(&entry), NodeKind::Entry);
    }
}

fn basename(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

/// A decrypted entry: the first line is the password, the rest free text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Secret {
    pub password: String,
    pub info: String,
}

impl Secret {
    pub fn parse(content: &str) -> Self {
        match content.split_once('\n') {
            Some((first, rest)) => Self {
                password: first.trim_end_matches('\r').to_string(),
                info: rest.to_string(),
            },
            None => Self {
                password: content.to_string(),
                info: String::new(),
            },
        }
    }

    pub fn render(&self) -> String {
        format!("{}\n{}", self.password, self.info)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::StoreError;
    use crate::store::Listing;
    use crate::store::testing::temp_store;

    /// Serves canned listings in a fixed, deliberately unsorted order.
    #[derive(Default)]
    struct ScriptedStore {
        listings: HashMap<String, Listing>,
        denied: Vec<String>,
    }

    impl ScriptedStore {
        fn dir(mut self, path: &str, dirs: &[&str], entries: &[&str]) -> Self {
            self.listings.insert(
                path.to_string(),
                (
                    dirs.iter().map(|s| s.to_string()).collect(),
                    entries.iter().map(|s| s.to_string()).collect(),
                ),
            );
            self
        }
    }

    impl PasswordStore for ScriptedStore {
        fn list_dir(&self, path: &str) -> Result<Listing, StoreError> {
            if self.denied.iter().any(|d| d == path) {
                return Err(StoreError::PermissionDenied(path.to_string()));
            }
            self.listings
                .get(path)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(path.to_string()))
        }
        fn get_key(&self, path: &str) -> Result<String, StoreError> {
            Err(StoreError::NotFound(path.to_string()))
        }
        fn set_key(&self, _: &str, _: &str, _: bool) -> Result<(), StoreError> {
            Ok(())
        }
        fn move_path(&self, _: &str, _: &str) -> Result<(), StoreError> {
            Ok(())
        }
        fn remove_path(&self, _: &str, _: bool) -> Result<(), StoreError> {
            Ok(())
        }
        fn contains(&self, _: &str) -> bool {
            false
        }
    }

    fn names(tree: &Tree, id: NodeId) -> Vec<&str> {
        tree.children(id)
            .iter()
            .map(|c| tree.node(*c).name.as_str())
            .collect()
    }

    #[test]
    fn root_children_follow_adapter_order() {
        let store = ScriptedStore::default()
            .dir("", &["zeta", "Alpha"], &["web", "bank"])
            .dir("zeta", &[], &[])
            .dir("Alpha", &[], &[]);
        let tree = build_tree(&store);
        assert_eq!(names(&tree, tree.root()), vec!["zeta", "Alpha", "web", "bank"]);
        let kinds: Vec<NodeKind> = tree
            .children(tree.root())
            .iter()
            .map(|c| tree.node(*c).kind)
            .collect();
        assert_eq!(
            kinds,
            vec![NodeKind::Directory, NodeKind::Directory, NodeKind::Entry, NodeKind::Entry]
        );
    }

    #[test]
    fn nested_listings_use_joined_paths_and_basenames() {
        let store = ScriptedStore::default()
            .dir("", &["Email"], &[])
            .dir("Email", &["Email/work"], &["Email/gmail"])
            .dir("Email/work", &[], &["vpn"]);
        let tree = build_tree(&store);
        let email = tree.find("Email").unwrap();
        assert_eq!(names(&tree, email), vec!["work", "gmail"]);
        let vpn = tree.find("Email/work/vpn").unwrap();
        assert_eq!(tree.full_path(vpn), "Email/work/vpn");
    }

    #[test]
    fn unreadable_folder_is_skipped_not_fatal() {
        let mut store = ScriptedStore::default()
            .dir("", &["locked", "open"], &["top"])
            .dir("locked", &[], &["never"])
            .dir("open", &[], &["inside"]);
        store.denied.push("locked".into());
        let tree = build_tree(&store);

        let locked = tree.find("locked").unwrap();
        assert!(tree.children(locked).is_empty());
        assert!(tree.find("open/inside").is_some());
        assert!(tree.find("top").is_some());
    }

    #[test]
    fn failing_root_yields_empty_tree() {
        let store = ScriptedStore::default();
        let tree = build_tree(&store);
        assert!(tree.children(tree.root()).is_empty());
    }

    #[test]
    fn full_path_round_trips_through_find() {
        let (_dir, store) = temp_store(&[
            ("Email/gmail", "a"),
            ("Email/work/vpn", "b"),
            ("bank", "c"),
        ]);
        let tree = build_tree(&store);
        for path in ["Email", "Email/gmail", "Email/work", "Email/work/vpn", "bank"] {
            let id = tree.find(path).unwrap();
            assert_eq!(tree.full_path(id), path);
        }
        assert_eq!(tree.full_path(tree.root()), "");
        assert!(tree.find("Email/outlook").is_none());
    }

    #[test]
    fn containing_folder_ends_with_slash() {
        let (_dir, store) = temp_store(&[("Email/work/vpn", "b"), ("bank", "c")]);
        let tree = build_tree(&store);
        assert_eq!(
            tree.containing_folder(tree.find("Email/work/vpn").unwrap()),
            "Email/work/"
        );
        assert_eq!(
            tree.containing_folder(tree.find("Email/work").unwrap()),
            "Email/work/"
        );
        assert_eq!(tree.containing_folder(tree.find("bank").unwrap()), "/");
    }

    #[test]
    fn empty_folder_is_still_a_folder() {
        let store = ScriptedStore::default()
            .dir("", &["empty"], &[])
            .dir("empty", &[], &[]);
        let tree = build_tree(&store);
        let empty = tree.find("empty").unwrap();
        assert!(tree.node(empty).is_dir());
        assert_eq!(tree.containing_folder(empty), "empty/");
    }

    #[test]
    fn find_kind_tells_same_named_folder_and_entry_apart() {
        let (_dir, store) = temp_store(&[("Email", "entry"), ("Email/gmail", "x")]);
        let tree = build_tree(&store);
        let folder = tree.find_kind("Email", NodeKind::Directory).unwrap();
        let entry = tree.find_kind("Email", NodeKind::Entry).unwrap();
        assert_ne!(folder, entry);
        assert!(tree.node(folder).is_dir());
        assert!(!tree.node(entry).is_dir());
        assert!(tree.find_kind("Email/gmail", NodeKind::Entry).is_some());
        assert!(tree.find_kind("Email/gmail", NodeKind::Directory).is_none());
        assert!(tree.find_kind("", NodeKind::Directory).is_none());
    }

    #[test]
    fn remove_detaches_only_the_target_subtree() {
        let (_dir, store) = temp_store(&[
            ("a/x", "1"),
            ("a/y", "2"),
            ("b/z", "3"),
            ("c", "4"),
        ]);
        let mut tree = build_tree(&store);
        let a = tree.find("a").unwrap();
        let x = tree.find("a/x").unwrap();
        assert!(tree.remove(a));
        assert!(!tree.is_attached(a));
        assert!(!tree.is_attached(x));
        assert!(tree.find("a/x").is_none());
        assert_eq!(names(&tree, tree.root()), vec!["b", "c"]);
        assert!(tree.find("b/z").is_some());

        assert!(!tree.remove(tree.root()));
    }

    #[test]
    fn descendants_are_pre_order() {
        let (_dir, store) = temp_store(&[("a/x", "1"), ("a/y", "2"), ("b", "3")]);
        let tree = build_tree(&store);
        let order: Vec<String> = tree
            .descendants(tree.root())
            .into_iter()
            .map(|id| tree.full_path(id))
            .collect();
        assert_eq!(order, vec!["a", "a/x", "a/y", "b"]);
    }

    #[test]
    fn secret_splits_password_and_info() {
        let secret = Secret::parse("hunter2\nuser: me\nurl: x\n");
        assert_eq!(secret.password, "hunter2");
        assert_eq!(secret.info, "user: me\nurl: x\n");
        assert_eq!(secret.render(), "hunter2\nuser: me\nurl: x\n");

        let bare = Secret::parse("only-password");
        assert_eq!(bare.password, "only-password");
        assert!(bare.info.is_empty());
        assert_eq!(bare.render(), "only-password\n");
    }
}
