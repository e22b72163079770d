//! Tree and commit records, and conversion between trees, path maps and the
//! files on disk.

use crate::error::{CkptError, Result};
use crate::lock::Deadline;
use crate::{ObjectId, ObjectStore};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

/// Flat view of a tree: `/`-separated relative path to blob id.
pub(crate) type PathMap = BTreeMap<String, ObjectId>;

/// File hierarchy tree.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    /// Entries sorted by name.
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Creates a new tree, sorting entries by name so equal listings hash equally.
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Self { entries }
    }
}

/// Entry in a tree.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// File or directory name.
    pub name: String,
    /// Type of entry.
    pub kind: TreeEntryKind,
    /// Blob or subtree id.
    pub id: ObjectId,
}

/// Type of tree entry.
#[repr(u8)]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEntryKind {
    /// Regular file (blob).
    Blob = 1,
    /// Directory (subtree).
    Tree = 2,
}

/// Commit record stored in the object store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub(crate) struct CommitRecord {
    /// Parent commits; empty for the root commit.
    pub parents: Vec<ObjectId>,
    /// Milliseconds since the Unix epoch.
    pub timestamp_millis: i64,
    pub message: String,
    pub author: String,
    /// Root tree snapshot.
    pub root_tree: ObjectId,
}

/// Expands a stored tree into a path map.
pub(crate) fn flatten(store: &ObjectStore, tree_id: ObjectId) -> Result<PathMap> {
    let mut out = PathMap::new();
    flatten_into(store, tree_id, "", &mut out)?;
    Ok(out)
}

fn flatten_into(store: &ObjectStore, tree_id: ObjectId, prefix: &str, out: &mut PathMap) -> Result<()> {
    let tree = store.get_tree(tree_id)?;
    for entry in tree.entries {
        let path = if prefix.is_empty() {
            entry.name
        } else {
            format!("{}/{}", prefix, entry.name)
        };
        match entry.kind {
            TreeEntryKind::Blob => {
                out.insert(path, entry.id);
            }
            TreeEntryKind::Tree => flatten_into(store, entry.id, &path, out)?,
        }
    }
    Ok(())
}

/// Stores the directory hierarchy described by `files` and returns the root tree id.
pub(crate) fn build(store: &ObjectStore, files: &PathMap) -> Result<ObjectId> {
    let mut root = DirNode::default();
    for (path, id) in files {
        root.insert(path, *id);
    }
    root.store(store)
}

#[derive(Default)]
struct DirNode {
    files: BTreeMap<String, ObjectId>,
    dirs: BTreeMap<String, DirNode>,
}

impl DirNode {
    fn insert(&mut self, path: &str, id: ObjectId) {
        match path.split_once('/') {
            Some((dir, rest)) => self.dirs.entry(dir.to_string()).or_default().insert(rest, id),
            None => {
                self.files.insert(path.to_string(), id);
            }
        }
    }

    fn store(&self, store: &ObjectStore) -> Result<ObjectId> {
        let mut entries = Vec::with_capacity(self.files.len() + self.dirs.len());
        for (name, id) in &self.files {
            entries.push(TreeEntry {
                name: name.clone(),
                kind: TreeEntryKind::Blob,
                id: *id,
            });
        }
        for (name, node) in &self.dirs {
            entries.push(TreeEntry {
                name: name.clone(),
                kind: TreeEntryKind::Tree,
                id: node.store(store)?,
            });
        }
        store.put_tree(&Tree::new(entries))
    }
}

/// Inserts a file, dropping any entries it shadows (a directory of the same
/// name, or a file where one of its parent directories now is).
pub(crate) fn insert_file(map: &mut PathMap, path: &str, id: ObjectId) {
    remove_prefix(map, path);
    let mut parent = path;
    while let Some((dir, _)) = parent.rsplit_once('/') {
        map.remove(dir);
        parent = dir;
    }
    map.insert(path.to_string(), id);
}

/// Removes `path` and everything below it.
pub(crate) fn remove_prefix(map: &mut PathMap, path: &str) {
    map.remove(path);
    let prefix = format!("{}/", path);
    map.retain(|key, _| !key.starts_with(&prefix));
}

/// Converts a relative path to its `/`-separated key.
///
/// Returns `None` for paths that escape the root or are not valid UTF-8.
pub(crate) fn path_key(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Walks a working tree, skipping backend internals and ignored paths.
pub(crate) struct WorktreeScanner {
    root: PathBuf,
    internal_dir: &'static str,
    ignore: Gitignore,
}

impl WorktreeScanner {
    /// Loads ignore rules from the tree's top-level `.gitignore`.
    pub(crate) fn new(root: &Path, internal_dir: &'static str) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(root);
        let ignore_file = root.join(".gitignore");
        if ignore_file.is_file() {
            if let Some(err) = builder.add(&ignore_file) {
                warn!(path = %ignore_file.display(), error = %err, "Skipping unreadable ignore rules");
            }
        }
        let ignore = builder.build().unwrap_or_else(|err| {
            warn!(error = %err, "Invalid ignore rules, staging without them");
            Gitignore::empty()
        });

        Ok(Self {
            root: root.to_path_buf(),
            internal_dir,
            ignore,
        })
    }

    /// True if `key` names a path inside the backend's internal directory.
    pub(crate) fn is_internal(&self, key: &str) -> bool {
        key == self.internal_dir || key.starts_with(&format!("{}/", self.internal_dir))
    }

    /// True if `.gitignore` excludes `key` or one of its parent directories.
    pub(crate) fn is_ignored(&self, key: &str, is_dir: bool) -> bool {
        self.ignore
            .matched_path_or_any_parents(Path::new(key), is_dir)
            .is_ignore()
    }

    /// Stores every visible file under `relative` and returns their keys.
    ///
    /// Gives up with `DeadlineExceeded` once `deadline` passes.
    pub(crate) fn scan(
        &self,
        relative: &Path,
        store: &ObjectStore,
        deadline: &Deadline,
    ) -> Result<PathMap> {
        let mut files = PathMap::new();
        let start = self.root.join(relative);

        let walker = WalkDir::new(&start)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_excluded(entry));

        for entry in walker {
            deadline.check("staging")?;
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let key = self.key_for(entry.path())?;
            let data = fs::read(entry.path())?;
            files.insert(key, store.put_blob(&data)?);
        }

        Ok(files)
    }

    fn key_for(&self, path: &Path) -> Result<String> {
        path.strip_prefix(&self.root)
            .ok()
            .and_then(path_key)
            .ok_or_else(|| {
                CkptError::VersionControl(format!("unsupported path in tree: {}", path.display()))
            })
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        let Ok(relative) = entry.path().strip_prefix(&self.root) else {
            return true;
        };
        if relative.as_os_str().is_empty() {
            return false;
        }
        if relative
            .components()
            .next()
            .is_some_and(|c| c.as_os_str() == self.internal_dir)
        {
            return true;
        }
        self.ignore
            .matched_path_or_any_parents(relative, entry.file_type().is_dir())
            .is_ignore()
    }
}
