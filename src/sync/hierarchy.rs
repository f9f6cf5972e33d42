use std::collections::{BTreeMap, HashMap};

use crate::drive_api::types::DriveItem;
use crate::error::SyncError;

/// Synthetic id for the drive root. The root never appears in the
/// listing; it exists only as the anchor every parent chain ends at.
pub const ROOT_ID: &str = "root";

/// The hierarchical facts about one folder: who it is and who holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderMeta {
    pub id: String,
    pub name: String,
    /// `None` only for the synthetic root
    pub parent_id: Option<String>,
}

impl FolderMeta {
    /// Reduce a listed folder to its hierarchical link.
    ///
    /// Only the first parent reference is honored, a deliberate,
    /// documented simplification for items the API reports with several
    /// parents. An item with no parents at all hangs off the root.
    pub fn from_item(item: &DriveItem) -> Self {
        let parent_id = match item.parents.first() {
            Some(parent) if !parent.is_root => parent.id.clone(),
            _ => ROOT_ID.to_string(),
        };
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            parent_id: Some(parent_id),
        }
    }
}

/// Flat lookup table: folder id → metadata, including the synthetic root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderTable {
    entries: HashMap<String, FolderMeta>,
}

impl FolderTable {
    pub fn get(&self, id: &str) -> Option<&FolderMeta> {
        self.entries.get(id)
    }

    /// All folder ids, root included. Enumeration order is
    /// implementation-defined; only the set is stable.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Nested folder structure rooted at [`ROOT_ID`]: each node maps child
/// folder ids to their subtrees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderTree {
    children: BTreeMap<String, FolderTree>,
}

impl FolderTree {
    pub fn children(&self) -> impl Iterator<Item = (&str, &FolderTree)> {
        self.children.iter().map(|(id, node)| (id.as_str(), node))
    }

    /// Total number of folders in the tree (the root node itself not
    /// counted).
    pub fn node_count(&self) -> usize {
        self.children
            .values()
            .map(|c| 1 + c.node_count())
            .sum()
    }

    /// Flatten back into (id, parent_id) pairs. Direct children of the
    /// root report [`ROOT_ID`] as their parent.
    pub fn flatten(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        self.collect_pairs(ROOT_ID, &mut pairs);
        pairs.sort();
        pairs
    }

    fn collect_pairs(&self, parent: &str, out: &mut Vec<(String, String)>) {
        for (id, node) in &self.children {
            out.push((id.clone(), parent.to_string()));
            node.collect_pairs(id, out);
        }
    }
}

/// Build the folder table and tree from one full drain of the folder
/// listing.
///
/// The first pass is order-independent: records may arrive in any order
/// because only direct parent links are stored. The second pass walks
/// every folder's chain up to the root and inserts it into the tree,
/// reusing subtrees already created for siblings.
pub fn build_hierarchy(folders: Vec<FolderMeta>) -> Result<(FolderTable, FolderTree), SyncError> {
    let mut entries = HashMap::with_capacity(folders.len() + 1);
    entries.insert(
        ROOT_ID.to_string(),
        FolderMeta {
            id: ROOT_ID.to_string(),
            name: ROOT_ID.to_string(),
            parent_id: None,
        },
    );
    for folder in folders {
        entries.insert(folder.id.clone(), folder);
    }
    let table = FolderTable { entries };

    let mut tree = FolderTree::default();
    let ids: Vec<String> = table
        .ids()
        .filter(|id| *id != ROOT_ID)
        .map(String::from)
        .collect();
    for id in &ids {
        let chain = ancestor_chain(id, &table)?;
        let mut node = &mut tree;
        for link in &chain {
            // entry() makes insertion idempotent per id
            node = node.children.entry(link.clone()).or_default();
        }
    }

    // Every table entry must appear in the tree exactly once
    if tree.node_count() != table.len() - 1 {
        return Err(SyncError::Integrity(format!(
            "tree holds {} folders but the table lists {}",
            tree.node_count(),
            table.len() - 1
        )));
    }

    Ok((table, tree))
}

/// The ids from the topmost ancestor (a direct child of root) down to
/// `id` itself. The root resolves to an empty chain.
///
/// The walk is bounded by the table size: a chain that has not reached
/// the root within that many hops can only be a cycle, which is a fatal
/// data-integrity error rather than an infinite loop.
pub fn ancestor_chain(id: &str, table: &FolderTable) -> Result<Vec<String>, SyncError> {
    if id == ROOT_ID {
        return Ok(Vec::new());
    }

    let max_hops = table.len();
    let mut chain = Vec::new();
    let mut current = id.to_string();
    for _ in 0..max_hops {
        let meta = table.get(&current).ok_or_else(|| {
            SyncError::Integrity(format!(
                "folder {current} is referenced but missing from the listing"
            ))
        })?;
        chain.push(current.clone());
        match meta.parent_id.as_deref() {
            None | Some(ROOT_ID) => {
                chain.reverse();
                return Ok(chain);
            }
            Some(parent) => current = parent.to_string(),
        }
    }

    Err(SyncError::Integrity(format!(
        "parent chain of folder {id} never reaches the root (cycle in listing)"
    )))
}
