//! Ordered B-tree index for quillsql
//!
//! Maps column values to sets of row-ids with O(log n) point and range
//! operations and in-order traversal. Indexes live only in memory and are
//! rebuilt from row data when a catalog is opened. NULL keys are never
//! stored; a NULL column value is invisible to index scans.

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::storage::value::Value;

const ORDER: usize = 4;

/// A key in the index (wraps Value to give it a total order).
///
/// Within one index every key has the column's declared type and is never
/// NULL, so the comparison fallback is unreachable in practice.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexKey(pub Value);

impl IndexKey {
    fn compare(&self, other: &IndexKey) -> Ordering {
        match self.0.try_compare(&other.0) {
            Ok(Some(ord)) => ord,
            _ => Ordering::Equal,
        }
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl Eq for IndexKey {}

/// B-tree node
#[derive(Debug, Clone)]
enum Node {
    Internal {
        keys: Vec<IndexKey>,
        children: Vec<Box<Node>>,
    },
    Leaf {
        keys: Vec<IndexKey>,
        /// Row-id set per key; non-unique indexes may hold several ids.
        postings: Vec<Vec<u64>>,
    },
}

/// Ordered index over one column
#[derive(Debug, Clone)]
pub struct BTreeIndex {
    /// Index name
    pub name: String,
    /// Indexed column (for error reporting)
    pub column: String,
    /// Reject duplicate keys?
    pub unique: bool,
    root: Option<Box<Node>>,
    /// Number of (key, row-id) entries
    entries: usize,
}

impl BTreeIndex {
    /// Create a new empty index
    pub fn new(name: impl Into<String>, column: impl Into<String>, unique: bool) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            unique,
            root: None,
            entries: 0,
        }
    }

    /// Insert a (key, row-id) entry.
    ///
    /// For a unique index an already-present key fails with
    /// `UniqueViolation`. NULL keys are the caller's responsibility to skip.
    pub fn insert(&mut self, key: Value, row_id: u64) -> Result<()> {
        if key.is_null() {
            return Err(Error::Internal(format!(
                "NULL key inserted into index '{}'",
                self.name
            )));
        }
        let key = IndexKey(key);

        let Some(mut root) = self.root.take() else {
            self.root = Some(Box::new(Node::Leaf {
                keys: vec![key],
                postings: vec![vec![row_id]],
            }));
            self.entries += 1;
            return Ok(());
        };

        match self.insert_recursive(&mut root, key, row_id) {
            Ok((split, added)) => {
                if let Some((new_node, mid_key)) = split {
                    // Root split, create new root
                    self.root = Some(Box::new(Node::Internal {
                        keys: vec![mid_key],
                        children: vec![root, new_node],
                    }));
                } else {
                    self.root = Some(root);
                }
                if added {
                    self.entries += 1;
                }
                Ok(())
            }
            Err(e) => {
                self.root = Some(root);
                Err(e)
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn insert_recursive(
        &self,
        node: &mut Node,
        key: IndexKey,
        row_id: u64,
    ) -> Result<(Option<(Box<Node>, IndexKey)>, bool)> {
        match node {
            Node::Leaf { keys, postings } => {
                match keys.binary_search(&key) {
                    Ok(pos) => {
                        if self.unique {
                            return Err(Error::UniqueViolation(self.column.clone()));
                        }
                        if postings[pos].contains(&row_id) {
                            return Ok((None, false));
                        }
                        postings[pos].push(row_id);
                        return Ok((None, true));
                    }
                    Err(pos) => {
                        keys.insert(pos, key);
                        postings.insert(pos, vec![row_id]);
                    }
                }

                if keys.len() > ORDER {
                    let mid = keys.len() / 2;
                    let new_keys = keys.split_off(mid);
                    let new_postings = postings.split_off(mid);
                    let mid_key = new_keys[0].clone();

                    return Ok((
                        Some((
                            Box::new(Node::Leaf {
                                keys: new_keys,
                                postings: new_postings,
                            }),
                            mid_key,
                        )),
                        true,
                    ));
                }
                Ok((None, true))
            }
            Node::Internal { keys, children } => {
                let pos = match keys.binary_search(&key) {
                    Ok(p) => p + 1,
                    Err(p) => p,
                };
                let (split, added) = self.insert_recursive(&mut children[pos], key, row_id)?;
                if let Some((new_node, mid_key)) = split {
                    keys.insert(pos, mid_key);
                    children.insert(pos + 1, new_node);

                    if keys.len() > ORDER {
                        let mid = keys.len() / 2;
                        let mid_key = keys[mid].clone();
                        let new_keys = keys.split_off(mid + 1);
                        keys.pop();
                        let new_children = children.split_off(mid + 1);

                        return Ok((
                            Some((
                                Box::new(Node::Internal {
                                    keys: new_keys,
                                    children: new_children,
                                }),
                                mid_key,
                            )),
                            added,
                        ));
                    }
                }
                Ok((None, added))
            }
        }
    }

    /// Remove one (key, row-id) entry. Removing an absent entry is a no-op.
    pub fn remove(&mut self, key: &Value, row_id: u64) {
        let key = IndexKey(key.clone());
        let mut removed = false;
        if let Some(root) = self.root.as_mut() {
            Self::remove_recursive(root, &key, row_id, &mut removed);
        }
        if removed {
            self.entries -= 1;
        }
    }

    fn remove_recursive(node: &mut Node, key: &IndexKey, row_id: u64, removed: &mut bool) {
        match node {
            Node::Leaf { keys, postings } => {
                if let Ok(pos) = keys.binary_search(key) {
                    if let Some(idx) = postings[pos].iter().position(|&id| id == row_id) {
                        postings[pos].remove(idx);
                        *removed = true;
                        if postings[pos].is_empty() {
                            keys.remove(pos);
                            postings.remove(pos);
                        }
                    }
                }
            }
            Node::Internal { keys, children } => {
                let pos = match keys.binary_search(key) {
                    Ok(p) => p + 1,
                    Err(p) => p,
                };
                Self::remove_recursive(&mut children[pos], key, row_id, removed);
            }
        }
    }

    /// All row-ids stored under a key. NULL keys match nothing.
    pub fn point_lookup(&self, key: &Value) -> Vec<u64> {
        if key.is_null() {
            return Vec::new();
        }
        let key = IndexKey(key.clone());
        let mut curr = match self.root.as_ref() {
            Some(root) => root,
            None => return Vec::new(),
        };
        loop {
            match curr.as_ref() {
                Node::Leaf { keys, postings } => {
                    return match keys.binary_search(&key) {
                        Ok(pos) => postings[pos].clone(),
                        Err(_) => Vec::new(),
                    };
                }
                Node::Internal { keys, children } => {
                    let pos = match keys.binary_search(&key) {
                        Ok(p) => p + 1,
                        Err(p) => p,
                    };
                    curr = &children[pos];
                }
            }
        }
    }

    /// Row-ids for keys within `[lo, hi]`, in key order. Either bound may be
    /// absent; inclusivity is per bound.
    pub fn range_lookup(
        &self,
        lo: Option<&Value>,
        hi: Option<&Value>,
        lo_inclusive: bool,
        hi_inclusive: bool,
    ) -> Vec<u64> {
        let lo = lo.map(|v| IndexKey(v.clone()));
        let hi = hi.map(|v| IndexKey(v.clone()));
        let mut out = Vec::new();
        if let Some(root) = self.root.as_ref() {
            Self::collect_range(
                root,
                lo.as_ref(),
                hi.as_ref(),
                lo_inclusive,
                hi_inclusive,
                &mut out,
            );
        }
        out
    }

    fn collect_range(
        node: &Node,
        lo: Option<&IndexKey>,
        hi: Option<&IndexKey>,
        lo_inclusive: bool,
        hi_inclusive: bool,
        out: &mut Vec<u64>,
    ) {
        match node {
            Node::Leaf { keys, postings } => {
                for (key, ids) in keys.iter().zip(postings) {
                    let above_lo = match lo {
                        None => true,
                        Some(lo) => match key.cmp(lo) {
                            Ordering::Greater => true,
                            Ordering::Equal => lo_inclusive,
                            Ordering::Less => false,
                        },
                    };
                    let below_hi = match hi {
                        None => true,
                        Some(hi) => match key.cmp(hi) {
                            Ordering::Less => true,
                            Ordering::Equal => hi_inclusive,
                            Ordering::Greater => false,
                        },
                    };
                    if above_lo && below_hi {
                        out.extend_from_slice(ids);
                    }
                }
            }
            Node::Internal { keys, children } => {
                for (i, child) in children.iter().enumerate() {
                    // Child i spans (keys[i-1], keys[i]]; prune with strict
                    // comparisons so boundary duplicates are never skipped.
                    let lower_sep = if i == 0 { None } else { Some(&keys[i - 1]) };
                    let upper_sep = keys.get(i);
                    if let (Some(lo), Some(upper)) = (lo, upper_sep) {
                        if upper < lo {
                            continue;
                        }
                    }
                    if let (Some(hi), Some(lower)) = (hi, lower_sep) {
                        if lower > hi {
                            continue;
                        }
                    }
                    Self::collect_range(child, lo, hi, lo_inclusive, hi_inclusive, out);
                }
            }
        }
    }

    /// All (key, row-id) entries in key order
    pub fn iter_all(&self) -> Vec<(Value, u64)> {
        let mut out = Vec::new();
        if let Some(root) = self.root.as_ref() {
            Self::collect_all(root, &mut out);
        }
        out
    }

    fn collect_all(node: &Node, out: &mut Vec<(Value, u64)>) {
        match node {
            Node::Leaf { keys, postings } => {
                for (key, ids) in keys.iter().zip(postings) {
                    for id in ids {
                        out.push((key.0.clone(), *id));
                    }
                }
            }
            Node::Internal { children, .. } => {
                for child in children {
                    Self::collect_all(child, out);
                }
            }
        }
    }

    /// Number of (key, row-id) entries in the index
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }
}
