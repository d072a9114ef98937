//! Property graph persisted in sled trees.
//!
//! Layout:
//!
//! - `graph:nodes`: node id -> JSON [`NodeRecord`]
//! - `graph:index:label`: label tag + node id -> ()
//! - `graph:index:property`: label tag + key property + value + node id -> ()
//! - `graph:edges:out`: from + rel tag + to -> ()
//! - `graph:edges:in`: to + rel tag + from -> ()
//!
//! Node ids come from [`sled::Db::generate_id`] and are written big-endian,
//! so every scan yields ids in creation order.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sled::{Batch, Db, IVec, Tree};
use thiserror::Error;

use super::query::{Direction, Label, MatchQuery, NodePattern, Rel, Return};
use crate::kv;

const NODES_TREE: &str = "graph:nodes";
const LABEL_INDEX_TREE: &str = "graph:index:label";
const PROPERTY_INDEX_TREE: &str = "graph:index:property";
const OUT_EDGES_TREE: &str = "graph:edges:out";
const IN_EDGES_TREE: &str = "graph:edges:in";

/// Node properties.
pub type Props = BTreeMap<String, Value>;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("node codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("malformed key in {0}")]
    MalformedKey(&'static str),
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// A stored node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub label: Label,
    pub props: Props,
}

impl NodeRecord {
    pub fn prop_str(&self, name: &str) -> Option<&str> {
        self.props.get(name).and_then(Value::as_str)
    }

    fn key_value(&self) -> Option<(&'static str, &str)> {
        let property = self.label.key_property()?;
        Some((property, self.prop_str(property)?))
    }
}

/// Result of executing a [`MatchQuery`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    Scalar(u64),
    Rows(Vec<Vec<Value>>),
}

impl QueryOutput {
    /// The scalar, or the number of rows.
    pub fn scalar(&self) -> u64 {
        match self {
            Self::Scalar(n) => *n,
            Self::Rows(rows) => rows.len() as u64,
        }
    }

    pub fn into_rows(self) -> Vec<Vec<Value>> {
        match self {
            Self::Scalar(n) => vec![vec![Value::from(n)]],
            Self::Rows(rows) => rows,
        }
    }
}

/// Totals of a batched clear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearStats {
    pub edges: usize,
    pub nodes: usize,
    pub batches: usize,
}

/// The graph store.
pub struct GraphStore {
    db: Db,
    nodes: Tree,
    labels: Tree,
    properties: Tree,
    out_edges: Tree,
    in_edges: Tree,
}

fn label_key(label: Label, id: u64) -> [u8; 9] {
    let mut key = [0u8; 9];
    key[0] = label.tag();
    key[1..].copy_from_slice(&id.to_be_bytes());
    key
}

fn property_prefix(label: Label, property: &str, value: &str) -> Vec<u8> {
    kv::key(&[&[label.tag()], property.as_bytes(), value.as_bytes()])
}

fn property_key(label: Label, property: &str, value: &str, id: u64) -> Vec<u8> {
    let mut key = property_prefix(label, property, value);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn edge_prefix(node: u64, rel_tag: u8) -> [u8; 9] {
    let mut key = [0u8; 9];
    key[..8].copy_from_slice(&node.to_be_bytes());
    key[8] = rel_tag;
    key
}

fn edge_key(from: u64, rel_tag: u8, to: u64) -> [u8; 17] {
    let mut key = [0u8; 17];
    key[..9].copy_from_slice(&edge_prefix(from, rel_tag));
    key[9..].copy_from_slice(&to.to_be_bytes());
    key
}

fn split_edge(key: &[u8]) -> GraphResult<(u64, u8, u64)> {
    if key.len() != 17 {
        return Err(GraphError::MalformedKey(OUT_EDGES_TREE));
    }
    let from = kv::trailing_u64(&key[..8]).ok_or(GraphError::MalformedKey(OUT_EDGES_TREE))?;
    let to = kv::trailing_u64(key).ok_or(GraphError::MalformedKey(OUT_EDGES_TREE))?;
    Ok((from, key[8], to))
}

fn node_id(key: &[u8]) -> GraphResult<u64> {
    kv::trailing_u64(key).ok_or(GraphError::MalformedKey(NODES_TREE))
}

impl GraphStore {
    /// Open the graph trees inside `db`.
    pub fn open(db: &Db) -> GraphResult<Self> {
        Ok(Self {
            db: db.clone(),
            nodes: db.open_tree(NODES_TREE)?,
            labels: db.open_tree(LABEL_INDEX_TREE)?,
            properties: db.open_tree(PROPERTY_INDEX_TREE)?,
            out_edges: db.open_tree(OUT_EDGES_TREE)?,
            in_edges: db.open_tree(IN_EDGES_TREE)?,
        })
    }

    /// Create a node and index it.
    pub fn create_node(&self, label: Label, props: Props) -> GraphResult<u64> {
        let id = self.db.generate_id()?;
        let record = NodeRecord { label, props };
        self.nodes
            .insert(id.to_be_bytes(), serde_json::to_vec(&record)?)?;
        self.labels.insert(label_key(label, id), &[])?;
        if let Some((property, value)) = record.key_value() {
            self.properties
                .insert(property_key(label, property, value, id), &[])?;
        }
        Ok(id)
    }

    /// Return the node with `label` whose key property equals `value`,
    /// creating it when absent.
    pub fn merge_node(&self, label: Label, value: &str) -> GraphResult<u64> {
        if let Some(id) = self.find_nodes(label, value)?.first() {
            return Ok(*id);
        }
        let property = label.key_property().unwrap_or("value");
        let props = Props::from([(property.to_string(), Value::from(value))]);
        self.create_node(label, props)
    }

    /// Nodes with `label` whose key property equals `value`.
    pub fn find_nodes(&self, label: Label, value: &str) -> GraphResult<Vec<u64>> {
        let Some(property) = label.key_property() else {
            return Ok(Vec::new());
        };
        let prefix = property_prefix(label, property, value);
        let mut ids = Vec::new();
        for key in self.properties.scan_prefix(&prefix).keys() {
            let key = key?;
            // Values containing the separator byte share the prefix.
            if key.len() == prefix.len() + 8 {
                ids.push(node_id(&key)?);
            }
        }
        Ok(ids)
    }

    pub fn node(&self, id: u64) -> GraphResult<Option<NodeRecord>> {
        match self.nodes.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn create_edge(&self, from: u64, rel: Rel, to: u64) -> GraphResult<()> {
        self.out_edges.insert(edge_key(from, rel.tag(), to), &[])?;
        self.in_edges.insert(edge_key(to, rel.tag(), from), &[])?;
        Ok(())
    }

    /// Nodes one `rel` hop away from `id`.
    pub fn neighbors(&self, id: u64, rel: Rel, direction: Direction) -> GraphResult<Vec<u64>> {
        let tree = match direction {
            Direction::Outgoing => &self.out_edges,
            Direction::Incoming => &self.in_edges,
        };
        tree.scan_prefix(edge_prefix(id, rel.tag()))
            .keys()
            .map(|key| node_id(&key?))
            .collect()
    }

    pub fn nodes_with_label(&self, label: Label) -> GraphResult<Vec<u64>> {
        self.labels
            .scan_prefix([label.tag()])
            .keys()
            .map(|key| node_id(&key?))
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.out_edges.len()
    }

    /// Execute a pattern query.
    pub fn execute(&self, query: &MatchQuery) -> GraphResult<QueryOutput> {
        tracing::trace!(cypher = %query.to_cypher(), params = ?query.params(), "match");

        let mut paths: Vec<Vec<u64>> = self
            .match_start(&query.start)?
            .into_iter()
            .map(|id| vec![id])
            .collect();

        for hop in &query.hops {
            let mut extended = Vec::with_capacity(paths.len());
            for path in &paths {
                let Some(&last) = path.last() else { continue };
                for next in self.neighbors(last, hop.rel, hop.direction)? {
                    if self.matches(next, &hop.node)? {
                        let mut longer = path.clone();
                        longer.push(next);
                        extended.push(longer);
                    }
                }
            }
            paths = extended;
        }

        match &query.ret {
            Return::Count => Ok(QueryOutput::Scalar(paths.len() as u64)),
            Return::CountDistinct(position) => {
                let distinct: HashSet<u64> =
                    paths.iter().filter_map(|p| p.get(*position).copied()).collect();
                Ok(QueryOutput::Scalar(distinct.len() as u64))
            }
            Return::Columns(columns) => {
                paths.sort_by_key(|p| p.first().copied());
                let mut cache = HashMap::new();
                let mut rows = Vec::with_capacity(paths.len());
                for path in &paths {
                    let mut row = Vec::with_capacity(columns.len());
                    for (position, property) in columns {
                        row.push(self.property_at(&mut cache, path, *position, property)?);
                    }
                    rows.push(row);
                }
                Ok(QueryOutput::Rows(rows))
            }
            Return::GroupBy { key, distinct } => {
                let mut cache = HashMap::new();
                let mut groups: BTreeMap<String, (u64, HashSet<u64>)> = BTreeMap::new();
                for path in &paths {
                    let group = match self.property_at(&mut cache, path, key.0, key.1)? {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    let entry = groups.entry(group).or_default();
                    entry.0 += 1;
                    if let Some(node) = path.get(*distinct) {
                        entry.1.insert(*node);
                    }
                }
                let rows = groups
                    .into_iter()
                    .map(|(group, (count, nodes))| {
                        vec![
                            Value::from(group),
                            Value::from(count),
                            Value::from(nodes.len() as u64),
                        ]
                    })
                    .collect();
                Ok(QueryOutput::Rows(rows))
            }
        }
    }

    fn match_start(&self, pattern: &NodePattern) -> GraphResult<Vec<u64>> {
        match &pattern.property {
            Some(p) if pattern.label.key_property() == Some(p.property) => {
                self.find_nodes(pattern.label, &p.value)
            }
            Some(_) => {
                let mut ids = Vec::new();
                for id in self.nodes_with_label(pattern.label)? {
                    if self.matches(id, pattern)? {
                        ids.push(id);
                    }
                }
                Ok(ids)
            }
            None => self.nodes_with_label(pattern.label),
        }
    }

    fn matches(&self, id: u64, pattern: &NodePattern) -> GraphResult<bool> {
        if !self.labels.contains_key(label_key(pattern.label, id))? {
            return Ok(false);
        }
        let Some(p) = &pattern.property else {
            return Ok(true);
        };
        if pattern.label.key_property() == Some(p.property) {
            let key = property_key(pattern.label, p.property, &p.value, id);
            return Ok(self.properties.contains_key(key)?);
        }
        Ok(self
            .node(id)?
            .is_some_and(|node| node.prop_str(p.property) == Some(p.value.as_str())))
    }

    fn property_at(
        &self,
        cache: &mut HashMap<u64, NodeRecord>,
        path: &[u64],
        position: usize,
        property: &str,
    ) -> GraphResult<Value> {
        let Some(&id) = path.get(position) else {
            return Ok(Value::Null);
        };
        if !cache.contains_key(&id) {
            if let Some(record) = self.node(id)? {
                cache.insert(id, record);
            }
        }
        Ok(cache
            .get(&id)
            .and_then(|record| record.props.get(property))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Delete up to `limit` edges. Returns the number deleted.
    pub fn delete_edges(&self, limit: usize) -> GraphResult<usize> {
        let keys: Vec<IVec> = self
            .out_edges
            .iter()
            .keys()
            .take(limit)
            .collect::<Result<_, _>>()?;

        let mut out_batch = Batch::default();
        let mut in_batch = Batch::default();
        for key in &keys {
            let (from, rel_tag, to) = split_edge(key)?;
            out_batch.remove(key.clone());
            in_batch.remove(&edge_key(to, rel_tag, from)[..]);
        }
        self.out_edges.apply_batch(out_batch)?;
        self.in_edges.apply_batch(in_batch)?;
        Ok(keys.len())
    }

    /// Delete up to `limit` nodes with their index entries. Edges must be
    /// gone already. Returns the number deleted.
    pub fn delete_nodes(&self, limit: usize) -> GraphResult<usize> {
        let mut node_batch = Batch::default();
        let mut label_batch = Batch::default();
        let mut property_batch = Batch::default();
        let mut deleted = 0;

        for entry in self.nodes.iter().take(limit) {
            let (key, bytes) = entry?;
            let id = node_id(&key)?;
            let record: NodeRecord = serde_json::from_slice(&bytes)?;
            node_batch.remove(key);
            label_batch.remove(&label_key(record.label, id)[..]);
            if let Some((property, value)) = record.key_value() {
                property_batch.remove(property_key(record.label, property, value, id));
            }
            deleted += 1;
        }

        self.nodes.apply_batch(node_batch)?;
        self.labels.apply_batch(label_batch)?;
        self.properties.apply_batch(property_batch)?;
        Ok(deleted)
    }

    /// Detach-delete everything in chunks of at most `batch_size`: edges
    /// until a batch deletes none, then nodes the same way.
    pub fn clear_in_batches(&self, batch_size: usize) -> GraphResult<ClearStats> {
        let batch_size = batch_size.max(1);
        let mut stats = ClearStats::default();
        loop {
            let deleted = self.delete_edges(batch_size)?;
            stats.batches += 1;
            if deleted == 0 {
                break;
            }
            stats.edges += deleted;
        }
        loop {
            let deleted = self.delete_nodes(batch_size)?;
            stats.batches += 1;
            if deleted == 0 {
                break;
            }
            stats.nodes += deleted;
        }
        Ok(stats)
    }
}
