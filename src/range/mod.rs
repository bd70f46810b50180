//! Range Index Module
//!
//! Binary search trees of non-overlapping half-open metric buckets. One tree
//! indexes items by price, another by sales count.
//!
//! ## Layout
//! ```text
//!                  TreeRoot ──root──▶ [64, 128)
//!                                   ╱          ╲
//!                            [8, 16)            [256, 512)
//!                           ╱                  ╱
//!                       [0, 1)          [128, 256)
//! ```
//! - Every node lives at `sha256(namespace || start || end)` of the range it
//!   was created with (its address). Child and parent links are addresses
//! - Nodes are ordered by `start`; covered ranges never overlap
//! - A full node is split in half: it keeps its address and narrows to the
//!   lower half, and the upper half becomes a new right child
//! - Sales nodes keep a small descending cache of their best performers
//!
//! The tree is not rebalanced. Heights are maintained so imbalance can be
//! observed through [`RangeIndex::check`].

mod flavor;
mod node;

pub use flavor::{
    Metric, Price, RangeFlavor, Sales, PRICE_NODE_CAPACITY, SALES_BUCKET_WIDTH,
    SALES_NODE_CAPACITY, TOP_PERFORMERS_CAPACITY,
};
pub use node::{RangeEntry, RangeNode, RangeTreeRoot};

use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;

use tracing::{debug, info};

use crate::batch::Batch;
use crate::error::{IndexError, Result};
use crate::key::Key;
use crate::store::RecordSource;

/// Half-open interval `[start, end)` with `start < end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetricRange<M> {
    pub start: M,
    pub end: M,
}

impl<M: Metric> MetricRange<M> {
    pub fn new(start: M, end: M) -> Result<Self> {
        if start >= end {
            return Err(IndexError::InvalidRange {
                start: start.widen(),
                end: end.widen(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, metric: M) -> bool {
        self.start <= metric && metric < self.end
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Midpoint a split would cut at, if the range is wide enough to split
    pub fn split_point(&self) -> Option<M> {
        let mid = M::midpoint(self.start, self.end);
        (mid > self.start).then_some(mid)
    }
}

impl<M: fmt::Display> fmt::Display for MetricRange<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Outcome of [`RangeIndex::update_metric`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricUpdate<M> {
    /// Whether the item changed nodes
    pub moved: bool,
    /// Addresses of the source and destination nodes
    pub from: MetricRange<M>,
    pub to: MetricRange<M>,
}

/// Shape summary returned by [`RangeIndex::check`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub nodes: u32,
    pub items: u64,
    pub height: u8,
}

/// Operations over one range tree family
pub struct RangeIndex<F>(PhantomData<F>);

/// Items bucketed by price
pub type PriceIndex = RangeIndex<Price>;

/// Items bucketed by sales count
pub type SalesIndex = RangeIndex<Sales>;

type RangeOf<F> = MetricRange<<F as RangeFlavor>::Metric>;
type EntryOf<F> = RangeEntry<<F as RangeFlavor>::Metric>;

impl<F: RangeFlavor> RangeIndex<F> {
    pub fn node_key(range: &RangeOf<F>) -> Key {
        Key::derive(
            F::NODE_NAMESPACE,
            &[&range.start.le_bytes(), &range.end.le_bytes()],
        )
    }

    pub fn root_key() -> Key {
        Key::derive(F::ROOT_NAMESPACE, &[])
    }

    /// Default bucket for `metric`
    pub fn bucket(metric: F::Metric) -> Result<RangeOf<F>> {
        F::bucket(metric)
    }

    /// Tree root record; an absent record reads as an empty tree
    pub fn tree<S: RecordSource>(source: &S) -> Result<RangeTreeRoot<F>> {
        Ok(source
            .load(&Self::root_key())?
            .unwrap_or_else(RangeTreeRoot::empty))
    }

    /// Node stored at `address`
    pub fn node<S: RecordSource>(source: &S, address: &RangeOf<F>) -> Result<RangeNode<F>> {
        Self::try_node(source, address)?.ok_or(IndexError::RangeIndexNotFound {
            start: address.start.widen(),
            end: address.end.widen(),
        })
    }

    pub fn try_node<S: RecordSource>(source: &S, address: &RangeOf<F>) -> Result<Option<RangeNode<F>>> {
        source.load(&Self::node_key(address))
    }

    /// Create an empty node for `range` and link it into the tree
    pub fn initialize_node(batch: &mut Batch<'_>, range: RangeOf<F>) -> Result<RangeNode<F>> {
        if batch.contains(&Self::node_key(&range)) {
            return Err(Self::node_exists(&range));
        }

        let mut tree = Self::tree(batch)?;
        let mut node = RangeNode::new(range);

        match tree.root {
            None => tree.root = Some(range),
            Some(root) => {
                let mut parent = Self::node(batch, &root)?;
                let mut steps = 0u32;
                loop {
                    steps += 1;
                    if steps > tree.node_count {
                        return Err(Self::broken_tree(&tree));
                    }
                    let go_left = if range.end <= parent.range.start {
                        true
                    } else if range.start >= parent.range.end {
                        false
                    } else {
                        return Err(IndexError::RangeOverlap {
                            start: range.start.widen(),
                            end: range.end.widen(),
                        });
                    };
                    let child = if go_left { parent.left } else { parent.right };
                    match child {
                        Some(child) => parent = Self::node(batch, &child)?,
                        None => {
                            if go_left {
                                parent.left = Some(range);
                            } else {
                                parent.right = Some(range);
                            }
                            break;
                        }
                    }
                }
                node.parent = Some(parent.address);
                batch.save(&Self::node_key(&parent.address), &parent)?;
            }
        }

        tree.node_count += 1;
        batch.save(&Self::node_key(&range), &node)?;
        batch.save(&Self::root_key(), &tree)?;
        Self::refresh_heights(batch, node.parent, tree.node_count)?;

        info!(
            tree = F::ROOT_NAME,
            range = %range,
            nodes = tree.node_count,
            "range node initialized"
        );
        Ok(node)
    }

    /// Add `item_id` under `metric` to the node at `address`.
    ///
    /// `address` is usually the default bucket of `metric`. After that node
    /// has been split, metrics in its upper half are rejected with
    /// `MetricOutOfRange`; [`RangeIndex::locate`] finds their node.
    ///
    /// Duplicates are detected within the target node only. Keeping an item
    /// in a single node of the tree is up to the caller.
    pub fn insert(
        batch: &mut Batch<'_>,
        address: &RangeOf<F>,
        item_id: u64,
        metric: F::Metric,
    ) -> Result<()> {
        if !address.contains(metric) {
            return Err(Self::out_of_range(metric, address));
        }

        let mut node = Self::node(batch, address)?;
        if !node.range.contains(metric) {
            return Err(Self::out_of_range(metric, &node.range));
        }
        if node.position(item_id).is_some() {
            return Err(IndexError::DuplicateItemInIndex { item_id });
        }
        if node.is_full() {
            return Err(Self::node_full(&node.range));
        }

        let entry = RangeEntry { item_id, metric };
        node.entries.push(entry);
        node.offer_top(entry);
        batch.save(&Self::node_key(address), &node)?;

        debug!(tree = F::NODE_NAME, range = %node.range, item_id, %metric, "range insert");
        Ok(())
    }

    /// Take `item_id` out of the node at `address`
    pub fn remove(batch: &mut Batch<'_>, address: &RangeOf<F>, item_id: u64) -> Result<EntryOf<F>> {
        let mut node = Self::node(batch, address)?;
        let position = node
            .position(item_id)
            .ok_or(IndexError::ItemNotInIndex { item_id })?;

        let entry = node.entries.swap_remove(position);
        if node.top.iter().any(|e| e.item_id == item_id) {
            node.rebuild_top();
        }
        batch.save(&Self::node_key(address), &node)?;

        debug!(tree = F::NODE_NAME, range = %node.range, item_id, "range remove");
        Ok(entry)
    }

    /// Split a full node in half at its midpoint.
    ///
    /// The node keeps its address and place in the tree and narrows to the
    /// lower half. The upper half is stored as a new node at its own range,
    /// becomes the right child and inherits the old right subtree. Returns
    /// the addresses `(lower, upper)`.
    pub fn split(batch: &mut Batch<'_>, address: &RangeOf<F>) -> Result<(RangeOf<F>, RangeOf<F>)> {
        let mut lower = Self::node(batch, address)?;
        let covered = lower.range;
        if !lower.is_full() {
            return Err(IndexError::NodeNotFull {
                start: covered.start.widen(),
                end: covered.end.widen(),
            });
        }
        let mid = covered.split_point().ok_or(IndexError::InvalidRange {
            start: covered.start.widen(),
            end: covered.end.widen(),
        })?;

        let upper_range = MetricRange::new(mid, covered.end)?;
        if batch.contains(&Self::node_key(&upper_range)) {
            return Err(Self::node_exists(&upper_range));
        }
        let mut tree = Self::tree(batch)?;

        let (upper_entries, lower_entries): (Vec<_>, Vec<_>) =
            lower.entries.iter().copied().partition(|e| e.metric >= mid);

        let mut upper = RangeNode::<F>::new(upper_range);
        upper.entries = upper_entries;
        upper.right = lower.right;
        upper.parent = Some(*address);
        upper.height = Self::height_of(batch, lower.right)?.saturating_add(1);
        upper.rebuild_top();

        if let Some(right) = lower.right {
            let mut child = Self::node(batch, &right)?;
            child.parent = Some(upper_range);
            batch.save(&Self::node_key(&right), &child)?;
        }

        lower.range = MetricRange::new(covered.start, mid)?;
        lower.entries = lower_entries;
        lower.right = Some(upper_range);
        lower.height = Self::height_of(batch, lower.left)?.max(upper.height).saturating_add(1);
        lower.rebuild_top();

        tree.node_count += 1;
        batch.save(&Self::node_key(address), &lower)?;
        batch.save(&Self::node_key(&upper_range), &upper)?;
        batch.save(&Self::root_key(), &tree)?;
        Self::refresh_heights(batch, lower.parent, tree.node_count)?;

        info!(
            tree = F::ROOT_NAME,
            range = %covered,
            lower = %lower.range,
            upper = %upper_range,
            lower_items = lower.len(),
            upper_items = upper.len(),
            "range node split"
        );
        Ok((*address, upper_range))
    }

    /// Move an item's metric from `old` to `new`, relocating it between nodes
    /// when the new value falls outside its current node.
    ///
    /// A missing destination node is created from the default bucket.
    pub fn update_metric(
        batch: &mut Batch<'_>,
        item_id: u64,
        old: F::Metric,
        new: F::Metric,
    ) -> Result<MetricUpdate<F::Metric>> {
        let from = match Self::locate(batch, old)? {
            Some(address) => address,
            None => {
                let bucket = F::bucket(old)?;
                return Err(IndexError::RangeIndexNotFound {
                    start: bucket.start.widen(),
                    end: bucket.end.widen(),
                });
            }
        };

        let mut node = Self::node(batch, &from)?;
        let position = node
            .position(item_id)
            .ok_or(IndexError::ItemNotInIndex { item_id })?;

        if node.range.contains(new) {
            node.entries[position].metric = new;
            node.rebuild_top();
            batch.save(&Self::node_key(&from), &node)?;
            debug!(tree = F::NODE_NAME, item_id, %old, %new, range = %node.range, "metric updated in place");
            return Ok(MetricUpdate {
                moved: false,
                from,
                to: from,
            });
        }

        let to = match Self::locate(batch, new)? {
            Some(address) => address,
            None => {
                let bucket = F::bucket(new)?;
                Self::initialize_node(batch, bucket)?;
                bucket
            }
        };
        let target = Self::node(batch, &to)?;
        if target.is_full() {
            return Err(Self::node_full(&target.range));
        }

        Self::remove(batch, &from, item_id)?;
        Self::insert(batch, &to, item_id, new)?;

        debug!(tree = F::NODE_NAME, item_id, %old, %new, from = %from, to = %to, "metric moved");
        Ok(MetricUpdate {
            moved: true,
            from,
            to,
        })
    }

    /// Address of the node covering `metric`, if any
    pub fn locate<S: RecordSource>(source: &S, metric: F::Metric) -> Result<Option<RangeOf<F>>> {
        let tree = Self::tree(source)?;
        let mut cursor = tree.root;
        let mut steps = 0u32;

        while let Some(address) = cursor {
            steps += 1;
            if steps > tree.node_count {
                return Err(Self::broken_tree(&tree));
            }
            let node = Self::node(source, &address)?;
            if node.range.contains(metric) {
                return Ok(Some(address));
            }
            cursor = if metric < node.range.start { node.left } else { node.right };
        }
        Ok(None)
    }

    /// Item ids with `min <= metric <= max`, ascending by metric, paged
    pub fn query<S: RecordSource>(
        source: &S,
        min: F::Metric,
        max: F::Metric,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<u64>> {
        if min > max {
            return Err(IndexError::InvalidRange {
                start: min.widen(),
                end: max.widen(),
            });
        }

        let tree = Self::tree(source)?;
        let mut out = Vec::new();
        let mut skipped = 0usize;
        let mut visited = 0u32;
        let mut stack: Vec<RangeNode<F>> = Vec::new();
        let mut cursor = tree.root;

        while out.len() < limit {
            while let Some(address) = cursor {
                visited += 1;
                if visited > tree.node_count {
                    return Err(Self::broken_tree(&tree));
                }
                let node = Self::node(source, &address)?;
                cursor = if min < node.range.start { node.left } else { None };
                stack.push(node);
            }

            let Some(node) = stack.pop() else { break };
            if node.range.start <= max && min < node.range.end {
                let mut hits: Vec<_> = node
                    .entries
                    .iter()
                    .filter(|e| min <= e.metric && e.metric <= max)
                    .collect();
                hits.sort_by(|a, b| a.metric.cmp(&b.metric).then(a.item_id.cmp(&b.item_id)));
                for entry in hits {
                    if skipped < offset {
                        skipped += 1;
                        continue;
                    }
                    if out.len() >= limit {
                        break;
                    }
                    out.push(entry.item_id);
                }
            }
            cursor = if max >= node.range.end { node.right } else { None };
        }
        Ok(out)
    }

    /// Up to `limit` entries with the highest metrics, descending.
    ///
    /// Walks nodes from the highest range down and serves each node from
    /// its top cache when the cache alone can answer.
    pub fn top<S: RecordSource>(source: &S, limit: usize) -> Result<Vec<EntryOf<F>>> {
        let tree = Self::tree(source)?;
        let mut out = Vec::with_capacity(limit.min(F::NODE_CAPACITY));
        let mut visited = 0u32;
        let mut stack: Vec<RangeNode<F>> = Vec::new();
        let mut cursor = tree.root;

        while out.len() < limit {
            while let Some(address) = cursor {
                visited += 1;
                if visited > tree.node_count {
                    return Err(Self::broken_tree(&tree));
                }
                let node = Self::node(source, &address)?;
                cursor = node.right;
                stack.push(node);
            }

            let Some(node) = stack.pop() else { break };
            let wanted = limit - out.len();
            let cached = F::TOP_CAPACITY > 0
                && (node.top.len() >= wanted || node.top.len() == node.entries.len());
            let ranked = if cached {
                node.top.clone()
            } else {
                RangeNode::<F>::descending(&node.entries)
            };
            out.extend(ranked.into_iter().take(wanted));
            cursor = node.left;
        }
        Ok(out)
    }

    /// Walk the whole tree and verify its structural invariants
    pub fn check<S: RecordSource>(source: &S) -> Result<TreeStats> {
        let tree = Self::tree(source)?;
        let mut stats = TreeStats::default();
        let mut seen = HashSet::new();

        if let Some(root) = tree.root {
            stats.height = Self::check_subtree(source, root, None, None, None, &mut seen, &mut stats)?;
        }
        if stats.nodes != tree.node_count {
            return Err(IndexError::CorruptRecord(format!(
                "{}: {} nodes reachable, root records {}",
                F::ROOT_NAME,
                stats.nodes,
                tree.node_count
            )));
        }
        Ok(stats)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn height_of<S: RecordSource>(source: &S, address: Option<RangeOf<F>>) -> Result<u8> {
        match address {
            Some(address) => Ok(Self::node(source, &address)?.height),
            None => Ok(0),
        }
    }

    /// Recompute heights from `start` up to the root, stopping early once a
    /// height is unchanged
    fn refresh_heights(batch: &mut Batch<'_>, start: Option<RangeOf<F>>, limit: u32) -> Result<()> {
        let mut cursor = start;
        let mut steps = 0u32;

        while let Some(address) = cursor {
            steps += 1;
            if steps > limit {
                return Err(IndexError::CorruptRecord(format!(
                    "{}: parent chain longer than {} nodes",
                    F::NODE_NAME,
                    limit
                )));
            }
            let mut node = Self::node(batch, &address)?;
            let height = Self::height_of(batch, node.left)?
                .max(Self::height_of(batch, node.right)?)
                .saturating_add(1);
            if height == node.height {
                break;
            }
            node.height = height;
            batch.save(&Self::node_key(&address), &node)?;
            cursor = node.parent;
        }
        Ok(())
    }

    /// Returns the subtree height
    fn check_subtree<S: RecordSource>(
        source: &S,
        address: RangeOf<F>,
        parent: Option<RangeOf<F>>,
        lower_bound: Option<F::Metric>,
        upper_bound: Option<F::Metric>,
        seen: &mut HashSet<RangeOf<F>>,
        stats: &mut TreeStats,
    ) -> Result<u8> {
        let corrupt = |what: String| IndexError::CorruptRecord(format!("{} {}: {}", F::NODE_NAME, address, what));

        if !seen.insert(address) {
            return Err(corrupt("reachable twice".to_string()));
        }
        let node = Self::node(source, &address)?;
        let range = node.range;

        if node.address != address {
            return Err(corrupt(format!("stored under key of {}", node.address)));
        }
        if range.start != address.start || range.end > address.end {
            return Err(corrupt(format!("covers {} outside its address", range)));
        }
        if node.parent != parent {
            return Err(corrupt(format!("parent link {:?}, expected {:?}", node.parent, parent)));
        }
        if lower_bound.is_some_and(|bound| range.start < bound)
            || upper_bound.is_some_and(|bound| range.end > bound)
        {
            return Err(corrupt("out of order with its ancestors".to_string()));
        }
        if node.entries.len() > F::NODE_CAPACITY {
            return Err(corrupt(format!("{} entries over capacity", node.entries.len())));
        }
        if let Some(entry) = node.entries.iter().find(|e| !range.contains(e.metric)) {
            return Err(corrupt(format!("item {} has metric {}", entry.item_id, entry.metric)));
        }

        stats.nodes += 1;
        stats.items += node.entries.len() as u64;

        let left = match node.left {
            Some(child) => Self::check_subtree(
                source,
                child,
                Some(address),
                lower_bound,
                Some(range.start),
                seen,
                stats,
            )?,
            None => 0,
        };
        let right = match node.right {
            Some(child) => Self::check_subtree(
                source,
                child,
                Some(address),
                Some(range.end),
                upper_bound,
                seen,
                stats,
            )?,
            None => 0,
        };

        let height = left.max(right).saturating_add(1);
        if node.height != height {
            return Err(corrupt(format!("height {}, expected {}", node.height, height)));
        }
        Ok(height)
    }

    fn out_of_range(metric: F::Metric, range: &RangeOf<F>) -> IndexError {
        IndexError::MetricOutOfRange {
            metric: metric.widen(),
            start: range.start.widen(),
            end: range.end.widen(),
        }
    }

    fn node_exists(range: &RangeOf<F>) -> IndexError {
        IndexError::NodeAlreadyExists {
            start: range.start.widen(),
            end: range.end.widen(),
        }
    }

    fn node_full(range: &RangeOf<F>) -> IndexError {
        IndexError::RangeNodeFull {
            start: range.start.widen(),
            end: range.end.widen(),
        }
    }

    fn broken_tree(tree: &RangeTreeRoot<F>) -> IndexError {
        IndexError::CorruptRecord(format!(
            "{}: walk exceeded {} nodes",
            F::ROOT_NAME,
            tree.node_count
        ))
    }
}
