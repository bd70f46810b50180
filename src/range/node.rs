//! Range node and tree root records

use std::marker::PhantomData;

use crate::error::Result;
use crate::record::{Record, RecordReader, RecordWriter};

use super::flavor::{Metric, RangeFlavor};
use super::MetricRange;

/// An indexed item and the metric it was indexed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeEntry<M> {
    pub item_id: u64,
    pub metric: M,
}

/// One half-open bucket of a range tree
#[derive(Debug, Clone, PartialEq)]
pub struct RangeNode<F: RangeFlavor> {
    /// Range the node was created with. Its key is derived from this and
    /// never changes; tree links refer to nodes by address.
    pub address: MetricRange<F::Metric>,
    /// Metrics the node currently covers. Starts equal to `address` and only
    /// narrows (from the top) when the node is split.
    pub range: MetricRange<F::Metric>,
    /// Items whose metric lies in `range`
    pub entries: Vec<RangeEntry<F::Metric>>,
    /// Highest-metric entries, descending (empty for flavors without a cache)
    pub top: Vec<RangeEntry<F::Metric>>,
    /// Child and parent addresses
    pub left: Option<MetricRange<F::Metric>>,
    pub right: Option<MetricRange<F::Metric>>,
    pub parent: Option<MetricRange<F::Metric>>,
    /// 1 for a leaf
    pub height: u8,
    _flavor: PhantomData<F>,
}

impl<F: RangeFlavor> RangeNode<F> {
    pub fn new(range: MetricRange<F::Metric>) -> Self {
        Self {
            address: range,
            range,
            entries: Vec::new(),
            top: Vec::new(),
            left: None,
            right: None,
            parent: None,
            height: 1,
            _flavor: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= F::NODE_CAPACITY
    }

    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    pub fn utilization(&self) -> f32 {
        self.entries.len() as f32 / F::NODE_CAPACITY as f32
    }

    pub fn position(&self, item_id: u64) -> Option<usize> {
        self.entries.iter().position(|e| e.item_id == item_id)
    }

    pub fn item_ids(&self) -> Vec<u64> {
        self.entries.iter().map(|e| e.item_id).collect()
    }

    /// Place `entry` into the top cache, evicting the lowest when full
    pub(crate) fn offer_top(&mut self, entry: RangeEntry<F::Metric>) {
        if F::TOP_CAPACITY == 0 {
            return;
        }
        self.top.retain(|e| e.item_id != entry.item_id);
        let at = self
            .top
            .iter()
            .position(|e| Self::ranks_before(&entry, e))
            .unwrap_or(self.top.len());
        self.top.insert(at, entry);
        self.top.truncate(F::TOP_CAPACITY);
    }

    /// Recompute the top cache from every entry
    pub(crate) fn rebuild_top(&mut self) {
        if F::TOP_CAPACITY == 0 {
            return;
        }
        self.top = Self::descending(&self.entries);
        self.top.truncate(F::TOP_CAPACITY);
    }

    /// Entries sorted by metric descending, item id ascending on ties
    pub(crate) fn descending(entries: &[RangeEntry<F::Metric>]) -> Vec<RangeEntry<F::Metric>> {
        let mut sorted = entries.to_vec();
        sorted.sort_by(|a, b| b.metric.cmp(&a.metric).then(a.item_id.cmp(&b.item_id)));
        sorted
    }

    fn ranks_before(a: &RangeEntry<F::Metric>, b: &RangeEntry<F::Metric>) -> bool {
        a.metric > b.metric || (a.metric == b.metric && a.item_id < b.item_id)
    }
}

fn put_range<M: Metric>(writer: &mut RecordWriter, range: &MetricRange<M>) {
    range.start.put(writer);
    range.end.put(writer);
}

fn get_range<M: Metric>(reader: &mut RecordReader<'_>) -> Result<MetricRange<M>> {
    let start = M::get(reader)?;
    let end = M::get(reader)?;
    MetricRange::new(start, end)
}

fn put_entry<M: Metric>(writer: &mut RecordWriter, entry: &RangeEntry<M>) {
    writer.put_u64(entry.item_id);
    entry.metric.put(writer);
}

fn get_entry<M: Metric>(reader: &mut RecordReader<'_>) -> Result<RangeEntry<M>> {
    Ok(RangeEntry {
        item_id: reader.get_u64()?,
        metric: M::get(reader)?,
    })
}

impl<F: RangeFlavor> Record for RangeNode<F> {
    const DISCRIMINATOR: [u8; 8] = F::NODE_DISCRIMINATOR;
    const NAME: &'static str = F::NODE_NAME;
    const SPACE: usize = {
        let w = <F::Metric as Metric>::WIDTH;
        let top = if F::TOP_CAPACITY == 0 { 0 } else { 4 + F::TOP_CAPACITY * (8 + w) };
        8 + 4 * w + (4 + F::NODE_CAPACITY * (8 + w)) + top + 3 * (1 + 2 * w) + 1
    };

    fn encode_fields(&self, writer: &mut RecordWriter) -> Result<()> {
        put_range(writer, &self.address);
        put_range(writer, &self.range);
        writer.put_list(&self.entries, F::NODE_CAPACITY, put_entry)?;
        if F::TOP_CAPACITY > 0 {
            writer.put_list(&self.top, F::TOP_CAPACITY, put_entry)?;
        }
        writer.put_option(self.left.as_ref(), put_range);
        writer.put_option(self.right.as_ref(), put_range);
        writer.put_option(self.parent.as_ref(), put_range);
        writer.put_u8(self.height);
        Ok(())
    }

    fn decode_fields(reader: &mut RecordReader<'_>) -> Result<Self> {
        let address = get_range(reader)?;
        let range = get_range(reader)?;
        let entries = reader.get_list(F::NODE_CAPACITY, get_entry)?;
        let top = if F::TOP_CAPACITY > 0 {
            reader.get_list(F::TOP_CAPACITY, get_entry)?
        } else {
            Vec::new()
        };
        Ok(Self {
            address,
            range,
            entries,
            top,
            left: reader.get_option(get_range)?,
            right: reader.get_option(get_range)?,
            parent: reader.get_option(get_range)?,
            height: reader.get_u8()?,
            _flavor: PhantomData,
        })
    }
}

/// Entry point of a range tree
#[derive(Debug, Clone, PartialEq)]
pub struct RangeTreeRoot<F: RangeFlavor> {
    /// Address of the top node (`None` while the tree is empty)
    pub root: Option<MetricRange<F::Metric>>,
    pub node_count: u32,
    _flavor: PhantomData<F>,
}

impl<F: RangeFlavor> RangeTreeRoot<F> {
    pub fn empty() -> Self {
        Self {
            root: None,
            node_count: 0,
            _flavor: PhantomData,
        }
    }
}

impl<F: RangeFlavor> Record for RangeTreeRoot<F> {
    const DISCRIMINATOR: [u8; 8] = F::ROOT_DISCRIMINATOR;
    const NAME: &'static str = F::ROOT_NAME;
    const SPACE: usize = 8 + (1 + 2 * <F::Metric as Metric>::WIDTH) + 4;

    fn encode_fields(&self, writer: &mut RecordWriter) -> Result<()> {
        writer.put_option(self.root.as_ref(), put_range);
        writer.put_u32(self.node_count);
        Ok(())
    }

    fn decode_fields(reader: &mut RecordReader<'_>) -> Result<Self> {
        Ok(Self {
            root: reader.get_option(get_range)?,
            node_count: reader.get_u32()?,
            _flavor: PhantomData,
        })
    }
}
