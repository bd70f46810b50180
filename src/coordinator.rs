//! Coordinator Module
//!
//! Keeps the allocator and the three index families consistent across an
//! item's lifecycle. Every helper runs inside a caller-supplied batch; an
//! error from any step means the whole batch must be discarded.
//!
//! ## Create
//! ```text
//!   allocate id ──▶ keyword roots/shards ──▶ price node ──▶ sales node
//!   (rotate chunk      (initialize root        (initialize bucket, split
//!    on exhaustion)     on first use)           once when full)
//! ```

use std::collections::HashSet;

use tracing::{debug, info};

use crate::allocator::{IdAllocator, Reclaimed};
use crate::batch::Batch;
use crate::error::{IndexError, Result};
use crate::key::{keyword_root_key, SellerKey};
use crate::keyword::KeywordIndex;
use crate::range::{Metric, MetricRange, MetricUpdate, Price, RangeFlavor, RangeIndex, Sales};
use crate::store::RecordSource;

/// Indexed attributes of one item
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemListing {
    pub keywords: Vec<String>,
    pub price: u64,
    pub sales: u32,
}

impl ItemListing {
    pub fn new(keywords: impl IntoIterator<Item = impl Into<String>>, price: u64, sales: u32) -> Self {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            price,
            sales,
        }
    }

    /// Keywords with repeats dropped, first occurrence kept
    fn distinct_keywords(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.keywords
            .iter()
            .map(String::as_str)
            .filter(|kw| seen.insert(*kw))
            .collect()
    }
}

/// Item lifecycle helpers
pub struct Coordinator;

impl Coordinator {
    /// Mint an id for `seller` and index the item under every keyword, its
    /// price and its sales count
    pub fn create_item(batch: &mut Batch<'_>, seller: &SellerKey, listing: &ItemListing) -> Result<u64> {
        let item_id = match IdAllocator::allocate(batch, seller) {
            Err(IndexError::ChunkExhausted { chunk_index }) => {
                debug!(chunk_index, "active chunk exhausted, rotating");
                IdAllocator::allocate_new_chunk(batch, seller)?;
                IdAllocator::allocate(batch, seller)?
            }
            other => other?,
        };

        for keyword in listing.distinct_keywords() {
            if !batch.contains(&keyword_root_key(keyword)) {
                KeywordIndex::initialize(batch, keyword)?;
            }
            KeywordIndex::insert(batch, keyword, item_id)?;
        }
        Self::index_metric::<Price>(batch, item_id, listing.price)?;
        Self::index_metric::<Sales>(batch, item_id, listing.sales)?;

        info!(
            item_id,
            price = listing.price,
            sales = listing.sales,
            keywords = listing.keywords.len(),
            "item created"
        );
        Ok(item_id)
    }

    /// Move an item from `old_price` to `new_price`
    pub fn reprice_item(
        batch: &mut Batch<'_>,
        item_id: u64,
        old_price: u64,
        new_price: u64,
    ) -> Result<MetricUpdate<u64>> {
        Self::update_metric::<Price>(batch, item_id, old_price, new_price)
    }

    /// Move an item from `old_sales` to `new_sales`
    pub fn update_item_sales(
        batch: &mut Batch<'_>,
        item_id: u64,
        old_sales: u32,
        new_sales: u32,
    ) -> Result<MetricUpdate<u32>> {
        Self::update_metric::<Sales>(batch, item_id, old_sales, new_sales)
    }

    /// Unindex an item everywhere, then reclaim its id
    pub fn delete_item(
        batch: &mut Batch<'_>,
        seller: &SellerKey,
        item_id: u64,
        listing: &ItemListing,
    ) -> Result<Reclaimed> {
        for keyword in listing.distinct_keywords() {
            KeywordIndex::remove(batch, keyword, item_id)?;
        }
        Self::unindex_metric::<Price>(batch, item_id, listing.price)?;
        Self::unindex_metric::<Sales>(batch, item_id, listing.sales)?;

        let reclaimed = IdAllocator::reclaim(batch, seller, item_id)?;
        info!(item_id, chunk_closed = reclaimed.chunk_closed, "item deleted");
        Ok(reclaimed)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn index_metric<F: RangeFlavor>(batch: &mut Batch<'_>, item_id: u64, metric: F::Metric) -> Result<()> {
        let address = Self::room_for::<F>(batch, metric)?;
        RangeIndex::<F>::insert(batch, &address, item_id, metric)
    }

    fn unindex_metric<F: RangeFlavor>(batch: &mut Batch<'_>, item_id: u64, metric: F::Metric) -> Result<()> {
        let address = match RangeIndex::<F>::locate(batch, metric)? {
            Some(address) => address,
            None => {
                let bucket = F::bucket(metric)?;
                return Err(IndexError::RangeIndexNotFound {
                    start: bucket.start.widen(),
                    end: bucket.end.widen(),
                });
            }
        };
        RangeIndex::<F>::remove(batch, &address, item_id)?;
        Ok(())
    }

    fn update_metric<F: RangeFlavor>(
        batch: &mut Batch<'_>,
        item_id: u64,
        old: F::Metric,
        new: F::Metric,
    ) -> Result<MetricUpdate<F::Metric>> {
        let stays = match RangeIndex::<F>::locate(batch, old)? {
            Some(address) => RangeIndex::<F>::node(batch, &address)?.range.contains(new),
            None => false,
        };
        if !stays {
            Self::room_for::<F>(batch, new)?;
        }
        RangeIndex::<F>::update_metric(batch, item_id, old, new)
    }

    /// Address of the node that should receive `metric`, created from the
    /// default bucket if absent and split once if full
    fn room_for<F: RangeFlavor>(
        batch: &mut Batch<'_>,
        metric: F::Metric,
    ) -> Result<MetricRange<F::Metric>> {
        let address = match RangeIndex::<F>::locate(batch, metric)? {
            Some(address) => address,
            None => {
                let bucket = F::bucket(metric)?;
                RangeIndex::<F>::initialize_node(batch, bucket)?;
                bucket
            }
        };

        if !RangeIndex::<F>::node(batch, &address)?.is_full() {
            return Ok(address);
        }

        // The upper half is addressed by exactly the range it covers
        let (lower, upper) = RangeIndex::<F>::split(batch, &address)?;
        Ok(if upper.contains(metric) { upper } else { lower })
    }
}
