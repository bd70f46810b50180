//! Metric types and the two tree flavors
//!
//! - Price: `u64` metric, power-of-two buckets `[2^n, 2^(n+1))`
//! - Sales: `u32` metric, uniform buckets of `SALES_BUCKET_WIDTH`

use std::fmt;
use std::hash::Hash;

use crate::error::{IndexError, Result};
use crate::key::{NS_PRICE_NODE, NS_PRICE_ROOT, NS_SALES_NODE, NS_SALES_ROOT};
use crate::record::{RecordReader, RecordWriter};

use super::MetricRange;

/// Width of every sales bucket
pub const SALES_BUCKET_WIDTH: u32 = 1000;

/// Max entries in a price node
pub const PRICE_NODE_CAPACITY: usize = 1000;

/// Max entries in a sales node
pub const SALES_NODE_CAPACITY: usize = 500;

/// Max cached top performers per sales node
pub const TOP_PERFORMERS_CAPACITY: usize = 10;

/// Numeric value a tree is ordered by
pub trait Metric: Copy + Ord + Hash + fmt::Debug + fmt::Display + 'static {
    /// Encoded width in bytes
    const WIDTH: usize;

    fn put(self, writer: &mut RecordWriter);

    fn get(reader: &mut RecordReader<'_>) -> Result<Self>;

    fn le_bytes(self) -> Vec<u8>;

    /// Lossless widening, used in errors and logs
    fn widen(self) -> u64;

    /// `start + (end - start) / 2`
    fn midpoint(start: Self, end: Self) -> Self;
}

impl Metric for u64 {
    const WIDTH: usize = 8;

    fn put(self, writer: &mut RecordWriter) {
        writer.put_u64(self);
    }

    fn get(reader: &mut RecordReader<'_>) -> Result<Self> {
        reader.get_u64()
    }

    fn le_bytes(self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }

    fn widen(self) -> u64 {
        self
    }

    fn midpoint(start: Self, end: Self) -> Self {
        start + (end - start) / 2
    }
}

impl Metric for u32 {
    const WIDTH: usize = 4;

    fn put(self, writer: &mut RecordWriter) {
        writer.put_u32(self);
    }

    fn get(reader: &mut RecordReader<'_>) -> Result<Self> {
        reader.get_u32()
    }

    fn le_bytes(self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }

    fn widen(self) -> u64 {
        u64::from(self)
    }

    fn midpoint(start: Self, end: Self) -> Self {
        start + (end - start) / 2
    }
}

/// Static description of one range tree family
pub trait RangeFlavor: fmt::Debug + Clone + PartialEq + 'static {
    type Metric: Metric;

    const NODE_NAME: &'static str;
    const ROOT_NAME: &'static str;
    const NODE_NAMESPACE: &'static str;
    const ROOT_NAMESPACE: &'static str;
    const NODE_DISCRIMINATOR: [u8; 8];
    const ROOT_DISCRIMINATOR: [u8; 8];

    /// Max entries per node
    const NODE_CAPACITY: usize;

    /// Max cached top performers per node (0 = no cache)
    const TOP_CAPACITY: usize;

    /// Bucket a metric value falls into before any split
    fn bucket(metric: Self::Metric) -> Result<MetricRange<Self::Metric>>;
}

/// Price tree flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Price;

/// Sales tree flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sales;

impl RangeFlavor for Price {
    type Metric = u64;

    const NODE_NAME: &'static str = "PriceIndexNode";
    const ROOT_NAME: &'static str = "PriceTreeRoot";
    const NODE_NAMESPACE: &'static str = NS_PRICE_NODE;
    const ROOT_NAMESPACE: &'static str = NS_PRICE_ROOT;
    const NODE_DISCRIMINATOR: [u8; 8] = *b"PRICENOD";
    const ROOT_DISCRIMINATOR: [u8; 8] = *b"PRICEROT";
    const NODE_CAPACITY: usize = PRICE_NODE_CAPACITY;
    const TOP_CAPACITY: usize = 0;

    /// `[2^n, 2^(n+1))` with `n = floor(log2(price))`; 0 gets `[0, 1)`
    fn bucket(price: u64) -> Result<MetricRange<u64>> {
        match price {
            0 => MetricRange::new(0, 1),
            u64::MAX => Err(IndexError::InvalidRange {
                start: price,
                end: price,
            }),
            _ => {
                let n = 63 - price.leading_zeros();
                let start = 1u64 << n;
                let end = if n == 63 { u64::MAX } else { 1u64 << (n + 1) };
                MetricRange::new(start, end)
            }
        }
    }
}

impl RangeFlavor for Sales {
    type Metric = u32;

    const NODE_NAME: &'static str = "SalesIndexNode";
    const ROOT_NAME: &'static str = "SalesTreeRoot";
    const NODE_NAMESPACE: &'static str = NS_SALES_NODE;
    const ROOT_NAMESPACE: &'static str = NS_SALES_ROOT;
    const NODE_DISCRIMINATOR: [u8; 8] = *b"SALESNOD";
    const ROOT_DISCRIMINATOR: [u8; 8] = *b"SALESROT";
    const NODE_CAPACITY: usize = SALES_NODE_CAPACITY;
    const TOP_CAPACITY: usize = TOP_PERFORMERS_CAPACITY;

    /// `[floor(s / W) * W, floor(s / W) * W + W)`
    fn bucket(sales: u32) -> Result<MetricRange<u32>> {
        let start = (sales / SALES_BUCKET_WIDTH) * SALES_BUCKET_WIDTH;
        let end = start.checked_add(SALES_BUCKET_WIDTH).unwrap_or(u32::MAX);
        if sales >= end {
            return Err(IndexError::InvalidRange {
                start: u64::from(sales),
                end: u64::from(sales),
            });
        }
        MetricRange::new(start, end)
    }
}
