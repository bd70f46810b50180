//! Record codec
//!
//! Little-endian field writer/reader shared by every record type.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{IndexError, Result};

/// Appends record fields to a growable buffer
pub struct RecordWriter {
    record: &'static str,
    buf: BytesMut,
}

impl RecordWriter {
    pub fn new(record: &'static str, capacity: usize) -> Self {
        Self {
            record,
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn put_raw(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.put_u64_le(value);
    }

    /// `u32` length prefix + UTF-8 bytes
    pub fn put_str(&mut self, value: &str, max_len: usize) -> Result<()> {
        if value.len() > max_len {
            return Err(self.overflow("string", value.len(), max_len));
        }
        self.buf.put_u32_le(value.len() as u32);
        self.buf.put_slice(value.as_bytes());
        Ok(())
    }

    /// Tag byte, then the value when present
    pub fn put_option<T>(&mut self, value: Option<&T>, mut put: impl FnMut(&mut Self, &T)) {
        match value {
            Some(inner) => {
                self.buf.put_u8(1);
                put(self, inner);
            }
            None => self.buf.put_u8(0),
        }
    }

    /// `u32` count prefix, then each element; refuses lists over capacity
    pub fn put_list<T>(
        &mut self,
        items: &[T],
        capacity: usize,
        mut put: impl FnMut(&mut Self, &T),
    ) -> Result<()> {
        if items.len() > capacity {
            return Err(self.overflow("list", items.len(), capacity));
        }
        self.buf.put_u32_le(items.len() as u32);
        for item in items {
            put(self, item);
        }
        Ok(())
    }

    fn overflow(&self, what: &str, len: usize, capacity: usize) -> IndexError {
        IndexError::CorruptRecord(format!(
            "{}: {} of length {} exceeds capacity {}",
            self.record, what, len, capacity
        ))
    }
}

/// Bounds-checked cursor over an encoded record body
pub struct RecordReader<'a> {
    record: &'static str,
    buf: &'a [u8],
}

impl<'a> RecordReader<'a> {
    pub fn new(record: &'static str, buf: &'a [u8]) -> Self {
        Self { record, buf }
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        self.need(8)?;
        Ok(self.buf.get_u64_le())
    }

    pub fn get_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.need(N)?;
        let mut out = [0u8; N];
        self.buf.copy_to_slice(&mut out);
        Ok(out)
    }

    pub fn get_str(&mut self, max_len: usize) -> Result<String> {
        let len = self.get_u32()? as usize;
        if len > max_len {
            return Err(self.corrupt(format!("string length {} exceeds {}", len, max_len)));
        }
        self.need(len)?;
        let buf = self.buf;
        let (head, tail) = buf.split_at(len);
        let value = std::str::from_utf8(head)
            .map_err(|e| self.corrupt(format!("invalid utf-8: {}", e)))?
            .to_string();
        self.buf = tail;
        Ok(value)
    }

    pub fn get_option<T>(
        &mut self,
        mut get: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Option<T>> {
        match self.get_u8()? {
            0 => Ok(None),
            1 => Ok(Some(get(self)?)),
            tag => Err(self.corrupt(format!("invalid option tag {}", tag))),
        }
    }

    pub fn get_list<T>(
        &mut self,
        capacity: usize,
        mut get: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        let len = self.get_u32()? as usize;
        if len > capacity {
            return Err(self.corrupt(format!("list length {} exceeds capacity {}", len, capacity)));
        }
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(get(self)?);
        }
        Ok(items)
    }

    /// Fail if any bytes were left unread
    pub fn finish(self) -> Result<()> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(self.corrupt(format!("{} trailing bytes", self.buf.len())))
        }
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(self.corrupt(format!(
                "truncated: need {} bytes, {} left",
                n,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    fn corrupt(&self, detail: String) -> IndexError {
        IndexError::CorruptRecord(format!("{}: {}", self.record, detail))
    }
}
