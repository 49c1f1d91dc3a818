//! Byte buffer with independent read and write cursors.
//!
//! Layout: `[0, read_pos)` consumed, `[read_pos, write_pos)` readable,
//! `[write_pos, capacity)` writable. Pooled buffers hand their storage back to
//! the pool when dropped, so ownership transfer is the release discipline.

use std::fmt;
use std::rc::Rc;

use crate::pool::PoolShared;

pub struct ByteBuf {
    data: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
    pool: Option<Rc<PoolShared>>,
}

impl ByteBuf {
    pub(crate) fn pooled(data: Vec<u8>, pool: Rc<PoolShared>) -> Self {
        Self {
            data,
            read_pos: 0,
            write_pos: 0,
            pool: Some(pool),
        }
    }

    /// Unpooled buffer whose readable region is all of `data`.
    pub fn wrap(data: Vec<u8>) -> Self {
        let write_pos = data.len();
        Self {
            data,
            read_pos: 0,
            write_pos,
            pool: None,
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self::wrap(bytes.to_vec())
    }

    pub fn empty() -> Self {
        Self::wrap(Vec::new())
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn is_pooled(&self) -> bool {
        self.pool.is_some()
    }

    pub fn read_position(&self) -> usize {
        self.read_pos
    }

    pub fn write_position(&self) -> usize {
        self.write_pos
    }

    pub fn read_remaining(&self) -> usize {
        self.write_pos - self.read_pos
    }

    pub fn write_remaining(&self) -> usize {
        self.data.len() - self.write_pos
    }

    pub fn can_read(&self) -> bool {
        self.read_pos < self.write_pos
    }

    pub fn read_slice(&self) -> &[u8] {
        &self.data[self.read_pos..self.write_pos]
    }

    pub fn write_slice_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.write_pos..]
    }

    pub fn advance_read(&mut self, n: usize) {
        assert!(n <= self.read_remaining(), "read cursor past write cursor");
        self.read_pos += n;
    }

    /// Step the read cursor back over bytes that were consumed from this buffer.
    pub fn rewind_read(&mut self, n: usize) {
        assert!(n <= self.read_pos, "read cursor before start");
        self.read_pos -= n;
    }

    pub fn advance_write(&mut self, n: usize) {
        assert!(n <= self.write_remaining(), "write cursor past capacity");
        self.write_pos += n;
    }

    pub fn put_u8(&mut self, b: u8) {
        self.put_slice(&[b]);
    }

    pub fn put_slice(&mut self, bytes: &[u8]) {
        assert!(bytes.len() <= self.write_remaining(), "buffer overflow");
        self.data[self.write_pos..self.write_pos + bytes.len()].copy_from_slice(bytes);
        self.write_pos += bytes.len();
    }

    pub fn get_u8(&mut self) -> Option<u8> {
        let b = *self.data[self.read_pos..self.write_pos].first()?;
        self.read_pos += 1;
        Some(b)
    }

    /// Forget all contents; capacity is kept.
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }

    /// Move the readable region to the front of the buffer.
    pub fn compact(&mut self) {
        if self.read_pos == 0 {
            return;
        }
        self.data.copy_within(self.read_pos..self.write_pos, 0);
        self.write_pos -= self.read_pos;
        self.read_pos = 0;
    }

    /// Copy of the readable bytes; the buffer itself is released on drop.
    pub fn to_vec(&self) -> Vec<u8> {
        self.read_slice().to_vec()
    }

    /// Take the readable bytes out without copying when possible.
    pub fn into_vec(mut self) -> Vec<u8> {
        let mut data = std::mem::take(&mut self.data);
        data.truncate(self.write_pos);
        if self.read_pos > 0 {
            data.drain(..self.read_pos);
        }
        data
    }
}

impl Drop for ByteBuf {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release(std::mem::take(&mut self.data));
        }
    }
}

impl fmt::Debug for ByteBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteBuf")
            .field("read_pos", &self.read_pos)
            .field("write_pos", &self.write_pos)
            .field("capacity", &self.data.len())
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

impl PartialEq for ByteBuf {
    fn eq(&self, other: &Self) -> bool {
        self.read_slice() == other.read_slice()
    }
}

impl Eq for ByteBuf {}
