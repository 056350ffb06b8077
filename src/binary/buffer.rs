//! Output buffer with backpatching.
//!
//! The format is optimized for reading, not writing: section and body sizes
//! come before their payloads, so the writer streams forward and then goes
//! back to fill in 5-byte zero-padded LEB placeholders.

use crate::binary::leb;

/// Fixed width of a backpatchable u-LEB size field.
pub const LEB_PLACEHOLDER_SIZE: usize = 5;

/// Byte buffer with little-endian primitive writes and LEB backpatching.
#[derive(Debug, Clone, Default)]
pub struct Buffer {
    bytes: Vec<u8>,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn write_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32_leb(&mut self, value: u32) {
        leb::write_u32(&mut self.bytes, value);
    }

    pub fn write_s32_leb(&mut self, value: i32) {
        leb::write_s32(&mut self.bytes, value);
    }

    pub fn write_s64_leb(&mut self, value: i64) {
        leb::write_s64(&mut self.bytes, value);
    }

    /// Reserves a 5-byte u-LEB size field and returns its offset.
    pub fn write_leb_placeholder(&mut self) -> usize {
        let at = self.bytes.len();
        self.bytes.extend_from_slice(&[0; LEB_PLACEHOLDER_SIZE]);
        at
    }

    /// Fills a placeholder written by [`Buffer::write_leb_placeholder`].
    pub fn backpatch_u32_leb(&mut self, at: usize, value: u32) {
        leb::write_u32_at(&mut self.bytes, at, value, LEB_PLACEHOLDER_SIZE);
    }

    /// u-LEB length prefix followed by the raw bytes.
    pub fn write_inline_string(&mut self, value: &str) {
        self.write_u32_leb(value.len() as u32);
        self.bytes.extend_from_slice(value.as_bytes());
    }

    /// u-LEB length prefix followed by the raw bytes.
    pub fn write_inline_buffer(&mut self, value: &[u8]) {
        self.write_u32_leb(value.len() as u32);
        self.bytes.extend_from_slice(value);
    }
}
