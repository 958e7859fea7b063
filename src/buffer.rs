use arrayvec::ArrayVec;
use core::ops::Range;

use crate::MAX_FRAME_LEN;

/// Number of plain fields in a frame: command, property, value1, value2.
pub const FIELD_COUNT: usize = 4;

/// Raw bytes of the frame being received, separators included, together
/// with the start offsets of its fields.
#[derive(Debug)]
pub struct Buffer {
    data: ArrayVec<u8, MAX_FRAME_LEN>,
    starts: ArrayVec<usize, FIELD_COUNT>,
    checksum_start: Option<usize>,
}

impl Buffer {
    pub fn new() -> Buffer {
        let mut buf = Buffer {
            data: ArrayVec::new(),
            starts: ArrayVec::new(),
            checksum_start: None,
        };
        buf.starts.push(0);
        buf
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a byte, returns false if the buffer is full.
    pub fn push(&mut self, byte: u8) -> bool {
        self.data.try_push(byte).is_ok()
    }

    /// Start the next plain field at the current position.
    /// Returns false if all fields are already in use.
    pub fn open_field(&mut self) -> bool {
        self.starts.try_push(self.data.len()).is_ok()
    }

    /// Start the checksum field at the current position.
    pub fn open_checksum(&mut self) {
        self.checksum_start = Some(self.data.len());
    }

    pub fn has_checksum(&self) -> bool {
        self.checksum_start.is_some()
    }

    /// Contents of plain field `index`, empty if it wasn't received.
    pub fn field(&self, index: usize) -> &[u8] {
        match self.field_range(index) {
            Some(range) => &self.data[range],
            None => &[],
        }
    }

    pub fn checksum_field(&self) -> Option<&[u8]> {
        self.checksum_start.map(|start| &self.data[start..])
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.starts.clear();
        self.starts.push(0);
        self.checksum_start = None;
    }

    // Each field ends one byte before the start of the next one, where its
    // terminating separator or checksum mark is stored.
    fn field_range(&self, index: usize) -> Option<Range<usize>> {
        let start = *self.starts.get(index)?;
        let end = match self.starts.get(index + 1) {
            Some(next) => next - 1,
            None => self.checksum_start.map_or(self.data.len(), |mark| mark - 1),
        };
        Some(start..end)
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}
