use super::error::{HeapError, HeapResult};
use super::tuple::SlotId;
use crate::file::{PAGE_SIZE, PageKey};

/// Page header stored at the beginning of each heap page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub slot_count: u16, // 2 bytes - Slots in this page
    pub free_slots: u16, // 2 bytes - Slots not holding a tuple
    pub tuple_size: u16, // 2 bytes - Size of each tuple
}

impl PageHeader {
    /// Header is padded to 16 bytes
    pub const SIZE: usize = 16;

    pub fn new(slot_count: u16, tuple_size: u16) -> Self {
        Self {
            slot_count,
            free_slots: slot_count,
            tuple_size,
        }
    }

    pub fn serialize(&self) -> [u8; Self::SIZE] {
        let mut result = [0u8; Self::SIZE];
        result[0..2].copy_from_slice(&self.slot_count.to_le_bytes());
        result[2..4].copy_from_slice(&self.free_slots.to_le_bytes());
        result[4..6].copy_from_slice(&self.tuple_size.to_le_bytes());
        result
    }

    pub fn deserialize(data: &[u8]) -> Self {
        Self {
            slot_count: u16::from_le_bytes([data[0], data[1]]),
            free_slots: u16::from_le_bytes([data[2], data[3]]),
            tuple_size: u16::from_le_bytes([data[4], data[5]]),
        }
    }
}

/// Slotted view over a page's bytes.
///
/// Layout: `[header][slot-used bitmap][slot 0][slot 1]...`, every slot
/// `tuple_size` bytes. Read access works on `&[u8]`; inserts and deletes need
/// `&mut [u8]` and write through to the underlying buffer.
pub struct HeapPage<B> {
    key: PageKey,
    buffer: B,
    header: PageHeader,
}

impl HeapPage<()> {
    /// Maximum number of slots for a given tuple size
    pub fn calculate_slot_count(tuple_size: usize) -> usize {
        if tuple_size == 0 || tuple_size > PAGE_SIZE {
            return 0;
        }

        // bitmap (slot_count / 8 bytes) + slot_count * tuple_size <= available
        let available = PAGE_SIZE - PageHeader::SIZE;
        let max_slots = (available * 8) / (1 + tuple_size * 8);
        max_slots.min(u16::MAX as usize)
    }

    /// Format `buffer` as an empty page holding tuples of `tuple_size` bytes
    pub fn init(buffer: &mut [u8], tuple_size: usize) -> HeapResult<()> {
        let slot_count = Self::calculate_slot_count(tuple_size);
        if slot_count == 0 || tuple_size > u16::MAX as usize {
            return Err(HeapError::TupleTooLarge(tuple_size));
        }

        let header = PageHeader::new(slot_count as u16, tuple_size as u16);
        buffer.fill(0);
        buffer[..PageHeader::SIZE].copy_from_slice(&header.serialize());
        Ok(())
    }
}

impl<B: AsRef<[u8]>> HeapPage<B> {
    /// Wrap an initialized page buffer
    pub fn from_buffer(key: PageKey, buffer: B) -> HeapResult<Self> {
        let bytes = buffer.as_ref();
        if bytes.len() != PAGE_SIZE {
            return Err(HeapError::Corrupted {
                key,
                reason: format!("page is {} bytes", bytes.len()),
            });
        }

        let header = PageHeader::deserialize(&bytes[..PageHeader::SIZE]);
        let slot_count = header.slot_count as usize;
        let tuple_size = header.tuple_size as usize;

        if slot_count == 0 || tuple_size == 0 {
            return Err(HeapError::Corrupted {
                key,
                reason: "page was never initialized".to_string(),
            });
        }
        if header.free_slots > header.slot_count {
            return Err(HeapError::Corrupted {
                key,
                reason: format!(
                    "{} free slots out of {}",
                    header.free_slots, header.slot_count
                ),
            });
        }
        if Self::data_start(slot_count) + slot_count * tuple_size > PAGE_SIZE {
            return Err(HeapError::Corrupted {
                key,
                reason: "page layout exceeds page size".to_string(),
            });
        }

        Ok(Self {
            key,
            buffer,
            header,
        })
    }

    fn data_start(slot_count: usize) -> usize {
        PageHeader::SIZE + slot_count.div_ceil(8)
    }

    fn slot_range(&self, slot: SlotId) -> std::ops::Range<usize> {
        let tuple_size = self.header.tuple_size as usize;
        let start = Self::data_start(self.slot_count()) + slot * tuple_size;
        start..start + tuple_size
    }

    fn check_slot(&self, slot: SlotId) -> HeapResult<()> {
        if slot >= self.slot_count() {
            return Err(HeapError::InvalidSlot {
                key: self.key,
                slot,
            });
        }
        Ok(())
    }

    pub fn key(&self) -> PageKey {
        self.key
    }

    pub fn slot_count(&self) -> usize {
        self.header.slot_count as usize
    }

    pub fn free_slot_count(&self) -> usize {
        self.header.free_slots as usize
    }

    pub fn tuple_size(&self) -> usize {
        self.header.tuple_size as usize
    }

    pub fn is_full(&self) -> bool {
        self.header.free_slots == 0
    }

    pub fn is_empty(&self) -> bool {
        self.header.free_slots == self.header.slot_count
    }

    pub fn is_slot_used(&self, slot: SlotId) -> bool {
        if slot >= self.slot_count() {
            return false;
        }
        let byte = self.buffer.as_ref()[PageHeader::SIZE + slot / 8];
        byte & (1 << (slot % 8)) != 0
    }

    /// First slot not holding a tuple, or `None` if the page is full
    pub fn find_free_slot(&self) -> Option<SlotId> {
        if self.is_full() {
            return None;
        }
        (0..self.slot_count()).find(|&slot| !self.is_slot_used(slot))
    }

    pub fn get_tuple(&self, slot: SlotId) -> HeapResult<&[u8]> {
        self.check_slot(slot)?;
        if !self.is_slot_used(slot) {
            return Err(HeapError::EmptySlot {
                key: self.key,
                slot,
            });
        }
        Ok(&self.buffer.as_ref()[self.slot_range(slot)])
    }

    /// Used slots in slot order
    pub fn used_slots(&self) -> impl Iterator<Item = SlotId> + '_ {
        (0..self.slot_count()).filter(|&slot| self.is_slot_used(slot))
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> HeapPage<B> {
    /// Store `data` in a free slot and mark it used
    pub fn insert(&mut self, slot: SlotId, data: &[u8]) -> HeapResult<()> {
        self.check_slot(slot)?;
        if data.len() != self.tuple_size() {
            return Err(HeapError::TupleSize {
                expected: self.tuple_size(),
                actual: data.len(),
            });
        }
        if self.is_slot_used(slot) {
            return Err(HeapError::InvalidSlot {
                key: self.key,
                slot,
            });
        }

        let range = self.slot_range(slot);
        self.buffer.as_mut()[range].copy_from_slice(data);
        self.set_slot_bit(slot, true);
        self.header.free_slots -= 1;
        self.write_header();
        Ok(())
    }

    /// Free a used slot. The slot's bytes are zeroed.
    pub fn delete(&mut self, slot: SlotId) -> HeapResult<()> {
        self.check_slot(slot)?;
        if !self.is_slot_used(slot) {
            return Err(HeapError::EmptySlot {
                key: self.key,
                slot,
            });
        }

        let range = self.slot_range(slot);
        self.buffer.as_mut()[range].fill(0);
        self.set_slot_bit(slot, false);
        self.header.free_slots += 1;
        self.write_header();
        Ok(())
    }

    fn set_slot_bit(&mut self, slot: SlotId, used: bool) {
        let byte = &mut self.buffer.as_mut()[PageHeader::SIZE + slot / 8];
        if used {
            *byte |= 1 << (slot % 8);
        } else {
            *byte &= !(1 << (slot % 8));
        }
    }

    fn write_header(&mut self) {
        let header = self.header.serialize();
        self.buffer.as_mut()[..PageHeader::SIZE].copy_from_slice(&header);
    }
}
