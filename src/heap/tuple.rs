use std::fmt;

use crate::file::PageKey;

/// Slot index within a heap page
pub type SlotId = usize;

/// Physical location of a stored tuple (page + slot)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub key: PageKey,
    pub slot: SlotId,
}

impl RecordId {
    pub fn new(key: PageKey, slot: SlotId) -> Self {
        Self { key, slot }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.key, self.slot)
    }
}

/// A fixed-length row. Field encoding belongs to the layers above; here a
/// tuple is its bytes plus where it is stored, once it has been stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    data: Vec<u8>,
    record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            record_id: None,
        }
    }

    pub(crate) fn stored(data: Vec<u8>, record_id: RecordId) -> Self {
        Self {
            data,
            record_id: Some(record_id),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: RecordId) {
        self.record_id = Some(record_id);
    }
}
