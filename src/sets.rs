//! Per-transaction read and write logs.

use std::collections::HashMap;

use foldhash::fast::FixedState;

/// Addresses observed by speculative reads, in observation order. Values
/// are not kept; commit re-validates through the stripe locks.
#[derive(Default)]
pub(crate) struct ReadSet {
    addrs: Vec<usize>,
}

impl ReadSet {
    pub(crate) fn push(&mut self, addr: usize) {
        self.addrs.push(addr);
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.addrs.iter().copied()
    }
}

/// One buffered write: a shared word address and its pending bytes.
pub(crate) struct WriteEntry {
    pub(crate) addr: usize,
    pub(crate) value: Box<[u8]>,
}

/// Insertion-ordered write log with an address index for read-own-writes
/// and duplicate collapsing.
pub(crate) struct WriteSet {
    entries: Vec<WriteEntry>,
    index: HashMap<usize, usize, FixedState>,
}

impl WriteSet {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::with_hasher(FixedState::default()),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pending bytes for `addr`, if this transaction already wrote it.
    pub(crate) fn get(&self, addr: usize) -> Option<&[u8]> {
        self.index.get(&addr).map(|&slot| &*self.entries[slot].value)
    }

    /// Record `value` for `addr`. A duplicate address overwrites the
    /// existing entry in place; insertion order is preserved.
    pub(crate) fn record(&mut self, addr: usize, value: &[u8]) {
        match self.index.get(&addr) {
            Some(&slot) => self.entries[slot].value.copy_from_slice(value),
            None => {
                self.index.insert(addr, self.entries.len());
                self.entries.push(WriteEntry {
                    addr,
                    value: value.into(),
                });
            }
        }
    }

    pub(crate) fn entries(&self) -> &[WriteEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_set_collapses_duplicates_in_place() {
        let mut writes = WriteSet::new();
        writes.record(0x1000, &[1, 1, 1, 1]);
        writes.record(0x2000, &[2, 2, 2, 2]);
        writes.record(0x1000, &[9, 9, 9, 9]);

        let entries = writes.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].addr, 0x1000);
        assert_eq!(&*entries[0].value, &[9, 9, 9, 9]);
        assert_eq!(entries[1].addr, 0x2000);

        assert_eq!(writes.get(0x1000), Some(&[9u8, 9, 9, 9][..]));
        assert_eq!(writes.get(0x3000), None);
    }

    #[test]
    fn read_set_appends_in_order() {
        let mut reads = ReadSet::default();
        reads.push(3);
        reads.push(1);
        reads.push(3);
        assert_eq!(reads.iter().collect::<Vec<_>>(), vec![3, 1, 3]);
    }
}
