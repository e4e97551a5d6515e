use hashlink::LinkedHashMap;
use thiserror::Error;

use crate::{
    buffer::frame::FrameId,
    storage::{disk::manager::FileId, page::page::PageId},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PageTableError {
    #[error("page {page_no} of file {file} is already mapped to a frame")]
    Occupied { file: FileId, page_no: PageId },
    #[error("no frame holds page {page_no} of file {file}")]
    NotFound { file: FileId, page_no: PageId },
}

// Maps a (file, page) fingerprint to the frame holding it. A miss on
// lookup is the normal control path for the buffer manager, so it comes
// back as None rather than an error; insert and remove failures indicate
// a broken invariant on the caller's side.
pub struct PageTable {
    entries: LinkedHashMap<(FileId, PageId), FrameId>,
}

impl PageTable {
    pub fn new(num_bufs: usize) -> Self {
        // Sized ahead of the frame count so steady-state inserts never rehash.
        PageTable {
            entries: LinkedHashMap::with_capacity(num_bufs + num_bufs / 5 + 1),
        }
    }

    pub fn lookup(&self, file: FileId, page_no: PageId) -> Option<FrameId> {
        self.entries.get(&(file, page_no)).copied()
    }

    pub fn insert(
        &mut self,
        file: FileId,
        page_no: PageId,
        frame_no: FrameId,
    ) -> Result<(), PageTableError> {
        if self.entries.contains_key(&(file, page_no)) {
            return Err(PageTableError::Occupied { file, page_no });
        }
        self.entries.insert((file, page_no), frame_no);
        Ok(())
    }

    pub fn remove(&mut self, file: FileId, page_no: PageId) -> Result<(), PageTableError> {
        self.entries
            .remove(&(file, page_no))
            .map(|_| ())
            .ok_or(PageTableError::NotFound { file, page_no })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{PageTable, PageTableError};

    #[test]
    fn lookup_insert_remove() {
        let mut table = PageTable::new(4);

        assert_eq!(table.lookup(1, 10), None);

        table.insert(1, 10, 0).unwrap();
        table.insert(1, 11, 1).unwrap();
        table.insert(2, 10, 2).unwrap();

        assert_eq!(table.lookup(1, 10), Some(0));
        assert_eq!(table.lookup(2, 10), Some(2));
        assert_eq!(table.len(), 3);

        table.remove(1, 10).unwrap();
        assert_eq!(table.lookup(1, 10), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn double_insert_is_rejected() {
        let mut table = PageTable::new(4);
        table.insert(1, 10, 0).unwrap();

        assert_eq!(
            table.insert(1, 10, 3),
            Err(PageTableError::Occupied { file: 1, page_no: 10 })
        );
        // The original mapping survives the failed insert.
        assert_eq!(table.lookup(1, 10), Some(0));
    }

    #[test]
    fn remove_missing_is_an_error() {
        let mut table = PageTable::new(4);
        assert_eq!(
            table.remove(9, 9),
            Err(PageTableError::NotFound { file: 9, page_no: 9 })
        );
    }
}
