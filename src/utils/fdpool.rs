use std::{fs::File, io, os::unix::fs::MetadataExt};

use hashlink::LinkedHashMap;

// Bounded pool of open file descriptors keyed by inode number. Recency
// order lives in the linked map: an access reinserts the entry at the
// back, and overflow pops the front. An evicted descriptor is simply
// closed; the disk manager reopens it from the recorded path on demand.
pub struct FdPool {
    capacity: usize,
    descriptors: LinkedHashMap<u64, File>,
}

impl FdPool {
    pub fn new(capacity: usize) -> Self {
        FdPool {
            capacity,
            descriptors: LinkedHashMap::with_capacity(capacity),
        }
    }

    // Registers a descriptor and returns its inode-derived identifier,
    // evicting the least recently used entry if the pool is over capacity.
    pub fn set(&mut self, file: File) -> io::Result<u64> {
        let file_id = file.metadata()?.ino();

        self.descriptors.remove(&file_id);
        self.descriptors.insert(file_id, file);

        if self.descriptors.len() > self.capacity {
            self.descriptors.pop_front();
        }

        Ok(file_id)
    }

    pub fn get(&mut self, file_id: u64) -> Option<&File> {
        let file = self.descriptors.remove(&file_id)?;
        self.descriptors.insert(file_id, file);
        self.descriptors.get(&file_id)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
