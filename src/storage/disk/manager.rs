use std::{
    collections::{HashMap, VecDeque},
    fs::OpenOptions,
    io::{self, Read, Seek, SeekFrom, Write},
    path::PathBuf,
};

use hashlink::LinkedHashMap;
use thiserror::Error;
use tracing::debug;

use crate::{
    storage::page::page::{page_constants::PAGE_SIZE, PageId},
    utils::fdpool::FdPool,
};

pub type FileId = u64;

// Number of descriptors the fd pool keeps open at once.
const FD_POOL_ENTRIES: usize = 8;

#[derive(Debug, Error)]
pub enum DiskManagerError {
    #[error("file {0} is not managed by this disk manager")]
    UnknownFile(FileId),
    #[error("page {page_no} of file {file} has not been allocated")]
    PageNotAllocated { file: FileId, page_no: PageId },
    #[error("page {page_no} of file {file} has been deallocated")]
    PageDeallocated { file: FileId, page_no: PageId },
    #[error(transparent)]
    Io(#[from] io::Error),
}

struct FileMetadata {
    // A mapping from page_no to its offset on disk. Deallocated pages are
    // marked None; their id and offset sit in the free slot list and are
    // handed back out by the next allocation.
    pages: LinkedHashMap<PageId, Option<u64>>,
    free_slots: VecDeque<(PageId, u64)>,
}

impl FileMetadata {
    fn new() -> Self {
        FileMetadata {
            pages: LinkedHashMap::new(),
            free_slots: VecDeque::new(),
        }
    }
}

// The page-oriented file store. Files are identified by inode number and
// addressed page-at-a-time; the manager keeps the page -> offset mapping
// per file and recycles the slots of deleted pages.
pub struct DiskManager {
    data_dir: PathBuf,
    // Paths are remembered so an fd evicted from the pool can be reopened.
    file_map: HashMap<FileId, PathBuf>,
    file_descriptors: FdPool,
    files: HashMap<FileId, FileMetadata>,

    mono_id: u64,

    num_reads: u64,
    num_writes: u64,
    num_deletes: u64,
}

impl DiskManager {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        DiskManager {
            data_dir: data_dir.into(),
            file_map: HashMap::new(),
            file_descriptors: FdPool::new(FD_POOL_ENTRIES),
            files: HashMap::new(),
            mono_id: 0,
            num_reads: 0,
            num_writes: 0,
            num_deletes: 0,
        }
    }

    // Creates a fresh page file under the data directory and registers it.
    pub fn create_file(&mut self) -> Result<FileId, DiskManagerError> {
        std::fs::create_dir_all(&self.data_dir)?;

        let oid = self.mono_id;
        self.mono_id += 1;
        let path = self.data_dir.join(format!("{oid}.bin"));

        let new_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let file_id = self.file_descriptors.set(new_file)?;
        self.file_map.insert(file_id, path);
        self.files.insert(file_id, FileMetadata::new());

        debug!(file_id, "created page file");
        Ok(file_id)
    }

    // Hands out the next page slot, preferring a recycled one. The slot is
    // zero-filled on disk so a read can follow immediately.
    pub fn allocate_page(&mut self, file: FileId) -> Result<PageId, DiskManagerError> {
        let file_meta = self
            .files
            .get_mut(&file)
            .ok_or(DiskManagerError::UnknownFile(file))?;

        let (page_no, offset) = match file_meta.free_slots.pop_front() {
            Some((page_no, offset)) => {
                file_meta.pages.replace(page_no, Some(offset));
                (page_no, offset)
            }
            None => {
                let page_no = file_meta.pages.len() as PageId;
                let offset = (file_meta.pages.len() * PAGE_SIZE) as u64;
                file_meta.pages.insert(page_no, Some(offset));
                (page_no, offset)
            }
        };

        self.write_at(file, offset, &[0; PAGE_SIZE])?;
        Ok(page_no)
    }

    pub fn write_page(
        &mut self,
        file: FileId,
        page_no: PageId,
        page_data: &[u8],
    ) -> Result<(), DiskManagerError> {
        let offset = self.page_offset(file, page_no)?;
        self.write_at(file, offset, page_data)?;
        self.num_writes += 1;
        Ok(())
    }

    pub fn read_page(
        &mut self,
        file: FileId,
        page_no: PageId,
        page_data: &mut [u8],
    ) -> Result<(), DiskManagerError> {
        let offset = self.page_offset(file, page_no)?;

        let mut db_io = self.file_handle(file)?;
        db_io.seek(SeekFrom::Start(offset))?;
        db_io.read_exact(page_data)?;

        self.num_reads += 1;
        Ok(())
    }

    // Marks the page dead and queues its slot for reuse. The bytes on disk
    // are left in place until the slot is handed back out.
    pub fn delete_page(&mut self, file: FileId, page_no: PageId) -> Result<(), DiskManagerError> {
        let file_meta = self
            .files
            .get_mut(&file)
            .ok_or(DiskManagerError::UnknownFile(file))?;

        match file_meta.pages.get(&page_no).copied() {
            Some(Some(offset)) => {
                file_meta.pages.replace(page_no, None);
                file_meta.free_slots.push_front((page_no, offset));
                self.num_deletes += 1;
                Ok(())
            }
            Some(None) => Err(DiskManagerError::PageDeallocated { file, page_no }),
            None => Err(DiskManagerError::PageNotAllocated { file, page_no }),
        }
    }

    pub fn num_reads(&self) -> u64 {
        self.num_reads
    }

    pub fn num_writes(&self) -> u64 {
        self.num_writes
    }

    pub fn num_deletes(&self) -> u64 {
        self.num_deletes
    }

    fn page_offset(&self, file: FileId, page_no: PageId) -> Result<u64, DiskManagerError> {
        let file_meta = self
            .files
            .get(&file)
            .ok_or(DiskManagerError::UnknownFile(file))?;

        match file_meta.pages.get(&page_no) {
            Some(Some(offset)) => Ok(*offset),
            Some(None) => Err(DiskManagerError::PageDeallocated { file, page_no }),
            None => Err(DiskManagerError::PageNotAllocated { file, page_no }),
        }
    }

    fn write_at(&mut self, file: FileId, offset: u64, data: &[u8]) -> Result<(), DiskManagerError> {
        let mut db_io = self.file_handle(file)?;
        db_io.seek(SeekFrom::Start(offset))?;
        db_io.write_all(data)?;
        db_io.flush()?;
        Ok(())
    }

    // Fetches the open descriptor for a file, reopening it from the
    // recorded path if the pool evicted it.
    fn file_handle(&mut self, file: FileId) -> Result<&std::fs::File, DiskManagerError> {
        if self.file_descriptors.get(file).is_none() {
            let path = self
                .file_map
                .get(&file)
                .ok_or(DiskManagerError::UnknownFile(file))?;
            let handle = OpenOptions::new().read(true).write(true).open(path)?;
            self.file_descriptors.set(handle)?;
        }

        self.file_descriptors
            .get(file)
            .ok_or(DiskManagerError::UnknownFile(file))
    }
}
