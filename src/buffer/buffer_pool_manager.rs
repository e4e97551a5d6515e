use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::{
    buffer::{
        frame::{FrameDesc, FrameId},
        page_table::{PageTable, PageTableError},
    },
    storage::{
        disk::manager::{DiskManager, DiskManagerError, FileId},
        page::page::{Page, PageId},
    },
};

// Handle to a resident page. The lock guards the bytes; the pin count in
// the frame descriptor guards the frame's identity. A handle is only good
// until its matching unpin_page: once the pin is released the frame may be
// evicted and reloaded with a different page.
pub type PageRef = Arc<RwLock<Page>>;

#[derive(Debug, Error)]
pub enum BufferPoolError {
    #[error("all buffer frames are pinned")]
    BufferExceeded,
    #[error("page {page_no} is not pinned")]
    PageNotPinned { page_no: PageId },
    #[error("page {page_no} is pinned")]
    PagePinned { page_no: PageId },
    #[error("invalid frame {frame_no} still carries a file identity")]
    BadBuffer { frame_no: FrameId },
    #[error(transparent)]
    Disk(#[from] DiskManagerError),
    #[error(transparent)]
    PageTable(#[from] PageTableError),
}

/// Bounded cache of page frames sitting between heap files / indexes and
/// the disk manager. Frames are handed out pinned; callers release them
/// with `unpin_page`, flagging any mutation so the frame is written back
/// before its slot is reused. Victim selection is clock second-chance and
/// only ever lands on unpinned frames.
pub struct BufMgr {
    num_bufs: usize,
    pool: Vec<PageRef>,
    pub(crate) descriptors: Vec<FrameDesc>,
    pub(crate) page_table: PageTable,
    pub(crate) clock_hand: usize,
    pub(crate) disk: DiskManager,
}

impl BufMgr {
    pub fn new(num_bufs: usize, disk: DiskManager) -> Self {
        assert!(num_bufs > 0, "buffer pool needs at least one frame");

        BufMgr {
            num_bufs,
            pool: (0..num_bufs)
                .map(|_| Arc::new(RwLock::new(Page::new(0))))
                .collect(),
            descriptors: (0..num_bufs).map(FrameDesc::new).collect(),
            page_table: PageTable::new(num_bufs),
            // One step before frame 0, so the first sweep starts there.
            clock_hand: num_bufs - 1,
            disk,
        }
    }

    pub fn create_file(&mut self) -> Result<FileId, BufferPoolError> {
        Ok(self.disk.create_file()?)
    }

    pub fn disk(&self) -> &DiskManager {
        &self.disk
    }

    /// Pins the page and returns a handle to its bytes, loading it from
    /// disk if no frame holds it yet.
    pub fn read_page(&mut self, file: FileId, page_no: PageId) -> Result<PageRef, BufferPoolError> {
        match self.page_table.lookup(file, page_no) {
            Some(frame_no) => {
                let desc = &mut self.descriptors[frame_no];
                desc.refbit = true;
                desc.pin_cnt += 1;
                trace!(file, page_no, frame_no, "buffer pool hit");
                Ok(Arc::clone(&self.pool[frame_no]))
            }
            None => {
                debug!(file, page_no, "buffer pool miss, loading from disk");
                let frame_no = self.alloc_buf()?;
                {
                    let mut slot = self.pool[frame_no].write().unwrap();
                    *slot = Page::new(page_no);
                    self.disk.read_page(file, page_no, &mut slot.data)?;
                }
                self.page_table.insert(file, page_no, frame_no)?;
                self.descriptors[frame_no].set(file, page_no);
                Ok(Arc::clone(&self.pool[frame_no]))
            }
        }
    }

    /// Releases one pin. A dirty flag is recorded before the pin count is
    /// checked, so the caller's intent survives an erroneous over-unpin.
    /// Unpinning a page that is not resident is a silent no-op.
    pub fn unpin_page(
        &mut self,
        file: FileId,
        page_no: PageId,
        dirty: bool,
    ) -> Result<(), BufferPoolError> {
        let Some(frame_no) = self.page_table.lookup(file, page_no) else {
            return Ok(());
        };

        let desc = &mut self.descriptors[frame_no];
        if dirty {
            desc.dirty = true;
        }
        if desc.pin_cnt == 0 {
            return Err(BufferPoolError::PageNotPinned { page_no });
        }
        desc.pin_cnt -= 1;
        Ok(())
    }

    /// Allocates a new page in the file and pins it into a frame. The file
    /// assigns the page number.
    pub fn alloc_page(&mut self, file: FileId) -> Result<(PageId, PageRef), BufferPoolError> {
        let frame_no = self.alloc_buf()?;
        let page_no = self.disk.allocate_page(file)?;

        {
            let mut slot = self.pool[frame_no].write().unwrap();
            *slot = Page::new(page_no);
        }
        self.page_table.insert(file, page_no, frame_no)?;
        self.descriptors[frame_no].set(file, page_no);

        debug!(file, page_no, frame_no, "allocated new page");
        Ok((page_no, Arc::clone(&self.pool[frame_no])))
    }

    /// Drops the page from the pool and deletes it from the file. Fails
    /// with `PagePinned` if a caller still holds it.
    pub fn dispose_page(&mut self, file: FileId, page_no: PageId) -> Result<(), BufferPoolError> {
        if let Some(frame_no) = self.page_table.lookup(file, page_no) {
            if self.descriptors[frame_no].pin_cnt > 0 {
                return Err(BufferPoolError::PagePinned { page_no });
            }
            self.page_table.remove(file, page_no)?;
            self.descriptors[frame_no].clear();
        }

        self.disk.delete_page(file, page_no)?;
        debug!(file, page_no, "disposed page");
        Ok(())
    }

    /// Writes back every dirty frame of the file and drops all of the
    /// file's pages from the pool. Fails with `PagePinned` on a pinned
    /// frame and `BadBuffer` on an invalid descriptor that still carries
    /// the file; frames processed before the failure stay processed.
    pub fn flush_file(&mut self, file: FileId) -> Result<(), BufferPoolError> {
        for frame_no in 0..self.num_bufs {
            let desc = &self.descriptors[frame_no];
            if desc.file != Some(file) {
                continue;
            }
            if !desc.valid {
                return Err(BufferPoolError::BadBuffer { frame_no });
            }
            if desc.pin_cnt > 0 {
                return Err(BufferPoolError::PagePinned {
                    page_no: desc.page_no,
                });
            }

            let page_no = desc.page_no;
            if desc.dirty {
                let page = self.pool[frame_no].read().unwrap();
                self.disk.write_page(file, page_no, &page.data)?;
                drop(page);
                self.descriptors[frame_no].dirty = false;
                debug!(file, page_no, "wrote back dirty page");
            }

            self.page_table.remove(file, page_no)?;
            self.descriptors[frame_no].clear();
        }
        Ok(())
    }

    // Clock second-chance victim selection. Walks the descriptor table,
    // clearing refbits as it goes; a frame is taken when it is invalid, or
    // unpinned with its refbit already clear. A full revolution that saw
    // no unpinned frame means every frame is pinned. Pins observed on one
    // lap are re-examined on the next, so at most two revolutions plus one
    // step are ever taken.
    fn alloc_buf(&mut self) -> Result<FrameId, BufferPoolError> {
        let start = self.clock_hand;
        let mut unpinned_frame_exists = false;

        loop {
            self.advance_clock();
            let hand = self.clock_hand;

            if hand == start {
                if !unpinned_frame_exists {
                    return Err(BufferPoolError::BufferExceeded);
                }
                unpinned_frame_exists = false;
            }

            let cur = &mut self.descriptors[hand];
            if cur.pin_cnt == 0 {
                unpinned_frame_exists = true;
            }

            if !cur.valid {
                cur.clear();
                return Ok(hand);
            }
            if cur.refbit {
                cur.refbit = false;
                continue;
            }
            if cur.pin_cnt > 0 {
                continue;
            }

            let Some(file) = cur.file else {
                return Err(BufferPoolError::BadBuffer { frame_no: hand });
            };
            let page_no = cur.page_no;

            if cur.dirty {
                let page = self.pool[hand].read().unwrap();
                self.disk.write_page(file, page_no, &page.data)?;
                drop(page);
                cur.dirty = false;
                trace!(file, page_no, frame_no = hand, "wrote back dirty victim");
            }

            self.page_table.remove(file, page_no)?;
            cur.clear();
            trace!(file, page_no, frame_no = hand, "evicted page");
            return Ok(hand);
        }
    }

    fn advance_clock(&mut self) {
        self.clock_hand = (self.clock_hand + 1) % self.num_bufs;
    }

    // Diagnostic dump of the descriptor table.
    pub fn print_self(&self) {
        let mut valid_frames = 0;
        for desc in &self.descriptors {
            println!("{desc}");
            if desc.valid {
                valid_frames += 1;
            }
        }
        println!("total valid frames: {valid_frames}");
    }
}

impl Drop for BufMgr {
    // Teardown writes every dirty frame back to its file, pinned or not.
    // Quiescing activity first is the caller's job; a failed write here is
    // logged rather than panicked.
    fn drop(&mut self) {
        for frame_no in 0..self.num_bufs {
            let desc = &self.descriptors[frame_no];
            if !desc.valid || !desc.dirty {
                continue;
            }
            let Some(file) = desc.file else { continue };
            let page_no = desc.page_no;

            let page = self.pool[frame_no].read().unwrap();
            if let Err(err) = self.disk.write_page(file, page_no, &page.data) {
                warn!(file, page_no, %err, "failed to write back dirty page on teardown");
            }
        }
    }
}
