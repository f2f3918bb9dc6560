use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::common::{FrameId, PageId, PAGE_SIZE};

/// Pin count and dirty flag share one atomic word so that a guard
/// release can drop its pin, record dirt, and learn whether the frame
/// just became idle in a single update. The low half counts pins;
/// this bit records dirt.
const DIRTY_FLAG: u64 = 1 << 32;
const PIN_MASK: u64 = DIRTY_FLAG - 1;

/// One buffer frame: the cached page bytes plus the bookkeeping the
/// pool needs to decide residency and eviction.
pub struct Frame {
    frame_id: FrameId,
    /// The page currently cached here, if any
    page_id: RwLock<Option<PageId>>,
    /// Packed pin count + dirty flag
    state: AtomicU64,
    /// The page contents (pub(crate) for guard access)
    pub(crate) data: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl Frame {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: RwLock::new(None),
            state: AtomicU64::new(0),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn page_id(&self) -> Option<PageId> {
        *self.page_id.read()
    }

    pub fn set_page_id(&self, page_id: Option<PageId>) {
        *self.page_id.write() = page_id;
    }

    /// Takes one pin. The frame must not be handed to the replacer
    /// while any pin is outstanding.
    pub fn pin(&self) {
        self.state.fetch_add(1, Ordering::AcqRel);
    }

    /// Drops one pin, folding in whether the releasing guard wrote to
    /// the page. Returns true when this release left the frame idle,
    /// at which point the caller may offer it for eviction.
    pub fn release(&self, dirty: bool) -> bool {
        let flag = if dirty { DIRTY_FLAG } else { 0 };
        let mut observed = self.state.load(Ordering::Relaxed);
        loop {
            let pins = observed & PIN_MASK;
            debug_assert!(pins > 0, "release without a matching pin");
            let next = if pins == 0 {
                observed | flag
            } else {
                (observed | flag) - 1
            };
            match self.state.compare_exchange_weak(
                observed,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return pins == 1,
                Err(seen) => observed = seen,
            }
        }
    }

    pub fn pin_count(&self) -> u32 {
        (self.state.load(Ordering::Acquire) & PIN_MASK) as u32
    }

    pub fn is_dirty(&self) -> bool {
        self.state.load(Ordering::Acquire) & DIRTY_FLAG != 0
    }

    /// Drops the dirty flag once the page has been written back.
    pub fn clear_dirty(&self) {
        self.state.fetch_and(!DIRTY_FLAG, Ordering::AcqRel);
    }

    pub fn copy_from(&self, data: &[u8]) {
        assert_eq!(data.len(), PAGE_SIZE);
        self.data.write().copy_from_slice(data);
    }

    pub fn copy_to(&self, data: &mut [u8]) {
        assert_eq!(data.len(), PAGE_SIZE);
        data.copy_from_slice(&**self.data.read());
    }

    /// Returns the frame to its empty state: no page, no pins, clean,
    /// zeroed bytes.
    pub fn reset(&self) {
        *self.page_id.write() = None;
        self.state.store(0, Ordering::Release);
        self.data.write().fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::FileId;

    #[test]
    fn test_release_reports_idle_only_at_zero() {
        let frame = Frame::new(FrameId::new(0));
        frame.pin();
        frame.pin();
        assert_eq!(frame.pin_count(), 2);

        assert!(!frame.release(false));
        assert!(frame.release(false));
        assert_eq!(frame.pin_count(), 0);
    }

    #[test]
    fn test_release_folds_dirty_flag() {
        let frame = Frame::new(FrameId::new(0));
        frame.pin();
        frame.pin();

        // One clean release, one dirty: the dirt sticks
        frame.release(false);
        assert!(!frame.is_dirty());
        frame.release(true);
        assert!(frame.is_dirty());

        frame.clear_dirty();
        assert!(!frame.is_dirty());
        // Clearing dirt leaves the pin count alone
        assert_eq!(frame.pin_count(), 0);
    }

    #[test]
    fn test_clear_dirty_keeps_pins() {
        let frame = Frame::new(FrameId::new(2));
        frame.pin();
        frame.release(true);
        frame.pin();
        frame.clear_dirty();
        assert_eq!(frame.pin_count(), 1);
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_reset_clears_everything() {
        let frame = Frame::new(FrameId::new(3));
        frame.set_page_id(Some(PageId::new(FileId::new(1), 9)));
        frame.pin();
        frame.release(true);
        frame.copy_from(&[5u8; PAGE_SIZE]);

        frame.reset();

        assert_eq!(frame.page_id(), None);
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
        let mut out = [1u8; PAGE_SIZE];
        frame.copy_to(&mut out);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_concurrent_pins_balance_out() {
        use std::sync::Arc;

        let frame = Arc::new(Frame::new(FrameId::new(4)));
        let mut handles = Vec::new();
        for i in 0..4 {
            let frame = frame.clone();
            handles.push(std::thread::spawn(move || {
                let mut idle_seen = 0;
                for _ in 0..1000 {
                    frame.pin();
                    if frame.release(i == 0) {
                        idle_seen += 1;
                    }
                }
                idle_seen
            }));
        }
        let total: i32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert!(total > 0);
        assert_eq!(frame.pin_count(), 0);
        assert!(frame.is_dirty());
    }
}
