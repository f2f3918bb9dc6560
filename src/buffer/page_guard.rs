use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::PAGE_SIZE;

use super::Frame;

/// Invoked when a guard drops; receives whether the page was dirtied.
pub(crate) type ReleaseFn = Box<dyn FnOnce(bool) + Send>;

/// RAII guard for shared access to a page. Dropping the guard unpins
/// the page.
pub struct ReadPageGuard {
    release: Option<ReleaseFn>,
    /// Keeps the frame alive for the transmuted lock guard below.
    _frame: Arc<Frame>,
    data_guard: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>,
}

impl ReadPageGuard {
    /// # Safety
    /// The frame must stay alive for the guard's lifetime; the Arc
    /// held alongside the transmuted lock guard ensures this.
    pub(crate) unsafe fn new(frame: Arc<Frame>, release: ReleaseFn) -> Self {
        let data_guard = frame.data.read();
        let data_guard: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);
        Self {
            release: Some(release),
            _frame: frame,
            data_guard,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard[..]
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(false);
        }
    }
}

/// RAII guard for exclusive access to a page. Mutable access marks the
/// page dirty; dropping the guard unpins it and reports dirtiness.
pub struct WritePageGuard {
    release: Option<ReleaseFn>,
    dirtied: bool,
    _frame: Arc<Frame>,
    data_guard: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl WritePageGuard {
    /// # Safety
    /// Same contract as [`ReadPageGuard::new`].
    pub(crate) unsafe fn new(frame: Arc<Frame>, release: ReleaseFn) -> Self {
        let data_guard = frame.data.write();
        let data_guard: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);
        Self {
            release: Some(release),
            dirtied: false,
            _frame: frame,
            data_guard: Some(data_guard),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.dirtied = true;
        &mut self.data_guard.as_mut().unwrap()[..]
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        // Release the data lock before unpinning
        self.data_guard.take();
        if let Some(release) = self.release.take() {
            release(self.dirtied);
        }
    }
}
