//! 写监视
//!
//! 操作系统为带 `MEM_WRITE_WATCH` 的分配记录被写过的页。
//! D3D12 在堆标志里带 `ALLOW_WRITE_WATCH` 时用这种方式分配 CPU 可见内存，
//! 捕获层在 Unmap 和提交时查询脏页，只复制真正被写过的字节。

use parking_lot::Mutex;
use std::collections::BTreeSet;

use crate::core::error::Result;

/// 写监视提供者
pub trait WriteWatch: Send + Sync {
    /// 页大小（脏页粒度）
    fn page_size(&self) -> usize;

    /// 返回 `[base, base + size)` 内被写过的页起始地址（升序），并重置这些页的状态
    fn take_dirty_pages(&self, base: usize, size: usize) -> Result<Vec<usize>>;

    /// 清除 `[base, base + size)` 内的脏页状态
    fn reset(&self, base: usize, size: usize) -> Result<()>;
}

/// 软件写监视
///
/// 写入由调用方通过 `mark_written` 显式声明，
/// 用于没有操作系统写监视的平台。
#[derive(Debug)]
pub struct SoftwareWriteWatch {
    page_size: usize,
    dirty: Mutex<BTreeSet<usize>>,
}

impl Default for SoftwareWriteWatch {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl SoftwareWriteWatch {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            dirty: Mutex::new(BTreeSet::new()),
        }
    }

    fn page_of(&self, address: usize) -> usize {
        address - address % self.page_size
    }

    /// 声明 `[address, address + len)` 被写过
    pub fn mark_written(&self, address: usize, len: usize) {
        if len == 0 {
            return;
        }
        let first = self.page_of(address);
        let last = self.page_of(address + len - 1);
        let mut dirty = self.dirty.lock();
        let mut page = first;
        while page <= last {
            dirty.insert(page);
            page += self.page_size;
        }
    }

    fn pages_in(&self, base: usize, size: usize) -> (usize, usize) {
        (self.page_of(base), base + size)
    }
}

impl WriteWatch for SoftwareWriteWatch {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn take_dirty_pages(&self, base: usize, size: usize) -> Result<Vec<usize>> {
        let (first, end) = self.pages_in(base, size);
        let mut dirty = self.dirty.lock();
        let pages: Vec<usize> = dirty.range(first..end).copied().collect();
        for page in &pages {
            dirty.remove(page);
        }
        Ok(pages)
    }

    fn reset(&self, base: usize, size: usize) -> Result<()> {
        let (first, end) = self.pages_in(base, size);
        self.dirty.lock().retain(|page| *page < first || *page >= end);
        Ok(())
    }
}

#[cfg(windows)]
pub use win32::Win32WriteWatch;

#[cfg(windows)]
mod win32 {
    use std::ffi::c_void;

    use windows::Win32::System::Memory::{GetWriteWatch, ResetWriteWatch};

    use super::WriteWatch;
    use crate::core::error::{CaptureError, Result};

    const WRITE_WATCH_FLAG_RESET: u32 = 0x1;

    /// 基于 `GetWriteWatch` / `ResetWriteWatch` 的写监视
    #[derive(Debug)]
    pub struct Win32WriteWatch {
        page_size: usize,
    }

    impl Default for Win32WriteWatch {
        fn default() -> Self {
            Self { page_size: 4096 }
        }
    }

    impl Win32WriteWatch {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl WriteWatch for Win32WriteWatch {
        fn page_size(&self) -> usize {
            self.page_size
        }

        fn take_dirty_pages(&self, base: usize, size: usize) -> Result<Vec<usize>> {
            let capacity = size.div_ceil(self.page_size).max(1);
            let mut addresses: Vec<*mut c_void> = vec![std::ptr::null_mut(); capacity];
            let mut count = capacity;
            let mut granularity = 0u32;

            let status = unsafe {
                GetWriteWatch(
                    WRITE_WATCH_FLAG_RESET,
                    base as *const c_void,
                    size,
                    Some(addresses.as_mut_ptr()),
                    &mut count,
                    &mut granularity,
                )
            };
            if status != 0 {
                return Err(CaptureError::WriteWatch(format!(
                    "GetWriteWatch failed for {:#x} ({} bytes)",
                    base, size
                )));
            }

            addresses.truncate(count);
            Ok(addresses.into_iter().map(|page| page as usize).collect())
        }

        fn reset(&self, base: usize, size: usize) -> Result<()> {
            let status = unsafe { ResetWriteWatch(base as *const c_void, size) };
            if status != 0 {
                return Err(CaptureError::WriteWatch(format!(
                    "ResetWriteWatch failed for {:#x} ({} bytes)",
                    base, size
                )));
            }
            Ok(())
        }
    }
}
