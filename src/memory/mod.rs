//! 映射内存跟踪
//!
//! - `write_watch`：写监视提供者（Win32 实现和软件实现）
//! - `tracker`：写监视资格判断、映射集合和脏数据计算

pub mod tracker;
pub mod write_watch;

pub use tracker::{
    DirtyRegion, HeapRequest, MemoryTracker, WriteWatchDiagnostic, WriteWatchIgnoreReason,
};
#[cfg(windows)]
pub use write_watch::Win32WriteWatch;
pub use write_watch::{SoftwareWriteWatch, WriteWatch};

use std::sync::Arc;

/// 当前平台的默认写监视提供者
pub fn platform_write_watch() -> Arc<dyn WriteWatch> {
    #[cfg(windows)]
    {
        Arc::new(Win32WriteWatch::new())
    }
    #[cfg(not(windows))]
    {
        Arc::new(SoftwareWriteWatch::default())
    }
}
