//! 状态跟踪
//!
//! - `tracker`：存活对象表、释放时间线和命令列表日志
//! - `command`：命令列表上记录的状态相关调用
//! - `snapshot`：裁剪起点快照

pub mod command;
pub mod snapshot;
pub mod tracker;

pub use command::{
    CommandKind, CommandRecord, ResourceBarrier, StateChange, StateExtractor, TrackedCommand,
};
pub use snapshot::{
    CommandLogRecord, DebugLayerRecord, DredRecord, ObjectRecord, ObjectStateRecord,
    ProcessState, ReleaseEvent, StateSnapshot,
};
pub use tracker::StateTracker;
