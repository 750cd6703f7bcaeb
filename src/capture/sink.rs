//! 捕获输出端
//!
//! 输出端负责文件格式和 I/O。捕获层只按顺序交给它调用记录、
//! 映射内存数据、裁剪起点快照和帧标记。写入失败由管理器记录日志，
//! 不会影响被拦截的调用。

use parking_lot::Mutex;

use crate::core::error::Result;
use crate::format::{ApiCallId, HandleId, ThreadId};
use crate::memory::DirtyRegion;
use crate::state::StateSnapshot;

/// 一次被捕获的调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub call_id: ApiCallId,
    pub thread_id: ThreadId,
    /// 本线程的调用序号
    pub sequence: u64,
    /// 方法调用所在的对象；全局函数为 `None`
    pub object_id: Option<HandleId>,
    pub parameters: Vec<u8>,
}

/// 捕获输出端
pub trait CaptureSink: Send + Sync {
    fn write_call(&self, call: &CallRecord) -> Result<()>;

    fn write_fill_memory(&self, thread_id: ThreadId, region: &DirtyRegion) -> Result<()>;

    fn write_state(&self, snapshot: &StateSnapshot) -> Result<()>;

    fn write_frame_marker(&self, frame: u32) -> Result<()>;
}

/// 输出事件
#[derive(Debug, Clone)]
pub enum SinkEvent {
    Call(CallRecord),
    FillMemory {
        thread_id: ThreadId,
        region: DirtyRegion,
    },
    State(StateSnapshot),
    FrameMarker(u32),
}

/// 把所有事件保存在内存里的输出端
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Call(call) => Some(call.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn fill_memory(&self) -> Vec<DirtyRegion> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                SinkEvent::FillMemory { region, .. } => Some(region.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn snapshots(&self) -> Vec<StateSnapshot> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                SinkEvent::State(snapshot) => Some(snapshot.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl CaptureSink for RecordingSink {
    fn write_call(&self, call: &CallRecord) -> Result<()> {
        self.events.lock().push(SinkEvent::Call(call.clone()));
        Ok(())
    }

    fn write_fill_memory(&self, thread_id: ThreadId, region: &DirtyRegion) -> Result<()> {
        self.events.lock().push(SinkEvent::FillMemory {
            thread_id,
            region: region.clone(),
        });
        Ok(())
    }

    fn write_state(&self, snapshot: &StateSnapshot) -> Result<()> {
        self.events.lock().push(SinkEvent::State(snapshot.clone()));
        Ok(())
    }

    fn write_frame_marker(&self, frame: u32) -> Result<()> {
        self.events.lock().push(SinkEvent::FrameMarker(frame));
        Ok(())
    }
}
