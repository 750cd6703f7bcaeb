//! 捕获层
//!
//! - `instance`: 引用计数的捕获上下文
//! - `manager`: 捕获管理器和通用调用捕获流程
//! - `hooks`: 各 API 家族的 pre/post 钩子
//! - `thread`: 每线程调用深度和参数缓冲区
//! - `sink` / `renderer`: 输出端和截图协作者

pub mod hooks;
pub mod instance;
pub mod manager;
pub mod renderer;
pub mod sink;
pub mod thread;

pub use hooks::DescriptorRange;
pub use instance::CaptureInstance;
pub use manager::CaptureManager;
pub use renderer::{FrameCaptureRequest, FrameRenderer};
pub use sink::{CallRecord, CaptureSink, RecordingSink, SinkEvent};
pub use thread::{CallScope, ThreadData, ThreadRegistry};
