//! dx12_capture - Direct3D 12 捕获核心
//!
//! 拦截层把每一次 D3D12 / DXGI 调用交给捕获管理器：
//! 原生对象被包装为带句柄的包装对象，调用参数被编码后写入捕获输出，
//! 映射内存的 CPU 写入在提交前以填充记录的形式补上，
//! 裁剪捕获时由状态跟踪器在起点帧写出完整的对象状态快照。
//!
//! # 模块结构
//!
//! - `core`: 日志、配置和错误处理
//! - `format`: 调用编号、句柄和参数编码
//! - `api`: D3D12 数据类型和原生对象抽象
//! - `wrapper`: 包装对象、注册表和虚拟描述符句柄
//! - `memory`: 映射内存写入跟踪
//! - `state`: 状态跟踪器和命令列表记录
//! - `capture`: 捕获管理器、调用钩子和捕获实例
//!
//! # 使用示例
//!
//! ```no_run
//! use std::sync::Arc;
//! use dx12_capture::capture::{CaptureManager, RecordingSink};
//! use dx12_capture::core::CaptureSettings;
//!
//! let settings = CaptureSettings::from_file_or_default("capture.toml");
//! let manager = CaptureManager::new(settings, Arc::new(RecordingSink::new())).unwrap();
//! assert_eq!(manager.current_frame(), 1);
//! ```

pub mod api;
pub mod capture;
pub mod core;
pub mod format;
pub mod memory;
pub mod state;
pub mod wrapper;

#[cfg(test)]
mod testing;
