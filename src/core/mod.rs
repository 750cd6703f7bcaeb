//! 核心功能模块
//!
//! 捕获层的基础设施：日志、配置和错误处理。
//! 这些模块与具体的拦截机制和输出格式无关。
//!
//! - `log`：日志系统，基于 `tracing`
//! - `config`：捕获设置，从 TOML 文件加载
//! - `error`：错误处理，定义统一的错误类型

pub mod config;
pub mod error;
pub mod log;

pub use config::{CaptureSettings, MemoryTrackingMode, TrimRange};
pub use error::{CaptureError, ConfigError, Result};
