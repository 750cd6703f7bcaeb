//! 日志系统模块
//!
//! 基于 `tracing` 提供结构化的日志记录功能。
//!
//! 捕获层运行在宿主应用的进程内，宿主可能已经安装了自己的 subscriber，
//! 所以这里使用 `try_init`，安装失败时返回错误而不是 panic。
//!
//! # 使用示例
//!
//! ```no_run
//! use dx12_capture::core::log;
//! use dx12_capture::core::config::LogLevel;
//!
//! log::init_logger(LogLevel::Info, false, None).ok();
//! tracing::info!(frame = 1, "Capture started");
//! ```

use std::path::Path;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use super::config::LogLevel;
use super::error::{CaptureError, Result};

/// 初始化日志系统
///
/// # 参数
///
/// * `level` - 日志级别
/// * `file_output` - 是否输出到文件
/// * `log_file_path` - 日志文件路径（可选，默认为 "dx12_capture.log"）
pub fn init_logger(level: LogLevel, file_output: bool, log_file_path: Option<&str>) -> Result<()> {
    let filter = EnvFilter::new(filter_directive(level));

    let result = if file_output {
        let log_path = log_file_path.unwrap_or("dx12_capture.log");
        let path = Path::new(log_path);
        let directory = path.parent().unwrap_or(Path::new("."));
        let filename = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("dx12_capture.log");

        let file_appender = RollingFileAppender::new(Rotation::DAILY, directory, filename);

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(true);

        let file_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(true);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
    };

    result.map_err(|e| CaptureError::Log(e.to_string()))
}

fn filter_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

/// 捕获层生命周期日志 - Info 级别
#[macro_export]
macro_rules! capture_info {
    ($($arg:tt)*) => {
        tracing::info!(target: "dx12_capture::capture", $($arg)*)
    };
}

/// 捕获层生命周期日志 - Warn 级别
#[macro_export]
macro_rules! capture_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "dx12_capture::capture", $($arg)*)
    };
}

/// 捕获层生命周期日志 - Error 级别
#[macro_export]
macro_rules! capture_error {
    ($($arg:tt)*) => {
        tracing::error!(target: "dx12_capture::capture", $($arg)*)
    };
}

/// 日志级别转换
impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}
