//! 配置管理模块
//!
//! 提供捕获层设置的加载、解析和验证功能。
//! 设置从 TOML 文件加载，缺失的字段使用默认值。
//!
//! # 配置文件格式 (capture.toml)
//!
//! ```toml
//! [capture]
//! capture_file = "dx12_capture.gfxr"
//! trim_frames = [{ first = 100, total = 10 }]
//! screenshot_frames = [105]
//!
//! [memory]
//! tracking_mode = "page_guard"  # assisted, unassisted, page_guard
//! use_write_watch = true
//!
//! [debug]
//! debug_layer = false
//! debug_device_lost = false
//!
//! [logging]
//! level = "info"      # trace, debug, info, warn, error
//! file_output = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::{ConfigError, Result};
use crate::format::CaptureMode;

/// 捕获层设置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// 捕获配置
    #[serde(default)]
    pub capture: CaptureConfig,

    /// 映射内存跟踪配置
    #[serde(default)]
    pub memory: MemoryConfig,

    /// 调试层配置
    #[serde(default)]
    pub debug: DebugConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 捕获配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// 捕获文件路径（交给输出端使用）
    #[serde(default = "default_capture_file")]
    pub capture_file: String,

    /// 裁剪范围；为空表示从第一次调用开始完整捕获
    #[serde(default)]
    pub trim_frames: Vec<TrimRange>,

    /// 需要截图的帧号（从 1 开始）
    #[serde(default)]
    pub screenshot_frames: Vec<u32>,
}

/// 裁剪范围
///
/// `first` 从 1 开始计数，`total` 为捕获的帧数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimRange {
    pub first: u32,
    pub total: u32,
}

impl TrimRange {
    /// 范围之后的第一帧
    pub fn end(&self) -> u32 {
        self.first.saturating_add(self.total)
    }

    pub fn contains(&self, frame: u32) -> bool {
        frame >= self.first && frame < self.end()
    }
}

/// 映射内存跟踪配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// 跟踪模式
    #[serde(default = "default_tracking_mode")]
    pub tracking_mode: MemoryTrackingMode,

    /// page_guard 模式下是否使用操作系统的写监视功能
    #[serde(default = "default_use_write_watch")]
    pub use_write_watch: bool,
}

/// 映射内存跟踪模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTrackingMode {
    /// 只在 Unmap 时捕获应用声明的写入范围
    Assisted,
    /// 每次提交前完整捕获所有仍处于映射状态的资源
    Unassisted,
    /// 使用写监视只捕获被写过的页
    PageGuard,
}

/// 调试层配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugConfig {
    /// 在设备创建前启用 D3D12 调试层
    #[serde(default)]
    pub debug_layer: bool,

    /// 启用 DRED（设备移除扩展数据）
    #[serde(default)]
    pub debug_device_lost: bool,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default = "default_file_output")]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

// 默认值函数
fn default_capture_file() -> String { "dx12_capture.gfxr".to_string() }
fn default_tracking_mode() -> MemoryTrackingMode { MemoryTrackingMode::PageGuard }
fn default_use_write_watch() -> bool { true }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_file_output() -> bool { false }
fn default_log_file() -> String { "dx12_capture.log".to_string() }

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            capture_file: default_capture_file(),
            trim_frames: Vec::new(),
            screenshot_frames: Vec::new(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            tracking_mode: default_tracking_mode(),
            use_write_watch: default_use_write_watch(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: default_file_output(),
            log_file: default_log_file(),
        }
    }
}

impl CaptureSettings {
    /// 从配置文件加载
    ///
    /// # 参数
    ///
    /// * `path` - 配置文件路径
    ///
    /// # 返回值
    ///
    /// 成功返回 `CaptureSettings` 实例，失败返回错误
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path_str.clone()))?;

        Self::from_str(&contents)
    }

    /// 从 TOML 字符串解析
    pub fn from_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，如果文件不存在或无法解析则使用默认配置
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// 验证配置的有效性
    ///
    /// 裁剪范围必须从第 1 帧或之后开始、长度大于 0，并且按顺序互不重叠。
    pub fn validate(&self) -> Result<()> {
        let mut previous_end = 0u32;
        for range in &self.capture.trim_frames {
            if range.first == 0 || range.total == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "capture.trim_frames".to_string(),
                    reason: "first and total must both be greater than 0".to_string(),
                }
                .into());
            }
            if range.first < previous_end {
                return Err(ConfigError::InvalidValue {
                    field: "capture.trim_frames".to_string(),
                    reason: "ranges must be sorted and must not overlap".to_string(),
                }
                .into());
            }
            previous_end = range.end();
        }

        if self.capture.screenshot_frames.iter().any(|&frame| frame == 0) {
            return Err(ConfigError::InvalidValue {
                field: "capture.screenshot_frames".to_string(),
                reason: "frame numbers start at 1".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// 根据裁剪设置计算初始捕获模式
    ///
    /// - 无裁剪：只写入
    /// - 裁剪从第 1 帧开始：写入 + 状态跟踪
    /// - 裁剪从之后的帧开始：只跟踪，等待裁剪窗口打开
    pub fn initial_capture_mode(&self) -> CaptureMode {
        match self.capture.trim_frames.first() {
            None => CaptureMode::WRITE,
            Some(range) if range.first <= 1 => CaptureMode::WRITE | CaptureMode::TRACK,
            Some(_) => CaptureMode::TRACK,
        }
    }

    /// 是否启用裁剪
    pub fn trim_enabled(&self) -> bool {
        !self.capture.trim_frames.is_empty()
    }
}
