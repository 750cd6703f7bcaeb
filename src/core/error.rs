//! 错误处理模块
//!
//! 定义了捕获层中使用的统一错误类型。
//!
//! 注意：拦截到的 API 调用本身永远不会因为捕获层的错误而失败，
//! 这里的错误只用于配置加载、初始化和输出端（sink）上报。
//! 内部一致性错误（重复释放、已移除句柄被复活等）直接 panic。

use std::fmt;

/// 捕获层统一的 Result 类型
pub type Result<T> = std::result::Result<T, CaptureError>;

/// 捕获层的错误类型
#[derive(Debug)]
pub enum CaptureError {
    /// 配置错误
    Config(ConfigError),

    /// IO 错误
    Io(std::io::Error),

    /// 日志系统错误
    Log(String),

    /// 初始化错误（分发表重复注入、实例创建失败等）
    Initialization(String),

    /// 输出端写入失败
    Sink(String),

    /// 写监视（write-watch）查询失败
    WriteWatch(String),
}

/// 配置相关的错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件未找到
    FileNotFound(String),

    /// 配置文件解析失败
    ParseError(String),

    /// 配置值无效
    InvalidValue { field: String, reason: String },
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Config(e) => write!(f, "Configuration error: {}", e),
            CaptureError::Io(e) => write!(f, "IO error: {}", e),
            CaptureError::Log(msg) => write!(f, "Log error: {}", msg),
            CaptureError::Initialization(msg) => write!(f, "Initialization error: {}", msg),
            CaptureError::Sink(msg) => write!(f, "Capture sink error: {}", msg),
            CaptureError::WriteWatch(msg) => write!(f, "Write watch error: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {}", path),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CaptureError::Io(e) => Some(e),
            CaptureError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::Io(err)
    }
}

impl From<ConfigError> for CaptureError {
    fn from(err: ConfigError) -> Self {
        CaptureError::Config(err)
    }
}
