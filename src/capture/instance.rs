//! 捕获实例
//!
//! 安装拦截的组件持有一个 `CaptureInstance`，每次加载拦截层时 `create_instance`，
//! 卸载时 `destroy_instance`。管理器只在第一次创建时构造，计数归零时拆除。

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use super::manager::CaptureManager;
use crate::core::error::Result;
use crate::core::log;

#[derive(Default)]
struct InstanceState {
    ref_count: u32,
    manager: Option<Arc<CaptureManager>>,
}

/// 引用计数的捕获上下文
#[derive(Default)]
pub struct CaptureInstance {
    state: Mutex<InstanceState>,
}

impl CaptureInstance {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取（必要时构造）捕获管理器
    ///
    /// # 参数
    ///
    /// * `init` - 只在第一次调用时执行的构造函数
    ///
    /// # 返回值
    ///
    /// 构造失败时返回错误，计数不变
    pub fn create_instance<F>(&self, init: F) -> Result<Arc<CaptureManager>>
    where
        F: FnOnce() -> Result<CaptureManager>,
    {
        let mut state = self.state.lock();
        let manager = match &state.manager {
            Some(manager) => manager.clone(),
            None => {
                let manager = match init() {
                    Ok(manager) => Arc::new(manager),
                    Err(e) => {
                        crate::capture_error!("Failed to create capture manager: {}", e);
                        return Err(e);
                    }
                };

                let logging = &manager.settings().logging;
                let log_file = Some(logging.log_file.as_str());
                if let Err(e) = log::init_logger(logging.level, logging.file_output, log_file) {
                    // 宿主已安装 subscriber 时沿用宿主的
                    debug!("Logger not installed: {}", e);
                }
                crate::capture_info!("Capture instance created");
                state.manager = Some(manager.clone());
                manager
            }
        };
        state.ref_count += 1;
        debug!(ref_count = state.ref_count, "Capture instance acquired");
        Ok(manager)
    }

    /// 释放一次引用，归零时拆除管理器；计数已为零时什么也不做
    pub fn destroy_instance(&self) {
        let mut state = self.state.lock();
        if state.ref_count == 0 {
            return;
        }

        state.ref_count -= 1;
        debug!(ref_count = state.ref_count, "Capture instance released");
        if state.ref_count == 0 {
            if let Some(manager) = state.manager.take() {
                manager.shutdown();
            }
            crate::capture_info!("Capture instance destroyed");
        }
    }

    pub fn get(&self) -> Option<Arc<CaptureManager>> {
        self.state.lock().manager.clone()
    }

    pub fn ref_count(&self) -> u32 {
        self.state.lock().ref_count
    }
}
