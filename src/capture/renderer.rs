//! 截图渲染协作者

use std::sync::Arc;

use crate::api::types::SwapChainDesc;
use crate::format::HandleId;
use crate::wrapper::Wrapper;

/// 一次截图请求
#[derive(Debug, Clone)]
pub struct FrameCaptureRequest {
    /// 帧号（从 1 开始）
    pub frame: u32,
    pub swap_chain: HandleId,
    pub back_buffer: Arc<Wrapper>,
    /// 交换链的呈现队列
    pub queue: Option<Arc<Wrapper>>,
    pub desc: SwapChainDesc,
}

/// 截图渲染器
///
/// 在呈现之后被调用，调用方不等待结果。
pub trait FrameRenderer: Send + Sync {
    fn capture_frame(&self, request: FrameCaptureRequest);
}
