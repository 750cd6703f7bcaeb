//! 按 API 家族划分的钩子
//!
//! 宿主对每个被拦截的调用按顺序执行：
//! `begin_*_call_capture` → 写入参数 → `pre_process_*`（若有）→ 转发 → `post_process_*`。
//! 没有专门钩子的调用直接以 `end_method_call_capture` 结束。

mod debug;
mod device;
mod queue;
mod resource;
mod swapchain;

pub use device::DescriptorRange;
