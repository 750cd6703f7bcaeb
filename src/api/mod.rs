//! 原生 API 接口层
//!
//! - `types`：D3D12 / DXGI 参数类型
//! - `native`：原生对象及其能力 trait
//! - `dispatch`：注入的原生入口函数表

pub mod dispatch;
pub mod native;
pub mod types;

pub use dispatch::{D3D12DispatchTable, DxgiDispatchTable};
pub use native::{
    NativeDebug, NativeDescriptorHeap, NativeDevice, NativeDredSettings, NativeObject,
    NativeSwapChain,
};
pub use types::HResult;
