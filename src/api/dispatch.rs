//! 原生入口函数表
//!
//! 宿主在加载真正的 d3d12.dll / dxgi.dll 后把入口函数注入捕获管理器，
//! 捕获层需要主动调用原生 API 时（启用调试层、创建带调试标志的工厂）只通过这里。
//! 每张表只能注入一次。

use std::fmt;
use std::sync::Arc;

use super::native::NativeObject;
use super::types::{Guid, HResult};

/// 原生调用结果：成功时返回新创建的对象（已持有一个引用）
pub type NativeResult = std::result::Result<Box<dyn NativeObject>, HResult>;

/// `D3D12GetDebugInterface(riid, ppvDebug)`
pub type GetDebugInterfaceFn = Arc<dyn Fn(&Guid) -> NativeResult + Send + Sync>;

/// `CreateDXGIFactory2(Flags, riid, ppFactory)`
pub type CreateDxgiFactory2Fn = Arc<dyn Fn(u32, &Guid) -> NativeResult + Send + Sync>;

/// IID_ID3D12Debug
pub const IID_ID3D12_DEBUG: Guid = Guid::from_u128(0x344488b7_6846_474b_b989_f027448245e0);

/// IID_ID3D12DeviceRemovedExtendedDataSettings
pub const IID_ID3D12_DEVICE_REMOVED_EXTENDED_DATA_SETTINGS: Guid =
    Guid::from_u128(0x82bc481c_6b9b_4030_aedb_7ee3d1df1e63);

/// IID_IDXGIFactory4
pub const IID_IDXGI_FACTORY4: Guid = Guid::from_u128(0x1bc6ea02_ef36_464f_bf0c_21ca39e5168a);

/// d3d12.dll 入口
#[derive(Clone, Default)]
pub struct D3D12DispatchTable {
    pub get_debug_interface: Option<GetDebugInterfaceFn>,
}

/// dxgi.dll 入口
#[derive(Clone, Default)]
pub struct DxgiDispatchTable {
    pub create_dxgi_factory2: Option<CreateDxgiFactory2Fn>,
}

impl fmt::Debug for D3D12DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("D3D12DispatchTable")
            .field("get_debug_interface", &self.get_debug_interface.is_some())
            .finish()
    }
}

impl fmt::Debug for DxgiDispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DxgiDispatchTable")
            .field("create_dxgi_factory2", &self.create_dxgi_factory2.is_some())
            .finish()
    }
}
