//! 捕获格式中的基础标识类型
//!
//! 这里只定义捕获层与输出端之间共享的标识符（句柄、线程、调用编号）
//! 和捕获模式，不涉及具体的字节布局。

pub mod encoder;

use serde::Serialize;

pub use encoder::{Encode, ParameterEncoder};

/// 包装对象的稳定句柄
pub type HandleId = u64;

/// 空句柄
pub const NULL_HANDLE_ID: HandleId = 0;

/// 捕获层分配的线程编号（从 1 开始，与操作系统线程 ID 无关）
pub type ThreadId = u64;

bitflags::bitflags! {
    /// 捕获模式
    ///
    /// `WRITE` 表示逐调用写入输出端，`TRACK` 表示维护状态跟踪器。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CaptureMode: u32 {
        const WRITE = 1 << 0;
        const TRACK = 1 << 1;
    }
}

/// 被拦截的 API 调用编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ApiCallId {
    Unknown,

    // 全局函数
    D3D12CreateDevice,
    D3D12GetDebugInterface,
    CreateDXGIFactory2,

    // DXGI
    IDXGIFactoryCreateSwapChain,
    IDXGIFactory2CreateSwapChainForHwnd,
    IDXGIFactory2CreateSwapChainForCoreWindow,
    IDXGIFactory2CreateSwapChainForComposition,
    IDXGISwapChainGetBuffer,
    IDXGISwapChainPresent,
    IDXGISwapChain1Present1,
    IDXGISwapChainResizeBuffers,
    IDXGISwapChain3ResizeBuffers1,

    // ID3D12Device
    ID3D12DeviceCreateCommandQueue,
    ID3D12DeviceCreateCommandAllocator,
    ID3D12DeviceCreateCommandList,
    ID3D12Device4CreateCommandList1,
    ID3D12DeviceCreateDescriptorHeap,
    ID3D12DeviceCreateHeap,
    ID3D12Device4CreateHeap1,
    ID3D12DeviceCreateCommittedResource,
    ID3D12Device4CreateCommittedResource1,
    ID3D12Device8CreateCommittedResource2,
    ID3D12DeviceCreatePlacedResource,
    ID3D12Device8CreatePlacedResource1,
    ID3D12DeviceCreateReservedResource,
    ID3D12DeviceCreateFence,
    ID3D12DeviceCreateConstantBufferView,
    ID3D12DeviceCreateShaderResourceView,
    ID3D12DeviceCreateUnorderedAccessView,
    ID3D12DeviceCreateRenderTargetView,
    ID3D12DeviceCreateDepthStencilView,
    ID3D12DeviceCreateSampler,
    ID3D12Device8CreateSamplerFeedbackUnorderedAccessView,
    ID3D12DeviceCopyDescriptors,
    ID3D12DeviceCopyDescriptorsSimple,
    ID3D12Device1SetResidencyPriority,
    ID3D12DeviceCheckFeatureSupport,
    ID3D12Device1CreatePipelineLibrary,
    ID3D12Device3OpenExistingHeapFromAddress,

    // ID3D12PipelineLibrary
    ID3D12PipelineLibraryLoadGraphicsPipeline,
    ID3D12PipelineLibraryLoadComputePipeline,
    ID3D12PipelineLibrary1LoadPipeline,

    // ID3D12Resource / ID3D12Heap
    ID3D12ResourceMap,
    ID3D12ResourceUnmap,
    ID3D12ResourceGetHeapProperties,
    ID3D12HeapGetDesc,

    // 队列、围栏
    ID3D12CommandQueueExecuteCommandLists,
    ID3D12CommandQueueSignal,
    ID3D12CommandQueueUpdateTileMappings,
    ID3D12CommandQueueCopyTileMappings,
    ID3D12FenceSignal,
    ID3D12FenceSetEventOnCompletion,

    // 命令列表
    ID3D12GraphicsCommandListResourceBarrier,
    ID3D12GraphicsCommandListReset,
    ID3D12GraphicsCommandListClose,
    ID3D12GraphicsCommandListOther,

    // 调试
    ID3D12DebugEnableDebugLayer,
    ID3D12Debug1EnableDebugLayer,
    ID3D12DeviceRemovedExtendedDataSettingsSetAutoBreadcrumbsEnablement,
    ID3D12DeviceRemovedExtendedDataSettingsSetPageFaultEnablement,
    ID3D12DeviceRemovedExtendedDataSettings1SetBreadcrumbContextEnablement,
    ID3D12ObjectSetPrivateData,

    // IUnknown
    IUnknownRelease,
}

impl Default for ApiCallId {
    fn default() -> Self {
        ApiCallId::Unknown
    }
}
