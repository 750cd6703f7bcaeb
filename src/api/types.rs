//! D3D12 / DXGI 参数类型
//!
//! 与原生头文件保持同样的取值，枚举和标志位使用与 `windows` crate 相同的
//! 透明新类型写法（`pub struct D3D12_HEAP_TYPE(pub i32)`），
//! 这样捕获层的核心逻辑不依赖具体平台，也方便在非 Windows 平台上测试。

use bytemuck::{Pod, Zeroable};
use serde::Serialize;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

use crate::format::encoder::{impl_encode_pod, Encode, ParameterEncoder};

/// 定义一个 i32 新类型枚举
macro_rules! d3d12_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:expr),* $(,)? }) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize)]
        pub struct $name(pub i32);

        impl $name {
            $(pub const $variant: Self = Self($value);)*
        }

        impl_encode_pod!($name);
    };
}

/// 定义一个 i32 新类型标志位，附带按位运算
macro_rules! d3d12_flags {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:expr),* $(,)? }) => {
        d3d12_enum!($(#[$meta])* $name { $($variant = $value),* });

        impl $name {
            pub fn contains(self, other: Self) -> bool {
                (self.0 & other.0) == other.0
            }

            pub fn intersects(self, other: Self) -> bool {
                (self.0 & other.0) != 0
            }
        }

        impl BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl BitAnd for $name {
            type Output = Self;
            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }

        impl Not for $name {
            type Output = Self;
            fn not(self) -> Self {
                Self(!self.0)
            }
        }
    };
}

/// 所有子资源
pub const ALL_SUBRESOURCES: u32 = 0xffff_ffff;

/// HRESULT
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize)]
pub struct HResult(pub i32);

impl HResult {
    pub const S_OK: Self = Self(0);
    pub const S_FALSE: Self = Self(1);
    pub const E_FAIL: Self = Self(0x8000_4005_u32 as i32);
    pub const E_INVALIDARG: Self = Self(0x8007_0057_u32 as i32);
    pub const E_OUTOFMEMORY: Self = Self(0x8007_000E_u32 as i32);
    pub const DXGI_ERROR_INVALID_CALL: Self = Self(0x887A_0001_u32 as i32);
    pub const DXGI_ERROR_UNSUPPORTED: Self = Self(0x887A_0004_u32 as i32);

    pub fn succeeded(self) -> bool {
        self.0 >= 0
    }

    pub fn failed(self) -> bool {
        self.0 < 0
    }
}

impl_encode_pod!(HResult);

/// GUID / REFIID
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize)]
pub struct Guid {
    pub data: [u8; 16],
}

impl Guid {
    pub const fn from_u128(value: u128) -> Self {
        Self { data: value.to_be_bytes() }
    }
}

impl_encode_pod!(Guid);

d3d12_enum!(
    /// D3D12_HEAP_TYPE
    HeapType {
        DEFAULT = 1,
        UPLOAD = 2,
        READBACK = 3,
        CUSTOM = 4,
    }
);

d3d12_enum!(
    /// D3D12_CPU_PAGE_PROPERTY
    CpuPageProperty {
        UNKNOWN = 0,
        NOT_AVAILABLE = 1,
        WRITE_COMBINE = 2,
        WRITE_BACK = 3,
    }
);

d3d12_enum!(
    /// D3D12_MEMORY_POOL
    MemoryPool {
        UNKNOWN = 0,
        L0 = 1,
        L1 = 2,
    }
);

d3d12_flags!(
    /// D3D12_HEAP_FLAGS
    HeapFlags {
        NONE = 0,
        SHARED = 0x1,
        DENY_BUFFERS = 0x4,
        ALLOW_DISPLAY = 0x8,
        SHARED_CROSS_ADAPTER = 0x20,
        DENY_RT_DS_TEXTURES = 0x40,
        DENY_NON_RT_DS_TEXTURES = 0x80,
        HARDWARE_PROTECTED = 0x100,
        ALLOW_WRITE_WATCH = 0x200,
        ALLOW_SHADER_ATOMICS = 0x400,
        CREATE_NOT_RESIDENT = 0x800,
        CREATE_NOT_ZEROED = 0x1000,
    }
);

d3d12_enum!(
    /// D3D12_RESOURCE_DIMENSION
    ResourceDimension {
        UNKNOWN = 0,
        BUFFER = 1,
        TEXTURE1D = 2,
        TEXTURE2D = 3,
        TEXTURE3D = 4,
    }
);

d3d12_flags!(
    /// D3D12_RESOURCE_STATES
    ResourceStates {
        COMMON = 0,
        VERTEX_AND_CONSTANT_BUFFER = 0x1,
        INDEX_BUFFER = 0x2,
        RENDER_TARGET = 0x4,
        UNORDERED_ACCESS = 0x8,
        DEPTH_WRITE = 0x10,
        DEPTH_READ = 0x20,
        NON_PIXEL_SHADER_RESOURCE = 0x40,
        PIXEL_SHADER_RESOURCE = 0x80,
        COPY_DEST = 0x400,
        COPY_SOURCE = 0x800,
        GENERIC_READ = 0xAC3,
        PRESENT = 0,
    }
);

d3d12_enum!(
    /// D3D12_DESCRIPTOR_HEAP_TYPE
    DescriptorHeapType {
        CBV_SRV_UAV = 0,
        SAMPLER = 1,
        RTV = 2,
        DSV = 3,
    }
);

d3d12_flags!(
    /// D3D12_DESCRIPTOR_HEAP_FLAGS
    DescriptorHeapFlags {
        NONE = 0,
        SHADER_VISIBLE = 0x1,
    }
);

d3d12_enum!(
    /// D3D12_COMMAND_LIST_TYPE
    CommandListType {
        DIRECT = 0,
        BUNDLE = 1,
        COMPUTE = 2,
        COPY = 3,
    }
);

d3d12_enum!(
    /// D3D12_FEATURE 中捕获层会改写结果的项
    Feature {
        D3D12_OPTIONS = 0,
        SHADER_CACHE = 19,
        EXISTING_HEAPS = 22,
    }
);

d3d12_flags!(
    /// D3D12_SHADER_CACHE_SUPPORT_FLAGS
    ShaderCacheSupportFlags {
        NONE = 0,
        SINGLE_PSO = 0x1,
        LIBRARY = 0x2,
        AUTOMATIC_INPROC_CACHE = 0x4,
        AUTOMATIC_DISK_CACHE = 0x8,
    }
);

d3d12_enum!(
    /// DXGI_FORMAT
    Format {
        UNKNOWN = 0,
        R32G32B32A32_FLOAT = 2,
        R8G8B8A8_UNORM = 28,
        D32_FLOAT = 40,
        D24_UNORM_S8_UINT = 45,
        B8G8R8A8_UNORM = 87,
    }
);

impl Format {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Format::R32G32B32A32_FLOAT => 16,
            _ => 4,
        }
    }
}

d3d12_enum!(
    /// DXGI_SWAP_EFFECT
    SwapEffect {
        DISCARD = 0,
        SEQUENTIAL = 1,
        FLIP_SEQUENTIAL = 3,
        FLIP_DISCARD = 4,
    }
);

d3d12_enum!(
    /// D3D12_DRED_ENABLEMENT
    DredEnablement {
        SYSTEM_CONTROLLED = 0,
        FORCED_OFF = 1,
        FORCED_ON = 2,
    }
);

d3d12_enum!(
    /// D3D12_RESIDENCY_PRIORITY
    ResidencyPriority {
        MINIMUM = 0x2800_0000,
        LOW = 0x5000_0000,
        NORMAL = 0x7800_0000,
        HIGH = 0xa001_0000_u32 as i32,
        MAXIMUM = 0xc800_0000_u32 as i32,
    }
);

d3d12_flags!(
    /// D3D12_TILE_RANGE_FLAGS
    TileRangeFlags {
        NONE = 0,
        NULL = 1,
        SKIP = 2,
        REUSE_SINGLE_TILE = 4,
    }
);

d3d12_flags!(
    /// D3D12_TILE_MAPPING_FLAGS
    TileMappingFlags {
        NONE = 0,
        NO_HAZARD = 0x1,
    }
);

/// DXGI_CREATE_FACTORY_DEBUG
pub const DXGI_CREATE_FACTORY_DEBUG: u32 = 0x1;

/// D3D12_HEAP_PROPERTIES
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize)]
pub struct HeapProperties {
    pub heap_type: HeapType,
    pub cpu_page_property: CpuPageProperty,
    pub memory_pool_preference: MemoryPool,
    pub creation_node_mask: u32,
    pub visible_node_mask: u32,
}

impl HeapProperties {
    pub fn new(heap_type: HeapType) -> Self {
        Self {
            heap_type,
            ..Default::default()
        }
    }
}

impl_encode_pod!(HeapProperties);

/// D3D12_HEAP_DESC
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HeapDesc {
    pub size_in_bytes: u64,
    pub properties: HeapProperties,
    pub alignment: u64,
    pub flags: HeapFlags,
}

impl Encode for HeapDesc {
    fn encode(&self, encoder: &mut ParameterEncoder) {
        encoder
            .encode(&self.size_in_bytes)
            .encode(&self.properties)
            .encode(&self.alignment)
            .encode(&self.flags);
    }
}

/// D3D12_RESOURCE_DESC
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResourceDesc {
    pub dimension: ResourceDimension,
    pub alignment: u64,
    pub width: u64,
    pub height: u32,
    pub depth_or_array_size: u16,
    pub mip_levels: u16,
    pub format: Format,
    pub sample_count: u32,
    pub sample_quality: u32,
    pub layout: i32,
    pub flags: i32,
}

impl ResourceDesc {
    /// 线性缓冲区描述
    pub fn buffer(width: u64) -> Self {
        Self {
            dimension: ResourceDimension::BUFFER,
            width,
            height: 1,
            depth_or_array_size: 1,
            mip_levels: 1,
            sample_count: 1,
            // D3D12_TEXTURE_LAYOUT_ROW_MAJOR
            layout: 1,
            ..Default::default()
        }
    }

    /// 二维纹理描述
    pub fn texture_2d(width: u64, height: u32, format: Format) -> Self {
        Self {
            dimension: ResourceDimension::TEXTURE2D,
            width,
            height,
            depth_or_array_size: 1,
            mip_levels: 1,
            format,
            sample_count: 1,
            ..Default::default()
        }
    }
}

impl ResourceDesc {
    pub fn array_size(&self) -> u32 {
        if self.dimension == ResourceDimension::TEXTURE3D {
            1
        } else {
            self.depth_or_array_size.max(1) as u32
        }
    }

    fn depth(&self) -> u64 {
        if self.dimension == ResourceDimension::TEXTURE3D {
            self.depth_or_array_size.max(1) as u64
        } else {
            1
        }
    }

    /// 实际的 mip 层数
    ///
    /// 0 表示完整 mip 链；超过完整链长度的请求按完整链截断。
    pub fn mip_level_count(&self) -> u32 {
        let largest = self.width.max(self.height as u64).max(self.depth()).max(1);
        let full_chain = u64::BITS - largest.leading_zeros();
        match self.mip_levels as u32 {
            0 => full_chain,
            levels => levels.min(full_chain),
        }
    }

    pub fn subresource_count(&self) -> u32 {
        if self.dimension == ResourceDimension::BUFFER {
            1
        } else {
            self.mip_level_count() * self.array_size()
        }
    }

    /// 每个子资源映射后可访问的字节数
    ///
    /// 行按 256 字节对齐，最后一行（以及最后一个深度切片）不补齐。
    pub fn subresource_sizes(&self) -> Vec<u64> {
        if self.dimension == ResourceDimension::BUFFER {
            return vec![self.width];
        }

        let bytes_per_pixel = self.format.bytes_per_pixel() as u64;
        let mip_levels = self.mip_level_count();
        let mip_extent = |extent: u64, mip: u32| extent.checked_shr(mip).unwrap_or(0).max(1);

        let mut sizes = Vec::with_capacity(self.subresource_count() as usize);
        for _ in 0..self.array_size() {
            for mip in 0..mip_levels {
                let row_bytes = mip_extent(self.width, mip) * bytes_per_pixel;
                let rows = mip_extent(self.height as u64, mip);
                let depth = mip_extent(self.depth(), mip);
                let row_pitch = (row_bytes + 255) & !255;
                let slice_pitch = row_pitch * rows;
                sizes.push(slice_pitch * (depth - 1) + row_pitch * (rows - 1) + row_bytes);
            }
        }
        sizes
    }
}

/// CreateCommittedResource 系列调用的参数
///
/// 堆属性和标志是实际转发给驱动的值，转发前可能被写监视改写。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommittedResourceDesc {
    pub desc: ResourceDesc,
    pub heap_properties: HeapProperties,
    pub heap_flags: HeapFlags,
    pub initial_state: ResourceStates,
}

impl CommittedResourceDesc {
    pub fn new(desc: ResourceDesc, heap_properties: HeapProperties, initial_state: ResourceStates) -> Self {
        Self {
            desc,
            heap_properties,
            heap_flags: HeapFlags::NONE,
            initial_state,
        }
    }

    pub fn with_heap_flags(mut self, heap_flags: HeapFlags) -> Self {
        self.heap_flags = heap_flags;
        self
    }
}

/// CreatePlacedResource 系列调用的参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacedResourceDesc {
    pub heap_offset: u64,
    pub desc: ResourceDesc,
    pub initial_state: ResourceStates,
}

impl Encode for ResourceDesc {
    fn encode(&self, encoder: &mut ParameterEncoder) {
        encoder
            .encode(&self.dimension)
            .encode(&self.alignment)
            .encode(&self.width)
            .encode(&self.height)
            .encode(&self.depth_or_array_size)
            .encode(&self.mip_levels)
            .encode(&self.format)
            .encode(&self.sample_count)
            .encode(&self.sample_quality)
            .encode(&self.layout)
            .encode(&self.flags);
    }
}

/// D3D12_DESCRIPTOR_HEAP_DESC
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize)]
pub struct DescriptorHeapDesc {
    pub heap_type: DescriptorHeapType,
    pub num_descriptors: u32,
    pub flags: DescriptorHeapFlags,
    pub node_mask: u32,
}

impl_encode_pod!(DescriptorHeapDesc);

/// D3D12_COMMAND_QUEUE_DESC
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize)]
pub struct CommandQueueDesc {
    pub list_type: CommandListType,
    pub priority: i32,
    pub flags: i32,
    pub node_mask: u32,
}

impl_encode_pod!(CommandQueueDesc);

/// D3D12_CPU_DESCRIPTOR_HANDLE
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable, Serialize)]
pub struct CpuDescriptorHandle {
    pub ptr: usize,
}

impl CpuDescriptorHandle {
    pub fn offset(self, index: u32, increment_size: u32) -> Self {
        Self {
            ptr: self.ptr + index as usize * increment_size as usize,
        }
    }
}

/// D3D12_GPU_DESCRIPTOR_HANDLE
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable, Serialize)]
pub struct GpuDescriptorHandle {
    pub ptr: u64,
}

impl GpuDescriptorHandle {
    pub fn offset(self, index: u32, increment_size: u32) -> Self {
        Self {
            ptr: self.ptr + index as u64 * increment_size as u64,
        }
    }
}

impl Encode for CpuDescriptorHandle {
    fn encode(&self, encoder: &mut ParameterEncoder) {
        encoder.encode(&self.ptr);
    }
}

impl_encode_pod!(GpuDescriptorHandle);

/// D3D12_RANGE
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize)]
pub struct Range {
    pub begin: usize,
    pub end: usize,
}

impl Range {
    pub fn new(begin: usize, end: usize) -> Self {
        Self { begin, end }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.begin
    }
}

impl Encode for Range {
    fn encode(&self, encoder: &mut ParameterEncoder) {
        encoder.encode(&self.begin).encode(&self.end);
    }
}

/// DXGI_SWAP_CHAIN_DESC / DXGI_SWAP_CHAIN_DESC1 中捕获层关心的部分
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize)]
pub struct SwapChainDesc {
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub buffer_count: u32,
    pub swap_effect: SwapEffect,
    pub buffer_usage: u32,
    pub flags: u32,
}

impl_encode_pod!(SwapChainDesc);

/// ResizeBuffers / ResizeBuffers1 的尺寸参数
///
/// 0 或 `Format::UNKNOWN` 表示保持原值。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResizeBuffersDesc {
    pub buffer_count: u32,
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub flags: u32,
}

/// D3D12_TILED_RESOURCE_COORDINATE
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize)]
pub struct TiledResourceCoordinate {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub subresource: u32,
}

impl_encode_pod!(TiledResourceCoordinate);

/// D3D12_TILE_REGION_SIZE
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize)]
pub struct TileRegionSize {
    pub num_tiles: u32,
    pub use_box: i32,
    pub width: u32,
    pub height: u16,
    pub depth: u16,
}

impl_encode_pod!(TileRegionSize);

/// CopyTileMappings 的区域参数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileMappingCopy {
    pub dst_coordinate: TiledResourceCoordinate,
    pub src_coordinate: TiledResourceCoordinate,
    pub region_size: TileRegionSize,
    pub flags: TileMappingFlags,
}

/// D3D12_RENDER_TARGET_VIEW_DESC（联合体部分按原始字保存）
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize)]
pub struct RenderTargetViewDesc {
    pub format: Format,
    pub view_dimension: i32,
    pub data: [u32; 4],
}

/// D3D12_DEPTH_STENCIL_VIEW_DESC
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize)]
pub struct DepthStencilViewDesc {
    pub format: Format,
    pub view_dimension: i32,
    pub flags: i32,
    pub data: [u32; 3],
}

/// D3D12_SHADER_RESOURCE_VIEW_DESC
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize)]
pub struct ShaderResourceViewDesc {
    pub format: Format,
    pub view_dimension: i32,
    pub shader_4_component_mapping: u32,
    pub data: [u32; 6],
}

/// D3D12_UNORDERED_ACCESS_VIEW_DESC
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize)]
pub struct UnorderedAccessViewDesc {
    pub format: Format,
    pub view_dimension: i32,
    pub data: [u32; 6],
}

/// D3D12_CONSTANT_BUFFER_VIEW_DESC
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ConstantBufferViewDesc {
    pub buffer_location: u64,
    pub size_in_bytes: u32,
}

/// D3D12_SAMPLER_DESC
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable, Serialize)]
pub struct SamplerDesc {
    pub filter: i32,
    pub address_u: i32,
    pub address_v: i32,
    pub address_w: i32,
    pub mip_lod_bias: f32,
    pub max_anisotropy: u32,
    pub comparison_func: i32,
    pub border_color: [f32; 4],
    pub min_lod: f32,
    pub max_lod: f32,
}

impl_encode_pod!(
    RenderTargetViewDesc,
    DepthStencilViewDesc,
    ShaderResourceViewDesc,
    UnorderedAccessViewDesc,
    SamplerDesc,
);

impl Encode for ConstantBufferViewDesc {
    fn encode(&self, encoder: &mut ParameterEncoder) {
        encoder.encode(&self.buffer_location).encode(&self.size_in_bytes);
    }
}

/// 写入描述符槽的视图
///
/// `None` 对应应用传入空描述指针、由驱动按资源推导默认视图的情况。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ViewDesc {
    ConstantBuffer(Option<ConstantBufferViewDesc>),
    ShaderResource(Option<ShaderResourceViewDesc>),
    UnorderedAccess(Option<UnorderedAccessViewDesc>),
    RenderTarget(Option<RenderTargetViewDesc>),
    DepthStencil(Option<DepthStencilViewDesc>),
    Sampler(SamplerDesc),
    SamplerFeedback,
}

impl ViewDesc {
    /// 创建该视图的 API 调用
    pub fn create_call_id(&self) -> crate::format::ApiCallId {
        use crate::format::ApiCallId;

        match self {
            ViewDesc::ConstantBuffer(_) => ApiCallId::ID3D12DeviceCreateConstantBufferView,
            ViewDesc::ShaderResource(_) => ApiCallId::ID3D12DeviceCreateShaderResourceView,
            ViewDesc::UnorderedAccess(_) => ApiCallId::ID3D12DeviceCreateUnorderedAccessView,
            ViewDesc::RenderTarget(_) => ApiCallId::ID3D12DeviceCreateRenderTargetView,
            ViewDesc::DepthStencil(_) => ApiCallId::ID3D12DeviceCreateDepthStencilView,
            ViewDesc::Sampler(_) => ApiCallId::ID3D12DeviceCreateSampler,
            ViewDesc::SamplerFeedback => {
                ApiCallId::ID3D12Device8CreateSamplerFeedbackUnorderedAccessView
            }
        }
    }
}
