//! 包装对象
//!
//! 每个被捕获的原生对象对应一个 `Wrapper`，持有原生对象的一个引用、
//! 稳定的句柄、创建调用的信息以及按对象种类区分的附加状态。

use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::descriptor::DescriptorHeapInfo;
use crate::api::native::NativeObject;
use crate::api::types::{
    CommandListType, CommandQueueDesc, CpuPageProperty, Guid, HeapDesc, HeapFlags, HeapProperties, HeapType,
    MemoryPool, ResidencyPriority, ResourceDesc, ResourceStates, SwapChainDesc,
    TileMappingFlags, TileRangeFlags, TileRegionSize, TiledResourceCoordinate,
};
use crate::format::{ApiCallId, HandleId, ThreadId};

/// 包装对象的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ObjectKind {
    Factory,
    Adapter,
    Device,
    CommandQueue,
    CommandAllocator,
    CommandList,
    DescriptorHeap,
    Heap,
    Resource,
    Fence,
    SwapChain,
    Debug,
    DredSettings,
    Other,
}

/// 创建调用信息（创建成功时写入，状态跟踪器据此生成快照）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateInfo {
    pub call_id: ApiCallId,
    pub thread_id: ThreadId,
    pub parent: Option<HandleId>,
    pub parameters: Vec<u8>,
}

/// 一个子资源当前的映射
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MappedSubresource {
    /// CPU 可见地址
    pub data: usize,
    /// 嵌套 Map 计数
    pub map_count: u32,
}

/// 一次 UpdateTileMappings / CopyTileMappings 记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TileMapping {
    pub call_id: ApiCallId,
    pub heap: Option<HandleId>,
    pub source_resource: Option<HandleId>,
    pub region_coordinates: Vec<TiledResourceCoordinate>,
    pub region_sizes: Vec<TileRegionSize>,
    pub range_flags: Vec<TileRangeFlags>,
    pub heap_range_start_offsets: Vec<u32>,
    pub range_tile_counts: Vec<u32>,
    pub flags: TileMappingFlags,
}

/// 资源的捕获状态
#[derive(Debug, Clone, Serialize)]
pub struct ResourceInfo {
    pub desc: ResourceDesc,
    /// 一次完整捕获需要的字节数
    pub capture_size: u64,
    pub subresource_sizes: Vec<u64>,
    /// 实际提交给驱动的堆属性（可能已被写监视改写）
    pub heap_properties: HeapProperties,
    pub heap_flags: HeapFlags,
    /// 应用请求的原始堆属性
    pub original_heap_properties: HeapProperties,
    pub original_heap_flags: HeapFlags,
    pub initial_state: ResourceStates,
    pub write_watch: bool,
    /// 放置资源所在的堆
    pub heap: Option<HandleId>,
    pub heap_offset: u64,
    pub mapped: BTreeMap<u32, MappedSubresource>,
    /// 子资源当前状态；`ALL_SUBRESOURCES` 键表示整个资源
    pub states: BTreeMap<u32, ResourceStates>,
    pub tile_mappings: Vec<TileMapping>,
}

impl ResourceInfo {
    pub fn new(
        desc: ResourceDesc,
        heap_properties: HeapProperties,
        heap_flags: HeapFlags,
        initial_state: ResourceStates,
    ) -> Self {
        let mut states = BTreeMap::new();
        states.insert(crate::api::types::ALL_SUBRESOURCES, initial_state);
        let subresource_sizes = desc.subresource_sizes();
        Self {
            desc,
            capture_size: subresource_sizes.iter().sum(),
            subresource_sizes,
            heap_properties,
            heap_flags,
            original_heap_properties: heap_properties,
            original_heap_flags: heap_flags,
            initial_state,
            write_watch: false,
            heap: None,
            heap_offset: 0,
            mapped: BTreeMap::new(),
            states,
            tile_mappings: Vec::new(),
        }
    }

    pub fn heap_type(&self) -> HeapType {
        self.heap_properties.heap_type
    }

    pub fn cpu_page_property(&self) -> CpuPageProperty {
        self.heap_properties.cpu_page_property
    }

    pub fn memory_pool(&self) -> MemoryPool {
        self.heap_properties.memory_pool_preference
    }

    pub fn is_mapped(&self) -> bool {
        !self.mapped.is_empty()
    }

    pub fn subresource_size(&self, subresource: u32) -> u64 {
        self.subresource_sizes
            .get(subresource as usize)
            .copied()
            .unwrap_or_default()
    }
}

/// 堆的捕获状态
#[derive(Debug, Clone, Serialize)]
pub struct HeapInfo {
    pub desc: HeapDesc,
    pub original_properties: HeapProperties,
    pub original_flags: HeapFlags,
    pub write_watch: bool,
    /// OpenExistingHeapFromAddress 打开的堆所在的地址
    pub opened_from_address: Option<u64>,
}

/// 交换链的捕获状态
#[derive(Debug, Clone)]
pub struct SwapChainInfo {
    pub desc: SwapChainDesc,
    /// 呈现队列
    pub queue: Option<Arc<Wrapper>>,
    /// 当前的后台缓冲区包装对象
    pub images: Vec<Arc<Wrapper>>,
    pub present_count: u64,
}

/// 命令队列的捕获状态
#[derive(Debug, Clone, Serialize)]
pub struct CommandQueueInfo {
    pub desc: CommandQueueDesc,
}

/// 命令列表的捕获状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommandListInfo {
    pub list_type: CommandListType,
    /// 最近一次 Reset（或创建）使用的分配器
    pub allocator: Option<HandleId>,
    pub closed: bool,
}

/// 围栏的捕获状态
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FenceInfo {
    pub initial_value: u64,
    pub last_signaled_value: u64,
    /// SetEventOnCompletion 等待中的值
    pub pending_values: Vec<u64>,
}

/// 按对象种类区分的附加状态
#[derive(Debug, Clone, Default)]
pub enum WrapperInfo {
    #[default]
    None,
    Resource(ResourceInfo),
    Heap(HeapInfo),
    DescriptorHeap(DescriptorHeapInfo),
    SwapChain(SwapChainInfo),
    CommandQueue(CommandQueueInfo),
    CommandList(CommandListInfo),
    Fence(FenceInfo),
}

/// 包装对象的可变状态
#[derive(Debug, Default)]
pub struct WrapperState {
    pub create: Option<CreateInfo>,
    pub info: WrapperInfo,
    /// SetPrivateData 写入的数据
    pub private_data: Vec<(Guid, Vec<u8>)>,
    pub residency_priority: Option<ResidencyPriority>,
}

impl WrapperState {
    pub fn resource(&self) -> Option<&ResourceInfo> {
        match &self.info {
            WrapperInfo::Resource(info) => Some(info),
            _ => None,
        }
    }

    pub fn resource_mut(&mut self) -> Option<&mut ResourceInfo> {
        match &mut self.info {
            WrapperInfo::Resource(info) => Some(info),
            _ => None,
        }
    }

    pub fn heap(&self) -> Option<&HeapInfo> {
        match &self.info {
            WrapperInfo::Heap(info) => Some(info),
            _ => None,
        }
    }

    pub fn descriptor_heap(&self) -> Option<&DescriptorHeapInfo> {
        match &self.info {
            WrapperInfo::DescriptorHeap(info) => Some(info),
            _ => None,
        }
    }

    pub fn descriptor_heap_mut(&mut self) -> Option<&mut DescriptorHeapInfo> {
        match &mut self.info {
            WrapperInfo::DescriptorHeap(info) => Some(info),
            _ => None,
        }
    }

    pub fn swap_chain(&self) -> Option<&SwapChainInfo> {
        match &self.info {
            WrapperInfo::SwapChain(info) => Some(info),
            _ => None,
        }
    }

    pub fn swap_chain_mut(&mut self) -> Option<&mut SwapChainInfo> {
        match &mut self.info {
            WrapperInfo::SwapChain(info) => Some(info),
            _ => None,
        }
    }

    pub fn command_list(&self) -> Option<&CommandListInfo> {
        match &self.info {
            WrapperInfo::CommandList(info) => Some(info),
            _ => None,
        }
    }

    pub fn command_list_mut(&mut self) -> Option<&mut CommandListInfo> {
        match &mut self.info {
            WrapperInfo::CommandList(info) => Some(info),
            _ => None,
        }
    }

    pub fn fence_mut(&mut self) -> Option<&mut FenceInfo> {
        match &mut self.info {
            WrapperInfo::Fence(info) => Some(info),
            _ => None,
        }
    }

    /// 写入私有数据；空数据表示删除
    pub fn set_private_data(&mut self, guid: Guid, data: Vec<u8>) {
        self.private_data.retain(|(existing, _)| *existing != guid);
        if !data.is_empty() {
            self.private_data.push((guid, data));
        }
    }
}

/// 包装对象
pub struct Wrapper {
    handle_id: HandleId,
    kind: ObjectKind,
    native: Box<dyn NativeObject>,
    state: Mutex<WrapperState>,
    destroyed: AtomicBool,
}

impl Wrapper {
    pub fn new(handle_id: HandleId, kind: ObjectKind, native: Box<dyn NativeObject>) -> Self {
        Self {
            handle_id,
            kind,
            native,
            state: Mutex::new(WrapperState::default()),
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn handle_id(&self) -> HandleId {
        self.handle_id
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn native(&self) -> &dyn NativeObject {
        self.native.as_ref()
    }

    /// 原生对象身份
    pub fn address(&self) -> usize {
        self.native.address()
    }

    /// 锁定可变状态
    ///
    /// 持有状态跟踪器锁时可以再锁包装对象，反过来不行。
    pub fn lock(&self) -> MutexGuard<'_, WrapperState> {
        self.state.lock()
    }

    pub fn set_info(&self, info: WrapperInfo) {
        self.state.lock().info = info;
    }

    pub fn create_info(&self) -> Option<CreateInfo> {
        self.state.lock().create.clone()
    }

    /// 记录创建调用，已有记录时保持不变
    pub(crate) fn record_create(&self, create: CreateInfo) {
        let mut state = self.state.lock();
        if state.create.is_none() {
            state.create = Some(create);
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// 标记为已销毁，返回之前是否已经销毁过
    pub(crate) fn mark_destroyed(&self) -> bool {
        self.destroyed.swap(true, Ordering::AcqRel)
    }
}

impl fmt::Debug for Wrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wrapper")
            .field("handle_id", &self.handle_id)
            .field("kind", &self.kind)
            .field("address", &format_args!("{:#x}", self.native.address()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::ALL_SUBRESOURCES;
    use crate::testing::MockObject;

    #[test]
    fn test_wrapper_accessors() {
        let wrapper = Wrapper::new(5, ObjectKind::Resource, Box::new(MockObject::new(0x100)));
        assert_eq!(wrapper.handle_id(), 5);
        assert_eq!(wrapper.address(), 0x100);
        assert!(wrapper.create_info().is_none());
        assert!(!wrapper.mark_destroyed());
        assert!(wrapper.mark_destroyed());
        assert!(wrapper.is_destroyed());
    }

    #[test]
    fn test_resource_info_initial_state() {
        let info = ResourceInfo::new(
            ResourceDesc::buffer(256),
            HeapProperties::new(HeapType::UPLOAD),
            HeapFlags::NONE,
            ResourceStates::GENERIC_READ,
        );
        assert_eq!(info.states.get(&ALL_SUBRESOURCES), Some(&ResourceStates::GENERIC_READ));
        assert_eq!(info.original_heap_properties, info.heap_properties);
        assert!(!info.is_mapped());
        assert_eq!(info.capture_size, 256);
        assert_eq!(info.subresource_size(0), 256);
        assert_eq!(info.subresource_size(1), 0);
    }

    #[test]
    fn test_private_data_replace_and_clear() {
        let mut state = WrapperState::default();
        let guid = Guid::from_u128(42);
        state.set_private_data(guid, vec![1]);
        state.set_private_data(guid, vec![2, 3]);
        assert_eq!(state.private_data, vec![(guid, vec![2, 3])]);
        state.set_private_data(guid, Vec::new());
        assert!(state.private_data.is_empty());
    }
}
