//! 对象包装模型
//!
//! - `object`：包装对象及按种类区分的附加状态
//! - `registry`：句柄分配和原生对象 → 包装对象的 1:1 映射
//! - `descriptor`：描述符句柄虚拟化和描述符槽状态

pub mod descriptor;
pub mod object;
pub mod registry;

pub use descriptor::{
    DescriptorHandleTable, DescriptorHeapInfo, DescriptorSlot, VirtualDescriptorAllocator,
};
pub use object::{
    CommandListInfo, CommandQueueInfo, CreateInfo, FenceInfo, HeapInfo, MappedSubresource, ObjectKind,
    ResourceInfo, SwapChainInfo, TileMapping, Wrapper, WrapperInfo, WrapperState,
};
pub use registry::{HandleAllocator, WrapperRegistry};
