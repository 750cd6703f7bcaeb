//! 描述符句柄虚拟化
//!
//! 描述符堆的起始句柄是驱动分配的原生地址，回放时不可能得到同样的值。
//! 捕获层为每个堆分配一段确定性的虚拟地址交给应用，应用在虚拟地址上做偏移运算，
//! 之后所有使用描述符句柄的调用再通过 `DescriptorHandleTable` 翻译回原生值。

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::api::types::{
    CpuDescriptorHandle, DescriptorHeapDesc, DescriptorHeapFlags, GpuDescriptorHandle, ViewDesc,
};
use crate::format::{ApiCallId, HandleId, ThreadId};

/// 虚拟 CPU 句柄的起始值
pub const VIRTUAL_CPU_DESCRIPTOR_BASE: usize = 0x1000_0000;

/// 虚拟 GPU 句柄的起始值
pub const VIRTUAL_GPU_DESCRIPTOR_BASE: u64 = 0x0100_0000_0000;

/// 每个堆的虚拟地址段按页对齐，相邻的堆之间不会连续
const VIRTUAL_DESCRIPTOR_ALIGNMENT: usize = 0x1000;

fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

/// 虚拟起始句柄分配器（只增不减的 bump 分配）
#[derive(Debug)]
pub struct VirtualDescriptorAllocator {
    next_cpu: AtomicUsize,
    next_gpu: AtomicU64,
}

impl Default for VirtualDescriptorAllocator {
    fn default() -> Self {
        Self {
            next_cpu: AtomicUsize::new(VIRTUAL_CPU_DESCRIPTOR_BASE),
            next_gpu: AtomicU64::new(VIRTUAL_GPU_DESCRIPTOR_BASE),
        }
    }
}

impl VirtualDescriptorAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为跨度为 `span` 字节的堆分配虚拟 CPU 起始句柄
    pub fn allocate_cpu(&self, span: usize) -> CpuDescriptorHandle {
        let size = align_up(span.max(1), VIRTUAL_DESCRIPTOR_ALIGNMENT) + VIRTUAL_DESCRIPTOR_ALIGNMENT;
        CpuDescriptorHandle {
            ptr: self.next_cpu.fetch_add(size, Ordering::SeqCst),
        }
    }

    /// 为着色器可见的堆分配虚拟 GPU 起始句柄
    pub fn allocate_gpu(&self, span: usize) -> GpuDescriptorHandle {
        let size = align_up(span.max(1), VIRTUAL_DESCRIPTOR_ALIGNMENT) + VIRTUAL_DESCRIPTOR_ALIGNMENT;
        GpuDescriptorHandle {
            ptr: self.next_gpu.fetch_add(size as u64, Ordering::SeqCst),
        }
    }
}

/// 单个描述符堆的虚拟 ↔ 原生句柄映射
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DescriptorHandleTable {
    pub native_cpu_start: CpuDescriptorHandle,
    pub virtual_cpu_start: CpuDescriptorHandle,
    pub native_gpu_start: Option<GpuDescriptorHandle>,
    pub virtual_gpu_start: Option<GpuDescriptorHandle>,
    pub increment_size: u32,
    pub num_descriptors: u32,
}

impl DescriptorHandleTable {
    /// 堆占用的字节跨度
    pub fn span(&self) -> usize {
        self.increment_size as usize * self.num_descriptors as usize
    }

    fn index_of(&self, offset: usize) -> Option<u32> {
        if offset >= self.span().max(1) {
            return None;
        }
        if self.increment_size == 0 {
            return Some(0);
        }
        Some((offset / self.increment_size as usize) as u32)
    }

    /// 虚拟 CPU 句柄对应的槽位
    pub fn cpu_index(&self, handle: CpuDescriptorHandle) -> Option<u32> {
        let offset = handle.ptr.checked_sub(self.virtual_cpu_start.ptr)?;
        self.index_of(offset)
    }

    /// 虚拟 GPU 句柄对应的槽位
    pub fn gpu_index(&self, handle: GpuDescriptorHandle) -> Option<u32> {
        let start = self.virtual_gpu_start?;
        let offset = handle.ptr.checked_sub(start.ptr)?;
        self.index_of(offset as usize)
    }

    /// 虚拟 → 原生
    pub fn to_native_cpu(&self, handle: CpuDescriptorHandle) -> Option<CpuDescriptorHandle> {
        self.cpu_index(handle)?;
        Some(CpuDescriptorHandle {
            ptr: self.native_cpu_start.ptr + (handle.ptr - self.virtual_cpu_start.ptr),
        })
    }

    pub fn to_native_gpu(&self, handle: GpuDescriptorHandle) -> Option<GpuDescriptorHandle> {
        self.gpu_index(handle)?;
        let native = self.native_gpu_start?;
        let start = self.virtual_gpu_start?;
        Some(GpuDescriptorHandle {
            ptr: native.ptr + (handle.ptr - start.ptr),
        })
    }

    /// 原生 → 虚拟
    pub fn to_virtual_cpu(&self, handle: CpuDescriptorHandle) -> Option<CpuDescriptorHandle> {
        let offset = handle.ptr.checked_sub(self.native_cpu_start.ptr)?;
        self.index_of(offset)?;
        Some(CpuDescriptorHandle {
            ptr: self.virtual_cpu_start.ptr + offset,
        })
    }

    pub fn to_virtual_gpu(&self, handle: GpuDescriptorHandle) -> Option<GpuDescriptorHandle> {
        let native = self.native_gpu_start?;
        let offset = handle.ptr.checked_sub(native.ptr)?;
        self.index_of(offset as usize)?;
        Some(GpuDescriptorHandle {
            ptr: self.virtual_gpu_start?.ptr + offset,
        })
    }
}

/// 描述符槽内容
///
/// 记录最近一次成功写入该槽的视图调用，以及它引用的资源。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescriptorSlot {
    pub view: ViewDesc,
    pub resource: Option<HandleId>,
    /// UAV 的计数器资源；采样器反馈视图在这里记反馈资源
    pub counter_resource: Option<HandleId>,
    pub create_call: ApiCallId,
    pub thread_id: ThreadId,
    pub parameters: Vec<u8>,
}

impl DescriptorSlot {
    /// 槽内容引用的所有句柄
    pub fn referenced_handles(&self) -> impl Iterator<Item = HandleId> + '_ {
        self.resource.into_iter().chain(self.counter_resource)
    }
}

/// 描述符堆的捕获状态
#[derive(Debug, Clone, Serialize)]
pub struct DescriptorHeapInfo {
    pub desc: DescriptorHeapDesc,
    pub table: DescriptorHandleTable,
    pub slots: Vec<Option<DescriptorSlot>>,
}

impl DescriptorHeapInfo {
    pub fn new(desc: DescriptorHeapDesc, table: DescriptorHandleTable) -> Self {
        Self {
            desc,
            table,
            slots: vec![None; desc.num_descriptors as usize],
        }
    }

    pub fn shader_visible(&self) -> bool {
        self.desc.flags.contains(DescriptorHeapFlags::SHADER_VISIBLE)
    }

    pub fn slot(&self, index: u32) -> Option<&DescriptorSlot> {
        self.slots.get(index as usize).and_then(Option::as_ref)
    }

    /// 写入槽位，越界写入被忽略并返回 false
    pub fn set_slot(&mut self, index: u32, slot: Option<DescriptorSlot>) -> bool {
        match self.slots.get_mut(index as usize) {
            Some(entry) => {
                *entry = slot;
                true
            }
            None => false,
        }
    }
}
