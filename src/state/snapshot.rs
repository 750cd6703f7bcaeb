//! 裁剪起点的状态快照
//!
//! 快照只包含仍然存活的对象，所有记录都只引用快照内出现过的句柄，
//! 回放端按句柄顺序重建即可得到裁剪起点的完整状态。

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::command::CommandRecord;
use crate::api::types::{
    CommandQueueDesc, DredEnablement, Guid, HeapDesc, HeapProperties, ResidencyPriority,
    ResourceDesc, ResourceStates, SwapChainDesc,
};
use crate::format::{ApiCallId, HandleId, ThreadId};
use crate::wrapper::{
    CommandListInfo, CreateInfo, DescriptorHandleTable, DescriptorSlot, FenceInfo, ObjectKind,
    TileMapping,
};

/// 调试层对象的进程级记录
///
/// 调试层状态是进程全局的，即使应用已经释放了 ID3D12Debug，
/// 快照里仍然需要重新启用它。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugLayerRecord {
    pub object_id: HandleId,
    pub create_call: ApiCallId,
    pub thread_id: ThreadId,
    pub parameters: Vec<u8>,
    /// 调用过的 EnableDebugLayer 变体
    pub enable_calls: Vec<ApiCallId>,
}

/// DRED 设置对象的进程级记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DredRecord {
    pub object_id: HandleId,
    pub create_call: ApiCallId,
    pub thread_id: ThreadId,
    pub parameters: Vec<u8>,
    pub auto_breadcrumbs: Option<DredEnablement>,
    pub page_fault: Option<DredEnablement>,
    pub breadcrumb_context: Option<DredEnablement>,
}

/// 与对象生命周期无关的进程级状态
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessState {
    pub debug_layer: Option<DebugLayerRecord>,
    pub dred: Option<DredRecord>,
}

/// 对象的附加状态
#[derive(Debug, Clone, Serialize)]
pub enum ObjectStateRecord {
    None,
    Resource {
        desc: ResourceDesc,
        /// 应用请求的堆属性（回放端自行决定是否使用写监视）
        heap_properties: HeapProperties,
        heap: Option<HandleId>,
        heap_offset: u64,
        states: BTreeMap<u32, ResourceStates>,
        mapped_subresources: Vec<u32>,
        tile_mappings: Vec<TileMapping>,
    },
    Heap {
        desc: HeapDesc,
        /// 从现有地址打开的堆；回放端用同一段填充内存重建
        opened_from_address: Option<u64>,
    },
    DescriptorHeap {
        table: DescriptorHandleTable,
        slots: Vec<(u32, DescriptorSlot)>,
    },
    SwapChain {
        desc: SwapChainDesc,
        queue: Option<HandleId>,
        images: Vec<HandleId>,
    },
    CommandQueue {
        desc: CommandQueueDesc,
    },
    CommandList(CommandListInfo),
    Fence(FenceInfo),
}

/// 一个存活对象
#[derive(Debug, Clone, Serialize)]
pub struct ObjectRecord {
    pub handle_id: HandleId,
    pub kind: ObjectKind,
    pub create: CreateInfo,
    pub state: ObjectStateRecord,
    pub private_data: Vec<(Guid, Vec<u8>)>,
    pub residency_priority: Option<ResidencyPriority>,
}

/// 一个命令列表上尚未提交的记录
#[derive(Debug, Clone, Serialize)]
pub struct CommandLogRecord {
    pub list: HandleId,
    pub commands: Vec<CommandRecord>,
}

/// 释放时间线上的一个事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReleaseEvent {
    pub handle_id: HandleId,
    pub thread_id: ThreadId,
}

/// 裁剪起点快照
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub thread_id: ThreadId,
    /// 按句柄（即创建）顺序排列
    pub objects: Vec<ObjectRecord>,
    pub command_logs: Vec<CommandLogRecord>,
    pub process: ProcessState,
    /// 上次快照之后、未写入调用流的最终释放，按发生顺序排列
    pub releases: Vec<ReleaseEvent>,
}

impl StateSnapshot {
    /// 快照中出现的所有对象句柄
    pub fn handles(&self) -> BTreeSet<HandleId> {
        let mut handles: BTreeSet<HandleId> =
            self.objects.iter().map(|object| object.handle_id).collect();
        if let Some(debug) = &self.process.debug_layer {
            handles.insert(debug.object_id);
        }
        if let Some(dred) = &self.process.dred {
            handles.insert(dred.object_id);
        }
        handles
    }

    /// 快照中所有记录引用的句柄
    pub fn referenced_handles(&self) -> BTreeSet<HandleId> {
        let mut referenced = BTreeSet::new();

        for object in &self.objects {
            referenced.extend(object.create.parent);
            match &object.state {
                ObjectStateRecord::Resource {
                    heap, tile_mappings, ..
                } => {
                    referenced.extend(*heap);
                    for mapping in tile_mappings {
                        referenced.extend(mapping.heap);
                        referenced.extend(mapping.source_resource);
                    }
                }
                ObjectStateRecord::DescriptorHeap { slots, .. } => {
                    for (_, slot) in slots {
                        referenced.extend(slot.referenced_handles());
                    }
                }
                ObjectStateRecord::SwapChain { queue, images, .. } => {
                    referenced.extend(*queue);
                    referenced.extend(images.iter().copied());
                }
                ObjectStateRecord::CommandList(info) => referenced.extend(info.allocator),
                _ => {}
            }
        }

        for log in &self.command_logs {
            referenced.insert(log.list);
            for command in &log.commands {
                referenced.extend(command.references.iter().copied());
            }
        }

        referenced
    }

    pub fn object(&self, handle_id: HandleId) -> Option<&ObjectRecord> {
        self.objects.iter().find(|object| object.handle_id == handle_id)
    }
}
