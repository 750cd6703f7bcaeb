//! 状态跟踪器
//!
//! 在跟踪模式下记录所有存活对象、已移除的句柄、释放时间线以及每个命令列表上
//! 尚未提交的状态相关调用。裁剪窗口打开时用这些信息生成一次完整快照。
//!
//! 所有共享状态放在一把粗粒度锁里。持有这把锁时可以再锁包装对象，反过来不行。

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use super::command::{StateChange, TrackedCommand};
use super::snapshot::{
    CommandLogRecord, ObjectRecord, ObjectStateRecord, ProcessState, ReleaseEvent, StateSnapshot,
};
use crate::api::types::ALL_SUBRESOURCES;
use crate::capture::sink::CaptureSink;
use crate::core::error::Result;
use crate::format::{ApiCallId, HandleId, ThreadId};
use crate::wrapper::{CommandListInfo, CreateInfo, Wrapper, WrapperInfo, WrapperState};

#[derive(Default)]
struct TrackedState {
    objects: BTreeMap<HandleId, Arc<Wrapper>>,
    removed: HashSet<HandleId>,
    release_timeline: Vec<ReleaseEvent>,
    command_logs: HashMap<HandleId, Vec<TrackedCommand>>,
}

impl TrackedState {
    fn is_live(&self, handle_id: HandleId) -> bool {
        self.objects.contains_key(&handle_id)
    }

    fn assert_not_removed(&self, handle_id: HandleId, operation: &str) {
        if self.removed.contains(&handle_id) {
            panic!("{} on removed handle {}", operation, handle_id);
        }
    }

    fn apply(&self, change: StateChange) {
        match change {
            StateChange::ResourceState {
                resource,
                subresource,
                state,
            } => {
                if !self.is_live(resource.handle_id()) {
                    return;
                }
                let mut wrapper_state = resource.lock();
                if let Some(info) = wrapper_state.resource_mut() {
                    if subresource == ALL_SUBRESOURCES {
                        info.states.clear();
                    }
                    info.states.insert(subresource, state);
                }
            }
            StateChange::TileMapping { resource, mapping } => {
                if !self.is_live(resource.handle_id()) {
                    return;
                }
                if let Some(info) = resource.lock().resource_mut() {
                    info.tile_mappings.push(mapping);
                }
            }
        }
    }
}

/// 状态跟踪器
#[derive(Default)]
pub struct StateTracker {
    state: Mutex<TrackedState>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个新创建的对象
    ///
    /// # 参数
    ///
    /// * `wrapper` - 新对象的包装
    /// * `call_id` - 创建调用
    /// * `parent` - 创建它的对象
    /// * `thread_id` - 调用线程
    /// * `parameters` - 创建调用的参数字节，原样复制到包装对象
    ///
    /// # Panics
    ///
    /// 句柄已经被移除过时 panic（句柄不会复用，出现这种情况说明内部状态已损坏）。
    pub fn add_entry(
        &self,
        wrapper: &Arc<Wrapper>,
        call_id: ApiCallId,
        parent: Option<HandleId>,
        thread_id: ThreadId,
        parameters: &[u8],
    ) {
        let handle_id = wrapper.handle_id();
        let mut state = self.state.lock();
        state.assert_not_removed(handle_id, "add_entry");

        if state.is_live(handle_id) {
            debug!(handle_id, call = ?call_id, "Object already tracked");
            return;
        }

        wrapper.lock().create = Some(CreateInfo {
            call_id,
            thread_id,
            parent,
            parameters: parameters.to_vec(),
        });
        state.objects.insert(handle_id, wrapper.clone());
        debug!(handle_id, call = ?call_id, "Tracking object");
    }

    /// 登记跟踪开始前已经存在的对象
    ///
    /// 只登记带有创建记录、尚未销毁且不在表中的对象。返回新登记的数量。
    pub fn register_existing<I>(&self, wrappers: I) -> usize
    where
        I: IntoIterator<Item = Arc<Wrapper>>,
    {
        let mut state = self.state.lock();
        let mut registered = 0;
        for wrapper in wrappers {
            let handle_id = wrapper.handle_id();
            if wrapper.is_destroyed() || state.is_live(handle_id) || state.removed.contains(&handle_id) {
                continue;
            }
            if wrapper.lock().create.is_none() {
                debug!(handle_id, "Existing object has no creation record");
                continue;
            }
            state.objects.insert(handle_id, wrapper);
            registered += 1;
        }
        registered
    }

    /// 移除一个已销毁的对象
    ///
    /// # Panics
    ///
    /// 重复移除同一个句柄时 panic。
    pub fn remove_entry(&self, wrapper: &Wrapper) {
        let handle_id = wrapper.handle_id();
        let mut state = self.state.lock();
        if !state.removed.insert(handle_id) {
            panic!("remove_entry on removed handle {}", handle_id);
        }
        state.objects.remove(&handle_id);
        state.command_logs.remove(&handle_id);
        debug!(handle_id, "Object removed from state tracker");
    }

    /// 在释放时间线上记录一次最终释放
    ///
    /// 时间线随下一次快照写出后清空。
    pub fn track_release(&self, handle_id: HandleId, thread_id: ThreadId) {
        self.state
            .lock()
            .release_timeline
            .push(ReleaseEvent { handle_id, thread_id });
    }

    /// 在命令列表日志上追加一条记录
    ///
    /// # Panics
    ///
    /// 命令列表已经被移除时 panic。
    pub fn track_command(&self, list: &Wrapper, command: TrackedCommand) {
        let handle_id = list.handle_id();
        let mut state = self.state.lock();
        state.assert_not_removed(handle_id, "track_command");
        state.command_logs.entry(handle_id).or_default().push(command);
    }

    /// 命令列表 Reset 时丢弃之前的记录
    pub fn reset_command_log(&self, list: &Wrapper) {
        let handle_id = list.handle_id();
        let mut state = self.state.lock();
        state.assert_not_removed(handle_id, "reset_command_log");
        if let Some(log) = state.command_logs.get_mut(&handle_id) {
            log.clear();
        }
    }

    /// 提交时执行各命令列表上记录的提取闭包并应用到资源状态
    pub fn flush_command_lists(&self, lists: &[Arc<Wrapper>]) {
        let mut state = self.state.lock();
        for list in lists {
            let Some(mut log) = state.command_logs.remove(&list.handle_id()) else {
                continue;
            };
            for command in log.iter_mut() {
                for change in command.take_changes() {
                    state.apply(change);
                }
            }
        }
    }

    /// 队列上的操作（tile 映射等）立即生效
    pub fn track_queue_command(&self, queue: &Arc<Wrapper>, command: TrackedCommand) {
        self.track_command(queue, command);
        self.flush_command_lists(std::slice::from_ref(queue));
    }

    pub fn is_live(&self, handle_id: HandleId) -> bool {
        self.state.lock().is_live(handle_id)
    }

    pub fn is_removed(&self, handle_id: HandleId) -> bool {
        self.state.lock().removed.contains(&handle_id)
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().objects.len()
    }

    pub fn release_timeline(&self) -> Vec<ReleaseEvent> {
        self.state.lock().release_timeline.clone()
    }

    pub fn pending_command_count(&self, list: HandleId) -> usize {
        self.state
            .lock()
            .command_logs
            .get(&list)
            .map_or(0, |log| log.len())
    }

    /// 生成裁剪起点快照
    ///
    /// 所有记录只保留对存活对象（以及进程级调试对象）的引用。
    pub fn snapshot(&self, thread_id: ThreadId, process: &ProcessState) -> StateSnapshot {
        let state = self.state.lock();

        let mut emitted: BTreeSet<HandleId> = state.objects.keys().copied().collect();
        if let Some(debug) = &process.debug_layer {
            emitted.insert(debug.object_id);
        }
        if let Some(dred) = &process.dred {
            emitted.insert(dred.object_id);
        }
        let live = |handle_id: &HandleId| emitted.contains(handle_id);

        let objects = state
            .objects
            .values()
            .filter_map(|wrapper| object_record(wrapper, &wrapper.lock(), &live))
            .collect();

        let mut command_logs: Vec<CommandLogRecord> = state
            .command_logs
            .iter()
            .filter(|(list, log)| live(*list) && !log.is_empty())
            .map(|(list, log)| CommandLogRecord {
                list: *list,
                commands: log
                    .iter()
                    .filter(|command| command.references.iter().all(&live))
                    .map(TrackedCommand::record)
                    .collect(),
            })
            .collect();
        command_logs.sort_by_key(|log| log.list);

        StateSnapshot {
            thread_id,
            objects,
            command_logs,
            process: process.clone(),
            releases: state.release_timeline.clone(),
        }
    }

    /// 生成快照并写入输出端，写入成功后清空释放时间线
    pub fn write_tracked_state(
        &self,
        sink: &dyn CaptureSink,
        thread_id: ThreadId,
        process: &ProcessState,
    ) -> Result<()> {
        let snapshot = self.snapshot(thread_id, process);
        info!(
            objects = snapshot.objects.len(),
            command_logs = snapshot.command_logs.len(),
            releases = snapshot.releases.len(),
            "Writing tracked state"
        );
        sink.write_state(&snapshot)?;

        let mut state = self.state.lock();
        let written = snapshot.releases.len().min(state.release_timeline.len());
        state.release_timeline.drain(..written);
        Ok(())
    }
}

fn object_record(
    wrapper: &Wrapper,
    state: &WrapperState,
    live: &impl Fn(&HandleId) -> bool,
) -> Option<ObjectRecord> {
    let mut create = state.create.clone()?;
    create.parent = create.parent.filter(live);

    let record = match &state.info {
        WrapperInfo::None => ObjectStateRecord::None,
        WrapperInfo::Resource(info) => ObjectStateRecord::Resource {
            desc: info.desc,
            heap_properties: info.original_heap_properties,
            heap: info.heap.filter(live),
            heap_offset: info.heap_offset,
            states: info.states.clone(),
            mapped_subresources: info.mapped.keys().copied().collect(),
            tile_mappings: info
                .tile_mappings
                .iter()
                .filter(|mapping| {
                    mapping.heap.iter().all(live) && mapping.source_resource.iter().all(live)
                })
                .cloned()
                .collect(),
        },
        WrapperInfo::Heap(info) => {
            let mut desc = info.desc;
            desc.properties = info.original_properties;
            desc.flags = info.original_flags;
            ObjectStateRecord::Heap {
                desc,
                opened_from_address: info.opened_from_address,
            }
        }
        WrapperInfo::DescriptorHeap(info) => ObjectStateRecord::DescriptorHeap {
            table: info.table,
            slots: info
                .slots
                .iter()
                .enumerate()
                .filter_map(|(index, slot)| slot.as_ref().map(|slot| (index as u32, slot)))
                .filter(|(_, slot)| slot.referenced_handles().all(|h| live(&h)))
                .map(|(index, slot)| (index, slot.clone()))
                .collect(),
        },
        WrapperInfo::SwapChain(info) => ObjectStateRecord::SwapChain {
            desc: info.desc,
            queue: info.queue.as_ref().map(|queue| queue.handle_id()).filter(live),
            images: info
                .images
                .iter()
                .map(|image| image.handle_id())
                .filter(live)
                .collect(),
        },
        WrapperInfo::CommandQueue(info) => ObjectStateRecord::CommandQueue { desc: info.desc },
        WrapperInfo::CommandList(info) => ObjectStateRecord::CommandList(CommandListInfo {
            allocator: info.allocator.filter(live),
            ..*info
        }),
        WrapperInfo::Fence(info) => ObjectStateRecord::Fence(info.clone()),
    };

    Some(ObjectRecord {
        handle_id: wrapper.handle_id(),
        kind: wrapper.kind(),
        create,
        state: record,
        private_data: state.private_data.clone(),
        residency_priority: state.residency_priority,
    })
}
