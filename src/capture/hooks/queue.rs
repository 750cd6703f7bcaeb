//! 命令列表、命令队列和栅栏的钩子

use std::sync::Arc;
use tracing::{debug, trace};

use crate::api::native::NativeObject;
use crate::api::types::{CommandListType, HResult, TileMappingCopy};
use crate::capture::CaptureManager;
use crate::format::{ApiCallId, HandleId};
use crate::state::{CommandKind, ResourceBarrier, StateChange, TrackedCommand};
use crate::wrapper::{CommandListInfo, ObjectKind, TileMapping, Wrapper, WrapperInfo};

impl CaptureManager {
    /// ID3D12Device::CreateCommandList 返回后：新列表处于记录状态
    pub fn post_process_create_command_list(
        &self,
        device: &Wrapper,
        result: HResult,
        native: Option<Box<dyn NativeObject>>,
        list_type: CommandListType,
        allocator: &Wrapper,
    ) -> Option<Arc<Wrapper>> {
        self.create_command_list(
            device,
            result,
            native,
            CommandListInfo {
                list_type,
                allocator: Some(allocator.handle_id()),
                closed: false,
            },
        )
    }

    /// ID3D12Device4::CreateCommandList1 返回后：新列表已关闭，还没有分配器
    pub fn post_process_create_command_list1(
        &self,
        device: &Wrapper,
        result: HResult,
        native: Option<Box<dyn NativeObject>>,
        list_type: CommandListType,
    ) -> Option<Arc<Wrapper>> {
        self.create_command_list(
            device,
            result,
            native,
            CommandListInfo {
                list_type,
                allocator: None,
                closed: true,
            },
        )
    }

    fn create_command_list(
        &self,
        device: &Wrapper,
        result: HResult,
        native: Option<Box<dyn NativeObject>>,
        info: CommandListInfo,
    ) -> Option<Arc<Wrapper>> {
        let list = self.wrap_created(result, native, ObjectKind::CommandList);
        if let Some(list) = &list {
            list.set_info(WrapperInfo::CommandList(info));
        }
        self.finish_create_call(list.as_ref(), result, Some(device.handle_id()));
        list
    }

    /// ID3D12GraphicsCommandList::ResourceBarrier
    ///
    /// 屏障参数由这里写入；状态变化在命令列表提交时才生效。
    pub fn post_process_resource_barrier(&self, list: &Wrapper, barriers: Vec<ResourceBarrier>) {
        self.encode_parameters(|encoder| {
            encoder.encode(&barriers);
        });

        let references = barriers
            .iter()
            .flat_map(|barrier| barrier.referenced_handles())
            .collect();
        self.end_command_list_method_call_capture(
            list,
            CommandKind::ResourceBarrier,
            references,
            Some(Box::new(move || {
                barriers
                    .iter()
                    .filter_map(ResourceBarrier::state_change)
                    .collect()
            })),
        );
    }

    /// ID3D12GraphicsCommandList::Reset：丢弃之前记录的命令
    pub fn post_process_command_list_reset(
        &self,
        list: &Wrapper,
        result: HResult,
        allocator: &Wrapper,
    ) {
        if result.succeeded() && !self.is_nested_call() {
            if let Some(tracker) = self.tracker() {
                tracker.reset_command_log(list);
                if let Some(info) = list.lock().command_list_mut() {
                    info.allocator = Some(allocator.handle_id());
                    info.closed = false;
                }
            }
        }
        self.end_command_list_method_call_capture(
            list,
            CommandKind::Reset,
            vec![allocator.handle_id()],
            None,
        );
    }

    /// ID3D12GraphicsCommandList::Close
    pub fn post_process_command_list_close(&self, list: &Wrapper) {
        if self.tracker().is_some() && !self.is_nested_call() {
            if let Some(info) = list.lock().command_list_mut() {
                info.closed = true;
            }
        }
        self.end_command_list_method_call_capture(list, CommandKind::Close, Vec::new(), None);
    }

    /// 其余命令列表方法
    pub fn post_process_command_list_call(&self, list: &Wrapper, references: Vec<HandleId>) {
        self.end_command_list_method_call_capture(list, CommandKind::Other, references, None);
    }

    /// ID3D12CommandQueue::ExecuteCommandLists 转发前
    ///
    /// 先写出所有映射内存，再应用各命令列表记录的状态变化，最后写调用记录。
    pub fn pre_process_execute_command_lists(&self, queue: &Wrapper, lists: &[Arc<Wrapper>]) {
        // 不写入时保留写监视的脏页，留给写入开始后的第一次提交
        let regions = if self.is_writing() {
            self.memory.flush_mapped()
        } else {
            Vec::new()
        };
        trace!(
            queue = queue.handle_id(),
            lists = lists.len(),
            regions = regions.len(),
            "Flushing mapped memory before submission"
        );
        self.write_fill_memory(&regions);

        if let Some(tracker) = self.tracker() {
            tracker.flush_command_lists(lists);
        }

        self.encode_parameters(|encoder| {
            encoder.encode(&(lists.len() as u32));
            for list in lists {
                encoder.encode_handle_id(list.handle_id());
            }
        });
        self.end_method_call_capture();
    }

    /// ID3D12CommandQueue::Signal
    pub fn post_process_queue_signal(&self, result: HResult, fence: &Wrapper, value: u64) {
        if result.succeeded() && self.tracker().is_some() {
            record_fence_signal(fence, value);
        }
        self.end_method_call_capture();
    }

    /// ID3D12Fence::Signal（CPU 端）
    pub fn post_process_fence_signal(&self, fence: &Wrapper, result: HResult, value: u64) {
        if result.succeeded() && self.tracker().is_some() {
            record_fence_signal(fence, value);
        }
        self.end_method_call_capture();
    }

    /// ID3D12Fence::SetEventOnCompletion
    pub fn post_process_fence_set_event_on_completion(
        &self,
        fence: &Wrapper,
        result: HResult,
        value: u64,
    ) {
        if result.succeeded() && self.tracker().is_some() {
            let mut state = fence.lock();
            if let Some(info) = state.fence_mut() {
                if value > info.last_signaled_value && !info.pending_values.contains(&value) {
                    info.pending_values.push(value);
                }
            }
        }
        self.end_method_call_capture();
    }

    /// ID3D12CommandQueue::UpdateTileMappings
    ///
    /// `mapping` 中的调用编号和堆句柄由这里填写。
    pub fn post_process_update_tile_mappings(
        &self,
        queue: &Arc<Wrapper>,
        resource: &Arc<Wrapper>,
        heap: Option<&Wrapper>,
        mut mapping: TileMapping,
    ) {
        mapping.call_id = ApiCallId::ID3D12CommandQueueUpdateTileMappings;
        mapping.heap = heap.map(|heap| heap.handle_id());
        mapping.source_resource = None;

        let mut references = vec![resource.handle_id()];
        references.extend(mapping.heap);
        self.track_tile_mapping(queue, resource, mapping, references);
    }

    /// ID3D12CommandQueue::CopyTileMappings
    pub fn post_process_copy_tile_mappings(
        &self,
        queue: &Arc<Wrapper>,
        dst_resource: &Arc<Wrapper>,
        src_resource: &Wrapper,
        copy: TileMappingCopy,
    ) {
        let mapping = TileMapping {
            call_id: ApiCallId::ID3D12CommandQueueCopyTileMappings,
            heap: None,
            source_resource: Some(src_resource.handle_id()),
            region_coordinates: vec![copy.dst_coordinate, copy.src_coordinate],
            region_sizes: vec![copy.region_size],
            range_flags: Vec::new(),
            heap_range_start_offsets: Vec::new(),
            range_tile_counts: Vec::new(),
            flags: copy.flags,
        };
        let references = vec![dst_resource.handle_id(), src_resource.handle_id()];
        self.track_tile_mapping(queue, dst_resource, mapping, references);
    }

    fn track_tile_mapping(
        &self,
        queue: &Arc<Wrapper>,
        resource: &Arc<Wrapper>,
        mapping: TileMapping,
        references: Vec<HandleId>,
    ) {
        if let Some(tracker) = self.tracker() {
            let thread = self.thread_data();
            let command = {
                let call = thread.call();
                TrackedCommand::new(
                    call.call_id,
                    thread.thread_id(),
                    CommandKind::TileMapping,
                    call.encoder.data().to_vec(),
                    references,
                )
            };
            let resource = resource.clone();
            tracker.track_queue_command(
                queue,
                command.with_extractor(Box::new(move || {
                    vec![StateChange::TileMapping { resource, mapping }]
                })),
            );
        }
        self.end_method_call_capture();
    }
}

fn record_fence_signal(fence: &Wrapper, value: u64) {
    let mut state = fence.lock();
    if let Some(info) = state.fence_mut() {
        info.last_signaled_value = value;
        info.pending_values.retain(|pending| *pending > value);
        debug!(fence = fence.handle_id(), value, "Fence signaled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{
        CommittedResourceDesc, HeapProperties, HeapType, ResourceDesc, ResourceStates,
        TileMappingFlags, TileRangeFlags, TileRegionSize, TiledResourceCoordinate, ALL_SUBRESOURCES,
    };
    use crate::capture::RecordingSink;
    use crate::core::config::{CaptureSettings, MemoryTrackingMode};
    use crate::testing::{next_address, tracking_manager, MockObject};
    use crate::state::ObjectStateRecord;
    use crate::wrapper::FenceInfo;

    fn create(manager: &CaptureManager, call_id: ApiCallId, kind: ObjectKind, parent: Option<&Wrapper>) -> Arc<Wrapper> {
        match parent {
            Some(parent) => {
                manager.begin_method_call_capture(call_id, parent.handle_id());
                manager.end_create_method_call_capture(
                    HResult::S_OK,
                    Some(Box::new(MockObject::new(next_address()))),
                    kind,
                    parent,
                )
            }
            None => {
                manager.begin_api_call_capture(call_id);
                manager.end_create_api_call_capture(
                    HResult::S_OK,
                    Some(Box::new(MockObject::new(next_address()))),
                    kind,
                )
            }
        }
        .unwrap()
    }

    fn create_buffer(manager: &CaptureManager, device: &Wrapper, heap_type: HeapType, size: u64) -> Arc<Wrapper> {
        manager.begin_method_call_capture(
            ApiCallId::ID3D12DeviceCreateCommittedResource,
            device.handle_id(),
        );
        let mut created = CommittedResourceDesc::new(
            ResourceDesc::buffer(size),
            HeapProperties::new(heap_type),
            ResourceStates::COMMON,
        );
        let request = manager.pre_process_create_committed_resource(&mut created);
        manager
            .post_process_create_committed_resource(
                device,
                HResult::S_OK,
                Some(Box::new(MockObject::new(next_address()))),
                &created,
                request,
            )
            .unwrap()
    }

    struct Fixture {
        manager: CaptureManager,
        sink: Arc<RecordingSink>,
        device: Arc<Wrapper>,
        queue: Arc<Wrapper>,
        list: Arc<Wrapper>,
    }

    fn fixture(settings: CaptureSettings) -> Fixture {
        let (manager, sink) = tracking_manager(settings);
        let device = create(&manager, ApiCallId::D3D12CreateDevice, ObjectKind::Device, None);
        let queue = create(
            &manager,
            ApiCallId::ID3D12DeviceCreateCommandQueue,
            ObjectKind::CommandQueue,
            Some(&device),
        );
        let list = create(
            &manager,
            ApiCallId::ID3D12DeviceCreateCommandList,
            ObjectKind::CommandList,
            Some(&device),
        );
        Fixture {
            manager,
            sink,
            device,
            queue,
            list,
        }
    }

    fn resource_state(resource: &Wrapper) -> Option<ResourceStates> {
        resource
            .lock()
            .resource()
            .and_then(|info| info.states.get(&ALL_SUBRESOURCES).copied())
    }

    fn execute(f: &Fixture) {
        f.manager.begin_method_call_capture(
            ApiCallId::ID3D12CommandQueueExecuteCommandLists,
            f.queue.handle_id(),
        );
        f.manager
            .pre_process_execute_command_lists(&f.queue, std::slice::from_ref(&f.list));
    }

    #[test]
    fn test_barrier_applies_at_submission() {
        let f = fixture(CaptureSettings::default());
        let texture = create_buffer(&f.manager, &f.device, HeapType::DEFAULT, 256);

        f.manager.begin_method_call_capture(
            ApiCallId::ID3D12GraphicsCommandListResourceBarrier,
            f.list.handle_id(),
        );
        f.manager.post_process_resource_barrier(
            &f.list,
            vec![ResourceBarrier::transition(
                &texture,
                ResourceStates::COMMON,
                ResourceStates::COPY_DEST,
            )],
        );

        let tracker = f.manager.state_tracker().unwrap();
        assert_eq!(tracker.pending_command_count(f.list.handle_id()), 1);
        assert_eq!(resource_state(&texture), Some(ResourceStates::COMMON));

        execute(&f);
        assert_eq!(resource_state(&texture), Some(ResourceStates::COPY_DEST));
        assert_eq!(tracker.pending_command_count(f.list.handle_id()), 0);
    }

    #[test]
    fn test_reset_discards_recorded_commands() {
        let f = fixture(CaptureSettings::default());
        let texture = create_buffer(&f.manager, &f.device, HeapType::DEFAULT, 256);
        let allocator = create(
            &f.manager,
            ApiCallId::ID3D12DeviceCreateCommandAllocator,
            ObjectKind::CommandAllocator,
            Some(&f.device),
        );

        f.manager.begin_method_call_capture(
            ApiCallId::ID3D12GraphicsCommandListResourceBarrier,
            f.list.handle_id(),
        );
        f.manager.post_process_resource_barrier(
            &f.list,
            vec![ResourceBarrier::transition(
                &texture,
                ResourceStates::COMMON,
                ResourceStates::RENDER_TARGET,
            )],
        );
        f.manager.begin_method_call_capture(
            ApiCallId::ID3D12GraphicsCommandListReset,
            f.list.handle_id(),
        );
        f.manager
            .post_process_command_list_reset(&f.list, HResult::S_OK, &allocator);
        f.manager.begin_method_call_capture(
            ApiCallId::ID3D12GraphicsCommandListClose,
            f.list.handle_id(),
        );
        f.manager.post_process_command_list_close(&f.list);

        let tracker = f.manager.state_tracker().unwrap();
        assert_eq!(tracker.pending_command_count(f.list.handle_id()), 2);

        execute(&f);
        assert_eq!(resource_state(&texture), Some(ResourceStates::COMMON));
    }

    #[test]
    fn test_submission_flushes_mapped_memory_first() {
        let mut settings = CaptureSettings::default();
        settings.memory.tracking_mode = MemoryTrackingMode::Unassisted;
        let f = fixture(settings);
        let upload = create_buffer(&f.manager, &f.device, HeapType::UPLOAD, 64);

        let storage = vec![7u8; 64];
        f.manager
            .begin_method_call_capture(ApiCallId::ID3D12ResourceMap, upload.handle_id());
        f.manager
            .post_process_resource_map(&upload, HResult::S_OK, 0, Some(storage.as_ptr() as usize));

        execute(&f);

        let events = f.sink.events();
        let fill = events
            .iter()
            .position(|event| matches!(event, crate::capture::SinkEvent::FillMemory { .. }))
            .unwrap();
        let submit = events
            .iter()
            .position(|event| {
                matches!(
                    event,
                    crate::capture::SinkEvent::Call(call)
                        if call.call_id == ApiCallId::ID3D12CommandQueueExecuteCommandLists
                )
            })
            .unwrap();
        assert!(fill < submit);
        assert_eq!(f.sink.fill_memory()[0].data, storage);
        assert!(f.manager.memory_tracker().is_mapped(upload.handle_id()));
    }

    #[test]
    fn test_fence_values_tracked() {
        let f = fixture(CaptureSettings::default());
        f.manager
            .begin_method_call_capture(ApiCallId::ID3D12DeviceCreateFence, f.device.handle_id());
        let fence = f
            .manager
            .post_process_create_fence(
                &f.device,
                HResult::S_OK,
                Some(Box::new(MockObject::new(next_address()))),
                1,
            )
            .unwrap();

        f.manager
            .begin_method_call_capture(ApiCallId::ID3D12FenceSetEventOnCompletion, fence.handle_id());
        f.manager
            .post_process_fence_set_event_on_completion(&fence, HResult::S_OK, 3);
        f.manager
            .begin_method_call_capture(ApiCallId::ID3D12CommandQueueSignal, f.queue.handle_id());
        f.manager.post_process_queue_signal(HResult::S_OK, &fence, 2);

        let info = |fence: &Wrapper| -> FenceInfo {
            let mut state = fence.lock();
            state.fence_mut().unwrap().clone()
        };
        assert_eq!(info(&fence).last_signaled_value, 2);
        assert_eq!(info(&fence).pending_values, vec![3]);

        f.manager
            .begin_method_call_capture(ApiCallId::ID3D12FenceSignal, fence.handle_id());
        f.manager.post_process_fence_signal(&fence, HResult::S_OK, 3);
        assert_eq!(info(&fence).last_signaled_value, 3);
        assert!(info(&fence).pending_values.is_empty());

        f.manager
            .begin_method_call_capture(ApiCallId::ID3D12FenceSignal, fence.handle_id());
        f.manager.post_process_fence_signal(&fence, HResult::E_FAIL, 9);
        assert_eq!(info(&fence).last_signaled_value, 3);
    }

    #[test]
    fn test_tile_mappings_apply_immediately() {
        let f = fixture(CaptureSettings::default());
        f.manager.begin_method_call_capture(
            ApiCallId::ID3D12DeviceCreateReservedResource,
            f.device.handle_id(),
        );
        let reserved = f
            .manager
            .post_process_create_reserved_resource(
                &f.device,
                HResult::S_OK,
                Some(Box::new(MockObject::new(next_address()))),
                &ResourceDesc::buffer(1 << 20),
                ResourceStates::COMMON,
            )
            .unwrap();
        let heap = create(&f.manager, ApiCallId::ID3D12DeviceCreateHeap, ObjectKind::Heap, Some(&f.device));

        f.manager.begin_method_call_capture(
            ApiCallId::ID3D12CommandQueueUpdateTileMappings,
            f.queue.handle_id(),
        );
        f.manager.post_process_update_tile_mappings(
            &f.queue,
            &reserved,
            Some(&heap),
            TileMapping {
                call_id: ApiCallId::Unknown,
                heap: None,
                source_resource: None,
                region_coordinates: vec![TiledResourceCoordinate::default()],
                region_sizes: vec![TileRegionSize {
                    num_tiles: 4,
                    ..Default::default()
                }],
                range_flags: vec![TileRangeFlags::NONE],
                heap_range_start_offsets: vec![0],
                range_tile_counts: vec![4],
                flags: TileMappingFlags::NONE,
            },
        );

        {
            let state = reserved.lock();
            let mappings = &state.resource().unwrap().tile_mappings;
            assert_eq!(mappings.len(), 1);
            assert_eq!(mappings[0].heap, Some(heap.handle_id()));
            assert_eq!(
                mappings[0].call_id,
                ApiCallId::ID3D12CommandQueueUpdateTileMappings
            );
        }

        let tracker = f.manager.state_tracker().unwrap();
        assert_eq!(tracker.pending_command_count(f.queue.handle_id()), 0);
        let snapshot = tracker.snapshot(1, &f.manager.process_state());
        assert!(snapshot.referenced_handles().is_subset(&snapshot.handles()));
    }

    fn command_list_info(list: &Wrapper) -> CommandListInfo {
        *list.lock().command_list().unwrap()
    }

    #[test]
    fn test_command_list_state_follows_reset_and_close() {
        let f = fixture(CaptureSettings::default());
        let first = create(
            &f.manager,
            ApiCallId::ID3D12DeviceCreateCommandAllocator,
            ObjectKind::CommandAllocator,
            Some(&f.device),
        );
        let second = create(
            &f.manager,
            ApiCallId::ID3D12DeviceCreateCommandAllocator,
            ObjectKind::CommandAllocator,
            Some(&f.device),
        );

        f.manager.begin_method_call_capture(
            ApiCallId::ID3D12DeviceCreateCommandList,
            f.device.handle_id(),
        );
        let list = f
            .manager
            .post_process_create_command_list(
                &f.device,
                HResult::S_OK,
                Some(Box::new(MockObject::new(next_address()))),
                CommandListType::DIRECT,
                &first,
            )
            .unwrap();
        assert_eq!(
            command_list_info(&list),
            CommandListInfo {
                list_type: CommandListType::DIRECT,
                allocator: Some(first.handle_id()),
                closed: false,
            }
        );

        f.manager
            .begin_method_call_capture(ApiCallId::ID3D12GraphicsCommandListClose, list.handle_id());
        f.manager.post_process_command_list_close(&list);
        assert!(command_list_info(&list).closed);

        f.manager
            .begin_method_call_capture(ApiCallId::ID3D12GraphicsCommandListReset, list.handle_id());
        f.manager
            .post_process_command_list_reset(&list, HResult::S_OK, &second);
        let info = command_list_info(&list);
        assert!(!info.closed);
        assert_eq!(info.allocator, Some(second.handle_id()));

        let snapshot = f
            .manager
            .state_tracker()
            .unwrap()
            .snapshot(1, &f.manager.process_state());
        match &snapshot.object(list.handle_id()).unwrap().state {
            ObjectStateRecord::CommandList(record) => {
                assert_eq!(record.allocator, Some(second.handle_id()))
            }
            other => panic!("unexpected state {:?}", other),
        }
        assert!(snapshot.referenced_handles().contains(&second.handle_id()));
    }

    #[test]
    fn test_command_list1_starts_closed_without_allocator() {
        let f = fixture(CaptureSettings::default());
        f.manager.begin_method_call_capture(
            ApiCallId::ID3D12Device4CreateCommandList1,
            f.device.handle_id(),
        );
        let list = f
            .manager
            .post_process_create_command_list1(
                &f.device,
                HResult::S_OK,
                Some(Box::new(MockObject::new(next_address()))),
                CommandListType::COMPUTE,
            )
            .unwrap();
        let info = command_list_info(&list);
        assert!(info.closed);
        assert_eq!(info.allocator, None);
        assert_eq!(info.list_type, CommandListType::COMPUTE);

        f.manager.begin_method_call_capture(
            ApiCallId::ID3D12Device4CreateCommandList1,
            f.device.handle_id(),
        );
        let failed = f.manager.post_process_create_command_list1(
            &f.device,
            HResult::E_INVALIDARG,
            None,
            CommandListType::DIRECT,
        );
        assert!(failed.is_none());
    }
}
