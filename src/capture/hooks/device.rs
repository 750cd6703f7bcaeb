//! 设备级钩子：命令队列、栅栏、描述符堆与描述符、私有数据、驻留优先级，
//! 以及管线库和特性查询的改写

use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::native::NativeObject;
use crate::api::types::{
    CommandListType, CommandQueueDesc, CpuDescriptorHandle, DescriptorHeapFlags, DescriptorHeapType,
    Feature, GpuDescriptorHandle, Guid, HResult, ResidencyPriority, ShaderCacheSupportFlags,
    ViewDesc,
};
use crate::capture::CaptureManager;
use crate::wrapper::{
    CommandQueueInfo, DescriptorHandleTable, DescriptorHeapInfo, FenceInfo, ObjectKind, Wrapper,
    WrapperInfo,
};

/// CopyDescriptors 的一段连续描述符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorRange {
    pub start: CpuDescriptorHandle,
    /// 描述符个数；`None` 表示 1
    pub size: Option<u32>,
}

impl DescriptorRange {
    pub fn new(start: CpuDescriptorHandle, size: Option<u32>) -> Self {
        Self { start, size }
    }

    fn len(&self) -> u32 {
        self.size.unwrap_or(1)
    }
}

impl CaptureManager {
    /// ID3D12Device::CreateCommandQueue
    ///
    /// 直接队列会被记住，供交换链截图使用。
    pub fn post_process_create_command_queue(
        &self,
        device: &Wrapper,
        result: HResult,
        native: Option<Box<dyn NativeObject>>,
        desc: &CommandQueueDesc,
    ) -> Option<Arc<Wrapper>> {
        let queue = self.wrap_created(result, native, ObjectKind::CommandQueue);
        if let Some(queue) = &queue {
            queue.set_info(WrapperInfo::CommandQueue(CommandQueueInfo { desc: *desc }));
            if desc.list_type == CommandListType::DIRECT {
                self.direct_queues.lock().push(queue.clone());
            }
        }
        self.finish_create_call(queue.as_ref(), result, Some(device.handle_id()));
        queue
    }

    /// ID3D12Device::CreateFence
    pub fn post_process_create_fence(
        &self,
        device: &Wrapper,
        result: HResult,
        native: Option<Box<dyn NativeObject>>,
        initial_value: u64,
    ) -> Option<Arc<Wrapper>> {
        let fence = self.wrap_created(result, native, ObjectKind::Fence);
        if let Some(fence) = &fence {
            fence.set_info(WrapperInfo::Fence(FenceInfo {
                initial_value,
                last_signaled_value: initial_value,
                pending_values: Vec::new(),
            }));
        }
        self.finish_create_call(fence.as_ref(), result, Some(device.handle_id()));
        fence
    }

    /// ID3D12Device::CreateDescriptorHeap
    ///
    /// 为新堆分配一段虚拟句柄空间，并记录原生起始地址和描述符增量。
    pub fn post_process_create_descriptor_heap(
        &self,
        device: &Wrapper,
        result: HResult,
        native: Option<Box<dyn NativeObject>>,
    ) -> Option<Arc<Wrapper>> {
        let heap = self.wrap_created(result, native, ObjectKind::DescriptorHeap);

        if let Some(heap) = &heap {
            match self.build_descriptor_table(device, heap) {
                Some(info) => {
                    debug!(
                        handle_id = heap.handle_id(),
                        heap_type = ?info.desc.heap_type,
                        num_descriptors = info.desc.num_descriptors,
                        virtual_cpu_start = info.table.virtual_cpu_start.ptr,
                        "Descriptor heap created"
                    );
                    heap.set_info(WrapperInfo::DescriptorHeap(info));
                    self.register_descriptor_heap(heap);
                }
                None => warn!(
                    handle_id = heap.handle_id(),
                    "Descriptor heap without native heap or device capabilities"
                ),
            }
        }

        self.finish_create_call(heap.as_ref(), result, Some(device.handle_id()));
        heap
    }

    fn build_descriptor_table(
        &self,
        device: &Wrapper,
        heap: &Wrapper,
    ) -> Option<DescriptorHeapInfo> {
        let native_heap = heap.native().as_descriptor_heap()?;
        let native_device = device.native().as_device()?;

        let desc = native_heap.desc();
        let increment_size = native_device.descriptor_handle_increment_size(desc.heap_type);
        let span = desc.num_descriptors as usize * increment_size as usize;

        let shader_visible = desc.flags.contains(DescriptorHeapFlags::SHADER_VISIBLE)
            && matches!(
                desc.heap_type,
                DescriptorHeapType::CBV_SRV_UAV | DescriptorHeapType::SAMPLER
            );
        let (native_gpu_start, virtual_gpu_start) = if shader_visible {
            (
                Some(native_heap.gpu_descriptor_handle_for_heap_start()),
                Some(self.descriptor_allocator.allocate_gpu(span)),
            )
        } else {
            (None, None)
        };

        let table = DescriptorHandleTable {
            native_cpu_start: native_heap.cpu_descriptor_handle_for_heap_start(),
            virtual_cpu_start: self.descriptor_allocator.allocate_cpu(span),
            native_gpu_start,
            virtual_gpu_start,
            increment_size,
            num_descriptors: desc.num_descriptors,
        };
        Some(DescriptorHeapInfo::new(desc, table))
    }

    /// ID3D12DescriptorHeap::GetCPUDescriptorHandleForHeapStart
    ///
    /// 返回虚拟起始句柄；不认识的堆返回原生值。
    pub fn override_get_cpu_descriptor_handle_for_heap_start(
        &self,
        heap: &Wrapper,
    ) -> CpuDescriptorHandle {
        if let Some(info) = heap.lock().descriptor_heap() {
            return info.table.virtual_cpu_start;
        }
        heap.native()
            .as_descriptor_heap()
            .map(|native| native.cpu_descriptor_handle_for_heap_start())
            .unwrap_or_default()
    }

    /// ID3D12DescriptorHeap::GetGPUDescriptorHandleForHeapStart
    ///
    /// 非着色器可见的堆返回 0。
    pub fn override_get_gpu_descriptor_handle_for_heap_start(
        &self,
        heap: &Wrapper,
    ) -> GpuDescriptorHandle {
        if let Some(info) = heap.lock().descriptor_heap() {
            return info.table.virtual_gpu_start.unwrap_or_default();
        }
        heap.native()
            .as_descriptor_heap()
            .map(|native| native.gpu_descriptor_handle_for_heap_start())
            .unwrap_or_default()
    }

    /// ID3D12Device::CopyDescriptors
    ///
    /// 按目标、源两组范围逐个描述符对齐复制槽位内容。
    pub fn post_process_copy_descriptors(
        &self,
        dest_ranges: &[DescriptorRange],
        src_ranges: &[DescriptorRange],
    ) {
        if self.tracker().is_some() {
            let dests = self.expand_ranges(dest_ranges);
            let srcs = self.expand_ranges(src_ranges);
            if dests.len() != srcs.len() {
                warn!(
                    dest = dests.len(),
                    src = srcs.len(),
                    "CopyDescriptors range totals differ"
                );
            }
            for (dest, src) in dests.into_iter().zip(srcs) {
                if let (Some((dest_heap, dest_index)), Some((src_heap, src_index))) = (dest, src) {
                    copy_descriptor_slot(&dest_heap, dest_index, &src_heap, src_index);
                }
            }
        }
        self.end_method_call_capture();
    }

    /// ID3D12Device::CopyDescriptorsSimple
    pub fn post_process_copy_descriptors_simple(
        &self,
        num_descriptors: u32,
        dest_start: CpuDescriptorHandle,
        src_start: CpuDescriptorHandle,
    ) {
        self.post_process_copy_descriptors(
            &[DescriptorRange::new(dest_start, Some(num_descriptors))],
            &[DescriptorRange::new(src_start, Some(num_descriptors))],
        );
    }

    /// 把描述符范围展开为逐个 (堆, 槽位)
    ///
    /// 每段范围的起始句柄单独解析，不同堆的范围可以混在一起。
    fn expand_ranges(&self, ranges: &[DescriptorRange]) -> Vec<Option<(Arc<Wrapper>, u32)>> {
        let mut slots = Vec::new();
        for range in ranges {
            match self.resolve_cpu_descriptor(range.start) {
                Some((heap, base)) => {
                    slots.extend((0..range.len()).map(|i| Some((heap.clone(), base + i))));
                }
                None => {
                    warn!(handle = range.start.ptr, "CopyDescriptors range is not a known descriptor");
                    slots.extend((0..range.len()).map(|_| None));
                }
            }
        }
        slots
    }

    /// ID3D12Object::SetPrivateData / SetPrivateDataInterface
    pub fn post_process_set_private_data(
        &self,
        object: &Wrapper,
        result: HResult,
        guid: Guid,
        data: &[u8],
    ) {
        if result.succeeded() && self.tracker().is_some() {
            object.lock().set_private_data(guid, data.to_vec());
        }
        self.end_method_call_capture();
    }

    /// ID3D12Device1::SetResidencyPriority
    pub fn post_process_set_residency_priority(
        &self,
        result: HResult,
        objects: &[Arc<Wrapper>],
        priorities: &[ResidencyPriority],
    ) {
        if result.succeeded() && self.tracker().is_some() {
            if objects.len() != priorities.len() {
                warn!(
                    objects = objects.len(),
                    priorities = priorities.len(),
                    "SetResidencyPriority argument lengths differ"
                );
            }
            for (object, priority) in objects.iter().zip(priorities) {
                object.lock().residency_priority = Some(*priority);
            }
        }
        self.end_method_call_capture();
    }

    /// ID3D12Device8::CreateSamplerFeedbackUnorderedAccessView
    ///
    /// 反馈资源记在槽位的计数器资源位置上。
    pub fn post_process_create_sampler_feedback_unordered_access_view(
        &self,
        targeted: Option<&Wrapper>,
        feedback: Option<&Wrapper>,
        dest: CpuDescriptorHandle,
    ) {
        self.end_create_descriptor_method_call_capture(
            dest,
            ViewDesc::SamplerFeedback,
            targeted,
            feedback,
        );
    }

    /// ID3D12Device1::CreatePipelineLibrary
    ///
    /// 不转发，总是报告不支持；应用会退回逐个创建管线状态。
    pub fn override_create_pipeline_library(&self) -> HResult {
        debug!("Pipeline libraries are disabled while capturing");
        HResult::DXGI_ERROR_UNSUPPORTED
    }

    /// ID3D12PipelineLibrary::LoadGraphicsPipeline / LoadComputePipeline，
    /// ID3D12PipelineLibrary1::LoadPipeline
    ///
    /// 库里不会有任何管线，不转发，按"名称不存在"返回。
    pub fn override_load_pipeline(&self) -> HResult {
        HResult::E_INVALIDARG
    }

    /// ID3D12Device::CheckFeatureSupport 返回后
    ///
    /// 与 `override_create_pipeline_library` 保持一致：着色器缓存不再报告管线库支持。
    pub fn post_process_check_feature_support(
        &self,
        result: HResult,
        feature: Feature,
        data: &mut [u8],
    ) {
        if result.succeeded() && feature == Feature::SHADER_CACHE {
            if let Some(head) = data.get_mut(..4) {
                let flags: ShaderCacheSupportFlags = bytemuck::pod_read_unaligned(head);
                if flags.contains(ShaderCacheSupportFlags::LIBRARY) {
                    let cleared = flags & !ShaderCacheSupportFlags::LIBRARY;
                    head.copy_from_slice(bytemuck::bytes_of(&cleared));
                    debug!("Removed pipeline library support from shader cache query");
                }
            }
        }
        self.encode_parameters(|encoder| {
            encoder.encode(&feature).encode_bytes(data).encode(&result);
        });
        self.end_method_call_capture();
    }
}

/// 目标槽位变成源槽位内容的副本；源为空时目标被清空
fn copy_descriptor_slot(dest_heap: &Wrapper, dest_index: u32, src_heap: &Wrapper, src_index: u32) {
    let slot = src_heap
        .lock()
        .descriptor_heap()
        .and_then(|info| info.slot(src_index).cloned());
    if let Some(info) = dest_heap.lock().descriptor_heap_mut() {
        if !info.set_slot(dest_index, slot) {
            warn!(index = dest_index, "CopyDescriptors destination out of range");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{
        CommittedResourceDesc, DescriptorHeapDesc, HeapProperties, HeapType, ResourceDesc, ResourceStates,
        ViewDesc,
    };
    use crate::core::config::CaptureSettings;
    use crate::format::ApiCallId;
    use crate::state::ObjectStateRecord;
    use crate::testing::{next_address, tracking_manager, MockDescriptorHeap, MockDevice, MockObject};

    fn create_device(manager: &CaptureManager) -> Arc<Wrapper> {
        manager.begin_api_call_capture(ApiCallId::D3D12CreateDevice);
        manager
            .end_create_api_call_capture(
                HResult::S_OK,
                Some(Box::new(MockDevice::new(next_address()))),
                ObjectKind::Device,
            )
            .unwrap()
    }

    fn create_heap(manager: &CaptureManager, device: &Wrapper, num_descriptors: u32) -> Arc<Wrapper> {
        create_heap_of(
            manager,
            device,
            DescriptorHeapType::CBV_SRV_UAV,
            DescriptorHeapFlags::SHADER_VISIBLE,
            num_descriptors,
        )
    }

    fn create_heap_of(
        manager: &CaptureManager,
        device: &Wrapper,
        heap_type: DescriptorHeapType,
        flags: DescriptorHeapFlags,
        num_descriptors: u32,
    ) -> Arc<Wrapper> {
        let desc = DescriptorHeapDesc {
            heap_type,
            num_descriptors,
            flags,
            node_mask: 0,
        };
        manager.begin_method_call_capture(
            ApiCallId::ID3D12DeviceCreateDescriptorHeap,
            device.handle_id(),
        );
        manager
            .post_process_create_descriptor_heap(
                device,
                HResult::S_OK,
                Some(Box::new(MockDescriptorHeap::new(next_address(), desc))),
            )
            .unwrap()
    }

    fn create_texture(manager: &CaptureManager, device: &Wrapper) -> Arc<Wrapper> {
        manager.begin_method_call_capture(
            ApiCallId::ID3D12DeviceCreateCommittedResource,
            device.handle_id(),
        );
        let mut created = CommittedResourceDesc::new(
            ResourceDesc::texture_2d(64, 64, crate::api::types::Format::R8G8B8A8_UNORM),
            HeapProperties::new(HeapType::DEFAULT),
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

    fn create_srv(
        manager: &CaptureManager,
        device: &Wrapper,
        resource: &Wrapper,
        dest: CpuDescriptorHandle,
    ) {
        let view = ViewDesc::ShaderResource(None);
        manager.begin_method_call_capture(view.create_call_id(), device.handle_id());
        manager.encode_parameters(|encoder| {
            encoder.encode_handle_id(resource.handle_id()).encode(&dest);
        });
        manager.end_create_descriptor_method_call_capture(dest, view, Some(resource), None);
    }

    fn slot_resource(heap: &Wrapper, index: u32) -> Option<u64> {
        heap.lock()
            .descriptor_heap()
            .and_then(|info| info.slot(index).and_then(|slot| slot.resource))
    }

    #[test]
    fn test_copy_descriptors_simple_copies_slot() {
        let (manager, _sink) = tracking_manager(CaptureSettings::default());
        let device = create_device(&manager);
        let heap = create_heap(&manager, &device, 8);
        let texture = create_texture(&manager, &device);

        let start = manager.override_get_cpu_descriptor_handle_for_heap_start(&heap);
        let increment = heap.lock().descriptor_heap().unwrap().table.increment_size;
        create_srv(&manager, &device, &texture, start);

        manager.begin_method_call_capture(
            ApiCallId::ID3D12DeviceCopyDescriptorsSimple,
            device.handle_id(),
        );
        manager.post_process_copy_descriptors_simple(1, start.offset(5, increment), start);

        assert_eq!(slot_resource(&heap, 5), Some(texture.handle_id()));
        assert_eq!(slot_resource(&heap, 0), Some(texture.handle_id()));
        let state = heap.lock();
        let info = state.descriptor_heap().unwrap();
        assert_eq!(info.slot(5).unwrap().view, ViewDesc::ShaderResource(None));
        assert_eq!(
            info.slot(5).unwrap().create_call,
            ApiCallId::ID3D12DeviceCreateShaderResourceView
        );
        assert!(info.slot(1).is_none());
    }

    #[test]
    fn test_copy_from_empty_slot_clears_destination() {
        let (manager, _sink) = tracking_manager(CaptureSettings::default());
        let device = create_device(&manager);
        let source = create_heap(&manager, &device, 4);
        let dest = create_heap(&manager, &device, 4);
        let texture = create_texture(&manager, &device);

        let dest_start = manager.override_get_cpu_descriptor_handle_for_heap_start(&dest);
        let src_start = manager.override_get_cpu_descriptor_handle_for_heap_start(&source);
        let increment = dest.lock().descriptor_heap().unwrap().table.increment_size;
        create_srv(&manager, &device, &texture, dest_start.offset(2, increment));
        create_srv(&manager, &device, &texture, src_start);

        manager.begin_method_call_capture(ApiCallId::ID3D12DeviceCopyDescriptors, device.handle_id());
        manager.post_process_copy_descriptors(
            &[DescriptorRange::new(dest_start, Some(3))],
            &[
                DescriptorRange::new(src_start, None),
                DescriptorRange::new(src_start.offset(1, increment), Some(2)),
            ],
        );

        assert_eq!(slot_resource(&dest, 0), Some(texture.handle_id()));
        assert_eq!(slot_resource(&dest, 1), None);
        assert_eq!(slot_resource(&dest, 2), None);
    }

    #[test]
    fn test_descriptor_handles_unwrap_to_native() {
        let (manager, _sink) = tracking_manager(CaptureSettings::default());
        let device = create_device(&manager);
        let heap = create_heap(&manager, &device, 16);

        let table = heap.lock().descriptor_heap().unwrap().table;
        let cpu = manager.override_get_cpu_descriptor_handle_for_heap_start(&heap);
        let gpu = manager.override_get_gpu_descriptor_handle_for_heap_start(&heap);
        assert_eq!(cpu, table.virtual_cpu_start);
        assert_ne!(cpu, table.native_cpu_start);

        let inc = table.increment_size;
        assert_eq!(
            manager.unwrap_cpu_descriptor_handle(cpu.offset(7, inc)),
            table.native_cpu_start.offset(7, inc)
        );
        assert_eq!(
            manager.unwrap_gpu_descriptor_handle(gpu.offset(3, inc)),
            table.native_gpu_start.unwrap().offset(3, inc)
        );

        let unknown = CpuDescriptorHandle { ptr: 0x10 };
        assert_eq!(manager.unwrap_cpu_descriptor_handle(unknown), unknown);
        assert!(manager.resolve_cpu_descriptor(cpu.offset(16, inc)).is_none());

        manager.release(&heap);
        assert!(manager.resolve_cpu_descriptor(cpu).is_none());
    }

    #[test]
    fn test_snapshot_closure_covers_references() {
        let (manager, _sink) = tracking_manager(CaptureSettings::default());
        let device = create_device(&manager);
        let heap = create_heap(&manager, &device, 8);
        let texture = create_texture(&manager, &device);
        let start = manager.override_get_cpu_descriptor_handle_for_heap_start(&heap);
        create_srv(&manager, &device, &texture, start);

        let tracker = manager.state_tracker().unwrap();
        let snapshot = tracker.snapshot(1, &manager.process_state());
        let handles = snapshot.handles();
        assert!(snapshot.referenced_handles().is_subset(&handles));
        assert!(handles.contains(&texture.handle_id()));

        match &snapshot.object(heap.handle_id()).unwrap().state {
            ObjectStateRecord::DescriptorHeap { slots, .. } => {
                assert_eq!(slots.len(), 1);
                assert_eq!(slots[0].0, 0);
                assert_eq!(slots[0].1.resource, Some(texture.handle_id()));
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_private_data_and_residency_tracked() {
        let (manager, _sink) = tracking_manager(CaptureSettings::default());
        let device = create_device(&manager);
        let texture = create_texture(&manager, &device);
        let guid = Guid::from_u128(0x429b8c22_9188_4b0c_8742_acb0bf85c200);

        manager.begin_method_call_capture(ApiCallId::ID3D12ObjectSetPrivateData, texture.handle_id());
        manager.post_process_set_private_data(&texture, HResult::S_OK, guid, b"albedo");
        manager.begin_method_call_capture(
            ApiCallId::ID3D12Device1SetResidencyPriority,
            device.handle_id(),
        );
        manager.post_process_set_residency_priority(
            HResult::S_OK,
            std::slice::from_ref(&texture),
            &[ResidencyPriority::HIGH],
        );

        let snapshot = manager
            .state_tracker()
            .unwrap()
            .snapshot(1, &manager.process_state());
        let record = snapshot.object(texture.handle_id()).unwrap();
        assert_eq!(record.private_data, vec![(guid, b"albedo".to_vec())]);
        assert_eq!(record.residency_priority, Some(ResidencyPriority::HIGH));
    }

    #[test]
    fn test_direct_queue_remembered_until_release() {
        let (manager, _sink) = tracking_manager(CaptureSettings::default());
        let device = create_device(&manager);
        let desc = CommandQueueDesc {
            list_type: CommandListType::DIRECT,
            priority: 0,
            flags: 0,
            node_mask: 0,
        };
        manager.begin_method_call_capture(
            ApiCallId::ID3D12DeviceCreateCommandQueue,
            device.handle_id(),
        );
        let queue = manager
            .post_process_create_command_queue(
                &device,
                HResult::S_OK,
                Some(Box::new(MockObject::new(next_address()))),
                &desc,
            )
            .unwrap();
        assert_eq!(manager.direct_queues.lock().len(), 1);

        manager.release(&queue);
        assert!(manager.direct_queues.lock().is_empty());
    }

    #[test]
    fn test_copy_render_target_descriptor() {
        let (manager, _sink) = tracking_manager(CaptureSettings::default());
        let device = create_device(&manager);
        let heap = create_heap_of(
            &manager,
            &device,
            DescriptorHeapType::RTV,
            DescriptorHeapFlags::NONE,
            8,
        );
        let texture = create_texture(&manager, &device);

        let table = heap.lock().descriptor_heap().unwrap().table;
        assert!(table.virtual_gpu_start.is_none());
        assert_eq!(
            manager.override_get_gpu_descriptor_handle_for_heap_start(&heap),
            GpuDescriptorHandle::default()
        );

        let start = manager.override_get_cpu_descriptor_handle_for_heap_start(&heap);
        let view = ViewDesc::RenderTarget(None);
        manager.begin_method_call_capture(view.create_call_id(), device.handle_id());
        manager.end_create_descriptor_method_call_capture(start, view, Some(&texture), None);

        manager.begin_method_call_capture(
            ApiCallId::ID3D12DeviceCopyDescriptorsSimple,
            device.handle_id(),
        );
        manager.post_process_copy_descriptors_simple(
            1,
            start.offset(5, table.increment_size),
            start,
        );

        let state = heap.lock();
        let info = state.descriptor_heap().unwrap();
        let copied = info.slot(5).unwrap();
        assert_eq!(copied, info.slot(0).unwrap());
        assert_eq!(copied.view, ViewDesc::RenderTarget(None));
        assert_eq!(copied.create_call, ApiCallId::ID3D12DeviceCreateRenderTargetView);
        assert_eq!(copied.resource, Some(texture.handle_id()));
    }

    #[test]
    fn test_sampler_feedback_view_references_both_resources() {
        let (manager, _sink) = tracking_manager(CaptureSettings::default());
        let device = create_device(&manager);
        let heap = create_heap(&manager, &device, 4);
        let texture = create_texture(&manager, &device);
        let feedback = create_texture(&manager, &device);
        let start = manager.override_get_cpu_descriptor_handle_for_heap_start(&heap);

        manager.begin_method_call_capture(
            ApiCallId::ID3D12Device8CreateSamplerFeedbackUnorderedAccessView,
            device.handle_id(),
        );
        manager.post_process_create_sampler_feedback_unordered_access_view(
            Some(&texture),
            Some(&feedback),
            start,
        );

        let state = heap.lock();
        let slot = state.descriptor_heap().unwrap().slot(0).unwrap().clone();
        drop(state);
        assert_eq!(slot.view, ViewDesc::SamplerFeedback);
        assert_eq!(
            slot.create_call,
            ApiCallId::ID3D12Device8CreateSamplerFeedbackUnorderedAccessView
        );
        assert_eq!(slot.resource, Some(texture.handle_id()));
        assert_eq!(slot.counter_resource, Some(feedback.handle_id()));

        let snapshot = manager
            .state_tracker()
            .unwrap()
            .snapshot(1, &manager.process_state());
        let referenced = snapshot.referenced_handles();
        assert!(referenced.contains(&texture.handle_id()));
        assert!(referenced.contains(&feedback.handle_id()));
    }

    #[test]
    fn test_pipeline_library_reported_unsupported() {
        let (manager, _sink) = tracking_manager(CaptureSettings::default());
        let device = create_device(&manager);
        let tracker = manager.state_tracker().unwrap();
        let before = tracker.live_count();

        manager.begin_method_call_capture(
            ApiCallId::ID3D12Device1CreatePipelineLibrary,
            device.handle_id(),
        );
        let result = manager.override_create_pipeline_library();
        assert_eq!(result, HResult::DXGI_ERROR_UNSUPPORTED);
        assert!(manager
            .end_create_method_call_capture(result, None, ObjectKind::Other, &device)
            .is_none());
        assert_eq!(tracker.live_count(), before);

        assert_eq!(manager.override_load_pipeline(), HResult::E_INVALIDARG);
    }

    #[test]
    fn test_shader_cache_query_hides_library_support() {
        let (manager, sink) = tracking_manager(CaptureSettings::default());
        let device = create_device(&manager);
        let reported = ShaderCacheSupportFlags::SINGLE_PSO
            | ShaderCacheSupportFlags::LIBRARY
            | ShaderCacheSupportFlags::AUTOMATIC_DISK_CACHE;
        let mut data = bytemuck::bytes_of(&reported).to_vec();

        manager.begin_method_call_capture(
            ApiCallId::ID3D12DeviceCheckFeatureSupport,
            device.handle_id(),
        );
        manager.post_process_check_feature_support(HResult::S_OK, Feature::SHADER_CACHE, &mut data);

        let flags: ShaderCacheSupportFlags = bytemuck::pod_read_unaligned(&data);
        assert!(!flags.contains(ShaderCacheSupportFlags::LIBRARY));
        assert!(flags.contains(ShaderCacheSupportFlags::SINGLE_PSO));
        assert!(flags.contains(ShaderCacheSupportFlags::AUTOMATIC_DISK_CACHE));
        assert!(sink
            .calls()
            .iter()
            .any(|call| call.call_id == ApiCallId::ID3D12DeviceCheckFeatureSupport));

        let mut other = bytemuck::bytes_of(&reported).to_vec();
        manager.begin_method_call_capture(
            ApiCallId::ID3D12DeviceCheckFeatureSupport,
            device.handle_id(),
        );
        manager.post_process_check_feature_support(
            HResult::S_OK,
            Feature::D3D12_OPTIONS,
            &mut other,
        );
        assert_eq!(other, bytemuck::bytes_of(&reported));
    }
}
