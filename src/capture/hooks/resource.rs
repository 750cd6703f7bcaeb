//! 资源与堆的钩子
//!
//! 创建前按写监视规则改写上传堆属性，创建后记录原始属性，
//! 查询时再把原始属性还给应用。Map/Unmap 交给映射内存跟踪器。

use std::sync::Arc;
use tracing::warn;

use crate::api::native::NativeObject;
use crate::api::types::{
    CommittedResourceDesc, HResult, HeapDesc, HeapFlags, HeapProperties, PlacedResourceDesc, Range,
    ResourceDesc, ResourceStates,
};
use crate::capture::CaptureManager;
use crate::memory::HeapRequest;
use crate::wrapper::{HeapInfo, ObjectKind, ResourceInfo, Wrapper, WrapperInfo};

impl CaptureManager {
    /// CreateHeap / CreateHeap1 转发前
    pub fn pre_process_create_heap(&self, desc: &mut HeapDesc) -> HeapRequest {
        let (call_id, _) = self.current_call();
        self.memory
            .prepare_heap_request(call_id, &mut desc.properties, &mut desc.flags)
    }

    /// CreateHeap / CreateHeap1 返回后
    ///
    /// `desc` 是实际转发给驱动的描述（可能已被改写）。
    pub fn post_process_create_heap(
        &self,
        device: &Wrapper,
        result: HResult,
        native: Option<Box<dyn NativeObject>>,
        desc: &HeapDesc,
        request: HeapRequest,
    ) -> Option<Arc<Wrapper>> {
        let heap = self.wrap_created(result, native, ObjectKind::Heap);
        if let Some(heap) = &heap {
            heap.set_info(WrapperInfo::Heap(HeapInfo {
                desc: *desc,
                original_properties: request.original_properties,
                original_flags: request.original_flags,
                write_watch: request.write_watch,
                opened_from_address: None,
            }));
        }
        self.finish_create_call(heap.as_ref(), result, Some(device.handle_id()));
        heap
    }

    /// ID3D12Device3::OpenExistingHeapFromAddress 转发前
    ///
    /// 回放端需要重建这段外部内存，所以先把它的当前内容写出。
    pub fn pre_process_open_existing_heap_from_address(&self, address: usize, size: u64) {
        if !self.is_writing() {
            return;
        }
        if let Some(region) = self.memory.external_region(address, size) {
            self.write_fill_memory(std::slice::from_ref(&region));
        }
    }

    /// ID3D12Device3::OpenExistingHeapFromAddress 返回后
    ///
    /// 打开的堆不经过写监视改写，原始属性就是驱动报告的属性。
    pub fn post_process_open_existing_heap_from_address(
        &self,
        device: &Wrapper,
        result: HResult,
        native: Option<Box<dyn NativeObject>>,
        address: usize,
        desc: &HeapDesc,
    ) -> Option<Arc<Wrapper>> {
        let heap = self.wrap_created(result, native, ObjectKind::Heap);
        if let Some(heap) = &heap {
            heap.set_info(WrapperInfo::Heap(HeapInfo {
                desc: *desc,
                original_properties: desc.properties,
                original_flags: desc.flags,
                write_watch: false,
                opened_from_address: Some(address as u64),
            }));
        }
        self.finish_create_call(heap.as_ref(), result, Some(device.handle_id()));
        heap
    }

    /// CreateCommittedResource / 1 / 2 转发前
    ///
    /// 可能改写 `created` 中的堆属性，转发时使用改写后的值。
    pub fn pre_process_create_committed_resource(&self, created: &mut CommittedResourceDesc) -> HeapRequest {
        let (call_id, _) = self.current_call();
        self.memory
            .prepare_heap_request(call_id, &mut created.heap_properties, &mut created.heap_flags)
    }

    /// CreateCommittedResource / 1 / 2 返回后
    ///
    /// `request` 是转发前记录的原始值。
    pub fn post_process_create_committed_resource(
        &self,
        device: &Wrapper,
        result: HResult,
        native: Option<Box<dyn NativeObject>>,
        created: &CommittedResourceDesc,
        request: HeapRequest,
    ) -> Option<Arc<Wrapper>> {
        let resource = self.wrap_created(result, native, ObjectKind::Resource);
        if let Some(resource) = &resource {
            let mut info = ResourceInfo::new(
                created.desc,
                created.heap_properties,
                created.heap_flags,
                created.initial_state,
            );
            info.original_heap_properties = request.original_properties;
            info.original_heap_flags = request.original_flags;
            info.write_watch = request.write_watch;
            resource.set_info(WrapperInfo::Resource(info));
        }
        self.finish_create_call(resource.as_ref(), result, Some(device.handle_id()));
        resource
    }

    /// CreatePlacedResource / 1 返回后
    ///
    /// 堆属性和写监视状态继承自所在的堆。
    pub fn post_process_create_placed_resource(
        &self,
        device: &Wrapper,
        result: HResult,
        native: Option<Box<dyn NativeObject>>,
        heap: &Wrapper,
        placed: &PlacedResourceDesc,
    ) -> Option<Arc<Wrapper>> {
        let resource = self.wrap_created(result, native, ObjectKind::Resource);
        if let Some(resource) = &resource {
            let heap_info = heap.lock().heap().cloned();
            let mut info = match heap_info {
                Some(heap_info) => {
                    let mut info = ResourceInfo::new(
                        placed.desc,
                        heap_info.desc.properties,
                        heap_info.desc.flags,
                        placed.initial_state,
                    );
                    info.original_heap_properties = heap_info.original_properties;
                    info.original_heap_flags = heap_info.original_flags;
                    info.write_watch = heap_info.write_watch;
                    info
                }
                None => {
                    warn!(heap = heap.handle_id(), "Placed resource on an untracked heap");
                    ResourceInfo::new(
                        placed.desc,
                        HeapProperties::default(),
                        HeapFlags::NONE,
                        placed.initial_state,
                    )
                }
            };
            info.heap = Some(heap.handle_id());
            info.heap_offset = placed.heap_offset;
            resource.set_info(WrapperInfo::Resource(info));
        }
        self.finish_create_call(resource.as_ref(), result, Some(device.handle_id()));
        resource
    }

    /// CreateReservedResource 返回后
    pub fn post_process_create_reserved_resource(
        &self,
        device: &Wrapper,
        result: HResult,
        native: Option<Box<dyn NativeObject>>,
        desc: &ResourceDesc,
        initial_state: ResourceStates,
    ) -> Option<Arc<Wrapper>> {
        let resource = self.wrap_created(result, native, ObjectKind::Resource);
        if let Some(resource) = &resource {
            resource.set_info(WrapperInfo::Resource(ResourceInfo::new(
                *desc,
                HeapProperties::default(),
                HeapFlags::NONE,
                initial_state,
            )));
        }
        self.finish_create_call(resource.as_ref(), result, Some(device.handle_id()));
        resource
    }

    /// ID3D12Resource::GetHeapProperties：返回应用最初请求的值
    pub fn post_process_get_heap_properties(
        &self,
        resource: &Wrapper,
        result: HResult,
        properties: Option<&mut HeapProperties>,
        flags: Option<&mut HeapFlags>,
    ) {
        if result.succeeded() {
            if let Some(info) = resource.lock().resource() {
                if let Some(properties) = properties {
                    *properties = info.original_heap_properties;
                }
                if let Some(flags) = flags {
                    *flags = info.original_heap_flags;
                }
            }
        }
        self.end_method_call_capture();
    }

    /// ID3D12Heap::GetDesc：返回应用最初请求的值
    pub fn post_process_heap_get_desc(&self, heap: &Wrapper, desc: &mut HeapDesc) {
        if let Some(info) = heap.lock().heap() {
            desc.properties = info.original_properties;
            desc.flags = info.original_flags;
        }
        self.end_method_call_capture();
    }

    /// ID3D12Resource::Map 返回后
    pub fn post_process_resource_map(
        &self,
        resource: &Arc<Wrapper>,
        result: HResult,
        subresource: u32,
        data: Option<usize>,
    ) {
        if let Some(data) = data.filter(|&data| data != 0 && result.succeeded()) {
            self.memory.on_map(resource, subresource, data);
        }
        self.end_method_call_capture();
    }

    /// ID3D12Resource::Unmap 转发前：先写出映射内存，再记录调用
    pub fn pre_process_resource_unmap(
        &self,
        resource: &Arc<Wrapper>,
        subresource: u32,
        written: Option<Range>,
    ) {
        let regions = self
            .memory
            .on_unmap(resource, subresource, written, self.is_writing());
        self.write_fill_memory(&regions);
        self.end_method_call_capture();
    }
}
