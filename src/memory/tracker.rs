//! 映射内存跟踪器
//!
//! 负责三件事：
//!
//! 1. 创建上传堆 / 上传资源时判断能否启用写监视，能的话在转发前改写堆属性
//! 2. 维护当前处于映射状态的资源集合
//! 3. 在 Unmap 和命令提交时计算需要写入捕获文件的字节范围

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::write_watch::WriteWatch;
use crate::api::types::{CpuPageProperty, HeapFlags, HeapProperties, HeapType, MemoryPool, Range};
use crate::core::config::{MemoryConfig, MemoryTrackingMode};
use crate::format::{ApiCallId, HandleId, NULL_HANDLE_ID};
use crate::wrapper::{MappedSubresource, ResourceInfo, Wrapper};

/// 请求无法使用写监视的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WriteWatchIgnoreReason {
    /// 共享堆的内存不能由本进程的写监视跟踪
    SharedHeap,
    /// 应用自己在使用写监视，捕获层不能替它重置
    ApplicationWriteWatch,
}

/// 写监视被降级的记录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WriteWatchDiagnostic {
    pub call_id: ApiCallId,
    pub reason: WriteWatchIgnoreReason,
}

/// 堆属性改写结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapRequest {
    /// 应用请求的原始值
    pub original_properties: HeapProperties,
    pub original_flags: HeapFlags,
    /// 是否已改写为写监视分配
    pub write_watch: bool,
}

/// 一段需要写入捕获文件的映射内存
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyRegion {
    pub resource: HandleId,
    pub subresource: u32,
    /// 相对子资源映射地址的偏移
    pub offset: u64,
    pub data: Vec<u8>,
}

/// 映射内存跟踪器
pub struct MemoryTracker {
    mode: MemoryTrackingMode,
    use_write_watch: bool,
    write_watch: Arc<dyn WriteWatch>,
    mapped: Mutex<BTreeMap<HandleId, Arc<Wrapper>>>,
    diagnostics: Mutex<Vec<WriteWatchDiagnostic>>,
}

impl MemoryTracker {
    pub fn new(config: &MemoryConfig, write_watch: Arc<dyn WriteWatch>) -> Self {
        Self {
            mode: config.tracking_mode,
            use_write_watch: config.use_write_watch,
            write_watch,
            mapped: Mutex::new(BTreeMap::new()),
            diagnostics: Mutex::new(Vec::new()),
        }
    }

    pub fn tracking_mode(&self) -> MemoryTrackingMode {
        self.mode
    }

    /// 是否启用写监视
    pub fn use_write_watch(&self) -> bool {
        self.mode == MemoryTrackingMode::PageGuard && self.use_write_watch
    }

    /// CPU 可写的上传堆
    pub fn is_upload_heap(properties: &HeapProperties) -> bool {
        match properties.heap_type {
            HeapType::UPLOAD => true,
            HeapType::CUSTOM => matches!(
                properties.cpu_page_property,
                CpuPageProperty::WRITE_COMBINE | CpuPageProperty::WRITE_BACK
            ),
            _ => false,
        }
    }

    /// 把上传堆改写为带写监视的自定义堆
    pub fn enable_write_watch(properties: &mut HeapProperties, flags: &mut HeapFlags) {
        *flags |= HeapFlags::ALLOW_WRITE_WATCH;
        properties.heap_type = HeapType::CUSTOM;
        properties.cpu_page_property = CpuPageProperty::WRITE_BACK;
        properties.memory_pool_preference = MemoryPool::L0;
    }

    /// 检查请求是否与写监视冲突，冲突时记录一条诊断
    pub fn check_write_watch_ignored(
        &self,
        call_id: ApiCallId,
        flags: HeapFlags,
    ) -> Option<WriteWatchIgnoreReason> {
        let reason = if flags.contains(HeapFlags::SHARED) {
            WriteWatchIgnoreReason::SharedHeap
        } else if flags.contains(HeapFlags::ALLOW_WRITE_WATCH) {
            WriteWatchIgnoreReason::ApplicationWriteWatch
        } else {
            return None;
        };

        info!(
            call = ?call_id,
            reason = ?reason,
            "Write watch disabled for upload heap, falling back to full range capture"
        );
        self.diagnostics.lock().push(WriteWatchDiagnostic { call_id, reason });
        Some(reason)
    }

    /// 创建调用转发前处理堆属性
    ///
    /// # 参数
    ///
    /// * `call_id` - 创建调用
    /// * `properties` - 应用请求的堆属性，符合条件时被原地改写
    /// * `flags` - 应用请求的堆标志，符合条件时被原地改写
    ///
    /// # 返回值
    ///
    /// 原始值和是否启用了写监视
    pub fn prepare_heap_request(
        &self,
        call_id: ApiCallId,
        properties: &mut HeapProperties,
        flags: &mut HeapFlags,
    ) -> HeapRequest {
        let mut request = HeapRequest {
            original_properties: *properties,
            original_flags: *flags,
            write_watch: false,
        };

        if !self.use_write_watch() || !Self::is_upload_heap(properties) {
            return request;
        }

        if self.check_write_watch_ignored(call_id, *flags).is_some() {
            return request;
        }

        Self::enable_write_watch(properties, flags);
        request.write_watch = true;
        debug!(call = ?call_id, "Upload heap rewritten for write watch");
        request
    }

    pub fn diagnostics(&self) -> Vec<WriteWatchDiagnostic> {
        self.diagnostics.lock().clone()
    }

    /// 记录一次成功的 Map
    pub fn on_map(&self, wrapper: &Arc<Wrapper>, subresource: u32, data: usize) {
        {
            let mut state = wrapper.lock();
            let Some(resource) = state.resource_mut() else {
                warn!(handle = wrapper.handle_id(), "Map on an object that is not a resource");
                return;
            };

            let entry = resource
                .mapped
                .entry(subresource)
                .or_insert(MappedSubresource { data, map_count: 0 });
            if entry.data != data {
                debug!(
                    handle = wrapper.handle_id(),
                    subresource, "Subresource remapped at a new address"
                );
                entry.data = data;
            }
            entry.map_count += 1;

            if entry.map_count == 1 && resource.write_watch && self.use_write_watch() {
                let size = resource.subresource_size(subresource) as usize;
                if let Err(e) = self.write_watch.reset(data, size) {
                    warn!("Failed to reset write watch on map: {}", e);
                }
            }
        }

        self.mapped
            .lock()
            .entry(wrapper.handle_id())
            .or_insert_with(|| wrapper.clone());
    }

    /// 处理 Unmap（在转发给驱动之前调用）
    ///
    /// # 参数
    ///
    /// * `wrapper` - 资源包装对象
    /// * `subresource` - 子资源索引
    /// * `written` - 应用声明的写入范围，`None` 表示整个子资源
    /// * `capture` - 是否需要数据；为 false 时只更新映射状态，写监视保持不变
    ///
    /// # 返回值
    ///
    /// 需要写入捕获文件的内存段
    pub fn on_unmap(
        &self,
        wrapper: &Arc<Wrapper>,
        subresource: u32,
        written: Option<Range>,
        capture: bool,
    ) -> Vec<DirtyRegion> {
        let (regions, still_mapped) = {
            let mut state = wrapper.lock();
            let Some(resource) = state.resource_mut() else {
                return Vec::new();
            };

            let Some(mapping) = resource.mapped.get(&subresource).copied() else {
                warn!(
                    handle = wrapper.handle_id(),
                    subresource, "Unmap without a matching map"
                );
                return Vec::new();
            };

            let regions = if !capture {
                Vec::new()
            } else if resource.write_watch && self.use_write_watch() {
                self.dirty_regions(wrapper.handle_id(), resource, subresource, mapping)
            } else {
                written_regions(wrapper.handle_id(), resource, subresource, mapping, written)
            };

            if mapping.map_count <= 1 {
                resource.mapped.remove(&subresource);
            } else if let Some(entry) = resource.mapped.get_mut(&subresource) {
                entry.map_count -= 1;
            }

            (regions, resource.is_mapped())
        };

        if !still_mapped {
            self.mapped.lock().remove(&wrapper.handle_id());
        }
        regions
    }

    /// 命令提交前需要刷新的映射内存
    ///
    /// 会消耗写监视的脏页状态，只应在数据确实要写出时调用。
    pub fn flush_mapped(&self) -> Vec<DirtyRegion> {
        if self.mode == MemoryTrackingMode::Assisted {
            return Vec::new();
        }

        let mapped: Vec<Arc<Wrapper>> = self.mapped.lock().values().cloned().collect();
        let mut regions = Vec::new();
        for wrapper in mapped {
            let state = wrapper.lock();
            let Some(resource) = state.resource() else {
                continue;
            };
            for (&subresource, &mapping) in &resource.mapped {
                if resource.write_watch && self.use_write_watch() {
                    regions.extend(self.dirty_regions(
                        wrapper.handle_id(),
                        resource,
                        subresource,
                        mapping,
                    ));
                } else {
                    regions.extend(written_regions(
                        wrapper.handle_id(),
                        resource,
                        subresource,
                        mapping,
                        None,
                    ));
                }
            }
        }
        regions
    }

    /// 外部分配内存的当前内容
    ///
    /// 用于 OpenExistingHeapFromAddress：结果不属于任何资源，`offset` 就是地址本身。
    pub fn external_region(&self, address: usize, size: u64) -> Option<DirtyRegion> {
        let len = usize::try_from(size).ok()?;
        if address == 0 || len == 0 {
            return None;
        }
        Some(DirtyRegion {
            resource: NULL_HANDLE_ID,
            subresource: 0,
            offset: address as u64,
            data: read_mapped(address, 0, len),
        })
    }

    /// 清空映射集合（捕获管理器拆除时）
    pub fn clear(&self) {
        self.mapped.lock().clear();
    }

    /// 对象销毁时从映射集合中移除
    pub fn on_destroy(&self, wrapper: &Wrapper) {
        self.mapped.lock().remove(&wrapper.handle_id());
    }

    pub fn is_mapped(&self, handle_id: HandleId) -> bool {
        self.mapped.lock().contains_key(&handle_id)
    }

    pub fn mapped_resources(&self) -> Vec<Arc<Wrapper>> {
        self.mapped.lock().values().cloned().collect()
    }

    /// 写监视报告的脏页，相邻页合并为一段
    fn dirty_regions(
        &self,
        handle_id: HandleId,
        resource: &ResourceInfo,
        subresource: u32,
        mapping: MappedSubresource,
    ) -> Vec<DirtyRegion> {
        let size = resource.subresource_size(subresource) as usize;
        if mapping.data == 0 || size == 0 {
            return Vec::new();
        }

        let pages = match self.write_watch.take_dirty_pages(mapping.data, size) {
            Ok(pages) => pages,
            Err(e) => {
                warn!("Write watch query failed, capturing full subresource: {}", e);
                return written_regions(handle_id, resource, subresource, mapping, None);
            }
        };

        let page_size = self.write_watch.page_size();
        let end = mapping.data + size;
        let mut ranges: Vec<(usize, usize)> = Vec::new();
        for page in pages {
            let begin = page.max(mapping.data);
            let finish = (page + page_size).min(end);
            if begin >= finish {
                continue;
            }
            match ranges.last_mut() {
                Some(last) if last.1 == begin => last.1 = finish,
                _ => ranges.push((begin, finish)),
            }
        }

        ranges
            .into_iter()
            .map(|(begin, finish)| DirtyRegion {
                resource: handle_id,
                subresource,
                offset: (begin - mapping.data) as u64,
                data: read_mapped(mapping.data, begin - mapping.data, finish - begin),
            })
            .collect()
    }
}

/// 应用声明的写入范围；`None` 表示整个子资源，空范围表示没有写入
fn written_regions(
    handle_id: HandleId,
    resource: &ResourceInfo,
    subresource: u32,
    mapping: MappedSubresource,
    written: Option<Range>,
) -> Vec<DirtyRegion> {
    let size = resource.subresource_size(subresource) as usize;
    let (begin, end) = match written {
        None => (0, size),
        Some(range) => (range.begin, range.end.min(size)),
    };
    if mapping.data == 0 || end <= begin {
        return Vec::new();
    }

    vec![DirtyRegion {
        resource: handle_id,
        subresource,
        offset: begin as u64,
        data: read_mapped(mapping.data, begin, end - begin),
    }]
}

fn read_mapped(data: usize, offset: usize, len: usize) -> Vec<u8> {
    // SAFETY: data 是驱动 Map 返回的地址（在 Unmap 转发之前一直有效），
    // 或应用交给 OpenExistingHeapFromAddress 的已提交分配；
    // 调用方保证 offset + len 不超过映射或分配的大小
    unsafe { std::slice::from_raw_parts((data + offset) as *const u8, len).to_vec() }
}
