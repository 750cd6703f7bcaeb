//! 捕获管理器
//!
//! 协调包装模型、状态跟踪器、映射内存跟踪器和输出端。宿主的拦截层对每个真实调用
//! 恰好调用一次对应的 pre/post 钩子，管理器在钩子里完成：
//!
//! - 按捕获模式决定是否写入调用记录、是否维护状态跟踪器
//! - 创建成功时生成包装对象并登记
//! - 引用计数归零时注销包装对象
//! - 按帧推进裁剪窗口，窗口打开时写入一次完整快照
//!
//! 各 API 家族的钩子放在 `hooks` 子模块中，这里只有通用部分。

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use super::renderer::FrameRenderer;
use super::sink::{CallRecord, CaptureSink};
use super::thread::{CallScope, ThreadData, ThreadRegistry};
use crate::api::dispatch::{D3D12DispatchTable, DxgiDispatchTable};
use crate::api::native::NativeObject;
use crate::api::types::{CpuDescriptorHandle, GpuDescriptorHandle, HResult, ViewDesc};
use crate::core::config::{CaptureSettings, TrimRange};
use crate::core::error::{CaptureError, Result};
use crate::format::{ApiCallId, CaptureMode, HandleId, ParameterEncoder, NULL_HANDLE_ID};
use crate::memory::{platform_write_watch, DirtyRegion, MemoryTracker, WriteWatch};
use crate::state::{CommandKind, ProcessState, StateExtractor, StateTracker, TrackedCommand};
use crate::wrapper::{
    CreateInfo, DescriptorSlot, HandleAllocator, ObjectKind, VirtualDescriptorAllocator, Wrapper,
    WrapperInfo, WrapperRegistry,
};

/// 裁剪窗口状态
#[derive(Debug, Default)]
struct TrimState {
    /// 下一个尚未打开的裁剪范围
    next_range: usize,
    active: Option<TrimRange>,
}

/// 捕获管理器
pub struct CaptureManager {
    settings: CaptureSettings,
    capture_mode: AtomicU32,
    /// 当前帧号，从 1 开始
    frame: AtomicU32,
    trim: Mutex<TrimState>,
    pub(super) handles: HandleAllocator,
    pub(super) registry: WrapperRegistry,
    threads: ThreadRegistry,
    pub(super) descriptor_allocator: VirtualDescriptorAllocator,
    cpu_descriptor_heaps: RwLock<BTreeMap<usize, Arc<Wrapper>>>,
    gpu_descriptor_heaps: RwLock<BTreeMap<u64, Arc<Wrapper>>>,
    pub(super) d3d12_dispatch: RwLock<Option<D3D12DispatchTable>>,
    pub(super) dxgi_dispatch: RwLock<Option<DxgiDispatchTable>>,
    state_tracker: RwLock<Option<Arc<StateTracker>>>,
    pub(super) memory: MemoryTracker,
    sink: Arc<dyn CaptureSink>,
    pub(super) renderer: RwLock<Option<Arc<dyn FrameRenderer>>>,
    pub(super) process_state: Mutex<ProcessState>,
    pub(super) direct_queues: Mutex<Vec<Arc<Wrapper>>>,
}

impl CaptureManager {
    /// 创建捕获管理器
    ///
    /// # 参数
    ///
    /// * `settings` - 捕获设置
    /// * `sink` - 输出端
    ///
    /// # 返回值
    ///
    /// 设置无效时返回 `ConfigError`
    pub fn new(settings: CaptureSettings, sink: Arc<dyn CaptureSink>) -> Result<Self> {
        settings.validate()?;

        let mode = settings.initial_capture_mode();
        let state_tracker = mode
            .contains(CaptureMode::TRACK)
            .then(|| Arc::new(StateTracker::new()));

        let mut trim = TrimState::default();
        if let Some(first) = settings.capture.trim_frames.first() {
            if first.first <= 1 {
                trim.active = Some(*first);
                trim.next_range = 1;
            }
        }

        info!(
            mode = ?mode,
            trim_ranges = settings.capture.trim_frames.len(),
            memory_tracking = ?settings.memory.tracking_mode,
            "Capture manager created"
        );

        Ok(Self {
            memory: MemoryTracker::new(&settings.memory, platform_write_watch()),
            capture_mode: AtomicU32::new(mode.bits()),
            frame: AtomicU32::new(1),
            trim: Mutex::new(trim),
            handles: HandleAllocator::new(),
            registry: WrapperRegistry::new(),
            threads: ThreadRegistry::new(),
            descriptor_allocator: VirtualDescriptorAllocator::new(),
            cpu_descriptor_heaps: RwLock::new(BTreeMap::new()),
            gpu_descriptor_heaps: RwLock::new(BTreeMap::new()),
            d3d12_dispatch: RwLock::new(None),
            dxgi_dispatch: RwLock::new(None),
            state_tracker: RwLock::new(state_tracker),
            sink,
            renderer: RwLock::new(None),
            process_state: Mutex::new(ProcessState::default()),
            direct_queues: Mutex::new(Vec::new()),
            settings,
        })
    }

    /// 替换写监视提供者
    pub fn with_write_watch(mut self, write_watch: Arc<dyn WriteWatch>) -> Self {
        self.memory = MemoryTracker::new(&self.settings.memory, write_watch);
        self
    }

    /// 设置截图渲染器
    pub fn with_frame_renderer(mut self, renderer: Arc<dyn FrameRenderer>) -> Self {
        *self.renderer.get_mut() = Some(renderer);
        self
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn memory_tracker(&self) -> &MemoryTracker {
        &self.memory
    }

    pub fn registry(&self) -> &WrapperRegistry {
        &self.registry
    }

    // ---------------------------------------------------------------
    // 生命周期
    // ---------------------------------------------------------------

    /// 注入 d3d12.dll 入口（只能一次）
    pub fn init_d3d12_dispatch_table(&self, table: D3D12DispatchTable) -> Result<()> {
        let mut dispatch = self.d3d12_dispatch.write();
        if dispatch.is_some() {
            return Err(CaptureError::Initialization(
                "D3D12 dispatch table already initialized".to_string(),
            ));
        }
        *dispatch = Some(table);
        Ok(())
    }

    /// 注入 dxgi.dll 入口（只能一次）
    pub fn init_dxgi_dispatch_table(&self, table: DxgiDispatchTable) -> Result<()> {
        let mut dispatch = self.dxgi_dispatch.write();
        if dispatch.is_some() {
            return Err(CaptureError::Initialization(
                "DXGI dispatch table already initialized".to_string(),
            ));
        }
        *dispatch = Some(table);
        Ok(())
    }

    /// 最后一个实例引用释放时调用
    ///
    /// 停止捕获并丢弃所有跟踪状态，之后到达的钩子都不再产生输出。
    pub(super) fn shutdown(&self) {
        let live_wrappers = self.registry.len();
        {
            let mut tracker = self.state_tracker.write();
            *tracker = None;
            self.capture_mode.store(CaptureMode::empty().bits(), Ordering::Release);
        }

        self.direct_queues.lock().clear();
        self.cpu_descriptor_heaps.write().clear();
        self.gpu_descriptor_heaps.write().clear();
        self.memory.clear();
        self.registry.clear();
        self.threads.clear();

        *self.d3d12_dispatch.write() = None;
        *self.dxgi_dispatch.write() = None;
        *self.renderer.write() = None;

        info!(
            frames = self.current_frame(),
            live_wrappers,
            "Capture manager shut down"
        );
    }

    // ---------------------------------------------------------------
    // 捕获模式
    // ---------------------------------------------------------------

    pub fn capture_mode(&self) -> CaptureMode {
        CaptureMode::from_bits_truncate(self.capture_mode.load(Ordering::Acquire))
    }

    /// 由宿主调整捕获模式
    ///
    /// 打开跟踪时新建状态跟踪器，并把注册表中已有的对象补登记进去；
    /// 关闭跟踪时丢弃状态跟踪器。
    pub fn set_capture_mode(&self, mode: CaptureMode) {
        let mut tracker = self.state_tracker.write();
        if mode.contains(CaptureMode::TRACK) {
            if tracker.is_none() {
                let created = Arc::new(StateTracker::new());
                let registered = created.register_existing(self.registry.wrappers());
                if registered > 0 {
                    crate::capture_warn!(
                        registered,
                        "State tracking enabled after objects were created"
                    );
                }
                *tracker = Some(created);
            }
        } else if tracker.take().is_some() {
            debug!("State tracker dropped");
        }
        // 模式和状态跟踪器在同一把锁下更新
        self.capture_mode.store(mode.bits(), Ordering::Release);
        drop(tracker);
        debug!(mode = ?mode, "Capture mode changed");
    }

    pub fn is_writing(&self) -> bool {
        self.capture_mode().contains(CaptureMode::WRITE)
    }

    pub fn is_tracking(&self) -> bool {
        self.capture_mode().contains(CaptureMode::TRACK)
    }

    /// 状态跟踪器（未创建时为 `None`）
    pub fn state_tracker(&self) -> Option<Arc<StateTracker>> {
        self.state_tracker.read().clone()
    }

    /// 跟踪模式下的状态跟踪器
    ///
    /// # Panics
    ///
    /// 跟踪模式打开但状态跟踪器不存在时 panic。
    pub(super) fn tracker(&self) -> Option<Arc<StateTracker>> {
        let tracker = self.state_tracker.read();
        if !self.is_tracking() {
            return None;
        }
        match tracker.clone() {
            Some(tracker) => Some(tracker),
            None => panic!("State tracking is enabled but no state tracker exists"),
        }
    }

    // ---------------------------------------------------------------
    // 线程与调用深度
    // ---------------------------------------------------------------

    pub fn thread_data(&self) -> Arc<ThreadData> {
        self.threads.current()
    }

    pub fn call_scope(&self) -> u32 {
        self.thread_data().call_scope()
    }

    pub fn increment_call_scope(&self) -> u32 {
        self.thread_data().increment_call_scope()
    }

    pub fn decrement_call_scope(&self) -> u32 {
        self.thread_data().decrement_call_scope()
    }

    /// 进入一层拦截调用，守卫 drop 时离开
    pub fn enter_call_scope(&self) -> CallScope {
        CallScope::enter(self.thread_data())
    }

    /// 当前调用是否发生在另一个被拦截的调用内部
    ///
    /// 嵌套调用不改写外层调用的参数缓冲区，也不产生调用记录。
    pub fn is_nested_call(&self) -> bool {
        self.call_scope() > 1
    }

    // ---------------------------------------------------------------
    // 通用调用捕获
    // ---------------------------------------------------------------

    pub fn begin_api_call_capture(&self, call_id: ApiCallId) {
        self.begin_call(call_id, None);
    }

    pub fn begin_method_call_capture(&self, call_id: ApiCallId, object_id: HandleId) {
        self.begin_call(call_id, Some(object_id));
    }

    fn begin_call(&self, call_id: ApiCallId, object_id: Option<HandleId>) {
        let thread = self.thread_data();
        if thread.call_scope() > 1 {
            trace!(call = ?call_id, "Nested call not captured");
            return;
        }
        thread.begin_call(call_id, object_id);
    }

    /// 向当前调用的参数缓冲区写入参数
    pub fn encode_parameters<F>(&self, encode: F)
    where
        F: FnOnce(&mut ParameterEncoder),
    {
        let thread = self.thread_data();
        if thread.call_scope() > 1 {
            return;
        }
        let mut call = thread.call();
        encode(&mut call.encoder);
    }

    /// 当前调用编号和参数字节
    pub fn current_call(&self) -> (ApiCallId, Vec<u8>) {
        let thread = self.thread_data();
        let call = thread.call();
        (call.call_id, call.encoder.data().to_vec())
    }

    pub fn end_api_call_capture(&self) {
        self.end_method_call_capture();
    }

    /// 结束一次调用捕获，写入模式下把调用记录交给输出端
    pub fn end_method_call_capture(&self) {
        if !self.is_writing() {
            return;
        }

        let thread = self.thread_data();
        if thread.call_scope() > 1 {
            return;
        }
        let record = {
            let call = thread.call();
            CallRecord {
                call_id: call.call_id,
                thread_id: thread.thread_id(),
                sequence: call.sequence,
                object_id: call.object_id,
                parameters: call.encoder.data().to_vec(),
            }
        };

        if let Err(e) = self.sink.write_call(&record) {
            warn!(call = ?record.call_id, "Failed to write call: {}", e);
        }
    }

    /// 为创建调用的输出生成包装对象
    ///
    /// 失败或输出为空时不生成包装。同一原生对象已有包装时返回已有的那个。
    pub fn wrap_created(
        &self,
        result: HResult,
        native: Option<Box<dyn NativeObject>>,
        kind: ObjectKind,
    ) -> Option<Arc<Wrapper>> {
        if result.failed() {
            return None;
        }
        let native = native?;

        if let Some(existing) = self.registry.get(native.address()) {
            debug!(handle_id = existing.handle_id(), "Native object already wrapped");
            return Some(existing);
        }

        let wrapper = Arc::new(Wrapper::new(self.handles.allocate(), kind, native));
        Some(self.registry.insert(wrapper))
    }

    /// 完成创建调用：写入返回值和输出句柄，记录创建信息并在跟踪模式下登记对象，
    /// 最后结束调用捕获
    pub fn finish_create_call(
        &self,
        wrapper: Option<&Arc<Wrapper>>,
        result: HResult,
        parent: Option<HandleId>,
    ) {
        let output = wrapper.map_or(NULL_HANDLE_ID, |w| w.handle_id());
        self.encode_parameters(|encoder| {
            encoder.encode_handle_id(output).encode(&result);
        });

        if let Some(wrapper) = wrapper.filter(|_| result.succeeded() && !self.is_nested_call()) {
            let thread = self.thread_data();
            let create = {
                let call = thread.call();
                CreateInfo {
                    call_id: call.call_id,
                    thread_id: thread.thread_id(),
                    parent,
                    parameters: call.encoder.data().to_vec(),
                }
            };
            self.register_created(wrapper, create);
        }

        self.end_method_call_capture();
    }

    /// 记录创建信息；跟踪模式下同时登记到状态跟踪器
    pub(super) fn register_created(&self, wrapper: &Arc<Wrapper>, create: CreateInfo) {
        match self.tracker() {
            Some(tracker) => tracker.add_entry(
                wrapper,
                create.call_id,
                create.parent,
                create.thread_id,
                &create.parameters,
            ),
            None => wrapper.record_create(create),
        }
    }

    /// 全局创建函数（D3D12CreateDevice、CreateDXGIFactory2 等）
    pub fn end_create_api_call_capture(
        &self,
        result: HResult,
        native: Option<Box<dyn NativeObject>>,
        kind: ObjectKind,
    ) -> Option<Arc<Wrapper>> {
        let wrapper = self.wrap_created(result, native, kind);
        self.finish_create_call(wrapper.as_ref(), result, None);
        wrapper
    }

    /// 对象方法创建（ID3D12Device::CreateXxx 等）
    pub fn end_create_method_call_capture(
        &self,
        result: HResult,
        native: Option<Box<dyn NativeObject>>,
        kind: ObjectKind,
        parent: &Wrapper,
    ) -> Option<Arc<Wrapper>> {
        let wrapper = self.wrap_created(result, native, kind);
        self.finish_create_call(wrapper.as_ref(), result, Some(parent.handle_id()));
        wrapper
    }

    /// Create*View：跟踪模式下更新目标描述符槽
    pub fn end_create_descriptor_method_call_capture(
        &self,
        dest: CpuDescriptorHandle,
        view: ViewDesc,
        resource: Option<&Wrapper>,
        counter_resource: Option<&Wrapper>,
    ) {
        if self.tracker().is_some() && !self.is_nested_call() {
            match self.resolve_cpu_descriptor(dest) {
                Some((heap, index)) => {
                    let thread = self.thread_data();
                    let slot = {
                        let call = thread.call();
                        DescriptorSlot {
                            view,
                            resource: resource.map(|r| r.handle_id()),
                            counter_resource: counter_resource.map(|r| r.handle_id()),
                            create_call: call.call_id,
                            thread_id: thread.thread_id(),
                            parameters: call.encoder.data().to_vec(),
                        }
                    };
                    if let Some(info) = heap.lock().descriptor_heap_mut() {
                        info.set_slot(index, Some(slot));
                    }
                }
                None => warn!(handle = dest.ptr, "View created at an unknown descriptor handle"),
            }
        }

        self.end_method_call_capture();
    }

    /// 命令列表方法：跟踪模式下追加到命令列表日志
    pub fn end_command_list_method_call_capture(
        &self,
        list: &Wrapper,
        kind: CommandKind,
        references: Vec<HandleId>,
        extractor: Option<StateExtractor>,
    ) {
        if let Some(tracker) = self.tracker().filter(|_| !self.is_nested_call()) {
            let thread = self.thread_data();
            let mut command = {
                let call = thread.call();
                TrackedCommand::new(
                    call.call_id,
                    thread.thread_id(),
                    kind,
                    call.encoder.data().to_vec(),
                    references,
                )
            };
            if let Some(extractor) = extractor {
                command = command.with_extractor(extractor);
            }
            tracker.track_command(list, command);
        }

        self.end_method_call_capture();
    }

    // ---------------------------------------------------------------
    // 引用计数
    // ---------------------------------------------------------------

    /// IUnknown::Release
    ///
    /// 原生引用计数归零时注销包装对象。返回原生对象的新计数。
    pub fn release(&self, wrapper: &Arc<Wrapper>) -> u32 {
        self.begin_method_call_capture(ApiCallId::IUnknownRelease, wrapper.handle_id());
        let count = wrapper.native().release();
        self.encode_parameters(|encoder| {
            encoder.encode(&count);
        });
        if count == 0 {
            self.process_wrapper_destroy(wrapper);
        }
        self.end_method_call_capture();
        count
    }

    /// 包装对象销毁：从状态跟踪器、映射集合和注册表中移除
    ///
    /// 不写入时最终释放记在状态跟踪器的释放时间线上，随下一次快照写出。
    pub fn process_wrapper_destroy(&self, wrapper: &Arc<Wrapper>) {
        let already_destroyed = wrapper.mark_destroyed();
        match self.state_tracker() {
            Some(tracker) => {
                tracker.remove_entry(wrapper);
                if !self.is_writing() {
                    tracker.track_release(wrapper.handle_id(), self.thread_data().thread_id());
                }
            }
            None if already_destroyed => {
                warn!(handle_id = wrapper.handle_id(), "Wrapper destroyed twice");
                return;
            }
            None => {}
        }

        self.memory.on_destroy(wrapper);
        self.registry.remove(wrapper);

        let images = match &mut wrapper.lock().info {
            WrapperInfo::DescriptorHeap(info) => {
                self.cpu_descriptor_heaps
                    .write()
                    .remove(&info.table.virtual_cpu_start.ptr);
                if let Some(gpu) = info.table.virtual_gpu_start {
                    self.gpu_descriptor_heaps.write().remove(&gpu.ptr);
                }
                Vec::new()
            }
            WrapperInfo::SwapChain(info) => std::mem::take(&mut info.images),
            WrapperInfo::CommandQueue(_) => {
                self.direct_queues
                    .lock()
                    .retain(|queue| queue.handle_id() != wrapper.handle_id());
                Vec::new()
            }
            _ => Vec::new(),
        };
        self.release_images(images);

        debug!(handle_id = wrapper.handle_id(), kind = ?wrapper.kind(), "Wrapper destroyed");
    }

    // ---------------------------------------------------------------
    // 描述符句柄
    // ---------------------------------------------------------------

    pub(super) fn register_descriptor_heap(&self, heap: &Arc<Wrapper>) {
        let table = match heap.lock().descriptor_heap() {
            Some(info) => info.table,
            None => return,
        };
        self.cpu_descriptor_heaps
            .write()
            .insert(table.virtual_cpu_start.ptr, heap.clone());
        if let Some(gpu) = table.virtual_gpu_start {
            self.gpu_descriptor_heaps.write().insert(gpu.ptr, heap.clone());
        }
    }

    /// 虚拟 CPU 句柄所在的堆和槽位
    pub fn resolve_cpu_descriptor(&self, handle: CpuDescriptorHandle) -> Option<(Arc<Wrapper>, u32)> {
        let heap = self
            .cpu_descriptor_heaps
            .read()
            .range(..=handle.ptr)
            .next_back()
            .map(|(_, heap)| heap.clone())?;
        let index = heap.lock().descriptor_heap()?.table.cpu_index(handle)?;
        Some((heap, index))
    }

    /// 虚拟 GPU 句柄所在的堆和槽位
    pub fn resolve_gpu_descriptor(&self, handle: GpuDescriptorHandle) -> Option<(Arc<Wrapper>, u32)> {
        let heap = self
            .gpu_descriptor_heaps
            .read()
            .range(..=handle.ptr)
            .next_back()
            .map(|(_, heap)| heap.clone())?;
        let index = heap.lock().descriptor_heap()?.table.gpu_index(handle)?;
        Some((heap, index))
    }

    /// 把应用持有的虚拟 CPU 句柄翻译回原生值，不认识的句柄原样返回
    pub fn unwrap_cpu_descriptor_handle(&self, handle: CpuDescriptorHandle) -> CpuDescriptorHandle {
        self.resolve_cpu_descriptor(handle)
            .and_then(|(heap, _)| heap.lock().descriptor_heap()?.table.to_native_cpu(handle))
            .unwrap_or(handle)
    }

    /// 把应用持有的虚拟 GPU 句柄翻译回原生值，不认识的句柄原样返回
    pub fn unwrap_gpu_descriptor_handle(&self, handle: GpuDescriptorHandle) -> GpuDescriptorHandle {
        self.resolve_gpu_descriptor(handle)
            .and_then(|(heap, _)| heap.lock().descriptor_heap()?.table.to_native_gpu(handle))
            .unwrap_or(handle)
    }

    // ---------------------------------------------------------------
    // 映射内存输出
    // ---------------------------------------------------------------

    pub(super) fn write_fill_memory(&self, regions: &[DirtyRegion]) {
        if regions.is_empty() || !self.is_writing() {
            return;
        }
        let thread_id = self.thread_data().thread_id();
        for region in regions {
            if let Err(e) = self.sink.write_fill_memory(thread_id, region) {
                warn!(resource = region.resource, "Failed to write mapped memory: {}", e);
            }
        }
    }

    // ---------------------------------------------------------------
    // 帧与裁剪
    // ---------------------------------------------------------------

    pub fn current_frame(&self) -> u32 {
        self.frame.load(Ordering::Acquire)
    }

    /// 一帧结束（呈现之后）：写入帧标记并推进裁剪窗口
    pub fn end_frame(&self) {
        let frame = self.current_frame();
        if self.is_writing() {
            if let Err(e) = self.sink.write_frame_marker(frame) {
                warn!(frame, "Failed to write frame marker: {}", e);
            }
        }

        let next = self.frame.fetch_add(1, Ordering::AcqRel) + 1;
        let ranges = &self.settings.capture.trim_frames;

        let (deactivate, activate) = {
            let mut trim = self.trim.lock();
            let mut deactivate = false;
            if let Some(active) = trim.active {
                if !active.contains(next) {
                    trim.active = None;
                    deactivate = true;
                }
            }

            let mut activate = false;
            if trim.active.is_none() {
                if let Some(range) = ranges.get(trim.next_range) {
                    if range.first <= next {
                        trim.active = Some(*range);
                        trim.next_range += 1;
                        activate = true;
                    }
                }
            }
            (deactivate, activate)
        };

        if deactivate {
            self.deactivate_trimming();
        }
        if activate {
            self.activate_trimming();
        }
    }

    /// 打开裁剪窗口：开始写入并输出一次完整快照
    fn activate_trimming(&self) {
        crate::capture_info!(frame = self.current_frame(), "Trim capture started");
        self.set_capture_mode(CaptureMode::WRITE | CaptureMode::TRACK);

        if let Some(tracker) = self.tracker() {
            let process = self.process_state.lock().clone();
            let thread_id = self.thread_data().thread_id();
            if let Err(e) = tracker.write_tracked_state(self.sink.as_ref(), thread_id, &process) {
                warn!("Failed to write tracked state: {}", e);
            }
        }
    }

    /// 关闭裁剪窗口：还有后续范围时继续跟踪，否则停止捕获
    fn deactivate_trimming(&self) {
        let remaining = self.trim.lock().next_range < self.settings.capture.trim_frames.len();
        let mode = if remaining {
            CaptureMode::TRACK
        } else {
            CaptureMode::empty()
        };
        self.set_capture_mode(mode);
        crate::capture_info!(frame = self.current_frame(), remaining, "Trim capture finished");
    }

    /// 进程级状态（调试层、DRED）
    pub fn process_state(&self) -> ProcessState {
        self.process_state.lock().clone()
    }
}

impl std::fmt::Debug for CaptureManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureManager")
            .field("capture_mode", &self.capture_mode())
            .field("frame", &self.current_frame())
            .field("live_wrappers", &self.registry.len())
            .finish()
    }
}
