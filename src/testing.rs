//! 单元测试用的原生对象替身

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::api::native::{
    NativeDebug, NativeDescriptorHeap, NativeDevice, NativeDredSettings, NativeObject,
    NativeSwapChain,
};
use crate::api::types::{
    CpuDescriptorHandle, DescriptorHeapDesc, DescriptorHeapType, DredEnablement,
    GpuDescriptorHandle, HResult,
};
use crate::capture::{CaptureManager, RecordingSink};
use crate::core::config::CaptureSettings;
use crate::format::CaptureMode;

static NEXT_ADDRESS: AtomicUsize = AtomicUsize::new(0x0010_0000);

/// 不会重复的假对象地址
pub fn next_address() -> usize {
    NEXT_ADDRESS.fetch_add(0x100, Ordering::Relaxed)
}

/// 只有身份和引用计数的原生对象
pub struct MockObject {
    address: usize,
    refs: Arc<AtomicU32>,
}

impl MockObject {
    pub fn new(address: usize) -> Self {
        Self {
            address,
            refs: Arc::new(AtomicU32::new(1)),
        }
    }

    /// 与对象共享的引用计数
    pub fn refs(&self) -> Arc<AtomicU32> {
        self.refs.clone()
    }
}

impl NativeObject for MockObject {
    fn address(&self) -> usize {
        self.address
    }

    fn add_ref(&self) -> u32 {
        self.refs.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn release(&self) -> u32 {
        let previous = self
            .refs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                Some(count.saturating_sub(1))
            })
            .unwrap_or(0);
        previous.saturating_sub(1)
    }
}

macro_rules! forward_native_object {
    (@cap device) => {
        fn as_device(&self) -> Option<&dyn NativeDevice> {
            Some(self)
        }
    };
    (@cap descriptor_heap) => {
        fn as_descriptor_heap(&self) -> Option<&dyn NativeDescriptorHeap> {
            Some(self)
        }
    };
    (@cap swap_chain) => {
        fn as_swap_chain(&self) -> Option<&dyn NativeSwapChain> {
            Some(self)
        }
    };
    (@cap debug) => {
        fn as_debug(&self) -> Option<&dyn NativeDebug> {
            Some(self)
        }
    };
    (@cap dred_settings) => {
        fn as_dred_settings(&self) -> Option<&dyn NativeDredSettings> {
            Some(self)
        }
    };
    ($ty:ty, $($capability:ident),*) => {
        impl NativeObject for $ty {
            fn address(&self) -> usize {
                self.object.address()
            }

            fn add_ref(&self) -> u32 {
                self.object.add_ref()
            }

            fn release(&self) -> u32 {
                self.object.release()
            }

            $(forward_native_object!(@cap $capability);)*
        }
    };
}

/// ID3D12Device 替身
pub struct MockDevice {
    object: MockObject,
}

impl MockDevice {
    pub fn new(address: usize) -> Self {
        Self {
            object: MockObject::new(address),
        }
    }
}

impl NativeDevice for MockDevice {
    fn descriptor_handle_increment_size(&self, heap_type: DescriptorHeapType) -> u32 {
        match heap_type {
            DescriptorHeapType::RTV | DescriptorHeapType::DSV => 8,
            _ => 32,
        }
    }
}

forward_native_object!(MockDevice, device);

/// ID3D12DescriptorHeap 替身
pub struct MockDescriptorHeap {
    object: MockObject,
    desc: DescriptorHeapDesc,
    cpu_start: CpuDescriptorHandle,
    gpu_start: GpuDescriptorHandle,
}

impl MockDescriptorHeap {
    pub fn new(address: usize, desc: DescriptorHeapDesc) -> Self {
        Self {
            object: MockObject::new(address),
            desc,
            cpu_start: CpuDescriptorHandle { ptr: address * 0x10 },
            gpu_start: GpuDescriptorHandle {
                ptr: (address as u64) << 20,
            },
        }
    }
}

impl NativeDescriptorHeap for MockDescriptorHeap {
    fn desc(&self) -> DescriptorHeapDesc {
        self.desc
    }

    fn cpu_descriptor_handle_for_heap_start(&self) -> CpuDescriptorHandle {
        self.cpu_start
    }

    fn gpu_descriptor_handle_for_heap_start(&self) -> GpuDescriptorHandle {
        self.gpu_start
    }
}

forward_native_object!(MockDescriptorHeap, descriptor_heap);

/// IDXGISwapChain3 替身，后台缓冲区地址由测试控制
pub struct MockSwapChain {
    object: MockObject,
    buffers: Arc<Mutex<Vec<usize>>>,
    current: AtomicU32,
}

impl MockSwapChain {
    pub fn new(address: usize, buffers: Arc<Mutex<Vec<usize>>>) -> Self {
        Self {
            object: MockObject::new(address),
            buffers,
            current: AtomicU32::new(0),
        }
    }
}

impl NativeSwapChain for MockSwapChain {
    fn get_buffer(&self, index: u32) -> Result<Box<dyn NativeObject>, HResult> {
        match self.buffers.lock().get(index as usize) {
            Some(&address) => Ok(Box::new(MockObject::new(address))),
            None => Err(HResult::DXGI_ERROR_INVALID_CALL),
        }
    }

    fn current_back_buffer_index(&self) -> u32 {
        self.current.load(Ordering::Relaxed)
    }
}

forward_native_object!(MockSwapChain, swap_chain);

/// ID3D12Debug 替身
pub struct MockDebug {
    object: MockObject,
    enabled: Arc<AtomicBool>,
}

impl MockDebug {
    pub fn new(address: usize, enabled: Arc<AtomicBool>) -> Self {
        Self {
            object: MockObject::new(address),
            enabled,
        }
    }
}

impl NativeDebug for MockDebug {
    fn enable_debug_layer(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }
}

forward_native_object!(MockDebug, debug);

/// ID3D12DeviceRemovedExtendedDataSettings 替身
pub struct MockDredSettings {
    object: MockObject,
    enablement: Arc<Mutex<(Option<DredEnablement>, Option<DredEnablement>)>>,
}

impl MockDredSettings {
    pub fn new(
        address: usize,
        enablement: Arc<Mutex<(Option<DredEnablement>, Option<DredEnablement>)>>,
    ) -> Self {
        Self {
            object: MockObject::new(address),
            enablement,
        }
    }
}

impl NativeDredSettings for MockDredSettings {
    fn set_auto_breadcrumbs_enablement(&self, enablement: DredEnablement) {
        self.enablement.lock().0 = Some(enablement);
    }

    fn set_page_fault_enablement(&self, enablement: DredEnablement) {
        self.enablement.lock().1 = Some(enablement);
    }
}

forward_native_object!(MockDredSettings, dred_settings);

/// 写入并跟踪的管理器
pub fn tracking_manager(settings: CaptureSettings) -> (CaptureManager, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let manager = CaptureManager::new(settings, sink.clone()).unwrap();
    manager.set_capture_mode(CaptureMode::WRITE | CaptureMode::TRACK);
    (manager, sink)
}
