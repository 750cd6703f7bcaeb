//! 原生对象抽象
//!
//! 捕获层只通过这里的 trait 接触被拦截的原生对象：身份地址、引用计数，
//! 以及少数几个捕获层自己需要主动调用的能力（查询描述符增量、获取交换链缓冲区、
//! 启用调试层等）。其余调用由宿主的拦截层直接转发，不经过这里。
//!
//! `NativeObject` 是一个借用的指针：丢弃它不会释放原生对象，
//! 引用计数只通过 `add_ref` / `release` 显式改变。

use super::types::{
    CpuDescriptorHandle, DescriptorHeapDesc, DescriptorHeapFlags, DescriptorHeapType,
    DredEnablement, GpuDescriptorHandle, HResult,
};

/// 被拦截的原生 COM 对象
pub trait NativeObject: Send + Sync {
    /// 对象身份（COM 指针值），用于包装对象的 1:1 查找
    fn address(&self) -> usize;

    /// 增加引用计数，返回新的计数
    fn add_ref(&self) -> u32;

    /// 减少引用计数，返回新的计数
    fn release(&self) -> u32;

    fn as_device(&self) -> Option<&dyn NativeDevice> {
        None
    }

    fn as_descriptor_heap(&self) -> Option<&dyn NativeDescriptorHeap> {
        None
    }

    fn as_swap_chain(&self) -> Option<&dyn NativeSwapChain> {
        None
    }

    fn as_debug(&self) -> Option<&dyn NativeDebug> {
        None
    }

    fn as_dred_settings(&self) -> Option<&dyn NativeDredSettings> {
        None
    }
}

/// ID3D12Device
pub trait NativeDevice {
    fn descriptor_handle_increment_size(&self, heap_type: DescriptorHeapType) -> u32;
}

/// ID3D12DescriptorHeap
pub trait NativeDescriptorHeap {
    fn desc(&self) -> DescriptorHeapDesc;

    fn cpu_descriptor_handle_for_heap_start(&self) -> CpuDescriptorHandle;

    /// 非着色器可见的堆返回 0
    fn gpu_descriptor_handle_for_heap_start(&self) -> GpuDescriptorHandle;
}

/// IDXGISwapChain3
pub trait NativeSwapChain {
    /// 获取后台缓冲区，返回的对象已经持有一个新的引用
    fn get_buffer(&self, index: u32) -> std::result::Result<Box<dyn NativeObject>, HResult>;

    fn current_back_buffer_index(&self) -> u32;
}

/// ID3D12Debug
pub trait NativeDebug {
    fn enable_debug_layer(&self);
}

/// ID3D12DeviceRemovedExtendedDataSettings
pub trait NativeDredSettings {
    fn set_auto_breadcrumbs_enablement(&self, enablement: DredEnablement);

    fn set_page_fault_enablement(&self, enablement: DredEnablement);
}

#[cfg(windows)]
pub use com::ComObject;

#[cfg(windows)]
mod com {
    use std::mem::ManuallyDrop;

    use windows::core::{IUnknown, Interface};
    use windows::Win32::Graphics::Direct3D12::*;
    use windows::Win32::Graphics::Dxgi::IDXGISwapChain3;

    use super::*;

    /// 基于 `windows` crate 的 COM 指针实现
    ///
    /// 内部持有的 `IUnknown` 不会在 drop 时释放，
    /// 引用计数完全由调用方通过 `add_ref` / `release` 管理。
    pub struct ComObject {
        object: ManuallyDrop<IUnknown>,
    }

    // COM 对象的线程模型由 D3D12 保证为自由线程
    unsafe impl Send for ComObject {}
    unsafe impl Sync for ComObject {}

    impl ComObject {
        /// 从原始 COM 指针创建，不改变引用计数
        ///
        /// # Safety
        ///
        /// `raw` 必须是一个有效的、非空的 COM 接口指针。
        pub unsafe fn from_raw(raw: *mut std::ffi::c_void) -> Self {
            Self {
                object: ManuallyDrop::new(IUnknown::from_raw(raw)),
            }
        }

        fn query<T: Interface>(&self) -> Option<T> {
            self.object.cast::<T>().ok()
        }
    }

    impl NativeObject for ComObject {
        fn address(&self) -> usize {
            self.object.as_raw() as usize
        }

        fn add_ref(&self) -> u32 {
            unsafe { (Interface::vtable(&*self.object).AddRef)(self.object.as_raw()) }
        }

        fn release(&self) -> u32 {
            unsafe { (Interface::vtable(&*self.object).Release)(self.object.as_raw()) }
        }

        fn as_device(&self) -> Option<&dyn NativeDevice> {
            self.query::<ID3D12Device>().map(|_| self as &dyn NativeDevice)
        }

        fn as_descriptor_heap(&self) -> Option<&dyn NativeDescriptorHeap> {
            self.query::<ID3D12DescriptorHeap>()
                .map(|_| self as &dyn NativeDescriptorHeap)
        }

        fn as_swap_chain(&self) -> Option<&dyn NativeSwapChain> {
            self.query::<IDXGISwapChain3>().map(|_| self as &dyn NativeSwapChain)
        }

        fn as_debug(&self) -> Option<&dyn NativeDebug> {
            self.query::<ID3D12Debug>().map(|_| self as &dyn NativeDebug)
        }

        fn as_dred_settings(&self) -> Option<&dyn NativeDredSettings> {
            self.query::<ID3D12DeviceRemovedExtendedDataSettings>()
                .map(|_| self as &dyn NativeDredSettings)
        }
    }

    impl NativeDevice for ComObject {
        fn descriptor_handle_increment_size(&self, heap_type: DescriptorHeapType) -> u32 {
            self.query::<ID3D12Device>()
                .map(|device| unsafe {
                    device.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE(heap_type.0))
                })
                .unwrap_or_default()
        }
    }

    impl NativeDescriptorHeap for ComObject {
        fn desc(&self) -> DescriptorHeapDesc {
            self.query::<ID3D12DescriptorHeap>()
                .map(|heap| {
                    let desc = unsafe { heap.GetDesc() };
                    DescriptorHeapDesc {
                        heap_type: DescriptorHeapType(desc.Type.0),
                        num_descriptors: desc.NumDescriptors,
                        flags: DescriptorHeapFlags(desc.Flags.0),
                        node_mask: desc.NodeMask,
                    }
                })
                .unwrap_or_default()
        }

        fn cpu_descriptor_handle_for_heap_start(&self) -> CpuDescriptorHandle {
            self.query::<ID3D12DescriptorHeap>()
                .map(|heap| CpuDescriptorHandle {
                    ptr: unsafe { heap.GetCPUDescriptorHandleForHeapStart() }.ptr,
                })
                .unwrap_or_default()
        }

        fn gpu_descriptor_handle_for_heap_start(&self) -> GpuDescriptorHandle {
            self.query::<ID3D12DescriptorHeap>()
                .map(|heap| GpuDescriptorHandle {
                    ptr: unsafe { heap.GetGPUDescriptorHandleForHeapStart() }.ptr,
                })
                .unwrap_or_default()
        }
    }

    impl NativeSwapChain for ComObject {
        fn get_buffer(&self, index: u32) -> std::result::Result<Box<dyn NativeObject>, HResult> {
            let swap_chain = self
                .query::<IDXGISwapChain3>()
                .ok_or(HResult::E_INVALIDARG)?;
            let buffer: ID3D12Resource =
                unsafe { swap_chain.GetBuffer(index) }.map_err(|e| HResult(e.code().0))?;
            // 所有权转交给调用方，引用计数由 release 显式管理
            Ok(Box::new(unsafe { ComObject::from_raw(buffer.into_raw()) }))
        }

        fn current_back_buffer_index(&self) -> u32 {
            self.query::<IDXGISwapChain3>()
                .map(|swap_chain| unsafe { swap_chain.GetCurrentBackBufferIndex() })
                .unwrap_or_default()
        }
    }

    impl NativeDebug for ComObject {
        fn enable_debug_layer(&self) {
            if let Some(debug) = self.query::<ID3D12Debug>() {
                unsafe { debug.EnableDebugLayer() };
            }
        }
    }

    impl NativeDredSettings for ComObject {
        fn set_auto_breadcrumbs_enablement(&self, enablement: DredEnablement) {
            if let Some(settings) = self.query::<ID3D12DeviceRemovedExtendedDataSettings>() {
                unsafe { settings.SetAutoBreadcrumbsEnablement(D3D12_DRED_ENABLEMENT(enablement.0)) };
            }
        }

        fn set_page_fault_enablement(&self, enablement: DredEnablement) {
            if let Some(settings) = self.query::<ID3D12DeviceRemovedExtendedDataSettings>() {
                unsafe { settings.SetPageFaultEnablement(D3D12_DRED_ENABLEMENT(enablement.0)) };
            }
        }
    }
}
