//! 调试层与 DRED 钩子
//!
//! 调试层和 DRED 设置是进程级状态，接口对象释放后依然有效，
//! 因此记录在 `ProcessState` 中而不是跟随对象的生命周期。

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::dispatch::{
    NativeResult, IID_ID3D12_DEBUG, IID_ID3D12_DEVICE_REMOVED_EXTENDED_DATA_SETTINGS,
    IID_IDXGI_FACTORY4,
};
use crate::api::native::NativeObject;
use crate::api::types::{DredEnablement, Guid, HResult, DXGI_CREATE_FACTORY_DEBUG};
use crate::capture::CaptureManager;
use crate::format::HandleId;
use crate::state::{DebugLayerRecord, DredRecord};
use crate::wrapper::{ObjectKind, Wrapper};

/// 调试接口的种类
fn debug_interface_kind(riid: &Guid) -> ObjectKind {
    if *riid == IID_ID3D12_DEVICE_REMOVED_EXTENDED_DATA_SETTINGS {
        ObjectKind::DredSettings
    } else {
        ObjectKind::Debug
    }
}

impl CaptureManager {
    /// D3D12CreateDevice 转发前：按设置启用调试层和 DRED
    pub fn pre_process_d3d12_create_device(&self) {
        let debug_settings = &self.settings().debug;
        if debug_settings.debug_layer {
            self.enable_debug_layer();
        }
        if debug_settings.debug_device_lost {
            self.enable_dred();
        }
    }

    fn get_debug_interface(&self, riid: &Guid) -> Option<Box<dyn NativeObject>> {
        let Some(get_debug_interface) = self
            .d3d12_dispatch
            .read()
            .as_ref()
            .and_then(|table| table.get_debug_interface.clone())
        else {
            warn!("D3D12GetDebugInterface is not available");
            return None;
        };

        match get_debug_interface(riid) {
            Ok(object) => Some(object),
            Err(hr) => {
                warn!(hr = hr.0, "D3D12GetDebugInterface failed");
                None
            }
        }
    }

    fn enable_debug_layer(&self) {
        let Some(object) = self.get_debug_interface(&IID_ID3D12_DEBUG) else {
            return;
        };
        match object.as_debug() {
            Some(debug) => {
                debug.enable_debug_layer();
                info!("D3D12 debug layer enabled");
            }
            None => warn!("Debug interface does not expose EnableDebugLayer"),
        }
        object.release();
    }

    fn enable_dred(&self) {
        let Some(object) =
            self.get_debug_interface(&IID_ID3D12_DEVICE_REMOVED_EXTENDED_DATA_SETTINGS)
        else {
            return;
        };
        match object.as_dred_settings() {
            Some(settings) => {
                settings.set_auto_breadcrumbs_enablement(DredEnablement::FORCED_ON);
                settings.set_page_fault_enablement(DredEnablement::FORCED_ON);
                info!("DRED auto breadcrumbs and page fault reporting enabled");
            }
            None => warn!("DRED settings interface not available"),
        }
        object.release();
    }

    /// CreateDXGIFactory2 替换实现：设置了调试层时补上调试标志
    pub fn override_create_dxgi_factory2(&self, flags: u32, riid: &Guid) -> NativeResult {
        let flags = if self.settings().debug.debug_layer {
            flags | DXGI_CREATE_FACTORY_DEBUG
        } else {
            flags
        };

        let Some(create) = self
            .dxgi_dispatch
            .read()
            .as_ref()
            .and_then(|table| table.create_dxgi_factory2.clone())
        else {
            warn!("CreateDXGIFactory2 is not available");
            return Err(HResult::E_FAIL);
        };

        if *riid != IID_IDXGI_FACTORY4 {
            debug!("CreateDXGIFactory2 called for a factory interface other than IDXGIFactory4");
        }
        create(flags, riid)
    }

    /// D3D12GetDebugInterface 返回后
    ///
    /// 除了普通的创建记录，还把接口记入进程级状态。
    pub fn post_process_get_debug_interface(
        &self,
        result: HResult,
        native: Option<Box<dyn NativeObject>>,
        riid: &Guid,
    ) -> Option<Arc<Wrapper>> {
        let kind = debug_interface_kind(riid);
        let wrapper = self.wrap_created(result, native, kind);
        self.finish_create_call(wrapper.as_ref(), result, None);

        let wrapper = wrapper?;

        let (create_call, parameters) = self.current_call();
        let thread_id = self.thread_data().thread_id();
        let mut process = self.process_state.lock();
        match kind {
            ObjectKind::DredSettings => {
                process.dred = Some(DredRecord {
                    object_id: wrapper.handle_id(),
                    create_call,
                    thread_id,
                    parameters,
                    auto_breadcrumbs: None,
                    page_fault: None,
                    breadcrumb_context: None,
                });
            }
            _ => {
                process.debug_layer = Some(DebugLayerRecord {
                    object_id: wrapper.handle_id(),
                    create_call,
                    thread_id,
                    parameters,
                    enable_calls: Vec::new(),
                });
            }
        }
        drop(process);

        Some(wrapper)
    }

    /// ID3D12Debug::EnableDebugLayer / ID3D12Debug1::EnableDebugLayer
    pub fn post_process_enable_debug_layer(&self, debug: &Wrapper) {
        let (call_id, _) = self.current_call();
        if let Some(record) = self.process_state.lock().debug_layer.as_mut() {
            if record.object_id == debug.handle_id() {
                record.enable_calls.push(call_id);
            }
        }
        self.end_method_call_capture();
    }

    /// ID3D12DeviceRemovedExtendedDataSettings::SetAutoBreadcrumbsEnablement
    pub fn post_process_set_auto_breadcrumbs_enablement(
        &self,
        settings: &Wrapper,
        enablement: DredEnablement,
    ) {
        self.update_dred(settings, |record| record.auto_breadcrumbs = Some(enablement));
    }

    /// ID3D12DeviceRemovedExtendedDataSettings::SetPageFaultEnablement
    pub fn post_process_set_page_fault_enablement(
        &self,
        settings: &Wrapper,
        enablement: DredEnablement,
    ) {
        self.update_dred(settings, |record| record.page_fault = Some(enablement));
    }

    /// ID3D12DeviceRemovedExtendedDataSettings1::SetBreadcrumbContextEnablement
    pub fn post_process_set_breadcrumb_context_enablement(
        &self,
        settings: &Wrapper,
        enablement: DredEnablement,
    ) {
        self.update_dred(settings, |record| record.breadcrumb_context = Some(enablement));
    }

    fn update_dred<F>(&self, settings: &Wrapper, update: F)
    where
        F: FnOnce(&mut DredRecord),
    {
        if let Some(record) = self.process_state.lock().dred.as_mut() {
            if record.object_id == settings.handle_id() {
                update(record);
            }
        }
        self.end_method_call_capture();
    }

    /// 调试层接口的句柄（接口释放后依然可取）
    pub fn debug_layer_object_id(&self) -> Option<HandleId> {
        self.process_state
            .lock()
            .debug_layer
            .as_ref()
            .map(|record| record.object_id)
    }
}
