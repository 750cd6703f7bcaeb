//! 交换链钩子
//!
//! 交换链创建或调整大小后，捕获层主动获取全部后台缓冲区并为它们生成包装对象，
//! 这样应用之后的 GetBuffer 调用总能命中已有的包装。调整大小前释放这些引用，
//! 调整失败时重新获取旧的缓冲区。

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::native::NativeObject;
use crate::api::types::{
    Format, HResult, HeapFlags, HeapProperties, HeapType, ResizeBuffersDesc, ResourceDesc,
    ResourceStates, SwapChainDesc, SwapEffect,
};
use crate::capture::renderer::FrameCaptureRequest;
use crate::capture::CaptureManager;
use crate::format::{ApiCallId, ParameterEncoder};
use crate::wrapper::{CreateInfo, ObjectKind, ResourceInfo, SwapChainInfo, Wrapper, WrapperInfo};

/// 捕获层持有的后台缓冲区个数
///
/// 旧的 BitBlt 模式只能访问 0 号缓冲区。
fn acquired_buffer_count(desc: &SwapChainDesc) -> u32 {
    match desc.swap_effect {
        SwapEffect::DISCARD | SwapEffect::SEQUENTIAL => 1,
        _ => desc.buffer_count,
    }
}

impl CaptureManager {
    /// IDXGIFactory::CreateSwapChain / CreateSwapChainFor* 返回后
    ///
    /// # 参数
    ///
    /// * `factory` - 工厂包装对象
    /// * `queue` - 呈现队列（D3D12 下设备参数就是命令队列）
    /// * `desc` - 交换链描述
    pub fn post_process_create_swap_chain(
        &self,
        factory: &Wrapper,
        result: HResult,
        native: Option<Box<dyn NativeObject>>,
        queue: Option<&Arc<Wrapper>>,
        desc: &SwapChainDesc,
    ) -> Option<Arc<Wrapper>> {
        let swap_chain = self.wrap_created(result, native, ObjectKind::SwapChain);
        if let Some(swap_chain) = &swap_chain {
            swap_chain.set_info(WrapperInfo::SwapChain(SwapChainInfo {
                desc: *desc,
                queue: queue.cloned(),
                images: Vec::new(),
                present_count: 0,
            }));
        }
        self.finish_create_call(swap_chain.as_ref(), result, Some(factory.handle_id()));

        if let Some(swap_chain) = &swap_chain {
            self.acquire_swap_chain_images(swap_chain);
        }
        swap_chain
    }

    /// 获取后台缓冲区并登记为交换链的子对象
    fn acquire_swap_chain_images(&self, swap_chain: &Arc<Wrapper>) {
        let Some(desc) = swap_chain.lock().swap_chain().map(|info| info.desc) else {
            return;
        };
        let Some(native) = swap_chain.native().as_swap_chain() else {
            warn!(handle_id = swap_chain.handle_id(), "Swap chain without native buffer access");
            return;
        };

        let count = acquired_buffer_count(&desc);
        let mut images = Vec::with_capacity(count as usize);
        for index in 0..count {
            let buffer = match native.get_buffer(index) {
                Ok(buffer) => buffer,
                Err(hr) => {
                    warn!(index, hr = hr.0, "Failed to acquire swap chain buffer");
                    continue;
                }
            };
            let Some(image) = self.wrap_created(HResult::S_OK, Some(buffer), ObjectKind::Resource)
            else {
                continue;
            };

            if image.lock().resource().is_none() {
                image.set_info(WrapperInfo::Resource(ResourceInfo::new(
                    ResourceDesc::texture_2d(desc.width as u64, desc.height, desc.format),
                    HeapProperties::new(HeapType::DEFAULT),
                    HeapFlags::NONE,
                    ResourceStates::PRESENT,
                )));
            }

            if image.create_info().is_none() {
                let mut parameters = ParameterEncoder::new();
                parameters.encode(&index).encode_handle_id(image.handle_id());
                self.register_created(
                    &image,
                    CreateInfo {
                        call_id: ApiCallId::IDXGISwapChainGetBuffer,
                        thread_id: self.thread_data().thread_id(),
                        parent: Some(swap_chain.handle_id()),
                        parameters: parameters.data().to_vec(),
                    },
                );
            }
            images.push(image);
        }

        debug!(
            handle_id = swap_chain.handle_id(),
            images = images.len(),
            "Swap chain images acquired"
        );
        if let Some(info) = swap_chain.lock().swap_chain_mut() {
            info.images = images;
        }
    }

    /// 释放捕获层持有的后台缓冲区引用
    pub(in crate::capture) fn release_images(&self, images: Vec<Arc<Wrapper>>) {
        for image in images {
            if image.native().release() == 0 {
                self.process_wrapper_destroy(&image);
            }
        }
    }

    /// ResizeBuffers / ResizeBuffers1 转发前
    pub fn pre_process_resize_buffers(&self, swap_chain: &Arc<Wrapper>) {
        let images = swap_chain
            .lock()
            .swap_chain_mut()
            .map(|info| std::mem::take(&mut info.images))
            .unwrap_or_default();
        self.release_images(images);
    }

    /// IDXGISwapChain::ResizeBuffers 返回后
    ///
    /// 成功时更新描述（缓冲区数为 0 表示保持原值），无论成败都重新获取缓冲区。
    pub fn post_process_resize_buffers(
        &self,
        swap_chain: &Arc<Wrapper>,
        result: HResult,
        resize: ResizeBuffersDesc,
    ) {
        if result.succeeded() {
            if let Some(info) = swap_chain.lock().swap_chain_mut() {
                if resize.buffer_count != 0 {
                    info.desc.buffer_count = resize.buffer_count;
                }
                if resize.width != 0 {
                    info.desc.width = resize.width;
                }
                if resize.height != 0 {
                    info.desc.height = resize.height;
                }
                if resize.format != Format::UNKNOWN {
                    info.desc.format = resize.format;
                }
                info.desc.flags = resize.flags;
            }
        } else {
            warn!(
                handle_id = swap_chain.handle_id(),
                hr = result.0,
                "ResizeBuffers failed, reacquiring previous buffers"
            );
        }

        self.acquire_swap_chain_images(swap_chain);
        self.end_method_call_capture();
    }

    /// IDXGISwapChain3::ResizeBuffers1 返回后
    ///
    /// 第一个队列成为新的呈现队列。
    pub fn post_process_resize_buffers1(
        &self,
        swap_chain: &Arc<Wrapper>,
        result: HResult,
        resize: ResizeBuffersDesc,
        queues: &[Arc<Wrapper>],
    ) {
        if result.succeeded() {
            if let (Some(info), Some(queue)) = (swap_chain.lock().swap_chain_mut(), queues.first()) {
                info.queue = Some(queue.clone());
            }
        }
        self.post_process_resize_buffers(swap_chain, result, resize);
    }

    /// Present / Present1 转发前：配置了截图的帧在这里请求截图
    pub fn pre_process_present(&self, swap_chain: &Arc<Wrapper>) {
        let frame = self.current_frame();
        if !self.settings().capture.screenshot_frames.contains(&frame) {
            return;
        }
        let Some(renderer) = self.renderer.read().clone() else {
            debug!(frame, "Screenshot requested without a frame renderer");
            return;
        };

        let request = {
            let state = swap_chain.lock();
            let Some(info) = state.swap_chain() else {
                return;
            };
            let index = match info.desc.swap_effect {
                SwapEffect::DISCARD | SwapEffect::SEQUENTIAL => 0,
                _ => swap_chain
                    .native()
                    .as_swap_chain()
                    .map_or(0, |native| native.current_back_buffer_index()),
            };
            let Some(back_buffer) = info.images.get(index as usize).cloned() else {
                warn!(frame, index, "Screenshot back buffer not acquired");
                return;
            };
            let queue = info
                .queue
                .clone()
                .or_else(|| self.direct_queues.lock().first().cloned());
            FrameCaptureRequest {
                frame,
                swap_chain: swap_chain.handle_id(),
                back_buffer,
                queue,
                desc: info.desc,
            }
        };

        info!(frame, "Capturing screenshot");
        renderer.capture_frame(request);
    }

    /// Present / Present1 返回后：结束当前帧
    pub fn post_process_present(&self, swap_chain: &Wrapper, result: HResult) {
        self.end_method_call_capture();
        if result.succeeded() {
            if let Some(info) = swap_chain.lock().swap_chain_mut() {
                info.present_count += 1;
            }
        }
        self.end_frame();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FrameRenderer;
    use crate::core::config::CaptureSettings;
    use crate::testing::{next_address, tracking_manager, MockObject, MockSwapChain};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingRenderer {
        requests: Mutex<Vec<(u32, u64)>>,
    }

    impl FrameRenderer for RecordingRenderer {
        fn capture_frame(&self, request: FrameCaptureRequest) {
            self.requests
                .lock()
                .push((request.frame, request.back_buffer.handle_id()));
        }
    }

    struct Fixture {
        manager: CaptureManager,
        buffers: Arc<Mutex<Vec<usize>>>,
        swap_chain: Arc<Wrapper>,
    }

    fn desc(buffer_count: u32, swap_effect: SwapEffect) -> SwapChainDesc {
        SwapChainDesc {
            width: 1280,
            height: 720,
            format: Format::B8G8R8A8_UNORM,
            buffer_count,
            swap_effect,
            buffer_usage: 0x20,
            flags: 0,
        }
    }

    fn fixture(manager: CaptureManager, desc: SwapChainDesc) -> Fixture {
        manager.begin_api_call_capture(ApiCallId::CreateDXGIFactory2);
        let factory = manager
            .end_create_api_call_capture(
                HResult::S_OK,
                Some(Box::new(MockObject::new(next_address()))),
                ObjectKind::Factory,
            )
            .unwrap();
        manager.begin_api_call_capture(ApiCallId::D3D12CreateDevice);
        let device = manager
            .end_create_api_call_capture(
                HResult::S_OK,
                Some(Box::new(MockObject::new(next_address()))),
                ObjectKind::Device,
            )
            .unwrap();
        manager.begin_method_call_capture(
            ApiCallId::ID3D12DeviceCreateCommandQueue,
            device.handle_id(),
        );
        let queue = manager
            .end_create_method_call_capture(
                HResult::S_OK,
                Some(Box::new(MockObject::new(next_address()))),
                ObjectKind::CommandQueue,
                &device,
            )
            .unwrap();

        let buffers = Arc::new(Mutex::new(
            (0..desc.buffer_count).map(|_| next_address()).collect(),
        ));
        manager.begin_method_call_capture(
            ApiCallId::IDXGIFactory2CreateSwapChainForHwnd,
            factory.handle_id(),
        );
        let swap_chain = manager
            .post_process_create_swap_chain(
                &factory,
                HResult::S_OK,
                Some(Box::new(MockSwapChain::new(next_address(), buffers.clone()))),
                Some(&queue),
                &desc,
            )
            .unwrap();

        Fixture {
            manager,
            buffers,
            swap_chain,
        }
    }

    fn images(swap_chain: &Wrapper) -> Vec<Arc<Wrapper>> {
        swap_chain.lock().swap_chain().unwrap().images.clone()
    }

    fn resize(f: &Fixture, result: HResult, buffer_count: u32) {
        f.manager.begin_method_call_capture(
            ApiCallId::IDXGISwapChainResizeBuffers,
            f.swap_chain.handle_id(),
        );
        f.manager.pre_process_resize_buffers(&f.swap_chain);
        f.manager.post_process_resize_buffers(
            &f.swap_chain,
            result,
            ResizeBuffersDesc {
                buffer_count,
                ..Default::default()
            },
        );
    }

    #[test]
    fn test_resize_replaces_back_buffers() {
        let (manager, _sink) = tracking_manager(CaptureSettings::default());
        let f = fixture(manager, desc(2, SwapEffect::FLIP_DISCARD));
        let tracker = f.manager.state_tracker().unwrap();

        let before = images(&f.swap_chain);
        assert_eq!(before.len(), 2);
        for image in &before {
            assert!(tracker.is_live(image.handle_id()));
            let create = image.create_info().unwrap();
            assert_eq!(create.call_id, ApiCallId::IDXGISwapChainGetBuffer);
            assert_eq!(create.parent, Some(f.swap_chain.handle_id()));
        }

        *f.buffers.lock() = (0..3).map(|_| next_address()).collect();
        resize(&f, HResult::S_OK, 3);

        for image in &before {
            assert!(tracker.is_removed(image.handle_id()));
            assert!(image.is_destroyed());
        }
        let after = images(&f.swap_chain);
        assert_eq!(after.len(), 3);
        for image in &after {
            assert!(tracker.is_live(image.handle_id()));
            assert!(before.iter().all(|old| old.handle_id() != image.handle_id()));
        }
        assert_eq!(
            f.swap_chain.lock().swap_chain().unwrap().desc.buffer_count,
            3
        );
    }

    #[test]
    fn test_resize_with_zero_count_keeps_previous() {
        let (manager, _sink) = tracking_manager(CaptureSettings::default());
        let f = fixture(manager, desc(3, SwapEffect::FLIP_SEQUENTIAL));
        resize(&f, HResult::S_OK, 0);
        assert_eq!(images(&f.swap_chain).len(), 3);
        assert_eq!(
            f.swap_chain.lock().swap_chain().unwrap().desc.buffer_count,
            3
        );
    }

    #[test]
    fn test_failed_resize_reacquires_buffers() {
        let (manager, _sink) = tracking_manager(CaptureSettings::default());
        let f = fixture(manager, desc(2, SwapEffect::FLIP_DISCARD));
        resize(&f, HResult::E_FAIL, 4);

        let reacquired = images(&f.swap_chain);
        assert_eq!(reacquired.len(), 2);
        assert_eq!(
            f.swap_chain.lock().swap_chain().unwrap().desc.buffer_count,
            2
        );
    }

    #[test]
    fn test_discard_effect_acquires_first_buffer_only() {
        let (manager, _sink) = tracking_manager(CaptureSettings::default());
        let f = fixture(manager, desc(3, SwapEffect::DISCARD));
        let acquired = images(&f.swap_chain);
        assert_eq!(acquired.len(), 1);
        assert_eq!(acquired[0].address(), f.buffers.lock()[0]);
    }

    #[test]
    fn test_swap_chain_release_releases_images() {
        let (manager, _sink) = tracking_manager(CaptureSettings::default());
        let f = fixture(manager, desc(2, SwapEffect::FLIP_DISCARD));
        let tracker = f.manager.state_tracker().unwrap();
        let acquired = images(&f.swap_chain);

        assert_eq!(f.manager.release(&f.swap_chain), 0);
        for image in &acquired {
            assert!(tracker.is_removed(image.handle_id()));
        }
    }

    #[test]
    fn test_screenshot_requested_in_configured_frame() {
        let mut settings = CaptureSettings::default();
        settings.capture.screenshot_frames = vec![2];
        let (manager, _sink) = tracking_manager(settings);
        let renderer = Arc::new(RecordingRenderer::default());
        let f = fixture(
            manager.with_frame_renderer(renderer.clone()),
            desc(2, SwapEffect::FLIP_DISCARD),
        );

        for _ in 0..3 {
            f.manager.begin_method_call_capture(
                ApiCallId::IDXGISwapChainPresent,
                f.swap_chain.handle_id(),
            );
            f.manager.pre_process_present(&f.swap_chain);
            f.manager.post_process_present(&f.swap_chain, HResult::S_OK);
        }

        let requests = renderer.requests.lock().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, 2);
        assert_eq!(requests[0].1, images(&f.swap_chain)[0].handle_id());
        assert_eq!(f.manager.current_frame(), 4);
        assert_eq!(f.swap_chain.lock().swap_chain().unwrap().present_count, 3);
    }
}
