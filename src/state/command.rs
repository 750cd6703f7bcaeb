//! 命令列表上记录的状态相关调用
//!
//! 不同调用的参数形状各不相同，这里统一成一个 `TrackedCommand`：
//! 一个种类标签、参数字节、引用的句柄，以及一个在提交时才执行的提取闭包，
//! 闭包返回该调用对资源状态的影响。

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::api::types::{ResourceStates, ALL_SUBRESOURCES};
use crate::format::{ApiCallId, Encode, HandleId, ParameterEncoder, ThreadId, NULL_HANDLE_ID};
use crate::wrapper::{TileMapping, Wrapper};

/// 记录调用的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CommandKind {
    ResourceBarrier,
    Reset,
    Close,
    TileMapping,
    Other,
}

/// 一次调用对资源状态的影响
#[derive(Debug, Clone)]
pub enum StateChange {
    /// 子资源进入新状态；`ALL_SUBRESOURCES` 表示整个资源
    ResourceState {
        resource: Arc<Wrapper>,
        subresource: u32,
        state: ResourceStates,
    },
    /// 保留资源的一组 tile 映射
    TileMapping {
        resource: Arc<Wrapper>,
        mapping: TileMapping,
    },
}

/// 状态提取闭包，在提交时执行一次
pub type StateExtractor = Box<dyn FnOnce() -> Vec<StateChange> + Send>;

/// 命令列表日志中的一条记录
pub struct TrackedCommand {
    pub call_id: ApiCallId,
    pub thread_id: ThreadId,
    pub kind: CommandKind,
    pub parameters: Vec<u8>,
    /// 参数中引用的包装对象句柄
    pub references: Vec<HandleId>,
    extractor: Option<StateExtractor>,
}

impl TrackedCommand {
    pub fn new(
        call_id: ApiCallId,
        thread_id: ThreadId,
        kind: CommandKind,
        parameters: Vec<u8>,
        references: Vec<HandleId>,
    ) -> Self {
        Self {
            call_id,
            thread_id,
            kind,
            parameters,
            references,
            extractor: None,
        }
    }

    pub fn with_extractor(mut self, extractor: StateExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// 执行提取闭包（只会执行一次）
    pub fn take_changes(&mut self) -> Vec<StateChange> {
        self.extractor.take().map(|extract| extract()).unwrap_or_default()
    }

    pub fn record(&self) -> CommandRecord {
        CommandRecord {
            call_id: self.call_id,
            thread_id: self.thread_id,
            kind: self.kind,
            parameters: self.parameters.clone(),
            references: self.references.clone(),
        }
    }
}

impl fmt::Debug for TrackedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedCommand")
            .field("call_id", &self.call_id)
            .field("thread_id", &self.thread_id)
            .field("kind", &self.kind)
            .field("references", &self.references)
            .field("pending_extractor", &self.extractor.is_some())
            .finish()
    }
}

/// 快照中的命令记录（不含提取闭包）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandRecord {
    pub call_id: ApiCallId,
    pub thread_id: ThreadId,
    pub kind: CommandKind,
    pub parameters: Vec<u8>,
    pub references: Vec<HandleId>,
}

/// D3D12_RESOURCE_BARRIER
#[derive(Debug, Clone)]
pub enum ResourceBarrier {
    Transition {
        resource: Option<Arc<Wrapper>>,
        subresource: u32,
        before: ResourceStates,
        after: ResourceStates,
    },
    Aliasing {
        before: Option<Arc<Wrapper>>,
        after: Option<Arc<Wrapper>>,
    },
    Uav {
        resource: Option<Arc<Wrapper>>,
    },
}

fn handle_of(wrapper: &Option<Arc<Wrapper>>) -> HandleId {
    wrapper.as_ref().map_or(NULL_HANDLE_ID, |w| w.handle_id())
}

impl ResourceBarrier {
    pub fn transition(
        resource: &Arc<Wrapper>,
        before: ResourceStates,
        after: ResourceStates,
    ) -> Self {
        ResourceBarrier::Transition {
            resource: Some(resource.clone()),
            subresource: ALL_SUBRESOURCES,
            before,
            after,
        }
    }

    /// 屏障引用的非空句柄
    pub fn referenced_handles(&self) -> Vec<HandleId> {
        let handles = match self {
            ResourceBarrier::Transition { resource, .. } => vec![handle_of(resource)],
            ResourceBarrier::Aliasing { before, after } => {
                vec![handle_of(before), handle_of(after)]
            }
            ResourceBarrier::Uav { resource } => vec![handle_of(resource)],
        };
        handles.into_iter().filter(|h| *h != NULL_HANDLE_ID).collect()
    }

    /// 提交后资源所处的状态
    pub fn state_change(&self) -> Option<StateChange> {
        match self {
            ResourceBarrier::Transition {
                resource: Some(resource),
                subresource,
                after,
                ..
            } => Some(StateChange::ResourceState {
                resource: resource.clone(),
                subresource: *subresource,
                state: *after,
            }),
            _ => None,
        }
    }
}

impl Encode for ResourceBarrier {
    fn encode(&self, encoder: &mut ParameterEncoder) {
        match self {
            ResourceBarrier::Transition {
                resource,
                subresource,
                before,
                after,
            } => {
                encoder
                    .encode(&0u32)
                    .encode_handle_id(handle_of(resource))
                    .encode(subresource)
                    .encode(before)
                    .encode(after);
            }
            ResourceBarrier::Aliasing { before, after } => {
                encoder
                    .encode(&1u32)
                    .encode_handle_id(handle_of(before))
                    .encode_handle_id(handle_of(after));
            }
            ResourceBarrier::Uav { resource } => {
                encoder.encode(&2u32).encode_handle_id(handle_of(resource));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockObject;
    use crate::wrapper::ObjectKind;

    fn resource(handle_id: HandleId) -> Arc<Wrapper> {
        Arc::new(Wrapper::new(
            handle_id,
            ObjectKind::Resource,
            Box::new(MockObject::new(0x4000 + handle_id as usize)),
        ))
    }

    #[test]
    fn test_extractor_runs_once() {
        let target = resource(3);
        let barrier = ResourceBarrier::transition(
            &target,
            ResourceStates::COMMON,
            ResourceStates::RENDER_TARGET,
        );
        let change = barrier.state_change();
        let mut command = TrackedCommand::new(
            ApiCallId::ID3D12GraphicsCommandListResourceBarrier,
            1,
            CommandKind::ResourceBarrier,
            Vec::new(),
            barrier.referenced_handles(),
        )
        .with_extractor(Box::new(move || change.into_iter().collect()));

        assert_eq!(command.references, vec![3]);
        assert_eq!(command.take_changes().len(), 1);
        assert!(command.take_changes().is_empty());
    }

    #[test]
    fn test_barrier_references_skip_null() {
        let barrier = ResourceBarrier::Aliasing {
            before: None,
            after: Some(resource(9)),
        };
        assert_eq!(barrier.referenced_handles(), vec![9]);
        assert!(barrier.state_change().is_none());

        let mut encoder = ParameterEncoder::new();
        encoder.encode(&barrier);
        assert_eq!(encoder.len(), 4 + 8 + 8);
    }
}
