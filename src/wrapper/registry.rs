//! 句柄分配与包装对象注册表

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::object::Wrapper;
use crate::format::{HandleId, NULL_HANDLE_ID};

/// 句柄分配器
///
/// 单调递增，从 1 开始，同一进程内永不复用。
#[derive(Debug)]
pub struct HandleAllocator {
    next: AtomicU64,
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(NULL_HANDLE_ID + 1),
        }
    }
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self) -> HandleId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// 原生对象身份 → 包装对象
#[derive(Debug, Default)]
pub struct WrapperRegistry {
    objects: RwLock<HashMap<usize, Arc<Wrapper>>>,
}

impl WrapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: usize) -> Option<Arc<Wrapper>> {
        self.objects.read().get(&address).cloned()
    }

    /// 注册包装对象
    ///
    /// 同一个原生对象已经有包装时返回已有的那个，新的不会被注册。
    pub fn insert(&self, wrapper: Arc<Wrapper>) -> Arc<Wrapper> {
        self.objects
            .write()
            .entry(wrapper.address())
            .or_insert(wrapper)
            .clone()
    }

    /// 注销包装对象（只有注册的正是这个包装时才移除）
    pub fn remove(&self, wrapper: &Wrapper) -> bool {
        let mut objects = self.objects.write();
        match objects.get(&wrapper.address()) {
            Some(existing) if existing.handle_id() == wrapper.handle_id() => {
                objects.remove(&wrapper.address());
                true
            }
            _ => false,
        }
    }

    /// 当前登记的所有包装对象，按句柄排序
    pub fn wrappers(&self) -> Vec<Arc<Wrapper>> {
        let mut wrappers: Vec<Arc<Wrapper>> = self.objects.read().values().cloned().collect();
        wrappers.sort_by_key(|wrapper| wrapper.handle_id());
        wrappers
    }

    /// 注销全部包装对象
    pub fn clear(&self) {
        self.objects.write().clear();
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}
