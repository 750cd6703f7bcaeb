//! 每线程捕获上下文
//!
//! 调用深度和参数缓冲区只被所属线程访问。这里用一个以
//! `std::thread::ThreadId` 为键的注册表把它们交给管理器，
//! 每个管理器各有一份。线程退出时，线程局部的退出守卫把该线程的条目
//! 从所有仍然存在的注册表中移除。

use parking_lot::{Mutex, MutexGuard, RwLock};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

use crate::format::{ApiCallId, HandleId, ParameterEncoder, ThreadId};

/// 当前正在捕获的调用
#[derive(Debug, Default)]
pub struct CallState {
    pub call_id: ApiCallId,
    pub object_id: Option<HandleId>,
    /// 本线程的调用序号，单调递增
    pub sequence: u64,
    pub encoder: ParameterEncoder,
}

/// 线程上下文
#[derive(Debug)]
pub struct ThreadData {
    thread_id: ThreadId,
    call_scope: AtomicU32,
    next_sequence: AtomicU64,
    call: Mutex<CallState>,
}

impl ThreadData {
    fn new(thread_id: ThreadId) -> Self {
        Self {
            thread_id,
            call_scope: AtomicU32::new(0),
            next_sequence: AtomicU64::new(1),
            call: Mutex::new(CallState::default()),
        }
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn call_scope(&self) -> u32 {
        self.call_scope.load(Ordering::Relaxed)
    }

    /// 进入一层拦截调用，返回新的深度
    pub fn increment_call_scope(&self) -> u32 {
        self.call_scope.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// 离开一层拦截调用，返回新的深度
    pub fn decrement_call_scope(&self) -> u32 {
        let previous = self
            .call_scope
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |scope| {
                Some(scope.saturating_sub(1))
            })
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    /// 开始记录一次调用，清空参数缓冲区
    pub fn begin_call(&self, call_id: ApiCallId, object_id: Option<HandleId>) {
        let mut call = self.call.lock();
        call.call_id = call_id;
        call.object_id = object_id;
        call.sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        call.encoder.clear();
    }

    pub fn call(&self) -> MutexGuard<'_, CallState> {
        self.call.lock()
    }
}

/// 调用深度守卫，drop 时离开这一层
#[derive(Debug)]
pub struct CallScope {
    thread: Arc<ThreadData>,
    depth: u32,
}

impl CallScope {
    pub fn enter(thread: Arc<ThreadData>) -> Self {
        let depth = thread.increment_call_scope();
        Self { thread, depth }
    }

    /// 进入时的深度，1 表示应用直接调用
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_nested(&self) -> bool {
        self.depth > 1
    }
}

impl Drop for CallScope {
    fn drop(&mut self) {
        self.thread.decrement_call_scope();
    }
}

type ThreadMap = RwLock<HashMap<std::thread::ThreadId, Arc<ThreadData>>>;

/// 线程退出时清理注册表条目
struct ThreadExitGuard {
    key: std::thread::ThreadId,
    registries: RefCell<Vec<Weak<ThreadMap>>>,
}

impl Drop for ThreadExitGuard {
    fn drop(&mut self) {
        for registry in self.registries.get_mut().drain(..) {
            if let Some(threads) = registry.upgrade() {
                threads.write().remove(&self.key);
            }
        }
    }
}

thread_local! {
    static EXIT_GUARD: ThreadExitGuard = ThreadExitGuard {
        key: std::thread::current().id(),
        registries: RefCell::new(Vec::new()),
    };
}

/// 线程上下文注册表
#[derive(Debug)]
pub struct ThreadRegistry {
    threads: Arc<ThreadMap>,
    next_id: AtomicU64,
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self {
            threads: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前线程的上下文，第一次访问时创建
    pub fn current(&self) -> Arc<ThreadData> {
        let key = std::thread::current().id();
        if let Some(data) = self.threads.read().get(&key) {
            return data.clone();
        }

        let data = {
            let mut threads = self.threads.write();
            if let Some(data) = threads.get(&key) {
                return data.clone();
            }
            let data = Arc::new(ThreadData::new(self.next_id.fetch_add(1, Ordering::Relaxed)));
            threads.insert(key, data.clone());
            data
        };

        let watched = EXIT_GUARD.try_with(|guard| {
            let mut registries = guard.registries.borrow_mut();
            registries.retain(|registry| registry.strong_count() > 0);
            registries.push(Arc::downgrade(&self.threads));
        });
        if watched.is_err() {
            trace!(thread_id = data.thread_id(), "Thread context created during thread exit");
        }
        data
    }

    /// 丢弃所有线程上下文
    pub fn clear(&self) {
        self.threads.write().clear();
    }

    pub fn len(&self) -> usize {
        self.threads.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.read().is_empty()
    }
}
