//! 内置原生迭代器类。
//!
//! 这些类通过运行时的类注册接口注册，和任何原生绑定模块的做法一致：
//! 构造函数把迭代状态作为私有数据挂到对象上，`next()` / `getValue()` 等方法
//! 从私有数据中读取并推进状态，因此它们都可以直接作为 `foreach` 的数据源。
//!
//! # 主要功能
//! - `ListIterator`：双向遍历列表
//! - `HashIterator` / `HashKeyIterator`：双向遍历哈希的值 / 键
//! - `RangeIterator`：惰性整数区间
//! - `SingleValueIterator`：把单个值当作单元素序列
//!
//! 迭代器只能在创建它的线程上使用，跨线程调用会抛出 `ITERATOR-THREAD-ERROR`。

use std::{
    sync::{Arc, Mutex},
    thread::{self, ThreadId},
};

use onyx_vm::{
    exception::names,
    types::{
        class::{Access, ClassBuilder, ClassId, ClassRegistry},
        method::MethodVariant,
        object::{downcast_private, PrivateData},
    },
    ObjectRef, OnyxException, OnyxValue,
};

mod hash_iterator;
mod list_iterator;
mod range_iterator;
mod single_value_iterator;

/// Names of the classes registered by [`register_all`].
pub const CLASS_NAMES: [&str; 5] = [
    "ListIterator",
    "HashIterator",
    "HashKeyIterator",
    "RangeIterator",
    "SingleValueIterator",
];

/// Registers every builtin iterator class.
pub fn register_all(registry: &ClassRegistry) -> Result<(), OnyxException> {
    registry.register(list_iterator::build_class())?;
    registry.register(hash_iterator::build_class(hash_iterator::Yield::Value))?;
    registry.register(hash_iterator::build_class(hash_iterator::Yield::Key))?;
    registry.register(range_iterator::build_class())?;
    registry.register(single_value_iterator::build_class())?;
    Ok(())
}

/// Mutable state of one builtin iterator.
pub(crate) trait IteratorState: Send + 'static {
    /// Gives back the values the state holds.
    fn release(&mut self) -> Result<(), OnyxException>;
}

/// Private data of a builtin iterator: its state plus the thread that created it.
pub(crate) struct IteratorPrivate<S: IteratorState> {
    class_name: &'static str,
    owner: ThreadId,
    state: Mutex<S>,
}

impl<S: IteratorState> IteratorPrivate<S> {
    pub(crate) fn new(class_name: &'static str, state: S) -> Self {
        IteratorPrivate {
            class_name,
            owner: thread::current().id(),
            state: Mutex::new(state),
        }
    }

    /// Runs `f` on the state after checking the calling thread.
    pub(crate) fn with<R>(
        &self,
        f: impl FnOnce(&mut S) -> Result<R, OnyxException>,
    ) -> Result<R, OnyxException> {
        if thread::current().id() != self.owner {
            return Err(OnyxException::new(
                names::ITERATOR_THREAD_ERROR,
                format!(
                    "{} was created in another thread and cannot be used here",
                    self.class_name
                ),
            ));
        }
        let mut state = self.state.lock().map_err(|_| {
            OnyxException::new(
                names::BORROW_ERROR,
                format!("{} state is poisoned", self.class_name),
            )
        })?;
        f(&mut state)
    }
}

impl<S: IteratorState> PrivateData for IteratorPrivate<S> {
    fn release(&self) -> Result<(), OnyxException> {
        match self.state.lock() {
            Ok(mut state) => state.release(),
            Err(poisoned) => poisoned.into_inner().release(),
        }
    }
}

/// Looks up the iterator state a native method was called with.
pub(crate) fn state_of<S: IteratorState>(
    class_name: &str,
    private: Option<&Arc<dyn PrivateData>>,
) -> Result<Arc<IteratorPrivate<S>>, OnyxException> {
    private
        .and_then(downcast_private::<IteratorPrivate<S>>)
        .ok_or_else(|| {
            OnyxException::new(
                names::INVALID_ITERATOR,
                format!("{} object has no iterator state", class_name),
            )
        })
}

pub(crate) fn not_on_element(class_name: &str, method: &str) -> OnyxException {
    OnyxException::new(
        names::INVALID_ITERATOR,
        format!(
            "{}::{}() called while the iterator is not pointing at an element",
            class_name, method
        ),
    )
}

/// Adds a public, argument-free native method that works on the iterator state.
pub(crate) fn state_method<S, F>(
    builder: ClassBuilder,
    class_name: &'static str,
    name: &'static str,
    f: F,
) -> ClassBuilder
where
    S: IteratorState,
    F: Fn(&mut S) -> Result<OnyxValue, OnyxException> + Send + Sync + 'static,
{
    builder.method(
        name,
        Access::Public,
        MethodVariant::native(Vec::new(), move |_, private, _| {
            state_of::<S>(class_name, private)?.with(|state| f(state))
        }),
    )
}

/// Attaches freshly built state to a new object.
pub(crate) fn attach<S: IteratorState>(
    object: &ObjectRef,
    class_id: ClassId,
    class_name: &'static str,
    state: S,
) -> Result<OnyxValue, OnyxException> {
    object.set_private(class_id, Arc::new(IteratorPrivate::new(class_name, state)))?;
    Ok(OnyxValue::Nothing)
}

/// Convenience for embedders: builds an iterator object by class name.
pub fn create_iterator(
    registry: &ClassRegistry,
    name: &str,
    args: Vec<OnyxValue>,
) -> Result<ObjectRef, OnyxException> {
    registry.instantiate(name, args, None)
}
