//! 执行期栈帧：局部变量槽位、`self` 绑定、类上下文、隐式参数与活动异常。

use std::sync::Arc;

use crate::{
    exception::{ExceptionSink, OnyxException},
    runtime::scope::LocalId,
    types::{class::OnyxClass, object::ObjectRef, value::OnyxValue},
};

/// Values seen by `$1`-style implicit arguments and the `$#` implicit index.
#[derive(Default)]
struct ImplicitArgs {
    args: Vec<OnyxValue>,
    index: i64,
}

pub struct Frame {
    locals: Vec<OnyxValue>,
    self_obj: Option<ObjectRef>,
    class: Option<Arc<OnyxClass>>,
    implicit: Vec<ImplicitArgs>,
    /// Exceptions being handled by `catch` blocks or error handlers, innermost
    /// last. A rethrow takes the innermost one out.
    active: Vec<Option<OnyxException>>,
}

impl Frame {
    pub fn new(size: usize, self_obj: Option<ObjectRef>, class: Option<Arc<OnyxClass>>) -> Self {
        let mut locals = Vec::with_capacity(size);
        locals.resize_with(size, OnyxValue::default);
        Frame {
            locals,
            self_obj,
            class,
            implicit: Vec::new(),
            active: Vec::new(),
        }
    }

    #[inline(always)]
    pub fn self_obj(&self) -> Option<&ObjectRef> {
        self.self_obj.as_ref()
    }

    /// The class whose code is running, for access checks.
    #[inline(always)]
    pub fn caller(&self) -> Option<&OnyxClass> {
        self.class.as_deref()
    }

    pub fn class(&self) -> Option<&Arc<OnyxClass>> {
        self.class.as_ref()
    }

    pub fn local(&self, id: LocalId) -> OnyxValue {
        self.locals.get(id.0).cloned().unwrap_or_default()
    }

    pub fn local_mut(&mut self, id: LocalId) -> &mut OnyxValue {
        if id.0 >= self.locals.len() {
            self.locals.resize_with(id.0 + 1, OnyxValue::default);
        }
        &mut self.locals[id.0]
    }

    /// Stores `value` and returns the previous occupant for the caller to release.
    pub fn replace_local(&mut self, id: LocalId, value: OnyxValue) -> OnyxValue {
        std::mem::replace(self.local_mut(id), value)
    }

    pub fn take_local(&mut self, id: LocalId) -> OnyxValue {
        match self.locals.get_mut(id.0) {
            Some(slot) => std::mem::take(slot),
            None => OnyxValue::Nothing,
        }
    }

    pub(crate) fn push_implicit(&mut self, args: Vec<OnyxValue>) {
        self.implicit.push(ImplicitArgs { args, index: 0 });
    }

    /// Replaces the innermost implicit arguments, releasing the old ones.
    pub(crate) fn set_implicit(&mut self, args: Vec<OnyxValue>, index: i64) -> Result<(), OnyxException> {
        match self.implicit.last_mut() {
            Some(top) => {
                let old = std::mem::replace(&mut top.args, args);
                top.index = index;
                release_all(old)
            }
            None => {
                self.implicit.push(ImplicitArgs { args, index });
                Ok(())
            }
        }
    }

    pub(crate) fn pop_implicit(&mut self) -> Result<(), OnyxException> {
        match self.implicit.pop() {
            Some(top) => release_all(top.args),
            None => Ok(()),
        }
    }

    /// `$n`, counting from 1.
    pub fn implicit_arg(&self, n: usize) -> OnyxValue {
        self.implicit
            .last()
            .and_then(|top| n.checked_sub(1).and_then(|i| top.args.get(i)))
            .cloned()
            .unwrap_or_default()
    }

    pub fn implicit_index(&self) -> i64 {
        self.implicit.last().map(|top| top.index).unwrap_or(0)
    }

    pub(crate) fn push_active(&mut self, exception: OnyxException) {
        self.active.push(Some(exception));
    }

    /// Ends handling; `None` if the exception was rethrown meanwhile.
    pub(crate) fn pop_active(&mut self) -> Option<OnyxException> {
        self.active.pop().flatten()
    }

    pub(crate) fn take_active(&mut self) -> Option<OnyxException> {
        self.active.last_mut().and_then(Option::take)
    }

    /// Releases every local, the implicit arguments and `self`.
    pub fn release(self) -> Result<(), OnyxException> {
        let mut xsink = ExceptionSink::new();
        for value in self.locals.into_iter().rev() {
            xsink.absorb(value.release());
        }
        for top in self.implicit.into_iter().rev() {
            xsink.absorb(release_all(top.args));
        }
        if let Some(object) = self.self_obj {
            xsink.absorb(object.release());
        }
        xsink.into_result()
    }
}

pub(crate) fn release_all(values: Vec<OnyxValue>) -> Result<(), OnyxException> {
    let mut xsink = ExceptionSink::new();
    for value in values {
        xsink.absorb(value.release());
    }
    xsink.into_result()
}
