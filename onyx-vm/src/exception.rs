//! Onyx 语言级异常与异常收集通道。
//!
//! 所有可失败的运行时操作都返回 `Result<T, OnyxException>`，调用方用 `?` 向上传播。
//! 当一个逻辑操作可能同时产生多个异常时（例如覆盖旧值时触发的析构函数、
//! `on block exit` 处理器、作用域退出时释放局部变量），使用 [`ExceptionSink`]
//! 收集它们，最后折叠为一条按抛出顺序链接的异常链。

use std::fmt::{Debug, Display};

use log::warn;

use crate::types::{hash::OnyxHash, value::OnyxValue};

/// Symbolic exception names raised by the runtime.
pub mod names {
    pub const OBJECT_ALREADY_DELETED: &str = "OBJECT-ALREADY-DELETED";
    pub const DOUBLE_DELETE: &str = "DOUBLE-DELETE-EXCEPTION";
    pub const RANGE_ITERATOR: &str = "RANGEITERATOR-ERROR";
    pub const PRIVATE_MEMBER: &str = "PRIVATE-MEMBER";
    pub const INVALID_MEMBER: &str = "INVALID-MEMBER";
    pub const METHOD_DOES_NOT_EXIST: &str = "METHOD-DOES-NOT-EXIST";
    pub const METHOD_IS_PRIVATE: &str = "METHOD-IS-PRIVATE";
    pub const METHOD_EVAL_ON_NON_OBJECT: &str = "METHOD-EVAL-ON-NON-OBJECT";
    pub const RUNTIME_TYPE_ERROR: &str = "RUNTIME-TYPE-ERROR";
    pub const RUNTIME_OVERLOAD_ERROR: &str = "RUNTIME-OVERLOAD-ERROR";
    pub const ENCODING_CONVERSION: &str = "ENCODING-CONVERSION-ERROR";
    pub const CLASS_DOMAIN: &str = "CLASS-DOMAIN-ERROR";
    pub const CLASS_ALREADY_DEFINED: &str = "CLASS-ALREADY-DEFINED";
    pub const CONSTRUCTOR_IS_PRIVATE: &str = "CONSTRUCTOR-IS-PRIVATE";
    pub const DIVISION_BY_ZERO: &str = "DIVISION-BY-ZERO";
    pub const SORT_ERROR: &str = "SORT-ERROR";
    pub const CALL_ERROR: &str = "CALL-ERROR";
    pub const INVALID_ITERATOR: &str = "INVALID-ITERATOR";
    pub const ITERATOR_THREAD_ERROR: &str = "ITERATOR-THREAD-ERROR";
    pub const LVALUE_ERROR: &str = "LVALUE-ERROR";
    pub const RETHROW_ERROR: &str = "RETHROW-ERROR";
    pub const USER_EXCEPTION: &str = "USER-EXCEPTION";
    pub const BORROW_ERROR: &str = "BORROW-ERROR";

    /// `<OP>-ITERATOR-ERROR`, e.g. `FOREACH-ITERATOR-ERROR` or `MAP-ITERATOR-ERROR`.
    pub fn iterator_error(op: &str) -> String {
        format!("{}-ITERATOR-ERROR", op.to_ascii_uppercase())
    }
}

/// A language-level exception: symbolic name, description, optional argument.
///
/// Exceptions raised while another one was already pending are chained through
/// `next`, first raised first.
#[derive(Clone)]
pub struct OnyxException {
    err: String,
    desc: String,
    arg: OnyxValue,
    location: Option<String>,
    next: Option<Box<OnyxException>>,
}

impl OnyxException {
    pub fn new(err: impl Into<String>, desc: impl Into<String>) -> Self {
        OnyxException {
            err: err.into(),
            desc: desc.into(),
            arg: OnyxValue::Nothing,
            location: None,
            next: None,
        }
    }

    pub fn with_arg(mut self, arg: OnyxValue) -> Self {
        self.arg = arg;
        self
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        if self.location.is_none() {
            self.location = Some(location.into());
        }
        self
    }

    #[inline(always)]
    pub fn err(&self) -> &str {
        &self.err
    }

    #[inline(always)]
    pub fn desc(&self) -> &str {
        &self.desc
    }

    #[inline(always)]
    pub fn arg(&self) -> &OnyxValue {
        &self.arg
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn next(&self) -> Option<&OnyxException> {
        self.next.as_deref()
    }

    /// Appends `other` (and its own chain) at the tail of this chain.
    pub fn append(&mut self, other: OnyxException) {
        match &mut self.next {
            Some(next) => next.append(other),
            None => self.next = Some(Box::new(other)),
        }
    }

    /// Iterates the chain starting with this exception.
    pub fn iter(&self) -> impl Iterator<Item = &OnyxException> {
        std::iter::successors(Some(self), |e| e.next())
    }

    pub fn chain_len(&self) -> usize {
        self.iter().count()
    }

    /// The script-visible form bound by `catch`: `{err, desc, arg, next?}`.
    pub fn to_hash(&self) -> OnyxHash {
        let mut hash = OnyxHash::new();
        *hash.get_or_create("err") = OnyxValue::from(self.err.as_str());
        *hash.get_or_create("desc") = OnyxValue::from(self.desc.as_str());
        *hash.get_or_create("arg") = self.arg.clone();
        if let Some(location) = &self.location {
            *hash.get_or_create("location") = OnyxValue::from(location.as_str());
        }
        if let Some(next) = &self.next {
            *hash.get_or_create("next") = OnyxValue::from(next.to_hash());
        }
        hash
    }
}

impl Display for OnyxException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, e) in self.iter().enumerate() {
            if i > 0 {
                write!(f, "; chained: ")?;
            }
            write!(f, "{}: {}", e.err, e.desc)?;
            if let Some(location) = &e.location {
                write!(f, " (at {})", location)?;
            }
        }
        Ok(())
    }
}

impl Debug for OnyxException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnyxException")
            .field("err", &self.err)
            .field("desc", &self.desc)
            .field("arg", &self.arg)
            .field("location", &self.location)
            .field("next", &self.next)
            .finish()
    }
}

impl std::error::Error for OnyxException {}

/// Collects exceptions produced by one logical operation.
#[derive(Default)]
pub struct ExceptionSink {
    raised: Vec<OnyxException>,
}

impl ExceptionSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&mut self, exception: OnyxException) {
        self.raised.push(exception);
    }

    /// Records the error of `result`, if any, and hands back the success value.
    pub fn absorb<T>(&mut self, result: Result<T, OnyxException>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.raised.push(e);
                None
            }
        }
    }

    #[inline(always)]
    pub fn is_set(&self) -> bool {
        !self.raised.is_empty()
    }

    pub fn len(&self) -> usize {
        self.raised.iter().map(OnyxException::chain_len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.raised.is_empty()
    }

    /// Moves everything collected by `other` behind what this sink already holds.
    pub fn assimilate(&mut self, other: ExceptionSink) {
        self.raised.extend(other.raised);
    }

    /// Folds the collected exceptions into a single chain.
    pub fn take(&mut self) -> Option<OnyxException> {
        let mut drained = self.raised.drain(..);
        let mut head = drained.next()?;
        for e in drained {
            head.append(e);
        }
        Some(head)
    }

    pub fn into_result(mut self) -> Result<(), OnyxException> {
        match self.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn into_result_with<T>(self, value: T) -> Result<T, OnyxException> {
        self.into_result().map(|_| value)
    }

    /// Used on dereference paths that have no caller to report to.
    pub fn log_unhandled(mut self, context: &str) {
        if let Some(e) = self.take() {
            if crate::config::log_implicit_destructor_errors() {
                warn!("unhandled exception during {}: {}", context, e);
            }
        }
    }
}

/// Folds an operation outcome with the exceptions collected alongside it.
///
/// The outcome's own exception, if any, stays at the head of the chain.
pub fn merge_outcome<T>(
    outcome: Result<T, OnyxException>,
    mut sink: ExceptionSink,
) -> Result<T, OnyxException> {
    match outcome {
        Ok(value) => sink.into_result_with(value),
        Err(mut e) => {
            if let Some(rest) = sink.take() {
                e.append(rest);
            }
            Err(e)
        }
    }
}
