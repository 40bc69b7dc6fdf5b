//! Onyx 语句树执行。
//!
//! 前端把源代码解析成语句树（[`statement::Statement`]）与表达式树
//! （[`expression::Expression`]），运行时直接遍历执行。局部变量在解析期分配槽位
//! （[`scope`]），执行期存放在栈帧（[`frame::Frame`]）中。
//!
//! # 主要功能
//! - 语句块、条件与循环、`foreach`（按值 / 按引用）、`on block exit` 处理器
//! - `try` / `catch`、`throw`、`rethrow`
//! - 用户函数、闭包与方法体的调用

pub mod expression;
pub mod frame;
pub mod function;
pub mod scope;
pub mod statement;

#[cfg(test)]
mod runtime_test;

use std::sync::Arc;

use crate::{
    exception::{merge_outcome, names, ExceptionSink, OnyxException},
    runtime::{expression::Expression, frame::{release_all, Frame}},
    types::{class::OnyxClass, object::ObjectRef, value::OnyxValue},
};

/// Calls a closure value. Anything else raises `CALL-ERROR`.
pub fn call_value(callable: &OnyxValue, args: Vec<OnyxValue>) -> Result<OnyxValue, OnyxException> {
    match callable {
        OnyxValue::Closure(closure) => closure.call(args),
        other => {
            let e = OnyxException::new(
                names::CALL_ERROR,
                format!("a value of type {} cannot be called", other.type_name()),
            );
            let mut xsink = ExceptionSink::new();
            xsink.absorb(release_all(args));
            merge_outcome(Err(e), xsink)
        }
    }
}

/// Evaluates `expr` with `self` bound to `object` inside `class`. Used for
/// member initializers.
pub(crate) fn eval_in_object(
    expr: &Expression,
    object: &ObjectRef,
    class: &Arc<OnyxClass>,
) -> Result<OnyxValue, OnyxException> {
    let mut frame = Frame::new(0, Some(object.clone()), Some(class.clone()));
    let outcome = expr.eval(&mut frame);
    let mut xsink = ExceptionSink::new();
    xsink.absorb(frame.release());
    merge_outcome(outcome, xsink)
}
