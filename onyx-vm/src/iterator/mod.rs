//! 函数式迭代接口。
//!
//! `foreach`、`map`、`select` 与折叠运算都通过同一个"取下一个值"的接口消费数据源。
//! 数据源按值的形态选择：
//! - 列表 → [`ListSource`]（正向或反向）
//! - `Nothing` → [`NothingSource`]（循环体一次也不执行）
//! - 实现了迭代器能力（`next()` + `getValue()`）的对象 → [`ObjectIteratorSource`]
//! - 区间表达式 → [`RangeSource`]（惰性生成整数，不物化列表）
//! - 其他任何值 → [`SingleValueSource`]（视为单元素列表）
//!
//! 消费方不再调用 `get_next()` 即视为取消；之后调用 `release()` 归还源持有的值。

mod list;
mod nothing;
mod object;
mod range;
mod single;

pub use list::ListSource;
pub use nothing::NothingSource;
pub use object::ObjectIteratorSource;
pub use range::RangeSource;
pub use single::SingleValueSource;

use crate::{
    exception::OnyxException,
    types::{class::OnyxClass, value::OnyxValue},
};

/// A lazy sequence of values. Every produced value is owned by the caller.
pub trait FunctionalIterator: Send {
    /// The next value, or `None` once the source is exhausted.
    fn get_next(&mut self) -> Result<Option<OnyxValue>, OnyxException>;

    /// Gives back whatever the source still holds.
    fn release(self: Box<Self>) -> Result<(), OnyxException> {
        Ok(())
    }
}

/// Picks the source for `value`. `op` names the consuming operation in
/// iterator errors (`FOREACH`, `MAP`, ...); `caller` is the class of the
/// running code, used for access checks on iterator objects.
pub fn for_value(
    value: OnyxValue,
    op: &str,
    caller: Option<&OnyxClass>,
    reverse: bool,
) -> Result<Box<dyn FunctionalIterator>, OnyxException> {
    match value {
        OnyxValue::Nothing => Ok(Box::new(NothingSource)),
        OnyxValue::List(list) => Ok(Box::new(ListSource::new(list, reverse))),
        OnyxValue::Object(object) if ObjectIteratorSource::is_iterator(&object) => {
            Ok(Box::new(ObjectIteratorSource::new(object, op, caller, reverse)?))
        }
        other => Ok(Box::new(SingleValueSource::new(other))),
    }
}

/// Drains `iter` into a vector, releasing the source afterwards.
pub fn collect_all(mut iter: Box<dyn FunctionalIterator>) -> Result<Vec<OnyxValue>, OnyxException> {
    let mut values = Vec::new();
    let outcome = loop {
        match iter.get_next() {
            Ok(Some(value)) => values.push(value),
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };
    let mut xsink = crate::exception::ExceptionSink::new();
    xsink.absorb(iter.release());
    if outcome.is_err() || xsink.is_set() {
        for value in values {
            xsink.absorb(value.release());
        }
        return crate::exception::merge_outcome(outcome.map(|_| Vec::new()), xsink);
    }
    Ok(values)
}
