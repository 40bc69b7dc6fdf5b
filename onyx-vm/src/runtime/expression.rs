//! 表达式求值与左值。
//!
//! 表达式总是产生一个由调用方拥有的值（引用已经计入），调用方用完后负责 `release()`。
//! 中间值在出错路径上同样会被释放，异常与释放产生的异常按顺序合并。
//!
//! # 主要功能
//! - 字面量、局部变量、`self`、隐式参数（`$1`）与隐式下标（`$#`）
//! - 算术、比较（宽松 / 严格）与短路逻辑运算
//! - 方法调用、静态方法调用、对象构造、闭包创建与调用
//! - 函数式运算：区间、`map`、`select`、`foldl`、`foldr`，都建立在函数式迭代器之上
//! - 左值：读取、赋值、删除、取出；对容器元素赋值时自动创建中间容器

use std::sync::Arc;

use crate::{
    exception::{merge_outcome, names, ExceptionSink, OnyxException},
    iterator::{self, FunctionalIterator, RangeSource},
    runtime::{
        call_value,
        frame::{release_all, Frame},
        function::UserFunction,
        scope::LocalId,
    },
    types::{
        class::OnyxClass, closure::OnyxClosure, hash::OnyxHash, list::OnyxList, object::ObjectRef,
        value::OnyxValue,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    /// Soft equality.
    Eq,
    Ne,
    /// Same type and value.
    AbsEq,
    AbsNe,
    And,
    Or,
}

pub enum Expression {
    Literal(OnyxValue),
    Local(LocalId),
    SelfRef,
    /// `$n`, counting from 1.
    ImplicitArg(usize),
    ImplicitIndex,
    ListLit(Vec<Expression>),
    HashLit(Vec<(String, Expression)>),
    Assign(LValue, Box<Expression>),
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
    Neg(Box<Expression>),
    MethodCall {
        object: Box<Expression>,
        method: String,
        args: Vec<Expression>,
    },
    SelfCall {
        method: String,
        args: Vec<Expression>,
    },
    StaticCall {
        class: Arc<OnyxClass>,
        method: String,
        args: Vec<Expression>,
    },
    Member {
        object: Box<Expression>,
        name: String,
    },
    SelfMember(String),
    Index {
        base: Box<Expression>,
        index: Box<Expression>,
    },
    New {
        class: Arc<OnyxClass>,
        args: Vec<Expression>,
    },
    Call {
        callee: Box<Expression>,
        args: Vec<Expression>,
    },
    /// `captures` pairs a slot of the enclosing frame with a slot of the closure's frame.
    Closure {
        func: Arc<UserFunction>,
        captures: Vec<(LocalId, LocalId)>,
    },
    /// Inclusive integer range; a list when evaluated, lazy when iterated.
    Range {
        start: Box<Expression>,
        stop: Box<Expression>,
        step: Option<Box<Expression>>,
    },
    /// `map expr, source [, filter]` with `$1` bound to each element.
    Map {
        expr: Box<Expression>,
        source: Box<Expression>,
        filter: Option<Box<Expression>>,
    },
    Select {
        source: Box<Expression>,
        condition: Box<Expression>,
    },
    /// `$1` is the accumulator, `$2` the next element.
    Foldl {
        expr: Box<Expression>,
        source: Box<Expression>,
    },
    Foldr {
        expr: Box<Expression>,
        source: Box<Expression>,
    },
    Copy(Box<Expression>),
    Remove(LValue),
}

fn lvalue_error(desc: impl Into<String>) -> OnyxException {
    OnyxException::new(names::LVALUE_ERROR, desc)
}

/// Releases `values` and folds their exceptions behind `e`.
fn fail_with<T>(e: OnyxException, values: Vec<OnyxValue>) -> Result<T, OnyxException> {
    let mut xsink = ExceptionSink::new();
    xsink.absorb(release_all(values));
    merge_outcome(Err(e), xsink)
}

/// Hands back `result` after releasing `value`.
fn release_after<T>(result: Result<T, OnyxException>, value: OnyxValue) -> Result<T, OnyxException> {
    let mut xsink = ExceptionSink::new();
    xsink.absorb(value.release());
    merge_outcome(result, xsink)
}

pub(crate) fn eval_args(args: &[Expression], frame: &mut Frame) -> Result<Vec<OnyxValue>, OnyxException> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        match arg.eval(frame) {
            Ok(value) => values.push(value),
            Err(e) => return fail_with(e, values),
        }
    }
    Ok(values)
}

impl Expression {
    pub fn literal(value: impl Into<OnyxValue>) -> Self {
        Expression::Literal(value.into())
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Expression::Binary(op, Box::new(left), Box::new(right))
    }

    pub fn assign(target: LValue, value: Expression) -> Self {
        Expression::Assign(target, Box::new(value))
    }

    pub fn method_call(object: Expression, method: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::MethodCall {
            object: Box::new(object),
            method: method.into(),
            args,
        }
    }

    pub fn self_call(method: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::SelfCall {
            method: method.into(),
            args,
        }
    }

    pub fn new_object(class: &Arc<OnyxClass>, args: Vec<Expression>) -> Self {
        Expression::New {
            class: class.clone(),
            args,
        }
    }

    pub fn range(start: Expression, stop: Expression, step: Option<Expression>) -> Self {
        Expression::Range {
            start: Box::new(start),
            stop: Box::new(stop),
            step: step.map(Box::new),
        }
    }

    pub fn eval(&self, frame: &mut Frame) -> Result<OnyxValue, OnyxException> {
        match self {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Local(id) => Ok(frame.local(*id)),
            Expression::SelfRef => Ok(frame
                .self_obj()
                .map(|object| OnyxValue::Object(object.clone()))
                .unwrap_or_default()),
            Expression::ImplicitArg(n) => Ok(frame.implicit_arg(*n)),
            Expression::ImplicitIndex => Ok(OnyxValue::Integer(frame.implicit_index())),
            Expression::ListLit(items) => Ok(OnyxValue::from(eval_args(items, frame)?)),
            Expression::HashLit(entries) => {
                let mut hash = OnyxHash::with_capacity(entries.len());
                for (key, expr) in entries {
                    match expr.eval(frame) {
                        Ok(value) => {
                            if let Err(e) = hash.set_key_value(key, value) {
                                return release_after(Err(e), OnyxValue::from(hash));
                            }
                        }
                        Err(e) => return release_after(Err(e), OnyxValue::from(hash)),
                    }
                }
                Ok(OnyxValue::from(hash))
            }
            Expression::Assign(target, expr) => {
                let value = expr.eval(frame)?;
                match target.assign(frame, value.clone()) {
                    Ok(()) => Ok(value),
                    Err(e) => fail_with(e, vec![value]),
                }
            }
            Expression::Binary(op, left, right) => self.eval_binary(*op, left, right, frame),
            Expression::Not(expr) => {
                let value = expr.eval(frame)?;
                let result = OnyxValue::Boolean(!value.to_bool());
                release_after(Ok(result), value)
            }
            Expression::Neg(expr) => {
                let value = expr.eval(frame)?;
                let result = match &value {
                    OnyxValue::Float(f) => OnyxValue::Float(-f),
                    other => OnyxValue::Integer(other.to_int().wrapping_neg()),
                };
                release_after(Ok(result), value)
            }
            Expression::MethodCall {
                object,
                method,
                args,
            } => {
                let target = object.eval(frame)?;
                let args = match eval_args(args, frame) {
                    Ok(args) => args,
                    Err(e) => return fail_with(e, vec![target]),
                };
                let result = match &target {
                    OnyxValue::Object(object) => object.call_method(method, args, frame.caller()),
                    other => {
                        let e = OnyxException::new(
                            names::METHOD_EVAL_ON_NON_OBJECT,
                            format!(
                                "cannot call {}() on a value of type {}",
                                method,
                                other.type_name()
                            ),
                        );
                        fail_with(e, args)
                    }
                };
                release_after(result, target)
            }
            Expression::SelfCall { method, args } => {
                let args = eval_args(args, frame)?;
                match frame.self_obj() {
                    Some(object) => object.call_method(method, args, frame.caller()),
                    None => fail_with(
                        OnyxException::new(
                            names::METHOD_EVAL_ON_NON_OBJECT,
                            format!("{}() called outside of an object context", method),
                        ),
                        args,
                    ),
                }
            }
            Expression::StaticCall {
                class,
                method,
                args,
            } => {
                let args = eval_args(args, frame)?;
                class.call_static(method, args, frame.caller())
            }
            Expression::Member { object, name } => {
                let target = object.eval(frame)?;
                let result = member_of(&target, name, frame.caller());
                release_after(result, target)
            }
            Expression::SelfMember(name) => match frame.self_obj() {
                Some(object) => object.get_member_value(name, frame.caller()),
                None => Err(lvalue_error(format!(
                    "member '{}' read outside of an object context",
                    name
                ))),
            },
            Expression::Index { base, index } => {
                let container = base.eval(frame)?;
                let key = match index.eval(frame) {
                    Ok(key) => key,
                    Err(e) => return fail_with(e, vec![container]),
                };
                let result = element_of(&container, &key, frame.caller());
                let mut xsink = ExceptionSink::new();
                xsink.absorb(key.release());
                xsink.absorb(container.release());
                merge_outcome(result, xsink)
            }
            Expression::New { class, args } => {
                let args = eval_args(args, frame)?;
                class.exec_constructor(args, frame.caller()).map(OnyxValue::Object)
            }
            Expression::Call { callee, args } => {
                let callee = callee.eval(frame)?;
                let args = match eval_args(args, frame) {
                    Ok(args) => args,
                    Err(e) => return fail_with(e, vec![callee]),
                };
                let result = call_value(&callee, args);
                release_after(result, callee)
            }
            Expression::Closure { func, captures } => {
                let captured = captures
                    .iter()
                    .map(|(outer, inner)| (*inner, frame.local(*outer)))
                    .collect();
                Ok(OnyxValue::Closure(Arc::new(OnyxClosure::Script {
                    func: func.clone(),
                    captured,
                    self_obj: frame.self_obj().cloned(),
                    class: frame.class().cloned(),
                })))
            }
            Expression::Range { .. } => {
                let iter = self.functional_iterator(frame, "range", false)?;
                iterator::collect_all(iter).map(OnyxValue::from)
            }
            Expression::Map {
                expr,
                source,
                filter,
            } => {
                let iter = source.functional_iterator(frame, "map", false)?;
                map_values(frame, iter, |frame| {
                    if let Some(filter) = filter {
                        if !truthy(filter, frame)? {
                            return Ok(None);
                        }
                    }
                    expr.eval(frame).map(Some)
                })
            }
            Expression::Select { source, condition } => {
                let iter = source.functional_iterator(frame, "select", false)?;
                map_values(frame, iter, |frame| {
                    if truthy(condition, frame)? {
                        Ok(Some(frame.implicit_arg(1)))
                    } else {
                        Ok(None)
                    }
                })
            }
            Expression::Foldl { expr, source } => {
                let iter = source.functional_iterator(frame, "foldl", false)?;
                fold_values(frame, iter, expr)
            }
            Expression::Foldr { expr, source } => {
                let iter = source.functional_iterator(frame, "foldr", true)?;
                fold_values(frame, iter, expr)
            }
            Expression::Copy(expr) => {
                let value = expr.eval(frame)?;
                let result = match &value {
                    OnyxValue::Object(object) => object
                        .call_method("copy", Vec::new(), frame.caller()),
                    OnyxValue::Hash(hash) => Ok(OnyxValue::from(hash.copy())),
                    OnyxValue::List(list) => Ok(OnyxValue::from(list.as_ref().clone())),
                    other => Ok(other.clone()),
                };
                release_after(result, value)
            }
            Expression::Remove(target) => target.take(frame),
        }
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
        frame: &mut Frame,
    ) -> Result<OnyxValue, OnyxException> {
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let first = truthy(left, frame)?;
            let decided = match op {
                BinaryOp::And => !first,
                _ => first,
            };
            if decided {
                return Ok(OnyxValue::Boolean(first));
            }
            return truthy(right, frame).map(OnyxValue::Boolean);
        }
        let a = left.eval(frame)?;
        let b = match right.eval(frame) {
            Ok(b) => b,
            Err(e) => return fail_with(e, vec![a]),
        };
        let result = binary_op(op, &a, &b);
        let mut xsink = ExceptionSink::new();
        xsink.absorb(b.release());
        xsink.absorb(a.release());
        merge_outcome(result, xsink)
    }

    /// The lazy source used when this expression feeds `foreach` or a
    /// functional operator. Ranges are never materialized here.
    pub(crate) fn functional_iterator(
        &self,
        frame: &mut Frame,
        op: &str,
        reverse: bool,
    ) -> Result<Box<dyn FunctionalIterator>, OnyxException> {
        match self {
            Expression::Range { start, stop, step } => {
                let start = int_operand(start, frame)?;
                let stop = int_operand(stop, frame)?;
                let step = match step {
                    Some(step) => int_operand(step, frame)?,
                    None => 1,
                };
                let range = RangeSource::new(start, stop, step)?;
                Ok(Box::new(if reverse { range.reversed() } else { range }))
            }
            other => {
                let value = other.eval(frame)?;
                iterator::for_value(value, op, frame.caller(), reverse)
            }
        }
    }
}

fn int_operand(expr: &Expression, frame: &mut Frame) -> Result<i64, OnyxException> {
    let value = expr.eval(frame)?;
    let int = value.to_int();
    value.release()?;
    Ok(int)
}

fn truthy(expr: &Expression, frame: &mut Frame) -> Result<bool, OnyxException> {
    let value = expr.eval(frame)?;
    let holds = value.to_bool();
    value.release()?;
    Ok(holds)
}

/// Runs `step` once per element with `$1` bound to it, collecting the
/// values it produces.
fn map_values<F>(
    frame: &mut Frame,
    mut iter: Box<dyn FunctionalIterator>,
    mut step: F,
) -> Result<OnyxValue, OnyxException>
where
    F: FnMut(&mut Frame) -> Result<Option<OnyxValue>, OnyxException>,
{
    frame.push_implicit(Vec::new());
    let mut out = Vec::new();
    let mut index = 0;
    let outcome = loop {
        let value = match iter.get_next() {
            Ok(Some(value)) => value,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };
        if let Err(e) = frame.set_implicit(vec![value], index) {
            break Err(e);
        }
        index += 1;
        match step(frame) {
            Ok(Some(value)) => out.push(value),
            Ok(None) => {}
            Err(e) => break Err(e),
        }
    };
    let mut xsink = ExceptionSink::new();
    xsink.absorb(frame.pop_implicit());
    xsink.absorb(iter.release());
    match merge_outcome(outcome, xsink) {
        Ok(()) => Ok(OnyxValue::from(out)),
        Err(e) => fail_with(e, out),
    }
}

fn fold_values(
    frame: &mut Frame,
    mut iter: Box<dyn FunctionalIterator>,
    expr: &Expression,
) -> Result<OnyxValue, OnyxException> {
    let mut acc = match iter.get_next() {
        Ok(Some(first)) => first,
        Ok(None) => return iter.release().map(|_| OnyxValue::Nothing),
        Err(e) => {
            let mut xsink = ExceptionSink::new();
            xsink.absorb(iter.release());
            return merge_outcome(Err(e), xsink);
        }
    };
    frame.push_implicit(Vec::new());
    let mut index = 1;
    let outcome = loop {
        let value = match iter.get_next() {
            Ok(Some(value)) => value,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };
        let previous = std::mem::take(&mut acc);
        if let Err(e) = frame.set_implicit(vec![previous, value], index) {
            break Err(e);
        }
        index += 1;
        match expr.eval(frame) {
            Ok(next) => acc = next,
            Err(e) => break Err(e),
        }
    };
    let mut xsink = ExceptionSink::new();
    xsink.absorb(frame.pop_implicit());
    xsink.absorb(iter.release());
    match merge_outcome(outcome, xsink) {
        Ok(()) => Ok(acc),
        Err(e) => fail_with(e, vec![acc]),
    }
}

fn member_of(
    target: &OnyxValue,
    name: &str,
    caller: Option<&OnyxClass>,
) -> Result<OnyxValue, OnyxException> {
    match target {
        OnyxValue::Object(object) => object.get_member_value(name, caller),
        OnyxValue::Hash(hash) => Ok(hash.find(name).cloned().unwrap_or_default()),
        _ => Ok(OnyxValue::Nothing),
    }
}

fn element_of(
    container: &OnyxValue,
    key: &OnyxValue,
    caller: Option<&OnyxClass>,
) -> Result<OnyxValue, OnyxException> {
    match container {
        OnyxValue::List(list) => Ok(list.retrieve(key.to_int()).cloned().unwrap_or_default()),
        OnyxValue::String(s) => {
            let index = key.to_int();
            let found = if index < 0 {
                s.chars().rev().nth((-(index + 1)) as usize)
            } else {
                s.chars().nth(index as usize)
            };
            Ok(found
                .map(|c| OnyxValue::from(c.to_string()))
                .unwrap_or_default())
        }
        other => member_of(other, &key.to_string_value(), caller),
    }
}

fn numeric(a: &OnyxValue, b: &OnyxValue) -> bool {
    matches!(a, OnyxValue::Float(_)) || matches!(b, OnyxValue::Float(_))
}

fn division_by_zero() -> OnyxException {
    OnyxException::new(names::DIVISION_BY_ZERO, "division by zero")
}

pub(crate) fn binary_op(op: BinaryOp, a: &OnyxValue, b: &OnyxValue) -> Result<OnyxValue, OnyxException> {
    use OnyxValue as V;
    let result = match op {
        BinaryOp::Add => match (a, b) {
            (V::Nothing, other) | (other, V::Nothing) => other.clone(),
            (V::String(_), _) | (_, V::String(_)) => {
                V::from(format!("{}{}", a.to_string_value(), b.to_string_value()))
            }
            (V::List(x), V::List(y)) => V::from(x.iter().chain(y.iter()).cloned().collect::<OnyxList>()),
            (V::List(x), other) => {
                let mut list = x.as_ref().clone();
                list.push(other.clone());
                V::from(list)
            }
            (V::Hash(x), V::Hash(y)) => {
                let mut hash = x.copy();
                hash.merge(y)?;
                V::from(hash)
            }
            _ if numeric(a, b) => V::Float(a.to_float() + b.to_float()),
            _ => V::Integer(a.to_int().wrapping_add(b.to_int())),
        },
        BinaryOp::Sub if numeric(a, b) => V::Float(a.to_float() - b.to_float()),
        BinaryOp::Sub => V::Integer(a.to_int().wrapping_sub(b.to_int())),
        BinaryOp::Mul if numeric(a, b) => V::Float(a.to_float() * b.to_float()),
        BinaryOp::Mul => V::Integer(a.to_int().wrapping_mul(b.to_int())),
        BinaryOp::Div if numeric(a, b) => {
            let divisor = b.to_float();
            if divisor == 0.0 {
                return Err(division_by_zero());
            }
            V::Float(a.to_float() / divisor)
        }
        BinaryOp::Div => match b.to_int() {
            0 => return Err(division_by_zero()),
            divisor => V::Integer(a.to_int().wrapping_div(divisor)),
        },
        BinaryOp::Mod => match b.to_int() {
            0 => return Err(division_by_zero()),
            divisor => V::Integer(a.to_int().wrapping_rem(divisor)),
        },
        BinaryOp::Lt => V::Boolean(a.soft_compare(b).is_lt()),
        BinaryOp::Le => V::Boolean(a.soft_compare(b).is_le()),
        BinaryOp::Gt => V::Boolean(a.soft_compare(b).is_gt()),
        BinaryOp::Ge => V::Boolean(a.soft_compare(b).is_ge()),
        BinaryOp::Eq => V::Boolean(a.soft_equals(b)),
        BinaryOp::Ne => V::Boolean(!a.soft_equals(b)),
        BinaryOp::AbsEq => V::Boolean(a.hard_equals(b)),
        BinaryOp::AbsNe => V::Boolean(!a.hard_equals(b)),
        BinaryOp::And => V::Boolean(a.to_bool() && b.to_bool()),
        BinaryOp::Or => V::Boolean(a.to_bool() || b.to_bool()),
    };
    Ok(result)
}

/// Something that can be assigned to.
pub enum LValue {
    Local(LocalId),
    SelfMember(String),
    Member {
        object: Box<Expression>,
        name: String,
    },
    Index {
        base: Box<LValue>,
        index: Box<Expression>,
    },
}

type SlotFn<'a> = dyn FnMut(&mut OnyxValue) -> Result<OnyxValue, OnyxException> + 'a;

impl LValue {
    pub fn index(base: LValue, index: Expression) -> Self {
        LValue::Index {
            base: Box::new(base),
            index: Box::new(index),
        }
    }

    pub fn get(&self, frame: &mut Frame) -> Result<OnyxValue, OnyxException> {
        match self {
            LValue::Local(id) => Ok(frame.local(*id)),
            LValue::SelfMember(name) => match frame.self_obj() {
                Some(object) => object.get_member_value(name, frame.caller()),
                None => Err(no_self(name)),
            },
            LValue::Member { object, name } => {
                let target = object.eval(frame)?;
                let result = member_of(&target, name, frame.caller());
                release_after(result, target)
            }
            LValue::Index { base, index } => {
                let container = base.get(frame)?;
                let key = match index.eval(frame) {
                    Ok(key) => key,
                    Err(e) => return fail_with(e, vec![container]),
                };
                let result = element_of(&container, &key, frame.caller());
                let mut xsink = ExceptionSink::new();
                xsink.absorb(key.release());
                xsink.absorb(container.release());
                merge_outcome(result, xsink)
            }
        }
    }

    /// Stores `value`, releasing what was there before.
    pub fn assign(&self, frame: &mut Frame, value: OnyxValue) -> Result<(), OnyxException> {
        match self {
            LValue::Local(id) => frame.replace_local(*id, value).release(),
            LValue::SelfMember(name) => match frame.self_obj() {
                Some(object) => object.set_value(name, value, frame.caller()),
                None => fail_with(no_self(name), vec![value]),
            },
            LValue::Member { object, name } => {
                let target = match object.eval(frame) {
                    Ok(target) => target,
                    Err(e) => return fail_with(e, vec![value]),
                };
                let result = match &target {
                    OnyxValue::Object(object) => object.set_value(name, value, frame.caller()),
                    other => fail_with(
                        lvalue_error(format!(
                            "cannot assign member '{}' of a temporary {}",
                            name,
                            other.type_name()
                        )),
                        vec![value],
                    ),
                };
                release_after(result, target)
            }
            LValue::Index { .. } => {
                let mut pending = Some(value);
                let result = self.modify(frame, &mut |slot| {
                    Ok(std::mem::replace(slot, pending.take().unwrap_or_default()))
                });
                let mut xsink = ExceptionSink::new();
                if let Some(unused) = pending {
                    xsink.absorb(unused.release());
                }
                match merge_outcome(result, xsink) {
                    Ok(old) => old.release(),
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Removes the value and hands it to the caller. Hash keys and object
    /// members disappear; list slots are left empty.
    pub fn take(&self, frame: &mut Frame) -> Result<OnyxValue, OnyxException> {
        match self {
            LValue::Local(id) => Ok(frame.take_local(*id)),
            LValue::SelfMember(name) => match frame.self_obj() {
                Some(object) => object.take_member(name, frame.caller()),
                None => Err(no_self(name)),
            },
            LValue::Member { object, name } => {
                let target = object.eval(frame)?;
                let result = match &target {
                    OnyxValue::Object(object) => object.take_member(name, frame.caller()),
                    _ => Ok(OnyxValue::Nothing),
                };
                release_after(result, target)
            }
            LValue::Index { base, index } => {
                let key = index.eval(frame)?;
                let caller = frame.class().cloned();
                let result = base.modify(frame, &mut |container| match container {
                    OnyxValue::Hash(hash) => Ok(Arc::make_mut(hash)
                        .take_key_value(&key.to_string_value())
                        .unwrap_or_default()),
                    OnyxValue::List(list) => {
                        let index = key.to_int();
                        Ok(usize::try_from(index)
                            .ok()
                            .and_then(|i| Arc::make_mut(list).get_mut(i))
                            .map(std::mem::take)
                            .unwrap_or_default())
                    }
                    OnyxValue::Object(object) => {
                        object.take_member(&key.to_string_value(), caller.as_deref())
                    }
                    _ => Ok(OnyxValue::Nothing),
                });
                release_after(result, key)
            }
        }
    }

    /// Removes the value; an object is explicitly deleted.
    pub fn delete(&self, frame: &mut Frame) -> Result<(), OnyxException> {
        self.take(frame)?.delete()
    }

    /// Applies `f` to the storage slot, creating intermediate containers as
    /// needed. `f` returns the displaced value, which the caller releases.
    fn modify(&self, frame: &mut Frame, f: &mut SlotFn<'_>) -> Result<OnyxValue, OnyxException> {
        match self {
            LValue::Local(id) => f(frame.local_mut(*id)),
            LValue::SelfMember(name) => {
                let Some(object) = frame.self_obj().cloned() else {
                    return Err(no_self(name));
                };
                let result = modify_member(&object, name, frame.caller(), f);
                let mut xsink = ExceptionSink::new();
                xsink.absorb(object.release());
                merge_outcome(result, xsink)
            }
            LValue::Member { object, name } => {
                let target = object.eval(frame)?;
                let result = match &target {
                    OnyxValue::Object(object) => modify_member(object, name, frame.caller(), f),
                    other => Err(lvalue_error(format!(
                        "cannot modify member '{}' of a temporary {}",
                        name,
                        other.type_name()
                    ))),
                };
                release_after(result, target)
            }
            LValue::Index { base, index } => {
                let key = index.eval(frame)?;
                let caller = frame.class().cloned();
                let result = base.modify(frame, &mut |container| {
                    modify_element(container, &key, caller.as_deref(), f)
                });
                release_after(result, key)
            }
        }
    }
}

fn no_self(name: &str) -> OnyxException {
    lvalue_error(format!("member '{}' used outside of an object context", name))
}

fn modify_member(
    object: &ObjectRef,
    name: &str,
    caller: Option<&OnyxClass>,
    f: &mut SlotFn<'_>,
) -> Result<OnyxValue, OnyxException> {
    let mut current = object.take_member(name, caller)?;
    let result = f(&mut current);
    let stored = object.set_value(name, current, caller);
    let mut xsink = ExceptionSink::new();
    xsink.absorb(stored);
    merge_outcome(result, xsink)
}

fn modify_element(
    container: &mut OnyxValue,
    key: &OnyxValue,
    caller: Option<&OnyxClass>,
    f: &mut SlotFn<'_>,
) -> Result<OnyxValue, OnyxException> {
    if container.is_nothing() {
        *container = match key {
            OnyxValue::Integer(_) => OnyxValue::from(OnyxList::new()),
            _ => OnyxValue::from(OnyxHash::new()),
        };
    }
    match container {
        OnyxValue::List(list) => match usize::try_from(key.to_int()) {
            Ok(index) => f(Arc::make_mut(list).get_or_create(index)),
            Err(_) => Err(lvalue_error(format!(
                "list index {} is out of range for assignment",
                key.to_int()
            ))),
        },
        OnyxValue::Hash(hash) => f(Arc::make_mut(hash).get_or_create(&key.to_string_value())),
        OnyxValue::Object(object) => modify_member(object, &key.to_string_value(), caller, f),
        other => Err(lvalue_error(format!(
            "cannot assign an element of a {}",
            other.type_name()
        ))),
    }
}
