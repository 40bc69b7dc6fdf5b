//! Onyx 动态值类型。
//!
//! `OnyxValue` 是运行时中所有值的统一表示：标量按值复制，容器（Hash / List）
//! 以 `Arc` 共享并在写入时按需分离（copy-on-write），对象以计数引用
//! [`ObjectRef`] 持有。
//!
//! # 主要功能
//! - 类型查询与类型名
//! - 宽松（soft）与严格（hard）比较
//! - 标量转换：整数、浮点、布尔、字符串
//! - 显式释放 [`OnyxValue::release`]：释放引用并向调用方报告析构异常

use std::{
    cmp::Ordering,
    fmt::{Debug, Display},
    sync::Arc,
};

use crate::{
    collector::{trace_arc, TraceEdge, Traceable},
    exception::{ExceptionSink, OnyxException},
    types::{
        closure::OnyxClosure,
        hash::OnyxHash,
        list::OnyxList,
        object::ObjectRef,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Nothing,
    Null,
    Boolean,
    Integer,
    Float,
    String,
    Hash,
    List,
    Object,
    Closure,
}

impl ValueType {
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Nothing => "nothing",
            ValueType::Null => "null",
            ValueType::Boolean => "bool",
            ValueType::Integer => "int",
            ValueType::Float => "float",
            ValueType::String => "string",
            ValueType::Hash => "hash",
            ValueType::List => "list",
            ValueType::Object => "object",
            ValueType::Closure => "closure",
        }
    }

    /// Ordering used when two values of unrelated types are compared.
    fn rank(&self) -> u8 {
        match self {
            ValueType::Nothing => 0,
            ValueType::Null => 1,
            ValueType::Boolean => 2,
            ValueType::Integer => 3,
            ValueType::Float => 4,
            ValueType::String => 5,
            ValueType::List => 6,
            ValueType::Hash => 7,
            ValueType::Object => 8,
            ValueType::Closure => 9,
        }
    }
}

#[derive(Clone, Default)]
pub enum OnyxValue {
    /// Absence of a value.
    #[default]
    Nothing,
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(Arc<str>),
    Hash(Arc<OnyxHash>),
    List(Arc<OnyxList>),
    Object(ObjectRef),
    Closure(Arc<OnyxClosure>),
}

impl OnyxValue {
    #[inline(always)]
    pub fn type_of(&self) -> ValueType {
        match self {
            OnyxValue::Nothing => ValueType::Nothing,
            OnyxValue::Null => ValueType::Null,
            OnyxValue::Boolean(_) => ValueType::Boolean,
            OnyxValue::Integer(_) => ValueType::Integer,
            OnyxValue::Float(_) => ValueType::Float,
            OnyxValue::String(_) => ValueType::String,
            OnyxValue::Hash(_) => ValueType::Hash,
            OnyxValue::List(_) => ValueType::List,
            OnyxValue::Object(_) => ValueType::Object,
            OnyxValue::Closure(_) => ValueType::Closure,
        }
    }

    #[inline(always)]
    pub fn type_name(&self) -> &'static str {
        self.type_of().name()
    }

    #[inline(always)]
    pub fn is_nothing(&self) -> bool {
        matches!(self, OnyxValue::Nothing)
    }

    /// Anything but `Nothing`; `Null` counts as a value.
    #[inline(always)]
    pub fn exists(&self) -> bool {
        !self.is_nothing()
    }

    fn is_numeric(&self) -> bool {
        matches!(
            self,
            OnyxValue::Boolean(_) | OnyxValue::Integer(_) | OnyxValue::Float(_)
        )
    }

    fn is_scalar(&self) -> bool {
        self.is_numeric() || matches!(self, OnyxValue::String(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OnyxValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<&Arc<OnyxHash>> {
        match self {
            OnyxValue::Hash(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Arc<OnyxList>> {
        match self {
            OnyxValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            OnyxValue::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn to_int(&self) -> i64 {
        match self {
            OnyxValue::Boolean(b) => *b as i64,
            OnyxValue::Integer(i) => *i,
            OnyxValue::Float(f) => *f as i64,
            OnyxValue::String(s) => parse_int_prefix(s),
            _ => 0,
        }
    }

    pub fn to_float(&self) -> f64 {
        match self {
            OnyxValue::Boolean(b) => *b as i64 as f64,
            OnyxValue::Integer(i) => *i as f64,
            OnyxValue::Float(f) => *f,
            OnyxValue::String(s) => parse_float_prefix(s),
            _ => 0.0,
        }
    }

    pub fn to_bool(&self) -> bool {
        match self {
            OnyxValue::Nothing | OnyxValue::Null => false,
            OnyxValue::Boolean(b) => *b,
            OnyxValue::Integer(i) => *i != 0,
            OnyxValue::Float(f) => *f != 0.0,
            OnyxValue::String(s) => {
                let s = s.trim();
                !s.is_empty() && parse_float_prefix(s) != 0.0
            }
            OnyxValue::Hash(h) => !h.is_empty(),
            OnyxValue::List(l) => !l.is_empty(),
            OnyxValue::Object(_) | OnyxValue::Closure(_) => true,
        }
    }

    /// String conversion; containers and references convert to an empty string.
    pub fn to_string_value(&self) -> String {
        match self {
            OnyxValue::Boolean(b) => (*b as i64).to_string(),
            OnyxValue::Integer(i) => i.to_string(),
            OnyxValue::Float(f) => format_float(*f),
            OnyxValue::String(s) => s.to_string(),
            _ => String::new(),
        }
    }

    /// Soft comparison: numeric values and numeric-looking strings compare by
    /// value across types, strings compare lexicographically.
    pub fn soft_compare(&self, other: &OnyxValue) -> Ordering {
        use OnyxValue::*;
        match (self, other) {
            (Nothing | Null, Nothing | Null) => Ordering::Equal,
            (String(a), String(b)) => a.as_ref().cmp(b.as_ref()),
            (Float(_), _) | (_, Float(_)) if self.is_scalar() && other.is_scalar() => self
                .to_float()
                .partial_cmp(&other.to_float())
                .unwrap_or(Ordering::Equal),
            _ if self.is_scalar() && other.is_scalar() => self.to_int().cmp(&other.to_int()),
            (List(a), List(b)) => a.len().cmp(&b.len()),
            (Hash(a), Hash(b)) => a.len().cmp(&b.len()),
            _ => self.type_of().rank().cmp(&other.type_of().rank()),
        }
    }

    pub fn soft_equals(&self, other: &OnyxValue) -> bool {
        use OnyxValue::*;
        match (self, other) {
            (Hash(a), Hash(b)) => a.compare_soft(b),
            (List(a), List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.soft_equals(y))
            }
            (Object(a), Object(b)) => a.ptr_eq(b),
            (Closure(a), Closure(b)) => Arc::ptr_eq(a, b),
            (Nothing | Null, Nothing | Null) => true,
            _ if self.is_scalar() && other.is_scalar() => {
                self.soft_compare(other) == Ordering::Equal
            }
            _ => false,
        }
    }

    /// Hard equality: same type and same value, no conversion.
    pub fn hard_equals(&self, other: &OnyxValue) -> bool {
        use OnyxValue::*;
        match (self, other) {
            (Nothing, Nothing) | (Null, Null) => true,
            (Boolean(a), Boolean(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Hash(a), Hash(b)) => Arc::ptr_eq(a, b) || a.compare_hard(b),
            (List(a), List(b)) => {
                Arc::ptr_eq(a, b)
                    || (a.len() == b.len()
                        && a.iter().zip(b.iter()).all(|(x, y)| x.hard_equals(y)))
            }
            (Object(a), Object(b)) => a.ptr_eq(b),
            (Closure(a), Closure(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Whether this value can hold an object reference, directly or nested.
    pub fn may_reference_objects(&self) -> bool {
        match self {
            OnyxValue::Object(_) | OnyxValue::Closure(_) => true,
            OnyxValue::Hash(h) => h.values().any(OnyxValue::may_reference_objects),
            OnyxValue::List(l) => l.iter().any(OnyxValue::may_reference_objects),
            _ => false,
        }
    }

    /// Gives up this reference.
    ///
    /// Unlike an implicit drop, exceptions raised by destructors that run as a
    /// consequence are returned to the caller.
    pub fn release(self) -> Result<(), OnyxException> {
        match self {
            OnyxValue::Object(obj) => obj.release(),
            OnyxValue::Hash(hash) => match Arc::try_unwrap(hash) {
                Ok(hash) => hash.release(),
                Err(_) => Ok(()),
            },
            OnyxValue::List(list) => match Arc::try_unwrap(list) {
                Ok(list) => list.release(),
                Err(_) => Ok(()),
            },
            OnyxValue::Closure(closure) => match Arc::try_unwrap(closure) {
                Ok(closure) => closure.release(),
                Err(_) => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// Like [`OnyxValue::release`], but objects are explicitly deleted first.
    pub fn delete(self) -> Result<(), OnyxException> {
        match self {
            OnyxValue::Object(obj) => {
                let mut xsink = ExceptionSink::new();
                xsink.absorb(obj.delete());
                xsink.absorb(obj.release());
                xsink.into_result()
            }
            other => other.release(),
        }
    }

    /// Quoted single-line representation used in diagnostics.
    pub fn repr(&self) -> String {
        match self {
            OnyxValue::Nothing => "NOTHING".to_string(),
            OnyxValue::Null => "NULL".to_string(),
            OnyxValue::Boolean(b) => b.to_string(),
            OnyxValue::String(s) => format!("{:?}", s.as_ref()),
            OnyxValue::Hash(h) => {
                let entries: Vec<String> = h
                    .iter()
                    .map(|(k, v)| format!("{:?}: {}", k, v.repr()))
                    .collect();
                format!("{{{}}}", entries.join(", "))
            }
            OnyxValue::List(l) => {
                let items: Vec<String> = l.iter().map(OnyxValue::repr).collect();
                format!("[{}]", items.join(", "))
            }
            OnyxValue::Object(o) => format!("<object {} #{}>", o.class().name(), o.id()),
            OnyxValue::Closure(_) => "<closure>".to_string(),
            _ => self.to_string_value(),
        }
    }
}

impl Traceable for OnyxValue {
    fn collect(&self, edges: &mut Vec<TraceEdge>) {
        match self {
            OnyxValue::Object(o) => edges.push(TraceEdge::Object(o.handle())),
            OnyxValue::Hash(h) => trace_arc(h, edges),
            OnyxValue::List(l) => trace_arc(l, edges),
            OnyxValue::Closure(c) => trace_arc(c, edges),
            _ => {}
        }
    }
}

impl Display for OnyxValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OnyxValue::String(s) => write!(f, "{}", s),
            OnyxValue::Integer(_) | OnyxValue::Float(_) => {
                write!(f, "{}", self.to_string_value())
            }
            _ => write!(f, "{}", self.repr()),
        }
    }
}

impl Debug for OnyxValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.repr())
    }
}

impl From<bool> for OnyxValue {
    fn from(value: bool) -> Self {
        OnyxValue::Boolean(value)
    }
}

impl From<i64> for OnyxValue {
    fn from(value: i64) -> Self {
        OnyxValue::Integer(value)
    }
}

impl From<i32> for OnyxValue {
    fn from(value: i32) -> Self {
        OnyxValue::Integer(value as i64)
    }
}

impl From<f64> for OnyxValue {
    fn from(value: f64) -> Self {
        OnyxValue::Float(value)
    }
}

impl From<&str> for OnyxValue {
    fn from(value: &str) -> Self {
        OnyxValue::String(Arc::from(value))
    }
}

impl From<String> for OnyxValue {
    fn from(value: String) -> Self {
        OnyxValue::String(Arc::from(value))
    }
}

impl From<OnyxHash> for OnyxValue {
    fn from(value: OnyxHash) -> Self {
        OnyxValue::Hash(Arc::new(value))
    }
}

impl From<OnyxList> for OnyxValue {
    fn from(value: OnyxList) -> Self {
        OnyxValue::List(Arc::new(value))
    }
}

impl From<ObjectRef> for OnyxValue {
    fn from(value: ObjectRef) -> Self {
        OnyxValue::Object(value)
    }
}

impl From<Vec<OnyxValue>> for OnyxValue {
    fn from(value: Vec<OnyxValue>) -> Self {
        OnyxValue::List(Arc::new(OnyxList::from(value)))
    }
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

/// Length of the leading `[+-]digits` run after whitespace.
fn int_prefix_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let digits = bytes[end..].iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        0
    } else {
        end + digits
    }
}

pub(crate) fn parse_int_prefix(s: &str) -> i64 {
    let s = s.trim_start();
    let len = int_prefix_len(s);
    if len == 0 {
        return 0;
    }
    s[..len].parse::<i64>().unwrap_or_else(|_| {
        // out of range: saturate in the direction of the sign
        if s.starts_with('-') {
            i64::MIN
        } else {
            i64::MAX
        }
    })
}

pub(crate) fn parse_float_prefix(s: &str) -> f64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = int_prefix_len(s);
    let mut mantissa = end > 0;
    if end == 0 && matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    if bytes.get(end) == Some(&b'.') {
        let frac = bytes[end + 1..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if frac > 0 || mantissa {
            end += 1 + frac;
            mantissa = true;
        }
    }
    if !mantissa {
        return 0.0;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let exp = int_prefix_len(&s[end + 1..]);
        if exp > 0 {
            end += 1 + exp;
        }
    }
    s[..end].parse::<f64>().unwrap_or(0.0)
}
