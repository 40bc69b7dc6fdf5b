//! Declared types of members, parameters and return values.

use std::fmt::Display;

use crate::types::{class::ClassId, value::OnyxValue};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeInfo {
    /// Untyped: accepts everything.
    Any,
    Int,
    Float,
    /// `int` or `float`.
    Number,
    Bool,
    String,
    Hash,
    List,
    Closure,
    /// Any object, or an instance of the named class or one of its subclasses.
    Object(Option<(ClassId, String)>),
    /// The inner type, or `Nothing`.
    OrNothing(Box<TypeInfo>),
}

impl TypeInfo {
    pub fn object_of(class: &crate::types::class::OnyxClass) -> Self {
        TypeInfo::Object(Some((class.id(), class.name().to_string())))
    }

    pub fn or_nothing(self) -> Self {
        match self {
            TypeInfo::Any | TypeInfo::OrNothing(_) => self,
            other => TypeInfo::OrNothing(Box::new(other)),
        }
    }

    /// How well `value` matches: `None` for a mismatch, higher is more specific.
    pub fn match_score(&self, value: &OnyxValue) -> Option<u8> {
        match (self, value) {
            (TypeInfo::Any, _) => Some(1),
            (TypeInfo::OrNothing(_), OnyxValue::Nothing) => Some(2),
            (TypeInfo::OrNothing(inner), v) => inner.match_score(v),
            (TypeInfo::Int, OnyxValue::Integer(_)) => Some(3),
            (TypeInfo::Float, OnyxValue::Float(_)) => Some(3),
            (TypeInfo::Number, OnyxValue::Integer(_) | OnyxValue::Float(_)) => Some(2),
            (TypeInfo::Bool, OnyxValue::Boolean(_)) => Some(3),
            (TypeInfo::String, OnyxValue::String(_)) => Some(3),
            (TypeInfo::Hash, OnyxValue::Hash(_)) => Some(3),
            (TypeInfo::List, OnyxValue::List(_)) => Some(3),
            (TypeInfo::Closure, OnyxValue::Closure(_)) => Some(3),
            (TypeInfo::Object(None), OnyxValue::Object(_)) => Some(2),
            (TypeInfo::Object(Some((id, _))), OnyxValue::Object(obj)) => {
                let class = obj.class();
                if class.id() == *id {
                    Some(4)
                } else if class.is_derived_from(*id) {
                    Some(3)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    #[inline(always)]
    pub fn accepts(&self, value: &OnyxValue) -> bool {
        self.match_score(value).is_some()
    }

    pub fn name(&self) -> String {
        match self {
            TypeInfo::Any => "any".to_string(),
            TypeInfo::Int => "int".to_string(),
            TypeInfo::Float => "float".to_string(),
            TypeInfo::Number => "number".to_string(),
            TypeInfo::Bool => "bool".to_string(),
            TypeInfo::String => "string".to_string(),
            TypeInfo::Hash => "hash".to_string(),
            TypeInfo::List => "list".to_string(),
            TypeInfo::Closure => "closure".to_string(),
            TypeInfo::Object(None) => "object".to_string(),
            TypeInfo::Object(Some((_, name))) => name.clone(),
            TypeInfo::OrNothing(inner) => format!("*{}", inner.name()),
        }
    }
}

impl Display for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
