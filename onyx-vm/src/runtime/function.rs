//! 用户函数：参数声明、函数体与调用。

use std::{fmt::Debug, sync::Arc};

use log::trace;

use crate::{
    exception::{merge_outcome, names, ExceptionSink, OnyxException},
    runtime::{
        expression::Expression,
        frame::Frame,
        scope::{LocalId, ParseScope},
        statement::{Flow, StatementBlock},
    },
    types::{class::OnyxClass, object::ObjectRef, typeinfo::TypeInfo, value::OnyxValue},
    utils::format_args_summary,
};

pub struct Param {
    name: String,
    local: LocalId,
    type_info: TypeInfo,
    default: Option<Arc<Expression>>,
}

impl Param {
    pub fn new(name: impl Into<String>, local: LocalId, type_info: TypeInfo) -> Self {
        Param {
            name: name.into(),
            local,
            type_info,
            default: None,
        }
    }

    /// Evaluated in the callee's frame when the argument is missing.
    pub fn with_default(mut self, default: Expression) -> Self {
        self.default = Some(Arc::new(default));
        self
    }

    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline(always)]
    pub fn local(&self) -> LocalId {
        self.local
    }

    #[inline(always)]
    pub fn type_info(&self) -> &TypeInfo {
        &self.type_info
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

pub struct UserFunction {
    name: String,
    params: Vec<Param>,
    body: StatementBlock,
    frame_size: usize,
    return_type: TypeInfo,
}

impl UserFunction {
    /// `scope` is the scope the parameters and body were declared in.
    pub fn new(
        name: impl Into<String>,
        params: Vec<Param>,
        body: StatementBlock,
        scope: &ParseScope,
    ) -> Self {
        UserFunction {
            name: name.into(),
            params,
            body,
            frame_size: scope.frame_size(),
            return_type: TypeInfo::Any,
        }
    }

    pub fn with_return_type(mut self, return_type: TypeInfo) -> Self {
        self.return_type = return_type;
        self
    }

    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline(always)]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn body(&self) -> &StatementBlock {
        &self.body
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn bind_params(&self, frame: &mut Frame, args: Vec<OnyxValue>) -> Result<(), OnyxException> {
        let mut args = args.into_iter();
        let mut xsink = ExceptionSink::new();
        for param in &self.params {
            let value = match (args.next(), &param.default) {
                (Some(value), _) => value,
                (None, Some(default)) => default.eval(frame)?,
                (None, None) => OnyxValue::Nothing,
            };
            let mismatch = !param.type_info.accepts(&value);
            let message = if mismatch {
                Some(format!(
                    "parameter '{}' of {}() expects {}, got {}",
                    param.name,
                    self.name,
                    param.type_info,
                    value.type_name()
                ))
            } else {
                None
            };
            xsink.absorb(frame.replace_local(param.local, value).release());
            if let Some(message) = message {
                xsink.raise(OnyxException::new(names::RUNTIME_TYPE_ERROR, message));
                break;
            }
        }
        // surplus arguments stay reachable through implicit arguments only
        for extra in args {
            xsink.absorb(extra.release());
        }
        xsink.into_result()
    }

    fn check_return(&self, value: OnyxValue) -> Result<OnyxValue, OnyxException> {
        if self.return_type.accepts(&value) {
            return Ok(value);
        }
        let e = OnyxException::new(
            names::RUNTIME_TYPE_ERROR,
            format!(
                "{}() must return {}, returned {}",
                self.name,
                self.return_type,
                value.type_name()
            ),
        );
        let mut xsink = ExceptionSink::new();
        xsink.absorb(value.release());
        merge_outcome(Err(e), xsink)
    }
}

impl Debug for UserFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let params: Vec<&str> = self.params.iter().map(Param::name).collect();
        write!(f, "<function {}({})>", self.name, params.join(", "))
    }
}

/// Calls a user function. `self_obj` and `class` bind `self` and the class
/// context for method bodies.
pub fn call_function(
    func: &Arc<UserFunction>,
    self_obj: Option<ObjectRef>,
    class: Option<Arc<OnyxClass>>,
    args: Vec<OnyxValue>,
) -> Result<OnyxValue, OnyxException> {
    call_function_with_captures(func, self_obj, class, &[], args)
}

pub(crate) fn call_function_with_captures(
    func: &Arc<UserFunction>,
    self_obj: Option<ObjectRef>,
    class: Option<Arc<OnyxClass>>,
    captured: &[(LocalId, OnyxValue)],
    args: Vec<OnyxValue>,
) -> Result<OnyxValue, OnyxException> {
    trace!("calling {}({})", func.name, format_args_summary(&args));
    let mut frame = Frame::new(func.frame_size, self_obj, class);
    let mut xsink = ExceptionSink::new();
    for (id, value) in captured {
        xsink.absorb(frame.replace_local(*id, value.clone()).release());
    }
    frame.push_implicit(args.clone());
    let outcome = func
        .bind_params(&mut frame, args)
        .and_then(|_| func.body.exec(&mut frame))
        .and_then(|flow| match flow {
            Flow::Return(value) => func.check_return(value),
            Flow::Normal | Flow::Break | Flow::Continue => func.check_return(OnyxValue::Nothing),
        });
    xsink.absorb(frame.release());
    merge_outcome(outcome, xsink)
}
