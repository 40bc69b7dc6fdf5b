//! 可调用值：脚本闭包与原生函数。
//!
//! 脚本闭包在创建时按值捕获外层局部变量，并记住创建它的 `self` 对象与类上下文，
//! 因此在方法里创建的闭包可以继续访问该类的私有成员。

use std::{fmt::Debug, sync::Arc};

use crate::{
    collector::{TraceEdge, Traceable},
    exception::{ExceptionSink, OnyxException},
    runtime::{
        function::{call_function_with_captures, UserFunction},
        scope::LocalId,
    },
    types::{
        class::OnyxClass,
        object::ObjectRef,
        value::OnyxValue,
    },
};

pub type NativeFunctionFn = dyn Fn(&[OnyxValue]) -> Result<OnyxValue, OnyxException> + Send + Sync;

pub enum OnyxClosure {
    Script {
        func: Arc<UserFunction>,
        captured: Vec<(LocalId, OnyxValue)>,
        self_obj: Option<ObjectRef>,
        class: Option<Arc<OnyxClass>>,
    },
    Native {
        name: String,
        func: Arc<NativeFunctionFn>,
    },
}

impl OnyxClosure {
    pub fn native<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[OnyxValue]) -> Result<OnyxValue, OnyxException> + Send + Sync + 'static,
    {
        OnyxClosure::Native {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            OnyxClosure::Script { func, .. } => func.name(),
            OnyxClosure::Native { name, .. } => name,
        }
    }

    /// Calls the closure; arguments are consumed.
    pub fn call(&self, args: Vec<OnyxValue>) -> Result<OnyxValue, OnyxException> {
        match self {
            OnyxClosure::Script {
                func,
                captured,
                self_obj,
                class,
            } => call_function_with_captures(func, self_obj.clone(), class.clone(), captured, args),
            OnyxClosure::Native { func, .. } => {
                let outcome = func(&args);
                let mut xsink = ExceptionSink::new();
                for arg in args {
                    xsink.absorb(arg.release());
                }
                crate::exception::merge_outcome(outcome, xsink)
            }
        }
    }

    pub fn release(self) -> Result<(), OnyxException> {
        match self {
            OnyxClosure::Script {
                captured, self_obj, ..
            } => {
                let mut xsink = ExceptionSink::new();
                for (_, value) in captured.into_iter().rev() {
                    xsink.absorb(value.release());
                }
                if let Some(object) = self_obj {
                    xsink.absorb(object.release());
                }
                xsink.into_result()
            }
            OnyxClosure::Native { .. } => Ok(()),
        }
    }
}

impl Traceable for OnyxClosure {
    fn collect(&self, edges: &mut Vec<TraceEdge>) {
        if let OnyxClosure::Script {
            captured, self_obj, ..
        } = self
        {
            if let Some(object) = self_obj {
                edges.push(TraceEdge::Object(object.handle()));
            }
            for (_, value) in captured {
                value.collect(edges);
            }
        }
    }
}

impl Debug for OnyxClosure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OnyxClosure::Script { func, captured, .. } => write!(
                f,
                "<closure {} captured={}>",
                func.name(),
                captured.len()
            ),
            OnyxClosure::Native { name, .. } => write!(f, "<native {}>", name),
        }
    }
}
