//! 方法、重载变体与方法调用。
//!
//! 一个 [`Method`] 拥有一个或多个变体（按参数类型重载），变体的实现可以是原生闭包，
//! 也可以是脚本函数。调用时按实参为每个变体打分，选出最匹配的一个。
//!
//! 对象上的方法调用（[`ObjectRef::call_method`]）负责：方法查找、可见性检查、
//! 方法网关回退，以及在调用期间持有"真实引用"。

use std::sync::Arc;

use log::trace;

use crate::{
    exception::{merge_outcome, names, ExceptionSink, OnyxException},
    runtime::function::{call_function, UserFunction},
    types::{
        class::{has_private_access, Access, FoundMethod, OnyxClass},
        list::OnyxList,
        object::{ObjectHandle, ObjectRef, PrivateData},
        typeinfo::TypeInfo,
        value::OnyxValue,
    },
};

pub type NativeMethodFn = dyn Fn(&ObjectRef, Option<&Arc<dyn PrivateData>>, &[OnyxValue]) -> Result<OnyxValue, OnyxException>
    + Send
    + Sync;
pub type NativeStaticFn = dyn Fn(&[OnyxValue]) -> Result<OnyxValue, OnyxException> + Send + Sync;
/// Receives the private data of its class, already detached from the object.
pub type NativeDestructorFn =
    dyn Fn(&ObjectRef, Option<Arc<dyn PrivateData>>) -> Result<(), OnyxException> + Send + Sync;
/// `(new object, original object, private data of the original)`.
pub type NativeCopyFn = dyn Fn(&ObjectRef, &ObjectRef, Option<&Arc<dyn PrivateData>>) -> Result<(), OnyxException>
    + Send
    + Sync;
/// Returns true to keep the object alive when its last reference goes away.
pub type DeleteBlockerFn = dyn Fn(&ObjectHandle, Option<&Arc<dyn PrivateData>>) -> bool + Send + Sync;
pub type SystemConstructorFn = dyn Fn(&ObjectRef) -> Result<(), OnyxException> + Send + Sync;

#[derive(Clone)]
pub enum MethodBody {
    Native(Arc<NativeMethodFn>),
    NativeStatic(Arc<NativeStaticFn>),
    Script(Arc<UserFunction>),
}

#[derive(Clone)]
pub struct MethodVariant {
    params: Vec<TypeInfo>,
    body: MethodBody,
    access: Access,
}

impl MethodVariant {
    pub fn native<F>(params: Vec<TypeInfo>, f: F) -> Self
    where
        F: Fn(&ObjectRef, Option<&Arc<dyn PrivateData>>, &[OnyxValue]) -> Result<OnyxValue, OnyxException>
            + Send
            + Sync
            + 'static,
    {
        MethodVariant {
            params,
            body: MethodBody::Native(Arc::new(f)),
            access: Access::Public,
        }
    }

    pub fn native_static<F>(params: Vec<TypeInfo>, f: F) -> Self
    where
        F: Fn(&[OnyxValue]) -> Result<OnyxValue, OnyxException> + Send + Sync + 'static,
    {
        MethodVariant {
            params,
            body: MethodBody::NativeStatic(Arc::new(f)),
            access: Access::Public,
        }
    }

    pub fn script(func: Arc<UserFunction>) -> Self {
        MethodVariant {
            params: func.params().iter().map(|p| p.type_info().clone()).collect(),
            body: MethodBody::Script(func),
            access: Access::Public,
        }
    }

    pub(crate) fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    #[inline(always)]
    pub fn access(&self) -> Access {
        self.access
    }

    #[inline(always)]
    pub fn body(&self) -> &MethodBody {
        &self.body
    }

    pub fn params(&self) -> &[TypeInfo] {
        &self.params
    }

    pub fn is_native(&self) -> bool {
        !matches!(self.body, MethodBody::Script(_))
    }

    fn missing_allowed(&self, index: usize) -> bool {
        if let MethodBody::Script(func) = &self.body {
            if func.params().get(index).is_some_and(|p| p.has_default()) {
                return true;
            }
        }
        self.params[index].accepts(&OnyxValue::Nothing)
    }

    /// Sum of per-argument match scores; `None` when an argument is rejected.
    /// Extra arguments beyond the declared parameters are accepted unscored.
    fn score(&self, args: &[OnyxValue]) -> Option<u32> {
        let mut total = 0u32;
        for (index, param) in self.params.iter().enumerate() {
            match args.get(index) {
                Some(arg) => total += param.match_score(arg)? as u32,
                None if self.missing_allowed(index) => {}
                None => return None,
            }
        }
        Some(total)
    }

    fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(TypeInfo::name).collect();
        format!("({})", params.join(", "))
    }
}

pub struct Method {
    name: String,
    is_static: bool,
    variants: Vec<MethodVariant>,
}

impl Method {
    pub fn new(name: impl Into<String>, is_static: bool) -> Self {
        Method {
            name: name.into(),
            is_static,
            variants: Vec::new(),
        }
    }

    pub(crate) fn add_variant(&mut self, variant: MethodVariant) {
        self.variants.push(variant);
    }

    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `Private` only when every variant is private.
    pub fn access(&self) -> Access {
        if !self.variants.is_empty() && self.variants.iter().all(|v| v.access == Access::Private) {
            Access::Private
        } else {
            Access::Public
        }
    }

    #[inline(always)]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn variants(&self) -> &[MethodVariant] {
        &self.variants
    }

    /// Picks the best-scoring variant for `args`.
    pub fn resolve(&self, class_name: &str, args: &[OnyxValue]) -> Result<&MethodVariant, OnyxException> {
        let best = self
            .variants
            .iter()
            .filter_map(|v| v.score(args).map(|s| (s, v)))
            .fold(None::<(u32, &MethodVariant)>, |best, (score, v)| match best {
                Some((b, _)) if b >= score => best,
                _ => Some((score, v)),
            });
        if let Some((_, variant)) = best {
            return Ok(variant);
        }
        let given: Vec<&str> = args.iter().map(OnyxValue::type_name).collect();
        if self.variants.len() == 1 {
            Err(OnyxException::new(
                names::RUNTIME_TYPE_ERROR,
                format!(
                    "{}::{}{} cannot be called with ({})",
                    class_name,
                    self.name,
                    self.variants[0].signature(),
                    given.join(", ")
                ),
            ))
        } else {
            let candidates: Vec<String> = self.variants.iter().map(MethodVariant::signature).collect();
            Err(OnyxException::new(
                names::RUNTIME_OVERLOAD_ERROR,
                format!(
                    "no variant of {}::{} matches ({}); candidates: {}",
                    class_name,
                    self.name,
                    given.join(", "),
                    candidates.join(" ")
                ),
            ))
        }
    }
}

fn release_args(args: Vec<OnyxValue>) -> ExceptionSink {
    let mut xsink = ExceptionSink::new();
    for arg in args {
        xsink.absorb(arg.release());
    }
    xsink
}

/// Runs one variant. `declaring` is the class the method belongs to; native
/// instance methods receive that class's private data.
pub(crate) fn exec_variant(
    variant: &MethodVariant,
    object: Option<&ObjectRef>,
    declaring: &Arc<OnyxClass>,
    args: Vec<OnyxValue>,
) -> Result<OnyxValue, OnyxException> {
    match &variant.body {
        MethodBody::Native(f) => {
            let outcome = match object {
                Some(object) => object
                    .get_private(declaring.id())
                    .and_then(|private| f(object, private.as_ref(), &args)),
                None => Err(OnyxException::new(
                    names::CALL_ERROR,
                    format!("{} method called without an object", declaring.name()),
                )),
            };
            merge_outcome(outcome, release_args(args))
        }
        MethodBody::NativeStatic(f) => {
            let outcome = f(&args);
            merge_outcome(outcome, release_args(args))
        }
        MethodBody::Script(func) => call_function(func, object.cloned(), Some(declaring.clone()), args),
    }
}

/// Fails with `METHOD-IS-PRIVATE` when `access` is private to `caller`.
fn check_access(
    found: &FoundMethod,
    access: Access,
    name: &str,
    caller: Option<&OnyxClass>,
) -> Result<(), OnyxException> {
    if access == Access::Private && !has_private_access(caller, found.class.id()) {
        return Err(OnyxException::new(
            names::METHOD_IS_PRIVATE,
            format!(
                "{}::{}() is private and cannot be called from outside the class",
                found.class.name(),
                name
            ),
        ));
    }
    Ok(())
}

impl ObjectRef {
    /// Calls `name` on this object as seen from code of class `caller`.
    pub fn call_method(
        &self,
        name: &str,
        args: Vec<OnyxValue>,
        caller: Option<&OnyxClass>,
    ) -> Result<OnyxValue, OnyxException> {
        let class = self.class().clone();
        if name == "copy" && class.find_method(name).is_none() {
            let outcome = self.copy(caller).map(OnyxValue::Object);
            return merge_outcome(outcome, release_args(args));
        }
        let found = class.find_method(name).or_else(|| class.find_static_method(name));
        match found {
            Some(found) => {
                if let Err(e) = check_access(&found, found.access, name, caller) {
                    return merge_outcome(Err(e), release_args(args));
                }
                self.exec_checked(&found, args, |variant| {
                    check_access(&found, found.variant_access(variant), name, caller)
                })
            }
            None => match class.method_gate() {
                Some(gate) => {
                    trace!("method gate handles {}::{}", class.name(), name);
                    let gate_args = vec![OnyxValue::from(name), OnyxValue::from(OnyxList::from(args))];
                    self.exec_found(&gate, gate_args)
                }
                None => {
                    let e = OnyxException::new(
                        names::METHOD_DOES_NOT_EXIST,
                        format!("no method {}::{}()", class.name(), name),
                    );
                    merge_outcome(Err(e), release_args(args))
                }
            },
        }
    }

    /// Runs an already resolved method, holding a real reference meanwhile.
    pub fn exec_found(&self, found: &FoundMethod, args: Vec<OnyxValue>) -> Result<OnyxValue, OnyxException> {
        self.exec_checked(found, args, |_| Ok(()))
    }

    /// Like [`ObjectRef::exec_found`]; `check` vets the chosen variant before it runs.
    fn exec_checked(
        &self,
        found: &FoundMethod,
        args: Vec<OnyxValue>,
        check: impl FnOnce(&MethodVariant) -> Result<(), OnyxException>,
    ) -> Result<OnyxValue, OnyxException> {
        if let Err(e) = self.ensure_accessible() {
            return merge_outcome(Err(e), release_args(args));
        }
        let variant = match found
            .method
            .resolve(found.class.name(), &args)
            .and_then(|variant| check(variant).map(|_| variant))
        {
            Ok(variant) => variant,
            Err(e) => return merge_outcome(Err(e), release_args(args)),
        };
        let target = if found.method.is_static() { None } else { Some(self) };
        let guard = self.begin_call();
        let outcome = exec_variant(variant, target, &found.class, args);
        let mut xsink = ExceptionSink::new();
        xsink.absorb(guard.end());
        merge_outcome(outcome, xsink)
    }
}

impl OnyxClass {
    /// Calls a static method; no object is bound.
    pub fn call_static(
        self: &Arc<Self>,
        name: &str,
        args: Vec<OnyxValue>,
        caller: Option<&OnyxClass>,
    ) -> Result<OnyxValue, OnyxException> {
        let Some(found) = self.find_static_method(name) else {
            let e = OnyxException::new(
                names::METHOD_DOES_NOT_EXIST,
                format!("no static method {}::{}()", self.name(), name),
            );
            return merge_outcome(Err(e), release_args(args));
        };
        let variant = match check_access(&found, found.access, name, caller).and_then(|_| {
            let variant = found.method.resolve(found.class.name(), &args)?;
            check_access(&found, found.variant_access(variant), name, caller)?;
            Ok(variant)
        }) {
            Ok(variant) => variant,
            Err(e) => return merge_outcome(Err(e), release_args(args)),
        };
        exec_variant(variant, None, &found.class, args)
    }
}
