//! Onyx 类描述、类构建器与类注册表。
//!
//! 类在"解析阶段"通过 [`ClassBuilder`] 逐步添加成员与方法，`build()` 之后成为
//! 不可变的 `Arc<OnyxClass>`。构建时会把继承关系展平：
//! - 祖先列表（根到叶，去重，供构造/析构/复制钩子按序执行）
//! - 成员声明表与继承方法表（私有继承会把继承来的成员和方法变为私有）
//! - 私有数据槽位表（虚继承与默认继承会重定向原生私有数据的类 ID）
//!
//! # 主要功能
//! - 方法查找：本类原生方法 → 本类脚本方法 → 基类（按声明顺序深度优先）
//! - 成员访问控制：私有成员、封闭成员集合（声明了公有成员或 `no_public`）
//! - 对象构造（成员默认值 → 构造函数根到叶）、系统构造、析构链、复制钩子
//! - 功能域（domain）位掩码与注册表的沙箱检查

use std::{
    fmt::Debug,
    ops::BitOr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};

use log::{debug, trace};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    config::RuntimeConfig,
    exception::{merge_outcome, names, ExceptionSink, OnyxException},
    runtime::{eval_in_object, expression::Expression, function::{call_function, UserFunction}},
    types::{
        method::{
            exec_variant, DeleteBlockerFn, Method, MethodVariant, NativeCopyFn,
            NativeDestructorFn, SystemConstructorFn,
        },
        object::{ObjectRef, OnyxObject, PrivateData},
        typeinfo::TypeInfo,
        value::OnyxValue,
    },
};

pub type ClassId = u64;

static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(1);

/// Capability bits a class needs; registries can forbid some of them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FunctionalDomain(u64);

impl FunctionalDomain {
    pub const NONE: FunctionalDomain = FunctionalDomain(0);
    pub const PROCESS: FunctionalDomain = FunctionalDomain(1 << 0);
    pub const FILESYSTEM: FunctionalDomain = FunctionalDomain(1 << 1);
    pub const NETWORK: FunctionalDomain = FunctionalDomain(1 << 2);
    pub const THREAD_CONTROL: FunctionalDomain = FunctionalDomain(1 << 3);
    pub const EXTERNAL_INFO: FunctionalDomain = FunctionalDomain(1 << 4);
    pub const DATABASE: FunctionalDomain = FunctionalDomain(1 << 5);
    pub const GUI: FunctionalDomain = FunctionalDomain(1 << 6);
    pub const TERMINAL_IO: FunctionalDomain = FunctionalDomain(1 << 7);

    pub const fn from_bits(bits: u64) -> Self {
        FunctionalDomain(bits)
    }

    pub const fn bits(&self) -> u64 {
        self.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn contains(&self, other: FunctionalDomain) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(&self, other: FunctionalDomain) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for FunctionalDomain {
    type Output = FunctionalDomain;

    fn bitor(self, rhs: Self) -> Self::Output {
        FunctionalDomain(self.0 | rhs.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Public,
    Private,
}

impl Access {
    fn most_restrictive(self, other: Access) -> Access {
        if self == Access::Private || other == Access::Private {
            Access::Private
        } else {
            Access::Public
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BaseKind {
    Normal,
    /// The subclass stores its private data under the base's class ID.
    Default,
    /// The base's native methods see the subclass's private data.
    Virtual,
}

#[derive(Clone)]
pub struct BaseClass {
    pub class: Arc<OnyxClass>,
    pub access: Access,
    pub kind: BaseKind,
    /// Constant arguments passed to the base constructor.
    pub args: Vec<OnyxValue>,
}

#[derive(Clone)]
pub enum MemberInit {
    Value(OnyxValue),
    /// Evaluated per object, with `self` bound to the new object.
    Expr(Arc<Expression>),
}

#[derive(Clone)]
pub struct MemberDecl {
    pub access: Access,
    pub type_info: TypeInfo,
    pub init: Option<MemberInit>,
    declaring: ClassId,
}

#[derive(Clone)]
pub enum DestructorBody {
    Native(Arc<NativeDestructorFn>),
    Script(Arc<UserFunction>),
}

#[derive(Clone)]
pub enum CopyBody {
    Native(Arc<NativeCopyFn>),
    /// Called on the new object with the original as its only argument.
    Script(Arc<UserFunction>),
}

/// A method located through the hierarchy, with its effective access.
#[derive(Clone)]
pub struct FoundMethod {
    pub method: Arc<Method>,
    pub class: Arc<OnyxClass>,
    /// `Private` when every variant is private from this class's view.
    pub access: Access,
    /// Restriction added by the inheritance path alone.
    pub via: Access,
}

impl FoundMethod {
    fn local(method: &Arc<Method>, class: &Arc<OnyxClass>) -> Self {
        FoundMethod {
            method: method.clone(),
            class: class.clone(),
            access: method.access(),
            via: Access::Public,
        }
    }

    /// The effective access of one variant of this method.
    pub fn variant_access(&self, variant: &MethodVariant) -> Access {
        variant.access().most_restrictive(self.via)
    }

    fn inherited_through(self, base_access: Access) -> Self {
        FoundMethod {
            access: self.access.most_restrictive(base_access),
            via: self.via.most_restrictive(base_access),
            ..self
        }
    }
}

/// A special method that is either local (`owner == None`) or inherited.
#[derive(Clone)]
struct SpecialMethod {
    method: Arc<Method>,
    owner: Option<Arc<OnyxClass>>,
}

impl SpecialMethod {
    fn found(&self, this: &Arc<OnyxClass>) -> FoundMethod {
        FoundMethod {
            method: self.method.clone(),
            class: self.owner.clone().unwrap_or_else(|| this.clone()),
            access: Access::Private,
            via: Access::Private,
        }
    }
}

type SpecialSlot = fn(&OnyxClass) -> &Option<SpecialMethod>;

fn member_gate_slot(class: &OnyxClass) -> &Option<SpecialMethod> {
    &class.member_gate
}

fn method_gate_slot(class: &OnyxClass) -> &Option<SpecialMethod> {
    &class.method_gate
}

fn member_notification_slot(class: &OnyxClass) -> &Option<SpecialMethod> {
    &class.member_notification
}

/// Whether code of class `caller` may touch private parts declared by `declaring`.
pub fn has_private_access(caller: Option<&OnyxClass>, declaring: ClassId) -> bool {
    caller.is_some_and(|c| c.id() == declaring || c.is_derived_from(declaring))
}

pub struct OnyxClass {
    id: ClassId,
    name: String,
    domain: FunctionalDomain,
    no_public: bool,
    has_public_members: bool,
    bases: Vec<BaseClass>,
    /// Root to leaf, each class once, excluding this one.
    ancestors: Vec<Arc<OnyxClass>>,
    ancestor_ids: FxHashSet<ClassId>,
    local_members: Vec<(String, MemberDecl)>,
    members: FxHashMap<String, MemberDecl>,
    native_methods: FxHashMap<String, Arc<Method>>,
    script_methods: FxHashMap<String, Arc<Method>>,
    inherited_methods: FxHashMap<String, FoundMethod>,
    static_methods: FxHashMap<String, Arc<Method>>,
    inherited_static: FxHashMap<String, FoundMethod>,
    constructor: Option<Arc<Method>>,
    base_args: FxHashMap<ClassId, Vec<OnyxValue>>,
    destructor: Option<DestructorBody>,
    copy: Option<CopyBody>,
    copy_access: Access,
    system_constructor: Option<Arc<SystemConstructorFn>>,
    delete_blocker: Option<(ClassId, Arc<DeleteBlockerFn>)>,
    member_gate: Option<SpecialMethod>,
    method_gate: Option<SpecialMethod>,
    member_notification: Option<SpecialMethod>,
    private_slots: FxHashMap<ClassId, ClassId>,
}

impl OnyxClass {
    #[inline(always)]
    pub fn id(&self) -> ClassId {
        self.id
    }

    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> FunctionalDomain {
        self.domain
    }

    pub fn bases(&self) -> &[BaseClass] {
        &self.bases
    }

    pub fn ancestors(&self) -> &[Arc<OnyxClass>] {
        &self.ancestors
    }

    pub fn is_derived_from(&self, id: ClassId) -> bool {
        self.ancestor_ids.contains(&id)
    }

    pub fn is_equal_or_derived_from(&self, id: ClassId) -> bool {
        self.id == id || self.is_derived_from(id)
    }

    /// Code of `caller` counts as running inside this class.
    pub fn is_internal_caller(&self, caller: Option<&OnyxClass>) -> bool {
        caller.is_some_and(|c| {
            c.id == self.id || self.is_derived_from(c.id) || c.is_derived_from(self.id)
        })
    }

    /// The class ID under which private data of `class_id` is stored for
    /// instances of this class.
    pub fn private_slot(&self, class_id: ClassId) -> ClassId {
        self.private_slots.get(&class_id).copied().unwrap_or(class_id)
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    /// Checks that `caller` may access member `name` and returns its declared
    /// type, if the member is declared.
    pub fn check_member_access(
        &self,
        name: &str,
        caller: Option<&OnyxClass>,
    ) -> Result<Option<TypeInfo>, OnyxException> {
        match self.members.get(name) {
            Some(decl) => {
                if decl.access == Access::Private && !has_private_access(caller, decl.declaring) {
                    return Err(OnyxException::new(
                        names::PRIVATE_MEMBER,
                        format!(
                            "'{}' is a private member of class {}",
                            name, self.name
                        ),
                    ));
                }
                Ok(Some(decl.type_info.clone()))
            }
            None if self.is_internal_caller(caller) => Ok(None),
            None if self.has_public_members || self.no_public => Err(OnyxException::new(
                names::INVALID_MEMBER,
                format!("'{}' is not a member of class {}", name, self.name),
            )),
            None => Ok(None),
        }
    }

    pub fn find_method(self: &Arc<Self>, name: &str) -> Option<FoundMethod> {
        if let Some(method) = self
            .native_methods
            .get(name)
            .or_else(|| self.script_methods.get(name))
        {
            return Some(FoundMethod::local(method, self));
        }
        self.inherited_methods.get(name).cloned()
    }

    pub fn find_static_method(self: &Arc<Self>, name: &str) -> Option<FoundMethod> {
        if let Some(method) = self.static_methods.get(name) {
            return Some(FoundMethod::local(method, self));
        }
        self.inherited_static.get(name).cloned()
    }

    pub fn has_method(self: &Arc<Self>, name: &str) -> bool {
        self.find_method(name).is_some()
    }

    pub(crate) fn delete_blocker(&self) -> Option<(ClassId, Arc<DeleteBlockerFn>)> {
        self.delete_blocker.clone()
    }

    pub(crate) fn member_gate(self: &Arc<Self>) -> Option<FoundMethod> {
        self.member_gate.as_ref().map(|m| m.found(self))
    }

    pub(crate) fn method_gate(self: &Arc<Self>) -> Option<FoundMethod> {
        self.method_gate.as_ref().map(|m| m.found(self))
    }

    pub(crate) fn member_notification(self: &Arc<Self>) -> Option<FoundMethod> {
        self.member_notification.as_ref().map(|m| m.found(self))
    }

    pub(crate) fn exec_member_gate(
        self: &Arc<Self>,
        object: &ObjectRef,
        name: &str,
    ) -> Result<OnyxValue, OnyxException> {
        match self.member_gate() {
            Some(gate) => object.exec_found(&gate, vec![OnyxValue::from(name)]),
            None => Ok(OnyxValue::Nothing),
        }
    }

    pub(crate) fn exec_member_notification(
        self: &Arc<Self>,
        object: &ObjectRef,
        name: &str,
    ) -> Result<(), OnyxException> {
        match self.member_notification() {
            Some(hook) => object.exec_found(&hook, vec![OnyxValue::from(name)])?.release(),
            None => Ok(()),
        }
    }

    fn hierarchy<'a>(self: &'a Arc<Self>) -> impl DoubleEndedIterator<Item = &'a Arc<OnyxClass>> {
        self.ancestors.iter().chain(std::iter::once(self))
    }

    /// Creates an instance: member defaults, then constructors root to leaf.
    ///
    /// A failed construction tears the object down without running destructors.
    pub fn exec_constructor(
        self: &Arc<Self>,
        args: Vec<OnyxValue>,
        caller: Option<&OnyxClass>,
    ) -> Result<ObjectRef, OnyxException> {
        if let Some(constructor) = &self.constructor {
            let private = match constructor.resolve(&self.name, &args) {
                Ok(variant) => variant.access() == Access::Private,
                Err(_) => constructor.access() == Access::Private,
            };
            if private && !has_private_access(caller, self.id) {
                let mut xsink = ExceptionSink::new();
                for arg in args {
                    xsink.absorb(arg.release());
                }
                let e = OnyxException::new(
                    names::CONSTRUCTOR_IS_PRIVATE,
                    format!("the constructor of class {} is private", self.name),
                );
                return merge_outcome(Err(e), xsink);
            }
        }
        let object = OnyxObject::allocate(self.clone());
        let outcome = self.initialize(&object, Some(args));
        self.finish_construction(object, outcome)
    }

    /// Creates an instance for native code: member defaults, then system
    /// constructors root to leaf. Script constructors do not run.
    pub fn exec_system_constructor(self: &Arc<Self>) -> Result<ObjectRef, OnyxException> {
        let object = OnyxObject::allocate(self.clone());
        let outcome = self.initialize(&object, None);
        self.finish_construction(object, outcome)
    }

    fn finish_construction(
        self: &Arc<Self>,
        object: ObjectRef,
        outcome: Result<(), OnyxException>,
    ) -> Result<ObjectRef, OnyxException> {
        match outcome {
            Ok(()) => {
                trace!("constructed {} object #{}", self.name, object.id());
                Ok(object)
            }
            Err(e) => {
                debug!("construction of {} failed: {}", self.name, e);
                let mut xsink = ExceptionSink::new();
                xsink.absorb(object.arc().obliterate());
                xsink.absorb(object.release());
                merge_outcome(Err(e), xsink)
            }
        }
    }

    fn initialize(
        self: &Arc<Self>,
        object: &ObjectRef,
        args: Option<Vec<OnyxValue>>,
    ) -> Result<(), OnyxException> {
        let guard = object.begin_call();
        let outcome = self.initialize_members(object).and_then(|_| match args {
            Some(args) => self.run_constructors(object, args),
            None => self.run_system_constructors(object),
        });
        let mut xsink = ExceptionSink::new();
        xsink.absorb(guard.end());
        merge_outcome(outcome, xsink)
    }

    fn initialize_members(self: &Arc<Self>, object: &ObjectRef) -> Result<(), OnyxException> {
        for class in self.hierarchy() {
            for (name, decl) in &class.local_members {
                let value = match &decl.init {
                    Some(MemberInit::Value(v)) => v.clone(),
                    Some(MemberInit::Expr(expr)) => eval_in_object(expr, object, class)?,
                    None => OnyxValue::Nothing,
                };
                object.replace_member(name, value)?.release()?;
            }
        }
        Ok(())
    }

    fn run_constructors(
        self: &Arc<Self>,
        object: &ObjectRef,
        args: Vec<OnyxValue>,
    ) -> Result<(), OnyxException> {
        for class in &self.ancestors {
            let base_args = self.base_args.get(&class.id).cloned().unwrap_or_default();
            class.run_own_constructor(object, base_args)?;
        }
        self.run_own_constructor(object, args)
    }

    fn run_own_constructor(
        self: &Arc<Self>,
        object: &ObjectRef,
        args: Vec<OnyxValue>,
    ) -> Result<(), OnyxException> {
        match &self.constructor {
            Some(constructor) => {
                let variant = match constructor.resolve(&self.name, &args) {
                    Ok(variant) => variant,
                    Err(e) => {
                        let mut xsink = ExceptionSink::new();
                        for arg in args {
                            xsink.absorb(arg.release());
                        }
                        return merge_outcome(Err(e), xsink);
                    }
                };
                exec_variant(variant, Some(object), self, args)?.release()
            }
            None => {
                let mut xsink = ExceptionSink::new();
                for arg in args {
                    xsink.absorb(arg.release());
                }
                xsink.into_result()
            }
        }
    }

    fn run_system_constructors(self: &Arc<Self>, object: &ObjectRef) -> Result<(), OnyxException> {
        for class in self.hierarchy() {
            if let Some(constructor) = &class.system_constructor {
                constructor(object)?;
            }
        }
        Ok(())
    }

    /// Runs destructors leaf to root; one failing destructor does not stop the others.
    pub(crate) fn exec_destructors(self: &Arc<Self>, object: &ObjectRef) -> Result<(), OnyxException> {
        let mut xsink = ExceptionSink::new();
        for class in self.hierarchy().rev() {
            match &class.destructor {
                Some(DestructorBody::Script(func)) => {
                    let outcome =
                        call_function(func, Some(object.clone()), Some(class.clone()), Vec::new());
                    if let Some(value) = xsink.absorb(outcome) {
                        xsink.absorb(value.release());
                    }
                }
                Some(DestructorBody::Native(f)) => {
                    let private = object.take_private(class.id);
                    xsink.absorb(f(object, private));
                }
                None => {}
            }
        }
        xsink.into_result()
    }

    /// Runs copy hooks root to leaf on a freshly copied object.
    pub(crate) fn exec_copy_hooks(
        self: &Arc<Self>,
        copy: &ObjectRef,
        original: &ObjectRef,
    ) -> Result<(), OnyxException> {
        for class in self.hierarchy() {
            match &class.copy {
                Some(CopyBody::Native(f)) => {
                    let private = original.get_private(class.id)?;
                    f(copy, original, private.as_ref())?;
                }
                Some(CopyBody::Script(func)) => {
                    call_function(
                        func,
                        Some(copy.clone()),
                        Some(class.clone()),
                        vec![OnyxValue::Object(original.clone())],
                    )?
                    .release()?;
                }
                None => {}
            }
        }
        Ok(())
    }
}

impl ObjectRef {
    /// A new object of the same class with copied members; copy hooks run root to leaf.
    pub fn copy(&self, caller: Option<&OnyxClass>) -> Result<ObjectRef, OnyxException> {
        let class = self.class().clone();
        if class.copy_access == Access::Private && !has_private_access(caller, class.id) {
            return Err(OnyxException::new(
                names::METHOD_IS_PRIVATE,
                format!("{}::copy() is private", class.name),
            ));
        }
        let members = self.members_copy()?;
        let copy = OnyxObject::allocate(class.clone());
        let outcome = (|| {
            for (name, value) in members.iter() {
                copy.replace_member(name, value.clone())?.release()?;
            }
            let guard = copy.begin_call();
            let hooks = class.exec_copy_hooks(&copy, self);
            let mut xsink = ExceptionSink::new();
            xsink.absorb(guard.end());
            merge_outcome(hooks, xsink)
        })();
        let mut xsink = ExceptionSink::new();
        xsink.absorb(members.release());
        class.finish_construction(copy, merge_outcome(outcome, xsink))
    }
}

impl Debug for OnyxClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnyxClass")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("bases", &self.bases.iter().map(|b| b.class.name()).collect::<Vec<_>>())
            .finish()
    }
}

/// Mutable class description used while a class is being defined.
pub struct ClassBuilder {
    id: ClassId,
    name: String,
    domain: FunctionalDomain,
    no_public: bool,
    bases: Vec<BaseClass>,
    members: Vec<(String, MemberDecl)>,
    native_methods: FxHashMap<String, Method>,
    script_methods: FxHashMap<String, Method>,
    static_methods: FxHashMap<String, Method>,
    constructor: Option<Method>,
    destructor: Option<DestructorBody>,
    copy: Option<CopyBody>,
    copy_access: Access,
    system_constructor: Option<Arc<SystemConstructorFn>>,
    delete_blocker: Option<Arc<DeleteBlockerFn>>,
    member_gate: Option<Method>,
    method_gate: Option<Method>,
    member_notification: Option<Method>,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        ClassBuilder {
            id: NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            domain: FunctionalDomain::NONE,
            no_public: false,
            bases: Vec::new(),
            members: Vec::new(),
            native_methods: FxHashMap::default(),
            script_methods: FxHashMap::default(),
            static_methods: FxHashMap::default(),
            constructor: None,
            destructor: None,
            copy: None,
            copy_access: Access::Public,
            system_constructor: None,
            delete_blocker: None,
            member_gate: None,
            method_gate: None,
            member_notification: None,
        }
    }

    /// The ID the class will carry; native code uses it to attach private data.
    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn domain(mut self, domain: FunctionalDomain) -> Self {
        self.domain = self.domain | domain;
        self
    }

    /// Declares that the class has no public members at all.
    pub fn no_public(mut self) -> Self {
        self.no_public = true;
        self
    }

    pub fn base(self, class: &Arc<OnyxClass>, access: Access, kind: BaseKind) -> Self {
        self.base_with_args(class, access, kind, Vec::new())
    }

    pub fn base_with_args(
        mut self,
        class: &Arc<OnyxClass>,
        access: Access,
        kind: BaseKind,
        args: Vec<OnyxValue>,
    ) -> Self {
        self.bases.push(BaseClass {
            class: class.clone(),
            access,
            kind,
            args,
        });
        self
    }

    pub fn member(
        mut self,
        name: impl Into<String>,
        access: Access,
        type_info: TypeInfo,
        init: Option<MemberInit>,
    ) -> Self {
        let name = name.into();
        let decl = MemberDecl {
            access,
            type_info,
            init,
            declaring: self.id,
        };
        match self.members.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = decl,
            None => self.members.push((name, decl)),
        }
        self
    }

    fn add_to(table: &mut FxHashMap<String, Method>, name: String, access: Access, is_static: bool, variant: MethodVariant) {
        table
            .entry(name.clone())
            .or_insert_with(|| Method::new(name, is_static))
            .add_variant(variant.with_access(access));
    }

    /// Adds an instance method variant; variants sharing a name are overloads.
    pub fn method(mut self, name: impl Into<String>, access: Access, variant: MethodVariant) -> Self {
        let table = if variant.is_native() {
            &mut self.native_methods
        } else {
            &mut self.script_methods
        };
        Self::add_to(table, name.into(), access, false, variant);
        self
    }

    pub fn static_method(mut self, name: impl Into<String>, access: Access, variant: MethodVariant) -> Self {
        Self::add_to(&mut self.static_methods, name.into(), access, true, variant);
        self
    }

    pub fn constructor(mut self, access: Access, variant: MethodVariant) -> Self {
        self.constructor
            .get_or_insert_with(|| Method::new("constructor", false))
            .add_variant(variant.with_access(access));
        self
    }

    pub fn destructor(mut self, body: DestructorBody) -> Self {
        self.destructor = Some(body);
        self
    }

    pub fn native_destructor<F>(self, f: F) -> Self
    where
        F: Fn(&ObjectRef, Option<Arc<dyn PrivateData>>) -> Result<(), OnyxException> + Send + Sync + 'static,
    {
        self.destructor(DestructorBody::Native(Arc::new(f)))
    }

    /// A private copy hook makes `copy()` unavailable outside the class.
    pub fn copy_hook(mut self, access: Access, body: CopyBody) -> Self {
        self.copy = Some(body);
        self.copy_access = access;
        self
    }

    /// Native copy hook: called with the new object, the original and the
    /// original's private data for this class.
    pub fn native_copy_hook<F>(self, access: Access, f: F) -> Self
    where
        F: Fn(&ObjectRef, &ObjectRef, Option<&Arc<dyn PrivateData>>) -> Result<(), OnyxException>
            + Send
            + Sync
            + 'static,
    {
        self.copy_hook(access, CopyBody::Native(Arc::new(f)))
    }

    pub fn system_constructor<F>(mut self, f: F) -> Self
    where
        F: Fn(&ObjectRef) -> Result<(), OnyxException> + Send + Sync + 'static,
    {
        self.system_constructor = Some(Arc::new(f));
        self
    }

    pub fn delete_blocker<F>(mut self, f: F) -> Self
    where
        F: Fn(&crate::types::object::ObjectHandle, Option<&Arc<dyn PrivateData>>) -> bool
            + Send
            + Sync
            + 'static,
    {
        self.delete_blocker = Some(Arc::new(f));
        self
    }

    /// Called with the member name when an unknown or inaccessible member is read
    /// from outside the class.
    pub fn member_gate(mut self, variant: MethodVariant) -> Self {
        let mut method = Method::new("memberGate", false);
        method.add_variant(variant.with_access(Access::Private));
        self.member_gate = Some(method);
        self
    }

    /// Called with the method name and the argument list when a method is missing.
    pub fn method_gate(mut self, variant: MethodVariant) -> Self {
        let mut method = Method::new("methodGate", false);
        method.add_variant(variant.with_access(Access::Private));
        self.method_gate = Some(method);
        self
    }

    /// Called with the member name after a member was assigned from outside the class.
    pub fn member_notification(mut self, variant: MethodVariant) -> Self {
        let mut method = Method::new("memberNotification", false);
        method.add_variant(variant.with_access(Access::Private));
        self.member_notification = Some(method);
        self
    }

    /// Commits the class. The result is immutable.
    pub fn build(self) -> Arc<OnyxClass> {
        let mut ancestors: Vec<Arc<OnyxClass>> = Vec::new();
        let mut ancestor_ids = FxHashSet::default();
        for base in &self.bases {
            for class in base.class.ancestors.iter().chain(std::iter::once(&base.class)) {
                if ancestor_ids.insert(class.id) {
                    ancestors.push(class.clone());
                }
            }
        }

        let mut members: FxHashMap<String, MemberDecl> = self
            .members
            .iter()
            .map(|(name, decl)| (name.clone(), decl.clone()))
            .collect();
        let mut inherited_methods: FxHashMap<String, FoundMethod> = FxHashMap::default();
        let mut inherited_static: FxHashMap<String, FoundMethod> = FxHashMap::default();
        let mut base_args: FxHashMap<ClassId, Vec<OnyxValue>> = FxHashMap::default();
        let mut domain = self.domain;

        for base in &self.bases {
            let b = &base.class;
            domain = domain | b.domain;
            base_args.entry(b.id).or_insert_with(|| base.args.clone());
            for (id, args) in &b.base_args {
                base_args.entry(*id).or_insert_with(|| args.clone());
            }
            for (name, decl) in &b.members {
                members.entry(name.clone()).or_insert_with(|| MemberDecl {
                    access: decl.access.most_restrictive(base.access),
                    ..decl.clone()
                });
            }
            let local = b
                .native_methods
                .iter()
                .chain(b.script_methods.iter())
                .map(|(name, m)| (name, FoundMethod::local(m, b)));
            for (name, found) in local.chain(b.inherited_methods.iter().map(|(n, f)| (n, f.clone()))) {
                inherited_methods
                    .entry(name.clone())
                    .or_insert_with(|| found.inherited_through(base.access));
            }
            let statics = b
                .static_methods
                .iter()
                .map(|(name, m)| (name, FoundMethod::local(m, b)));
            for (name, found) in statics.chain(b.inherited_static.iter().map(|(n, f)| (n, f.clone()))) {
                inherited_static
                    .entry(name.clone())
                    .or_insert_with(|| found.inherited_through(base.access));
            }
        }

        let inherit_special = |own: Option<Method>, pick: SpecialSlot| {
            match own {
                Some(method) => Some(SpecialMethod {
                    method: Arc::new(method),
                    owner: None,
                }),
                None => self.bases.iter().find_map(|base| {
                    pick(&base.class).as_ref().map(|special| SpecialMethod {
                        method: special.method.clone(),
                        owner: Some(special.owner.clone().unwrap_or_else(|| base.class.clone())),
                    })
                }),
            }
        };
        let member_gate = inherit_special(self.member_gate, member_gate_slot);
        let method_gate = inherit_special(self.method_gate, method_gate_slot);
        let member_notification = inherit_special(self.member_notification, member_notification_slot);

        let delete_blocker = match self.delete_blocker {
            Some(f) => Some((self.id, f)),
            None => self.bases.iter().find_map(|b| b.class.delete_blocker.clone()),
        };

        let private_slots = Self::private_slots(self.id, &self.bases, &ancestors);
        let has_public_members = members.values().any(|m| m.access == Access::Public);
        let freeze = |table: FxHashMap<String, Method>| -> FxHashMap<String, Arc<Method>> {
            table.into_iter().map(|(k, m)| (k, Arc::new(m))).collect()
        };

        let class = Arc::new(OnyxClass {
            id: self.id,
            name: self.name,
            domain,
            no_public: self.no_public,
            has_public_members,
            bases: self.bases,
            ancestors,
            ancestor_ids,
            local_members: self.members,
            members,
            native_methods: freeze(self.native_methods),
            script_methods: freeze(self.script_methods),
            inherited_methods,
            static_methods: freeze(self.static_methods),
            inherited_static,
            constructor: self.constructor.map(Arc::new),
            base_args,
            destructor: self.destructor,
            copy: self.copy,
            copy_access: self.copy_access,
            system_constructor: self.system_constructor,
            delete_blocker,
            member_gate,
            method_gate,
            member_notification,
            private_slots,
        });
        debug!("committed class {} (id {})", class.name, class.id);
        class
    }

    /// Resolves where each class's private data lives for instances of the new class.
    fn private_slots(
        id: ClassId,
        bases: &[BaseClass],
        ancestors: &[Arc<OnyxClass>],
    ) -> FxHashMap<ClassId, ClassId> {
        let mut alias: FxHashMap<ClassId, ClassId> = FxHashMap::default();
        let edges = bases.iter().map(|b| (id, b)).chain(
            ancestors
                .iter()
                .flat_map(|a| a.bases.iter().map(move |b| (a.id, b))),
        );
        for (from, base) in edges {
            match base.kind {
                BaseKind::Normal => {}
                BaseKind::Default => {
                    alias.entry(from).or_insert(base.class.id);
                }
                BaseKind::Virtual => {
                    alias.entry(base.class.id).or_insert(from);
                }
            }
        }
        let resolve = |start: ClassId| {
            let mut current = start;
            // bounded walk; alias chains cannot be longer than the hierarchy
            for _ in 0..=ancestors.len() {
                match alias.get(&current) {
                    Some(next) if *next != current => current = *next,
                    _ => break,
                }
            }
            current
        };
        std::iter::once(id)
            .chain(ancestors.iter().map(|a| a.id))
            .map(|class_id| (class_id, resolve(class_id)))
            .filter(|(from, to)| from != to)
            .collect()
    }
}

/// Named classes visible to a runtime, with sandboxing by functional domain.
pub struct ClassRegistry {
    classes: RwLock<FxHashMap<String, Arc<OnyxClass>>>,
    forbidden: FunctionalDomain,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::with_forbidden_domains(FunctionalDomain::NONE)
    }

    pub fn with_forbidden_domains(forbidden: FunctionalDomain) -> Self {
        ClassRegistry {
            classes: RwLock::new(FxHashMap::default()),
            forbidden,
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::with_forbidden_domains(FunctionalDomain::from_bits(config.forbidden_domains))
    }

    pub fn forbidden_domains(&self) -> FunctionalDomain {
        self.forbidden
    }

    fn poisoned() -> OnyxException {
        OnyxException::new(names::BORROW_ERROR, "the class registry lock is poisoned")
    }

    pub fn register(&self, class: Arc<OnyxClass>) -> Result<(), OnyxException> {
        if class.domain.intersects(self.forbidden) {
            return Err(OnyxException::new(
                names::CLASS_DOMAIN,
                format!(
                    "class {} uses functional domains ({:#x}) that are not allowed here",
                    class.name,
                    class.domain.bits() & self.forbidden.bits()
                ),
            ));
        }
        let mut classes = self.classes.write().map_err(|_| Self::poisoned())?;
        if classes.contains_key(&class.name) {
            return Err(OnyxException::new(
                names::CLASS_ALREADY_DEFINED,
                format!("class {} is already defined", class.name),
            ));
        }
        debug!("registered class {}", class.name);
        classes.insert(class.name.clone(), class);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<Arc<OnyxClass>> {
        self.classes.read().ok()?.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = match self.classes.read() {
            Ok(classes) => classes.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.classes.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Instantiates a registered class by name.
    pub fn instantiate(
        &self,
        name: &str,
        args: Vec<OnyxValue>,
        caller: Option<&OnyxClass>,
    ) -> Result<ObjectRef, OnyxException> {
        match self.find(name) {
            Some(class) => class.exec_constructor(args, caller),
            None => Err(OnyxException::new(
                names::CALL_ERROR,
                format!("no class named {}", name),
            )),
        }
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}
