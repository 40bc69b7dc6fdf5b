//! Onyx 对象实例与引用计数。
//!
//! 每个对象持有其类描述、成员哈希表、按类 ID 存放的原生私有数据，以及生命周期状态
//! `Ok → InDestructor(线程) → Deleted`。状态和成员由同一把读写锁保护；
//! 引用计数（普通引用与调用期间的"真实引用"）由独立的互斥锁保护。
//!
//! # 主要功能
//! - [`ObjectRef`]：计数的脚本引用。`release()` 显式释放并返回析构异常，
//!   隐式 `Drop` 作为兜底路径，只记录日志
//! - [`ObjectHandle`]：不计数的句柄，供外部生命周期管理者与循环收集器使用
//! - 成员读写与访问控制、成员网关与修改通知
//! - 删除路径：析构函数（叶到根）→ 私有数据释放 → 成员逐个显式删除
//! - 引用计数归零前的删除阻止器（delete blocker）
//!
//! 锁约定：持有对象锁时从不释放任何值。被替换或取出的值总是在解锁之后才释放，
//! 因为释放可能运行任意析构代码。

use std::{
    any::Any,
    fmt::Debug,
    ops::Deref,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
    thread::{self, ThreadId},
};

use log::{debug, trace, warn};
use rustc_hash::FxHashMap;

use crate::{
    collector,
    config,
    exception::{names, ExceptionSink, OnyxException},
    types::{
        class::{ClassId, OnyxClass},
        hash::OnyxHash,
        list::OnyxList,
        value::OnyxValue,
    },
};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Native state attached to an object on behalf of one class.
pub trait PrivateData: AsAny + Send + Sync + 'static {
    /// Called once, when the object is destroyed and no native destructor
    /// consumed the data.
    fn release(&self) -> Result<(), OnyxException> {
        Ok(())
    }
}

pub fn downcast_private<T: PrivateData>(data: &Arc<dyn PrivateData>) -> Option<Arc<T>> {
    data.clone().into_any_arc().downcast::<T>().ok()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ObjectStatus {
    #[default]
    Ok,
    /// The destructor chain is running on the given thread.
    InDestructor(ThreadId),
    Deleted,
}

#[derive(Default)]
struct ObjectState {
    members: OnyxHash,
    private: FxHashMap<ClassId, Arc<dyn PrivateData>>,
    status: ObjectStatus,
}

impl ObjectState {
    #[inline(always)]
    fn status(&self) -> ObjectStatus {
        self.status
    }
}

#[derive(Default, Clone, Copy)]
pub(crate) struct RefCounts {
    pub(crate) refs: usize,
    /// References held by in-flight method calls.
    pub(crate) rrefs: usize,
}

pub struct OnyxObject {
    id: u64,
    class: Arc<OnyxClass>,
    state: RwLock<ObjectState>,
    counts: Mutex<RefCounts>,
    generation: AtomicU64,
    has_object_members: AtomicBool,
    collecting: AtomicBool,
}

impl OnyxObject {
    /// Allocates a fresh object with one script reference and no members.
    pub(crate) fn allocate(class: Arc<OnyxClass>) -> ObjectRef {
        let object = Arc::new(OnyxObject {
            id: NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed),
            class,
            state: RwLock::new(ObjectState::default()),
            counts: Mutex::new(RefCounts { refs: 1, rrefs: 0 }),
            generation: AtomicU64::new(0),
            has_object_members: AtomicBool::new(false),
            collecting: AtomicBool::new(false),
        });
        trace!("allocated {} object #{}", object.class.name(), object.id);
        ObjectRef::adopt(object)
    }

    #[inline(always)]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline(always)]
    pub fn class(&self) -> &Arc<OnyxClass> {
        &self.class
    }

    pub fn status(&self) -> ObjectStatus {
        match self.state.read() {
            Ok(state) => state.status(),
            Err(poisoned) => poisoned.into_inner().status(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status() == ObjectStatus::Ok
    }

    pub fn references(&self) -> usize {
        self.lock_counts().refs
    }

    pub fn real_references(&self) -> usize {
        self.lock_counts().rrefs
    }

    pub(crate) fn counts(&self) -> RefCounts {
        *self.lock_counts()
    }

    #[inline(always)]
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    #[inline(always)]
    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    #[inline(always)]
    pub(crate) fn is_collecting(&self) -> bool {
        self.collecting.load(Ordering::Acquire)
    }

    pub(crate) fn mark_collecting(&self) {
        self.collecting.store(true, Ordering::Release);
    }

    fn lock_counts(&self) -> MutexGuard<'_, RefCounts> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, ObjectState>, OnyxException> {
        self.state.read().map_err(|_| self.poisoned())
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, ObjectState>, OnyxException> {
        self.state.write().map_err(|_| self.poisoned())
    }

    fn poisoned(&self) -> OnyxException {
        OnyxException::new(
            names::BORROW_ERROR,
            format!("the lock of {} object #{} is poisoned", self.class.name(), self.id),
        )
    }

    fn already_deleted(&self) -> OnyxException {
        OnyxException::new(
            names::OBJECT_ALREADY_DELETED,
            format!(
                "the {} object #{} has already been deleted",
                self.class.name(),
                self.id
            ),
        )
    }

    /// Member and private data access is allowed while `Ok`, and for the
    /// destructor's own thread while `InDestructor`.
    fn check_status(&self, state: &ObjectState) -> Result<(), OnyxException> {
        match state.status() {
            ObjectStatus::Ok => Ok(()),
            ObjectStatus::InDestructor(owner) if owner == thread::current().id() => Ok(()),
            _ => Err(self.already_deleted()),
        }
    }

    pub(crate) fn ensure_accessible(&self) -> Result<(), OnyxException> {
        let state = self.read_state()?;
        self.check_status(&state)
    }

    pub(crate) fn add_ref(&self) {
        self.lock_counts().refs += 1;
        self.bump_generation();
    }

    /// Member value without access checks or gates.
    pub(crate) fn member(&self, name: &str) -> Result<OnyxValue, OnyxException> {
        let state = self.read_state()?;
        self.check_status(&state)?;
        Ok(state.members.find(name).cloned().unwrap_or_default())
    }

    pub(crate) fn member_exists(&self, name: &str) -> Result<bool, OnyxException> {
        let state = self.read_state()?;
        self.check_status(&state)?;
        Ok(state.members.exists_key(name))
    }

    /// Installs `value` under `name` and returns the previous value, which the
    /// caller must release after this returns.
    pub(crate) fn replace_member(
        &self,
        name: &str,
        value: OnyxValue,
    ) -> Result<OnyxValue, OnyxException> {
        if value.may_reference_objects() {
            self.has_object_members.store(true, Ordering::Release);
        }
        let old = {
            let mut state = self.write_state()?;
            self.check_status(&state)?;
            std::mem::replace(state.members.get_or_create(name), value)
        };
        self.bump_generation();
        Ok(old)
    }

    pub(crate) fn take_member_value(&self, name: &str) -> Result<OnyxValue, OnyxException> {
        let taken = {
            let mut state = self.write_state()?;
            self.check_status(&state)?;
            state.members.take_key_value(name)
        };
        self.bump_generation();
        Ok(taken.unwrap_or_default())
    }

    pub(crate) fn members_copy(&self) -> Result<OnyxHash, OnyxException> {
        let state = self.read_state()?;
        self.check_status(&state)?;
        Ok(state.members.copy())
    }

    pub fn member_names(&self) -> Result<Vec<String>, OnyxException> {
        let state = self.read_state()?;
        self.check_status(&state)?;
        Ok(state.members.keys_vec().into_iter().map(str::to_owned).collect())
    }

    /// Snapshot of the objects directly reachable through members.
    pub(crate) fn trace_members(
        &self,
        edges: &mut Vec<collector::TraceEdge>,
    ) -> Result<bool, OnyxException> {
        use crate::collector::Traceable;
        let state = self.read_state()?;
        if state.status() != ObjectStatus::Ok {
            return Ok(false);
        }
        state.members.collect(edges);
        Ok(true)
    }

    pub(crate) fn may_have_cycles(&self) -> bool {
        self.has_object_members.load(Ordering::Acquire)
    }

    fn private_slot(&self, class_id: ClassId) -> ClassId {
        self.class.private_slot(class_id)
    }

    /// Attaches private data on behalf of `class_id`; a slot is filled at most once.
    pub fn set_private(
        &self,
        class_id: ClassId,
        data: Arc<dyn PrivateData>,
    ) -> Result<(), OnyxException> {
        let slot = self.private_slot(class_id);
        let mut state = self.write_state()?;
        self.check_status(&state)?;
        debug_assert!(
            !state.private.contains_key(&slot),
            "private data for class {} set twice",
            slot
        );
        state.private.entry(slot).or_insert(data);
        Ok(())
    }

    /// Private data stored for `class_id`; fails once the object is deleted.
    pub fn get_private(
        &self,
        class_id: ClassId,
    ) -> Result<Option<Arc<dyn PrivateData>>, OnyxException> {
        let slot = self.private_slot(class_id);
        let state = self.read_state()?;
        self.check_status(&state)?;
        Ok(state.private.get(&slot).cloned())
    }

    /// Typed variant of [`OnyxObject::get_private`].
    pub fn get_private_as<T: PrivateData>(
        &self,
        class_id: ClassId,
    ) -> Result<Option<Arc<T>>, OnyxException> {
        Ok(self
            .get_private(class_id)?
            .as_ref()
            .and_then(downcast_private::<T>))
    }

    /// Detaches the private data for `class_id`; the caller becomes responsible
    /// for releasing it.
    pub fn get_and_clear_private(
        &self,
        class_id: ClassId,
    ) -> Result<Option<Arc<dyn PrivateData>>, OnyxException> {
        let slot = self.private_slot(class_id);
        let mut state = self.write_state()?;
        self.check_status(&state)?;
        Ok(state.private.remove(&slot))
    }

    /// Detaches the private data for `class_id` without status checks.
    pub(crate) fn take_private(&self, class_id: ClassId) -> Option<Arc<dyn PrivateData>> {
        let slot = self.private_slot(class_id);
        match self.state.write() {
            Ok(mut state) => state.private.remove(&slot),
            Err(poisoned) => poisoned.into_inner().private.remove(&slot),
        }
    }

    fn private_unchecked(&self, class_id: ClassId) -> Option<Arc<dyn PrivateData>> {
        let slot = self.private_slot(class_id);
        self.state
            .read()
            .ok()
            .and_then(|state| state.private.get(&slot).cloned())
    }

    /// One script reference goes away.
    pub(crate) fn deref_object(self: &Arc<Self>) -> Result<(), OnyxException> {
        // the state lock is never taken while the counts lock is held
        if self.class.delete_blocker().is_some()
            && self.lock_counts().refs == 1
            && self.is_valid()
            && self.exec_delete_blocker()
        {
            debug!(
                "delete blocker kept {} object #{} alive",
                self.class.name(),
                self.id
            );
            return Ok(());
        }
        let RefCounts { refs, rrefs } = {
            let mut counts = self.lock_counts();
            debug_assert!(counts.refs > 0, "reference count underflow");
            counts.refs = counts.refs.saturating_sub(1);
            *counts
        };
        self.bump_generation();

        if refs == 0 {
            return self.destroy_unreferenced();
        }
        if rrefs == 0
            && self.may_have_cycles()
            && !self.is_collecting()
            && config::cycle_collection_enabled()
            && self.is_valid()
        {
            return collector::scan(self);
        }
        Ok(())
    }

    fn exec_delete_blocker(self: &Arc<Self>) -> bool {
        match self.class.delete_blocker() {
            Some((declaring, blocker)) => {
                let private = self.private_unchecked(declaring);
                blocker(&ObjectHandle(self.clone()), private.as_ref())
            }
            None => false,
        }
    }

    fn destroy_unreferenced(self: &Arc<Self>) -> Result<(), OnyxException> {
        if self.begin_destruction(false)? {
            self.run_destruction()
        } else {
            Ok(())
        }
    }

    /// Moves `Ok` to `InDestructor`. Returns false when nothing is left to do.
    fn begin_destruction(&self, explicit: bool) -> Result<bool, OnyxException> {
        let mut state = self.write_state()?;
        match state.status() {
            ObjectStatus::Ok => {
                state.status = ObjectStatus::InDestructor(thread::current().id());
                Ok(true)
            }
            ObjectStatus::Deleted => Ok(false),
            ObjectStatus::InDestructor(_) if explicit && !self.is_collecting() => {
                Err(OnyxException::new(
                    names::DOUBLE_DELETE,
                    format!(
                        "the {} object #{} is already being deleted",
                        self.class.name(),
                        self.id
                    ),
                ))
            }
            ObjectStatus::InDestructor(_) => Ok(false),
        }
    }

    /// Explicit `delete`: runs the destructor chain regardless of outstanding references.
    pub(crate) fn do_delete(self: &Arc<Self>) -> Result<(), OnyxException> {
        if self.begin_destruction(true)? {
            self.run_destruction()
        } else {
            Ok(())
        }
    }

    /// Destroys an object that was marked by the cycle collector.
    pub(crate) fn collect_destroy(self: &Arc<Self>) -> Result<(), OnyxException> {
        self.destroy_unreferenced()
    }

    fn run_destruction(self: &Arc<Self>) -> Result<(), OnyxException> {
        debug!("destroying {} object #{}", self.class.name(), self.id);
        let mut xsink = ExceptionSink::new();

        // destructor code may bind `self`; hold our own reference meanwhile
        let this = ObjectRef::counted(self.clone());
        xsink.absorb(self.class.exec_destructors(&this));

        let (private, members) = match self.write_state() {
            Ok(mut state) => {
                state.status = ObjectStatus::Deleted;
                (
                    std::mem::take(&mut state.private),
                    std::mem::take(&mut state.members),
                )
            }
            Err(e) => {
                xsink.raise(e);
                (FxHashMap::default(), OnyxHash::new())
            }
        };
        self.bump_generation();
        for (_, data) in private {
            xsink.absorb(data.release());
        }
        xsink.absorb(members.delete_all());
        xsink.absorb(this.release());
        xsink.into_result()
    }

    /// Tears down an object whose construction failed: no destructors run.
    pub(crate) fn obliterate(self: &Arc<Self>) -> Result<(), OnyxException> {
        let (private, members) = {
            let mut state = self.write_state()?;
            if state.status() == ObjectStatus::Deleted {
                return Ok(());
            }
            state.status = ObjectStatus::Deleted;
            (
                std::mem::take(&mut state.private),
                std::mem::take(&mut state.members),
            )
        };
        trace!("obliterated {} object #{}", self.class.name(), self.id);
        let mut xsink = ExceptionSink::new();
        for (_, data) in private {
            xsink.absorb(data.release());
        }
        xsink.absorb(members.delete_all());
        xsink.into_result()
    }
}

/// A counted script reference to an object.
pub struct ObjectRef {
    obj: Arc<OnyxObject>,
    /// Set by `release()` so that `Drop` does not give the reference up twice.
    released: bool,
}

impl ObjectRef {
    /// Takes a new script reference on `obj`.
    pub(crate) fn counted(obj: Arc<OnyxObject>) -> Self {
        obj.add_ref();
        ObjectRef::adopt(obj)
    }

    /// Wraps a reference that was already counted.
    fn adopt(obj: Arc<OnyxObject>) -> Self {
        ObjectRef {
            obj,
            released: false,
        }
    }

    #[inline(always)]
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.obj, &other.obj)
    }

    pub fn handle(&self) -> ObjectHandle {
        ObjectHandle(self.obj.clone())
    }

    pub(crate) fn arc(&self) -> &Arc<OnyxObject> {
        &self.obj
    }

    /// Gives up this reference, reporting destructor exceptions.
    pub fn release(mut self) -> Result<(), OnyxException> {
        self.released = true;
        self.obj.deref_object()
    }

    /// Explicit delete: runs destructors now; the reference itself stays valid.
    pub fn delete(&self) -> Result<(), OnyxException> {
        self.obj.do_delete()
    }

    /// Marks the start of a method call: one ordinary and one real reference
    /// are held until the guard ends.
    pub fn begin_call(&self) -> CallGuard {
        self.obj.lock_counts().rrefs += 1;
        CallGuard {
            object: Some(ObjectRef::counted(self.obj.clone())),
        }
    }

    /// Reads a member, consulting the class's member gate when the member is
    /// missing or not accessible from `caller`.
    pub fn get_member_value(
        &self,
        name: &str,
        caller: Option<&OnyxClass>,
    ) -> Result<OnyxValue, OnyxException> {
        let class = self.obj.class.clone();
        let external = !class.is_internal_caller(caller);
        match class.check_member_access(name, caller) {
            Ok(_) => {
                if external && class.member_gate().is_some() && !self.obj.member_exists(name)? {
                    return class.exec_member_gate(self, name);
                }
                self.obj.member(name)
            }
            Err(e) if external && class.member_gate().is_some() => {
                trace!("member gate handles {}: {}", name, e.err());
                class.exec_member_gate(self, name)
            }
            Err(e) => Err(e),
        }
    }

    /// Reads a member without ever calling the member gate.
    pub fn get_member_value_no_method(
        &self,
        name: &str,
        caller: Option<&OnyxClass>,
    ) -> Result<OnyxValue, OnyxException> {
        self.obj.class.check_member_access(name, caller)?;
        self.obj.member(name)
    }

    /// Assigns a member after access and type checks; assignments from outside
    /// the class trigger the member notification hook.
    pub fn set_value(
        &self,
        name: &str,
        value: OnyxValue,
        caller: Option<&OnyxClass>,
    ) -> Result<(), OnyxException> {
        let class = self.obj.class.clone();
        let checked = class.check_member_access(name, caller).and_then(|type_info| {
            match type_info {
                Some(t) if !t.accepts(&value) => Err(OnyxException::new(
                    names::RUNTIME_TYPE_ERROR,
                    format!(
                        "member '{}' of class {} expects {}, got {}",
                        name,
                        class.name(),
                        t,
                        value.type_name()
                    ),
                )),
                _ => Ok(()),
            }
        });
        if let Err(e) = checked {
            let mut xsink = ExceptionSink::new();
            xsink.absorb(value.release());
            return crate::exception::merge_outcome(Err(e), xsink);
        }
        let old = self.obj.replace_member(name, value)?;
        old.release()?;
        if !class.is_internal_caller(caller) && class.member_notification().is_some() {
            class.exec_member_notification(self, name)?;
        }
        Ok(())
    }

    /// Removes a member; an object value is explicitly deleted.
    pub fn delete_member_value(
        &self,
        name: &str,
        caller: Option<&OnyxClass>,
    ) -> Result<(), OnyxException> {
        self.obj.class.check_member_access(name, caller)?;
        self.obj.take_member_value(name)?.delete()
    }

    /// Removes a member and releases it without delete semantics.
    pub fn remove_member_value(
        &self,
        name: &str,
        caller: Option<&OnyxClass>,
    ) -> Result<(), OnyxException> {
        self.obj.class.check_member_access(name, caller)?;
        self.obj.take_member_value(name)?.release()
    }

    pub fn take_member(
        &self,
        name: &str,
        caller: Option<&OnyxClass>,
    ) -> Result<OnyxValue, OnyxException> {
        self.obj.class.check_member_access(name, caller)?;
        self.obj.take_member_value(name)
    }

    /// A hash of the listed members that exist, in list order.
    pub fn get_slice(
        &self,
        keys: &OnyxList,
        caller: Option<&OnyxClass>,
    ) -> Result<OnyxHash, OnyxException> {
        let mut slice = OnyxHash::with_capacity(keys.len());
        let members = self.obj.members_copy()?;
        for key in keys.iter() {
            let key = key.to_string_value();
            self.obj.class.check_member_access(&key, caller)?;
            if let Some(value) = members.find(&key) {
                *slice.get_or_create(&key) = value.clone();
            }
        }
        Ok(slice)
    }

    /// The members visible to `caller`.
    pub fn members_snapshot(&self, caller: Option<&OnyxClass>) -> Result<OnyxHash, OnyxException> {
        let members = self.obj.members_copy()?;
        if self.obj.class.is_internal_caller(caller) {
            return Ok(members);
        }
        Ok(members
            .iter()
            .filter(|(k, _)| self.obj.class.check_member_access(k, caller).is_ok())
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect())
    }
}

impl Deref for ObjectRef {
    type Target = OnyxObject;

    fn deref(&self) -> &Self::Target {
        &self.obj
    }
}

impl Clone for ObjectRef {
    fn clone(&self) -> Self {
        ObjectRef::counted(self.obj.clone())
    }
}

impl Drop for ObjectRef {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.obj.deref_object() {
            let mut xsink = ExceptionSink::new();
            xsink.raise(e);
            xsink.log_unhandled("implicit object release");
        }
    }
}

impl Debug for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<object {} #{}>", self.obj.class.name(), self.obj.id)
    }
}

/// An uncounted handle. It keeps the object's memory alive but not the object.
#[derive(Clone)]
pub struct ObjectHandle(pub(crate) Arc<OnyxObject>);

impl ObjectHandle {
    /// A new counted reference, unless the object is gone or being destroyed.
    pub fn upgrade(&self) -> Option<ObjectRef> {
        if !self.0.is_valid() {
            return None;
        }
        let mut counts = self.0.lock_counts();
        if counts.refs == 0 {
            return None;
        }
        counts.refs += 1;
        drop(counts);
        self.0.bump_generation();
        Some(ObjectRef::adopt(self.0.clone()))
    }

    /// Gives up a reference that was left outstanding, e.g. after a delete
    /// blocker kept the object alive.
    pub fn release_ref(&self) -> Result<(), OnyxException> {
        self.0.deref_object()
    }

    #[inline(always)]
    pub fn ptr_eq(&self, other: &ObjectHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl Deref for ObjectHandle {
    type Target = OnyxObject;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Keeps a real reference for the duration of a method call.
pub struct CallGuard {
    object: Option<ObjectRef>,
}

impl CallGuard {
    pub fn object(&self) -> Option<&ObjectRef> {
        self.object.as_ref()
    }

    fn finish_real_ref(object: &ObjectRef) {
        let mut counts = object.obj.lock_counts();
        debug_assert!(counts.rrefs > 0, "real reference underflow");
        counts.rrefs = counts.rrefs.saturating_sub(1);
    }

    /// Ends the call, reporting exceptions from any resulting destruction.
    pub fn end(mut self) -> Result<(), OnyxException> {
        match self.object.take() {
            Some(object) => {
                Self::finish_real_ref(&object);
                object.release()
            }
            None => Ok(()),
        }
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        if let Some(object) = self.object.take() {
            Self::finish_real_ref(&object);
            if let Err(e) = object.release() {
                warn!("exception while ending a method call: {}", e);
            }
        }
    }
}

#[cfg(test)]
#[path = "object_test.rs"]
mod object_test;
