use super::*;

use std::sync::atomic::{AtomicI64, AtomicUsize};

use crate::types::{
    class::{Access, BaseKind, ClassBuilder, ClassRegistry, FunctionalDomain, MemberInit},
    method::MethodVariant,
    typeinfo::TypeInfo,
};

struct Counter {
    value: AtomicI64,
    released: Arc<AtomicUsize>,
}

impl Counter {
    fn new(value: i64, released: &Arc<AtomicUsize>) -> Arc<Self> {
        Arc::new(Counter {
            value: AtomicI64::new(value),
            released: released.clone(),
        })
    }
}

impl PrivateData for Counter {
    fn release(&self) -> Result<(), OnyxException> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn counting_builder(name: &str, drops: &Arc<AtomicUsize>) -> ClassBuilder {
    let drops = drops.clone();
    ClassBuilder::new(name).native_destructor(move |_, _| {
        drops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

fn counter_reader() -> MethodVariant {
    MethodVariant::native(vec![], |_, private, _| {
        Ok(private
            .and_then(downcast_private::<Counter>)
            .map(|c| OnyxValue::Integer(c.value.load(Ordering::SeqCst)))
            .unwrap_or_default())
    })
}

fn err_name<T>(result: Result<T, OnyxException>) -> String {
    match result {
        Ok(_) => panic!("expected an exception"),
        Err(e) => e.err().to_string(),
    }
}

#[test]
fn test_last_release_runs_destructor_once() {
    let drops = Arc::new(AtomicUsize::new(0));
    let class = counting_builder("Plain", &drops).build();
    let object = class.exec_constructor(vec![], None).unwrap();
    let second = object.clone();
    assert_eq!(object.references(), 2);
    object.release().unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    second.release().unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_explicit_delete_leaves_a_dead_reference() {
    let drops = Arc::new(AtomicUsize::new(0));
    let class = counting_builder("Deletable", &drops).build();
    let object = class.exec_constructor(vec![], None).unwrap();
    object.set_value("x", OnyxValue::Integer(1), None).unwrap();

    object.delete().unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert_eq!(object.status(), ObjectStatus::Deleted);
    assert_eq!(err_name(object.get_member_value("x", None)), names::OBJECT_ALREADY_DELETED);

    // deleting again is a no-op
    object.delete().unwrap();
    object.release().unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_delete_from_own_destructor_is_a_double_delete() {
    let seen = Arc::new(Mutex::new(None));
    let record = seen.clone();
    let class = ClassBuilder::new("SelfDeleting")
        .native_destructor(move |object, _| {
            let outcome = object.delete();
            *record.lock().unwrap() = outcome.err().map(|e| e.err().to_string());
            Ok(())
        })
        .build();
    class.exec_constructor(vec![], None).unwrap().release().unwrap();
    assert_eq!(seen.lock().unwrap().as_deref(), Some(names::DOUBLE_DELETE));
}

#[test]
fn test_delete_blocker_vetoes_the_last_release() {
    let drops = Arc::new(AtomicUsize::new(0));
    let blocking = Arc::new(AtomicBool::new(true));
    let flag = blocking.clone();
    let class = counting_builder("Blocked", &drops)
        .delete_blocker(move |_, _| flag.load(Ordering::SeqCst))
        .build();
    let object = class.exec_constructor(vec![], None).unwrap();
    let handle = object.handle();

    object.release().unwrap();
    assert!(handle.is_valid());
    assert_eq!(handle.references(), 1);
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    blocking.store(false, Ordering::SeqCst);
    handle.release_ref().unwrap();
    assert!(!handle.is_valid());
    assert!(handle.upgrade().is_none());
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_virtual_base_sees_subclass_private_data() {
    let released = Arc::new(AtomicUsize::new(0));
    let base = ClassBuilder::new("VBase")
        .method("get", Access::Public, counter_reader())
        .build();
    let derived = ClassBuilder::new("VDerived")
        .base(&base, Access::Public, BaseKind::Virtual)
        .build();
    let object = derived.exec_constructor(vec![], None).unwrap();
    object.set_private(derived.id(), Counter::new(7, &released)).unwrap();

    let value = object.call_method("get", vec![], None).unwrap();
    assert_eq!(value.to_int(), 7);
    assert!(object.get_private_as::<Counter>(base.id()).unwrap().is_some());

    object.release().unwrap();
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn test_default_base_stores_under_base_id() {
    let released = Arc::new(AtomicUsize::new(0));
    let base = ClassBuilder::new("DBase")
        .method("get", Access::Public, counter_reader())
        .build();
    let derived = ClassBuilder::new("DDerived")
        .base(&base, Access::Public, BaseKind::Default)
        .build();
    assert_eq!(derived.private_slot(derived.id()), base.id());

    let object = derived.exec_constructor(vec![], None).unwrap();
    object.set_private(derived.id(), Counter::new(3, &released)).unwrap();
    assert_eq!(object.call_method("get", vec![], None).unwrap().to_int(), 3);
    object.release().unwrap();
}

#[test]
fn test_native_destructor_takes_private_data() {
    let released = Arc::new(AtomicUsize::new(0));
    let taken = Arc::new(AtomicUsize::new(0));
    let record = taken.clone();
    let builder = ClassBuilder::new("Owner");
    let id = builder.id();
    let class = builder
        .native_destructor(move |_, private| {
            if private.is_some() {
                record.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        })
        .build();
    let object = class.exec_constructor(vec![], None).unwrap();
    object.set_private(id, Counter::new(1, &released)).unwrap();
    object.release().unwrap();
    assert_eq!(taken.load(Ordering::SeqCst), 1);
    assert_eq!(released.load(Ordering::SeqCst), 0);
}

#[test]
fn test_get_and_clear_private() {
    let released = Arc::new(AtomicUsize::new(0));
    let class = ClassBuilder::new("Detachable").build();
    let object = class.exec_constructor(vec![], None).unwrap();
    object.set_private(class.id(), Counter::new(5, &released)).unwrap();

    let data = object.get_and_clear_private(class.id()).unwrap().unwrap();
    assert!(object.get_private(class.id()).unwrap().is_none());
    data.release().unwrap();
    object.release().unwrap();
    assert_eq!(released.load(Ordering::SeqCst), 1);

    let deleted = class.exec_constructor(vec![], None).unwrap();
    deleted.delete().unwrap();
    assert_eq!(
        err_name(deleted.get_and_clear_private(class.id())),
        names::OBJECT_ALREADY_DELETED
    );
    deleted.release().unwrap();
}

#[test]
fn test_private_members_and_closed_classes() {
    let class = ClassBuilder::new("Account")
        .member("owner", Access::Public, TypeInfo::String, Some(MemberInit::Value("ann".into())))
        .member("balance", Access::Private, TypeInfo::Int, Some(MemberInit::Value(OnyxValue::Integer(10))))
        .build();
    let object = class.exec_constructor(vec![], None).unwrap();

    assert_eq!(object.get_member_value("owner", None).unwrap().to_string_value(), "ann");
    assert_eq!(err_name(object.get_member_value("balance", None)), names::PRIVATE_MEMBER);
    assert_eq!(
        object.get_member_value("balance", Some(class.as_ref())).unwrap().to_int(),
        10
    );
    assert_eq!(err_name(object.get_member_value("nickname", None)), names::INVALID_MEMBER);
    assert_eq!(
        err_name(object.set_value("nickname", OnyxValue::Integer(1), None)),
        names::INVALID_MEMBER
    );
    // the class itself may add undeclared members
    object.set_value("cache", OnyxValue::Integer(1), Some(class.as_ref())).unwrap();

    let snapshot = object.members_snapshot(None).unwrap();
    assert!(snapshot.exists_key("owner"));
    assert!(!snapshot.exists_key("balance"));
    object.release().unwrap();
}

#[test]
fn test_member_types_are_enforced() {
    let class = ClassBuilder::new("Typed")
        .member("count", Access::Public, TypeInfo::Int, None)
        .build();
    let object = class.exec_constructor(vec![], None).unwrap();
    object.set_value("count", OnyxValue::Integer(2), None).unwrap();
    assert_eq!(
        err_name(object.set_value("count", OnyxValue::from("two"), None)),
        names::RUNTIME_TYPE_ERROR
    );
    assert_eq!(object.get_member_value("count", None).unwrap().to_int(), 2);
    object.release().unwrap();
}

#[test]
fn test_method_visibility_and_gate() {
    let class = ClassBuilder::new("Gated")
        .method(
            "hidden",
            Access::Private,
            MethodVariant::native(vec![], |_, _, _| Ok(OnyxValue::Integer(1))),
        )
        .method_gate(MethodVariant::native(vec![], |_, _, args| {
            let count = args[1].as_list().map(|l| l.len()).unwrap_or(0);
            Ok(OnyxValue::from(format!("{}/{}", args[0].to_string_value(), count)))
        }))
        .build();
    let object = class.exec_constructor(vec![], None).unwrap();

    assert_eq!(err_name(object.call_method("hidden", vec![], None)), names::METHOD_IS_PRIVATE);
    assert_eq!(object.call_method("hidden", vec![], Some(class.as_ref())).unwrap().to_int(), 1);
    let gated = object
        .call_method("missing", vec![OnyxValue::Integer(1), OnyxValue::Integer(2)], None)
        .unwrap();
    assert_eq!(gated.to_string_value(), "missing/2");

    let ungated = ClassBuilder::new("Ungated").build();
    let plain = ungated.exec_constructor(vec![], None).unwrap();
    assert_eq!(err_name(plain.call_method("missing", vec![], None)), names::METHOD_DOES_NOT_EXIST);
    plain.release().unwrap();
    object.release().unwrap();
}

#[test]
fn test_member_gate_and_notification() {
    let notified = Arc::new(Mutex::new(Vec::new()));
    let record = notified.clone();
    let class = ClassBuilder::new("Observed")
        .member_gate(MethodVariant::native(vec![], |_, _, args| {
            Ok(OnyxValue::from(format!("gate:{}", args[0].to_string_value())))
        }))
        .member_notification(MethodVariant::native(vec![], move |_, _, args| {
            record.lock().unwrap().push(args[0].to_string_value());
            Ok(OnyxValue::Nothing)
        }))
        .build();
    let object = class.exec_constructor(vec![], None).unwrap();

    assert_eq!(object.get_member_value("ghost", None).unwrap().to_string_value(), "gate:ghost");
    assert!(object.get_member_value("ghost", Some(class.as_ref())).unwrap().is_nothing());

    object.set_value("a", OnyxValue::Integer(1), None).unwrap();
    object.set_value("b", OnyxValue::Integer(2), Some(class.as_ref())).unwrap();
    assert_eq!(*notified.lock().unwrap(), vec!["a".to_string()]);
    assert_eq!(object.get_member_value("a", None).unwrap().to_int(), 1);
    object.release().unwrap();
}

#[test]
fn test_overloads_pick_the_most_specific_variant() {
    let class = ClassBuilder::new("Overloaded")
        .method(
            "f",
            Access::Public,
            MethodVariant::native(vec![TypeInfo::Int], |_, _, _| Ok("int".into())),
        )
        .method(
            "f",
            Access::Public,
            MethodVariant::native(vec![TypeInfo::Number], |_, _, _| Ok("number".into())),
        )
        .method(
            "f",
            Access::Public,
            MethodVariant::native(vec![TypeInfo::String], |_, _, _| Ok("string".into())),
        )
        .build();
    let object = class.exec_constructor(vec![], None).unwrap();
    let call = |arg: OnyxValue| object.call_method("f", vec![arg], None);

    assert_eq!(call(OnyxValue::Integer(1)).unwrap().to_string_value(), "int");
    assert_eq!(call(OnyxValue::Float(1.5)).unwrap().to_string_value(), "number");
    assert_eq!(call(OnyxValue::from("x")).unwrap().to_string_value(), "string");
    assert_eq!(err_name(call(OnyxValue::Boolean(true))), names::RUNTIME_OVERLOAD_ERROR);
    object.release().unwrap();
}

#[test]
fn test_private_overload_is_checked_per_variant() {
    let class = ClassBuilder::new("MixedAccess")
        .method(
            "f",
            Access::Public,
            MethodVariant::native(vec![TypeInfo::Int], |_, _, _| Ok("public-int".into())),
        )
        .method(
            "f",
            Access::Private,
            MethodVariant::native(vec![TypeInfo::String], |_, _, _| Ok("private-string".into())),
        )
        .static_method(
            "g",
            Access::Public,
            MethodVariant::native_static(vec![TypeInfo::Int], |_| Ok("static-int".into())),
        )
        .static_method(
            "g",
            Access::Private,
            MethodVariant::native_static(vec![TypeInfo::String], |_| Ok("static-string".into())),
        )
        .build();
    assert_eq!(class.find_method("f").unwrap().access, Access::Public);
    let object = class.exec_constructor(vec![], None).unwrap();

    let outside = object.call_method("f", vec![OnyxValue::Integer(1)], None).unwrap();
    assert_eq!(outside.to_string_value(), "public-int");
    assert_eq!(
        err_name(object.call_method("f", vec![OnyxValue::from("x")], None)),
        names::METHOD_IS_PRIVATE
    );
    let inside = object
        .call_method("f", vec![OnyxValue::from("x")], Some(class.as_ref()))
        .unwrap();
    assert_eq!(inside.to_string_value(), "private-string");

    assert_eq!(
        class.call_static("g", vec![OnyxValue::Integer(1)], None).unwrap().to_string_value(),
        "static-int"
    );
    assert_eq!(
        err_name(class.call_static("g", vec![OnyxValue::from("x")], None)),
        names::METHOD_IS_PRIVATE
    );

    // a private base edge narrows every inherited variant
    let derived = ClassBuilder::new("MixedDerived")
        .base(&class, Access::Private, BaseKind::Normal)
        .build();
    let child = derived.exec_constructor(vec![], None).unwrap();
    assert_eq!(
        err_name(child.call_method("f", vec![OnyxValue::Integer(1)], None)),
        names::METHOD_IS_PRIVATE
    );
    assert_eq!(
        child
            .call_method("f", vec![OnyxValue::Integer(1)], Some(derived.as_ref()))
            .unwrap()
            .to_string_value(),
        "public-int"
    );
    child.release().unwrap();
    object.release().unwrap();
}

#[test]
fn test_constructors_run_root_to_leaf() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let log_base = order.clone();
    let base = ClassBuilder::new("CBase")
        .constructor(
            Access::Public,
            MethodVariant::native(vec![TypeInfo::Int], move |_, _, args| {
                log_base.lock().unwrap().push(format!("base:{}", args[0].to_int()));
                Ok(OnyxValue::Nothing)
            }),
        )
        .build();
    let log_derived = order.clone();
    let derived = ClassBuilder::new("CDerived")
        .base_with_args(&base, Access::Public, BaseKind::Normal, vec![OnyxValue::Integer(5)])
        .constructor(
            Access::Public,
            MethodVariant::native(vec![], move |_, _, _| {
                log_derived.lock().unwrap().push("derived".to_string());
                Ok(OnyxValue::Nothing)
            }),
        )
        .build();
    derived.exec_constructor(vec![], None).unwrap().release().unwrap();
    assert_eq!(*order.lock().unwrap(), vec!["base:5".to_string(), "derived".to_string()]);
}

#[test]
fn test_failed_construction_runs_no_destructor() {
    let drops = Arc::new(AtomicUsize::new(0));
    let inner_drops = Arc::new(AtomicUsize::new(0));
    let inner = counting_builder("Inner", &inner_drops).build();
    let class = counting_builder("Fragile", &drops)
        .constructor(
            Access::Public,
            MethodVariant::native(vec![], move |object, _, _| {
                let part = inner.exec_constructor(vec![], None)?;
                object.set_value("part", OnyxValue::Object(part), None)?;
                Err(OnyxException::new("SETUP-ERROR", "cannot construct"))
            }),
        )
        .build();
    assert_eq!(err_name(class.exec_constructor(vec![], None)), "SETUP-ERROR");
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    // members of the half-built object are still torn down
    assert_eq!(inner_drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_private_constructor() {
    let class = ClassBuilder::new("Singleton")
        .constructor(
            Access::Private,
            MethodVariant::native(vec![], |_, _, _| Ok(OnyxValue::Nothing)),
        )
        .build();
    assert_eq!(err_name(class.exec_constructor(vec![], None)), names::CONSTRUCTOR_IS_PRIVATE);
    class.exec_constructor(vec![], Some(class.as_ref())).unwrap().release().unwrap();
}

#[test]
fn test_copy_runs_hooks() {
    let class = ClassBuilder::new("Copyable")
        .native_copy_hook(Access::Public, |copy, original, _| {
            let generation = original.get_member_value("generation", None)?.to_int();
            copy.set_value("generation", OnyxValue::Integer(generation + 1), None)
        })
        .build();
    let object = class.exec_constructor(vec![], None).unwrap();
    object.set_value("generation", OnyxValue::Integer(1), None).unwrap();
    object.set_value("label", OnyxValue::from("a"), None).unwrap();

    let copy = object.copy(None).unwrap();
    assert!(!copy.ptr_eq(&object));
    assert_eq!(copy.get_member_value("generation", None).unwrap().to_int(), 2);
    assert_eq!(copy.get_member_value("label", None).unwrap().to_string_value(), "a");

    let via_call = object.call_method("copy", vec![], None).unwrap();
    assert!(via_call.as_object().is_some());
    via_call.release().unwrap();
    copy.release().unwrap();
    object.release().unwrap();
}

#[test]
fn test_private_copy_hook_blocks_outside_copies() {
    let class = ClassBuilder::new("NoCopy")
        .native_copy_hook(Access::Private, |_, _, _| Ok(()))
        .build();
    let object = class.exec_constructor(vec![], None).unwrap();
    assert_eq!(err_name(object.copy(None)), names::METHOD_IS_PRIVATE);
    object.copy(Some(class.as_ref())).unwrap().release().unwrap();
    object.release().unwrap();
}

#[test]
fn test_reference_cycle_is_collected() {
    let drops = Arc::new(AtomicUsize::new(0));
    let class = counting_builder("Node", &drops).build();
    let a = class.exec_constructor(vec![], None).unwrap();
    let b = class.exec_constructor(vec![], None).unwrap();
    a.set_value("peer", OnyxValue::Object(b.clone()), None).unwrap();
    b.set_value("peer", OnyxValue::Object(a.clone()), None).unwrap();
    let watch = a.handle();

    a.release().unwrap();
    // still reachable through `b`
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    assert!(watch.is_valid());

    b.release().unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 2);
    assert!(!watch.is_valid());
}

#[test]
fn test_self_reference_is_collected() {
    let drops = Arc::new(AtomicUsize::new(0));
    let class = counting_builder("Loop", &drops).build();
    let object = class.exec_constructor(vec![], None).unwrap();
    let mut hash = OnyxHash::new();
    hash.set_key_value("me", OnyxValue::Object(object.clone())).unwrap();
    object.set_value("index", OnyxValue::from(hash), None).unwrap();
    object.release().unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_shared_container_keeps_cycle_alive() {
    let drops = Arc::new(AtomicUsize::new(0));
    let class = counting_builder("Indexed", &drops).build();
    let object = class.exec_constructor(vec![], None).unwrap();
    let mut hash = OnyxHash::new();
    hash.set_key_value("me", OnyxValue::Object(object.clone())).unwrap();
    object.set_value("index", OnyxValue::from(hash), None).unwrap();
    let held = object.get_member_value("index", None).unwrap();
    let watch = object.handle();

    object.release().unwrap();
    // `held` shares the hash that still points at the object
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    assert!(watch.is_valid());
    let me = held.as_hash().and_then(|h| h.find("me")).cloned().unwrap();
    let index = me.as_object().unwrap().get_member_value("index", None).unwrap();
    assert!(index.as_hash().is_some());
    index.release().unwrap();
    me.release().unwrap();

    held.release().unwrap();
    // the next scan sees the hash held only by the object
    watch.upgrade().unwrap().release().unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert!(!watch.is_valid());
}

#[test]
fn test_container_shared_inside_a_cycle_is_collected() {
    let drops = Arc::new(AtomicUsize::new(0));
    let class = counting_builder("Peer", &drops).build();
    let a = class.exec_constructor(vec![], None).unwrap();
    let b = class.exec_constructor(vec![], None).unwrap();
    let peers = OnyxValue::from(vec![OnyxValue::Object(a.clone()), OnyxValue::Object(b.clone())]);
    a.set_value("peers", peers.clone(), None).unwrap();
    b.set_value("peers", peers, None).unwrap();

    a.release().unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    b.release().unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 2);
}

#[test]
fn test_cycle_waits_for_in_flight_call() {
    let drops = Arc::new(AtomicUsize::new(0));
    let slot: Arc<Mutex<Option<ObjectRef>>> = Arc::new(Mutex::new(None));
    let during_call = Arc::new(Mutex::new(None));
    let (held, seen, counted) = (slot.clone(), during_call.clone(), drops.clone());
    let class = counting_builder("Busy", &drops)
        .method(
            "finish",
            Access::Public,
            MethodVariant::native(vec![], move |object, _, _| {
                if let Some(last) = held.lock().unwrap().take() {
                    last.release()?;
                }
                *seen.lock().unwrap() =
                    Some((counted.load(Ordering::SeqCst), object.is_valid()));
                Ok(OnyxValue::Nothing)
            }),
        )
        .build();
    let a = class.exec_constructor(vec![], None).unwrap();
    let b = class.exec_constructor(vec![], None).unwrap();
    a.set_value("peer", OnyxValue::Object(b.clone()), None).unwrap();
    b.set_value("peer", OnyxValue::Object(a.clone()), None).unwrap();
    b.release().unwrap();
    let watch = a.handle();

    // the outer call stands in for a running interpreter frame
    let outer = a.begin_call();
    *slot.lock().unwrap() = Some(a);
    let receiver = outer.object().unwrap();
    receiver.call_method("finish", vec![], None).unwrap();
    assert_eq!(*during_call.lock().unwrap(), Some((0, true)));
    assert!(watch.real_references() > 0);
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    assert!(watch.is_valid());

    outer.end().unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 2);
    assert!(!watch.is_valid());
}

#[test]
fn test_concurrent_member_writes() {
    let class = ClassBuilder::new("SharedState").build();
    let object = class.exec_constructor(vec![], None).unwrap();
    let workers: Vec<_> = (0..4i64)
        .map(|t| {
            let object = object.clone();
            thread::spawn(move || {
                for i in 0..200i64 {
                    object.set_value("last", OnyxValue::Integer(t * 1000 + i), None).unwrap();
                    object
                        .set_value(&format!("worker{}", t), OnyxValue::Integer(i), None)
                        .unwrap();
                    let last = object.get_member_value("last", None).unwrap();
                    let value = last.to_int();
                    assert!((0..4000).contains(&value) && value % 1000 < 200);
                    last.release().unwrap();
                }
                object.release().unwrap();
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(object.member_names().unwrap().len(), 5);
    for t in 0..4 {
        let value = object.get_member_value(&format!("worker{}", t), None).unwrap();
        assert_eq!(value.to_int(), 199);
    }
    assert_eq!(object.references(), 1);
    object.release().unwrap();
}

#[test]
fn test_hash_delete_key_versus_remove_key() {
    let drops = Arc::new(AtomicUsize::new(0));
    let class = counting_builder("Held", &drops).build();
    let first = class.exec_constructor(vec![], None).unwrap();
    let second = class.exec_constructor(vec![], None).unwrap();
    let mut hash = OnyxHash::new();
    hash.set_key_value("deleted", OnyxValue::Object(first.clone())).unwrap();
    hash.set_key_value("removed", OnyxValue::Object(second.clone())).unwrap();

    hash.delete_key("deleted").unwrap();
    assert!(!hash.exists_key("deleted"));
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert!(!first.is_valid());

    hash.remove_key("removed").unwrap();
    assert!(hash.is_empty());
    assert!(second.is_valid());
    assert_eq!(drops.load(Ordering::SeqCst), 1);

    first.release().unwrap();
    second.release().unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 2);
}

#[test]
fn test_hash_delete_removes_entry_even_when_destructor_throws() {
    let class = ClassBuilder::new("Grumpy")
        .native_destructor(|_, _| Err(OnyxException::new("GRUMPY", "refusing to go")))
        .build();
    let first = class.exec_constructor(vec![], None).unwrap();
    let second = class.exec_constructor(vec![], None).unwrap();
    let watch = (first.handle(), second.handle());
    let mut hash = OnyxHash::new();
    hash.set_key_value("first", OnyxValue::Object(first)).unwrap();
    hash.set_key_value("second", OnyxValue::Object(second)).unwrap();
    hash.set_key_value("plain", OnyxValue::Integer(3)).unwrap();

    assert_eq!(err_name(hash.delete_key("first")), "GRUMPY");
    assert!(!hash.exists_key("first"));
    assert!(!watch.0.is_valid());

    let mut it = hash.cursor();
    assert!(it.next());
    assert_eq!(it.key(), Some("second"));
    assert_eq!(err_name(it.delete_current()), "GRUMPY");
    assert!(it.next());
    assert_eq!(it.key(), Some("plain"));
    assert!(!watch.1.is_valid());
    assert_eq!(hash.keys_vec(), vec!["plain"]);
}

#[test]
fn test_deleting_an_object_deletes_its_members() {
    let drops = Arc::new(AtomicUsize::new(0));
    let class = counting_builder("Tree", &drops).build();
    let root = class.exec_constructor(vec![], None).unwrap();
    let child = class.exec_constructor(vec![], None).unwrap();
    root.set_value("child", OnyxValue::Object(child.clone()), None).unwrap();

    root.delete().unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 2);
    assert!(!child.is_valid());
    child.release().unwrap();
    root.release().unwrap();
}

#[test]
fn test_registry_checks_domains_and_names() {
    let registry = ClassRegistry::with_forbidden_domains(FunctionalDomain::FILESYSTEM);
    let files = ClassBuilder::new("File").domain(FunctionalDomain::FILESYSTEM).build();
    assert_eq!(err_name(registry.register(files)), names::CLASS_DOMAIN);

    let base = ClassBuilder::new("Socketish").domain(FunctionalDomain::FILESYSTEM).build();
    let derived = ClassBuilder::new("Derived")
        .base(&base, Access::Public, BaseKind::Normal)
        .build();
    assert!(derived.domain().contains(FunctionalDomain::FILESYSTEM));
    assert_eq!(err_name(registry.register(derived)), names::CLASS_DOMAIN);

    registry.register(ClassBuilder::new("Point").build()).unwrap();
    assert_eq!(
        err_name(registry.register(ClassBuilder::new("Point").build())),
        names::CLASS_ALREADY_DEFINED
    );
    assert_eq!(registry.names(), vec!["Point".to_string()]);
    registry.instantiate("Point", vec![], None).unwrap().release().unwrap();
    assert_eq!(err_name(registry.instantiate("Nope", vec![], None)), names::CALL_ERROR);
}
