use std::sync::Arc;

use onyx_vm::{
    iterator::RangeSource,
    types::{
        class::{Access, ClassBuilder, ClassId},
        method::MethodVariant,
        typeinfo::TypeInfo,
    },
    ObjectRef, OnyxClass, OnyxException, OnyxValue,
};

use super::{attach, not_on_element, state_method, IteratorState};

const CLASS_NAME: &str = "RangeIterator";

pub(crate) struct RangeState(RangeSource);

impl IteratorState for RangeState {
    fn release(&mut self) -> Result<(), OnyxException> {
        Ok(())
    }
}

fn construct(object: &ObjectRef, id: ClassId, args: &[OnyxValue]) -> Result<OnyxValue, OnyxException> {
    let int = |i: usize| args.get(i).map(OnyxValue::to_int);
    let (start, stop) = (int(0).unwrap_or(0), int(1).unwrap_or(0));
    let source = RangeSource::new(start, stop, int(2).unwrap_or(1))?;
    attach(object, id, CLASS_NAME, RangeState(source))
}

pub(crate) fn build_class() -> Arc<OnyxClass> {
    let builder = ClassBuilder::new(CLASS_NAME);
    let id = builder.id();
    let builder = builder
        .constructor(
            Access::Public,
            MethodVariant::native(vec![TypeInfo::Int, TypeInfo::Int], move |object, _, args| {
                construct(object, id, args)
            }),
        )
        .constructor(
            Access::Public,
            MethodVariant::native(
                vec![TypeInfo::Int, TypeInfo::Int, TypeInfo::Int],
                move |object, _, args| construct(object, id, args),
            ),
        );
    let builder = state_method(builder, CLASS_NAME, "next", |s: &mut RangeState| {
        Ok(OnyxValue::Boolean(s.0.advance()))
    });
    let builder = state_method(builder, CLASS_NAME, "getValue", |s: &mut RangeState| {
        s.0.current()
            .map(OnyxValue::Integer)
            .ok_or_else(|| not_on_element(CLASS_NAME, "getValue"))
    });
    let builder = state_method(builder, CLASS_NAME, "valid", |s: &mut RangeState| {
        Ok(OnyxValue::Boolean(s.0.current().is_some()))
    });
    state_method(builder, CLASS_NAME, "reset", |s: &mut RangeState| {
        s.0.reset();
        Ok(OnyxValue::Nothing)
    })
    .build()
}
