use std::sync::Arc;

use onyx_vm::{
    types::{
        class::{Access, ClassBuilder},
        method::MethodVariant,
        typeinfo::TypeInfo,
    },
    OnyxClass, OnyxException, OnyxValue,
};

use super::{attach, not_on_element, state_method, IteratorState};

const CLASS_NAME: &str = "SingleValueIterator";

pub(crate) struct SingleState {
    value: OnyxValue,
    on_value: bool,
}

impl SingleState {
    /// True exactly once between resets.
    fn next(&mut self) -> bool {
        self.on_value = !self.on_value;
        self.on_value
    }
}

impl IteratorState for SingleState {
    fn release(&mut self) -> Result<(), OnyxException> {
        self.on_value = false;
        std::mem::take(&mut self.value).release()
    }
}

pub(crate) fn build_class() -> Arc<OnyxClass> {
    let builder = ClassBuilder::new(CLASS_NAME);
    let id = builder.id();
    let builder = builder.constructor(
        Access::Public,
        MethodVariant::native(vec![TypeInfo::Any], move |object, _, args| {
            let value = args.first().cloned().unwrap_or_default();
            attach(
                object,
                id,
                CLASS_NAME,
                SingleState {
                    value,
                    on_value: false,
                },
            )
        }),
    );
    let builder = state_method(builder, CLASS_NAME, "next", |s: &mut SingleState| {
        Ok(OnyxValue::Boolean(s.next()))
    });
    let builder = state_method(builder, CLASS_NAME, "getValue", |s: &mut SingleState| {
        if s.on_value {
            Ok(s.value.clone())
        } else {
            Err(not_on_element(CLASS_NAME, "getValue"))
        }
    });
    let builder = state_method(builder, CLASS_NAME, "valid", |s: &mut SingleState| {
        Ok(OnyxValue::Boolean(s.on_value))
    });
    state_method(builder, CLASS_NAME, "reset", |s: &mut SingleState| {
        s.on_value = false;
        Ok(OnyxValue::Nothing)
    })
    .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yields_once_per_pass() {
        let mut s = SingleState {
            value: OnyxValue::from("x"),
            on_value: false,
        };
        assert!(s.next());
        assert!(!s.next());
        assert!(s.next());
        s.release().unwrap();
    }
}
