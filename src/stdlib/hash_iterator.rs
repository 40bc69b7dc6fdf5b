use std::sync::Arc;

use onyx_vm::{
    types::{
        class::{Access, ClassBuilder},
        hash::HashCursor,
        method::MethodVariant,
        typeinfo::TypeInfo,
    },
    OnyxClass, OnyxException, OnyxHash, OnyxValue,
};

use super::{attach, not_on_element, state_method, IteratorState};

/// What `getValue()` produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Yield {
    Value,
    Key,
}

impl Yield {
    fn class_name(self) -> &'static str {
        match self {
            Yield::Value => "HashIterator",
            Yield::Key => "HashKeyIterator",
        }
    }
}

pub(crate) struct HashState {
    hash: OnyxValue,
    cursor: HashCursor,
}

impl HashState {
    fn new(hash: OnyxValue) -> Self {
        HashState {
            hash,
            cursor: HashCursor::new(false),
        }
    }

    fn next(&mut self) -> bool {
        match self.hash.as_hash() {
            Some(hash) => self.cursor.next(hash),
            None => false,
        }
    }

    fn prev(&mut self) -> bool {
        match self.hash.as_hash() {
            Some(hash) => self.cursor.prev(hash),
            None => false,
        }
    }

    fn key(&self) -> Option<&str> {
        self.hash.as_hash().and_then(|h| self.cursor.key(h))
    }

    fn value(&self) -> Option<&OnyxValue> {
        self.hash.as_hash().and_then(|h| self.cursor.value(h))
    }
}

impl IteratorState for HashState {
    fn release(&mut self) -> Result<(), OnyxException> {
        self.cursor.reset();
        std::mem::take(&mut self.hash).release()
    }
}

pub(crate) fn build_class(yields: Yield) -> Arc<OnyxClass> {
    let class_name = yields.class_name();
    let builder = ClassBuilder::new(class_name);
    let id = builder.id();
    let builder = builder.constructor(
        Access::Public,
        MethodVariant::native(vec![TypeInfo::Hash.or_nothing()], move |object, _, args| {
            let hash = match args.first() {
                Some(OnyxValue::Hash(hash)) => OnyxValue::Hash(hash.clone()),
                _ => OnyxValue::from(OnyxHash::new()),
            };
            attach(object, id, class_name, HashState::new(hash))
        }),
    );
    let builder = state_method(builder, class_name, "next", |s: &mut HashState| {
        Ok(OnyxValue::Boolean(s.next()))
    });
    let builder = state_method(builder, class_name, "prev", |s: &mut HashState| {
        Ok(OnyxValue::Boolean(s.prev()))
    });
    let builder = state_method(builder, class_name, "getValue", move |s: &mut HashState| {
        let current = match yields {
            Yield::Value => s.value().cloned(),
            Yield::Key => s.key().map(OnyxValue::from),
        };
        current.ok_or_else(|| not_on_element(class_name, "getValue"))
    });
    let builder = state_method(builder, class_name, "getKey", move |s: &mut HashState| {
        s.key()
            .map(OnyxValue::from)
            .ok_or_else(|| not_on_element(class_name, "getKey"))
    });
    let builder = state_method(builder, class_name, "getKeyValue", move |s: &mut HashState| {
        s.value()
            .cloned()
            .ok_or_else(|| not_on_element(class_name, "getKeyValue"))
    });
    let builder = state_method(builder, class_name, "getValuePair", move |s: &mut HashState| {
        let (Some(key), Some(value)) = (s.key(), s.value()) else {
            return Err(not_on_element(class_name, "getValuePair"));
        };
        let mut pair = OnyxHash::with_capacity(2);
        pair.set_key_value("key", OnyxValue::from(key))?;
        pair.set_key_value("value", value.clone())?;
        Ok(OnyxValue::from(pair))
    });
    let builder = state_method(builder, class_name, "valid", |s: &mut HashState| {
        Ok(OnyxValue::Boolean(s.cursor.is_valid()))
    });
    state_method(builder, class_name, "reset", |s: &mut HashState| {
        s.cursor.reset();
        Ok(OnyxValue::Nothing)
    })
    .build()
}
