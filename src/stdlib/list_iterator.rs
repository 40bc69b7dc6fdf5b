use std::sync::Arc;

use onyx_vm::{
    types::{
        class::{Access, ClassBuilder},
        method::MethodVariant,
        typeinfo::TypeInfo,
    },
    OnyxClass, OnyxException, OnyxList, OnyxValue,
};

use super::{attach, not_on_element, state_method, IteratorState};

const CLASS_NAME: &str = "ListIterator";

pub(crate) struct ListState {
    list: OnyxValue,
    pos: Option<usize>,
}

impl ListState {
    fn new(list: OnyxValue) -> Self {
        ListState { list, pos: None }
    }

    fn len(&self) -> usize {
        self.list.as_list().map_or(0, |l| l.len())
    }

    fn next(&mut self) -> bool {
        let len = self.len();
        self.pos = match self.pos {
            None if len > 0 => Some(0),
            Some(i) if i + 1 < len => Some(i + 1),
            _ => None,
        };
        self.pos.is_some()
    }

    fn prev(&mut self) -> bool {
        let len = self.len();
        self.pos = match self.pos {
            None if len > 0 => Some(len - 1),
            Some(i) if i > 0 => Some(i - 1),
            _ => None,
        };
        self.pos.is_some()
    }

    fn current(&self) -> Option<&OnyxValue> {
        let pos = self.pos?;
        self.list.as_list().and_then(|l| l.retrieve(pos as i64))
    }
}

impl IteratorState for ListState {
    fn release(&mut self) -> Result<(), OnyxException> {
        self.pos = None;
        std::mem::take(&mut self.list).release()
    }
}

pub(crate) fn build_class() -> Arc<OnyxClass> {
    let builder = ClassBuilder::new(CLASS_NAME);
    let id = builder.id();
    let builder = builder.constructor(
        Access::Public,
        MethodVariant::native(vec![TypeInfo::List.or_nothing()], move |object, _, args| {
            let list = match args.first() {
                Some(OnyxValue::List(list)) => OnyxValue::List(list.clone()),
                _ => OnyxValue::from(OnyxList::new()),
            };
            attach(object, id, CLASS_NAME, ListState::new(list))
        }),
    );
    let builder = state_method(builder, CLASS_NAME, "next", |s: &mut ListState| {
        Ok(OnyxValue::Boolean(s.next()))
    });
    let builder = state_method(builder, CLASS_NAME, "prev", |s: &mut ListState| {
        Ok(OnyxValue::Boolean(s.prev()))
    });
    let builder = state_method(builder, CLASS_NAME, "getValue", |s: &mut ListState| {
        s.current()
            .cloned()
            .ok_or_else(|| not_on_element(CLASS_NAME, "getValue"))
    });
    let builder = state_method(builder, CLASS_NAME, "index", |s: &mut ListState| {
        Ok(OnyxValue::Integer(s.pos.map_or(-1, |p| p as i64)))
    });
    let builder = state_method(builder, CLASS_NAME, "valid", |s: &mut ListState| {
        Ok(OnyxValue::Boolean(s.pos.is_some()))
    });
    let builder = state_method(builder, CLASS_NAME, "length", |s: &mut ListState| {
        Ok(OnyxValue::Integer(s.len() as i64))
    });
    state_method(builder, CLASS_NAME, "reset", |s: &mut ListState| {
        s.pos = None;
        Ok(OnyxValue::Nothing)
    })
    .build()
}
