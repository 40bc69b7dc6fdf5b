use std::sync::Arc;

use crate::{
    exception::OnyxException,
    iterator::FunctionalIterator,
    types::{list::OnyxList, value::OnyxValue},
};

pub struct ListSource {
    list: Arc<OnyxList>,
    /// Number of elements produced so far.
    produced: usize,
    reverse: bool,
}

impl ListSource {
    pub fn new(list: Arc<OnyxList>, reverse: bool) -> Self {
        ListSource {
            list,
            produced: 0,
            reverse,
        }
    }

    /// Index of the element produced last.
    pub fn index(&self) -> Option<usize> {
        let last = self.produced.checked_sub(1)?;
        if self.reverse {
            Some(self.list.len() - 1 - last)
        } else {
            Some(last)
        }
    }
}

impl FunctionalIterator for ListSource {
    fn get_next(&mut self) -> Result<Option<OnyxValue>, OnyxException> {
        let len = self.list.len();
        if self.produced >= len {
            return Ok(None);
        }
        let index = if self.reverse {
            len - 1 - self.produced
        } else {
            self.produced
        };
        self.produced += 1;
        Ok(self.list.as_slice().get(index).cloned())
    }

    fn release(self: Box<Self>) -> Result<(), OnyxException> {
        OnyxValue::List(self.list).release()
    }
}
