use crate::{exception::OnyxException, iterator::FunctionalIterator, types::value::OnyxValue};

/// Yields one value, then stops.
pub struct SingleValueSource {
    value: Option<OnyxValue>,
}

impl SingleValueSource {
    pub fn new(value: OnyxValue) -> Self {
        SingleValueSource { value: Some(value) }
    }
}

impl FunctionalIterator for SingleValueSource {
    fn get_next(&mut self) -> Result<Option<OnyxValue>, OnyxException> {
        Ok(self.value.take())
    }

    fn release(self: Box<Self>) -> Result<(), OnyxException> {
        match self.value {
            Some(value) => value.release(),
            None => Ok(()),
        }
    }
}
