use crate::{exception::OnyxException, iterator::FunctionalIterator, types::value::OnyxValue};

/// The source for `Nothing`: exhausted from the start.
pub struct NothingSource;

impl FunctionalIterator for NothingSource {
    fn get_next(&mut self) -> Result<Option<OnyxValue>, OnyxException> {
        Ok(None)
    }
}
