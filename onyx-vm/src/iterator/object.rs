use crate::{
    exception::{merge_outcome, names, ExceptionSink, OnyxException},
    iterator::FunctionalIterator,
    types::{
        class::{has_private_access, Access, FoundMethod, OnyxClass},
        object::ObjectRef,
        value::OnyxValue,
    },
};

/// Drives a script or native iterator object through `next()` (or `prev()`)
/// and `getValue()`. The methods are resolved once, when the loop starts.
pub struct ObjectIteratorSource {
    object: ObjectRef,
    advance: FoundMethod,
    get_value: FoundMethod,
}

impl ObjectIteratorSource {
    /// An object counts as an iterator when it has `next()` and `getValue()`.
    pub fn is_iterator(object: &ObjectRef) -> bool {
        let class = object.class();
        class.find_method("next").is_some() && class.find_method("getValue").is_some()
    }

    pub fn new(
        object: ObjectRef,
        op: &str,
        caller: Option<&OnyxClass>,
        reverse: bool,
    ) -> Result<Self, OnyxException> {
        let step = if reverse { "prev" } else { "next" };
        let resolved = Self::resolve(&object, step, op, caller)
            .and_then(|advance| Ok((advance, Self::resolve(&object, "getValue", op, caller)?)));
        match resolved {
            Ok((advance, get_value)) => Ok(ObjectIteratorSource {
                object,
                advance,
                get_value,
            }),
            Err(e) => {
                let mut xsink = ExceptionSink::new();
                xsink.absorb(object.release());
                merge_outcome(Err(e), xsink)
            }
        }
    }

    fn resolve(
        object: &ObjectRef,
        name: &str,
        op: &str,
        caller: Option<&OnyxClass>,
    ) -> Result<FoundMethod, OnyxException> {
        let class = object.class();
        let Some(found) = class.find_method(name) else {
            return Err(OnyxException::new(
                names::iterator_error(op),
                format!(
                    "class {} cannot be iterated with {}: it has no {}() method",
                    class.name(),
                    op.to_ascii_lowercase(),
                    name
                ),
            ));
        };
        // iteration calls take no arguments, so the zero-argument variant decides
        let access = match found.method.resolve(found.class.name(), &[]) {
            Ok(variant) => found.variant_access(variant),
            Err(_) => found.access,
        };
        if access == Access::Private && !has_private_access(caller, found.class.id()) {
            return Err(OnyxException::new(
                names::iterator_error(op),
                format!(
                    "{}::{}() is private and cannot be used by {} here",
                    found.class.name(),
                    name,
                    op.to_ascii_lowercase()
                ),
            ));
        }
        Ok(found)
    }
}

impl FunctionalIterator for ObjectIteratorSource {
    fn get_next(&mut self) -> Result<Option<OnyxValue>, OnyxException> {
        let more = self.object.exec_found(&self.advance, Vec::new())?;
        let proceed = more.to_bool();
        more.release()?;
        if !proceed {
            return Ok(None);
        }
        self.object.exec_found(&self.get_value, Vec::new()).map(Some)
    }

    fn release(self: Box<Self>) -> Result<(), OnyxException> {
        self.object.release()
    }
}
