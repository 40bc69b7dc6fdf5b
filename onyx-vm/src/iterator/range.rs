use crate::{
    exception::{names, OnyxException},
    iterator::FunctionalIterator,
    types::value::OnyxValue,
};

/// Integers from `start` to `stop` inclusive, produced lazily.
///
/// The direction follows from `start` and `stop`; `step` is always positive.
#[derive(Clone, Debug)]
pub struct RangeSource {
    start: i64,
    stop: i64,
    step: i64,
    current: Option<i64>,
    done: bool,
}

impl RangeSource {
    pub fn new(start: i64, stop: i64, step: i64) -> Result<Self, OnyxException> {
        if step < 1 {
            return Err(OnyxException::new(
                names::RANGE_ITERATOR,
                format!("the range step must be greater than zero, got {}", step),
            )
            .with_arg(OnyxValue::Integer(step)));
        }
        Ok(RangeSource {
            start,
            stop,
            step,
            current: None,
            done: false,
        })
    }

    /// The same range walked from `stop` back to `start`.
    pub fn reversed(&self) -> Self {
        RangeSource {
            start: self.stop,
            stop: self.start,
            step: self.step,
            current: None,
            done: false,
        }
    }

    #[inline(always)]
    pub fn is_increasing(&self) -> bool {
        self.start <= self.stop
    }

    /// Moves to the next value; false once the range is exhausted.
    pub fn advance(&mut self) -> bool {
        if self.done {
            return false;
        }
        let next = match self.current {
            None => Some(self.start),
            Some(current) if self.is_increasing() => current
                .checked_add(self.step)
                .filter(|next| *next <= self.stop),
            Some(current) => current
                .checked_sub(self.step)
                .filter(|next| *next >= self.stop),
        };
        match next {
            Some(value) => {
                self.current = Some(value);
                true
            }
            None => {
                self.current = None;
                self.done = true;
                false
            }
        }
    }

    pub fn current(&self) -> Option<i64> {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.done = false;
    }
}

impl FunctionalIterator for RangeSource {
    fn get_next(&mut self) -> Result<Option<OnyxValue>, OnyxException> {
        if self.advance() {
            Ok(self.current.map(OnyxValue::Integer))
        } else {
            Ok(None)
        }
    }
}
