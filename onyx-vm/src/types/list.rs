//! Onyx 列表。
//!
//! 可增长的值序列，支持按下标读写（越界写入会用 `Nothing` 填充）、
//! 栈/队列操作、带负偏移语义的 splice/extract，以及多种排序。
//!
//! 排序提供不稳定（快速排序）与稳定（归并排序）两种实现，比较器可以是
//! 宽松比较或脚本可调用值；比较器抛出的第一个异常会终止排序并返回给调用方。

use std::cmp::Ordering;

use crate::{
    collector::{TraceEdge, Traceable},
    exception::{names, ExceptionSink, OnyxException},
    types::value::OnyxValue,
};

#[derive(Clone, Default)]
pub struct OnyxList {
    items: Vec<OnyxValue>,
}

/// How elements are ordered when sorting.
#[derive(Clone, Copy)]
pub enum Comparator<'a> {
    Soft,
    /// A closure or other callable returning `<0`, `0` or `>0`.
    Callable(&'a OnyxValue),
}

impl Comparator<'_> {
    fn compare(&self, a: &OnyxValue, b: &OnyxValue) -> Result<Ordering, OnyxException> {
        match self {
            Comparator::Soft => Ok(a.soft_compare(b)),
            Comparator::Callable(callable) => {
                let result = crate::runtime::call_value(callable, vec![a.clone(), b.clone()])?;
                let order = match &result {
                    OnyxValue::Integer(i) => i.cmp(&0),
                    OnyxValue::Float(f) => f.partial_cmp(&0.0).unwrap_or(Ordering::Equal),
                    other => {
                        let e = sort_error(format!(
                            "the sort comparator returned {} instead of a number",
                            other.type_name()
                        ));
                        result.release()?;
                        return Err(e);
                    }
                };
                result.release()?;
                Ok(order)
            }
        }
    }
}

impl OnyxList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        OnyxList {
            items: Vec::with_capacity(capacity),
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OnyxValue> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[OnyxValue] {
        &self.items
    }

    /// Element at `index`; negative or out-of-range indices yield `None`.
    pub fn retrieve(&self, index: i64) -> Option<&OnyxValue> {
        usize::try_from(index).ok().and_then(|i| self.items.get(i))
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut OnyxValue> {
        self.items.get_mut(index)
    }

    /// Slot at `index`, growing the list with `Nothing` as needed.
    pub fn get_or_create(&mut self, index: usize) -> &mut OnyxValue {
        if index >= self.items.len() {
            self.items.resize(index + 1, OnyxValue::Nothing);
        }
        &mut self.items[index]
    }

    /// Assigns at `index`, growing the list and releasing the previous value.
    pub fn set(&mut self, index: usize, value: OnyxValue) -> Result<(), OnyxException> {
        std::mem::replace(self.get_or_create(index), value).release()
    }

    pub fn push(&mut self, value: OnyxValue) {
        self.items.push(value);
    }

    pub fn pop(&mut self) -> Option<OnyxValue> {
        self.items.pop()
    }

    pub fn shift(&mut self) -> Option<OnyxValue> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    /// Prepends `value`.
    pub fn insert(&mut self, value: OnyxValue) {
        self.items.insert(0, value);
    }

    pub fn insert_at(&mut self, index: usize, value: OnyxValue) {
        let index = index.min(self.items.len());
        self.items.insert(index, value);
    }

    /// Resolves `offset`/`length` into a `start..end` range.
    ///
    /// A negative offset counts from the end; a negative length leaves that
    /// many elements at the end; no length means "to the end".
    fn normalize(&self, offset: i64, length: Option<i64>) -> (usize, usize) {
        let len = self.items.len() as i64;
        let start = if offset < 0 {
            (len + offset).max(0)
        } else {
            offset.min(len)
        };
        let end = match length {
            None => len,
            Some(l) if l < 0 => (len + l).max(start),
            Some(l) => start.saturating_add(l).min(len),
        };
        (start as usize, end as usize)
    }

    fn replacement_items(replacement: Option<OnyxValue>) -> Vec<OnyxValue> {
        match replacement {
            None | Some(OnyxValue::Nothing) => Vec::new(),
            Some(OnyxValue::List(list)) => list.iter().cloned().collect(),
            Some(value) => vec![value],
        }
    }

    /// Removes a range and hands it back; a list replacement is inserted
    /// element by element, any other value as a single element.
    pub fn extract(
        &mut self,
        offset: i64,
        length: Option<i64>,
        replacement: Option<OnyxValue>,
    ) -> OnyxList {
        let (start, end) = self.normalize(offset, length);
        let inserted = Self::replacement_items(replacement);
        let removed: Vec<OnyxValue> = self.items.splice(start..end, inserted).collect();
        OnyxList { items: removed }
    }

    /// Like [`OnyxList::extract`], but the removed elements are released.
    pub fn splice(
        &mut self,
        offset: i64,
        length: Option<i64>,
        replacement: Option<OnyxValue>,
    ) -> Result<(), OnyxException> {
        self.extract(offset, length, replacement).release()
    }

    /// Copy of the elements in `offset`/`length`, using splice conventions.
    pub fn slice(&self, offset: i64, length: Option<i64>) -> OnyxList {
        let (start, end) = self.normalize(offset, length);
        self.items[start..end].iter().cloned().collect()
    }

    pub fn copy_list_from(&mut self, other: &OnyxList) -> Result<(), OnyxException> {
        let old = std::mem::replace(&mut self.items, other.items.clone());
        OnyxList { items: old }.release()
    }

    /// Drops everything past `len`.
    pub fn truncate(&mut self, len: usize) -> Result<(), OnyxException> {
        if len >= self.items.len() {
            return Ok(());
        }
        OnyxList {
            items: self.items.split_off(len),
        }
        .release()
    }

    pub fn contains_soft(&self, value: &OnyxValue) -> bool {
        self.items.iter().any(|item| item.soft_equals(value))
    }

    pub fn reverse(&self) -> OnyxList {
        self.items.iter().rev().cloned().collect()
    }

    fn sorted(
        &self,
        comparator: Comparator<'_>,
        descending: bool,
        stable: bool,
    ) -> Result<OnyxList, OnyxException> {
        let mut compare = |a: &OnyxValue, b: &OnyxValue| -> Result<Ordering, OnyxException> {
            let order = comparator.compare(a, b)?;
            Ok(if descending { order.reverse() } else { order })
        };
        let items = if stable {
            mergesort(self.items.clone(), &mut compare)?
        } else {
            let mut items = self.items.clone();
            quicksort(&mut items, &mut compare)?;
            items
        };
        Ok(OnyxList { items })
    }

    /// Ascending, unstable.
    pub fn sort(&self, comparator: Comparator<'_>) -> Result<OnyxList, OnyxException> {
        self.sorted(comparator, false, false)
    }

    pub fn sort_descending(&self, comparator: Comparator<'_>) -> Result<OnyxList, OnyxException> {
        self.sorted(comparator, true, false)
    }

    /// Ascending; equal elements keep their relative order.
    pub fn sort_stable(&self, comparator: Comparator<'_>) -> Result<OnyxList, OnyxException> {
        self.sorted(comparator, false, true)
    }

    pub fn sort_descending_stable(
        &self,
        comparator: Comparator<'_>,
    ) -> Result<OnyxList, OnyxException> {
        self.sorted(comparator, true, true)
    }

    fn extreme(
        &self,
        comparator: Comparator<'_>,
        wanted: Ordering,
    ) -> Result<Option<OnyxValue>, OnyxException> {
        let mut best: Option<&OnyxValue> = None;
        for item in &self.items {
            let replace = match best {
                None => true,
                Some(current) => comparator.compare(item, current)? == wanted,
            };
            if replace {
                best = Some(item);
            }
        }
        Ok(best.cloned())
    }

    /// Smallest element; the first one wins on ties.
    pub fn min(&self, comparator: Comparator<'_>) -> Result<Option<OnyxValue>, OnyxException> {
        self.extreme(comparator, Ordering::Less)
    }

    /// Largest element; the first one wins on ties.
    pub fn max(&self, comparator: Comparator<'_>) -> Result<Option<OnyxValue>, OnyxException> {
        self.extreme(comparator, Ordering::Greater)
    }

    pub fn release(self) -> Result<(), OnyxException> {
        let mut xsink = ExceptionSink::new();
        for item in self.items {
            xsink.absorb(item.release());
        }
        xsink.into_result()
    }

    pub fn into_vec(self) -> Vec<OnyxValue> {
        self.items
    }
}

type CompareFn<'c> = dyn FnMut(&OnyxValue, &OnyxValue) -> Result<Ordering, OnyxException> + 'c;

fn quicksort(items: &mut [OnyxValue], compare: &mut CompareFn<'_>) -> Result<(), OnyxException> {
    let mut items = items;
    while items.len() > 1 {
        let last = items.len() - 1;
        items.swap(items.len() / 2, last);
        let mut store = 0;
        for i in 0..last {
            if compare(&items[i], &items[last])? == Ordering::Less {
                items.swap(i, store);
                store += 1;
            }
        }
        items.swap(store, last);
        let (left, right) = std::mem::take(&mut items).split_at_mut(store);
        let right = &mut right[1..];
        // recurse into the smaller half, loop on the larger one
        if left.len() < right.len() {
            quicksort(left, compare)?;
            items = right;
        } else {
            quicksort(right, compare)?;
            items = left;
        }
    }
    Ok(())
}

fn mergesort(
    mut items: Vec<OnyxValue>,
    compare: &mut CompareFn<'_>,
) -> Result<Vec<OnyxValue>, OnyxException> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = mergesort(items, compare)?;
    let right = mergesort(right, compare)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_right = match (left.peek(), right.peek()) {
            (Some(a), Some(b)) => compare(b, a)? == Ordering::Less,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };
        if take_right {
            merged.extend(right.next());
        } else {
            merged.extend(left.next());
        }
    }
    Ok(merged)
}

impl Traceable for OnyxList {
    fn collect(&self, edges: &mut Vec<TraceEdge>) {
        for item in &self.items {
            item.collect(edges);
        }
    }
}

impl From<Vec<OnyxValue>> for OnyxList {
    fn from(items: Vec<OnyxValue>) -> Self {
        OnyxList { items }
    }
}

impl FromIterator<OnyxValue> for OnyxList {
    fn from_iter<T: IntoIterator<Item = OnyxValue>>(iter: T) -> Self {
        OnyxList {
            items: iter.into_iter().collect(),
        }
    }
}

impl Extend<OnyxValue> for OnyxList {
    fn extend<T: IntoIterator<Item = OnyxValue>>(&mut self, iter: T) {
        self.items.extend(iter);
    }
}

impl<'a> IntoIterator for &'a OnyxList {
    type Item = &'a OnyxValue;
    type IntoIter = std::slice::Iter<'a, OnyxValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Raised by native comparators that cannot order two values.
pub fn sort_error(desc: impl Into<String>) -> OnyxException {
    OnyxException::new(names::SORT_ERROR, desc)
}
