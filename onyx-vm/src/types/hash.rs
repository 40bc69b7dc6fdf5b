//! Onyx 有序哈希表。
//!
//! 以插入顺序保存键值对，键为字符串。底层使用 `IndexMap` 同时提供按键查找与有序遍历。
//!
//! # 主要功能
//! - 键查找、创建、赋值（支持按指定编码转换键）
//! - 删除语义：`delete_key` 会显式删除对象值，`remove_key` 只释放引用
//! - 合并、切片、复制、宽松/严格比较
//! - 双向游标迭代（正向/反向、只读/可变），支持删除当前元素
//!
//! 注意：删除操作基于 `shift_remove`，复杂度为 O(n)，以保持其余键的顺序。

use encoding_rs::Encoding;
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;

use crate::{
    collector::{TraceEdge, Traceable},
    exception::{names, ExceptionSink, OnyxException},
    types::{list::OnyxList, value::OnyxValue},
};

#[derive(Clone, Default)]
pub struct OnyxHash {
    entries: IndexMap<String, OnyxValue, FxBuildHasher>,
}

impl OnyxHash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        OnyxHash {
            entries: IndexMap::with_capacity_and_hasher(capacity, FxBuildHasher::default()),
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the slot for `key`, appending a `Nothing` entry when absent.
    pub fn get_or_create(&mut self, key: &str) -> &mut OnyxValue {
        let index = match self.entries.get_index_of(key) {
            Some(index) => index,
            None => self.entries.insert_full(key.to_owned(), OnyxValue::Nothing).0,
        };
        &mut self.entries[index]
    }

    #[inline(always)]
    pub fn find(&self, key: &str) -> Option<&OnyxValue> {
        self.entries.get(key)
    }

    pub fn find_mut(&mut self, key: &str) -> Option<&mut OnyxValue> {
        self.entries.get_mut(key)
    }

    pub fn exists_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// True only when the key exists and holds something other than `Nothing`.
    pub fn exists_key_value(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(OnyxValue::exists)
    }

    /// Assigns `value`, releasing whatever the key held before.
    pub fn set_key_value(&mut self, key: &str, value: OnyxValue) -> Result<(), OnyxException> {
        let old = std::mem::replace(self.get_or_create(key), value);
        old.release()
    }

    /// Assigns under a key given in a foreign encoding.
    ///
    /// The hash is left untouched when the key cannot be converted.
    pub fn set_key_value_encoded(
        &mut self,
        key: &[u8],
        encoding: &'static Encoding,
        value: OnyxValue,
    ) -> Result<(), OnyxException> {
        let (decoded, had_errors) = encoding.decode_without_bom_handling(key);
        if had_errors {
            let e = OnyxException::new(
                names::ENCODING_CONVERSION,
                format!("cannot convert hash key from {} to UTF-8", encoding.name()),
            );
            return crate::exception::merge_outcome(Err(e), release_into_sink(value));
        }
        self.set_key_value(&decoded, value)
    }

    /// Removes the key; an object value is explicitly deleted while its entry
    /// is still in place.
    pub fn delete_key(&mut self, key: &str) -> Result<(), OnyxException> {
        let mut xsink = delete_in_place(self.entries.get(key));
        if let Some(value) = self.entries.shift_remove(key) {
            xsink.absorb(value.release());
        }
        xsink.into_result()
    }

    /// Removes the key and drops the reference without deleting objects.
    pub fn remove_key(&mut self, key: &str) -> Result<(), OnyxException> {
        match self.entries.shift_remove(key) {
            Some(value) => value.release(),
            None => Ok(()),
        }
    }

    /// Removes the key and hands its value to the caller.
    pub fn take_key_value(&mut self, key: &str) -> Option<OnyxValue> {
        self.entries.shift_remove(key)
    }

    /// Copies every entry of `other` into this hash, overwriting equal keys.
    pub fn merge(&mut self, other: &OnyxHash) -> Result<(), OnyxException> {
        let mut xsink = ExceptionSink::new();
        for (key, value) in other.iter() {
            xsink.absorb(self.set_key_value(key, value.clone()));
        }
        xsink.into_result()
    }

    /// Shallow copy: nested containers are shared until written.
    pub fn copy(&self) -> OnyxHash {
        self.clone()
    }

    /// A new hash holding only the listed keys that exist here, in list order.
    pub fn get_slice(&self, keys: &OnyxList) -> OnyxHash {
        let mut slice = OnyxHash::with_capacity(keys.len());
        for key in keys.iter() {
            let key = key.to_string_value();
            if let Some(value) = self.find(&key) {
                *slice.get_or_create(&key) = value.clone();
            }
        }
        slice
    }

    /// Same keys, values equal under soft comparison; order is ignored.
    pub fn compare_soft(&self, other: &OnyxHash) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.find(k).is_some_and(|o| v.soft_equals(o)))
    }

    /// Same keys, values equal under hard comparison; order is ignored.
    pub fn compare_hard(&self, other: &OnyxHash) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.find(k).is_some_and(|o| v.hard_equals(o)))
    }

    pub fn keys(&self) -> OnyxList {
        self.entries
            .keys()
            .map(|k| OnyxValue::from(k.as_str()))
            .collect()
    }

    pub fn keys_vec(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn values(&self) -> impl DoubleEndedIterator<Item = &OnyxValue> {
        self.entries.values()
    }

    pub fn first_key(&self) -> Option<&str> {
        self.entries.first().map(|(k, _)| k.as_str())
    }

    pub fn last_key(&self) -> Option<&str> {
        self.entries.last().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, &OnyxValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get_index(&self, index: usize) -> Option<(&str, &OnyxValue)> {
        self.entries.get_index(index).map(|(k, v)| (k.as_str(), v))
    }

    pub fn const_iter(&self) -> ConstHashIterator<'_> {
        ConstHashIterator::new(self)
    }

    pub fn const_iter_rev(&self) -> ConstHashIterator<'_> {
        ConstHashIterator::reverse(self)
    }

    pub fn cursor(&mut self) -> HashIterator<'_> {
        HashIterator::new(self)
    }

    pub fn cursor_rev(&mut self) -> HashIterator<'_> {
        HashIterator::reverse(self)
    }

    /// Releases every value in insertion order.
    pub fn release(self) -> Result<(), OnyxException> {
        let mut xsink = ExceptionSink::new();
        for (_, value) in self.entries {
            xsink.absorb(value.release());
        }
        xsink.into_result()
    }

    /// Empties the hash, releasing the old values.
    pub fn clear(&mut self) -> Result<(), OnyxException> {
        std::mem::take(self).release()
    }

    /// Releases every value in insertion order, explicitly deleting objects.
    pub fn delete_all(self) -> Result<(), OnyxException> {
        let mut xsink = ExceptionSink::new();
        for (_, value) in self.entries {
            xsink.absorb(value.delete());
        }
        xsink.into_result()
    }

    fn remove_index(&mut self, index: usize) -> Option<(String, OnyxValue)> {
        self.entries.shift_remove_index(index)
    }
}

/// Runs delete semantics on an object value without detaching it.
fn delete_in_place(value: Option<&OnyxValue>) -> ExceptionSink {
    let mut xsink = ExceptionSink::new();
    if let Some(OnyxValue::Object(object)) = value {
        xsink.absorb(object.delete());
    }
    xsink
}

fn release_into_sink(value: OnyxValue) -> ExceptionSink {
    let mut xsink = ExceptionSink::new();
    xsink.absorb(value.release());
    xsink
}

impl Traceable for OnyxHash {
    fn collect(&self, edges: &mut Vec<TraceEdge>) {
        for value in self.entries.values() {
            value.collect(edges);
        }
    }
}

impl FromIterator<(String, OnyxValue)> for OnyxHash {
    fn from_iter<T: IntoIterator<Item = (String, OnyxValue)>>(iter: T) -> Self {
        OnyxHash {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Position of a cursor over a hash. `None` is the sentinel before the first
/// (or, for reverse cursors, after the last) entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HashCursor {
    pos: Option<usize>,
    reverse: bool,
}

impl HashCursor {
    pub fn new(reverse: bool) -> Self {
        HashCursor { pos: None, reverse }
    }

    #[inline(always)]
    pub fn index(&self) -> Option<usize> {
        self.pos
    }

    #[inline(always)]
    pub fn is_valid(&self) -> bool {
        self.pos.is_some()
    }

    pub fn reset(&mut self) {
        self.pos = None;
    }

    fn step_up(&mut self, len: usize) -> bool {
        self.pos = match self.pos {
            None if len > 0 => Some(0),
            Some(i) if i + 1 < len => Some(i + 1),
            _ => None,
        };
        self.pos.is_some()
    }

    fn step_down(&mut self, len: usize) -> bool {
        self.pos = match self.pos {
            None if len > 0 => Some(len - 1),
            Some(i) if i > 0 && i <= len => Some(i - 1),
            _ => None,
        };
        self.pos.is_some()
    }

    /// Advances in iteration order, wrapping through the sentinel.
    pub fn next(&mut self, hash: &OnyxHash) -> bool {
        if self.reverse {
            self.step_down(hash.len())
        } else {
            self.step_up(hash.len())
        }
    }

    /// Moves against iteration order, wrapping through the sentinel.
    pub fn prev(&mut self, hash: &OnyxHash) -> bool {
        if self.reverse {
            self.step_up(hash.len())
        } else {
            self.step_down(hash.len())
        }
    }

    pub fn key<'h>(&self, hash: &'h OnyxHash) -> Option<&'h str> {
        hash.get_index(self.pos?).map(|(k, _)| k)
    }

    pub fn value<'h>(&self, hash: &'h OnyxHash) -> Option<&'h OnyxValue> {
        hash.get_index(self.pos?).map(|(_, v)| v)
    }

    pub fn value_mut<'h>(&self, hash: &'h mut OnyxHash) -> Option<&'h mut OnyxValue> {
        hash.entries.get_index_mut(self.pos?).map(|(_, v)| v)
    }

    /// Removes the current entry and steps back so that the following `next`
    /// lands on the entry after the removed one.
    pub fn remove_current(&mut self, hash: &mut OnyxHash) -> Option<(String, OnyxValue)> {
        let index = self.pos?;
        let removed = hash.remove_index(index)?;
        self.pos = if self.reverse {
            // the entry after the removed one shifted into its index
            (index < hash.len()).then_some(index)
        } else {
            index.checked_sub(1)
        };
        Some(removed)
    }

    /// Like [`HashCursor::remove_current`] with delete semantics for objects.
    pub fn delete_current(&mut self, hash: &mut OnyxHash) -> Result<(), OnyxException> {
        let current = self
            .pos
            .and_then(|index| hash.entries.get_index(index))
            .map(|(_, value)| value);
        let mut xsink = delete_in_place(current);
        if let Some((_, value)) = self.remove_current(hash) {
            xsink.absorb(value.release());
        }
        xsink.into_result()
    }
}

/// Read-only cursor borrowing a hash.
pub struct ConstHashIterator<'a> {
    hash: &'a OnyxHash,
    cursor: HashCursor,
}

impl<'a> ConstHashIterator<'a> {
    pub fn new(hash: &'a OnyxHash) -> Self {
        ConstHashIterator {
            hash,
            cursor: HashCursor::new(false),
        }
    }

    pub fn reverse(hash: &'a OnyxHash) -> Self {
        ConstHashIterator {
            hash,
            cursor: HashCursor::new(true),
        }
    }

    pub fn next(&mut self) -> bool {
        self.cursor.next(self.hash)
    }

    pub fn prev(&mut self) -> bool {
        self.cursor.prev(self.hash)
    }

    pub fn key(&self) -> Option<&'a str> {
        self.cursor.key(self.hash)
    }

    pub fn value(&self) -> Option<&'a OnyxValue> {
        self.cursor.value(self.hash)
    }

    pub fn reset(&mut self) {
        self.cursor.reset();
    }
}

/// Mutable cursor borrowing a hash.
pub struct HashIterator<'a> {
    hash: &'a mut OnyxHash,
    cursor: HashCursor,
}

impl<'a> HashIterator<'a> {
    pub fn new(hash: &'a mut OnyxHash) -> Self {
        HashIterator {
            hash,
            cursor: HashCursor::new(false),
        }
    }

    pub fn reverse(hash: &'a mut OnyxHash) -> Self {
        HashIterator {
            hash,
            cursor: HashCursor::new(true),
        }
    }

    pub fn next(&mut self) -> bool {
        self.cursor.next(self.hash)
    }

    pub fn prev(&mut self) -> bool {
        self.cursor.prev(self.hash)
    }

    pub fn key(&self) -> Option<&str> {
        self.cursor.key(self.hash)
    }

    pub fn value(&self) -> Option<&OnyxValue> {
        self.cursor.value(self.hash)
    }

    pub fn value_mut(&mut self) -> Option<&mut OnyxValue> {
        self.cursor.value_mut(self.hash)
    }

    pub fn assign(&mut self, value: OnyxValue) -> Result<(), OnyxException> {
        match self.value_mut() {
            Some(slot) => std::mem::replace(slot, value).release(),
            None => Err(OnyxException::new(
                names::INVALID_ITERATOR,
                "the hash iterator is not pointing at an entry",
            )),
        }
    }

    pub fn delete_current(&mut self) -> Result<(), OnyxException> {
        self.cursor.delete_current(self.hash)
    }

    pub fn remove_current(&mut self) -> Option<(String, OnyxValue)> {
        self.cursor.remove_current(self.hash)
    }

    pub fn reset(&mut self) {
        self.cursor.reset();
    }
}
