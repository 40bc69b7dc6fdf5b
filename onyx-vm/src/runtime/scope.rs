//! 解析期局部变量作用域。
//!
//! 前端在构建语句树时显式地传递一个 [`ParseScope`]：每进入一个语句块就获取一个
//! [`BlockScope`] 守卫，在其中声明的变量只在守卫存活期间可见，守卫析构时自动出栈。
//! 每个变量在执行期对应帧中的一个固定槽位（[`LocalId`]）。

use std::ops::{Deref, DerefMut};

use crate::runtime::statement::{Statement, StatementBlock};

/// Frame slot of a local variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LocalId(pub(crate) usize);

impl LocalId {
    #[inline(always)]
    pub fn slot(&self) -> usize {
        self.0
    }
}

/// Visible local variables of the function being built.
#[derive(Default, Debug)]
pub struct ParseScope {
    visible: Vec<(String, LocalId)>,
    next_slot: usize,
}

impl ParseScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a variable at function level (parameters).
    pub fn declare(&mut self, name: impl Into<String>) -> LocalId {
        let id = LocalId(self.next_slot);
        self.next_slot += 1;
        self.visible.push((name.into(), id));
        id
    }

    /// The innermost visible variable called `name`.
    pub fn resolve(&self, name: &str) -> Option<LocalId> {
        self.visible
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
    }

    pub fn enter_block(&mut self) -> BlockScope<'_> {
        BlockScope {
            mark: self.visible.len(),
            declared: Vec::new(),
            scope: self,
        }
    }

    /// Number of slots a frame for this function needs.
    pub fn frame_size(&self) -> usize {
        self.next_slot
    }
}

/// Guard for one statement block. Variables declared through it disappear from
/// the scope when it is dropped.
pub struct BlockScope<'a> {
    scope: &'a mut ParseScope,
    mark: usize,
    declared: Vec<LocalId>,
}

impl BlockScope<'_> {
    pub fn declare(&mut self, name: impl Into<String>) -> LocalId {
        let id = self.scope.declare(name);
        self.declared.push(id);
        id
    }

    /// Closes the block: its statements plus the variables it owns.
    pub fn finish(mut self, statements: Vec<Statement>) -> StatementBlock {
        StatementBlock::new(statements, std::mem::take(&mut self.declared))
    }
}

impl Deref for BlockScope<'_> {
    type Target = ParseScope;

    fn deref(&self) -> &Self::Target {
        self.scope
    }
}

impl DerefMut for BlockScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.scope
    }
}

impl Drop for BlockScope<'_> {
    fn drop(&mut self) {
        self.scope.visible.truncate(self.mark);
    }
}
