//! Onyx 语言运行时核心。
//!
//! # 主要功能
//! - 动态值、有序哈希与列表（[`types`]）
//! - 类、方法、私有数据与访问控制；引用计数对象与循环回收（[`collector`]）
//! - 函数式迭代器（[`iterator`]）
//! - 语句树执行（[`runtime`]）

pub(crate) mod collector;
pub mod config;
pub mod exception;
pub mod iterator;
pub mod runtime;
pub mod types;
pub mod utils;

pub use config::RuntimeConfig;
pub use exception::{ExceptionSink, OnyxException};
pub use types::{
    class::{Access, ClassBuilder, ClassRegistry, FunctionalDomain, OnyxClass},
    hash::OnyxHash,
    list::OnyxList,
    object::{ObjectRef, PrivateData},
    value::OnyxValue,
};
