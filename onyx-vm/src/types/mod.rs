//! Onyx 运行时核心类型模块。
//!
//! # 子模块
//! - `value`：动态值及其转换、比较与释放
//! - `hash` / `list`：有序哈希与列表容器
//! - `object`：对象实例、引用计数、成员与私有数据
//! - `class`：类描述、构建器与注册表
//! - `method`：方法与重载变体
//! - `typeinfo`：参数与成员的类型约束
//! - `closure`：闭包

pub mod class;
pub mod closure;
pub mod hash;
pub mod list;
pub mod method;
pub mod object;
pub mod typeinfo;
pub mod value;
