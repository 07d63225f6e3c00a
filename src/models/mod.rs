//! 数据模型模块

pub mod catalog;
pub mod permission;
pub mod role;
pub mod template;
