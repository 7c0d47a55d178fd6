//! 许可工作流的纯逻辑部分
//! 状态迁移规则表与可见性判断，不访问存储

pub mod rules;
pub mod visibility;

pub use rules::{authorize, rule_for, Party, TransitionRule};
