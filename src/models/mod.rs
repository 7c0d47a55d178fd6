//! 数据模型模块
//! 用户与层级、工作许可、风险评估、活动日志

pub mod activity;
pub mod permit;
pub mod risk;
pub mod user;
