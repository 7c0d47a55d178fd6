//! 工作许可（Permit-to-Work）服务库
//! 许可状态机、风险评估、组织层级与到期清扫

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod notifications;
pub mod repository;
pub mod routes;
pub mod services;
pub mod telemetry;
pub mod workflow;
