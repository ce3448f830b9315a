//! 共享库
//!
//! 包含秒杀服务共用的配置、错误处理、数据库连接、Redis 客户端、可观测性等基础设施代码。

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod observability;
pub mod retry;
pub mod test_utils;
