//! 分布式锁模块
//!
//! 锁值为持有者 token，只有持有者才能释放；租约到期后锁自动失效

pub mod lock_manager;
pub mod store;

pub use lock_manager::{LockConfig, LockGuard, LockManager};
pub use store::{LockStore, MemoryLockStore, RedisLockStore};
