//! 全局唯一订单 ID
//!
//! ID 布局（64 位有符号整数）：
//!
//! ```text
//! | 1 bit 符号位(0) | 31 bit 相对时间戳（秒） | 32 bit 当日序列号 |
//! ```
//!
//! 序列号来自按前缀、按天分片的原子计数器，同一秒内的 ID 由计数器保证唯一

pub mod counter;
pub mod generator;

pub use counter::{MemorySequenceCounter, RedisSequenceCounter, SequenceCounter};
pub use generator::{BEGIN_TIMESTAMP, COUNT_BITS, IdGenerator};
