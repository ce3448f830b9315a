//! 秒杀服务领域模型

pub mod order;
pub mod voucher;

pub use order::{FulfillOutcome, VoucherOrder};
pub use voucher::SeckillVoucher;
