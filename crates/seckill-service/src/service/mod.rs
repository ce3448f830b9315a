//! 服务层

pub mod voucher_order_service;

pub use voucher_order_service::VoucherOrderService;
