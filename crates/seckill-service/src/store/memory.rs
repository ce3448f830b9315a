//! 进程内存储
//!
//! 事务语义由单把互斥锁提供；支持注入瞬时故障，用于验证 Worker 的重试行为

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::OrderStore;
use crate::error::{Result, SeckillError};
use crate::models::{FulfillOutcome, SeckillVoucher, VoucherOrder};

#[derive(Debug, Default)]
struct StoreState {
    vouchers: HashMap<i64, SeckillVoucher>,
    /// 订单 ID → 订单
    orders: HashMap<i64, VoucherOrder>,
}

/// 进程内券与订单存储
#[derive(Default)]
pub struct MemoryOrderStore {
    state: Mutex<StoreState>,
    failures_remaining: AtomicUsize,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接下来的 `count` 次 `create_order` 返回连接池超时
    pub fn fail_next_writes(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// 当前数据库库存
    pub fn stock_of(&self, voucher_id: i64) -> Option<i32> {
        self.state
            .lock()
            .vouchers
            .get(&voucher_id)
            .map(|voucher| voucher.stock)
    }

    /// 某张券的订单数
    pub fn order_count(&self, voucher_id: i64) -> usize {
        self.state
            .lock()
            .orders
            .values()
            .filter(|order| order.voucher_id == voucher_id)
            .count()
    }

    fn take_injected_failure(&self) -> bool {
        self.failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn save_voucher(&self, voucher: &SeckillVoucher) -> Result<()> {
        self.state
            .lock()
            .vouchers
            .insert(voucher.voucher_id, voucher.clone());
        Ok(())
    }

    async fn get_voucher(&self, voucher_id: i64) -> Result<Option<SeckillVoucher>> {
        Ok(self.state.lock().vouchers.get(&voucher_id).cloned())
    }

    async fn find_order(&self, user_id: i64, voucher_id: i64) -> Result<Option<VoucherOrder>> {
        Ok(self
            .state
            .lock()
            .orders
            .values()
            .find(|order| order.user_id == user_id && order.voucher_id == voucher_id)
            .cloned())
    }

    async fn get_order(&self, order_id: i64) -> Result<Option<VoucherOrder>> {
        Ok(self.state.lock().orders.get(&order_id).cloned())
    }

    async fn create_order(&self, order: &VoucherOrder) -> Result<FulfillOutcome> {
        if self.take_injected_failure() {
            return Err(SeckillError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut state = self.state.lock();

        let duplicate = state.orders.contains_key(&order.id)
            || state
                .orders
                .values()
                .any(|o| o.user_id == order.user_id && o.voucher_id == order.voucher_id);
        if duplicate {
            return Ok(FulfillOutcome::AlreadyExists);
        }

        match state.vouchers.get_mut(&order.voucher_id) {
            Some(voucher) if voucher.stock > 0 => voucher.stock -= 1,
            _ => return Ok(FulfillOutcome::StockExhausted),
        }

        state.orders.insert(order.id, order.clone());
        Ok(FulfillOutcome::Created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    async fn store_with_voucher(stock: i32) -> MemoryOrderStore {
        let now = Utc::now();
        let store = MemoryOrderStore::new();
        store
            .save_voucher(&SeckillVoucher::new(
                7,
                stock,
                now - Duration::hours(1),
                now + Duration::hours(1),
            ))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_create_order_decrements_stock() {
        let store = store_with_voucher(2).await;

        let outcome = store.create_order(&VoucherOrder::new(1, 1010, 7)).await.unwrap();

        assert_eq!(outcome, FulfillOutcome::Created);
        assert_eq!(store.stock_of(7), Some(1));
        assert!(store.find_order(1010, 7).await.unwrap().is_some());
        assert_eq!(store.get_order(1).await.unwrap().unwrap().user_id, 1010);
    }

    #[tokio::test]
    async fn test_redelivery_does_not_decrement_twice() {
        let store = store_with_voucher(2).await;
        let order = VoucherOrder::new(1, 1010, 7);

        store.create_order(&order).await.unwrap();
        let outcome = store.create_order(&order).await.unwrap();

        assert_eq!(outcome, FulfillOutcome::AlreadyExists);
        assert_eq!(store.stock_of(7), Some(1));
        assert_eq!(store.order_count(7), 1);
    }

    #[tokio::test]
    async fn test_exhausted_stock_leaves_no_order() {
        let store = store_with_voucher(0).await;

        let outcome = store.create_order(&VoucherOrder::new(1, 1010, 7)).await.unwrap();

        assert_eq!(outcome, FulfillOutcome::StockExhausted);
        assert_eq!(store.stock_of(7), Some(0));
        assert_eq!(store.order_count(7), 0);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = store_with_voucher(1).await;
        store.fail_next_writes(2);
        let order = VoucherOrder::new(1, 1010, 7);

        assert!(store.create_order(&order).await.is_err());
        assert!(store.create_order(&order).await.is_err());
        assert_eq!(store.create_order(&order).await.unwrap(), FulfillOutcome::Created);
    }
}
