//! 进程内准入后端

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::AdmissionStatus;
use super::backend::AdmissionBackend;
use crate::error::Result;
use crate::order_log::{MemoryOrderLog, OrderLogEntry};

#[derive(Debug)]
struct VoucherSlot {
    stock: i64,
    buyers: HashSet<i64>,
}

/// 进程内准入后端
///
/// 判定、扣减与追加订单流在同一把互斥锁内完成
pub struct MemoryAdmissionBackend {
    slots: Mutex<HashMap<i64, VoucherSlot>>,
    log: Arc<MemoryOrderLog>,
}

impl MemoryAdmissionBackend {
    pub fn new(log: Arc<MemoryOrderLog>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            log,
        }
    }

    /// 已抢购此券的用户数
    pub fn buyer_count(&self, voucher_id: i64) -> usize {
        self.slots
            .lock()
            .get(&voucher_id)
            .map_or(0, |slot| slot.buyers.len())
    }
}

#[async_trait]
impl AdmissionBackend for MemoryAdmissionBackend {
    async fn try_admit(
        &self,
        voucher_id: i64,
        user_id: i64,
        order_id: i64,
    ) -> Result<AdmissionStatus> {
        let mut slots = self.slots.lock();
        // 未预热的券视为无库存
        let Some(slot) = slots.get_mut(&voucher_id) else {
            return Ok(AdmissionStatus::OutOfStock);
        };

        if slot.buyers.contains(&user_id) {
            return Ok(AdmissionStatus::Duplicate);
        }
        if slot.stock <= 0 {
            return Ok(AdmissionStatus::OutOfStock);
        }

        self.log
            .push(OrderLogEntry::new(order_id, user_id, voucher_id).to_field_map());
        slot.stock -= 1;
        slot.buyers.insert(user_id);

        Ok(AdmissionStatus::Ok)
    }

    async fn preload_stock(&self, voucher_id: i64, stock: i32) -> Result<()> {
        self.slots.lock().insert(
            voucher_id,
            VoucherSlot {
                stock: i64::from(stock),
                buyers: HashSet::new(),
            },
        );
        Ok(())
    }

    async fn cached_stock(&self, voucher_id: i64) -> Result<Option<i64>> {
        Ok(self.slots.lock().get(&voucher_id).map(|slot| slot.stock))
    }
}
