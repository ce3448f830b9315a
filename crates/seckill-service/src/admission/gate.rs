//! 准入网关
//!
//! 请求线程上唯一的 I/O：生成订单 ID 并执行一次原子准入判定。

use std::sync::Arc;

use seckill_shared::observability::metrics;
use tracing::{debug, instrument};

use super::AdmissionStatus;
use super::backend::AdmissionBackend;
use crate::error::Result;
use crate::id::IdGenerator;

/// 准入结果
///
/// 只有 `status == Ok` 时 `order_id` 才对应一条已写入订单流的下单意图
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub order_id: i64,
    pub status: AdmissionStatus,
}

/// 准入网关
pub struct AdmissionGate {
    ids: Arc<IdGenerator>,
    backend: Arc<dyn AdmissionBackend>,
    id_prefix: String,
}

impl AdmissionGate {
    pub fn new(
        ids: Arc<IdGenerator>,
        backend: Arc<dyn AdmissionBackend>,
        id_prefix: impl Into<String>,
    ) -> Self {
        Self {
            ids,
            backend,
            id_prefix: id_prefix.into(),
        }
    }

    /// 执行准入判定
    ///
    /// 订单 ID 在判定前生成，被拒绝的请求同样消耗一个序列号
    #[instrument(skip(self))]
    pub async fn admit(&self, voucher_id: i64, user_id: i64) -> Result<Admission> {
        let order_id = self.ids.next_id(&self.id_prefix).await?;
        let status = self
            .backend
            .try_admit(voucher_id, user_id, order_id)
            .await?;

        metrics::record_admission(status.as_str());
        debug!(order_id, status = status.as_str(), "Admission decided");

        Ok(Admission { order_id, status })
    }

    /// 预热缓存库存
    pub async fn preload_stock(&self, voucher_id: i64, stock: i32) -> Result<()> {
        self.backend.preload_stock(voucher_id, stock).await
    }

    /// 当前缓存库存
    pub async fn cached_stock(&self, voucher_id: i64) -> Result<Option<i64>> {
        self.backend.cached_stock(voucher_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::backend::MockAdmissionBackend;
    use crate::error::SeckillError;
    use crate::id::MemorySequenceCounter;
    use crate::id::counter::MockSequenceCounter;

    #[tokio::test]
    async fn test_admit_passes_generated_id_to_backend() {
        let mut backend = MockAdmissionBackend::new();
        backend
            .expect_try_admit()
            .withf(|voucher_id, user_id, order_id| {
                *voucher_id == 7 && *user_id == 1010 && IdGenerator::sequence_of(*order_id) == 1
            })
            .times(1)
            .returning(|_, _, _| Ok(AdmissionStatus::Ok));

        let gate = AdmissionGate::new(
            Arc::new(IdGenerator::new(Arc::new(MemorySequenceCounter::new()))),
            Arc::new(backend),
            "order",
        );

        let admission = gate.admit(7, 1010).await.unwrap();
        assert_eq!(admission.status, AdmissionStatus::Ok);
        assert_eq!(IdGenerator::sequence_of(admission.order_id), 1);
    }

    #[tokio::test]
    async fn test_rejection_is_not_an_error() {
        let mut backend = MockAdmissionBackend::new();
        backend
            .expect_try_admit()
            .returning(|_, _, _| Ok(AdmissionStatus::OutOfStock));

        let gate = AdmissionGate::new(
            Arc::new(IdGenerator::new(Arc::new(MemorySequenceCounter::new()))),
            Arc::new(backend),
            "order",
        );

        let admission = gate.admit(7, 1010).await.unwrap();
        assert_eq!(admission.status, AdmissionStatus::OutOfStock);
    }

    #[tokio::test]
    async fn test_id_failure_skips_backend() {
        let mut counter = MockSequenceCounter::new();
        counter
            .expect_increment()
            .returning(|_| Err(SeckillError::Internal("counter down".to_string())));

        let mut backend = MockAdmissionBackend::new();
        backend.expect_try_admit().times(0);

        let gate = AdmissionGate::new(
            Arc::new(IdGenerator::new(Arc::new(counter))),
            Arc::new(backend),
            "order",
        );

        assert!(gate.admit(7, 1010).await.is_err());
    }
}
