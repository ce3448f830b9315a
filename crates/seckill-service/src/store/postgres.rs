//! PostgreSQL 存储

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument};

use super::OrderStore;
use crate::error::Result;
use crate::models::{FulfillOutcome, SeckillVoucher, VoucherOrder};

/// PostgreSQL 券与订单存储
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn save_voucher(&self, voucher: &SeckillVoucher) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tb_seckill_voucher (voucher_id, stock, begin_time, end_time, create_time, update_time)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (voucher_id) DO UPDATE
            SET stock = EXCLUDED.stock,
                begin_time = EXCLUDED.begin_time,
                end_time = EXCLUDED.end_time,
                update_time = EXCLUDED.update_time
            "#,
        )
        .bind(voucher.voucher_id)
        .bind(voucher.stock)
        .bind(voucher.begin_time)
        .bind(voucher.end_time)
        .bind(voucher.create_time)
        .bind(voucher.update_time)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_voucher(&self, voucher_id: i64) -> Result<Option<SeckillVoucher>> {
        let voucher = sqlx::query_as::<_, SeckillVoucher>(
            r#"
            SELECT voucher_id, stock, begin_time, end_time, create_time, update_time
            FROM tb_seckill_voucher
            WHERE voucher_id = $1
            "#,
        )
        .bind(voucher_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(voucher)
    }

    async fn find_order(&self, user_id: i64, voucher_id: i64) -> Result<Option<VoucherOrder>> {
        let order = sqlx::query_as::<_, VoucherOrder>(
            r#"
            SELECT id, user_id, voucher_id, create_time
            FROM tb_voucher_order
            WHERE user_id = $1 AND voucher_id = $2
            "#,
        )
        .bind(user_id)
        .bind(voucher_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    async fn get_order(&self, order_id: i64) -> Result<Option<VoucherOrder>> {
        let order = sqlx::query_as::<_, VoucherOrder>(
            r#"
            SELECT id, user_id, voucher_id, create_time
            FROM tb_voucher_order
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    #[instrument(skip(self, order), fields(order_id = order.id, user_id = order.user_id, voucher_id = order.voucher_id))]
    async fn create_order(&self, order: &VoucherOrder) -> Result<FulfillOutcome> {
        let mut tx = self.pool.begin().await?;

        // 一人一单：重复投递的消息在这里被识别
        let existing: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM tb_voucher_order
            WHERE user_id = $1 AND voucher_id = $2
            "#,
        )
        .bind(order.user_id)
        .bind(order.voucher_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(existing_id) = existing {
            tx.rollback().await?;
            debug!(existing_id, "Order already exists");
            return Ok(FulfillOutcome::AlreadyExists);
        }

        // 条件扣减，数据库真实库存不会变为负数
        let updated = sqlx::query(
            r#"
            UPDATE tb_seckill_voucher
            SET stock = stock - 1, update_time = NOW()
            WHERE voucher_id = $1 AND stock > 0
            "#,
        )
        .bind(order.voucher_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(FulfillOutcome::StockExhausted);
        }

        // 唯一约束兜底：并发写入同一用户或同一订单号时插入 0 行，回滚扣减
        let inserted = sqlx::query(
            r#"
            INSERT INTO tb_voucher_order (id, user_id, voucher_id, create_time)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.voucher_id)
        .bind(order.create_time)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(FulfillOutcome::AlreadyExists);
        }

        tx.commit().await?;
        Ok(FulfillOutcome::Created)
    }
}
