use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::SniperError;
use crate::domain::orders::{Order, OrderState};
use crate::domain::repositories::OrderRepository;
use crate::infrastructure::persistence::database::Database;

pub struct SqliteOrderRepository {
    database: Database,
}

impl SqliteOrderRepository {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    fn store_err(e: impl std::fmt::Display) -> SniperError {
        SniperError::Store(e.to_string())
    }

    fn decode(state_data: &str) -> Result<Order, SniperError> {
        serde_json::from_str(state_data)
            .map_err(|e| SniperError::Store(format!("corrupt order payload: {e}")))
    }
}

#[async_trait]
impl OrderRepository for SqliteOrderRepository {
    async fn create(&self, order: &Order) -> Result<(), SniperError> {
        let payload = serde_json::to_string(order).map_err(Self::store_err)?;
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, token_mint, state, retry_count,
                claimed_by, state_data, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, NULL, $6, $7, $8)
            "#,
        )
        .bind(order.id.to_string())
        .bind(&order.user_id)
        .bind(order.config.token_mint.to_string())
        .bind(order.state.to_string())
        .bind(order.retry_count as i64)
        .bind(payload)
        .bind(order.created_at.timestamp_millis())
        .bind(order.updated_at.timestamp_millis())
        .execute(&self.database.pool)
        .await
        .map_err(Self::store_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, SniperError> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT state_data FROM orders WHERE id = $1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.database.pool)
        .await
        .map_err(Self::store_err)?;

        row.map(|(payload,)| Self::decode(&payload)).transpose()
    }

    async fn update(&self, order: &Order) -> Result<(), SniperError> {
        let payload = serde_json::to_string(order).map_err(Self::store_err)?;
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET state = $1, retry_count = $2, state_data = $3, updated_at = $4
            WHERE id = $5
            "#,
        )
        .bind(order.state.to_string())
        .bind(order.retry_count as i64)
        .bind(payload)
        .bind(order.updated_at.timestamp_millis())
        .bind(order.id.to_string())
        .execute(&self.database.pool)
        .await
        .map_err(Self::store_err)?;

        if result.rows_affected() == 0 {
            return Err(SniperError::OrderNotFound(order.id));
        }
        Ok(())
    }

    async fn claim(&self, id: Uuid, claimant: &str) -> Result<bool, SniperError> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET claimed_by = $1
            WHERE id = $2 AND (claimed_by IS NULL OR claimed_by = $1)
            "#,
        )
        .bind(claimant)
        .bind(id.to_string())
        .execute(&self.database.pool)
        .await
        .map_err(Self::store_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn release(&self, id: Uuid, claimant: &str) -> Result<(), SniperError> {
        sqlx::query(
            "UPDATE orders SET claimed_by = NULL WHERE id = $1 AND claimed_by = $2",
        )
        .bind(id.to_string())
        .bind(claimant)
        .execute(&self.database.pool)
        .await
        .map_err(Self::store_err)?;
        Ok(())
    }

    async fn find_by_state(&self, state: OrderState) -> Result<Vec<Order>, SniperError> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT state_data FROM orders WHERE state = $1 ORDER BY created_at",
        )
        .bind(state.to_string())
        .fetch_all(&self.database.pool)
        .await
        .map_err(Self::store_err)?;

        rows.iter().map(|(p,)| Self::decode(p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::orders::OrderConfig;
    use solana_sdk::pubkey::Pubkey;

    async fn repo() -> SqliteOrderRepository {
        SqliteOrderRepository::new(Database::in_memory().await.unwrap())
    }

    fn order() -> Order {
        Order::new("user-1", OrderConfig::new(Pubkey::new_unique(), 1_000_000))
    }

    #[tokio::test]
    async fn test_round_trip_preserves_order() {
        let repo = repo().await;
        let order = order();
        repo.create(&order).await.unwrap();

        let loaded = repo.get(order.id).await.unwrap().expect("stored order");
        assert_eq!(loaded.id, order.id);
        assert_eq!(loaded.state, OrderState::Pending);
        assert_eq!(loaded.config.token_mint, order.config.token_mint);
        assert_eq!(loaded.config.amount_in, 1_000_000);
    }

    #[tokio::test]
    async fn test_update_persists_transition() {
        let repo = repo().await;
        let mut order = order();
        repo.create(&order).await.unwrap();

        order.transition(OrderState::Validated).unwrap();
        repo.update(&order).await.unwrap();

        let loaded = repo.get(order.id).await.unwrap().unwrap();
        assert_eq!(loaded.state, OrderState::Validated);
        assert!(repo.find_by_state(OrderState::Pending).await.unwrap().is_empty());
        assert_eq!(repo.find_by_state(OrderState::Validated).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_claim_is_exclusive_and_reentrant() {
        let repo = repo().await;
        let order = order();
        repo.create(&order).await.unwrap();

        assert!(repo.claim(order.id, "pipeline-a").await.unwrap());
        // Re-entrant for the same claimant, exclusive otherwise.
        assert!(repo.claim(order.id, "pipeline-a").await.unwrap());
        assert!(!repo.claim(order.id, "pipeline-b").await.unwrap());

        repo.release(order.id, "pipeline-a").await.unwrap();
        assert!(repo.claim(order.id, "pipeline-b").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_order_reads_none() {
        let repo = repo().await;
        assert!(repo.get(Uuid::new_v4()).await.unwrap().is_none());
    }
}
