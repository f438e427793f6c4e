use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::SniperError;
use crate::domain::positions::{Position, PositionStatus};
use crate::domain::repositories::PositionRepository;
use crate::infrastructure::persistence::database::Database;

pub struct SqlitePositionRepository {
    database: Database,
}

impl SqlitePositionRepository {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    fn store_err(e: impl std::fmt::Display) -> SniperError {
        SniperError::Store(e.to_string())
    }

    fn decode(state_data: &str) -> Result<Position, SniperError> {
        serde_json::from_str(state_data)
            .map_err(|e| SniperError::Store(format!("corrupt position payload: {e}")))
    }
}

#[async_trait]
impl PositionRepository for SqlitePositionRepository {
    async fn create(&self, position: &Position) -> Result<(), SniperError> {
        let payload = serde_json::to_string(position).map_err(Self::store_err)?;
        sqlx::query(
            r#"
            INSERT INTO positions (
                id, order_id, user_id, token_mint, status,
                state_data, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(position.id.to_string())
        .bind(position.order_id.to_string())
        .bind(&position.user_id)
        .bind(position.token_mint.to_string())
        .bind(position.status.to_string())
        .bind(payload)
        .bind(position.opened_at.timestamp_millis())
        .bind(position.updated_at.timestamp_millis())
        .execute(&self.database.pool)
        .await
        .map_err(Self::store_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Position>, SniperError> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT state_data FROM positions WHERE id = $1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.database.pool)
        .await
        .map_err(Self::store_err)?;
        row.map(|(p,)| Self::decode(&p)).transpose()
    }

    async fn get_by_order(&self, order_id: Uuid) -> Result<Option<Position>, SniperError> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT state_data FROM positions WHERE order_id = $1",
        )
        .bind(order_id.to_string())
        .fetch_optional(&self.database.pool)
        .await
        .map_err(Self::store_err)?;
        row.map(|(p,)| Self::decode(&p)).transpose()
    }

    async fn update(&self, position: &Position) -> Result<(), SniperError> {
        let payload = serde_json::to_string(position).map_err(Self::store_err)?;
        let result = sqlx::query(
            r#"
            UPDATE positions
            SET status = $1, state_data = $2, updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(position.status.to_string())
        .bind(payload)
        .bind(position.updated_at.timestamp_millis())
        .bind(position.id.to_string())
        .execute(&self.database.pool)
        .await
        .map_err(Self::store_err)?;

        if result.rows_affected() == 0 {
            return Err(SniperError::PositionNotFound(position.id));
        }
        Ok(())
    }

    async fn find_by_status(
        &self,
        status: PositionStatus,
    ) -> Result<Vec<Position>, SniperError> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT state_data FROM positions WHERE status = $1 ORDER BY created_at",
        )
        .bind(status.to_string())
        .fetch_all(&self.database.pool)
        .await
        .map_err(Self::store_err)?;
        rows.iter().map(|(p,)| Self::decode(p)).collect()
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: PositionStatus,
        to: PositionStatus,
    ) -> Result<bool, SniperError> {
        // CAS on the status column serializes competing exits; the
        // JSON payload is brought in line by the caller's update.
        let result = sqlx::query(
            r#"
            UPDATE positions
            SET status = $1,
                state_data = json_set(state_data, '$.status', $1)
            WHERE id = $2 AND status = $3
            "#,
        )
        .bind(to.to_string())
        .bind(id.to_string())
        .bind(from.to_string())
        .execute(&self.database.pool)
        .await
        .map_err(Self::store_err)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::signature::Signature;

    async fn repo() -> SqlitePositionRepository {
        SqlitePositionRepository::new(Database::in_memory().await.unwrap())
    }

    fn position() -> Position {
        Position {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            user_id: "user-1".into(),
            token_mint: Pubkey::new_unique(),
            wallet: Pubkey::new_unique(),
            entry_signature: Signature::default(),
            amount_in: 1_000_000,
            amount_out: 5_000_000,
            entry_price_impact_pct: 0.3,
            current_balance: 5_000_000,
            take_profit_pct: Some(50.0),
            stop_loss_pct: Some(20.0),
            trailing_stop_pct: None,
            highest_price_seen: None,
            status: PositionStatus::Open,
            exit_signature: None,
            realized_pnl: None,
            opened_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_round_trip_and_order_lookup() {
        let repo = repo().await;
        let position = position();
        repo.create(&position).await.unwrap();

        let by_id = repo.get(position.id).await.unwrap().unwrap();
        assert_eq!(by_id.amount_out, 5_000_000);

        let by_order = repo.get_by_order(position.order_id).await.unwrap().unwrap();
        assert_eq!(by_order.id, position.id);
    }

    #[tokio::test]
    async fn test_at_most_one_position_per_order() {
        let repo = repo().await;
        let position = position();
        repo.create(&position).await.unwrap();

        let mut duplicate = position.clone();
        duplicate.id = Uuid::new_v4();
        assert!(repo.create(&duplicate).await.is_err());
    }

    #[tokio::test]
    async fn test_transition_status_is_compare_and_set() {
        let repo = repo().await;
        let position = position();
        repo.create(&position).await.unwrap();

        assert!(repo
            .transition_status(position.id, PositionStatus::Open, PositionStatus::Exiting)
            .await
            .unwrap());
        // Second contender loses the race.
        assert!(!repo
            .transition_status(position.id, PositionStatus::Open, PositionStatus::Exiting)
            .await
            .unwrap());

        // And the stored payload agrees with the column.
        let loaded = repo.get(position.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, PositionStatus::Exiting);
    }

    #[tokio::test]
    async fn test_find_by_status_scans_open_book() {
        let repo = repo().await;
        for _ in 0..3 {
            repo.create(&position()).await.unwrap();
        }
        let mut closed = position();
        closed.status = PositionStatus::Closed;
        repo.create(&closed).await.unwrap();

        assert_eq!(
            repo.find_by_status(PositionStatus::Open).await.unwrap().len(),
            3
        );
        assert_eq!(
            repo.find_by_status(PositionStatus::Closed).await.unwrap().len(),
            1
        );
    }
}
