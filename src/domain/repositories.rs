//! Repository traits for the durable order/position store.
//!
//! Orders and positions survive restarts; the SQLite implementations
//! live in `infrastructure::persistence`, with in-memory twins for
//! tests. Pipelines serialize per order through `claim`/`release`.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::SniperError;
use crate::domain::orders::{Order, OrderState};
use crate::domain::positions::{Position, PositionStatus};

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create(&self, order: &Order) -> Result<(), SniperError>;

    async fn get(&self, id: Uuid) -> Result<Option<Order>, SniperError>;

    /// Persist the order's current state and payload.
    async fn update(&self, order: &Order) -> Result<(), SniperError>;

    /// Claim the order for a pipeline task. Returns false when another
    /// claimant holds it.
    async fn claim(&self, id: Uuid, claimant: &str) -> Result<bool, SniperError>;

    async fn release(&self, id: Uuid, claimant: &str) -> Result<(), SniperError>;

    async fn find_by_state(&self, state: OrderState) -> Result<Vec<Order>, SniperError>;
}

#[async_trait]
pub trait PositionRepository: Send + Sync {
    async fn create(&self, position: &Position) -> Result<(), SniperError>;

    async fn get(&self, id: Uuid) -> Result<Option<Position>, SniperError>;

    async fn get_by_order(&self, order_id: Uuid) -> Result<Option<Position>, SniperError>;

    async fn update(&self, position: &Position) -> Result<(), SniperError>;

    async fn find_by_status(&self, status: PositionStatus) -> Result<Vec<Position>, SniperError>;

    /// Compare-and-set the status; returns false when the stored status
    /// no longer matches `from`. Serializes competing exits.
    async fn transition_status(
        &self,
        id: Uuid,
        from: PositionStatus,
        to: PositionStatus,
    ) -> Result<bool, SniperError>;
}
