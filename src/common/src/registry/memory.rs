use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{HoldRegistry, RegistryError, RegistryResult, prepare_new, prepare_update};
use crate::model::Hold;

/// Registry kept in process memory, in creation order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHoldRegistry {
    holds: Arc<Mutex<Vec<Hold>>>,
}

impl InMemoryHoldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a hold exactly as given, bypassing ID and timestamp assignment.
    pub async fn insert(&self, hold: Hold) {
        let mut holds = self.holds.lock().await;
        holds.retain(|h| h.id != hold.id);
        holds.push(hold);
    }
}

#[async_trait]
impl HoldRegistry for InMemoryHoldRegistry {
    async fn list_holds(&self) -> RegistryResult<Vec<Hold>> {
        Ok(self.holds.lock().await.clone())
    }

    async fn get_hold(&self, id: &str) -> RegistryResult<Option<Hold>> {
        Ok(self.holds.lock().await.iter().find(|h| h.id == id).cloned())
    }

    async fn create_hold(&self, hold: Hold) -> RegistryResult<Hold> {
        let hold = prepare_new(hold)?;

        let mut holds = self.holds.lock().await;
        if holds.iter().any(|h| h.id == hold.id || h.name == hold.name) {
            return Err(RegistryError::AlreadyExists(hold.name));
        }
        holds.push(hold.clone());
        Ok(hold)
    }

    async fn update_hold(&self, new: &Hold, old: &Hold) -> RegistryResult<Hold> {
        let mut holds = self.holds.lock().await;
        let stored = holds
            .iter_mut()
            .find(|h| h.id == old.id)
            .ok_or_else(|| RegistryError::NotFound(old.id.clone()))?;

        if stored.update_at != old.update_at
            || stored.last_execution_ended_at != old.last_execution_ended_at
        {
            return Err(RegistryError::Conflict { id: old.id.clone() });
        }

        let next = prepare_update(new, stored)?;
        *stored = next.clone();
        Ok(next)
    }
}
