//! Process-scoped machine metadata cache.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::warn;

use streamroll_scheduler::{JobScheduler, MachineState, SchedulerError};

/// Lazily-populated, never-invalidated map of machine id to machine state.
///
/// The full machine list is fetched exactly once, on first lookup; the
/// `OnceCell` guarantees concurrent first accesses neither double-fetch nor
/// observe a partially-built map. A failed fetch leaves the cell empty so a
/// later lookup retries.
pub struct MachineCache {
    scheduler: Arc<dyn JobScheduler>,
    machines: OnceCell<HashMap<String, MachineState>>,
}

impl MachineCache {
    pub fn new(scheduler: Arc<dyn JobScheduler>) -> Self {
        Self {
            scheduler,
            machines: OnceCell::new(),
        }
    }

    /// Best-effort lookup of a machine by id.
    ///
    /// Errors fetching the machine list are logged and swallowed; callers
    /// use the result only to enrich log lines.
    pub async fn get(&self, machine_id: &str) -> Option<MachineState> {
        let map = self
            .machines
            .get_or_try_init(|| self.fetch_all())
            .await;

        match map {
            Ok(map) => map.get(machine_id).cloned(),
            Err(e) => {
                warn!(error = %e, "Failed to populate machine cache");
                None
            }
        }
    }

    async fn fetch_all(&self) -> Result<HashMap<String, MachineState>, SchedulerError> {
        let machines = self.scheduler.machines().await?;
        Ok(machines.into_iter().map(|m| (m.id.clone(), m)).collect())
    }
}
