//! The rolling-update driver.
//!
//! A single sequential control flow executes a six-phase cycle per instance:
//! Selecting -> Claiming -> Draining -> Locating -> Recreating -> Cooldown,
//! looping until every instance of the service carries the target image tag.
//! Concurrency lives inside individual phases (per-unit polling tasks); the
//! driver itself only enforces strict phase ordering: in particular, drain
//! always completes before a destroy is issued.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use streamroll_catalog::{
    add_tag, search_with_tag, search_without_tag, ServiceInstance, ServiceRegistry, Tag,
};
use streamroll_scheduler::{JobScheduler, MachineState, Unit};

use crate::config::UpdateConfig;
use crate::error::UpdateError;
use crate::lifecycle::UnitLifecycleOrchestrator;
use crate::metrics::{DrainMonitor, StatsSource};

/// Outcome of one update cycle.
enum CycleOutcome {
    /// An instance's unit was destroyed and recreated.
    Replaced,

    /// The cycle bailed out early (connections rose again, unit not located);
    /// the next cycle retries from Selecting.
    Retry,
}

/// Drives the rolling replacement of one service's instances.
pub struct RollingUpdateController {
    registry: Arc<dyn ServiceRegistry>,
    scheduler: Arc<dyn JobScheduler>,
    stats: Arc<dyn StatsSource>,
    orchestrator: UnitLifecycleOrchestrator,
    config: UpdateConfig,
}

impl RollingUpdateController {
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        scheduler: Arc<dyn JobScheduler>,
        stats: Arc<dyn StatsSource>,
        orchestrator: UnitLifecycleOrchestrator,
        config: UpdateConfig,
    ) -> Self {
        Self {
            registry,
            scheduler,
            stats,
            orchestrator,
            config,
        }
    }

    /// Run update cycles until convergence, a fatal error, or shutdown.
    ///
    /// Registry failures (Selecting, Claiming) are fatal to the controller;
    /// scheduler and metrics failures inside a cycle are logged and retried
    /// on the next cycle. Convergence (no instance left without the target
    /// image tag) terminates successfully.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), UpdateError> {
        let claim_tag = Tag::new("update", &self.config.target_image)?;
        let updated_tag = Tag::new("image", &self.config.target_image)?;

        info!(
            service = %self.config.service,
            dc = %self.config.datacenter,
            image = %self.config.target_image,
            "Starting rolling update"
        );

        loop {
            crate::sleep_or_shutdown(self.config.cycle_interval, &mut shutdown).await?;

            match self.run_cycle(&claim_tag, &updated_tag, &shutdown).await {
                Ok(CycleOutcome::Replaced) => {
                    info!("Instance replaced, moving to next candidate");
                }
                Ok(CycleOutcome::Retry) => {}
                Err(UpdateError::NoCandidate) => {
                    info!(
                        service = %self.config.service,
                        image = %self.config.target_image,
                        "Every instance carries the target image tag, rolling update complete"
                    );
                    return Ok(());
                }
                Err(e @ UpdateError::Cancelled) => return Err(e),
                Err(e @ UpdateError::Catalog(_)) => return Err(e),
                Err(e) => {
                    warn!(error = %e, "Update cycle failed, retrying next cycle");
                }
            }
        }
    }

    async fn run_cycle(
        &self,
        claim_tag: &Tag,
        updated_tag: &Tag,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<CycleOutcome, UpdateError> {
        let mut shutdown_rx = shutdown.clone();

        // Selecting: prefer an instance already claimed (resumes an
        // interrupted cycle), else the first one not yet updated.
        let instances = self
            .registry
            .list_instances(&self.config.service, &self.config.datacenter)
            .await?;
        let mut instance = self.select_candidate(&instances, claim_tag, updated_tag)?;
        info!(
            service = %instance.service_name,
            node = %instance.node,
            address = %instance.address,
            "Selected instance for replacement"
        );

        // Claiming: idempotent, a no-op on resume.
        add_tag(self.registry.as_ref(), &mut instance, claim_tag).await?;

        // Draining: tolerate transient metrics errors indefinitely.
        let status_url = self.config.status_url(&instance);
        let drain = DrainMonitor::new(Arc::clone(&self.stats), self.config.drain_poll_interval);
        drain.wait_for_drain(&status_url, &mut shutdown_rx).await?;

        // Locating: best-effort race guard, then machine and unit lookup.
        let Some(unit) = self.locate_unit(&instance, &status_url).await? else {
            return Ok(CycleOutcome::Retry);
        };

        // Recreating: destroy, settle, recreate from the unit file, settle.
        self.scheduler.destroy_unit(&unit.name).await?;
        info!(unit = %unit.name, address = %instance.address, "Destroyed unit");
        crate::sleep_or_shutdown(self.config.destroy_settle, &mut shutdown_rx).await?;

        let unit_path = self.config.units_dir.join(&unit.name);
        self.orchestrator
            .start_units(&[unit_path], 0, shutdown)
            .await?;
        info!(unit = %unit.name, "Recreated unit from unit file");

        // Cooldown: let the new instance register and stabilize.
        crate::sleep_or_shutdown(self.config.recreate_settle, &mut shutdown_rx).await?;

        Ok(CycleOutcome::Replaced)
    }

    /// Pick the instance to replace this cycle.
    fn select_candidate(
        &self,
        instances: &[ServiceInstance],
        claim_tag: &Tag,
        updated_tag: &Tag,
    ) -> Result<ServiceInstance, UpdateError> {
        if let Ok(claimed) = search_with_tag(instances, claim_tag) {
            info!(node = %claimed.node, "Resuming previously claimed instance");
            return Ok(claimed.clone());
        }

        search_without_tag(instances, updated_tag)
            .map(Clone::clone)
            .map_err(|_| UpdateError::NoCandidate)
    }

    /// Re-check the connection count, then resolve the scheduler unit backing
    /// the instance: the machine whose public IP matches the instance address
    /// and, on it, the unit named `<service>@...service`.
    ///
    /// The re-check is a race guard, not a transaction; connections may rise
    /// again before the destroy call executes.
    async fn locate_unit(
        &self,
        instance: &ServiceInstance,
        status_url: &str,
    ) -> Result<Option<Unit>, UpdateError> {
        let stats = match self.stats.fetch(status_url).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(url = %status_url, error = %e, "Unable to re-check metrics before destroy");
                return Ok(None);
            }
        };
        if stats.current_connections != 0 {
            info!(
                node = %instance.node,
                connections = stats.current_connections,
                "Connections rose again before destroy, retrying"
            );
            return Ok(None);
        }

        let machines = self.scheduler.machines().await?;
        let Some(machine) = machines.iter().find(|m| m.public_ip == instance.address) else {
            warn!(address = %instance.address, "No machine with matching public IP");
            return Ok(None);
        };

        let units = self.scheduler.units().await?;
        let unit = units
            .into_iter()
            .find(|u| self.unit_backs_service(u, machine));

        if unit.is_none() {
            warn!(
                machine = %machine.legend(),
                service = %self.config.service,
                "No unit for service found on machine"
            );
        }
        Ok(unit)
    }

    fn unit_backs_service(&self, unit: &Unit, machine: &MachineState) -> bool {
        unit.machine_id.as_deref() == Some(machine.id.as_str())
            && unit.name.starts_with(&format!("{}@", self.config.service))
            && unit.name.ends_with(".service")
    }
}
