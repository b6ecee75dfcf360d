//! Unit lifecycle orchestration.
//!
//! Manages scheduler unit creation, idempotent desired-state transitions and
//! the concurrent state-confirmation waiters. State model per unit:
//! `Inactive -> Loaded -> Launched` for desired-state progression, with an
//! independently-observed current state. Global (broadcast) units are the
//! exception: their current state is never populated by the scheduler, so the
//! desired state stands in wherever state is asserted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use streamroll_scheduler::{
    check_minimum_requirements, mangle_unit_name, validate_name, validate_options, JobScheduler,
    JobState, SchedulerError, Unit, UnitFile, UnitNameInfo,
};

use crate::error::UpdateError;
use crate::machines::MachineCache;

/// The command on whose behalf a unit creation is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledCommand {
    Submit,
    Load,
    Start,
}

impl ScheduledCommand {
    /// Desired states an existing unit may hold for the command to treat it
    /// as already compatible (a safe no-op).
    fn allowed_states(self) -> &'static [JobState] {
        match self {
            ScheduledCommand::Submit => &[JobState::Inactive],
            ScheduledCommand::Load => &[JobState::Inactive, JobState::Loaded],
            ScheduledCommand::Start => {
                &[JobState::Inactive, JobState::Loaded, JobState::Launched]
            }
        }
    }
}

/// Outcome of the pre-creation check for one unit name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationDecision {
    /// No unit by that name exists; create it.
    Create,

    /// A compatible unit already exists; nothing to do.
    Skip,

    /// A unit exists mid-transition and cannot safely be replaced. Signalled
    /// as a warning, not a fatal error.
    Reject,
}

/// Orchestrates unit creation and state convergence against the scheduler.
#[derive(Clone)]
pub struct UnitLifecycleOrchestrator {
    scheduler: Arc<dyn JobScheduler>,
    machines: Arc<MachineCache>,
    poll_interval: Duration,
}

impl UnitLifecycleOrchestrator {
    pub fn new(
        scheduler: Arc<dyn JobScheduler>,
        machines: Arc<MachineCache>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            scheduler,
            machines,
            poll_interval,
        }
    }

    /// Decide whether a unit by this name can be created for the command.
    pub async fn check_creation(
        &self,
        name: &str,
        command: ScheduledCommand,
    ) -> Result<CreationDecision, UpdateError> {
        let unit = self.scheduler.unit(name).await?;

        let Some(unit) = unit else {
            debug!(unit = %name, "Unit not found in registry, will create");
            return Ok(CreationDecision::Create);
        };

        if command.allowed_states().contains(&unit.desired_state) {
            debug!(unit = %name, "Found compatible unit in registry, nothing to do");
            Ok(CreationDecision::Skip)
        } else {
            warn!(
                unit = %name,
                state = %unit.desired_state,
                "Cannot replace unit in this state, use the appropriate command"
            );
            Ok(CreationDecision::Reject)
        }
    }

    /// Validate and submit a unit creation.
    pub async fn create_unit(
        &self,
        name: &str,
        unit_file: &UnitFile,
    ) -> Result<Unit, UpdateError> {
        let wrap = |source: SchedulerError| UpdateError::Creation {
            name: name.to_string(),
            source,
        };

        validate_name(name).map_err(wrap)?;
        validate_options(unit_file).map_err(wrap)?;
        // Warn-only; a unit failing the minimum-requirements check is still
        // submitted.
        check_minimum_requirements(name, unit_file);

        let unit = Unit {
            name: name.to_string(),
            desired_state: JobState::Inactive,
            current_state: None,
            machine_id: None,
            options: unit_file.options().to_vec(),
        };

        self.scheduler.create_unit(&unit).await.map_err(wrap)?;
        debug!(unit = %name, "Created unit in registry");
        Ok(unit)
    }

    /// Resolve the unit file for a path: the local file if present, else the
    /// template from the scheduler registry, else the template file on disk.
    pub async fn resolve_unit_file(&self, path: &Path) -> Result<UnitFile, UpdateError> {
        let name = mangle_unit_name(path);
        debug!(unit = %name, "Looking for unit file or its corresponding template");

        match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                debug!(unit = %name, "Unit file found on local filesystem");
                return Self::parse_unit_file(path, &text);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(UpdateError::UnitFile {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        }

        let info = UnitNameInfo::parse(&name).ok_or_else(|| UpdateError::UnitFile {
            path: path.display().to_string(),
            reason: "cannot extract naming information from unit name".to_string(),
        })?;
        if !info.is_instance() {
            return Err(UpdateError::UnitFile {
                path: path.display().to_string(),
                reason: "unit not found in registry or on filesystem".to_string(),
            });
        }
        let template = info.template.as_deref().unwrap_or_default().to_string();

        if let Some(unit) = self.scheduler.unit(&template).await? {
            debug!(template = %template, "Template unit found in registry");
            return Ok(unit.unit_file());
        }

        let template_path = path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&template);
        debug!(template = %template, path = %template_path.display(), "Looking for template unit on disk");

        let text =
            tokio::fs::read_to_string(&template_path)
                .await
                .map_err(|e| UpdateError::UnitFile {
                    path: template_path.display().to_string(),
                    reason: format!("template unit not in registry or on filesystem: {e}"),
                })?;
        Self::parse_unit_file(&template_path, &text)
    }

    fn parse_unit_file(path: &Path, text: &str) -> Result<UnitFile, UpdateError> {
        UnitFile::parse(text).map_err(|e| UpdateError::UnitFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Create any units that do not exist yet, then confirm each newly
    /// created unit reaches `Inactive`.
    ///
    /// One confirmation task runs per created unit, all concurrently; the
    /// call joins on every task and collects every failure. Already-created
    /// units are never rolled back on partial failure.
    pub async fn batch_create(
        &self,
        paths: &[PathBuf],
        shutdown: &watch::Receiver<bool>,
    ) -> Result<(), UpdateError> {
        let mut waiters: JoinSet<Result<(), UpdateError>> = JoinSet::new();

        for path in paths {
            let name = mangle_unit_name(path);

            match self.check_creation(&name, ScheduledCommand::Start).await? {
                CreationDecision::Create => {}
                CreationDecision::Skip | CreationDecision::Reject => continue,
            }

            let unit_file = self.resolve_unit_file(path).await?;
            self.create_unit(&name, &unit_file).await?;

            let this = self.clone();
            let mut shutdown = shutdown.clone();
            waiters.spawn(async move {
                this.wait_single(&name, JobState::Inactive, 0, &mut shutdown)
                    .await
            });
        }

        let failures = Self::join_all(waiters).await;
        if failures.is_empty() {
            Ok(())
        } else {
            for failure in &failures {
                error!(error = %failure, "Error waiting on unit creation");
            }
            Err(UpdateError::Aggregate(failures))
        }
    }

    /// Request the target desired state for every named unit.
    ///
    /// Units already at the target are skipped without issuing a request.
    /// Returns the subset of units for which a state change was actually
    /// triggered.
    pub async fn set_desired_state(
        &self,
        names: &[String],
        target: JobState,
    ) -> Result<Vec<Unit>, UpdateError> {
        let mut triggered = Vec::new();

        for name in names {
            let unit = self
                .scheduler
                .unit(name)
                .await?
                .ok_or_else(|| UpdateError::Scheduler(SchedulerError::NotFound(name.clone())))?;

            if unit.desired_state == target {
                debug!(unit = %name, state = %target, "Unit already at target state, skipping");
                continue;
            }

            debug!(unit = %name, state = %target, "Setting unit target state");
            self.scheduler.set_desired_state(name, target).await?;
            triggered.push(unit);
        }

        Ok(triggered)
    }

    /// Poll every named unit until it reaches the target state.
    ///
    /// One polling task per name, all concurrent, each sleeping the poll
    /// interval between polls (no backoff). `max_attempts < 0` assumes
    /// success without polling; `== 0` polls forever; `> 0` fails that unit
    /// with a timeout after exactly that many polls. Every failure is
    /// surfaced, not just the first.
    pub async fn wait_for_state(
        &self,
        names: &[String],
        target: JobState,
        max_attempts: i32,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<(), UpdateError> {
        if max_attempts < 0 {
            for name in names {
                info!(unit = %name, state = %target, "Triggered unit, not waiting for confirmation");
            }
            return Ok(());
        }

        let mut waiters: JoinSet<Result<(), UpdateError>> = JoinSet::new();
        for name in names {
            let this = self.clone();
            let name = name.clone();
            let mut shutdown = shutdown.clone();
            waiters.spawn(async move {
                this.wait_single(&name, target, max_attempts, &mut shutdown)
                    .await
            });
        }

        let failures = Self::join_all(waiters).await;
        if failures.is_empty() {
            Ok(())
        } else {
            for failure in &failures {
                error!(error = %failure, "Error waiting for unit state");
            }
            Err(UpdateError::Aggregate(failures))
        }
    }

    /// Assert every named unit is active and loaded in the scheduler's
    /// low-level process view.
    ///
    /// The full batch of runtime states is fetched once up front; any
    /// assertion miss re-fetches the entire batch (never a single unit)
    /// before the next attempt. Same `max_attempts` contract as
    /// [`wait_for_state`](Self::wait_for_state).
    pub async fn wait_for_active_runtime_state(
        &self,
        names: &[String],
        max_attempts: i32,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<(), UpdateError> {
        if names.is_empty() {
            return Ok(());
        }
        if max_attempts < 0 {
            for name in names {
                info!(unit = %name, "Triggered unit, not waiting for active state");
            }
            return Ok(());
        }

        let mut shutdown = shutdown.clone();
        let mut states = self.scheduler.unit_states().await?;
        let mut pending: Vec<String> = names.to_vec();
        let mut attempt = 0;

        loop {
            let mut still_pending = Vec::new();
            for name in pending {
                if states.iter().any(|s| s.name == name && s.is_active()) {
                    info!(unit = %name, "Unit is active and loaded");
                } else {
                    still_pending.push(name);
                }
            }
            pending = still_pending;

            if pending.is_empty() {
                return Ok(());
            }

            attempt += 1;
            if max_attempts > 0 && attempt >= max_attempts {
                let failures = pending.into_iter().map(UpdateError::Timeout).collect();
                return Err(UpdateError::Aggregate(failures));
            }

            crate::sleep_or_shutdown(self.poll_interval, &mut shutdown).await?;

            // Coalesced refresh: one batch fetch covers every pending unit.
            match self.scheduler.unit_states().await {
                Ok(fresh) => states = fresh,
                Err(e) => {
                    warn!(error = %e, "Failed to refresh unit states, keeping previous snapshot");
                }
            }
        }
    }

    /// Create-and-start composite: create missing units, launch them, then
    /// wait for the launch to be confirmed at both the lifecycle and the
    /// process level. Global units are triggered but never waited on.
    pub async fn start_units(
        &self,
        paths: &[PathBuf],
        block_attempts: i32,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<(), UpdateError> {
        self.batch_create(paths, shutdown).await?;

        let names: Vec<String> = paths.iter().map(mangle_unit_name).collect();
        let triggered = self.set_desired_state(&names, JobState::Launched).await?;

        let mut starting = Vec::new();
        for unit in triggered {
            if unit.is_global() {
                info!(unit = %unit.name, "Triggered global unit start");
            } else {
                starting.push(unit.name);
            }
        }

        self.wait_for_state(&starting, JobState::Launched, block_attempts, shutdown)
            .await?;
        self.wait_for_active_runtime_state(&starting, block_attempts, shutdown)
            .await
    }

    /// Poll one unit until it reaches the target state.
    async fn wait_single(
        &self,
        name: &str,
        target: JobState,
        max_attempts: i32,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), UpdateError> {
        let mut attempt = 0;
        loop {
            if self.unit_reached_state(name, target).await {
                return Ok(());
            }

            attempt += 1;
            if max_attempts > 0 && attempt >= max_attempts {
                return Err(UpdateError::Timeout(name.to_string()));
            }

            crate::sleep_or_shutdown(self.poll_interval, shutdown).await?;
        }
    }

    /// One observation of a unit against the target state. Fetch errors and
    /// missing units count as "not there yet".
    async fn unit_reached_state(&self, name: &str, target: JobState) -> bool {
        let unit = match self.scheduler.unit(name).await {
            Ok(Some(unit)) => unit,
            Ok(None) => {
                warn!(unit = %name, "Unit not found while waiting for state");
                return false;
            }
            Err(e) => {
                warn!(unit = %name, error = %e, "Error retrieving unit while waiting for state");
                return false;
            }
        };

        // Global units never have a current state; wait on desired state.
        let observed = if unit.is_global() {
            Some(unit.desired_state)
        } else {
            unit.current_state
        };

        if observed != Some(target) {
            debug!(
                unit = %name,
                observed = ?observed,
                target = %target,
                "Waiting for unit state"
            );
            return false;
        }

        match &unit.machine_id {
            Some(machine_id) => match self.machines.get(machine_id).await {
                Some(machine) => {
                    info!(unit = %name, state = %target, machine = %machine.legend(), "Unit reached state")
                }
                None => info!(unit = %name, state = %target, "Unit reached state"),
            },
            None => info!(unit = %name, state = %target, "Unit reached state"),
        }
        true
    }

    async fn join_all(mut waiters: JoinSet<Result<(), UpdateError>>) -> Vec<UpdateError> {
        let mut failures = Vec::new();
        while let Some(result) = waiters.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => failures.push(e),
                Err(e) => failures.push(UpdateError::Join(e.to_string())),
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_states_per_command() {
        assert_eq!(
            ScheduledCommand::Submit.allowed_states(),
            &[JobState::Inactive]
        );
        assert_eq!(
            ScheduledCommand::Load.allowed_states(),
            &[JobState::Inactive, JobState::Loaded]
        );
        assert_eq!(
            ScheduledCommand::Start.allowed_states(),
            &[JobState::Inactive, JobState::Loaded, JobState::Launched]
        );
    }
}
