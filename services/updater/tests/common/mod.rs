//! Shared in-memory fakes for updater integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use streamroll_catalog::{CatalogError, ServiceInstance, ServiceRegistry};
use streamroll_scheduler::{
    JobScheduler, JobState, MachineState, RuntimeState, SchedulerError, Unit,
};
use streamroll_updater::metrics::{ConnectionStats, MetricsError, StatsSource};

/// In-memory service registry. Registration overwrites by service id, the
/// same last-writer-wins semantics the real catalog API has.
#[derive(Default)]
pub struct FakeRegistry {
    pub instances: Mutex<Vec<ServiceInstance>>,
    pub register_count: AtomicUsize,
}

impl FakeRegistry {
    pub fn with_instances(instances: Vec<ServiceInstance>) -> Arc<Self> {
        Arc::new(Self {
            instances: Mutex::new(instances),
            register_count: AtomicUsize::new(0),
        })
    }

    pub fn tags_of(&self, service_id: &str) -> Vec<String> {
        self.instances
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.service_id == service_id)
            .map(|i| i.tags.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ServiceRegistry for FakeRegistry {
    async fn list_instances(
        &self,
        service: &str,
        _datacenter: &str,
    ) -> Result<Vec<ServiceInstance>, CatalogError> {
        Ok(self
            .instances
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.service_name == service)
            .cloned()
            .collect())
    }

    async fn register(&self, instance: &ServiceInstance) -> Result<(), CatalogError> {
        self.register_count.fetch_add(1, Ordering::SeqCst);
        let mut instances = self.instances.lock().unwrap();
        match instances
            .iter_mut()
            .find(|i| i.service_id == instance.service_id)
        {
            Some(existing) => *existing = instance.clone(),
            None => instances.push(instance.clone()),
        }
        Ok(())
    }
}

/// In-memory job scheduler.
///
/// `unit()` reports a converged view (current state equals desired state)
/// unless a lag counter is set for the unit, in which case that many polls
/// still observe the stored, stale current state. Global units never get a
/// current state, as in the real scheduler.
///
/// `unit_states()` serves queued snapshots if any were pushed (the last one
/// repeats); otherwise it synthesizes an active state for every launched
/// unit. `create_unit` can re-register a queued catalog instance, standing in
/// for the replacement process announcing itself on boot.
#[derive(Default)]
pub struct FakeScheduler {
    pub units: Mutex<HashMap<String, Unit>>,
    pub lag: Mutex<HashMap<String, u32>>,
    pub state_snapshots: Mutex<VecDeque<Vec<RuntimeState>>>,
    pub machines: Mutex<Vec<MachineState>>,
    pub destroyed: Mutex<Vec<String>>,
    pub respawn: Mutex<VecDeque<ServiceInstance>>,
    pub registry: Mutex<Option<Arc<FakeRegistry>>>,
}

impl FakeScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_unit(&self, unit: Unit) {
        self.units.lock().unwrap().insert(unit.name.clone(), unit);
    }

    /// The next `polls` calls to `unit()` observe the stale current state.
    pub fn set_lag(&self, name: &str, polls: u32) {
        self.lag.lock().unwrap().insert(name.to_string(), polls);
    }

    pub fn push_state_snapshot(&self, snapshot: Vec<RuntimeState>) {
        self.state_snapshots.lock().unwrap().push_back(snapshot);
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.destroyed.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobScheduler for FakeScheduler {
    async fn unit(&self, name: &str) -> Result<Option<Unit>, SchedulerError> {
        let units = self.units.lock().unwrap();
        let Some(unit) = units.get(name).cloned() else {
            return Ok(None);
        };
        drop(units);

        let mut lag = self.lag.lock().unwrap();
        if let Some(remaining) = lag.get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(Some(unit));
            }
        }
        drop(lag);

        let mut converged = unit;
        if !converged.is_global() {
            converged.current_state = Some(converged.desired_state);
        }
        Ok(Some(converged))
    }

    async fn create_unit(&self, unit: &Unit) -> Result<(), SchedulerError> {
        self.units
            .lock()
            .unwrap()
            .insert(unit.name.clone(), unit.clone());

        let respawned = self.respawn.lock().unwrap().pop_front();
        if let Some(instance) = respawned {
            let registry = self.registry.lock().unwrap().clone();
            if let Some(registry) = registry {
                registry.register(&instance).await.map_err(|e| {
                    SchedulerError::InvalidUnit {
                        name: unit.name.clone(),
                        reason: e.to_string(),
                    }
                })?;
            }
        }
        Ok(())
    }

    async fn destroy_unit(&self, name: &str) -> Result<(), SchedulerError> {
        if self.units.lock().unwrap().remove(name).is_none() {
            return Err(SchedulerError::NotFound(name.to_string()));
        }
        self.destroyed.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn set_desired_state(&self, name: &str, state: JobState) -> Result<(), SchedulerError> {
        let mut units = self.units.lock().unwrap();
        let unit = units
            .get_mut(name)
            .ok_or_else(|| SchedulerError::NotFound(name.to_string()))?;
        unit.desired_state = state;
        Ok(())
    }

    async fn units(&self) -> Result<Vec<Unit>, SchedulerError> {
        Ok(self.units.lock().unwrap().values().cloned().collect())
    }

    async fn unit_states(&self) -> Result<Vec<RuntimeState>, SchedulerError> {
        let mut snapshots = self.state_snapshots.lock().unwrap();
        if let Some(snapshot) = snapshots.front().cloned() {
            if snapshots.len() > 1 {
                snapshots.pop_front();
            }
            return Ok(snapshot);
        }

        Ok(self
            .units
            .lock()
            .unwrap()
            .values()
            .filter(|u| u.desired_state == JobState::Launched)
            .map(|u| RuntimeState {
                name: u.name.clone(),
                load_state: "loaded".to_string(),
                active_state: "active".to_string(),
                sub_state: "running".to_string(),
            })
            .collect())
    }

    async fn machines(&self) -> Result<Vec<MachineState>, SchedulerError> {
        Ok(self.machines.lock().unwrap().clone())
    }
}

/// Stats source serving a scripted queue of responses; once the queue is
/// exhausted every fetch reports zero connections.
#[derive(Default)]
pub struct FakeStats {
    pub responses: Mutex<VecDeque<Result<i32, u16>>>,
}

impl FakeStats {
    pub fn drained() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(responses: Vec<Result<i32, u16>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
        })
    }
}

#[async_trait]
impl StatsSource for FakeStats {
    async fn fetch(&self, _url: &str) -> Result<ConnectionStats, MetricsError> {
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(connections)) => Ok(ConnectionStats {
                current_connections: connections,
                ..ConnectionStats::default()
            }),
            Some(Err(status)) => Err(MetricsError::Api { status }),
            None => Ok(ConnectionStats::default()),
        }
    }
}

pub fn instance(service: &str, node: &str, address: &str, tags: &[&str]) -> ServiceInstance {
    ServiceInstance {
        node: node.to_string(),
        address: address.to_string(),
        tagged_addresses: HashMap::new(),
        datacenter: "dc1".to_string(),
        service_id: format!("{service}-{node}"),
        service_name: service.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        port: 8087,
    }
}

pub fn unit(name: &str, desired: JobState, machine_id: Option<&str>) -> Unit {
    Unit {
        name: name.to_string(),
        desired_state: desired,
        current_state: None,
        machine_id: machine_id.map(str::to_string),
        options: vec![],
    }
}

pub fn machine(id: &str, public_ip: &str) -> MachineState {
    MachineState {
        id: id.to_string(),
        public_ip: public_ip.to_string(),
        metadata: HashMap::new(),
    }
}
