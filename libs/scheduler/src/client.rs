//! Job scheduler collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SchedulerError;
use crate::state::{JobState, MachineState, RuntimeState};
use crate::unit::{Unit, UnitOption};

/// CRUD and state-query access to the cluster job scheduler.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// Fetch a unit by name; `None` if absent from the registry.
    async fn unit(&self, name: &str) -> Result<Option<Unit>, SchedulerError>;

    /// Create a unit in the scheduler registry.
    async fn create_unit(&self, unit: &Unit) -> Result<(), SchedulerError>;

    /// Destroy a unit, removing it from the registry.
    async fn destroy_unit(&self, name: &str) -> Result<(), SchedulerError>;

    /// Request a desired-state transition for a unit.
    async fn set_desired_state(&self, name: &str, state: JobState) -> Result<(), SchedulerError>;

    /// List all units.
    async fn units(&self) -> Result<Vec<Unit>, SchedulerError>;

    /// List the low-level process states of all units (one batch).
    async fn unit_states(&self) -> Result<Vec<RuntimeState>, SchedulerError>;

    /// List all machines managed by the scheduler.
    async fn machines(&self) -> Result<Vec<MachineState>, SchedulerError>;
}

/// HTTP client for a fleet-style scheduler API.
pub struct HttpScheduler {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct UnitsPage {
    #[serde(default)]
    units: Vec<Unit>,
}

#[derive(Deserialize)]
struct StatesPage {
    #[serde(default)]
    states: Vec<RuntimeState>,
}

#[derive(Deserialize)]
struct MachinesPage {
    #[serde(default)]
    machines: Vec<MachineState>,
}

#[derive(Serialize)]
struct CreateUnitBody<'a> {
    #[serde(rename = "desiredState")]
    desired_state: JobState,
    options: &'a [UnitOption],
}

#[derive(Serialize)]
struct SetStateBody {
    #[serde(rename = "desiredState")]
    desired_state: JobState,
}

impl HttpScheduler {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SchedulerError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn unit_url(&self, name: &str) -> String {
        format!("{}/fleet/v1/units/{}", self.base_url, name)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SchedulerError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(SchedulerError::Api { status, body })
    }
}

#[async_trait]
impl JobScheduler for HttpScheduler {
    async fn unit(&self, name: &str) -> Result<Option<Unit>, SchedulerError> {
        let response = self.client.get(self.unit_url(name)).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(response).await?;
        Ok(Some(response.json().await?))
    }

    async fn create_unit(&self, unit: &Unit) -> Result<(), SchedulerError> {
        debug!(unit = %unit.name, "Creating unit");
        let body = CreateUnitBody {
            desired_state: unit.desired_state,
            options: &unit.options,
        };
        let response = self
            .client
            .put(self.unit_url(&unit.name))
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn destroy_unit(&self, name: &str) -> Result<(), SchedulerError> {
        debug!(unit = %name, "Destroying unit");
        let response = self.client.delete(self.unit_url(name)).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SchedulerError::NotFound(name.to_string()));
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn set_desired_state(&self, name: &str, state: JobState) -> Result<(), SchedulerError> {
        debug!(unit = %name, state = %state, "Setting desired state");
        let response = self
            .client
            .put(self.unit_url(name))
            .json(&SetStateBody {
                desired_state: state,
            })
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SchedulerError::NotFound(name.to_string()));
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn units(&self) -> Result<Vec<Unit>, SchedulerError> {
        let url = format!("{}/fleet/v1/units", self.base_url);
        let response = Self::check(self.client.get(&url).send().await?).await?;
        let page: UnitsPage = response.json().await?;
        Ok(page.units)
    }

    async fn unit_states(&self) -> Result<Vec<RuntimeState>, SchedulerError> {
        let url = format!("{}/fleet/v1/state", self.base_url);
        let response = Self::check(self.client.get(&url).send().await?).await?;
        let page: StatesPage = response.json().await?;
        Ok(page.states)
    }

    async fn machines(&self) -> Result<Vec<MachineState>, SchedulerError> {
        let url = format!("{}/fleet/v1/machines", self.base_url);
        let response = Self::check(self.client.get(&url).send().await?).await?;
        let page: MachinesPage = response.json().await?;
        Ok(page.machines)
    }
}
