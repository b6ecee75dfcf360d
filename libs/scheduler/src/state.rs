//! Lifecycle, runtime and machine state models.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Desired/current lifecycle state of a unit.
///
/// Totally ordered by lifecycle progression: `Inactive < Loaded < Launched`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Inactive,
    Loaded,
    Launched,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Inactive => "inactive",
            JobState::Loaded => "loaded",
            JobState::Launched => "launched",
        };
        write!(f, "{s}")
    }
}

/// Low-level process state of a unit, fetched from the scheduler's state API.
///
/// Ephemeral: fetched per poll, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeState {
    pub name: String,

    #[serde(rename = "systemdLoadState")]
    pub load_state: String,

    #[serde(rename = "systemdActiveState")]
    pub active_state: String,

    #[serde(rename = "systemdSubState")]
    pub sub_state: String,
}

impl RuntimeState {
    /// True iff the process view reports the unit as active and loaded.
    pub fn is_active(&self) -> bool {
        self.active_state == "active" && self.load_state == "loaded"
    }
}

/// A machine managed by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineState {
    pub id: String,

    #[serde(rename = "publicIP", default)]
    pub public_ip: String,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl MachineState {
    /// Truncated machine id for log legends. Cuts on a char boundary so ids
    /// with non-ASCII content cannot split a code point.
    pub fn short_id(&self) -> &str {
        match self.id.char_indices().nth(8) {
            Some((end, _)) => &self.id[..end],
            None => &self.id,
        }
    }

    /// `<short-id>.../<public-ip>` legend for log lines.
    pub fn legend(&self) -> String {
        if self.public_ip.is_empty() {
            format!("{}...", self.short_id())
        } else {
            format!("{}.../{}", self.short_id(), self.public_ip)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_lifecycle_ordering() {
        assert!(JobState::Inactive < JobState::Loaded);
        assert!(JobState::Loaded < JobState::Launched);
    }

    #[test]
    fn test_job_state_serde_round_trip() {
        let json = serde_json::to_string(&JobState::Launched).unwrap();
        assert_eq!(json, "\"launched\"");
        let state: JobState = serde_json::from_str("\"inactive\"").unwrap();
        assert_eq!(state, JobState::Inactive);
    }

    #[test]
    fn test_runtime_state_is_active() {
        let mut state = RuntimeState {
            name: "wz@1.service".to_string(),
            load_state: "loaded".to_string(),
            active_state: "active".to_string(),
            sub_state: "running".to_string(),
        };
        assert!(state.is_active());

        state.active_state = "activating".to_string();
        assert!(!state.is_active());
    }

    #[test]
    fn test_machine_legend() {
        let machine = MachineState {
            id: "0123456789abcdef".to_string(),
            public_ip: "10.0.0.1".to_string(),
            metadata: HashMap::new(),
        };
        assert_eq!(machine.legend(), "01234567.../10.0.0.1");
    }

    #[test]
    fn test_machine_short_id_handles_short_and_multibyte_ids() {
        let short = MachineState {
            id: "abc".to_string(),
            public_ip: String::new(),
            metadata: HashMap::new(),
        };
        assert_eq!(short.short_id(), "abc");

        let multibyte = MachineState {
            id: "01234ééé9abcdef".to_string(),
            public_ip: String::new(),
            metadata: HashMap::new(),
        };
        assert_eq!(multibyte.short_id(), "01234ééé");
    }
}
