//! Unit files, unit records and naming rules.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SchedulerError;
use crate::state::JobState;

/// Unit types the scheduler recognizes as a name suffix.
const RECOGNIZED_UNIT_TYPES: &[&str] = &[
    "service", "socket", "device", "mount", "automount", "timer", "path",
];

/// Unit type appended when a name carries no recognized suffix.
const DEFAULT_UNIT_TYPE: &str = "service";

/// Characters allowed in a unit name besides ASCII alphanumerics.
const ALLOWED_NAME_PUNCTUATION: &[char] = &[':', '_', '.', '@', '-', '\\'];

const MAX_NAME_LEN: usize = 256;

/// One option line of a unit file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOption {
    pub section: String,
    pub name: String,
    pub value: String,
}

/// An ordered sequence of unit options; the source of truth when creating or
/// recreating a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitFile {
    options: Vec<UnitOption>,
}

impl UnitFile {
    pub fn new(options: Vec<UnitOption>) -> Self {
        Self { options }
    }

    /// Parse INI-style unit file text.
    ///
    /// `[Section]` headers open a section; `Name=Value` lines inside it
    /// become options. Blank lines and `#`/`;` comments are skipped. A value
    /// may contain `=`; only the first one separates name from value.
    pub fn parse(text: &str) -> Result<Self, SchedulerError> {
        let mut options = Vec::new();
        let mut section: Option<String> = None;

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                if header.is_empty() {
                    return Err(SchedulerError::InvalidUnit {
                        name: String::new(),
                        reason: format!("empty section header at line {}", lineno + 1),
                    });
                }
                section = Some(header.to_string());
                continue;
            }

            let current = section.as_ref().ok_or_else(|| SchedulerError::InvalidUnit {
                name: String::new(),
                reason: format!("option before any section header at line {}", lineno + 1),
            })?;

            let (name, value) =
                line.split_once('=')
                    .ok_or_else(|| SchedulerError::InvalidUnit {
                        name: String::new(),
                        reason: format!("malformed option at line {}", lineno + 1),
                    })?;

            options.push(UnitOption {
                section: current.clone(),
                name: name.trim().to_string(),
                value: value.trim().to_string(),
            });
        }

        Ok(Self { options })
    }

    pub fn options(&self) -> &[UnitOption] {
        &self.options
    }

    /// First value of `section`/`name`, if present.
    pub fn lookup(&self, section: &str, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.section == section && o.name == name)
            .map(|o| o.value.as_str())
    }

    /// Global (broadcast) units are replicated across all machines and never
    /// have their current state populated by the scheduler.
    pub fn is_global(&self) -> bool {
        self.lookup("X-Fleet", "Global")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

impl fmt::Display for UnitFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut current: Option<&str> = None;
        for option in &self.options {
            if current != Some(option.section.as_str()) {
                if current.is_some() {
                    writeln!(f)?;
                }
                writeln!(f, "[{}]", option.section)?;
                current = Some(option.section.as_str());
            }
            writeln!(f, "{}={}", option.name, option.value)?;
        }
        Ok(())
    }
}

/// A scheduler job: a named unit plus its lifecycle state pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub name: String,

    #[serde(rename = "desiredState")]
    pub desired_state: JobState,

    /// Observed state; never populated for global units.
    #[serde(rename = "currentState", default, skip_serializing_if = "Option::is_none")]
    pub current_state: Option<JobState>,

    #[serde(rename = "machineID", default, skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<String>,

    #[serde(default)]
    pub options: Vec<UnitOption>,
}

impl Unit {
    pub fn unit_file(&self) -> UnitFile {
        UnitFile::new(self.options.clone())
    }

    pub fn is_global(&self) -> bool {
        self.unit_file().is_global()
    }
}

/// Normalize a unit argument to its registry name: the path base name, with
/// the default unit type appended when no recognized suffix is present.
pub fn mangle_unit_name(arg: impl AsRef<Path>) -> String {
    let base = arg
        .as_ref()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let recognized = base
        .rsplit_once('.')
        .map(|(_, suffix)| RECOGNIZED_UNIT_TYPES.contains(&suffix))
        .unwrap_or(false);

    if recognized {
        base
    } else {
        format!("{base}.{DEFAULT_UNIT_TYPE}")
    }
}

/// Structural information extracted from a unit name.
///
/// `name@.service` is a template; `name@inst.service` is an instance of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitNameInfo {
    /// The full unit name.
    pub full_name: String,

    /// Prefix before any `@`.
    pub prefix: String,

    /// Template name (`prefix@.suffix`) when the name is templated.
    pub template: Option<String>,

    /// Instance part between `@` and the type suffix, when non-empty.
    pub instance: Option<String>,
}

impl UnitNameInfo {
    /// Extract naming information; `None` if the name has no type suffix.
    pub fn parse(name: &str) -> Option<Self> {
        let (stem, suffix) = name.rsplit_once('.')?;
        if !RECOGNIZED_UNIT_TYPES.contains(&suffix) {
            return None;
        }

        match stem.split_once('@') {
            Some((prefix, instance)) => Some(Self {
                full_name: name.to_string(),
                prefix: prefix.to_string(),
                template: Some(format!("{prefix}@.{suffix}")),
                instance: if instance.is_empty() {
                    None
                } else {
                    Some(instance.to_string())
                },
            }),
            None => Some(Self {
                full_name: name.to_string(),
                prefix: stem.to_string(),
                template: None,
                instance: None,
            }),
        }
    }

    /// True for `name@inst.suffix` style names.
    pub fn is_instance(&self) -> bool {
        self.instance.is_some()
    }

    /// True for `name@.suffix` style names.
    pub fn is_template(&self) -> bool {
        self.template.is_some() && self.instance.is_none()
    }
}

/// Validate a unit name against scheduler-imposed constraints.
pub fn validate_name(name: &str) -> Result<(), SchedulerError> {
    if name.is_empty() {
        return Err(SchedulerError::InvalidUnit {
            name: name.to_string(),
            reason: "unit name is empty".to_string(),
        });
    }
    if name.len() > MAX_NAME_LEN {
        return Err(SchedulerError::InvalidUnit {
            name: name.to_string(),
            reason: format!("unit name exceeds {MAX_NAME_LEN} characters"),
        });
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !ALLOWED_NAME_PUNCTUATION.contains(c))
    {
        return Err(SchedulerError::InvalidUnit {
            name: name.to_string(),
            reason: format!("invalid character {bad:?} in unit name"),
        });
    }
    Ok(())
}

/// Validate the option set against scheduler-imposed constraints.
pub fn validate_options(unit_file: &UnitFile) -> Result<(), SchedulerError> {
    for option in unit_file.options() {
        if option.section.is_empty() || option.name.is_empty() {
            return Err(SchedulerError::InvalidUnit {
                name: String::new(),
                reason: "option with empty section or name".to_string(),
            });
        }
    }
    Ok(())
}

/// Non-fatal minimum-requirements check: logs a warning for unit files that
/// are unlikely to run, but never blocks creation.
pub fn check_minimum_requirements(name: &str, unit_file: &UnitFile) {
    if name.ends_with(".service") && unit_file.lookup("Service", "ExecStart").is_none() {
        warn!(unit = %name, "Unit has no Service/ExecStart option");
    }
    if unit_file.is_global() && unit_file.lookup("X-Fleet", "MachineID").is_some() {
        warn!(unit = %name, "Global unit also pins a MachineID");
    }
}
