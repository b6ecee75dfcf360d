//! Rolling-update configuration.

use std::path::PathBuf;
use std::time::Duration;

use streamroll_catalog::ServiceInstance;

/// Configuration for one rolling-update run.
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    /// Target service name in the registry catalog.
    pub service: String,

    /// Registry datacenter.
    pub datacenter: String,

    /// Image tag the service is being rolled to. Drives the claim tag
    /// (`update=<image>`) and the convergence tag (`image=<image>`).
    pub target_image: String,

    /// Directory of unit files; must contain `<service>@.service`.
    pub units_dir: PathBuf,

    /// Metrics endpoint URL template; `{node}`, `{address}` and `{port}`
    /// placeholders are substituted per instance.
    pub status_url_template: String,

    /// Sleep at the head of every cycle.
    pub cycle_interval: Duration,

    /// Interval between drain polls.
    pub drain_poll_interval: Duration,

    /// Interval between unit state polls.
    pub state_poll_interval: Duration,

    /// Settle sleep between destroying and recreating a unit.
    pub destroy_settle: Duration,

    /// Settle sleep after the recreated unit has started.
    pub recreate_settle: Duration,
}

impl UpdateConfig {
    pub fn new(
        service: impl Into<String>,
        datacenter: impl Into<String>,
        target_image: impl Into<String>,
        units_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            service: service.into(),
            datacenter: datacenter.into(),
            target_image: target_image.into(),
            units_dir: units_dir.into(),
            status_url_template: "http://{node}:8087/v2/servers/_defaultServer_/status"
                .to_string(),
            cycle_interval: Duration::from_secs(3),
            drain_poll_interval: Duration::from_secs(3),
            state_poll_interval: Duration::from_millis(500),
            destroy_settle: Duration::from_secs(3),
            recreate_settle: Duration::from_secs(30),
        }
    }

    /// Metrics endpoint URL for one instance.
    pub fn status_url(&self, instance: &ServiceInstance) -> String {
        render_status_url(&self.status_url_template, instance)
    }

    /// Path of the template unit file the service is recreated from.
    pub fn template_unit_path(&self) -> PathBuf {
        self.units_dir.join(format!("{}@.service", self.service))
    }
}

/// Substitute the `{node}`, `{address}` and `{port}` placeholders of a
/// metrics URL template for one instance.
pub fn render_status_url(template: &str, instance: &ServiceInstance) -> String {
    template
        .replace("{node}", &instance.node)
        .replace("{address}", &instance.address)
        .replace("{port}", &instance.port.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn edge_instance() -> ServiceInstance {
        ServiceInstance {
            node: "edge0001".to_string(),
            address: "10.0.0.1".to_string(),
            tagged_addresses: HashMap::new(),
            datacenter: "dc1".to_string(),
            service_id: "wz-1".to_string(),
            service_name: "wz".to_string(),
            tags: vec![],
            port: 8087,
        }
    }

    #[test]
    fn test_render_status_url_substitutes_all_placeholders() {
        let url = render_status_url("http://{node}:{port}/status?addr={address}", &edge_instance());
        assert_eq!(url, "http://edge0001:8087/status?addr=10.0.0.1");
    }

    #[test]
    fn test_status_url_substitution() {
        let config = UpdateConfig::new("wz", "dc1", "v2", "/units");
        let instance = ServiceInstance {
            node: "edge0001".to_string(),
            address: "10.0.0.1".to_string(),
            tagged_addresses: HashMap::new(),
            datacenter: "dc1".to_string(),
            service_id: "wz-1".to_string(),
            service_name: "wz".to_string(),
            tags: vec![],
            port: 8087,
        };

        assert_eq!(
            config.status_url(&instance),
            "http://edge0001:8087/v2/servers/_defaultServer_/status"
        );
    }

    #[test]
    fn test_template_unit_path() {
        let config = UpdateConfig::new("wz", "dc1", "v2", "/units");
        assert_eq!(
            config.template_unit_path(),
            PathBuf::from("/units/wz@.service")
        );
    }
}
