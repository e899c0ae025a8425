//! Resolver configuration, loadable from TOML.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Annotation prefix used when none is configured.
pub const DEFAULT_ANNOTATION_PREFIX: &str = "machine.openshift.io";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscalerConfig {
    /// Prefix for every recognized annotation key.
    pub annotation_prefix: String,
    /// Expose MachineDeployments as scaling groups.
    pub enable_machine_deployments: bool,
    /// Maximum age of the served node-group snapshot, in whole seconds.
    pub refresh_interval_secs: u64,
    /// How long a caller waits for an in-flight refresh before falling
    /// back to the previous snapshot.
    pub refresh_wait_timeout_ms: u64,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            annotation_prefix: DEFAULT_ANNOTATION_PREFIX.to_string(),
            enable_machine_deployments: false,
            refresh_interval_secs: 30,
            refresh_wait_timeout_ms: 5000,
        }
    }
}

impl AutoscalerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Builder method: toggle MachineDeployment grouping.
    pub fn with_machine_deployments(self, enabled: bool) -> Self {
        Self {
            enable_machine_deployments: enabled,
            ..self
        }
    }

    /// Builder method: set the snapshot refresh interval. Sub-second parts
    /// round up to the next whole second.
    pub fn with_refresh_interval(self, interval: Duration) -> Self {
        Self {
            refresh_interval_secs: interval.as_secs() + u64::from(interval.subsec_nanos() > 0),
            ..self
        }
    }

    /// Builder method: set the annotation prefix.
    pub fn with_annotation_prefix(self, prefix: impl Into<String>) -> Self {
        Self {
            annotation_prefix: prefix.into(),
            ..self
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn refresh_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_wait_timeout_ms)
    }

    pub fn annotation_keys(&self) -> AnnotationKeys {
        AnnotationKeys::new(&self.annotation_prefix)
    }
}

/// Fully qualified annotation keys derived from a prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationKeys {
    pub min_size: String,
    pub max_size: String,
    pub cpu_capacity: String,
    pub memory_capacity: String,
    pub pod_capacity: String,
    pub scale_from_zero: String,
    /// Node annotation naming the Machine (`namespace/name`) that
    /// created it.
    pub machine: String,
}

impl AnnotationKeys {
    pub fn new(prefix: &str) -> Self {
        Self {
            min_size: format!("{prefix}/cluster-api-autoscaler-node-group-min-size"),
            max_size: format!("{prefix}/cluster-api-autoscaler-node-group-max-size"),
            cpu_capacity: format!("{prefix}/instance-cpu-capacity"),
            memory_capacity: format!("{prefix}/instance-memory-capacity"),
            pod_capacity: format!("{prefix}/instance-pod-capacity"),
            scale_from_zero: format!("{prefix}/scale-from-zero"),
            machine: format!("{prefix}/machine"),
        }
    }
}

impl Default for AnnotationKeys {
    fn default() -> Self {
        Self::new(DEFAULT_ANNOTATION_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AutoscalerConfig::default();
        assert_eq!(config.refresh_interval(), Duration::from_secs(30));
        assert!(!config.enable_machine_deployments);
        assert_eq!(config.refresh_wait_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn parse_partial_toml_fills_defaults() {
        let config = AutoscalerConfig::from_toml_str(
            r#"
enable_machine_deployments = true
annotation_prefix = "cluster.k8s.io"
"#,
        )
        .unwrap();

        assert!(config.enable_machine_deployments);
        assert_eq!(config.refresh_interval_secs, 30);
        assert_eq!(
            config.annotation_keys().max_size,
            "cluster.k8s.io/cluster-api-autoscaler-node-group-max-size"
        );
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machinescale.toml");
        std::fs::write(&path, "refresh_interval_secs = 10\n").unwrap();

        let config = AutoscalerConfig::from_file(&path).unwrap();
        assert_eq!(config.refresh_interval(), Duration::from_secs(10));
    }

    #[test]
    fn rejects_unknown_types() {
        assert!(AutoscalerConfig::from_toml_str("refresh_interval_secs = \"soon\"").is_err());
    }

    #[test]
    fn builder_methods() {
        let config = AutoscalerConfig::default()
            .with_machine_deployments(true)
            .with_refresh_interval(Duration::from_secs(5))
            .with_annotation_prefix("example.io");

        assert!(config.enable_machine_deployments);
        assert_eq!(config.refresh_interval_secs, 5);
        assert_eq!(config.annotation_keys().scale_from_zero, "example.io/scale-from-zero");
    }

    #[test]
    fn sub_second_refresh_interval_rounds_up() {
        let config = AutoscalerConfig::default().with_refresh_interval(Duration::from_millis(500));
        assert_eq!(config.refresh_interval(), Duration::from_secs(1));

        let config = AutoscalerConfig::default().with_refresh_interval(Duration::from_millis(2001));
        assert_eq!(config.refresh_interval(), Duration::from_secs(3));

        let config = AutoscalerConfig::default().with_refresh_interval(Duration::ZERO);
        assert_eq!(config.refresh_interval(), Duration::ZERO);
    }
}
