//! Resource request attached to every chunk submission.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Partition name that bypasses the cluster scheduler.
pub const LOCAL_PARTITION: &str = "local";

/// Cluster resources requested for one chunk job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub nodes: u32,
    pub gpus_per_node: u32,
    /// One task per GPU unless overridden.
    pub tasks_per_node: u32,
    pub cpus_per_task: u32,
    /// Memory in gigabytes per requested GPU.
    pub mem_gb_per_gpu: u32,
    /// Wall-clock budget in minutes.
    pub timeout_min: u32,
    pub partition: String,
    pub comment: Option<String>,
    /// Comma-separated node list to avoid.
    pub exclude: Option<String>,
    /// Seconds before the time limit at which the job is signalled.
    pub signal_delay_s: u32,
    pub job_name: String,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            nodes: 1,
            gpus_per_node: 1,
            tasks_per_node: 1,
            cpus_per_task: 10,
            mem_gb_per_gpu: 75,
            timeout_min: 4320, // 3 days
            partition: "slurm".to_string(),
            comment: None,
            exclude: None,
            signal_delay_s: 120,
            job_name: "sam_inf".to_string(),
        }
    }
}

impl ResourceSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets GPUs per node; tasks per node follow.
    pub fn with_gpus_per_node(mut self, gpus: u32) -> Self {
        self.gpus_per_node = gpus;
        self.tasks_per_node = gpus;
        self
    }

    pub fn with_nodes(mut self, nodes: u32) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn with_timeout_min(mut self, minutes: u32) -> Self {
        self.timeout_min = minutes;
        self
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = partition.into();
        self
    }

    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment.filter(|c| !c.is_empty());
        self
    }

    pub fn with_exclude(mut self, exclude: Option<String>) -> Self {
        self.exclude = exclude.filter(|e| !e.is_empty());
        self
    }

    /// Total memory requested per node in gigabytes.
    pub fn mem_gb(&self) -> u32 {
        self.mem_gb_per_gpu.saturating_mul(self.gpus_per_node.max(1))
    }

    /// Whether this request selects in-process execution.
    pub fn is_local(&self) -> bool {
        self.partition == LOCAL_PARTITION
    }

    /// Validates the resource request.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` on zero counts, an empty
    /// partition, or values that would break the job script (line breaks in
    /// any directive, double quotes in the quoted comment).
    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            ("nodes", self.nodes),
            ("tasks_per_node", self.tasks_per_node),
            ("cpus_per_task", self.cpus_per_task),
            ("mem_gb_per_gpu", self.mem_gb_per_gpu),
            ("timeout_min", self.timeout_min),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if self.partition.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "partition cannot be empty".to_string(),
            ));
        }

        let single_line = [
            ("partition", Some(&self.partition)),
            ("job_name", Some(&self.job_name)),
            ("comment", self.comment.as_ref()),
            ("exclude", self.exclude.as_ref()),
        ];
        for (name, value) in single_line {
            if value.is_some_and(|v| v.contains('\n') || v.contains('\r')) {
                return Err(ConfigError::InvalidValue {
                    key: name.to_string(),
                    message: "must not contain line breaks".to_string(),
                });
            }
        }

        if self.comment.as_deref().is_some_and(|c| c.contains('"')) {
            return Err(ConfigError::InvalidValue {
                key: "comment".to_string(),
                message: "must not contain double quotes".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let spec = ResourceSpec::default();
        assert_eq!(spec.cpus_per_task, 10);
        assert_eq!(spec.timeout_min, 4320);
        assert_eq!(spec.signal_delay_s, 120);
        assert_eq!(spec.job_name, "sam_inf");
        assert!(spec.validate().is_ok());
        assert!(!spec.is_local());
    }

    #[test]
    fn test_memory_scales_with_gpus() {
        let spec = ResourceSpec::new().with_gpus_per_node(8);
        assert_eq!(spec.tasks_per_node, 8);
        assert_eq!(spec.mem_gb(), 600);
    }

    #[test]
    fn test_empty_comment_is_dropped() {
        let spec = ResourceSpec::new().with_comment(Some(String::new()));
        assert!(spec.comment.is_none());
    }

    #[test]
    fn test_validate_rejects_zero_nodes() {
        let spec = ResourceSpec::new().with_nodes(0);
        assert!(matches!(
            spec.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_validate_rejects_multiline_comment() {
        let spec = ResourceSpec::new().with_comment(Some("a\n#SBATCH --qos=high".to_string()));
        assert!(matches!(
            spec.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_quoted_comment() {
        let spec = ResourceSpec::new().with_comment(Some(r#"run "a""#.to_string()));
        match spec.validate() {
            Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, "comment"),
            other => panic!("expected InvalidValue, got {:?}", other),
        }
        assert!(ResourceSpec::new()
            .with_comment(Some("run 'a'".to_string()))
            .validate()
            .is_ok());
    }

    #[test]
    fn test_local_partition() {
        assert!(ResourceSpec::new().with_partition("local").is_local());
    }
}
