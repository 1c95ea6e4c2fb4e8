//! Cluster resolution and variable partitioning for parameter-server training.
//!
//! This module only covers the contract a trainer needs from a strategy:
//! read the cluster layout from `TF_CONFIG` and size a variable partitioner
//! to the number of parameter-server (`"ps"`) tasks. Running the cluster is
//! the trainer's job.

use crate::error::{GnnError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env::VarError;

/// Environment variable holding the cluster description.
pub const TF_CONFIG: &str = "TF_CONFIG";
/// Job name of parameter servers.
pub const PS_JOB: &str = "ps";
/// Default lower bound on the size of one variable shard (256 KiB).
pub const DEFAULT_MIN_SHARD_BYTES: usize = 256 << 10;

/// Job name → task addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterSpec {
    jobs: BTreeMap<String, Vec<String>>,
}

impl ClusterSpec {
    pub fn new(jobs: BTreeMap<String, Vec<String>>) -> Self {
        Self { jobs }
    }

    /// Number of tasks in `job`; 0 for an unknown job.
    pub fn num_tasks(&self, job: &str) -> usize {
        self.jobs.get(job).map_or(0, Vec::len)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &str> {
        self.jobs.keys().map(String::as_str)
    }

    pub fn task_address(&self, job: &str, index: usize) -> Option<&str> {
        self.jobs.get(job)?.get(index).map(String::as_str)
    }
}

/// The task this process runs as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub index: usize,
}

#[derive(Debug, Default, Deserialize)]
struct TfConfig {
    #[serde(default)]
    cluster: ClusterSpec,
    #[serde(default)]
    task: Option<TaskSpec>,
    #[serde(default)]
    rpc_layer: Option<String>,
}

/// Resolves the cluster from a `TF_CONFIG` JSON document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TfConfigClusterResolver {
    cluster_spec: ClusterSpec,
    task: Option<TaskSpec>,
    rpc_layer: Option<String>,
}

impl TfConfigClusterResolver {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: TfConfig = serde_json::from_str(json)?;
        Ok(Self {
            cluster_spec: config.cluster,
            task: config.task,
            rpc_layer: config.rpc_layer,
        })
    }

    /// Reads `TF_CONFIG`; an unset or empty variable yields an empty cluster.
    pub fn from_env() -> Result<Self> {
        Self::from_var(std::env::var(TF_CONFIG))
    }

    fn from_var(var: std::result::Result<String, VarError>) -> Result<Self> {
        match var {
            Ok(json) if !json.trim().is_empty() => Self::from_json(&json),
            Ok(_) | Err(VarError::NotPresent) => {
                log::debug!("{} is not set, resolving an empty cluster", TF_CONFIG);
                Ok(Self::default())
            }
            Err(VarError::NotUnicode(_)) => Err(GnnError::InvalidConfig(format!(
                "{} is not valid unicode",
                TF_CONFIG
            ))),
        }
    }

    pub fn cluster_spec(&self) -> &ClusterSpec {
        &self.cluster_spec
    }

    pub fn task_type(&self) -> Option<&str> {
        self.task.as_ref().map(|t| t.task_type.as_str())
    }

    pub fn task_id(&self) -> Option<usize> {
        self.task.as_ref().map(|t| t.index)
    }

    pub fn rpc_layer(&self) -> Option<&str> {
        self.rpc_layer.as_deref()
    }

    /// Address of this process, if it appears in the cluster.
    pub fn master(&self) -> Option<String> {
        let task = self.task.as_ref()?;
        let address = self.cluster_spec.task_address(&task.task_type, task.index)?;
        Some(match &self.rpc_layer {
            Some(rpc) => format!("{}://{}", rpc, address),
            None => address.to_string(),
        })
    }
}

/// Splits a variable into as many shards as allowed while keeping every
/// shard at least `min_shard_bytes` large.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinSizePartitioner {
    min_shard_bytes: usize,
    max_shards: usize,
}

impl MinSizePartitioner {
    pub fn new(min_shard_bytes: usize, max_shards: usize) -> Result<Self> {
        if min_shard_bytes == 0 {
            return Err(GnnError::InvalidConfig(
                "min_shard_bytes must be positive".to_string(),
            ));
        }
        if max_shards == 0 {
            return Err(GnnError::InvalidConfig("max_shards must be positive".to_string()));
        }
        Ok(Self {
            min_shard_bytes,
            max_shards,
        })
    }

    /// Partitioner with the default minimum shard size.
    pub fn with_max_shards(max_shards: usize) -> Result<Self> {
        Self::new(DEFAULT_MIN_SHARD_BYTES, max_shards)
    }

    pub fn min_shard_bytes(&self) -> usize {
        self.min_shard_bytes
    }

    pub fn max_shards(&self) -> usize {
        self.max_shards
    }

    /// Number of partitions per dimension of a variable of `shape`.
    ///
    /// Only `axis` is split; every other entry is 1.
    pub fn partition(&self, shape: &[usize], dtype_bytes: usize, axis: usize) -> Result<Vec<usize>> {
        let dim = *shape.get(axis).ok_or_else(|| {
            GnnError::InvalidConfig(format!(
                "cannot partition axis {} of a rank-{} variable",
                axis,
                shape.len()
            ))
        })?;
        let total_bytes = shape
            .iter()
            .try_fold(dtype_bytes, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| {
                GnnError::InvalidConfig(format!(
                    "variable of shape {:?} with {}-byte elements overflows usize",
                    shape, dtype_bytes
                ))
            })?;
        let shards = total_bytes.div_ceil(self.min_shard_bytes);

        let mut partitions = vec![1; shape.len()];
        partitions[axis] = dim.min(self.max_shards).min(shards).max(1);
        Ok(partitions)
    }
}

/// Parameter-server strategy settings derived from a resolved cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterServerStrategy {
    cluster_resolver: TfConfigClusterResolver,
    variable_partitioner: MinSizePartitioner,
}

impl ParameterServerStrategy {
    /// Sizes the partitioner to the number of `"ps"` tasks, using
    /// `min_shard_bytes` when given and the default otherwise.
    pub fn new(
        cluster_resolver: TfConfigClusterResolver,
        min_shard_bytes: Option<usize>,
    ) -> Result<Self> {
        let num_ps = cluster_resolver.cluster_spec().num_tasks(PS_JOB);
        if num_ps == 0 {
            return Err(GnnError::InvalidConfig(
                "parameter-server training needs at least one 'ps' task".to_string(),
            ));
        }
        let variable_partitioner = match min_shard_bytes {
            Some(bytes) => MinSizePartitioner::new(bytes, num_ps)?,
            None => MinSizePartitioner::with_max_shards(num_ps)?,
        };
        log::debug!(
            "parameter-server strategy: {} ps task(s), min shard {} bytes",
            num_ps,
            variable_partitioner.min_shard_bytes()
        );
        Ok(Self {
            cluster_resolver,
            variable_partitioner,
        })
    }

    /// Resolves the cluster from `TF_CONFIG`.
    pub fn from_env(min_shard_bytes: Option<usize>) -> Result<Self> {
        Self::new(TfConfigClusterResolver::from_env()?, min_shard_bytes)
    }

    pub fn cluster_resolver(&self) -> &TfConfigClusterResolver {
        &self.cluster_resolver
    }

    pub fn variable_partitioner(&self) -> &MinSizePartitioner {
        &self.variable_partitioner
    }

    pub fn num_parameter_servers(&self) -> usize {
        self.variable_partitioner.max_shards()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "cluster": {
            "chief": ["chief0:2222"],
            "worker": ["worker0:2222", "worker1:2222"],
            "ps": ["ps0:2222", "ps1:2222", "ps2:2222"]
        },
        "task": {"type": "worker", "index": 1},
        "rpc_layer": "grpc"
    }"#;

    #[test]
    fn test_resolver_from_json() {
        let resolver = TfConfigClusterResolver::from_json(CONFIG).unwrap();
        let spec = resolver.cluster_spec();
        assert_eq!(spec.num_tasks("ps"), 3);
        assert_eq!(spec.num_tasks("worker"), 2);
        assert_eq!(spec.num_tasks("evaluator"), 0);
        assert_eq!(spec.jobs().collect::<Vec<_>>(), vec!["chief", "ps", "worker"]);
        assert_eq!(resolver.task_type(), Some("worker"));
        assert_eq!(resolver.task_id(), Some(1));
        assert_eq!(resolver.master().as_deref(), Some("grpc://worker1:2222"));
    }

    #[test]
    fn test_partition_by_min_shard_size() {
        let partitioner = MinSizePartitioner::new(1024, 8).unwrap();
        // 1000 x 4 x 4 bytes = 16000 bytes -> 16 shards, capped at 8.
        assert_eq!(partitioner.partition(&[1000, 4], 4, 0).unwrap(), vec![8, 1]);
        // 10 x 4 x 4 = 160 bytes -> a single shard.
        assert_eq!(partitioner.partition(&[10, 4], 4, 0).unwrap(), vec![1, 1]);
        // Never more shards than rows.
        assert_eq!(partitioner.partition(&[3, 4096], 4, 0).unwrap(), vec![3, 1]);
        assert_eq!(partitioner.partition(&[4096, 3], 4, 1).unwrap(), vec![1, 3]);
        assert!(partitioner.partition(&[10], 4, 1).is_err());
    }

    #[test]
    fn test_partition_of_oversized_variable_is_an_error() {
        let partitioner = MinSizePartitioner::with_max_shards(4).unwrap();
        assert!(matches!(
            partitioner.partition(&[usize::MAX / 2, 4], 4, 0),
            Err(GnnError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_resolver_from_env_value() {
        let empty = TfConfigClusterResolver::from_var(Err(VarError::NotPresent)).unwrap();
        assert_eq!(empty, TfConfigClusterResolver::default());
        let blank = TfConfigClusterResolver::from_var(Ok("  ".to_string())).unwrap();
        assert_eq!(blank.cluster_spec().num_tasks(PS_JOB), 0);

        let parsed = TfConfigClusterResolver::from_var(Ok(CONFIG.to_string())).unwrap();
        assert_eq!(parsed.cluster_spec().num_tasks(PS_JOB), 3);

        let not_unicode = VarError::NotUnicode(std::ffi::OsString::from("ps"));
        assert!(matches!(
            TfConfigClusterResolver::from_var(Err(not_unicode)),
            Err(GnnError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_partitioner_rejects_zero_bounds() {
        assert!(MinSizePartitioner::new(0, 1).is_err());
        assert!(MinSizePartitioner::new(1, 0).is_err());
        assert_eq!(
            MinSizePartitioner::with_max_shards(2).unwrap().min_shard_bytes(),
            DEFAULT_MIN_SHARD_BYTES
        );
    }

    #[test]
    fn test_parameter_server_strategy() {
        let resolver = TfConfigClusterResolver::from_json(CONFIG).unwrap();

        let strategy = ParameterServerStrategy::new(resolver.clone(), None).unwrap();
        assert_eq!(strategy.num_parameter_servers(), 3);
        assert_eq!(
            strategy.variable_partitioner().min_shard_bytes(),
            DEFAULT_MIN_SHARD_BYTES
        );

        let strategy = ParameterServerStrategy::new(resolver, Some(64)).unwrap();
        assert_eq!(strategy.variable_partitioner().min_shard_bytes(), 64);
        assert_eq!(strategy.variable_partitioner().max_shards(), 3);
    }

    #[test]
    fn test_parameter_server_strategy_needs_ps_tasks() {
        let resolver =
            TfConfigClusterResolver::from_json(r#"{"cluster": {"worker": ["w:1"]}}"#).unwrap();
        assert!(matches!(
            ParameterServerStrategy::new(resolver, None),
            Err(GnnError::InvalidConfig(_))
        ));
    }
}
