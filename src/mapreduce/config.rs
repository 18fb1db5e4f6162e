use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::WorkerError;

/// How many remote calls a worker services before it stops listening.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum CallBudget {
    #[default]
    Unlimited,
    Limited(u64),
}

impl CallBudget {
    /// Consumes one call. Returns `false` when nothing was left.
    pub fn try_take(&mut self) -> bool {
        match self {
            CallBudget::Unlimited => true,
            CallBudget::Limited(0) => false,
            CallBudget::Limited(n) => {
                *n -= 1;
                true
            }
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, CallBudget::Limited(0))
    }
}

/// Negative values mean unlimited.
impl From<i64> for CallBudget {
    fn from(n: i64) -> Self {
        u64::try_from(n).map_or(CallBudget::Unlimited, CallBudget::Limited)
    }
}

impl From<CallBudget> for i64 {
    fn from(budget: CallBudget) -> Self {
        match budget {
            CallBudget::Unlimited => -1,
            CallBudget::Limited(n) => i64::try_from(n).unwrap_or(i64::MAX),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Endpoint of the coordinator's `Master` service, e.g. `http://127.0.0.1:50051`.
    pub coordinator: String,
    pub listen: SocketAddr,
    /// Identity sent to the coordinator. Defaults to `http://<bound address>`.
    #[serde(default)]
    pub advertise: Option<String>,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default)]
    pub call_budget: CallBudget,
    /// Exit the process after a `Shutdown` call instead of only stopping the server.
    #[serde(default)]
    pub exit_on_shutdown: bool,
    #[serde(default = "default_exit_grace_ms")]
    pub exit_grace_ms: u64,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("mr-tmp")
}

fn default_exit_grace_ms() -> u64 {
    1000
}

impl WorkerConfig {
    pub fn new(coordinator: impl Into<String>, listen: SocketAddr) -> Self {
        Self {
            coordinator: coordinator.into(),
            listen,
            advertise: None,
            work_dir: default_work_dir(),
            call_budget: CallBudget::Unlimited,
            exit_on_shutdown: false,
            exit_grace_ms: default_exit_grace_ms(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, WorkerError> {
        let contents = fs::read_to_string(path).map_err(|source| WorkerError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| WorkerError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn with_call_budget(mut self, budget: CallBudget) -> Self {
        self.call_budget = budget;
        self
    }

    pub fn with_exit_on_shutdown(mut self, exit: bool) -> Self {
        self.exit_on_shutdown = exit;
        self
    }

    pub fn exit_grace(&self) -> Duration {
        Duration::from_millis(self.exit_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_counts_down_to_exhaustion() {
        let mut budget = CallBudget::Limited(2);
        assert!(budget.try_take());
        assert!(!budget.is_exhausted());
        assert!(budget.try_take());
        assert!(budget.is_exhausted());
        assert!(!budget.try_take());
    }

    #[test]
    fn unlimited_budget_never_runs_out() {
        let mut budget = CallBudget::from(-1);
        for _ in 0..1000 {
            assert!(budget.try_take());
        }
        assert!(!budget.is_exhausted());
    }

    #[test]
    fn loads_json_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.json");
        fs::write(
            &path,
            r#"{
                "coordinator": "http://127.0.0.1:50051",
                "listen": "127.0.0.1:7001",
                "call_budget": 10
            }"#,
        )
        .unwrap();

        let config = WorkerConfig::load(&path).unwrap();
        assert_eq!(config.coordinator, "http://127.0.0.1:50051");
        assert_eq!(config.listen, "127.0.0.1:7001".parse().unwrap());
        assert_eq!(config.call_budget, CallBudget::Limited(10));
        assert_eq!(config.work_dir, PathBuf::from("mr-tmp"));
        assert!(!config.exit_on_shutdown);
        assert_eq!(config.exit_grace(), Duration::from_secs(1));
    }

    #[test]
    fn negative_budget_in_json_is_unlimited() {
        let budget: CallBudget = serde_json::from_str("-1").unwrap();
        assert_eq!(budget, CallBudget::Unlimited);
        assert_eq!(serde_json::to_string(&CallBudget::Unlimited).unwrap(), "-1");
    }

    #[test]
    fn bad_config_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.json");
        fs::write(&path, "{").unwrap();
        let err = WorkerConfig::load(&path).unwrap_err();
        assert!(matches!(err, WorkerError::ConfigParse { .. }), "{err}");
        assert!(err.to_string().contains("worker.json"));
    }

    #[test]
    fn missing_config_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = WorkerConfig::load(&dir.path().join("absent.json")).unwrap_err();
        match err {
            WorkerError::ConfigRead { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound)
            }
            other => panic!("unexpected error {other}"),
        }
    }
}
