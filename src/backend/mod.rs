pub mod oracle;
pub mod postgres;

use crate::config::Config;
use crate::error::{EtlError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use oracle::OracleBackend;
use postgres::PostgresBackend;

/// Closed set of warehouse systems a pipeline run can execute against.
///
/// The selection is fixed when the run is constructed; stages never mix
/// command variants from different backends within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Postgres,
    Oracle,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Postgres => "postgres",
            BackendKind::Oracle => "oracle",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "postgres" => Ok(BackendKind::Postgres),
            "oracle" => Ok(BackendKind::Oracle),
            other => Err(EtlError::Config(format!(
                "Unsupported backend '{}'. Supported: postgres, oracle",
                other
            ))),
        }
    }
}

/// Outcome of the pre-run liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Round trip succeeded and returned the expected sentinel.
    Alive,
    /// No probe is wired for this backend; nothing was verified.
    Skipped,
}

/// The three refinement tiers of the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Bronze,
    Silver,
    Gold,
}

impl Layer {
    pub const ALL: [Layer; 3] = [Layer::Bronze, Layer::Silver, Layer::Gold];

    /// Stage name under which this layer is reported and logged.
    pub fn stage_name(&self) -> &'static str {
        match self {
            Layer::Bronze => "bronze_layer",
            Layer::Silver => "silver_layer",
            Layer::Gold => "gold_layer",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stage_name())
    }
}

/// A single executable command within a layer's plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlCommand {
    pub label: &'static str,
    pub sql: &'static str,
}

/// A layer's resolved command plan for one backend.
#[derive(Debug, Clone)]
pub enum StagePlan {
    /// Commands executed strictly in order; all must succeed.
    Sql(Vec<SqlCommand>),
    /// No execution path exists for this backend yet. `procedure` names the
    /// call that will run once a driver is wired in.
    NotWired { procedure: &'static str },
}

/// Uniform capability every warehouse must provide: probe liveness, resolve
/// a layer into its own command set, and execute one command at a time.
#[async_trait]
pub trait WarehouseBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Trivial round-trip check, run before any transformation starts.
    async fn probe(&self) -> Result<ProbeOutcome>;

    /// Resolve the command plan for one layer.
    fn plan(&self, layer: Layer) -> StagePlan;

    /// Execute one command against a fresh connection.
    async fn execute(&self, command: &SqlCommand) -> Result<()>;
}

/// Resolves the configured selection into a concrete backend.
pub fn create_backend(kind: BackendKind, config: &Config) -> Box<dyn WarehouseBackend> {
    match kind {
        BackendKind::Postgres => Box::new(PostgresBackend::new(config.postgres.clone())),
        BackendKind::Oracle => Box::new(OracleBackend::new(config.oracle.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_round_trips() {
        assert_eq!(BackendKind::from_str("postgres").unwrap(), BackendKind::Postgres);
        assert_eq!(BackendKind::from_str("oracle").unwrap(), BackendKind::Oracle);
        assert_eq!(BackendKind::Postgres.to_string(), "postgres");
    }

    #[test]
    fn test_unknown_backend_kind_is_a_config_error() {
        let err = BackendKind::from_str("mysql").unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
        // case matters, the set is closed
        assert!(BackendKind::from_str("Postgres").is_err());
    }
}
