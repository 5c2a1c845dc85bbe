use super::{BackendKind, Layer, ProbeOutcome, SqlCommand, StagePlan, WarehouseBackend};
use crate::config::OracleConfig;
use crate::error::{EtlError, Result};
use async_trait::async_trait;
use tracing::info;

/// Alternate warehouse backend (Oracle).
///
/// The PL/SQL command set per layer is fixed below, but no Oracle driver is
/// wired into this deployment yet. The probe reports `Skipped` rather than
/// pretending it verified anything, and every layer resolves to `NotWired`
/// so the run records an explicit no-op instead of a silent pass.
pub struct OracleBackend {
    config: OracleConfig,
}

const BRONZE_PROCEDURE: &str = "BEGIN bronze_etl.load_bronze; END;";
const SILVER_PROCEDURE: &str = "BEGIN silver_etl.load_silver; END;";
const GOLD_PROCEDURE: &str = "BEGIN gold_etl.refresh_materialized_views; END;";

impl OracleBackend {
    pub fn new(config: OracleConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl WarehouseBackend for OracleBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Oracle
    }

    async fn probe(&self) -> Result<ProbeOutcome> {
        info!(
            conn_id = %self.config.conn_id,
            "Oracle connection check not implemented yet; probe skipped"
        );
        Ok(ProbeOutcome::Skipped)
    }

    fn plan(&self, layer: Layer) -> StagePlan {
        match layer {
            Layer::Bronze => StagePlan::NotWired {
                procedure: BRONZE_PROCEDURE,
            },
            Layer::Silver => StagePlan::NotWired {
                procedure: SILVER_PROCEDURE,
            },
            Layer::Gold => StagePlan::NotWired {
                procedure: GOLD_PROCEDURE,
            },
        }
    }

    async fn execute(&self, command: &SqlCommand) -> Result<()> {
        Err(EtlError::Stage {
            stage: command.label.to_string(),
            message: format!(
                "no Oracle driver wired for connection '{}'",
                self.config.conn_id
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_is_explicitly_skipped() {
        let backend = OracleBackend::new(OracleConfig::default());
        assert_eq!(backend.probe().await.unwrap(), ProbeOutcome::Skipped);
    }

    #[test]
    fn test_every_layer_reports_its_procedure_as_unwired() {
        let backend = OracleBackend::new(OracleConfig::default());
        for layer in Layer::ALL {
            match backend.plan(layer) {
                StagePlan::NotWired { procedure } => {
                    assert!(procedure.starts_with("BEGIN "));
                    assert!(procedure.ends_with("END;"));
                }
                StagePlan::Sql(_) => panic!("{} should not be wired", layer),
            }
        }
    }
}
