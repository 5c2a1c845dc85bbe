use super::{BackendKind, Layer, ProbeOutcome, SqlCommand, StagePlan, WarehouseBackend};
use crate::config::PostgresConfig;
use crate::error::{EtlError, Result};
use async_trait::async_trait;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, info};

/// Primary warehouse backend (PostgreSQL).
///
/// Every stage runs as a server-side procedure; the bronze layer first
/// truncates its raw tables so a rerun of the same interval cannot duplicate
/// rows.
pub struct PostgresBackend {
    config: PostgresConfig,
}

impl PostgresBackend {
    pub fn new(config: PostgresConfig) -> Self {
        Self { config }
    }

    fn connection_url(&self) -> Result<String> {
        if let Ok(url) = std::env::var("DWH_POSTGRES_URL") {
            if !url.trim().is_empty() {
                return Ok(url);
            }
        }
        self.config.url.clone().ok_or_else(|| {
            EtlError::Connectivity(
                "no PostgreSQL connection URL configured (set [postgres].url or DWH_POSTGRES_URL)"
                    .to_string(),
            )
        })
    }

    /// Opens a fresh session. Each stage command gets its own connection, so
    /// a retry never reuses a possibly-broken one.
    async fn connect(&self) -> Result<Client> {
        let url = self.connection_url()?;
        let (client, connection) = tokio_postgres::connect(&url, NoTls)
            .await
            .map_err(|e| EtlError::Connectivity(format!("connect failed: {}", e)))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("postgres connection task ended: {}", e);
            }
        });
        Ok(client)
    }
}

#[async_trait]
impl WarehouseBackend for PostgresBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn probe(&self) -> Result<ProbeOutcome> {
        let client = self.connect().await?;
        let row = client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| EtlError::Connectivity(format!("liveness query failed: {}", e)))?;
        let sentinel: i32 = row
            .try_get(0)
            .map_err(|e| EtlError::Connectivity(format!("liveness row unreadable: {}", e)))?;
        if sentinel != 1 {
            return Err(EtlError::Connectivity(format!(
                "liveness query returned {} instead of 1",
                sentinel
            )));
        }
        info!("PostgreSQL connection successful");
        Ok(ProbeOutcome::Alive)
    }

    fn plan(&self, layer: Layer) -> StagePlan {
        match layer {
            // Truncate-then-load: the ordering is part of the stage, the load
            // must never run against non-empty raw tables.
            Layer::Bronze => StagePlan::Sql(vec![
                SqlCommand {
                    label: "truncate_crm_cust_info",
                    sql: "TRUNCATE TABLE bronze.crm_cust_info;",
                },
                SqlCommand {
                    label: "truncate_crm_prd_info",
                    sql: "TRUNCATE TABLE bronze.crm_prd_info;",
                },
                SqlCommand {
                    label: "truncate_crm_sales_details",
                    sql: "TRUNCATE TABLE bronze.crm_sales_details;",
                },
                SqlCommand {
                    label: "truncate_erp_cust_az12",
                    sql: "TRUNCATE TABLE bronze.erp_cust_az12;",
                },
                SqlCommand {
                    label: "truncate_erp_loc_a101",
                    sql: "TRUNCATE TABLE bronze.erp_loc_a101;",
                },
                SqlCommand {
                    label: "truncate_erp_px_cat_g1v2",
                    sql: "TRUNCATE TABLE bronze.erp_px_cat_g1v2;",
                },
                SqlCommand {
                    label: "load_bronze",
                    sql: "SELECT bronze.load_bronze();",
                },
            ]),
            Layer::Silver => StagePlan::Sql(vec![SqlCommand {
                label: "load_silver",
                sql: "SELECT silver.load_silver();",
            }]),
            Layer::Gold => StagePlan::Sql(vec![
                // Gold is views today; becomes a materialized-view refresh
                // once those land.
                SqlCommand {
                    label: "refresh_gold_views",
                    sql: "SELECT 1;",
                },
                SqlCommand {
                    label: "validate_gold_data",
                    sql: "SELECT * FROM gold.validate_data_quality();",
                },
            ]),
        }
    }

    async fn execute(&self, command: &SqlCommand) -> Result<()> {
        let client = self.connect().await?;
        debug!(label = command.label, "executing warehouse command");
        client.batch_execute(command.sql).await?;
        Ok(())
    }
}
