use crate::config::QualityConfig;
use crate::error::{EtlError, Result};
use async_trait::async_trait;
use tracing::{info, warn};

/// Result of the post-gold validation call. Consumed only to classify the
/// run; the row-level diagnostics are logged, not stored.
#[derive(Debug, Clone)]
pub struct QualityReport {
    pub passed: bool,
    pub diagnostics: Vec<String>,
}

/// Post-gold checkpoint that can fail a run independently of data-movement
/// success.
#[async_trait]
pub trait QualityCheck: Send + Sync {
    async fn validate(&self) -> Result<QualityReport>;
}

/// Runs the external data-quality script. Exit status 0 is a pass; anything
/// else fails the run. The script's internal rules are opaque here.
pub struct ProcessQualityCheck {
    command: String,
    args: Vec<String>,
}

impl ProcessQualityCheck {
    pub fn new(command: &str, args: &[String]) -> Self {
        Self {
            command: command.to_string(),
            args: args.to_vec(),
        }
    }

    pub fn from_config(config: &QualityConfig) -> Self {
        Self::new(&config.command, &config.args)
    }
}

#[async_trait]
impl QualityCheck for ProcessQualityCheck {
    async fn validate(&self) -> Result<QualityReport> {
        info!(command = %self.command, "running data quality checks");
        let output = tokio::process::Command::new(&self.command)
            .args(&self.args)
            .output()
            .await
            .map_err(|e| {
                EtlError::QualityGate(format!(
                    "could not launch quality check '{}': {}",
                    self.command, e
                ))
            })?;

        let diagnostics: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.to_string())
            .collect();

        let passed = output.status.success();
        if passed {
            info!(diagnostics = diagnostics.len(), "data quality checks passed");
        } else {
            warn!(
                exit = ?output.status.code(),
                diagnostics = diagnostics.len(),
                "data quality checks failed"
            );
            for line in &diagnostics {
                warn!(quality_diagnostic = %line);
            }
        }

        Ok(QualityReport {
            passed,
            diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_exit_is_a_pass() {
        let check = ProcessQualityCheck::new("sh", &["-c".to_string(), "echo ok; exit 0".to_string()]);
        let report = check.validate().await.unwrap();
        assert!(report.passed);
        assert_eq!(report.diagnostics, vec!["ok"]);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_a_fail_with_diagnostics() {
        let check = ProcessQualityCheck::new(
            "sh",
            &["-c".to_string(), "echo row_count_mismatch; exit 3".to_string()],
        );
        let report = check.validate().await.unwrap();
        assert!(!report.passed);
        assert_eq!(report.diagnostics, vec!["row_count_mismatch"]);
    }

    #[tokio::test]
    async fn test_unlaunchable_command_is_an_error() {
        let check = ProcessQualityCheck::new("/nonexistent/quality_check", &[]);
        let err = check.validate().await.unwrap_err();
        assert!(matches!(err, EtlError::QualityGate(_)));
    }
}
