//! Command implementations.
//!
//! Each command returns the process exit code on completion; errors that
//! prevent a command from producing a result are returned as reports and
//! exit with [`EXIT_ERROR`].

use crate::config::CliConfig;
use crate::error::CliError;
use clap::Args;
use flowshift_core::{ReportExt, Result, WorkflowId};
use flowshift_http::HttpTransport;
use flowshift_migration::{
    GraphStatistics, IdMapping, MigrationError, PlannedOperation, TransferOptions,
    TransferOrchestrator, TransferOutcome, TransferStatus, UnresolvedReference, UploadFailure,
    UploadHistory, ValidationOptions, VerificationReport, Validator, Workflow, WorkflowFilter,
    WorkflowGraph, WorkflowTransport,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_TOTAL_FAILURE: u8 = 1;
pub const EXIT_PARTIAL_FAILURE: u8 = 2;
pub const EXIT_ERROR: u8 = 3;

/// Flags for `flowshift transfer`.
#[derive(Debug, Clone, Default, Args)]
pub struct TransferArgs {
    /// Read the batch from an export file instead of the source instance
    #[arg(long)]
    pub from_file: Option<PathBuf>,

    /// Compute and print the plan without touching the destination
    #[arg(long)]
    pub dry_run: bool,

    /// Abort when validation finds duplicates or unresolved references
    #[arg(long)]
    pub strict: bool,

    /// Abort when a call reference has no mapping entry
    #[arg(long)]
    pub strict_remap: bool,

    /// Stop starting new uploads after the first failure
    #[arg(long)]
    pub no_skip_errors: bool,

    /// Reuse workflows created by earlier runs
    #[arg(long)]
    pub skip_existing: bool,

    /// Maximum number of destination calls in flight
    #[arg(long)]
    pub concurrency: Option<usize>,
}

impl TransferArgs {
    /// Applies the flags on top of the configured options.
    pub fn apply(&self, mut options: TransferOptions) -> TransferOptions {
        options.dry_run |= self.dry_run;
        options.strict_validation |= self.strict;
        options.strict_remap |= self.strict_remap;
        options.skip_existing |= self.skip_existing;
        if self.no_skip_errors {
            options.skip_errors = false;
        }
        if let Some(concurrency) = self.concurrency {
            options.concurrency = concurrency;
        }
        options
    }
}

/// Maps a run status to the process exit code.
pub fn exit_code(status: TransferStatus) -> u8 {
    match status {
        TransferStatus::Success => EXIT_SUCCESS,
        TransferStatus::TotalFailure => EXIT_TOTAL_FAILURE,
        TransferStatus::PartialFailure => EXIT_PARTIAL_FAILURE,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value).map_err(|e| CliError::Io {
        details: e.to_string(),
    })?;
    println!("{rendered}");
    Ok(())
}

fn load_export(path: &Path) -> Result<Vec<Workflow>, CliError> {
    let workflows = Workflow::load_batch(path).map_err(|e| CliError::Io {
        details: e.context_message(),
    })?;
    info!(path = %path.display(), workflows = workflows.len(), "loaded export");
    Ok(workflows)
}

async fn load_batch(config: &CliConfig, from_file: Option<&Path>) -> Result<Vec<Workflow>, CliError> {
    if let Some(path) = from_file {
        return load_export(path);
    }

    let source = config.source.clone().ok_or(CliError::MissingSection { section: "source" })?;
    let base_url = source.base_url.clone();
    let transport = HttpTransport::new(source).map_err(|e| CliError::Source {
        details: e.to_string(),
    })?;
    let workflows = transport
        .list(&WorkflowFilter::default())
        .await
        .map_err(|e| CliError::Source {
            details: e.to_string(),
        })?;
    info!(%base_url, workflows = workflows.len(), "listed source instance");
    Ok(workflows)
}

fn destination(config: &CliConfig) -> Result<HttpTransport, CliError> {
    let destination = config
        .destination
        .clone()
        .ok_or(CliError::MissingSection {
            section: "destination",
        })?;
    let transport = HttpTransport::new(destination).map_err(|e| CliError::Config {
        details: e.to_string(),
    })?;
    Ok(transport)
}

fn load_stores(config: &CliConfig) -> Result<(IdMapping, UploadHistory), CliError> {
    let mapping = IdMapping::load(&config.storage.mapping_path).map_err(|e| CliError::Io {
        details: e.context_message(),
    })?;
    let history = UploadHistory::load(&config.storage.history_path).map_err(|e| CliError::Io {
        details: e.context_message(),
    })?;
    Ok((mapping, history))
}

/// `flowshift validate`
pub fn validate(
    config: &CliConfig,
    export: &Path,
    strict: bool,
    output: Option<&Path>,
) -> Result<u8, CliError> {
    let workflows = load_export(export)?;
    let validator = Validator::new(ValidationOptions {
        strict,
        reference_policy: config.transfer.reference_policy.clone(),
    });

    let (report, code) = match validator.validate(&workflows) {
        Ok(report) => (report, EXIT_SUCCESS),
        Err(MigrationError::ValidationFailed { report }) => (report, EXIT_TOTAL_FAILURE),
        Err(other) => {
            return Err(CliError::Engine {
                details: other.to_string(),
            }
            .into());
        }
    };

    if let Some(output) = output {
        let rendered = serde_json::to_string_pretty(&report).map_err(|e| CliError::Io {
            details: e.to_string(),
        })?;
        std::fs::write(output, rendered).map_err(|e| CliError::Io {
            details: format!("{}: {e}", output.display()),
        })?;
        info!(path = %output.display(), "wrote validation report");
    }
    print_json(&report)?;
    Ok(code)
}

#[derive(Debug, Serialize)]
struct GraphSummary {
    order: Vec<WorkflowId>,
    cycle: Vec<WorkflowId>,
    statistics: GraphStatistics,
    external_references: Vec<UnresolvedReference>,
}

/// `flowshift graph`
pub fn graph(config: &CliConfig, export: &Path) -> Result<u8, CliError> {
    let workflows = load_export(export)?;
    let (graph, external_references) =
        WorkflowGraph::from_workflows(&workflows, &config.transfer.reference_policy).map_err(
            |e| CliError::Engine {
                details: e.to_string(),
            },
        )?;
    let topo = graph.topological_order();

    print_json(&GraphSummary {
        order: topo.order,
        cycle: topo.cycle,
        statistics: graph.statistics(),
        external_references,
    })?;
    Ok(EXIT_SUCCESS)
}

#[derive(Debug, Serialize)]
struct TransferSummary {
    run_id: String,
    status: TransferStatus,
    state: String,
    dry_run: bool,
    total: usize,
    created: usize,
    skipped: usize,
    failed: usize,
    updated: usize,
    update_failed: usize,
    elapsed_ms: u64,
    order: Vec<WorkflowId>,
    cycle: Vec<WorkflowId>,
    plan: Vec<PlannedOperation>,
    unresolved: Vec<UnresolvedReference>,
    failures: Vec<UploadFailure>,
    verification: Option<VerificationReport>,
    error: Option<String>,
}

impl From<&TransferOutcome> for TransferSummary {
    fn from(outcome: &TransferOutcome) -> Self {
        Self {
            run_id: outcome.run_id.to_string(),
            status: outcome.status,
            state: outcome.state.to_string(),
            dry_run: outcome.dry_run,
            total: outcome.total,
            created: outcome.created,
            skipped: outcome.skipped,
            failed: outcome.failed,
            updated: outcome.updated,
            update_failed: outcome.update_failed,
            elapsed_ms: u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
            order: outcome.order.clone(),
            cycle: outcome.cycle.clone(),
            plan: outcome.plan.clone(),
            unresolved: outcome.unresolved.clone(),
            failures: outcome.failures.clone(),
            verification: outcome.verification.clone(),
            error: outcome.error.as_ref().map(ToString::to_string),
        }
    }
}

/// `flowshift transfer`
pub async fn transfer(config: &CliConfig, args: &TransferArgs) -> Result<u8, CliError> {
    let options = args.apply(config.transfer.clone());
    let workflows = load_batch(config, args.from_file.as_deref()).await?;
    let (mapping, history) = load_stores(config)?;

    let mut orchestrator = TransferOrchestrator::with_stores(destination(config)?, mapping, history);
    if !options.dry_run {
        orchestrator = orchestrator.persist_to(config.storage.paths());
    }

    let outcome = orchestrator
        .transfer(&workflows, &options)
        .await
        .map_err(|e| CliError::Engine {
            details: e.context_message(),
        })?;

    print_json(&TransferSummary::from(&outcome))?;
    Ok(exit_code(outcome.status))
}

/// `flowshift verify`
pub async fn verify(config: &CliConfig, from_file: Option<&Path>) -> Result<u8, CliError> {
    let workflows = load_batch(config, from_file).await?;
    let (mapping, history) = load_stores(config)?;

    let orchestrator = TransferOrchestrator::with_stores(destination(config)?, mapping, history);
    let report = orchestrator
        .verify_destination(&workflows, &config.transfer)
        .await;

    print_json(&report)?;
    Ok(if report.passed {
        EXIT_SUCCESS
    } else {
        EXIT_PARTIAL_FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_configured_options() {
        let args = TransferArgs {
            dry_run: true,
            no_skip_errors: true,
            concurrency: Some(1),
            ..Default::default()
        };
        let options = args.apply(TransferOptions::default());

        assert!(options.dry_run);
        assert!(!options.skip_errors);
        assert_eq!(options.concurrency, 1);
        assert!(!options.strict_validation);
    }

    #[test]
    fn absent_flags_keep_configured_options() {
        let configured = TransferOptions {
            skip_existing: true,
            concurrency: 9,
            ..Default::default()
        };
        let options = TransferArgs::default().apply(configured.clone());
        assert_eq!(options, configured);
    }

    #[test]
    fn statuses_map_to_exit_codes() {
        assert_eq!(exit_code(TransferStatus::Success), 0);
        assert_eq!(exit_code(TransferStatus::TotalFailure), 1);
        assert_eq!(exit_code(TransferStatus::PartialFailure), 2);
    }

    #[test]
    fn validate_reports_duplicates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let export = dir.path().join("export.json");
        let output = dir.path().join("report.json");
        std::fs::write(
            &export,
            r#"[{ "id": "1", "name": "a", "nodes": [] }, { "id": "1", "name": "b", "nodes": [] }]"#,
        )
        .expect("write");

        let config = CliConfig::default();
        let lenient = validate(&config, &export, false, Some(&output)).expect("validate");
        assert_eq!(lenient, EXIT_SUCCESS);
        let strict = validate(&config, &export, true, None).expect("validate");
        assert_eq!(strict, EXIT_TOTAL_FAILURE);

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).expect("read")).expect("json");
        assert_eq!(written["valid"], serde_json::json!(false));
        assert_eq!(written["duplicateIds"][0].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn missing_export_is_an_io_error() {
        let err = graph(&CliConfig::default(), Path::new("/nonexistent/export.json"))
            .expect_err("missing file");
        assert!(matches!(err.current_context(), CliError::Io { .. }));
    }

    #[tokio::test]
    async fn transfer_without_destination_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let export = dir.path().join("export.json");
        std::fs::write(&export, "[]").expect("write");

        let args = TransferArgs {
            from_file: Some(export),
            ..Default::default()
        };
        let err = transfer(&CliConfig::default(), &args)
            .await
            .expect_err("no destination");
        assert_eq!(
            err.current_context(),
            &CliError::MissingSection {
                section: "destination"
            }
        );
    }
}
