//! chainswap - DEX router actions and cross-chain bridge swaps
//!
//! One request per invocation: arguments are validated up front, the needed
//! chain clients are connected, and the orchestrator drives approvals, the
//! action itself and, for cross-chain swaps, the bridge protocol.

use clap::error::ErrorKind;
use clap::Parser;
use ethers::utils::{format_ether, format_units};
use std::process::ExitCode;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

mod actions;
mod chain;
mod cli;
mod config;
mod coordination;
mod error;
mod events;
mod metrics;
#[cfg(test)]
mod testing;
mod tx;

use actions::ActionReport;
use cli::{Cli, Invocation};
use config::Settings;
use coordination::{BridgeFailure, BridgeReport, OrchestrationReport, Orchestrator, ResumePoint};
use error::OrchestratorError;
use tx::TransactionOutcome;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    init_logging(cli.log_json);

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: ConfigError: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let invocation = match cli.validate(settings.orchestrator.default_gas_limit) {
        Ok(invocation) => invocation,
        Err(e) => {
            report_orchestrator_error(&e);
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let request_id = Uuid::new_v4();
    let span = info_span!(
        "request",
        id = %request_id,
        action = %invocation.request.kind()
    );
    let result = run(&settings, &invocation, &cancel).instrument(span).await;

    if let Some(path) = &settings.metrics.textfile_path {
        if let Err(e) = metrics::write_textfile(path) {
            warn!("{:#}", e);
        }
    }

    match result {
        Ok(report) => {
            if cli.json {
                match serde_json::to_string_pretty(&report) {
                    Ok(body) => println!("{}", body),
                    Err(e) => {
                        eprintln!("error: failed to serialize report: {}", e);
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                print_report(&invocation, &report);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(
    settings: &Settings,
    invocation: &Invocation,
    cancel: &CancellationToken,
) -> anyhow::Result<OrchestrationReport> {
    info!("Starting chainswap v{}", env!("CARGO_PKG_VERSION"));

    let orchestrator = Orchestrator::connect(
        settings,
        &invocation.request,
        &invocation.endpoints,
        invocation.signer.clone(),
    )
    .await?;

    match invocation.resume {
        Some((transfer_id, from)) => {
            orchestrator
                .resume(&invocation.request, transfer_id, from, cancel)
                .await
        }
        None => orchestrator.run(&invocation.request, cancel).await,
    }
}

fn init_logging(json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chainswap=debug"));

    // stdout is reserved for the report
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

/// Cancel in-flight waits on Ctrl+C or SIGTERM
async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    warn!("Shutdown signal received, cancelling");
    cancel.cancel();
}

fn print_report(invocation: &Invocation, report: &OrchestrationReport) {
    let gas = invocation.request.gas();
    let gas_price = format_units(gas.gas_price, "gwei").unwrap_or_else(|_| gas.gas_price.to_string());
    let target = invocation
        .request
        .token_out()
        .map(|token| format!(" -> {:?}", token))
        .unwrap_or_default();
    println!(
        "{} of {} {:?}{} (gas price {} gwei, limit {})",
        invocation.request.kind(),
        invocation.request.amount_in(),
        invocation.request.token_in(),
        target,
        gas_price,
        gas.gas_limit
    );

    match report {
        OrchestrationReport::Action(report) => print_action(report),
        OrchestrationReport::CrossChain(report) => print_bridge(report),
    }
}

fn print_action(report: &ActionReport) {
    for approval in &report.approvals {
        print_outcome(approval);
    }
    print_outcome(&report.outcome);
    if let Some(balance) = report.native_balance {
        println!("native balance: {}", format_ether(balance));
    }
}

fn print_bridge(report: &BridgeReport) {
    for outcome in &report.outcomes {
        print_outcome(outcome);
    }
    let record = &report.record;
    println!(
        "transfer {} from chain {} to chain {}: {}",
        record
            .transfer_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string()),
        record.source_chain,
        record.destination_chain,
        record.phase
    );
}

fn print_outcome(outcome: &TransactionOutcome) {
    let time = outcome
        .block_time()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| outcome.timestamp.to_string());
    println!(
        "{:<18} {:?} chain {} block {} ({:?}) gas used {} at {} {:?}",
        outcome.label,
        outcome.hash,
        outcome.chain_id,
        outcome.block_number,
        outcome.block_hash,
        outcome.gas_used,
        time,
        outcome.status
    );
}

fn report_error(e: &anyhow::Error) {
    if let Some(failure) = e.downcast_ref::<BridgeFailure>() {
        report_orchestrator_error(&failure.cause);
        eprintln!("  phase: {}", failure.record.phase);
        let resume_from = failure
            .record
            .failed_at()
            .and_then(ResumePoint::after_failure_in);
        match (failure.record.transfer_id, resume_from) {
            (Some(id), Some(from)) => eprintln!(
                "  transferId: {} (funds may be locked; resume with --resume-transfer {} --resume-from {})",
                id,
                id,
                from.name()
            ),
            (Some(id), None) => eprintln!("  transferId: {}", id),
            (None, _) => eprintln!("  transferId: none (no transfer was initiated)"),
        }
        for outcome in &failure.outcomes {
            eprintln!(
                "  confirmed before failure: {} {:?} on chain {}",
                outcome.label, outcome.hash, outcome.chain_id
            );
        }
    } else if let Some(err) = e.downcast_ref::<OrchestratorError>() {
        report_orchestrator_error(err);
    } else {
        eprintln!("error: {:#}", e);
    }
}

fn report_orchestrator_error(err: &OrchestratorError) {
    eprintln!("error: {}: {}", err.kind(), err);
    if let Some(reason) = err.revert_reason() {
        eprintln!("  reason: {}", reason);
    }
    if let Some(code) = err.code() {
        eprintln!("  code: {}", code);
    }
    if err.is_retryable() {
        eprintln!("  a fresh request may succeed");
    }
}
