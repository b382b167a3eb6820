use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use remsync::config::Config;
use remsync::logging::init_logging;
use remsync::sync::backoff::RetryPolicy;
use remsync::sync::local::LocalTree;
use remsync::sync::transfer::TransferClient;
use remsync::sync::{HttpRemote, SyncController, SyncItems, SyncResult, SyncSummary, TimestampStore};
use remsync_core::RemoteClient;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CliOptions {
    dry_run: bool,
    accept_review: bool,
    forget: bool,
    json: bool,
    help: bool,
}

fn parse_cli<I>(args: I) -> anyhow::Result<CliOptions>
where
    I: IntoIterator<Item = String>,
{
    let mut options = CliOptions::default();
    for arg in args.into_iter().skip(1) {
        match arg.as_str() {
            "--dry-run" | "-n" => options.dry_run = true,
            "--accept-review" => options.accept_review = true,
            "--forget" => options.forget = true,
            "--json" => options.json = true,
            "--help" | "-h" => options.help = true,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(options)
}

fn print_usage() {
    println!("Usage: remsync [--dry-run] [--accept-review] [--forget] [--json]");
    println!("  --dry-run        Print the synchronization plan and exit");
    println!("  --accept-review  Run operations that need review on a first run");
    println!("  --forget         Clear the project's sync timestamps and exit");
    println!("  --json           Print the plan or the result as JSON");
}

#[derive(Debug, Serialize)]
struct PlanEntry<'a> {
    path: &'a str,
    operation: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct PlanReport<'a> {
    summary: SyncSummary,
    items: Vec<PlanEntry<'a>>,
}

fn plan_report(items: &SyncItems) -> PlanReport<'_> {
    let entries = items
        .iter()
        .map(|item| PlanEntry {
            path: item.path(),
            operation: item.operation().as_str(),
            message: items.validate(item).message().map(str::to_string),
        })
        .collect();
    PlanReport {
        summary: items.summary(),
        items: entries,
    }
}

fn log_plan(report: &PlanReport<'_>) {
    for entry in &report.items {
        match &entry.message {
            Some(message) => {
                tracing::warn!(path = entry.path, operation = entry.operation, reason = %message, "planned")
            }
            None => tracing::info!(path = entry.path, operation = entry.operation, "planned"),
        }
    }
    let summary = report.summary;
    tracing::info!(
        download = summary.download,
        upload = summary.upload,
        delete = summary.delete,
        noop = summary.noop,
        errors = summary.errors,
        warnings = summary.warnings,
        first_run = summary.first_run,
        "synchronization plan"
    );
}

fn log_result(result: &SyncResult) {
    for (category, info) in [
        ("download", &result.download),
        ("upload", &result.upload),
        ("delete", &result.delete),
    ] {
        for (path, reason) in &info.failed {
            tracing::error!(category, path = %path, reason = %reason, "failed");
        }
        for (path, reason) in &info.partially_failed {
            tracing::warn!(category, path = %path, reason = %reason, "partially failed");
        }
        for (path, reason) in &info.ignored {
            tracing::info!(category, path = %path, reason = %reason, "ignored");
        }
        tracing::info!(
            category,
            transferred = info.transferred.len(),
            failed = info.failed.len(),
            runtime_ms = info.runtime.as_millis() as u64,
            "finished"
        );
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();
    let options = parse_cli(std::env::args())?;
    if options.help {
        print_usage();
        return Ok(());
    }

    let config = Config::from_env()?;
    let timestamps = TimestampStore::open(
        &config.db_path,
        config.project.clone(),
        config.local_root.clone(),
    )
    .await
    .context("failed to open timestamp database")?;

    if options.forget {
        let removed = timestamps.clear_project().await?;
        tracing::info!(project = %config.project, removed, "sync timestamps cleared");
        return Ok(());
    }

    let client = RemoteClient::new(&config.remote_url, config.token.clone())
        .context("invalid remote url")?;
    let transfer = TransferClient::with_timeout(config.transfer_timeout)
        .context("failed to build transfer client")?;
    let remote = HttpRemote::new(client, config.remote_root.clone())
        .with_transfer(transfer)
        .with_page_size(config.list_page_size);
    let retry = RetryPolicy::new(
        config.list_retries,
        Duration::from_millis(250),
        Duration::from_secs(5),
        true,
    );
    let controller = SyncController::new(remote, LocalTree::new(&config.local_root), timestamps)
        .with_retry_policy(retry);

    let outcome = run(&controller, options).await;
    controller.finish().await;
    outcome
}

async fn run(controller: &SyncController<HttpRemote>, options: CliOptions) -> anyhow::Result<()> {
    let mut items = controller.prepare().await?;

    {
        let report = plan_report(&items);
        log_plan(&report);
        if options.dry_run {
            if options.json {
                print_json(&report)?;
            }
            return Ok(());
        }
    }

    if items.needs_review() {
        if !options.accept_review {
            anyhow::bail!("the plan contains operations that need review, rerun with --accept-review");
        }
        items.confirm_all_reviews();
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let signal_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current file");
            signal_flag.store(true, Ordering::SeqCst);
        }
    });

    let result = controller.synchronize(&items, cancel).await?;
    log_result(&result);
    if options.json {
        print_json(&result)?;
    }
    if result.cancelled {
        tracing::warn!("synchronization cancelled");
    }
    if result.has_failures() {
        anyhow::bail!("some files failed to synchronize");
    }
    Ok(())
}
