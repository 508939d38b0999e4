//! Command handlers.

use crate::config::{CliConfig, OutputFormat};
use console::style;
use retrig_core::memory::{BackendCall, MemoryCi, Snapshot};
use retrig_core::{BuilderName, RepoName, RequestId, Revision};
use retrig_scheduler::batch::request_tag;
use retrig_scheduler::{
    RangeReport, RevisionAction, TriggerEngine, TriggerOutcome, TriggerRequest, TriggerSession,
};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

type HandlerResult = Result<(), Box<dyn std::error::Error>>;

/// An engine wired to a snapshot world.
pub struct Context {
    pub ci: Arc<MemoryCi>,
    pub engine: TriggerEngine,
    pub format: OutputFormat,
}

impl Context {
    /// Build the engine selected by `config` over the snapshot at `snapshot`,
    /// or the configured one.
    pub fn connect(
        config: &CliConfig,
        snapshot: Option<PathBuf>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let path = snapshot
            .or_else(|| config.snapshot.clone())
            .ok_or("No snapshot configured (use --snapshot or `retrig config set snapshot <path>`)")?;
        tracing::debug!(path = %path.display(), backend = ?config.backend, "Loading snapshot");

        let ci = Arc::new(MemoryCi::from_file(&path)?);
        let mut engine = TriggerEngine::from_world(ci.clone(), config.backend);
        engine.set_query_source(config.query_source);
        if let Some(builders_file) = &config.builders_file {
            engine = engine.with_builders_file(builders_file);
        }

        Ok(Self {
            ci,
            engine,
            format: config.output_format,
        })
    }

    /// Print `value`, then the backend calls it caused.
    async fn emit<T: Serialize>(&self, value: &T, render: impl Fn(&T)) -> HandlerResult {
        let calls = self.ci.calls().await;
        match self.format {
            OutputFormat::Json => {
                let output = json!({ "result": value, "calls": calls });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                render(value);
                print_calls(self.engine.backend().name(), &calls)?;
            }
        }
        Ok(())
    }
}

/// Trigger a builder on one revision.
pub async fn trigger(
    ctx: &Context,
    builder: String,
    revision: Revision,
    times: u32,
    files: Vec<String>,
    no_build: bool,
    dry_run: bool,
) -> HandlerResult {
    let request = TriggerRequest::new(builder)
        .times(times)
        .files(files)
        .dry_run(dry_run)
        .trigger_build_if_missing(!no_build)
        .extra_properties(request_tag("trigger_job", json!({})));

    let mut session = TriggerSession::new();
    let outcome = ctx
        .engine
        .trigger_job(&mut session, &revision, &request)
        .await?;
    ctx.emit(&outcome, print_outcome).await
}

/// Get a builder to `times` runs on every revision between two pushes.
pub async fn range(
    ctx: &Context,
    builder: String,
    from: Revision,
    to: Revision,
    times: u32,
    dry_run: bool,
) -> HandlerResult {
    let builder = BuilderName::new(builder);
    let (repo, _) = ctx.engine.query_repo_of(&builder).await?;
    let revisions = ctx.engine.query_revisions_range(&repo, &from, &to).await?;

    let request = TriggerRequest::new(builder)
        .times(times)
        .dry_run(dry_run)
        .extra_properties(request_tag("trigger_range", json!({ "times": times })));
    let mut session = TriggerSession::new();
    let report = ctx
        .engine
        .trigger_range(&mut session, &revisions, &request)
        .await?;
    ctx.emit(&report, print_report).await
}

/// Backfill a builder before a revision.
pub async fn backfill(
    ctx: &mut Context,
    builder: String,
    revision: Revision,
    max_revisions: usize,
    auto: bool,
    dry_run: bool,
) -> HandlerResult {
    let builder = BuilderName::new(builder);
    let mut session = TriggerSession::new();

    let report = if auto {
        let (_, repo_url) = ctx.engine.query_repo_of(&builder).await?;
        let revisions = ctx
            .engine
            .find_backfill_revlist(&repo_url, &revision, max_revisions, &builder)
            .await?;
        let request = TriggerRequest::new(builder)
            .dry_run(dry_run)
            .extra_properties(request_tag("auto_backfill", json!({})));
        ctx.engine
            .trigger_range(&mut session, &revisions, &request)
            .await?
    } else {
        ctx.engine
            .manual_backfill(&mut session, &revision, &builder, max_revisions, dry_run)
            .await?
    };

    ctx.emit(&report, |report| {
        if report.revisions.is_empty() {
            println!("{} Nothing to backfill", style("i").blue());
        }
        print_report(report);
    })
    .await
}

/// Trigger the builders of a repository that have no job on a revision.
pub async fn missing(ctx: &Context, repo: String, revision: Revision, dry_run: bool) -> HandlerResult {
    let repo = RepoName::new(repo);
    let mut session = TriggerSession::new();
    let reports = ctx
        .engine
        .trigger_missing_jobs_for_revision(&mut session, &repo, &revision, dry_run)
        .await?;
    ctx.emit(&reports, |reports| reports.iter().for_each(print_report))
        .await
}

/// Trigger the builders of a suite on a revision.
pub async fn suite(
    ctx: &Context,
    repo: String,
    revision: Revision,
    suite: String,
    times: u32,
    dry_run: bool,
) -> HandlerResult {
    let repo = RepoName::new(repo);
    let mut session = TriggerSession::new();
    let reports = ctx
        .engine
        .trigger_suite_jobs(&mut session, &repo, &revision, &suite, times, dry_run)
        .await?;

    ctx.emit(&reports, |reports| {
        if reports.is_empty() {
            println!(
                "{} No builder of {} matches suite {}",
                style("!").yellow(),
                style(&repo).bold(),
                style(&suite).bold()
            );
        }
        reports.iter().for_each(print_report);
    })
    .await
}

/// Cancel a build request.
pub async fn cancel(ctx: &Context, repo: String, request_id: String) -> HandlerResult {
    println!("Cancelling request {}...", style(&request_id).bold());
    ctx.engine
        .cancel(&RepoName::new(repo), &RequestId::new(request_id))
        .await?;
    println!("{} Request cancelled", style("✓").green());
    Ok(())
}

/// List known builders.
pub async fn list_builders(ctx: &Context, filter: Option<String>) -> HandlerResult {
    let mut builders = ctx.engine.query_builders().await?;
    if let Some(filter) = &filter {
        builders.retain(|b| b.as_str().contains(filter.as_str()));
    }
    builders.sort();

    match ctx.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&builders)?),
        OutputFormat::Table => {
            if builders.is_empty() {
                println!("{} No builders found", style("i").blue());
            }
            for builder in &builders {
                println!("  {}", builder);
            }
        }
    }
    Ok(())
}

/// List the revisions between two pushes, oldest first.
pub async fn revisions(ctx: &Context, repo: String, from: Revision, to: Revision) -> HandlerResult {
    let revisions = ctx
        .engine
        .query_revisions_range(&RepoName::new(repo), &from, &to)
        .await?;

    match ctx.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&revisions)?),
        OutputFormat::Table => revisions.iter().for_each(|r| println!("  {}", r)),
    }
    Ok(())
}

/// Print the JSON schema of snapshot files.
pub fn schema() -> HandlerResult {
    let schema = schemars::schema_for!(Snapshot);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn print_outcome(outcome: &TriggerOutcome) {
    let revision = &outcome.revision;
    if let Some(reason) = &outcome.blocked {
        println!("{} {}: {}", style("!").yellow(), revision, reason);
    } else if let Some(builder) = &outcome.triggered {
        let note = if builder == &outcome.requested {
            String::new()
        } else {
            format!(" (needed by {})", outcome.requested)
        };
        let simulated = outcome.results.iter().any(|r| r.dry_run);
        println!(
            "{} {}: requested {} {} time(s){}{}",
            style("✓").green(),
            revision,
            style(builder).bold(),
            outcome.results.len(),
            note,
            if simulated { " [dry-run]" } else { "" }
        );
    }

    for result in outcome.results.iter().filter(|r| !r.is_success()) {
        println!(
            "{} {}: request not accepted (HTTP {})",
            style("!").yellow(),
            revision,
            result.http_status
        );
    }
    for failure in &outcome.failures {
        println!("{} {}: {}", style("✗").red(), revision, failure);
    }
}

fn print_report(report: &RangeReport) {
    println!(
        "{} x{}",
        style(&report.builder).bold(),
        report.times
    );
    for (revision, action) in &report.revisions {
        match action {
            RevisionAction::InvalidRevision => {
                println!("{} {}: not a valid push", style("-").dim(), revision)
            }
            RevisionAction::Satisfied { potential } => println!(
                "{} {}: {} job(s) already there",
                style("✓").green(),
                revision,
                potential
            ),
            RevisionAction::Retriggered {
                request_id,
                count,
                results,
                failures,
            } => {
                let accepted = results.iter().filter(|r| r.is_success()).count();
                let marker = if failures.is_empty() && accepted == results.len() {
                    style("↻").cyan()
                } else {
                    style("!").yellow()
                };
                let dry_run = results.iter().any(|r| r.dry_run);
                println!(
                    "{} {}: retriggered request {} {} time(s), {}/{} accepted{}",
                    marker,
                    revision,
                    request_id,
                    count,
                    accepted,
                    results.len() + failures.len(),
                    if dry_run { " [dry-run]" } else { "" }
                );
                for error in failures {
                    println!("    {} {}", style("✗").red(), error);
                }
            }
            RevisionAction::Triggered(outcome) => print_outcome(outcome),
            RevisionAction::Failed { error } => {
                println!("{} {}: {}", style("✗").red(), revision, error)
            }
        }
    }
}

fn print_calls(backend: &str, calls: &[BackendCall]) -> HandlerResult {
    if calls.is_empty() {
        println!("\n{} No requests sent", style("i").blue());
        return Ok(());
    }
    println!(
        "\n{} request(s) sent to the {} backend:",
        calls.len(),
        style(backend).bold()
    );
    for call in calls {
        println!("  {}", serde_json::to_string(call)?);
    }
    Ok(())
}

/// Show current configuration.
pub fn show_config(config: &CliConfig) -> HandlerResult {
    println!("Current configuration:");
    println!("  query_source: {:?}", config.query_source);
    println!("  backend: {:?}", config.backend);
    println!(
        "  snapshot: {}",
        config
            .snapshot
            .as_ref()
            .map_or("(not set)".to_string(), |p| p.display().to_string())
    );
    println!(
        "  builders_file: {}",
        config
            .builders_file
            .as_ref()
            .map_or("(not set)".to_string(), |p| p.display().to_string())
    );
    println!("  output_format: {:?}", config.output_format);

    if let Ok(path) = CliConfig::config_path() {
        println!("\nConfig file: {}", path.display());
    }

    Ok(())
}

/// Set configuration.
pub fn set_config(key: &str, value: &str) -> HandlerResult {
    let mut config = CliConfig::load().unwrap_or_default();
    config.set(key, value)?;
    config.save()?;

    println!("{} Set {} = {}", style("✓").green(), key, value);
    Ok(())
}
