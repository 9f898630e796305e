//! Command handlers. Each one drives the bot facade and prints either a
//! short table or pretty JSON.

use serde::Serialize;
use trendbot_core::{JobName, PublicationReceipt, Source};
use trendbot_orchestrator::{
    CollectRequest, CycleReport, CycleStep, JobState, PipelineError, TrendBot,
};

const RECENT_RECEIPTS: i64 = 5;

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_time(at: Option<chrono::DateTime<chrono::Utc>>) -> String {
    at.map_or_else(
        || "-".to_string(),
        |t| t.format("%Y-%m-%d %H:%M").to_string(),
    )
}

fn describe_receipt(receipt: &PublicationReceipt) -> String {
    let analysis = receipt
        .analysis_id
        .map_or_else(|| "none".to_string(), |id| format!("#{id}"));
    let detail = receipt
        .external_ref
        .as_deref()
        .or(receipt.error_detail.as_deref())
        .unwrap_or("");
    format!("{} (analysis {analysis}) {detail}", receipt.status)
        .trim_end()
        .to_string()
}

/// # Errors
///
/// Returns an error if collection is already running or the store fails.
pub(crate) async fn run_collect(
    bot: &TrendBot,
    sources: Vec<Source>,
    limit: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let request = CollectRequest {
        sources: (!sources.is_empty()).then_some(sources),
        limit,
    };
    let report = bot.collect_with(request).await?;
    if json {
        return print_json(&report);
    }

    println!(
        "{:<12}{:>8}{:>6}{:>9}{:>11}  NOTE",
        "SOURCE", "FETCHED", "NEW", "UPDATED", "UNCHANGED"
    );
    for source in &report.sources {
        let note = if let Some(error) = &source.error {
            error.clone()
        } else if source.rate_limited {
            format!(
                "rate limited; retry in {}s",
                source.retry_after_secs.unwrap_or_default()
            )
        } else {
            String::new()
        };
        println!(
            "{:<12}{:>8}{:>6}{:>9}{:>11}  {note}",
            source.source, source.fetched, source.new, source.updated, source.unchanged
        );
    }
    println!("outcome: {}", report.outcome());
    Ok(())
}

/// # Errors
///
/// Returns an error for any failure other than an empty window.
pub(crate) async fn run_analyze(bot: &TrendBot, hours_back: u32, json: bool) -> anyhow::Result<()> {
    match bot.analyze(hours_back).await {
        Ok(analysis) if json => print_json(&analysis),
        Ok(analysis) => {
            println!(
                "analysis #{} over {} item(s), sentiment {:+.2}",
                analysis.id,
                analysis.source_item_ids.len(),
                analysis.sentiment_score
            );
            if analysis.moderation_passed {
                println!("{}", analysis.summary_text);
            } else {
                println!("summary withheld by moderation; it will not be published");
            }
            Ok(())
        }
        Err(e @ PipelineError::InsufficientData { .. }) => {
            println!("nothing to analyse: {e}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// # Errors
///
/// Returns an error if publishing is already running or the store fails.
pub(crate) async fn run_publish(bot: &TrendBot, json: bool) -> anyhow::Result<()> {
    let receipt = bot.publish().await?;
    if json {
        return print_json(&receipt);
    }
    println!("receipt #{}: {}", receipt.id, describe_receipt(&receipt));
    Ok(())
}

/// # Errors
///
/// Returns an error if any step hits a store failure.
pub(crate) async fn run_cycle(bot: &TrendBot, json: bool) -> anyhow::Result<()> {
    let report = bot.run_full_cycle().await?;
    if json {
        return print_json(&report);
    }
    print_cycle(&report);
    Ok(())
}

fn print_cycle(report: &CycleReport) {
    let collection = match &report.collection {
        CycleStep::Completed(c) => format!(
            "{} ({} new, {} updated)",
            c.outcome(),
            c.total_new(),
            c.total_updated()
        ),
        CycleStep::Skipped(why) => format!("skipped: {why}"),
        CycleStep::Failed(why) => format!("failed: {why}"),
    };
    let analysis = match &report.analysis {
        CycleStep::Completed(a) => format!("analysis #{}", a.id),
        CycleStep::Skipped(why) => format!("skipped: {why}"),
        CycleStep::Failed(why) => format!("failed: {why}"),
    };
    let publication = match &report.publication {
        CycleStep::Completed(r) => describe_receipt(r),
        CycleStep::Skipped(why) => format!("skipped: {why}"),
        CycleStep::Failed(why) => format!("failed: {why}"),
    };
    println!("collection:  {collection}");
    println!("analysis:    {analysis}");
    println!("publication: {publication}");
}

/// # Errors
///
/// Returns an error if job history or receipts cannot be read.
pub(crate) async fn run_status(bot: &TrendBot, json: bool) -> anyhow::Result<()> {
    let status = bot.status().await?;
    let receipts = trendbot_db::list_receipts(&bot.context().pool, RECENT_RECEIPTS).await?;

    if json {
        return print_json(&serde_json::json!({
            "scheduler": status,
            "recent_receipts": receipts,
        }));
    }

    println!(
        "timers: {}",
        if status.timers_active { "active" } else { "stopped" }
    );
    println!(
        "{:<12}{:<9}{:<17}{:<18}{:<18}ERROR",
        "JOB", "STATE", "LAST OUTCOME", "LAST FINISHED", "NEXT FIRE"
    );
    for job in &status.jobs {
        let state = match job.state {
            JobState::Idle => "idle",
            JobState::Running => "running",
        };
        let outcome = job
            .last_outcome
            .map_or_else(|| "-".to_string(), |o| o.to_string());
        println!(
            "{:<12}{:<9}{:<17}{:<18}{:<18}{}",
            job.job,
            state,
            outcome,
            format_time(job.last_finished_at),
            format_time(job.next_fire_time),
            job.last_error.as_deref().unwrap_or("")
        );
    }

    if !receipts.is_empty() {
        println!();
        println!("recent receipts:");
        for receipt in &receipts {
            println!(
                "  #{:<5}{}  {}",
                receipt.id,
                receipt.published_at.format("%Y-%m-%d %H:%M"),
                describe_receipt(receipt)
            );
        }
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if the job run cannot be recorded.
pub(crate) async fn run_job_now(bot: &TrendBot, job: JobName, json: bool) -> anyhow::Result<()> {
    let Some(run) = bot.run_now(job).await? else {
        println!("{job} is already running; trigger skipped");
        return Ok(());
    };
    if json {
        return print_json(&run);
    }
    println!(
        "{job} run {} finished: {}{}",
        run.public_id,
        run.outcome,
        run.error_detail
            .as_deref()
            .map(|e| format!(" ({e})"))
            .unwrap_or_default()
    );
    Ok(())
}

/// # Errors
///
/// Returns an error if cleanup is already running or the store fails.
pub(crate) async fn run_cleanup(bot: &TrendBot, days: u32, json: bool) -> anyhow::Result<()> {
    let counts = bot.cleanup(days).await?;
    if json {
        return print_json(&counts);
    }
    println!(
        "purged {} item(s), {} analysis result(s), {} job run(s) older than {days} day(s)",
        counts.trend_items, counts.analyses, counts.job_runs
    );
    Ok(())
}

/// # Errors
///
/// Returns an error if the store cannot be read.
pub(crate) async fn run_report(bot: &TrendBot, hours_back: u32, json: bool) -> anyhow::Result<()> {
    let report = bot.report(hours_back).await?;
    if json {
        return print_json(&report);
    }
    print!("{}", report.to_markdown());
    Ok(())
}
