use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use colored::*;
use dialoguer::{theme::ColorfulTheme, Confirm};
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use queuedash::core::config::Config;
use queuedash::core::store::{RefreshPolicy, SyncStore};
use queuedash::core::task::TaskStatusResponse;
use queuedash::core::tasks::{FileUpload, ResultFormat, SubmitOptions};
use queuedash::core::{ApiClient, ApiError, QueueApi, TaskApi, TaskStatus};
use queuedash::notify::{ConsoleNotifier, DesktopNotifier, Notifier, NotifierSet, Toast};
use queuedash::ui::{config_ui, render};

use crate::{Cli, Commands, SubmitArgs};

/// A failure the user has already been told about.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct Reported(pub String);

struct Context {
    config: Config,
    client: ApiClient,
    notifier: NotifierSet,
    quiet: bool,
}

impl Context {
    fn new(cli: &Cli) -> Result<Self> {
        let mut config = Config::load();
        if let Some(url) = &cli.base_url {
            config.api_base_url = url.clone();
        }
        if let Some(token) = &cli.token {
            config.api_token = Some(token.clone());
        }
        if let Some(timeout) = cli.timeout {
            config.timeout_secs = timeout;
        }

        let client = ApiClient::from_config(&config).context("Cannot set up the HTTP client")?;

        let mut notifier = NotifierSet::new().with(ConsoleNotifier::new(cli.quiet));
        if config.desktop_notifications && !cli.no_desktop {
            notifier.push(Box::new(DesktopNotifier::new()));
        }

        debug!(base_url = %client.base_url(), "Using task service");
        Ok(Self {
            config,
            client,
            notifier,
            quiet: cli.quiet,
        })
    }

    fn tasks(&self) -> TaskApi {
        TaskApi::new(self.client.clone())
    }

    fn queue(&self) -> QueueApi {
        QueueApi::new(self.client.clone())
    }

    fn policy(&self, interval_ms: Option<u64>) -> RefreshPolicy {
        RefreshPolicy {
            interval: interval_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| self.config.refresh_interval()),
            max_backoff_factor: self.config.max_backoff_factor.max(1),
            skip_when_busy: self.config.skip_when_busy,
        }
    }

    fn toast(&self, toast: Toast) {
        self.notifier.notify(&toast.with_duration(self.config.toast_duration()));
    }

    /// Reports a request failure and turns it into the command's error.
    fn fail(&self, err: ApiError, fallback: &str) -> anyhow::Error {
        let toast = Toast::from_error(&err, fallback);
        let message = toast.message.clone();
        self.toast(toast);
        Reported(message).into()
    }

    fn fail_with(&self, toast: Toast) -> anyhow::Error {
        let message = toast.message.clone();
        self.toast(toast);
        Reported(message).into()
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    if let Commands::Config = cli.command {
        return configure();
    }

    let ctx = Context::new(&cli)?;
    match cli.command {
        Commands::Submit(args) => submit(&ctx, args).await,
        Commands::Status {
            ids,
            format,
            upload_images,
            content,
        } => status(&ctx, &ids, format, upload_images, content).await,
        Commands::Wait {
            id,
            interval,
            format,
            content,
        } => wait(&ctx, &id, Duration::from_secs(interval.max(1)), format, content).await,
        Commands::Cancel { ids } => cancel(&ctx, &ids).await,
        Commands::List { status, limit } => list(&ctx, status, limit).await,
        Commands::Stats => stats(&ctx).await,
        Commands::Watch { interval } => watch(&ctx, interval).await,
        Commands::ResetStale { timeout_minutes } => reset_stale(&ctx, timeout_minutes).await,
        Commands::Cleanup { days, yes } => cleanup(&ctx, days, yes).await,
        Commands::Health => health(&ctx).await,
        Commands::Engines => engines(&ctx).await,
        Commands::Config => configure(),
    }
}

fn configure() -> Result<()> {
    let mut config = Config::load();
    if config_ui::show_config_panel(&mut config)? {
        config.save()?;
        println!("{}", "✓ Configuration saved!".green());
    } else {
        println!("{}", "Configuration not saved".yellow());
    }
    Ok(())
}

fn parse_field(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => bail!("Invalid field {:?}, expected KEY=VALUE", raw),
    }
}

async fn submit(ctx: &Context, args: SubmitArgs) -> Result<()> {
    let mut options = SubmitOptions {
        backend: Some(args.backend.unwrap_or(ctx.config.default_backend)),
        lang: Some(args.lang.unwrap_or_else(|| ctx.config.default_lang.clone())),
        method: args.method,
        formula_enable: Some(!args.no_formula),
        table_enable: Some(!args.no_table),
        priority: args.priority,
        ..Default::default()
    };
    for raw in &args.fields {
        let (key, value) = parse_field(raw)?;
        options = options.with_extra(key, value);
    }

    let api = ctx.tasks();
    let mut submitted = Vec::new();
    for path in &args.files {
        let upload = FileUpload::from_path(path)
            .await
            .map_err(|e| ctx.fail(e, "Failed to read file"))?;
        let file_name = upload.file_name.clone();
        let resp = api
            .submit(upload, &options)
            .await
            .map_err(|e| ctx.fail(e, "Failed to submit task"))?;

        ctx.toast(Toast::success(format!("{} submitted as {}", file_name, resp.task_id)));
        println!("{}", resp.task_id);
        submitted.push(resp.task_id);
    }

    if args.wait {
        let interval = Duration::from_secs(args.interval.max(1));
        for id in &submitted {
            wait(ctx, id, interval, ResultFormat::Markdown, false).await?;
        }
    }
    Ok(())
}

fn print_content(resp: &TaskStatusResponse, format: ResultFormat) {
    let data = resp.task.data.as_ref();
    if matches!(format, ResultFormat::Json | ResultFormat::Both) {
        if let Some(json) = data.and_then(|d| d.json_content.as_ref()) {
            match serde_json::to_string_pretty(json) {
                Ok(text) => println!("{}", text),
                Err(e) => debug!(error = %e, "Cannot print JSON result"),
            }
        }
    }
    if format != ResultFormat::Json {
        if let Some(content) = resp.task.content() {
            println!("{}", content);
        }
    }
    if let Some(message) = data.and_then(|d| d.message.as_deref()).or(resp.message.as_deref()) {
        println!("{}", message.dimmed());
    }
}

async fn status(
    ctx: &Context,
    ids: &[String],
    format: ResultFormat,
    upload_images: bool,
    content: bool,
) -> Result<()> {
    let api = ctx.tasks();
    let results = join_all(ids.iter().map(|id| api.get_status(id, upload_images, format))).await;

    let mut failure = None;
    for (id, result) in ids.iter().zip(results) {
        match result {
            Ok(resp) => {
                print!("{}", render::task_detail(&resp.task));
                if content {
                    print_content(&resp, format);
                }
            }
            Err(e) => failure = Some(ctx.fail(e, &format!("Failed to load task {}", id))),
        }
    }
    failure.map_or(Ok(()), Err)
}

async fn wait(
    ctx: &Context,
    id: &str,
    interval: Duration,
    format: ResultFormat,
    content: bool,
) -> Result<()> {
    let spinner = if ctx.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    spinner.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")?);
    spinner.set_message(format!("Waiting for {}", id));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = ctx
        .tasks()
        .wait_for_completion(id, interval, format, |resp| {
            spinner.set_message(format!("{} is {}", id, resp.task.status));
        })
        .await;
    spinner.finish_and_clear();

    let resp = result.map_err(|e| ctx.fail(e, &format!("Failed to poll task {}", id)))?;
    let task = &resp.task;
    match task.status {
        TaskStatus::Completed => {
            let took = task
                .duration()
                .map(|d| format!(" in {}s", d.num_seconds()))
                .unwrap_or_default();
            ctx.toast(Toast::success(format!("{} completed{}", task.file_name, took)));
            if content {
                print_content(&resp, format);
            }
            Ok(())
        }
        TaskStatus::Cancelled => Err(ctx.fail_with(Toast::warning(format!("{} was cancelled", id)))),
        _ => {
            let reason = task.error_message.as_deref().unwrap_or("no error message");
            Err(ctx.fail_with(Toast::error(format!("{} failed: {}", id, reason))))
        }
    }
}

async fn cancel(ctx: &Context, ids: &[String]) -> Result<()> {
    let api = ctx.tasks();
    let results = join_all(ids.iter().map(|id| api.cancel(id))).await;

    let mut failure = None;
    for (id, result) in ids.iter().zip(results) {
        match result {
            Ok(resp) if resp.success => {
                let message = resp
                    .message
                    .unwrap_or_else(|| format!("Cancellation requested for {}", id));
                ctx.toast(Toast::success(message));
            }
            Ok(resp) => {
                let message = resp
                    .message
                    .unwrap_or_else(|| format!("Task {} could not be cancelled", id));
                failure = Some(ctx.fail_with(Toast::warning(message)));
            }
            Err(e) => failure = Some(ctx.fail(e, &format!("Failed to cancel task {}", id))),
        }
    }
    failure.map_or(Ok(()), Err)
}

async fn list(ctx: &Context, status: Option<TaskStatus>, limit: usize) -> Result<()> {
    let resp = ctx
        .tasks()
        .list(status, limit)
        .await
        .map_err(|e| ctx.fail(e, "Failed to list tasks"))?;

    print!("{}", render::task_table(&resp.tasks));
    if !ctx.quiet {
        println!("{}", format!("{} task(s)", resp.count).dimmed());
    }
    Ok(())
}

async fn stats(ctx: &Context) -> Result<()> {
    let store = SyncStore::new(Arc::new(ctx.queue()));
    store
        .fetch_stats()
        .await
        .map_err(|e| ctx.fail(e, "Failed to fetch queue stats"))?;
    print!("{}", render::stats_panel(&store.snapshot()));
    Ok(())
}

async fn watch(ctx: &Context, interval_ms: Option<u64>) -> Result<()> {
    let policy = ctx.policy(interval_ms);
    let store = SyncStore::with_policy(Arc::new(ctx.queue()), policy);

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || handler_token.cancel())?;

    let mut rx = store.subscribe();
    store.start_auto_refresh(policy.interval);

    let mut last_error: Option<String> = None;
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = rx.borrow_and_update().clone();
                if state.loading {
                    continue;
                }
                print!("\x1B[2J\x1B[H{}", render::stats_panel(&state));
                println!("{}", "Ctrl+C to stop".dimmed());
                if state.error != last_error {
                    if let Some(error) = &state.error {
                        ctx.toast(Toast::error(error.clone()));
                    }
                    last_error = state.error;
                }
            }
        }
    }

    store.stop_auto_refresh();
    println!("\n{} Stopped watching", "[!]".yellow());
    Ok(())
}

async fn reset_stale(ctx: &Context, timeout_minutes: u32) -> Result<()> {
    let store = SyncStore::new(Arc::new(ctx.queue()));
    let resp = store
        .reset_stale_tasks(timeout_minutes)
        .await
        .map_err(|e| ctx.fail(e, "Failed to reset stale tasks"))?;

    let message = match resp.count("reset_count") {
        Some(n) => format!("Reset {} stale task(s)", n),
        None => resp.message.unwrap_or_else(|| "Stale tasks reset".to_string()),
    };
    ctx.toast(Toast::success(message));
    print!("{}", render::stats_panel(&store.snapshot()));
    Ok(())
}

async fn cleanup(ctx: &Context, days: u32, yes: bool) -> Result<()> {
    if !yes {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Delete finished tasks older than {} day(s)?", days))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("{}", "Cleanup aborted".yellow());
            return Ok(());
        }
    }

    let store = SyncStore::new(Arc::new(ctx.queue()));
    let resp = store
        .cleanup_old_tasks(days)
        .await
        .map_err(|e| ctx.fail(e, "Failed to clean up old tasks"))?;

    let message = match resp.count("deleted_count") {
        Some(n) => format!("Deleted {} old task(s)", n),
        None => resp.message.unwrap_or_else(|| "Old tasks cleaned up".to_string()),
    };
    ctx.toast(Toast::success(message));
    print!("{}", render::stats_panel(&store.snapshot()));
    Ok(())
}

async fn health(ctx: &Context) -> Result<()> {
    let store = SyncStore::new(Arc::new(ctx.queue()));
    let status = store
        .check_health()
        .await
        .map_err(|e| ctx.fail(e, "Health check failed"))?;

    print!("{}", render::health(&status));
    if status.is_healthy() {
        Ok(())
    } else {
        Err(ctx.fail_with(Toast::warning(format!("Service reports {}", status.status))))
    }
}

async fn engines(ctx: &Context) -> Result<()> {
    let resp = ctx
        .tasks()
        .engines()
        .await
        .map_err(|e| ctx.fail(e, "Failed to list engines"))?;
    print!("{}", render::engines(&resp));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_split_on_first_equals() {
        assert_eq!(
            parse_field("deepseek_prompt_type=a=b").unwrap(),
            ("deepseek_prompt_type".to_string(), "a=b".to_string())
        );
        assert!(parse_field("no_equals").is_err());
        assert!(parse_field("=value").is_err());
    }
}
