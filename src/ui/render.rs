//! Plain-text views of published state. Everything returns a `String` so the
//! commands decide where it goes.

use std::fmt::Write;

use colored::*;

use crate::core::store::SyncState;
use crate::core::task::{EnginesResponse, HealthStatus, QueueStats, Task, TaskStatus};

const RULE: &str = "═══════════════════════════════════════";

pub fn status_label(status: TaskStatus) -> ColoredString {
    let text = status.as_str();
    match status {
        TaskStatus::Pending => text.yellow(),
        TaskStatus::Processing => text.blue(),
        TaskStatus::Completed => text.green(),
        TaskStatus::Failed => text.red(),
        TaskStatus::Cancelled => text.dimmed(),
    }
}

fn counters(out: &mut String, stats: &QueueStats) {
    for status in TaskStatus::ALL {
        let _ = writeln!(out, "  {:<12} {:>6}", status_label(status), stats.get(status));
    }
}

/// Dashboard panel for `stats` and `watch`.
pub fn stats_panel(state: &SyncState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", RULE.cyan());
    let _ = writeln!(out, "{}", " Queue overview".cyan().bold());
    let _ = writeln!(out, "{}", RULE.cyan());
    counters(&mut out, &state.stats);
    let _ = writeln!(out, "  {:<12} {:>6}", "total".bold(), state.total);
    let _ = writeln!(out, "{}", RULE.cyan());

    let updated = state.last_update.as_deref().unwrap_or("never");
    let mut footer = format!("  updated: {}", updated);
    if state.auto_refresh {
        footer.push_str("  [auto]");
    }
    if state.loading {
        footer.push_str("  refreshing...");
    }
    let _ = writeln!(out, "{}", footer.dimmed());
    if let Some(error) = &state.error {
        let _ = writeln!(out, "{} {}", "[✗]".red(), error);
    }
    out
}

fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

pub fn task_table(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "No tasks\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}",
        format!("{:<10} {:<12} {:<18} {:>4}  {:<20} {}", "ID", "STATUS", "BACKEND", "PRIO", "CREATED", "FILE").cyan()
    );
    for task in tasks {
        // pad before coloring, escape codes break width
        let status = format!("{:<12}", task.status.as_str());
        let status = match task.status {
            TaskStatus::Pending => status.yellow(),
            TaskStatus::Processing => status.blue(),
            TaskStatus::Completed => status.green(),
            TaskStatus::Failed => status.red(),
            TaskStatus::Cancelled => status.dimmed(),
        };
        let _ = writeln!(
            out,
            "{:<10} {} {:<18} {:>4}  {:<20} {}",
            short_id(&task.task_id),
            status,
            task.backend,
            task.priority,
            task.created_at,
            task.file_name
        );
    }
    out
}

pub fn task_detail(task: &Task) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", "Task".bold(), task.task_id);
    let _ = writeln!(out, "  file:     {}", task.file_name);
    let _ = writeln!(out, "  status:   {}", status_label(task.status));
    let _ = writeln!(out, "  backend:  {}", task.backend);
    let _ = writeln!(out, "  priority: {}", task.priority);
    let _ = writeln!(out, "  created:  {}", task.created_at);
    if let Some(started) = &task.started_at {
        let _ = writeln!(out, "  started:  {}", started);
    }
    if let Some(completed) = &task.completed_at {
        let _ = writeln!(out, "  finished: {}", completed);
    }
    if let Some(duration) = task.duration() {
        let _ = writeln!(out, "  took:     {}s", duration.num_seconds());
    }
    if let Some(worker) = &task.worker_id {
        let _ = writeln!(out, "  worker:   {}", worker);
    }
    if task.retry_count > 0 {
        let _ = writeln!(out, "  retries:  {}", task.retry_count);
    }
    if let Some(error) = &task.error_message {
        let _ = writeln!(out, "  {} {}", "error:".red(), error);
    }
    if let Some(issue) = task.inconsistency() {
        let _ = writeln!(out, "  {} {}", "warning:".yellow(), issue);
    }
    out
}

pub fn health(status: &HealthStatus) -> String {
    let mut out = String::new();
    let label = if status.is_healthy() {
        status.status.green()
    } else {
        status.status.red()
    };
    let _ = writeln!(out, "service:  {}", label);
    if let Some(database) = &status.database {
        let _ = writeln!(out, "database: {}", database);
    }
    if let Some(timestamp) = &status.timestamp {
        let _ = writeln!(out, "checked:  {}", timestamp);
    }
    if let Some(counts) = &status.queue_stats {
        counters(&mut out, &QueueStats::from(counts));
    }
    if let Some(error) = &status.error {
        let _ = writeln!(out, "{} {}", "[✗]".red(), error);
    }
    out
}

pub fn engines(resp: &EnginesResponse) -> String {
    if resp.engines.is_empty() {
        return "No engines reported\n".to_string();
    }
    let mut out = String::new();
    for (category, engines) in &resp.engines {
        let _ = writeln!(out, "{}", category.cyan().bold());
        for engine in engines {
            let name = engine.display_name.as_deref().unwrap_or(&engine.name);
            let _ = write!(out, "  {:<20} {}", engine.name, name);
            if !engine.supported_formats.is_empty() {
                let _ = write!(out, " ({})", engine.supported_formats.join(", "));
            }
            let _ = writeln!(out);
            if let Some(description) = &engine.description {
                let _ = writeln!(out, "    {}", description.dimmed());
            }
        }
    }
    out
}
