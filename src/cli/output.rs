//! CLI output formatting

use crate::core::plan::SuitePlan;
use crate::core::state::SuiteStatus;
use crate::execution::SuiteEvent;
use crate::persistence::RunSummary;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Create a spinner for a running stage
pub fn create_stage_spinner(stage: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}") {
        spinner.set_style(template);
    }
    spinner.set_message(style(stage).cyan().to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Print a separator line spanning the terminal width
pub fn print_separator() {
    let width = term_size::dimensions_stdout()
        .map(|(w, _)| w)
        .unwrap_or(80);
    println!("{}", style("─".repeat(width)).dim());
}

/// Format a suite status for display
pub fn format_status(status: SuiteStatus) -> String {
    match status {
        SuiteStatus::Pending => style("PENDING").dim().to_string(),
        SuiteStatus::Running => style("RUNNING").yellow().to_string(),
        SuiteStatus::Completed => style("COMPLETED").green().to_string(),
        SuiteStatus::Failed => style("FAILED").red().to_string(),
        SuiteStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

/// Format a suite event for display
pub fn format_suite_event(event: &SuiteEvent) -> String {
    match event {
        SuiteEvent::SuiteStarted { run_id, mode } => format!(
            "{} Starting suite in {} mode ({})",
            ROCKET,
            style(mode).bold(),
            style(&run_id.to_string()[..8]).dim()
        ),
        SuiteEvent::StageStarted { stage } => format!("{} {}", SPINNER, style(stage).cyan()),
        SuiteEvent::StageCompleted { stage } => format!("{} {}", CHECK, style(stage).green()),
        SuiteEvent::StageFailed { stage, error } => {
            format!("{} {}: {}", CROSS, style(stage).red(), style(error).dim())
        }
        SuiteEvent::StageSkipped { stage, reason } => {
            format!("{} {} ({})", SKIP, style(stage).dim(), reason)
        }
        SuiteEvent::SuiteCompleted { run_id, status } => format!(
            "{} Suite ({}) {}",
            INFO,
            style(&run_id.to_string()[..8]).dim(),
            format_status(*status)
        ),
    }
}

/// Prints suite events, with a spinner while a stage runs
#[derive(Default)]
pub struct ConsoleReporter {
    spinner: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self, event: SuiteEvent) {
        let Ok(mut spinner) = self.spinner.lock() else {
            println!("{}", format_suite_event(&event));
            return;
        };
        if let Some(running) = spinner.take() {
            running.finish_and_clear();
        }
        match &event {
            SuiteEvent::StageStarted { stage } => {
                *spinner = Some(create_stage_spinner(stage.name()));
            }
            SuiteEvent::SuiteCompleted { .. } => {
                print_separator();
                println!("{}", format_suite_event(&event));
            }
            _ => println!("{}", format_suite_event(&event)),
        }
    }
}

/// Format a past run for the history listing
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        SuiteStatus::Completed => CHECK,
        SuiteStatus::Failed => CROSS,
        SuiteStatus::Running => SPINNER,
        _ => INFO,
    };

    let failed = summary
        .failed_stage()
        .map(|s| format!(" at {}", style(s.stage).red()))
        .unwrap_or_default();

    format!(
        "{} {} - {} - {}{} - {}",
        status_icon,
        style(&summary.run_id.to_string()[..8]).dim(),
        style(&summary.mode).bold(),
        format_status(summary.status),
        failed,
        style(summary.started_at.format("%Y-%m-%d %H:%M")).dim()
    )
}

/// Format a dry-run plan for display
pub fn format_plan(plan: &SuitePlan) -> String {
    let mut out = format!("{} Plan for {} mode\n", INFO, style(&plan.mode).bold());
    out.push_str(&format!("\n  {}\n", style("Setup").bold()));
    for (i, step) in plan.setup.iter().enumerate() {
        out.push_str(&format!(
            "  {:>2}. {} {}\n",
            i + 1,
            style(step.stage).cyan(),
            style(&step.detail).dim()
        ));
    }
    out.push_str(&format!("\n  {}\n", style("Teardown").bold()));
    for (i, step) in plan.teardown.iter().enumerate() {
        out.push_str(&format!(
            "  {:>2}. {} {}\n",
            i + 1,
            style(step.stage).cyan(),
            style(&step.detail).dim()
        ));
    }
    out
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mode::{ModeFlags, OperatingMode};
    use crate::core::stage::StageId;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_format_event_names_stage() {
        console::set_colors_enabled(false);
        let line = format_suite_event(&SuiteEvent::StageFailed {
            stage: StageId::DeployPlatform,
            error: "rancher not available".to_string(),
        });
        assert!(line.contains("deploy-platform"));
        assert!(line.contains("rancher not available"));
    }

    #[test]
    fn test_format_plan_lists_every_step() {
        console::set_colors_enabled(false);
        let plan = SuitePlan::from_mode(&OperatingMode::select(ModeFlags::default()), false);
        let text = format_plan(&plan);
        for step in plan.setup.iter().chain(plan.teardown.iter()) {
            assert!(text.contains(step.stage.name()));
        }
    }
}
