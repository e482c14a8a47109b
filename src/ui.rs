use colored::Colorize;
use converge::{BatchSummary, Outcome, Plan};
use serde_json::Value;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Outcomes
// ============================================================================

fn fact_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Print an outcome for a human reader
pub fn outcome(subject: &str, outcome: &Outcome, dry_run: bool) {
    match &outcome.error {
        None if outcome.changed && dry_run => warn(&format!("{subject}: would change (dry run)")),
        None if outcome.changed => success(&format!("{subject}: changed")),
        None => success(&format!("{subject}: already in the desired state")),
        Some(err) => {
            error(&format!("{subject}: {}", err.message));
            dim(&format!("{}: {}", err.kind, err.kind.advice()));
            if outcome.changed {
                dim("some steps ran before the failure and were kept");
            }
        }
    }
    for (name, value) in &outcome.facts {
        kv(name, &fact_value(value));
    }
}

/// Print the steps a plan would take
pub fn plan(subject: &str, plan: &Plan) {
    if plan.is_empty() {
        println!("  {} {}", "○".dimmed(), subject.dimmed());
    } else {
        println!("  {} {}: {}", "~".yellow(), subject, plan);
    }
}

/// Print final batch summary
pub fn summary(summary: &BatchSummary, dry_run: bool) {
    println!();
    if summary.is_success() {
        println!("  {} Converged {} resource(s)", "✓".green().bold(), summary.total());
    } else {
        println!("  {} Converged with errors", "⚠".yellow().bold());
    }

    if summary.changed > 0 {
        let verb = if dry_run { "would change" } else { "changed" };
        println!("    • {} {verb}", summary.changed);
    }
    if summary.unchanged > 0 {
        println!("    • {} already in the desired state", summary.unchanged);
    }
    if summary.failed > 0 {
        println!("    • {} {}", summary.failed, "failed".red());
    }
}

/// Print a value as pretty JSON on stdout
pub fn json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fact_value_unquotes_strings() {
        assert_eq!(fact_value(&Value::from("113000000001")), "113000000001");
        assert_eq!(fact_value(&Value::from(28)), "28");
    }
}
