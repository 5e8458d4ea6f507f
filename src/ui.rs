use colored::{ColoredString, Colorize};
use std::time::Duration;
use topology::{Disposition, NodeState};

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
    println!("{}", "─".repeat(title.len()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a step indicator
pub fn step(num: usize, total: usize, msg: &str) {
    println!("{} {}", format!("[{}/{}]", num, total).blue().bold(), msg);
}

// ============================================================================
// Resource Display
// ============================================================================

/// Glyph for a node state in report listings
pub fn state_glyph(state: NodeState) -> ColoredString {
    match state {
        NodeState::Declared => "·".dimmed(),
        NodeState::Resolving => "…".cyan(),
        NodeState::Resolved => "○".cyan(),
        NodeState::Synthesized => "✓".green(),
        NodeState::Failed => "✗".red(),
    }
}

/// Colored tag for how the backend disposed of a resource
pub fn disposition_tag(disposition: Disposition) -> ColoredString {
    match disposition {
        Disposition::Created => "created".green(),
        Disposition::Updated => "updated".yellow(),
        Disposition::Unchanged => "unchanged".dimmed(),
    }
}

/// Format a duration the way provisioning times read
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis >= 60_000 {
        format!("{}m{:02}s", millis / 60_000, (millis % 60_000) / 1000)
    } else if millis >= 1000 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{millis}ms")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_millis() {
        assert_eq!(format_duration(Duration::ZERO), "0ms");
        assert_eq!(format_duration(Duration::from_millis(340)), "340ms");
        assert_eq!(format_duration(Duration::from_millis(999)), "999ms");
    }

    #[test]
    fn test_format_duration_seconds() {
        assert_eq!(format_duration(Duration::from_millis(1000)), "1.0s");
        assert_eq!(format_duration(Duration::from_millis(2450)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(59)), "59.0s");
    }

    #[test]
    fn test_format_duration_minutes() {
        assert_eq!(format_duration(Duration::from_secs(60)), "1m00s");
        assert_eq!(format_duration(Duration::from_secs(92)), "1m32s");
        assert_eq!(format_duration(Duration::from_secs(605)), "10m05s");
    }
}
