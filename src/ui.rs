use colored::Colorize;
use std::collections::BTreeSet;

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

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Join a role set for display
pub fn roles(roles: &BTreeSet<String>) -> String {
    if roles.is_empty() {
        "(no roles)".to_string()
    } else {
        roles.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
    }
}

/// Whether prompts can be shown
pub fn is_interactive() -> bool {
    console::Term::stdout().is_term() && console::Term::stderr().is_term()
}

// ============================================================================
// Tests
// ============================================================================
