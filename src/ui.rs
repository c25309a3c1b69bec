use colored::Colorize;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
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

/// Print an error and everything that caused it
pub fn error_chain(err: &anyhow::Error) {
    let mut lines = chain_lines(err).into_iter();
    if let Some(first) = lines.next() {
        error(&first);
    }
    for cause in lines {
        eprintln!("  {} {}", "caused by:".dimmed(), cause);
    }
}

fn chain_lines(err: &anyhow::Error) -> Vec<String> {
    err.chain().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_chain_lines() {
        let err = std::fs::read_to_string("/nonexistent/users.json")
            .context("Could not read /nonexistent/users.json")
            .unwrap_err();
        let lines = chain_lines(&err);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "Could not read /nonexistent/users.json");
    }
}
