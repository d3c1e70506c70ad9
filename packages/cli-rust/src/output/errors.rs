//! Error formatting for failed commands

use console::style;

/// Print the single `Error:` line a failed command ends with
///
/// The whole cause chain is printed on that line, outermost first.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", style("Error:").red().bold(), format_chain(err));
}

fn format_chain(err: &anyhow::Error) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        // transparent wrappers repeat their source's message
        if parts.last().is_some_and(|last| last.ends_with(&text)) {
            continue;
        }
        parts.push(text);
    }
    parts.join(": ")
}

/// Warn that a failed create may have left resources behind on the backend
pub fn print_orphan_warning(name: &str, driver: &str, recorded: bool) {
    eprintln!();
    eprintln!(
        "{} Creating {} failed partway through.",
        style("Warning:").yellow().bold(),
        style(name).cyan()
    );
    eprintln!(
        "  Check the {} provider for orphaned resources before trying again.",
        style(driver).cyan()
    );
    if recorded {
        eprintln!(
            "  Remove what was created with: {}",
            style(format!("dockhand rm -f {name}")).green()
        );
    }
}
