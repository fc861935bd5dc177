//! Colored operator output

use colored::Colorize;
use kubeprov_cloud::Reporter;

/// Renders operator messages on the terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn banner(&self, message: &str) {
        println!("{}", message.blue().bold());
    }

    fn info(&self, message: &str) {
        println!("  {}", message);
    }

    fn success(&self, message: &str) {
        println!("  {} {}", "✓".green(), message);
    }

    fn warn(&self, message: &str) {
        println!("{} {}", "⚠".yellow(), message.yellow());
    }

    fn error(&self, message: &str) {
        eprintln!("  {} {}", "✗".red(), message.red());
    }
}
