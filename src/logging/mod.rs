//! Logging and output control
//!
//! This module provides the [`Logger`] used for all user-visible output. It
//! supports quiet and verbose modes, elapsed-time stamps, and per-image scopes
//! so lines written by concurrent workers stay attributable.

use std::time::{Duration, Instant};

/// Logger responsible for all user-visible output
#[derive(Debug, Clone)]
pub struct Logger {
    pub verbose: bool,
    pub quiet: bool,
    pub start_time: Option<Instant>,
    scope: Option<String>,
}

impl Logger {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            quiet: false,
            start_time: Some(Instant::now()),
            scope: None,
        }
    }

    pub fn new_quiet() -> Self {
        Self {
            verbose: false,
            quiet: true,
            start_time: Some(Instant::now()),
            scope: None,
        }
    }

    /// Logger that prefixes every line with `[scope]`, sharing the parent's clock
    pub fn scoped(&self, scope: impl Into<String>) -> Self {
        Self {
            verbose: self.verbose,
            quiet: self.quiet,
            start_time: self.start_time,
            scope: Some(scope.into()),
        }
    }

    /// Main section heading
    pub fn section(&self, title: &str) {
        if !self.quiet {
            println!("\n=== {} ===", title);
        }
    }

    /// Sub-section heading
    pub fn subsection(&self, title: &str) {
        if !self.quiet {
            println!("\n--- {} ---", title);
        }
    }

    pub fn debug(&self, message: &str) {
        if self.verbose && !self.quiet {
            println!("{}", self.line("🐛 DEBUG:", message));
        }
    }

    /// Information message
    pub fn info(&self, message: &str) {
        if !self.quiet {
            println!("{}", self.line("ℹ️ ", message));
        }
    }

    /// Success message
    pub fn success(&self, message: &str) {
        if !self.quiet {
            println!("{}", self.line("✅", message));
        }
    }

    /// Warning message
    pub fn warning(&self, message: &str) {
        if !self.quiet {
            println!("{}", self.line("⚠️  WARNING:", message));
        }
    }

    /// Error message, always shown
    pub fn error(&self, message: &str) {
        eprintln!("{}", self.line("❌ ERROR:", message));
    }

    /// Step information
    pub fn step(&self, message: &str) {
        if !self.quiet {
            println!("{}", self.line("▶️ ", message));
        }
    }

    /// Detailed information (only shown in verbose mode)
    pub fn detail(&self, message: &str) {
        if self.verbose && !self.quiet {
            println!("{}", self.line("  ", message));
        }
    }

    /// Key-value pair summary display
    pub fn summary_kv(&self, title: &str, items: &[(&str, String)]) {
        if !self.quiet {
            self.subsection(title);
            for (key, value) in items {
                println!("  {}: {}", key, value);
            }
        }
    }

    /// Format duration in human-readable format
    pub fn format_duration(&self, duration: Duration) -> String {
        let secs = duration.as_secs();
        if secs < 60 {
            format!("{:.1}s", duration.as_secs_f64())
        } else if secs < 3600 {
            format!("{}m{:02}s", secs / 60, secs % 60)
        } else {
            format!("{}h{:02}m{:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
    }

    pub fn elapsed_time(&self) -> String {
        match self.start_time {
            Some(start_time) => self.format_duration(start_time.elapsed()),
            None => "Unknown".to_string(),
        }
    }

    // Each message is rendered into one string and written with a single
    // println!, so concurrent workers never splice each other's lines.
    fn line(&self, marker: &str, message: &str) -> String {
        let mut line = String::new();
        if self.verbose {
            if let Some(start_time) = self.start_time {
                line.push_str(&format!("[{:8.3}s] ", start_time.elapsed().as_secs_f64()));
            }
        }
        line.push_str(marker);
        line.push(' ');
        if let Some(scope) = &self.scope {
            line.push_str(&format!("[{}] ", scope));
        }
        line.push_str(message);
        line
    }
}
