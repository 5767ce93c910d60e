//! Terminal output and prompts

use crate::error::{CliError, CliResult};
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm};

/// What commands need from the terminal
pub trait Ui {
    /// Plain line on stdout
    fn say(&self, text: &str);

    /// Highlighted warning line on stdout
    fn warn(&self, text: &str);

    /// `OK` confirmation line
    fn ok(&self);

    /// `FAILED` followed by the error, on stderr
    fn failed(&self, message: &str);

    /// Aligned columns under a header row
    fn table(&self, headers: &[&str], rows: &[Vec<String>]);

    /// Yes/no question
    fn confirm(&self, prompt: &str, default: bool) -> CliResult<bool>;
}

/// Styling for terminal output
#[derive(Debug, Clone)]
pub struct Formatter {
    pub use_colors: bool,
}

impl Default for Formatter {
    fn default() -> Self {
        Self {
            use_colors: console::colors_enabled(),
        }
    }
}

impl Formatter {
    pub fn ok(&self) -> String {
        if self.use_colors {
            style("OK").green().bold().to_string()
        } else {
            "OK".to_string()
        }
    }

    pub fn failed(&self) -> String {
        if self.use_colors {
            style("FAILED").red().bold().to_string()
        } else {
            "FAILED".to_string()
        }
    }

    pub fn warning(&self, message: &str) -> String {
        if self.use_colors {
            style(message).yellow().to_string()
        } else {
            message.to_string()
        }
    }

    /// Columns padded to their widest cell, two spaces apart
    pub fn table(&self, headers: &[&str], rows: &[Vec<String>]) -> String {
        let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
        for row in rows {
            for (i, cell) in row.iter().enumerate() {
                if i < widths.len() {
                    widths[i] = widths[i].max(cell.len());
                }
            }
        }

        let pad = |cells: Vec<String>| {
            cells
                .iter()
                .enumerate()
                .map(|(i, cell)| {
                    let width = widths.get(i).copied().unwrap_or(0);
                    format!("{:width$}", cell, width = width)
                })
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        let header = pad(headers.iter().map(|h| h.to_string()).collect());
        let mut output = if self.use_colors {
            style(header).bold().to_string()
        } else {
            header
        };
        output.push('\n');

        for row in rows {
            output.push_str(&pad(row.clone()));
            output.push('\n');
        }

        output
    }
}

/// Interactive terminal
#[derive(Default)]
pub struct TerminalUi {
    formatter: Formatter,
    theme: ColorfulTheme,
}

impl TerminalUi {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Ui for TerminalUi {
    fn say(&self, text: &str) {
        println!("{}", text);
    }

    fn warn(&self, text: &str) {
        println!("{}", self.formatter.warning(text));
    }

    fn ok(&self) {
        println!("{}", self.formatter.ok());
        println!();
    }

    fn failed(&self, message: &str) {
        eprintln!("{}", self.formatter.failed());
        eprintln!("{}", message);
    }

    fn table(&self, headers: &[&str], rows: &[Vec<String>]) {
        print!("{}", self.formatter.table(headers, rows));
    }

    fn confirm(&self, prompt: &str, default: bool) -> CliResult<bool> {
        Confirm::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(default)
            .interact()
            .map_err(|e| CliError::Prompt(e.to_string()))
    }
}
