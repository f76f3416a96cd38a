use {anyhow::Result, clap::Subcommand};

use handover_config::validate::{self, Severity};

use crate::{Cli, load_config};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Print the effective configuration as TOML.
    Show,
}

pub fn handle_config(action: &ConfigAction, cli: &Cli) -> Result<()> {
    match action {
        ConfigAction::Check { verbose } => check(cli, *verbose),
        ConfigAction::Show => {
            let config = load_config(cli)?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        },
    }
}

/// Bold, colored severity tag for terminal output.
fn styled(severity: Severity) -> String {
    let color = match severity {
        Severity::Error => "31",
        Severity::Warning => "33",
        Severity::Info => "36",
    };
    format!("\x1b[1;{color}m{severity}\x1b[0m")
}

fn check(cli: &Cli, verbose: bool) -> Result<()> {
    let result = validate::validate(cli.config.as_deref());
    match &result.config_path {
        Some(path) => eprintln!("Checking {}\n", path.display()),
        None => eprintln!("No config file found; checking defaults.\n"),
    }

    let shown: Vec<_> = result
        .diagnostics
        .iter()
        .filter(|d| verbose || d.severity != Severity::Info)
        .collect();
    for d in &shown {
        let location = if d.path.is_empty() {
            String::new()
        } else {
            format!("{}: ", d.path)
        };
        eprintln!("  {} {location}{}", styled(d.severity), d.message);
    }
    if !shown.is_empty() {
        eprintln!();
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);
    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if result.has_errors() {
        anyhow::bail!("configuration is invalid");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_tag_is_bold_and_colored() {
        assert_eq!(styled(Severity::Error), "\x1b[1;31merror\x1b[0m");
        assert_eq!(styled(Severity::Warning), "\x1b[1;33mwarning\x1b[0m");
        assert_eq!(styled(Severity::Info), "\x1b[1;36minfo\x1b[0m");
    }
}
