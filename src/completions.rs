//! Shell completion generation.

use std::io::Write;

use clap::{CommandFactory, ValueEnum};
use clap_complete::{generate, Shell};

/// Supported shells for completion generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

impl From<CompletionShell> for Shell {
    fn from(shell: CompletionShell) -> Self {
        match shell {
            CompletionShell::Bash => Shell::Bash,
            CompletionShell::Zsh => Shell::Zsh,
            CompletionShell::Fish => Shell::Fish,
            CompletionShell::PowerShell => Shell::PowerShell,
            CompletionShell::Elvish => Shell::Elvish,
        }
    }
}

/// Write completions for `C` to stdout.
pub fn generate_completions<C: CommandFactory>(shell: CompletionShell, bin_name: &str) {
    write_completions::<C>(shell, bin_name, &mut std::io::stdout());
}

pub fn write_completions<C: CommandFactory>(
    shell: CompletionShell,
    bin_name: &str,
    out: &mut dyn Write,
) {
    let mut cmd = C::command();
    let shell_type: Shell = shell.into();
    generate(shell_type, &mut cmd, bin_name, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{Parser, Subcommand};

    #[derive(Parser)]
    #[command(name = "demo")]
    struct Demo {
        #[command(subcommand)]
        command: DemoCommands,
    }

    #[derive(Subcommand)]
    enum DemoCommands {
        Status,
        Paths,
    }

    #[test]
    fn bash_completions_list_subcommands() {
        let mut out = Vec::new();
        write_completions::<Demo>(CompletionShell::Bash, "demo", &mut out);
        let script = String::from_utf8(out).unwrap();
        assert!(script.contains("status"));
        assert!(script.contains("paths"));
    }
}
