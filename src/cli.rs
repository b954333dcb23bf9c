use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Args, CommandFactory, Parser, Subcommand};

use crate::config::{ConfigInputs, Transfer};

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::BrightYellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightGreen.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::BrightMagenta.on_default())
}

#[derive(Debug, Parser)]
#[command(name = "dslsync")]
#[command(bin_name = "dslsync")]
#[command(version)]
#[command(about = "Keep local workflow DSL files in sync with remote apps")]
#[command(styles = cli_styles())]
pub struct Cli {
    #[arg(
        long,
        env = "DIFY_BASE_URL",
        global = true,
        help = "Base URL of the app API."
    )]
    pub base_url: Option<String>,

    #[arg(
        long,
        env = "DIFY_EMAIL",
        global = true,
        hide_env_values = true,
        help = "Login email for the app API."
    )]
    pub email: Option<String>,

    #[arg(
        long,
        env = "DIFY_PASSWORD",
        global = true,
        hide_env_values = true,
        help = "Login password for the app API."
    )]
    pub password: Option<String>,

    #[arg(
        long,
        env = "DSL_DIRECTORY",
        global = true,
        help = "Directory holding the DSL files [default: dsl]."
    )]
    pub dsl_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "APP_MAP_FILE",
        global = true,
        help = "Path to the app map JSON file [default: app_map.json]."
    )]
    pub app_map: Option<PathBuf>,

    #[arg(
        short = 'c',
        long,
        env = "DSLSYNC_CONFIG",
        global = true,
        help = "TOML config file [default: dslsync.toml when present]."
    )]
    pub config: Option<PathBuf>,

    #[arg(
        short = 'n',
        long,
        global = true,
        help = "Decide and report without writing files or pushing."
    )]
    pub dry_run: bool,

    #[arg(
        short = 'v',
        long,
        global = true,
        help = "Print per-app results and debug logs."
    )]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        help = "Upload local files that are newer than the remote."
    )]
    pub bidirectional: bool,

    #[arg(
        long,
        value_enum,
        global = true,
        help = "Always transfer in this direction, ignoring timestamps."
    )]
    pub force: Option<Transfer>,

    #[arg(short = 'j', long, global = true, help = "Render machine-readable JSON.")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Reconcile every mapped app (the default).")]
    Sync,
    #[command(about = "Build the app map from the remote account and download DSL files.")]
    Init(InitArgs),
    #[command(about = "Generate shell completions.")]
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct InitArgs {
    #[arg(long = "force-init", help = "Rebuild the app map even if it already exists.")]
    pub force_init: bool,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    #[arg(help = "Shell name (bash, zsh, fish). Auto-detected if omitted.")]
    pub shell: Option<String>,

    #[arg(
        short = 'i',
        long = "install",
        help = "Write completions to the canonical path for the shell."
    )]
    pub install: bool,
}

impl Cli {
    pub fn config_inputs(&self) -> ConfigInputs {
        ConfigInputs {
            base_url: self.base_url.clone(),
            email: self.email.clone(),
            password: self.password.clone(),
            dsl_dir: self.dsl_dir.clone(),
            app_map: self.app_map.clone(),
            config_file: self.config.clone(),
            dry_run: self.dry_run,
            verbose: self.verbose,
            bidirectional: self.bidirectional,
            force: self.force,
        }
    }
}

pub fn styled_command() -> clap::Command {
    Cli::command()
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
