use std::path::PathBuf;

use clap::Parser;

use super::{Cli, Commands};
use crate::config::Transfer;

fn parse(args: &[&str]) -> Cli {
    Cli::parse_from(args)
}

#[test]
fn no_subcommand_means_sync() {
    let cli = parse(&["dslsync", "--base-url", "https://dify.example.com"]);
    assert!(cli.command.is_none());
    assert_eq!(cli.base_url.as_deref(), Some("https://dify.example.com"));
    assert!(!cli.dry_run);
    assert!(cli.force.is_none());
}

#[test]
fn sync_flags_parse_after_subcommand() {
    let cli = parse(&[
        "dslsync",
        "sync",
        "--dry-run",
        "--bidirectional",
        "--force",
        "upload",
        "--dsl-dir",
        "flows",
        "--json",
    ]);
    assert!(matches!(cli.command, Some(Commands::Sync)));
    assert!(cli.dry_run);
    assert!(cli.bidirectional);
    assert!(cli.json);
    assert_eq!(cli.force, Some(Transfer::Upload));
    assert_eq!(cli.dsl_dir, Some(PathBuf::from("flows")));
}

#[test]
fn init_parses_force_flag() {
    let cli = parse(&["dslsync", "init", "--force-init", "-n"]);
    match cli.command {
        Some(Commands::Init(args)) => assert!(args.force_init),
        other => panic!("expected Init, got {:?}", other),
    }
    assert!(cli.dry_run);
}

#[test]
fn completions_parses_shell_and_install() {
    let cli = parse(&["dslsync", "completions", "zsh", "--install"]);
    match cli.command {
        Some(Commands::Completions(args)) => {
            assert_eq!(args.shell.as_deref(), Some("zsh"));
            assert!(args.install);
        }
        other => panic!("expected Completions, got {:?}", other),
    }
}

#[test]
fn rejects_unknown_force_direction() {
    let result = Cli::try_parse_from(["dslsync", "--force", "sideways"]);
    assert!(result.is_err());
}

#[test]
fn config_inputs_carry_flag_values() {
    let cli = parse(&[
        "dslsync",
        "--app-map",
        "maps/app_map.json",
        "--config",
        "custom.toml",
        "--verbose",
        "--force",
        "download",
    ]);
    let inputs = cli.config_inputs();
    assert_eq!(inputs.app_map, Some(PathBuf::from("maps/app_map.json")));
    assert_eq!(inputs.config_file, Some(PathBuf::from("custom.toml")));
    assert!(inputs.verbose);
    assert_eq!(inputs.force, Some(Transfer::Download));
}
