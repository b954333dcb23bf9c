mod api;
mod app;
mod cli;
mod completions;
mod config;
mod init;
mod mapping;
mod naming;
mod pair;
mod reconcile;
mod remote;
#[cfg(test)]
mod test_support;
mod timestamp;
mod ui;

use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<(), app::AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Logs go to stderr. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "warn,dslsync=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run() -> Result<(), app::AppError> {
    use clap::Parser;
    use cli::Commands;

    let cli = cli::Cli::parse();
    init_tracing(cli.verbose);

    if let Some(Commands::Completions(args)) = &cli.command {
        return completions::run_completions_command(args.shell.as_deref(), args.install);
    }

    let config = config::Config::load(&cli.config_inputs())?;
    tracing::debug!(?config, "resolved configuration");
    let app = app::App::new(config);
    let dry_run = app.config().sync.dry_run;
    let verbose = app.config().sync.verbose;

    match cli.command {
        Some(Commands::Init(args)) => {
            let report = app.init(args.force_init)?;
            if cli.json {
                print_json(&report.map)?;
            } else {
                ui::print_init_report(&report, dry_run);
            }
        }
        None | Some(Commands::Sync) => {
            let report = app.sync()?;
            if cli.json {
                print_json(&ui::StatsView::from_report(&report))?;
            } else {
                ui::print_sync_report(&report, verbose, dry_run);
            }
            app::ensure_run_succeeded(&report)?;
        }
        Some(Commands::Completions(_)) => {}
    }
    Ok(())
}
