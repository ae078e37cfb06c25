use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tabkeeper_cli::{
    env_truthy, load_config, load_layout, load_script, print_stdout, render_output, run_session,
    write_layout, Step, ENV_PRETTY,
};
use tabkeeper_protocol::WindowId;

#[derive(Parser)]
#[command(name = "tabkeeper")]
#[command(about = "Keep browser windows tidy: merge, sort and deduplicate tabs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// Pretty-print JSON output (or set TABKEEPER_PRETTY=1)
    #[arg(long, global = true)]
    pretty: bool,

    /// Engine config file (TOML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Move every unpinned tab into the current window and close the rest
    Merge(SessionArgs),

    /// Sort a window's tabs by site and path
    Sort(SortArgs),

    /// Close same-window duplicate tabs, keeping the oldest
    Dedupe(SessionArgs),

    /// Play a JSON script of browsing steps and engine commands
    Replay(ReplayArgs),
}

#[derive(Args)]
struct SessionArgs {
    /// Session layout JSON file
    layout: PathBuf,

    /// Write the resulting layout here
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct SortArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// Window to sort (defaults to the focused window)
    #[arg(long)]
    window: Option<i64>,
}

#[derive(Args)]
struct ReplayArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// Script JSON file: an array of steps
    script: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = load_config(cli.config.as_deref())?;
    let pretty = cli.pretty || env_truthy(ENV_PRETTY);

    let (session, steps) = match cli.command {
        Commands::Merge(args) => (args, vec![Step::Merge]),
        Commands::Sort(args) => (
            args.session,
            vec![Step::Sort {
                window: args.window.map(WindowId),
            }],
        ),
        Commands::Dedupe(args) => (args, vec![Step::Dedupe]),
        Commands::Replay(args) => {
            let steps = load_script(&args.script)?;
            (args.session, steps)
        }
    };

    let layout = load_layout(&session.layout)?;
    let output = run_session(&layout, &steps, config).await?;
    if let Some(path) = &session.output {
        write_layout(path, &output.layout)?;
    }
    print_stdout(&render_output(&output, pretty)?)?;
    Ok(())
}
