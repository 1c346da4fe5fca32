//! kidex - command-line client for kidexd

#![deny(clippy::all)]
#![warn(clippy::pedantic)]

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kidex::config::default_socket_path;
use kidex::server::IndexClient;
use kidex::storage::{CaseOption, FileType, SearchOptions};
use kidex::IndexEntry;
use serde::Serialize;

/// Query and control a running kidexd
#[derive(Parser, Debug)]
#[command(name = "kidex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Daemon socket
    #[arg(short, long, env = "KIDEX_SOCKET", default_value_os_t = default_socket_path())]
    socket: PathBuf,

    /// Request timeout in seconds
    #[arg(long, default_value = "120")]
    timeout: u64,

    /// Output format for entry listings
    #[arg(short, long, value_enum, default_value_t = Format::Json)]
    format: Format,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Pretty-printed JSON
    Json,
    /// One path per line, directories end with `/`
    List,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search the index
    Query {
        /// Keywords: `word`, `word/`, `/word`, `//word`, `/` (dirs), `f/` (files)
        terms: Vec<String>,

        /// File-name substring filter
        #[arg(long)]
        filter: Option<String>,

        /// Restrict to files or directories
        #[arg(long = "type", value_enum, default_value_t = TypeArg::All)]
        kind: TypeArg,

        /// Case handling
        #[arg(long, value_enum, default_value_t = CaseArg::Smart)]
        case: CaseArg,

        /// Only search below this directory
        #[arg(long)]
        root: Option<PathBuf>,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Dump the index, or the entries below one directory
    GetIndex {
        /// Indexed directory to list
        path: Option<PathBuf>,
    },
    /// Make the daemon re-read its configuration file
    ReloadConfig,
    /// Rebuild the whole index
    Reindex,
    /// Show daemon statistics
    Status,
    /// Stop the daemon
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TypeArg {
    All,
    Files,
    Dirs,
}

impl From<TypeArg> for FileType {
    fn from(arg: TypeArg) -> Self {
        match arg {
            TypeArg::All => Self::All,
            TypeArg::Files => Self::Files,
            TypeArg::Dirs => Self::Dirs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CaseArg {
    Match,
    Ignore,
    Smart,
}

impl From<CaseArg> for CaseOption {
    fn from(arg: CaseArg) -> Self {
        match arg {
            CaseArg::Match => Self::Match,
            CaseArg::Ignore => Self::Ignore,
            CaseArg::Smart => Self::Smart,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = IndexClient::new(&cli.socket).with_timeout(Duration::from_secs(cli.timeout));
    let socket = cli.socket.display().to_string();

    match cli.command {
        Command::Query {
            terms,
            filter,
            kind,
            case,
            root,
            limit,
        } => {
            let options = SearchOptions {
                filter,
                terms,
                file_type: kind.into(),
                case: case.into(),
                root,
                limit,
            };
            let entries = client
                .query(options)
                .await
                .with_context(|| format!("query against {socket} failed"))?;
            print_entries(&entries, cli.format)?;
        }
        Command::GetIndex { path } => {
            let entries = client
                .get_index(path)
                .await
                .with_context(|| format!("get-index against {socket} failed"))?;
            print_entries(&entries, cli.format)?;
        }
        Command::ReloadConfig => {
            let warnings = client.reload_config().await.context("reload failed")?;
            print_warnings(&warnings);
        }
        Command::Reindex => {
            let warnings = client.reindex().await.context("reindex failed")?;
            print_warnings(&warnings);
        }
        Command::Status => {
            let status = client
                .status()
                .await
                .with_context(|| format!("no daemon answering on {socket}"))?;
            print_json(&status)?;
        }
        Command::Shutdown => {
            client.shutdown().await.context("shutdown failed")?;
        }
    }

    Ok(())
}

fn print_entries(entries: &[IndexEntry], format: Format) -> Result<()> {
    match format {
        Format::Json => print_json(&entries),
        Format::List => {
            let mut out = std::io::stdout().lock();
            for entry in entries {
                let suffix = if entry.is_directory { "/" } else { "" };
                writeln!(out, "{}{suffix}", entry.path.display())?;
            }
            Ok(())
        }
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
}
