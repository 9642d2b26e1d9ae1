use std::io;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use kira_taxlen::app::{App, ProgressSink};
use kira_taxlen::config::{ConfigLoader, RunInputs};
use kira_taxlen::error::{ErrorKind, TaxlenError};
use kira_taxlen::ncbi::{ClientConfig, EntrezHttpClient};
use kira_taxlen::output::{JsonOutput, OutputMode, TerminalOutput};

#[derive(Parser)]
#[command(name = "kira-taxlen")]
#[command(about = "Length survey of a taxon's NCBI nucleotide records (CSV report + chart)")]
#[command(version, author)]
struct Cli {
    /// Contact email sent to NCBI E-utilities
    #[arg(long, env = "NCBI_EMAIL")]
    email: Option<String>,

    /// NCBI API key (optional, raises the rate limit)
    #[arg(long, env = "NCBI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// NCBI Taxonomy id, e.g. 9606
    #[arg(long)]
    taxid: Option<String>,

    #[arg(long)]
    min_length: Option<u64>,

    #[arg(long)]
    max_length: Option<u64>,

    /// Directory receiving the report and the chart
    #[arg(long, default_value = ".")]
    output_dir: String,

    /// Never prompt; print a JSON summary instead of the text one
    #[arg(long)]
    non_interactive: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            if let Some(err) = report.downcast_ref::<TaxlenError>() {
                if err.kind() == ErrorKind::EmptyResult {
                    eprintln!("No records found: {err}.");
                } else {
                    eprintln!("{report:?}");
                }
                return ExitCode::from(map_exit_code(err));
            }
            eprintln!("{report:?}");
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &TaxlenError) -> u8 {
    match error.kind() {
        ErrorKind::Input => 1,
        ErrorKind::EmptyResult => 2,
        ErrorKind::RemoteService => 3,
        ErrorKind::Parse => 4,
        ErrorKind::Io => 5,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let inputs = RunInputs {
        email: cli.email,
        api_key: cli.api_key,
        taxid: cli.taxid,
        min_length: cli.min_length,
        max_length: cli.max_length,
    };
    let resolved = match output_mode {
        OutputMode::Interactive => {
            ConfigLoader::resolve_interactive(inputs, io::stdin().lock(), io::stdout())?
        }
        OutputMode::NonInteractive => ConfigLoader::resolve(inputs)?,
    };

    let client = EntrezHttpClient::new(ClientConfig::new(resolved.credentials))?;
    let app = App::new(client, Utf8PathBuf::from(cli.output_dir));

    match output_mode {
        OutputMode::Interactive => {
            let sink: &dyn ProgressSink = &TerminalOutput;
            let result = app.run(&resolved.criteria, sink)?;
            TerminalOutput::print_summary(&result.summary);
        }
        OutputMode::NonInteractive => {
            let result = app.run(&resolved.criteria, &JsonOutput)?;
            JsonOutput::print_summary(&result.summary)
                .map_err(|err| TaxlenError::io("stdout", err))?;
        }
    }
    Ok(())
}
