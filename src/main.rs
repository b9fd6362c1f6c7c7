use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde_json::Value;
use siphon::config::{ConfigError, SiphonConfig};
use siphon::error::{format_with_code, ErrorCode};
use siphon::subprocess::streaming::{chunk_stream, decode_stream, StreamError};
use siphon::subprocess::{ProcessCommandBuilder, ProcessError, SpawnMessagesError, SubprocessManager};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, error, trace};

/// Stream JSON-lines output from a subprocess
#[derive(Parser)]
#[command(name = "siphon")]
#[command(about = "Decode newline-delimited JSON from a running process", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program and print each JSON message it writes to stdout
    Run {
        /// Working directory for the program
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Extra environment variable (KEY=VALUE), may be repeated
        #[arg(long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,

        /// Text written to the program's stdin
        #[arg(long)]
        stdin: Option<String>,

        /// Stop after this many messages
        #[arg(long)]
        limit: Option<usize>,

        /// Program followed by its arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Decode JSON lines from a file, or stdin when no file is given
    Decode {
        /// Bytes per read
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Stop after this many messages
        #[arg(long)]
        limit: Option<usize>,

        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match SiphonConfig::load(cli.config.as_deref()).await {
        Ok(config) => config,
        Err(e) => {
            let (code, message) = describe_failure(&e, ErrorCode::CONFIG_GENERIC);
            eprintln!("Error: {}", format_with_code(code, message));
            std::process::exit(1);
        }
    };

    let log_level = match cli.verbose {
        0 => config.log_level(),
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2)
        .init();

    debug!("siphon started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    let result = match cli.command {
        Commands::Run {
            cwd,
            env,
            stdin,
            limit,
            command,
        } => run_program(&config, cwd, env, stdin, limit, command).await,
        Commands::Decode {
            chunk_size,
            limit,
            file,
        } => run_decode(&config, chunk_size, limit, file).await,
    };

    if let Err(e) = result {
        let (code, message) = describe_failure(&e, ErrorCode::OTHER_GENERIC);
        error!("Fatal error: {}", message);
        eprintln!("Error: {}", format_with_code(code, message));
        std::process::exit(1);
    }
}

async fn run_program(
    config: &SiphonConfig,
    cwd: Option<PathBuf>,
    env: Vec<String>,
    stdin: Option<String>,
    limit: Option<usize>,
    command: Vec<String>,
) -> anyhow::Result<()> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow!("No program given"))?;

    let mut builder = ProcessCommandBuilder::new(program)
        .args(args)
        .envs(parse_env_pairs(&env)?)
        .streaming(&config.streaming);
    if let Some(dir) = &cwd {
        builder = builder.current_dir(dir);
    }
    if let Some(input) = stdin {
        builder = builder.stdin(input);
    }

    let mut stream = SubprocessManager::production()
        .spawn_messages(builder.build(), &config.streaming)
        .await?;

    let mut printed = 0;
    while limit.map_or(true, |limit| printed < limit) {
        match stream.next().await {
            Some(message) => {
                print_message(&message?)?;
                printed += 1;
            }
            None => return Ok(()),
        }
    }

    debug!("Message limit reached after {} messages, terminating", printed);
    stream.terminate();
    Ok(())
}

async fn run_decode(
    config: &SiphonConfig,
    chunk_size: Option<usize>,
    limit: Option<usize>,
    file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let buffer_size = chunk_size.unwrap_or(config.streaming.read_buffer_size);

    let chunks = match &file {
        Some(path) => {
            let reader = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            chunk_stream(reader, buffer_size, path.display().to_string())
        }
        None => chunk_stream(tokio::io::stdin(), buffer_size, "stdin".to_string()),
    };

    let messages = decode_stream(chunks);
    let mut messages = match limit {
        Some(limit) => messages.take(limit).boxed(),
        None => messages,
    };

    while let Some(message) = messages.next().await {
        print_message(&message?)?;
    }
    Ok(())
}

fn print_message(message: &Value) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer(&mut stdout, message)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

fn parse_env_pairs(pairs: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .filter(|(key, _)| !key.is_empty())
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| anyhow!("Invalid --env value '{pair}', expected KEY=VALUE"))
        })
        .collect()
}

/// Pick the error code and message for the outermost known error type
fn describe_failure(err: &anyhow::Error, fallback: u16) -> (u16, String) {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<ConfigError>() {
            return (e.code(), e.to_string());
        }
        if let Some(e) = cause.downcast_ref::<SpawnMessagesError>() {
            return (e.code(), e.to_string());
        }
        if let Some(e) = cause.downcast_ref::<StreamError>() {
            return (e.code(), e.to_string());
        }
        if let Some(e) = cause.downcast_ref::<ProcessError>() {
            return (e.code(), e.to_string());
        }
    }
    (fallback, format!("{err:#}"))
}
