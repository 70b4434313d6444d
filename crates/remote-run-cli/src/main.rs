//! Remote run CLI
//!
//! Submits source code to the remote compile-and-run service and prints
//! what the program produced.
//!
//! Run with: cargo run -p remote-run-cli -- run -l python hello.py

use std::{
    io::{self, Read, Write},
    path::PathBuf,
    time::Duration,
};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use remote_run_core::{Language, Submission};
use remote_run_session::{
    ClientConfig, RunSpec, SessionFactory, execute,
    transcript::{TIMEOUT_MARKER, Transcript, render},
};
use remote_run_transport::WebSocketConnector;
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "remote-run")]
#[command(about = "Run code on a remote compile-and-run service")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program and print its transcript
    Run {
        /// Source file; reads standard input when omitted or `-`
        #[arg(value_name = "FILE")]
        source: Option<PathBuf>,

        /// Language (cpp, python)
        #[arg(short, long)]
        language: Language,

        /// Text fed to the program
        #[arg(long, conflicts_with = "stdin_file")]
        stdin: Option<String>,

        /// File whose contents are fed to the program
        #[arg(long)]
        stdin_file: Option<PathBuf>,

        /// Program argument (repeatable)
        #[arg(short = 'a', long = "arg")]
        args: Vec<String>,

        /// Treat the source as a chat-style submission with an optional
        /// JSON string stdin line
        #[arg(long)]
        raw: bool,

        /// Surface input echoes as output
        #[arg(long)]
        echo: bool,

        /// Print events as they arrive
        #[arg(long)]
        stream: bool,
    },

    /// List supported languages
    Languages,

    /// Show the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        ClientConfig::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration with environment overrides");
        ClientConfig::from_env().context("failed to load configuration")?
    };

    match cli.command {
        Commands::Run {
            source,
            language,
            stdin,
            stdin_file,
            args,
            raw,
            echo,
            stream,
        } => {
            let spec = build_spec(source, language, stdin, stdin_file, args, raw).await?;
            let echo = echo || config.echo;
            let connector =
                WebSocketConnector::new().with_connect_timeout(config.connect_timeout());
            let factory = SessionFactory::new(connector, config).with_echo(echo);

            if stream {
                run_streaming(&factory, &spec).await
            } else {
                run_transcript(&factory, &spec).await
            }
        }
        Commands::Languages => {
            for language in Language::ALL {
                println!("{language}");
            }
            Ok(())
        }
        Commands::ShowConfig => {
            println!("{config:#?}");
            Ok(())
        }
    }
}

async fn build_spec(
    source: Option<PathBuf>,
    language: Language,
    stdin: Option<String>,
    stdin_file: Option<PathBuf>,
    args: Vec<String>,
    raw: bool,
) -> Result<RunSpec> {
    let text = match source {
        Some(path) if path.as_os_str() != "-" => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?,
        _ => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read source from standard input")?;
            buf
        }
    };

    let mut submission = if raw {
        Submission::parse(&text).context("submission rejected")?
    } else {
        if text.trim().is_empty() {
            bail!("source is empty");
        }
        Submission::new(text, "")
    };

    if let Some(path) = stdin_file {
        submission.stdin = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
    } else if let Some(stdin) = stdin {
        submission.stdin = stdin;
    }

    Ok(RunSpec::new(language, submission.code)
        .stdin(submission.stdin)
        .args(args))
}

async fn run_transcript(
    factory: &SessionFactory<WebSocketConnector>,
    spec: &RunSpec,
) -> Result<()> {
    let report = execute(factory, spec).await.context("run failed")?;
    println!("{}", report.transcript);
    print_elapsed(report.elapsed);
    Ok(())
}

async fn run_streaming(
    factory: &SessionFactory<WebSocketConnector>,
    spec: &RunSpec,
) -> Result<()> {
    let started = tokio::time::Instant::now();
    let mut session = factory
        .create(spec.language, &spec.code, spec.args.clone())
        .await
        .context("failed to start session")?;

    let mut stdout = io::stdout().lock();
    write!(stdout, "{}", Transcript::new(session.host()).as_str())?;
    stdout.flush()?;

    session.send(&spec.stdin).await.context("failed to send input")?;

    let limit = factory.config().receive_timeout();
    loop {
        match session.receive(Some(limit)).await {
            Ok(Some(event)) => {
                write!(stdout, "{}", render(&event))?;
                stdout.flush()?;
            }
            Ok(None) => break,
            Err(e) if e.is_timeout() => {
                write!(stdout, "{TIMEOUT_MARKER}")?;
                break;
            }
            Err(e) => {
                session.close().await;
                return Err(e).context("run failed");
            }
        }
    }
    session.close().await;
    writeln!(stdout)?;
    drop(stdout);

    print_elapsed(started.elapsed());
    Ok(())
}

fn print_elapsed(elapsed: Duration) {
    eprintln!("finished in {:.3}s", elapsed.as_secs_f64());
}
