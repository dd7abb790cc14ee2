mod commands;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_DISPLAY_AUTH, EXIT_FAILURE, EXIT_NOT_RUNNING, EXIT_VALIDATION};
use labctl_core::Engine;
use labctl_runtime::{select_backend, DisplayHost, MockDisplay, SystemDisplay};
use labctl_schema::{layout::DEFAULT_CONTEXT_DIR, ContextLayout};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "labctl",
    version,
    about = "Manage Isaac Lab development containers over docker compose"
)]
struct Cli {
    /// Directory holding the compose fragments and env files [env: LABCTL_CONTEXT] [default: docker].
    #[arg(long, global = true, value_name = "DIR")]
    context: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    /// Container runtime backend.
    #[arg(long, default_value = "docker", global = true, hide = true)]
    runtime: String,

    #[command(subcommand)]
    command: Commands,
}

/// Extension plus the fragments and env files layered on top of it.
#[derive(Debug, Args)]
struct Target {
    /// Extension to operate on (default: base).
    extension: Option<String>,
    /// Extra compose fragment, applied after the built-in ones (repeatable).
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    files: Vec<PathBuf>,
    /// Extra env file, applied after the built-in ones (repeatable).
    #[arg(long = "env-file", value_name = "FILE")]
    env_files: Vec<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build the image and start the instance in the background.
    Start {
        #[command(flatten)]
        target: Target,
        /// Enable X11 forwarding without asking (first start only).
        #[arg(long, default_value_t = false, conflicts_with = "no_x11")]
        yes_x11: bool,
        /// Disable X11 forwarding without asking (first start only).
        #[arg(long, default_value_t = false)]
        no_x11: bool,
    },
    /// Build the image without starting an instance.
    Build {
        #[command(flatten)]
        target: Target,
    },
    /// Print the merged compose configuration.
    Config {
        #[command(flatten)]
        target: Target,
        /// Write the merged configuration to this file instead of stdout.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Open an interactive shell in a running instance.
    Enter {
        #[command(flatten)]
        target: Target,
        /// Shell to run inside the container.
        #[arg(long, default_value = "bash")]
        shell: String,
    },
    /// Copy logs, data, and built docs out of an instance or its volumes.
    Copy {
        #[command(flatten)]
        target: Target,
        /// Destination directory [default: <context>/artifacts].
        #[arg(long, value_name = "DIR")]
        dest: Option<PathBuf>,
    },
    /// Stop and remove the instance. Named volumes are kept.
    Stop {
        #[command(flatten)]
        target: Target,
    },
    /// Run diagnostic checks on the host and the compose context.
    Doctor,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn make_engine(context: PathBuf, runtime: &str) -> Result<Engine, String> {
    let backend = select_backend(runtime).map_err(|e| e.to_string())?;
    let display: Box<dyn DisplayHost> = if runtime == "mock" {
        Box::new(MockDisplay::headless())
    } else {
        Box::new(SystemDisplay::new())
    };
    Engine::new(ContextLayout::new(context), backend, display).map_err(|e| e.to_string())
}

fn exit_code_for(msg: &str) -> u8 {
    if msg.starts_with("unknown extension")
        || msg.starts_with("missing fragment")
        || msg.starts_with("schema error:")
    {
        EXIT_VALIDATION
    } else if msg.starts_with("instance '") {
        EXIT_NOT_RUNNING
    } else if msg.starts_with("display authorization") {
        EXIT_DISPLAY_AUTH
    } else {
        EXIT_FAILURE
    }
}

#[allow(clippy::too_many_lines)]
fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("LABCTL_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let context = cli
        .context
        .or_else(|| std::env::var_os("LABCTL_CONTEXT").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTEXT_DIR));
    let json_output = cli.json;

    let needs_runtime = matches!(
        cli.command,
        Commands::Start { .. }
            | Commands::Build { .. }
            | Commands::Enter { .. }
            | Commands::Copy { .. }
            | Commands::Stop { .. }
    );
    if needs_runtime
        && cli.runtime == "docker"
        && std::env::var("LABCTL_SKIP_PREREQS").as_deref() != Ok("1")
    {
        let missing = labctl_runtime::check_docker_prereqs();
        if !missing.is_empty() {
            eprintln!("error: {}", labctl_runtime::format_missing(&missing));
            return ExitCode::from(EXIT_FAILURE);
        }
    }

    let runtime = cli.runtime;
    let with_engine = |run: &dyn Fn(&Engine) -> Result<u8, String>| {
        make_engine(context.clone(), &runtime).and_then(|engine| run(&engine))
    };

    let result = match cli.command {
        Commands::Start {
            target,
            yes_x11,
            no_x11,
        } => {
            let answer = match (yes_x11, no_x11) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            commands::compose_extras(&target.files, &target.env_files).and_then(|extras| {
                with_engine(&|engine| {
                    commands::start::run(
                        engine,
                        target.extension.as_deref(),
                        &extras,
                        answer,
                        json_output,
                    )
                })
            })
        }
        Commands::Build { target } => commands::compose_extras(&target.files, &target.env_files)
            .and_then(|extras| {
                with_engine(&|engine| {
                    commands::build::run(engine, target.extension.as_deref(), &extras, json_output)
                })
            }),
        Commands::Config { target, output } => {
            commands::compose_extras(&target.files, &target.env_files).and_then(|extras| {
                with_engine(&|engine| {
                    commands::config::run(
                        engine,
                        target.extension.as_deref(),
                        &extras,
                        output.as_deref(),
                        json_output,
                    )
                })
            })
        }
        Commands::Enter { target, shell } => {
            commands::compose_extras(&target.files, &target.env_files).and_then(|extras| {
                with_engine(&|engine| {
                    commands::enter::run(engine, target.extension.as_deref(), &extras, &shell)
                })
            })
        }
        Commands::Copy { target, dest } => {
            commands::compose_extras(&target.files, &target.env_files).and_then(|extras| {
                with_engine(&|engine| {
                    commands::copy::run(
                        engine,
                        target.extension.as_deref(),
                        &extras,
                        dest.as_deref(),
                        json_output,
                    )
                })
            })
        }
        Commands::Stop { target } => commands::compose_extras(&target.files, &target.env_files)
            .and_then(|extras| {
                with_engine(&|engine| {
                    commands::stop::run(engine, target.extension.as_deref(), &extras, json_output)
                })
            }),
        Commands::Doctor => with_engine(&|engine| commands::doctor::run(engine, json_output)),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}
