use std::env;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use tracing_subscriber::filter::LevelFilter;

use iam_gate::api::{self, RouteError};
use iam_gate::gate::CLIENT_SECRET_KEY;
use iam_gate::settings::AppConfig;

const APP_NAME: &str = "iam-gate";

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn async_serve(ctx: RuntimeContext, cmd: ServeCommand) -> Result<()> {
    handle_serve(&ctx, cmd).await
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common)?;
    ctx.init_logging();
    debug!("config file: {}", ctx.config_file.display());

    match cli.command {
        Command::Serve(cmd) => async_serve(ctx, cmd),
        Command::Check => handle_check(&ctx),
        Command::Config { command } => handle_config(&ctx, command),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "IAM Gate - OAuth2 password-grant authentication gate.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", env = "IAM_GATE_CONFIG", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Output machine readable JSON
    #[arg(long, global = true)]
    json: bool,
    /// Control color output (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    color: ColorOption,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorOption {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the gate in front of the configured upstreams
    Serve(ServeCommand),
    /// Validate the configuration and build every gate, then exit
    Check,
    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, Clone, Args)]
struct ServeCommand {
    /// Address to bind to (overrides server.bind)
    #[arg(short, long)]
    bind: Option<String>,
    /// Port to listen on (overrides server.port)
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the resolved config file path
    Path,
    /// Print the effective configuration with secrets redacted
    Show,
    /// Write an example configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    config_file: PathBuf,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let config_file = resolve_config_file(common.config.clone())?;

        let config = AppConfig::load(&config_file)
            .with_context(|| format!("loading config from {}", config_file.display()))?;

        Ok(Self {
            common,
            config_file,
            config,
        })
    }

    fn init_logging(&self) {
        use tracing_subscriber::EnvFilter;

        let level = self.effective_log_level();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("iam_gate={level},tower_http={level}")));
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr);

        if self.common.json {
            subscriber.json().try_init().ok();
        } else {
            subscriber.with_ansi(self.use_color()).try_init().ok();
        }
    }

    fn use_color(&self) -> bool {
        match self.common.color {
            ColorOption::Always => true,
            ColorOption::Never => false,
            ColorOption::Auto => env::var_os("NO_COLOR").is_none() && io::stderr().is_terminal(),
        }
    }

    fn effective_log_level(&self) -> LevelFilter {
        if self.common.quiet {
            LevelFilter::ERROR
        } else if self.common.trace {
            LevelFilter::TRACE
        } else if self.common.debug {
            LevelFilter::DEBUG
        } else {
            match self.common.verbose {
                0 => LevelFilter::INFO,
                1 => LevelFilter::DEBUG,
                _ => LevelFilter::TRACE,
            }
        }
    }
}

async fn handle_serve(ctx: &RuntimeContext, cmd: ServeCommand) -> Result<()> {
    let mut server = ctx.config.server.clone();
    if let Some(bind) = cmd.bind {
        server.bind = bind;
    }
    if let Some(port) = cmd.port {
        server.port = port;
    }

    if ctx.config.routes.is_empty() {
        warn!(
            "no routes configured in {}; only {} will answer",
            ctx.config_file.display(),
            api::HEALTH_PATH
        );
    }

    // Every gate is built before the listener opens.
    let app = api::create_router(&ctx.config).context("building gated routes")?;

    let addr: SocketAddr = format!("{}:{}", server.bind, server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", server.bind, server.port))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(
        "Starting {} on {} with {} gated route(s)",
        APP_NAME,
        addr,
        ctx.config.routes.len()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    info!("{} stopped", APP_NAME);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

fn handle_check(ctx: &RuntimeContext) -> Result<()> {
    if let Err(err) = api::create_router(&ctx.config) {
        if ctx.common.json {
            println!("{}", check_failure(&err));
        }
        return Err(anyhow::Error::new(err).context("configuration check failed"));
    }

    let routes: Vec<&str> = ctx.config.routes.iter().map(|r| r.name.as_str()).collect();
    if ctx.common.json {
        println!(
            "{}",
            json!({
                "status": "ok",
                "config": ctx.config_file.display().to_string(),
                "routes": routes,
            })
        );
    } else if !ctx.common.quiet {
        println!(
            "ok: {} route(s) valid in {}",
            routes.len(),
            ctx.config_file.display()
        );
    }
    Ok(())
}

fn check_failure(err: &RouteError) -> Value {
    json!({
        "status": "error",
        "route": err.route(),
        "error": err.to_string(),
    })
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Path => {
            println!("{}", ctx.config_file.display());
        }
        ConfigCommand::Show => {
            let redacted = redact_secrets(ctx.config.clone());
            if ctx.common.json {
                let text = serde_json::to_string_pretty(&redacted)
                    .context("serializing config to JSON")?;
                println!("{text}");
            } else {
                let text =
                    toml::to_string_pretty(&redacted).context("serializing config to TOML")?;
                print!("{text}");
            }
        }
        ConfigCommand::Init { force } => {
            if ctx.config_file.exists() && !force {
                return Err(anyhow!(
                    "{} already exists (use --force to overwrite)",
                    ctx.config_file.display()
                ));
            }
            write_example_config(&ctx.config_file)?;
            println!("wrote {}", ctx.config_file.display());
        }
    }
    Ok(())
}

/// Literal client secrets are hidden; `env:` references are kept.
fn redact_secrets(mut config: AppConfig) -> AppConfig {
    for route in &mut config.routes {
        for (key, value) in route.iam.iter_mut() {
            if key.eq_ignore_ascii_case(CLIENT_SECRET_KEY) && !value.starts_with("env:") {
                *value = "<redacted>".to_string();
            }
        }
    }
    config
}

fn write_example_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let toml =
        toml::to_string_pretty(&AppConfig::example()).context("serializing example config")?;
    let mut body = String::new();
    body.push_str("# Configuration for ");
    body.push_str(APP_NAME);
    body.push('\n');
    body.push_str("# File: ");
    body.push_str(&path.display().to_string());
    body.push_str("\n\n");
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

/// `--config` may name a file or a directory and may use `~` or `$VARS`.
/// Without it, `<config dir>/iam-gate/config.toml` is used.
fn resolve_config_file(arg: Option<PathBuf>) -> Result<PathBuf> {
    let Some(path) = arg else {
        return dirs::config_dir()
            .map(|dir| dir.join(APP_NAME).join("config.toml"))
            .ok_or_else(|| anyhow!("unable to determine configuration directory"));
    };

    let path = match path.to_str() {
        Some(text) => PathBuf::from(
            shellexpand::full(text)
                .context("expanding config path")?
                .into_owned(),
        ),
        None => path,
    };
    Ok(if path.is_dir() {
        path.join("config.toml")
    } else {
        path
    })
}
