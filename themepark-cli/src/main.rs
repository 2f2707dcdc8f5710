//! Theme-park proxy CLI

mod render;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Args, Parser, Subcommand};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use themepark_config::{load_from_file, validate_config, warnings, Config};
use themepark_middleware::theme_park::DEFAULT_BASE_URL;
use themepark_middleware::{CspRewriter, LogLevel, MiddlewareBuilder, ThemeParkConfig};
use themepark_proxy::{Server, SignalHandler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "themepark")]
#[command(about = "Reverse proxy that injects theme-park stylesheets", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the proxy (start the server)
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "themepark.yaml", env = "THEMEPARK_CONFIG")]
        config: PathBuf,

        /// Log level (trace, debug, info, warn, error), overrides the config file
        #[arg(short, long)]
        log_level: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "themepark.yaml", env = "THEMEPARK_CONFIG")]
        config: PathBuf,

        /// Print the parsed configuration as JSON
        #[arg(long)]
        print: bool,
    },

    /// Run a local HTML file through the rewriting pipeline
    Render(RenderArgs),

    /// Print a Content-Security-Policy with the theme hosts allowed
    Csp {
        /// Policy header value to rewrite
        policy: String,

        /// theme-park base URL whose host is allowed
        #[arg(long, default_value = DEFAULT_BASE_URL)]
        base_url: String,
    },

    /// Show version information
    Version,
}

#[derive(Args)]
struct RenderArgs {
    /// HTML file to render, `-` for stdin
    input: PathBuf,

    /// Take the middleware chain from a configuration file
    #[arg(short, long, conflicts_with_all = ["app", "theme", "addons", "target", "base_url"])]
    config: Option<PathBuf>,

    /// Application to theme
    #[arg(long, required_unless_present = "config")]
    app: Option<String>,

    /// Theme name, empty for the app's base theme
    #[arg(long, default_value = "")]
    theme: String,

    /// Addon to link after the theme (repeatable)
    #[arg(long = "addon")]
    addons: Vec<String>,

    /// Literal anchor to insert before instead of the app's default
    #[arg(long)]
    target: Option<String>,

    /// theme-park base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Accept-Encoding sent with the request
    #[arg(long)]
    accept_encoding: Option<String>,

    /// Content-Type the upstream answers with
    #[arg(long, default_value = "text/html")]
    content_type: String,

    /// Print response status and headers to stderr
    #[arg(long)]
    headers: bool,

    /// Write the rendered page here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, log_level } => {
            let path = config;
            let config = load_from_file(&path)?;

            init_tracing(
                effective_level(log_level.as_deref(), &config)?,
                &config.observability.logging.format,
            )?;

            tracing::info!("Starting theme-park proxy");
            tracing::info!("Config file: {}", path.display());

            validate_config(&config)?;

            tracing::info!(
                listen = %config.proxy.listen,
                upstream = %config.proxy.upstream,
                "Configuration loaded"
            );

            let server = Server::new(&config)?;

            let shutdown_signal = server.shutdown_signal();
            tokio::spawn(async move {
                let handler = SignalHandler::new(shutdown_signal);
                handler.run().await;
            });

            server.run().await?;

            Ok(())
        }

        Commands::Validate { config, print } => {
            init_tracing(LogLevel::INFO, "text")?;

            tracing::info!("Validating configuration: {}", config.display());

            let result = load_from_file(&config).and_then(|cfg| {
                validate_config(&cfg)?;
                cfg.middleware()?;
                Ok(cfg)
            });

            match result {
                Ok(cfg) => {
                    tracing::info!("✓ Configuration is valid");
                    tracing::info!("  Listen: {}", cfg.proxy.listen);
                    tracing::info!("  Upstream: {}", cfg.proxy.upstream);
                    if let Some(ref theme_park) = cfg.theme_park {
                        tracing::info!(
                            "  Theme: {} / {} ({} addons)",
                            theme_park.app(),
                            theme_park.theme_name(),
                            theme_park.addons.len()
                        );
                    }
                    if let Some(ref rewrite_body) = cfg.rewrite_body {
                        tracing::info!("  Rewrites: {}", rewrite_body.rewrites.len());
                    }
                    tracing::info!("  Warnings: {}", warnings(&cfg).len());

                    if print {
                        println!("{}", serde_json::to_string_pretty(&cfg)?);
                    }
                    Ok(())
                }
                Err(e) => {
                    tracing::error!("✗ Configuration validation failed: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Render(args) => {
            init_tracing(LogLevel::WARN, "text")?;
            run_render(args).await
        }

        Commands::Csp { policy, base_url } => {
            println!("{}", CspRewriter::for_base_url(&base_url).rewrite(&policy));
            Ok(())
        }

        Commands::Version => {
            println!("theme-park proxy");
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
            Ok(())
        }
    }
}

async fn run_render(args: RenderArgs) -> Result<()> {
    let page = read_input(&args.input)?;

    let chain = match args.config {
        Some(ref path) => {
            let config = load_from_file(path)?;
            validate_config(&config)?;
            config.middleware()?
        }
        None => {
            let app = args.app.clone().unwrap_or_default();
            let mut theme_park = ThemeParkConfig::new(app, args.theme.as_str());
            theme_park.addons = args.addons.clone();
            theme_park.target = args.target.clone();
            if let Some(ref base_url) = args.base_url {
                theme_park.base_url = base_url.clone();
            }
            MiddlewareBuilder::new().with_theme_park(&theme_park)?
        }
    }
    .build();

    let rendered = render::render(
        chain,
        page,
        &args.content_type,
        args.accept_encoding.as_deref(),
    )
    .await?;

    if args.headers {
        eprintln!("{}", rendered.status);
        for (name, value) in &rendered.headers {
            eprintln!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
        }
        eprintln!("(decoded from {:?})", rendered.encoding);
    }

    match args.output {
        Some(path) => std::fs::write(&path, &rendered.body)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => std::io::stdout().write_all(&rendered.body)?,
    }

    Ok(())
}

fn read_input(path: &Path) -> Result<Bytes> {
    if path.as_os_str() == "-" {
        let mut page = Vec::new();
        std::io::stdin().read_to_end(&mut page)?;
        return Ok(page.into());
    }

    let page = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(page.into())
}

/// Most verbose of the global level and every middleware's own level, so
/// per-instance debug dumps are not filtered out by the subscriber
fn effective_level(flag: Option<&str>, config: &Config) -> Result<LogLevel> {
    let global: LogLevel = flag
        .unwrap_or(&config.observability.logging.level)
        .parse()
        .map_err(anyhow::Error::msg)?;

    let instances = config
        .theme_park
        .iter()
        .map(|t| t.log_level)
        .chain(config.rewrite_body.iter().map(|r| r.log_level));

    Ok(instances.fold(global, |most, level| {
        if level.level() > most.level() {
            level
        } else {
            most
        }
    }))
}

fn init_tracing(level: LogLevel, format: &str) -> Result<()> {
    let filter =
        tracing_subscriber::EnvFilter::from_default_env().add_directive(level.level().into());

    let registry = tracing_subscriber::registry().with(filter);

    if format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    Ok(())
}
