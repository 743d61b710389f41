use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use plugin_loader::config::split_plugin_list;
use plugin_loader::plugins::{CargoBuilder, DylibLoader, PluginLoader, PluginRegistry};
use plugin_loader::LoaderConfig;

#[derive(Parser)]
#[command(name = "plugin-loader")]
#[command(about = "Resolve, build, load and initialise host plugins", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct ConfigArgs {
    /// Config file (defaults to ~/.config/plugin-loader/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory compiled modules are written to
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Root of the plugin source tree
    #[arg(long)]
    source_root: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load plugins and list the resulting registry
    Load {
        /// Comma separated list of plugins e.g broker/rabbitmq,registry/etcd,micro/basic_auth,/path/to/plugin.so
        #[arg(short, long)]
        plugins: Option<String>,

        /// Print the registry as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Show what identifiers resolve to without building or loading
    Resolve {
        identifiers: Vec<String>,

        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Show version information
    Version,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(args: &ConfigArgs) -> anyhow::Result<LoaderConfig> {
    let mut config = LoaderConfig::load(args.config.as_deref())?;
    if let Some(ref dir) = args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(ref root) = args.source_root {
        config.source_root = root.clone();
    }
    Ok(config)
}

fn pipeline(config: &LoaderConfig) -> PluginLoader<CargoBuilder, DylibLoader> {
    let builder = CargoBuilder::new(
        config.cargo.clone(),
        config.host_crate.clone(),
        config.build_dir(),
        config.release,
    );
    PluginLoader::new(config, builder, DylibLoader::new())
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Some(Commands::Version) | None => {
            println!("plugin-loader {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Load {
            plugins,
            json,
            config,
        }) => {
            let mut config = load_config(&config)?;
            if let Some(list) = plugins {
                config.plugins = split_plugin_list(&list);
            }

            let mut registry = PluginRegistry::new();
            let report = pipeline(&config).load_all(&config.plugins, &mut registry)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&registry.summaries())?);
            } else {
                for plugin in registry.iter() {
                    println!(
                        "{:<24} {:<10} {}",
                        plugin.name(),
                        plugin.category().map_or("-", |c| c.as_str()),
                        plugin.module_path().display()
                    );
                }
                println!(
                    "{} loaded, {} built, {} skipped",
                    report.loaded.len(),
                    report.built_count(),
                    report.skipped
                );
            }
        }
        Some(Commands::Resolve {
            identifiers,
            config,
        }) => {
            let config = load_config(&config)?;
            let loader = pipeline(&config);
            for raw in &identifiers {
                let Some(plan) = loader.plan(raw)? else {
                    continue;
                };
                let state = plan
                    .cache
                    .map_or_else(|| "direct".to_string(), |s| format!("{:?}", s).to_lowercase());
                println!(
                    "{} -> {} [{}] ({})",
                    plan.identifier,
                    plan.module_path.display(),
                    plan.entry_symbol,
                    state
                );
                if let Some(spec) = plan.spec {
                    println!("    source: {}", spec.source_path.display());
                }
            }
        }
    }

    Ok(())
}
