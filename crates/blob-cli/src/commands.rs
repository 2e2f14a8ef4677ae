use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context;
use blob_server::{BlobServer, ServerConfig};
use blob_types::PathValidator;
use colored::Colorize;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let lookup = |key: &str| std::env::var(key).ok();
    match cli.command {
        Command::Serve(args) => {
            let config = resolve_config(cli.config.as_deref(), &args.overrides, lookup)?;
            cmd_serve(config)
        }
        Command::CheckPath(args) => {
            let config = resolve_config(cli.config.as_deref(), &args.overrides, lookup)?;
            cmd_check_path(&config, &args.paths)
        }
        Command::Config(overrides) => {
            let config = resolve_config(cli.config.as_deref(), &overrides, lookup)?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

/// Layer defaults, the config file, the environment and command-line flags,
/// in increasing precedence.
fn resolve_config<F>(file: Option<&Path>, overrides: &OverrideArgs, lookup: F) -> anyhow::Result<ServerConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let base = match file {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading config file {}", path.display()))?,
        None => ServerConfig::default(),
    };
    let mut config = base.with_env(lookup).context("reading configuration from environment")?;

    if let Some(port) = overrides.port {
        config.bind_addr.set_port(port);
    }
    if let Some(port) = overrides.admin_port {
        config.admin_addr = Some(SocketAddr::new(config.bind_addr.ip(), port));
    }
    if let Some(root) = &overrides.root {
        config.storage_root = root.clone();
    }
    tracing::debug!(?config, "resolved configuration");
    Ok(config)
}

fn cmd_serve(config: ServerConfig) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    runtime.block_on(async {
        let root = config.storage_root.display().to_string();
        let server = BlobServer::open(config.clone())
            .await
            .with_context(|| format!("opening storage root {root}"))?;

        println!("{} blob service on {} (root: {})", "✓".green().bold(), config.bind_addr.to_string().bold(), root);
        if let Some(admin) = config.admin_addr {
            println!("  admin service on {}", admin.to_string().bold());
        }
        println!("  entries: {}", server.state().manifest.len().to_string().cyan());

        server.serve().await.context("serving")
    })
}

fn cmd_check_path(config: &ServerConfig, paths: &[String]) -> anyhow::Result<()> {
    let validator = PathValidator::new(&config.storage_root);
    let mut rejected = 0usize;
    for raw in paths {
        match validator.validate(raw) {
            Ok(key) => println!("  {} {} -> {}", "ok".green(), raw, key.to_string().cyan()),
            Err(e) => {
                rejected += 1;
                println!("  {} {} ({})", "rejected".red(), raw, e);
            }
        }
    }
    if rejected > 0 {
        anyhow::bail!("{rejected} of {} paths rejected", paths.len());
    }
    Ok(())
}
