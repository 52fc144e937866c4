use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;

use firm_bridge::RootSync;
use firm_server::{build_bridge, FirmServer, NodeConfig};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args).await,
        Command::Config(args) => cmd_config(args),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<NodeConfig> {
    match path {
        Some(path) => NodeConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(NodeConfig::default()),
    }
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }

    let bridge = Arc::new(build_bridge(&config)?);
    let fs = bridge.init().await.context("initializing bridge")?;
    println!(
        "{} factory {} filesystem {}",
        "✓".green().bold(),
        bridge.factory_address().to_string().cyan(),
        fs.to_string().cyan()
    );

    let sync = if args.no_sync {
        None
    } else {
        Some(RootSync::start(bridge.clone())?)
    };

    println!("firmnode on {}", config.server.bind_addr.to_string().bold());
    let server = FirmServer::new(config.server.clone(), bridge);
    let served = server
        .serve_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed listening for shutdown signal");
            }
        })
        .await;

    if let Some(sync) = sync {
        sync.shutdown().await;
    }
    served?;
    println!("{} stopped", "✓".green());
    Ok(())
}

fn cmd_config(args: ConfigArgs) -> anyhow::Result<()> {
    match args.action {
        ConfigAction::Show { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
        ConfigAction::Init { path, force } => write_default_config(&path, force),
    }
}

fn write_default_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    std::fs::write(path, NodeConfig::default().to_toml()?)
        .with_context(|| format!("writing {}", path.display()))?;
    println!("{} wrote {}", "✓".green().bold(), path.display().to_string().bold());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_writes_loadable_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("firmnode.toml");
        write_default_config(&path, false).unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.server.bind_addr, NodeConfig::default().server.bind_addr);
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("firmnode.toml");
        std::fs::write(&path, "").unwrap();
        assert!(write_default_config(&path, false).is_err());
        write_default_config(&path, true).unwrap();
        assert!(!std::fs::read_to_string(&path).unwrap().is_empty());
    }

    #[test]
    fn missing_config_file_is_reported() {
        let err = load_config(Some(Path::new("/nonexistent/firmnode.toml"))).unwrap_err();
        assert!(err.to_string().contains("loading configuration"));
    }
}
