use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "firmnode",
    about = "Keeps contract directories in a content-addressed store in step with the ledger",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize the node and serve the HTTP API
    Serve(ServeArgs),
    /// Show or create configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Configuration file; defaults apply when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Override `server.bind_addr`
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Do not follow root updates from the ledger
    #[arg(long)]
    pub no_sync: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Write a configuration file with default values
    Init {
        #[arg(default_value = "firmnode.toml")]
        path: PathBuf,
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serve() {
        let cli = Cli::try_parse_from(["firmnode", "serve"]).unwrap();
        if let Command::Serve(args) = cli.command {
            assert!(args.config.is_none());
            assert!(args.bind.is_none());
            assert!(!args.no_sync);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_serve_overrides() {
        let cli = Cli::try_parse_from([
            "firmnode", "serve", "-c", "node.toml", "--bind", "0.0.0.0:8080", "--no-sync",
        ])
        .unwrap();
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.config, Some(PathBuf::from("node.toml")));
            assert_eq!(args.bind.unwrap().port(), 8080);
            assert!(args.no_sync);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_config_init_default_path() {
        let cli = Cli::try_parse_from(["firmnode", "config", "init"]).unwrap();
        match cli.command {
            Command::Config(ConfigArgs {
                action: ConfigAction::Init { path, force },
            }) => {
                assert_eq!(path, PathBuf::from("firmnode.toml"));
                assert!(!force);
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn bad_bind_is_rejected() {
        assert!(Cli::try_parse_from(["firmnode", "serve", "--bind", "nowhere"]).is_err());
    }

    #[test]
    fn verbose_is_global() {
        let cli = Cli::try_parse_from(["firmnode", "serve", "-v"]).unwrap();
        assert!(cli.verbose);
    }
}
