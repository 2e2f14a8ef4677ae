use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "blob", about = "Path-addressed blob storage over HTTP", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML configuration file, applied before the environment
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the blob service until interrupted
    Serve(ServeArgs),
    /// Show how paths would be keyed, or why they are rejected
    CheckPath(CheckPathArgs),
    /// Print the effective configuration as TOML
    Config(OverrideArgs),
}

/// Flags that take precedence over the config file and environment.
#[derive(Args, Clone, Debug, Default)]
pub struct OverrideArgs {
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub admin_port: Option<u16>,
    #[arg(long)]
    pub root: Option<PathBuf>,
}

#[derive(Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: OverrideArgs,
}

#[derive(Args)]
pub struct CheckPathArgs {
    #[arg(required = true)]
    pub paths: Vec<String>,
    #[command(flatten)]
    pub overrides: OverrideArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serve_defaults() {
        let cli = Cli::try_parse_from(["blob", "serve"]).unwrap();
        assert!(!cli.verbose);
        assert!(cli.config.is_none());
        if let Command::Serve(args) = cli.command {
            assert!(args.overrides.port.is_none());
            assert!(args.overrides.root.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_serve_overrides() {
        let cli = Cli::try_parse_from([
            "blob", "serve", "--port", "8080", "--admin-port", "8081", "--root", "/srv/blob",
        ])
        .unwrap();
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.overrides.port, Some(8080));
            assert_eq!(args.overrides.admin_port, Some(8081));
            assert_eq!(args.overrides.root, Some(PathBuf::from("/srv/blob")));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["blob", "config", "--config", "blob.toml", "-v"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("blob.toml")));
        assert!(matches!(cli.command, Command::Config(_)));
    }

    #[test]
    fn parse_check_path() {
        let cli = Cli::try_parse_from(["blob", "check-path", "/a.txt", "../etc"]).unwrap();
        if let Command::CheckPath(args) = cli.command {
            assert_eq!(args.paths, vec!["/a.txt", "../etc"]);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn check_path_requires_paths() {
        assert!(Cli::try_parse_from(["blob", "check-path"]).is_err());
    }

    #[test]
    fn invalid_port_rejected() {
        assert!(Cli::try_parse_from(["blob", "serve", "--port", "99999"]).is_err());
    }
}
