use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Error, Result};
use clap::{Args, Parser, Subcommand};
use path_absolutize::Absolutize;
use tracing::debug;

use crate::config::ServerOverrides;

#[derive(Parser, Debug)]
#[command(name = "devmate")]
#[command(bin_name = "devmate")]
#[command(about = "Reserve, release and manage shared devices")]
pub struct Cli {
    #[command(flatten)]
    pub server: ServerArgs,

    #[command(subcommand)]
    pub commands: Commands,
}

/// Where the client finds the devmate server.
#[derive(Args, Debug, Clone, Default)]
pub struct ServerArgs {
    #[arg(long, env = "DEVMATE_PROTOCOL", global = true)]
    pub protocol: Option<String>,

    #[arg(long, env = "DEVMATE_ADDRESS", global = true)]
    pub address: Option<String>,

    #[arg(long, env = "DEVMATE_PORT", global = true)]
    pub port: Option<String>,
}

impl From<&ServerArgs> for ServerOverrides {
    fn from(args: &ServerArgs) -> Self {
        ServerOverrides {
            protocol: args.protocol.clone(),
            address: args.address.clone(),
            port: args.port.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the device reservation server.
    Serve {
        #[arg(long, env = "DEVMATE_LISTEN", default_value = "0.0.0.0:8080")]
        listen: SocketAddr,

        /// Directory holding the device table.
        #[arg(long, env = "DEVMATE_STATE_DIR")]
        state_dir: Option<PathBuf>,

        /// Keep devices in memory only.
        #[arg(long, conflicts_with = "state_dir")]
        in_memory: bool,
    },
    /// List all devices and their reservations.
    List,
    /// Reserve a device for use.
    Reserve {
        device: String,

        #[arg(long, env = "USER", default_value = "")]
        user: String,
    },
    /// Release a previously reserved device.
    Release { device: String },
    /// Add a new device.
    Add {
        device: String,

        #[arg(long)]
        model: String,
    },
    /// Set a device to offline mode.
    Offline { device: String },
    /// Set an offline device back to available mode.
    Online { device: String },
    /// Permanently remove a device.
    Delete { device: String },
    /// Save the server given by --protocol, --address and --port.
    Configure,
    Version,
}

impl Cli {
    pub fn version(&self) -> bool {
        matches!(self.commands, Commands::Version)
    }

    /// Directory for the server's device table.
    pub fn state_dir(&self) -> Result<PathBuf> {
        let configured = match &self.commands {
            Commands::Serve { state_dir, .. } => state_dir.clone(),
            _ => return Err(Error::msg("state dir only applies to serve")),
        };
        let state_dir = match configured {
            Some(dir) => dir,
            None => dirs::state_dir()
                .or(dirs::data_local_dir())
                .ok_or(Error::msg("cannot resolve state dir"))?
                .join("devmate"),
        };
        let state_dir = state_dir.absolutize()?.to_path_buf();
        debug!(state_dir = %state_dir.display());
        Ok(state_dir)
    }
}

/// Default reservation owner when `--user` is not given.
pub fn login_name(user: &str) -> Option<String> {
    if !user.is_empty() {
        return Some(user.to_owned());
    }
    std::env::var("USERNAME").ok().filter(|u| !u.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reserve() {
        let cli = Cli::try_parse_from(["devmate", "reserve", "D1", "--user", "alice"]).unwrap();
        match cli.commands {
            Commands::Reserve { device, user } => {
                assert_eq!(device, "D1");
                assert_eq!(user, "alice");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn add_requires_model() {
        assert!(Cli::try_parse_from(["devmate", "add", "D1"]).is_err());
    }

    #[test]
    fn serve_state_dir_is_absolute() {
        let cli =
            Cli::try_parse_from(["devmate", "serve", "--state-dir", "relative/dir"]).unwrap();
        let dir = cli.state_dir().unwrap();
        assert!(dir.is_absolute());
        assert!(dir.ends_with("relative/dir"));
    }

    #[test]
    fn in_memory_conflicts_with_state_dir() {
        assert!(Cli::try_parse_from([
            "devmate",
            "serve",
            "--in-memory",
            "--state-dir",
            "/tmp/x"
        ])
        .is_err());
    }

    #[test]
    fn global_server_args() {
        let cli = Cli::try_parse_from(["devmate", "list", "--address", "lab", "--port", "9000"])
            .unwrap();
        assert_eq!(cli.server.address.as_deref(), Some("lab"));
        assert_eq!(cli.server.port.as_deref(), Some("9000"));
    }

    #[test]
    fn configure_uses_server_args() {
        let cli = Cli::try_parse_from([
            "devmate",
            "configure",
            "--protocol",
            "https",
            "--address",
            "lab",
            "--port",
            "443",
        ])
        .unwrap();
        assert!(matches!(cli.commands, Commands::Configure));
        assert_eq!(cli.server.protocol.as_deref(), Some("https"));
    }

    #[test]
    fn explicit_login_name_wins() {
        assert_eq!(login_name("alice").as_deref(), Some("alice"));
    }
}
