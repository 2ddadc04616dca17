//! Client-side server address configuration.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Protocol, address and port of a devmate server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAddress {
    pub protocol: String,
    pub address: String,
    pub port: String,
}

impl ServerAddress {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.address, self.port)
    }
}

/// Per-field overrides from the command line or environment.
#[derive(Debug, Clone, Default)]
pub struct ServerOverrides {
    pub protocol: Option<String>,
    pub address: Option<String>,
    pub port: Option<String>,
}

impl ServerOverrides {
    /// Apply overrides on top of a saved configuration.
    ///
    /// Without a saved configuration all three fields must be overridden.
    pub fn resolve(self, saved: Option<ServerAddress>) -> Option<ServerAddress> {
        match (saved, self.protocol, self.address, self.port) {
            (Some(saved), protocol, address, port) => Some(ServerAddress {
                protocol: protocol.unwrap_or(saved.protocol),
                address: address.unwrap_or(saved.address),
                port: port.unwrap_or(saved.port),
            }),
            (None, Some(protocol), Some(address), Some(port)) => Some(ServerAddress {
                protocol,
                address,
                port,
            }),
            (None, ..) => None,
        }
    }
}

/// Location of the saved client configuration.
pub fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(Error::msg("cannot resolve home directory"))?;
    let folder = if cfg!(windows) {
        "devmateconfg"
    } else {
        ".devmateconfg"
    };
    Ok(home.join(folder).join("config.json"))
}

pub fn load(path: &Path) -> Result<Option<ServerAddress>> {
    if !path.exists() {
        debug!(path = %path.display(), "no saved configuration");
        return Ok(None);
    }
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let config = serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(config))
}

pub fn save(path: &Path, config: &ServerAddress) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec(config)?)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved() -> ServerAddress {
        ServerAddress {
            protocol: "https".to_owned(),
            address: "lab.example".to_owned(),
            port: "443".to_owned(),
        }
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".devmateconfg").join("config.json");
        assert_eq!(load(&path).unwrap(), None);

        save(&path, &saved()).unwrap();
        assert_eq!(load(&path).unwrap(), Some(saved()));
    }

    #[test]
    fn overrides_apply_per_field() {
        let overrides = ServerOverrides {
            port: Some("8443".to_owned()),
            ..Default::default()
        };
        let resolved = overrides.resolve(Some(saved())).unwrap();
        assert_eq!(resolved.base_url(), "https://lab.example:8443");
    }

    #[test]
    fn address_alone_is_not_configured() {
        let overrides = ServerOverrides {
            address: Some("localhost".to_owned()),
            ..Default::default()
        };
        assert_eq!(overrides.resolve(None), None);
    }

    #[test]
    fn full_overrides_need_no_saved_config() {
        let overrides = ServerOverrides {
            protocol: Some("http".to_owned()),
            address: Some("localhost".to_owned()),
            port: Some("9000".to_owned()),
        };
        assert_eq!(
            overrides.resolve(None).unwrap().base_url(),
            "http://localhost:9000"
        );
    }

    #[test]
    fn unconfigured() {
        assert_eq!(ServerOverrides::default().resolve(None), None);
    }
}
