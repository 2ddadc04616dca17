use std::{net::SocketAddr, sync::Arc};

use anyhow::{Error, Result};
use devmate_lease::{JsonFileStore, LeaseService, MemoryStore};
use tokio::{net::TcpListener, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    cli::{login_name, Commands},
    client::{Client, Request},
    config::{self, ServerAddress, ServerOverrides},
    initialize_stderr_logging, initialize_stdout_logging, server, Cli,
};

/// File name of the device table inside the state directory.
const DEVICE_TABLE: &str = "devices.json";

pub struct App {
    cli: Cli,
}

impl App {
    pub fn new(cli: Cli) -> Result<App> {
        Ok(App { cli })
    }

    #[tracing::instrument(skip_all)]
    pub async fn run(&mut self) -> Result<()> {
        if self.cli.version() {
            println!("devmate {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }

        match self.cli.commands {
            Commands::Serve {
                listen, in_memory, ..
            } => {
                initialize_stdout_logging();
                let res = self.serve(listen, in_memory).await;
                if let Err(e) = &res {
                    error!(err = e.to_string());
                }
                res
            }
            Commands::Configure => {
                let saved = self.configured()?;
                config::save(&config::config_path()?, &saved)?;
                println!(
                    "Configuration saved. Protocol: {}, Address: {}, Port: {}",
                    saved.protocol, saved.address, saved.port
                );
                Ok(())
            }
            _ => {
                initialize_stderr_logging();
                self.run_client().await
            }
        }
    }

    #[tracing::instrument(skip(self), err)]
    async fn serve(&self, listen: SocketAddr, in_memory: bool) -> Result<()> {
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();

        // Set up ctrl-c handler
        let ctrl_c_cancel = cancel.clone();
        tasks.spawn(async move {
            tokio::select! {
                _ = ctrl_c_cancel.cancelled() => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Received ctrl-c, shutting down...");
                    ctrl_c_cancel.cancel();
                }
            }
            Ok::<(), Error>(())
        });

        let listener = TcpListener::bind(listen).await?;
        if in_memory {
            info!("keeping devices in memory only");
            let service = Arc::new(LeaseService::new(MemoryStore::new()));
            tasks.spawn(server::serve(listener, service, cancel.clone()));
        } else {
            let path = self.cli.state_dir()?.join(DEVICE_TABLE);
            let store = JsonFileStore::open(&path).await?;
            info!(path = %store.path().display(), "device table");
            let service = Arc::new(LeaseService::new(store));
            tasks.spawn(server::serve(listener, service, cancel.clone()));
        }

        let mut result = Ok(());
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined? {
                result = Err(e);
            }
            // Either task finishing ends the other.
            cancel.cancel();
        }
        result
    }

    fn configured(&self) -> Result<ServerAddress> {
        let args = &self.cli.server;
        match (&args.protocol, &args.address, &args.port) {
            (Some(protocol), Some(address), Some(port)) => Ok(ServerAddress {
                protocol: protocol.clone(),
                address: address.clone(),
                port: port.clone(),
            }),
            _ => Err(Error::msg(
                "configure requires --protocol, --address and --port",
            )),
        }
    }

    fn request(&self) -> Result<Request> {
        let request = match &self.cli.commands {
            Commands::List => Request::List,
            Commands::Reserve { device, user } => Request::Reserve {
                device: device.clone(),
                user: login_name(user)
                    .ok_or(Error::msg("cannot determine user name, pass --user"))?,
            },
            Commands::Release { device } => Request::Release {
                device: device.clone(),
            },
            Commands::Add { device, model } => Request::Add {
                device: device.clone(),
                model: model.clone(),
            },
            Commands::Offline { device } => Request::Offline {
                device: device.clone(),
            },
            Commands::Online { device } => Request::Online {
                device: device.clone(),
            },
            Commands::Delete { device } => Request::Delete {
                device: device.clone(),
            },
            Commands::Serve { .. } | Commands::Configure | Commands::Version => {
                return Err(Error::msg("not a device command"))
            }
        };
        Ok(request)
    }

    async fn run_client(&self) -> Result<()> {
        let request = self.request()?;
        let saved = config::load(&config::config_path()?)?;
        let server = ServerOverrides::from(&self.cli.server)
            .resolve(saved)
            .ok_or(Error::msg(
                "Server protocol, address, and port are not configured. Please run 'devmate configure' first.",
            ))?;

        let client = Client::new(&server)?;
        if let Some(note) = client.check_health().await? {
            println!("{note}");
        }
        println!("{}", client.execute(&request).await?);
        Ok(())
    }
}
