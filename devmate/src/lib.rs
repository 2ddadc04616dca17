use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod app;
pub mod cli;
pub mod client;
pub mod config;
pub mod server;

pub use app::App;
pub use cli::Cli;

/// Log to stdout, for the long-running server.
pub fn initialize_stdout_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(false)
                .with_writer(std::io::stdout),
        )
        .with(env_filter("devmate=debug,devmate_lease=debug,tower_http=debug"))
        .init();
}

/// Log to stderr, keeping stdout for command output.
pub fn initialize_stderr_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .with(env_filter("devmate=warn,devmate_lease=warn"))
        .init();
}

fn env_filter(default: &str) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::builder().from_env_lossy()
    } else {
        EnvFilter::new(default)
    }
}
