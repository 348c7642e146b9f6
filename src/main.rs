use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use status_mpris::config::{Config, SourceKind};
use status_mpris::debounce::{Debouncer, StopReason};
use status_mpris::logging::init_logging;
use status_mpris::mpris::{self, MetadataSource};
use status_mpris::publisher::{HttpPublisher, Publisher, StdoutPublisher};

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for interrupt: {}", err);
        std::future::pending::<()>().await;
    }
}

async fn run<P: Publisher>(config: &Config, publisher: P, source: MetadataSource) -> StopReason {
    Debouncer::new(publisher, config.age, config.emoji.clone())
        .run(source, interrupted())
        .await
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_logging();

    let http = if config.dry_run {
        None
    } else {
        let token = config.token.as_deref().context("no token configured")?;
        let publisher = HttpPublisher::new(&config.api_base, token, config.timeout)
            .context("failed to build HTTP client")?;
        Some(publisher)
    };

    let source = match config.source {
        SourceKind::Playerctl => mpris::spawn_playerctl(&config.format, &config.blocked),
        SourceKind::Dbus => mpris::spawn_dbus(&config.format, &config.blocked).await,
    }
    .context("mpris error")?;

    let reason = match http {
        Some(publisher) => {
            info!(url = %publisher.url(), "Publishing custom status");
            run(&config, publisher, source).await
        }
        None => {
            info!("Dry run, printing status payloads to stdout");
            run(&config, StdoutPublisher::new(), source).await
        }
    };

    match reason {
        StopReason::Interrupted => Ok(()),
        StopReason::SourceClosed => bail!("metadata source exited"),
    }
}
