//! The `run` command: preview gateway, reference boards and JSON-lines
//! ingestion from stdin.

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::{Context, Result},
    herald_channels::{RemoteGateway, memory::InMemoryGateway},
    herald_config::{ConfigHandle, HeraldConfig, discover_and_load, load_config},
    herald_display::DisplayModule,
    herald_events::{Event, EventPayload},
    herald_metrics::{MetricsHandle, MetricsRecorderConfig, init_metrics},
    herald_modules::Host,
    tokio::io::{AsyncBufReadExt, BufReader},
    tracing::{debug, info, warn},
};

use crate::{
    boards::{PlayersBoard, StatusBoard, TradesBoard},
    world::{SharedWorld, WorldState},
};

pub struct RunOptions {
    pub config: Option<PathBuf>,
    pub dump_metrics: bool,
}

enum Input {
    Line(String),
    Eof,
    Interrupt,
    Reload,
}

pub async fn run(opts: RunOptions) -> Result<()> {
    let (config, path) = load(opts.config.as_deref())?;
    let metrics = init_metrics(MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        global_labels: config.metrics.labels.clone().into_iter().collect(),
    })?;

    let gateway = Arc::new(InMemoryGateway::new().verbose(true));
    let world = WorldState::shared();
    let mut host = Host::new(ConfigHandle::new(config));
    register_boards(&mut host, &world, gateway.clone());
    host.start().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut hangup = Hangup::install()?;
    info!("reading events from stdin");

    loop {
        let input = tokio::select! {
            line = lines.next_line() => match line.context("reading stdin")? {
                Some(line) => Input::Line(line),
                None => Input::Eof,
            },
            _ = tokio::signal::ctrl_c() => Input::Interrupt,
            () = hangup.recv() => Input::Reload,
        };

        match input {
            Input::Line(line) => ingest_line(&host, &world, &line).await,
            Input::Reload => reload(&host, path.as_deref()).await,
            Input::Eof => {
                info!("end of input");
                break;
            },
            Input::Interrupt => {
                info!("received Ctrl+C, shutting down");
                break;
            },
        }
    }

    host.shutdown().await;
    host.destroy();
    summarize(&gateway, &host);
    if opts.dump_metrics {
        print_metrics(&metrics);
    }
    Ok(())
}

fn register_boards(host: &mut Host, world: &SharedWorld, gateway: Arc<InMemoryGateway>) {
    let gateway: Arc<dyn RemoteGateway> = gateway;
    host.register(DisplayModule::boxed(
        Arc::new(StatusBoard::new(world.clone())),
        gateway.clone(),
    ));
    host.register(DisplayModule::boxed(
        Arc::new(PlayersBoard::new(world.clone())),
        gateway.clone(),
    ));
    host.register(DisplayModule::boxed(
        Arc::new(TradesBoard::new(world.clone())),
        gateway,
    ));
}

/// Load an explicit config file, or discover one.
fn load(path: Option<&std::path::Path>) -> Result<(HeraldConfig, Option<PathBuf>)> {
    match path {
        Some(path) => {
            let config = load_config(path)
                .with_context(|| format!("loading config from {}", path.display()))?;
            Ok((config, Some(path.to_path_buf())))
        },
        None => Ok(discover_and_load()),
    }
}

/// Parse one line and feed it to the host. Blank lines are skipped; bad
/// lines are logged and dropped.
pub(crate) async fn ingest_line(host: &Host, world: &SharedWorld, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    let payload: EventPayload = match serde_json::from_str(line) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "skipping malformed event line");
            return;
        },
    };
    world
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .apply(&payload);
    match host.ingest(Event::new(payload)).await {
        Ok(reached) => debug!(reached, "event ingested"),
        Err(e) => warn!(error = %e, "event dropped"),
    }
}

async fn reload(host: &Host, path: Option<&std::path::Path>) {
    let result = match path {
        Some(path) => load_config(path).map_err(anyhow::Error::from),
        None => Ok(discover_and_load().0),
    };
    match result {
        Ok(config) => match host.reload_config(config).await {
            Ok(true) => info!("configuration reloaded on SIGHUP"),
            Ok(false) => info!("configuration unchanged"),
            Err(e) => warn!(error = %e, "could not announce configuration change"),
        },
        Err(e) => warn!(error = %e, "keeping previous configuration"),
    }
}

fn summarize(gateway: &InMemoryGateway, host: &Host) {
    for runner in host.runners() {
        let stats = runner.stats().snapshot();
        info!(
            module = runner.name(),
            passes = stats.passes,
            errors = stats.errors,
            panics = stats.panics,
            coalesced = stats.coalesced,
            "module summary"
        );
    }
    info!(
        mutations = gateway.mutation_count(),
        calls = gateway.calls().len(),
        "preview gateway summary"
    );
}

fn print_metrics(metrics: &MetricsHandle) {
    let text = metrics.render();
    if text.is_empty() {
        warn!("no metrics recorded (enable [metrics] and build with the prometheus feature)");
    } else {
        println!("{text}");
    }
}

/// SIGHUP on unix; never fires elsewhere.
struct Hangup {
    #[cfg(unix)]
    signal: tokio::signal::unix::Signal,
}

impl Hangup {
    fn install() -> Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            let signal = signal(SignalKind::hangup()).context("installing SIGHUP handler")?;
            Ok(Self { signal })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        {
            if self.signal.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        }
        #[cfg(not(unix))]
        {
            std::future::pending::<()>().await;
        }
    }
}
