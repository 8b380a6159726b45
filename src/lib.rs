mod db;
mod engine;
mod error;
mod link;
mod live;
mod settings;
mod store;
mod telemetry;
mod utils;

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;

pub use db::{CounterName, DailyCounter, SampleQuery, StoredSample};
pub use engine::{CounterTotals, Engine, EngineStatus, PostureSummary};
pub use error::{EngineError, EngineResult};
pub use link::{
    DefaultLinkProvider, LinkKind, LinkProvider, LinkState, PeerLink, Subscription,
    SyntheticLink, SyntheticProvider,
};
pub use live::{Listener, ListenerId};
pub use settings::{EngineSettings, LinkTiming, DEFAULT_DEVICE_NAME};
pub use telemetry::{decode, encode, Axes, Sample, SampleSeries, FRAME_LEN};
pub use utils::logging::init_logging;

fn format_sample(sample: &Sample) -> String {
    format!(
        "{:6.2}s  ax={:3} ay={:3} az={:3} | gx={:3} gy={:3} gz={:3}",
        sample.t, sample.ax, sample.ay, sample.az, sample.gx, sample.gy, sample.gz
    )
}

/// Entry point of the `postura` binary: stream live samples to stdout until
/// Ctrl-C, then print the posture summary. The optional first argument is a
/// JSON settings file.
pub fn run() -> Result<()> {
    init_logging();
    info!("Postura starting up...");

    let settings_path = std::env::args_os().nth(1).map(PathBuf::from);
    let settings = EngineSettings::load(settings_path.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async move {
        let engine = Engine::init_global(settings)?;
        let device_name = engine.settings().device_name.clone();
        let mut listener = engine.register_listener();
        engine.start(&device_name)?;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                sample = listener.recv() => match sample {
                    Some(sample) => println!("{}", format_sample(&sample)),
                    None => break,
                },
            }
        }

        engine.unregister_listener(listener.id());
        engine.stop();
        engine.wait_stopped().await;

        match engine.summary().await {
            Ok(summary) => println!("\n{summary}"),
            Err(EngineError::PersistenceDisabled) => {
                let status = engine.status().await;
                println!("\n{} samples received (persistence disabled)", status.sample_count);
            }
            Err(err) => return Err(err.into()),
        }
        Ok(())
    })
}
