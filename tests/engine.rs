use std::time::Duration;

use postura_lib::{
    CounterName, Engine, EngineError, EngineSettings, LinkState, LinkTiming, SampleQuery,
};
use tempfile::TempDir;

fn settings(dir: &TempDir, persist_data: bool) -> EngineSettings {
    EngineSettings {
        persist_data,
        db_path: dir.path().join("postura.sqlite3"),
        link: LinkTiming {
            scan_retry_ms: 20,
            reconnect_delay_ms: 10,
            synthetic_interval_ms: 20,
        },
        ..EngineSettings::default()
    }
}

async fn wait_for_latest(engine: &Engine) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while engine.get_latest().await.is_err() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no sample arrived");
}

#[tokio::test]
async fn durable_mode_falls_back_to_simulation() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::new(settings(&dir, true)).unwrap();
    assert!(matches!(
        engine.get_latest().await,
        Err(EngineError::NotFound(_))
    ));

    assert!(engine.start("XIAOMG25_BLE").unwrap());
    wait_for_latest(&engine).await;

    let status = engine.status().await;
    assert!(status.running);
    assert!(status.persistence);
    assert!(status.simulated);
    assert!(status.sample_count >= 1);

    engine.stop();
    engine.wait_stopped().await;
    assert_eq!(engine.status().await.link_state, LinkState::Stopped);

    let stored = engine.query_samples(SampleQuery::all()).await.unwrap();
    assert!(!stored.is_empty());
    assert!(stored.windows(2).all(|w| w[0].id < w[1].id));
    assert!(stored.windows(2).all(|w| w[0].sample.t <= w[1].sample.t));
    assert_eq!(engine.get_data().await.len(), stored.len());
}

#[tokio::test]
async fn live_listeners_receive_the_stream() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::new(settings(&dir, false)).unwrap();
    let mut first = engine.register_listener();
    let mut second = engine.register_listener_with_capacity(1);

    engine.start("XIAOMG25_BLE").unwrap();
    let a = tokio::time::timeout(Duration::from_secs(5), first.recv())
        .await
        .unwrap()
        .unwrap();
    let b = tokio::time::timeout(Duration::from_secs(5), first.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(a.t <= b.t);

    // A full single-slot listener loses samples without holding up the other one.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut delivered_to_first = 0;
    while first.try_recv().is_some() {
        delivered_to_first += 1;
    }
    assert!(delivered_to_first >= 2);
    assert!(second.try_recv().is_some());

    assert!(engine.unregister_listener(second.id()));
    assert!(!engine.unregister_listener(second.id()));

    engine.stop();
    engine.wait_stopped().await;
}

#[tokio::test]
async fn memory_mode_reports_persistence_disabled() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::new(settings(&dir, false)).unwrap();
    engine.start("XIAOMG25_BLE").unwrap();
    wait_for_latest(&engine).await;
    engine.stop();
    engine.wait_stopped().await;

    assert!(!engine.persistence_enabled());
    assert!(!engine.get_data().await.is_empty());
    assert!(matches!(
        engine.get_counter(CounterName::SlouchTime).await,
        Err(EngineError::PersistenceDisabled)
    ));
    assert!(matches!(
        engine.prune_samples(0).await,
        Err(EngineError::PersistenceDisabled)
    ));
    assert!(!dir.path().join("postura.sqlite3").exists());
}

#[tokio::test]
async fn prune_zero_days_removes_every_sample() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::new(settings(&dir, true)).unwrap();
    engine.start("XIAOMG25_BLE").unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while engine.status().await.sample_count < 5 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    engine.stop();
    engine.wait_stopped().await;

    let before = engine.status().await.sample_count;
    assert_eq!(engine.prune_samples(0).await.unwrap(), before);
    assert_eq!(engine.status().await.sample_count, 0);
    assert!(engine
        .query_samples(SampleQuery::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn counters_survive_a_restart_of_the_loop() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::new(settings(&dir, true)).unwrap();

    for _ in 0..2 {
        assert!(engine.start("XIAOMG25_BLE").unwrap());
        wait_for_latest(&engine).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(engine.stop());
        engine.wait_stopped().await;
    }

    let samples = engine.status().await.sample_count;
    let summary = engine.summary().await.unwrap();
    assert_eq!(summary.today.ticks(), samples);
    assert!(summary.to_string().contains("All time:"));
}
