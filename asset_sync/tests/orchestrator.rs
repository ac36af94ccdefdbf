mod common;
use common::{Script, ScriptedProvider, bar, bars, daily_plan, day, orchestrator, temp_store};

use std::{sync::Arc, time::Duration};

use asset_sync::{
    errors::SyncError,
    freshness::needs_refresh,
    identity::SeriesId,
    orchestrator::{Orchestrator, Outcome, RunOptions},
    table::MasterTable,
};
use chrono::Duration as ChronoDuration;
use market_data_ingestor::{models::timeframe::TimeFrame, providers::throttle::Throttle};

fn aapl() -> SeriesId {
    SeriesId::new("AAPL", TimeFrame::day())
}

#[tokio::test]
async fn cold_start_writes_sorted_master_and_delta() {
    let (_dir, store) = temp_store();
    let provider = ScriptedProvider::new();
    let mut served = bars(1..=10, 0.0);
    served.reverse();
    provider.serve("AAPL", &served);

    let outcome = orchestrator(provider.clone(), &store)
        .sync_series(&daily_plan("AAPL"), day(11))
        .await;
    assert!(matches!(outcome, Outcome::Created { rows: 10 }), "{outcome}");

    let master = store.read(&aapl()).unwrap().expect("master written");
    assert_eq!(master.bars(), bars(1..=10, 0.0).as_slice());

    let delta = std::fs::read_to_string(store.delta_path(&aapl())).unwrap();
    assert_eq!(delta.lines().count(), 11);
}

#[tokio::test]
async fn refetching_known_rows_leaves_file_untouched() {
    let (_dir, store) = temp_store();
    store
        .write(&aapl(), &MasterTable::from_bars(bars(1..=10, 0.0)))
        .unwrap();
    let before = std::fs::read(store.master_path(&aapl())).unwrap();

    let provider = ScriptedProvider::new();
    provider.serve("AAPL", &bars(1..=10, 0.0));
    let outcome = orchestrator(provider.clone(), &store)
        .sync_series(&daily_plan("AAPL"), day(20))
        .await;

    assert!(matches!(outcome, Outcome::NoNewRows), "{outcome}");
    assert_eq!(provider.calls(), 1);
    assert_eq!(std::fs::read(store.master_path(&aapl())).unwrap(), before);
    assert!(!store.delta_path(&aapl()).exists());
}

#[tokio::test]
async fn overlapping_fetch_appends_and_keeps_master_values() {
    let (_dir, store) = temp_store();
    store
        .write(&aapl(), &MasterTable::from_bars(bars(1..=8, 0.0)))
        .unwrap();

    let provider = ScriptedProvider::new();
    provider.serve("AAPL", &bars(5..=12, 0.25));
    let outcome = orchestrator(provider, &store)
        .sync_series(&daily_plan("AAPL"), day(20))
        .await;
    assert!(
        matches!(outcome, Outcome::Appended { added: 4, total: 12 }),
        "{outcome}"
    );

    let master = store.read(&aapl()).unwrap().unwrap();
    assert_eq!(master.len(), 12);
    for d in 1..=8 {
        assert_eq!(master.get(day(d)), Some(&bar(d, 0.0)), "day {d}");
    }
    for d in 9..=12 {
        assert_eq!(master.get(day(d)), Some(&bar(d, 0.25)), "day {d}");
    }

    let delta = std::fs::read_to_string(store.delta_path(&aapl())).unwrap();
    assert_eq!(delta.lines().count(), 5);
}

#[tokio::test]
async fn one_failing_identity_does_not_affect_others() {
    let (_dir, store) = temp_store();
    let provider = ScriptedProvider::new();
    provider.serve("AAPL", &bars(1..=5, 0.0));
    provider.set("MSFT", Script::Fail);
    provider.serve("NVDA", &bars(1..=3, 0.0));

    let plans = vec![daily_plan("AAPL"), daily_plan("MSFT"), daily_plan("NVDA")];
    let summary = orchestrator(provider, &store).run(plans, day(10)).await;

    let order: Vec<String> = summary.reports.iter().map(|r| r.id.symbol.clone()).collect();
    assert_eq!(order, ["AAPL", "MSFT", "NVDA"]);
    assert_eq!(summary.created(), 2);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.rows_added(), 8);

    let msft = SeriesId::new("MSFT", TimeFrame::day());
    match summary.get(&msft) {
        Some(Outcome::Failed(e @ SyncError::Provider(_))) => assert!(e.is_transient()),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(store.read(&msft).unwrap().is_none());
    assert_eq!(store.list().unwrap().len(), 2);
}

#[tokio::test]
async fn unreadable_master_fails_only_its_identity() {
    let (_dir, store) = temp_store();
    store
        .write(&aapl(), &MasterTable::from_bars(bars(1..=3, 0.0)))
        .unwrap();
    let msft = SeriesId::new("MSFT", TimeFrame::day());
    let corrupt = "timestamp,open,high,low,close,volume\nyesterday,1,1,1,1,1\n";
    std::fs::write(store.master_path(&msft), corrupt).unwrap();

    let provider = ScriptedProvider::new();
    provider.serve("AAPL", &bars(1..=6, 0.0));
    provider.serve("MSFT", &bars(1..=6, 0.0));
    let summary = orchestrator(provider.clone(), &store)
        .run(vec![daily_plan("AAPL"), daily_plan("MSFT")], day(20))
        .await;

    match summary.get(&msft) {
        Some(Outcome::Failed(e @ SyncError::Storage(_))) => assert!(!e.is_transient()),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(matches!(
        summary.get(&aapl()),
        Some(Outcome::Appended { added: 3, total: 6 })
    ));
    // Only AAPL reached the provider; the broken file is left as it was.
    assert_eq!(provider.calls(), 1);
    assert_eq!(
        std::fs::read_to_string(store.master_path(&msft)).unwrap(),
        corrupt
    );
    assert!(!store.delta_path(&msft).exists());
}

#[tokio::test]
async fn throttle_wait_does_not_count_against_fetch_timeout() {
    let (_dir, store) = temp_store();
    let provider = ScriptedProvider::new();
    let symbols = ["A", "B", "C", "D"];
    for s in symbols {
        provider.serve(s, &bars(1..=2, 0.0));
    }

    // The last permit arrives after 600ms, well past the 300ms timeout.
    let orch = Orchestrator::new(
        provider.clone(),
        store,
        RunOptions {
            max_concurrency: 4,
            fetch_timeout: Duration::from_millis(300),
            write_deltas: false,
        },
    )
    .with_throttle(Throttle::new(Duration::from_millis(200)).unwrap());
    let plans = symbols.iter().map(|s| daily_plan(s)).collect();
    let summary = orch.run(plans, day(10)).await;

    assert_eq!(summary.failed(), 0, "{summary}");
    assert_eq!(summary.created(), 4);
    assert_eq!(provider.calls(), 4);
}

#[tokio::test]
async fn slow_fetch_times_out() {
    let (_dir, store) = temp_store();
    let provider = ScriptedProvider::new();
    provider.set(
        "AAPL",
        Script::Delay(
            Duration::from_secs(5),
            Box::new(Script::Table(common::raw_daily(&bars(1..=3, 0.0)))),
        ),
    );
    provider.serve("MSFT", &bars(1..=3, 0.0));

    let orch = Orchestrator::new(
        provider,
        store.clone(),
        RunOptions {
            fetch_timeout: Duration::from_millis(50),
            ..RunOptions::default()
        },
    );
    let summary = orch
        .run(vec![daily_plan("AAPL"), daily_plan("MSFT")], day(10))
        .await;

    assert!(matches!(
        summary.get(&aapl()),
        Some(Outcome::Failed(SyncError::Timeout(_)))
    ));
    assert!(matches!(
        summary.get(&SeriesId::new("MSFT", TimeFrame::day())),
        Some(Outcome::Created { rows: 3 })
    ));
    assert!(!store.master_path(&aapl()).exists());
}

#[tokio::test]
async fn cycles_for_the_same_identity_are_serialized() {
    let (_dir, store) = temp_store();
    let provider = ScriptedProvider::new();
    provider.set(
        "AAPL",
        Script::Delay(
            Duration::from_millis(100),
            Box::new(Script::Table(common::raw_daily(&bars(1..=10, 0.0)))),
        ),
    );

    let orch = orchestrator(provider.clone(), &store);
    let plan = daily_plan("AAPL");
    let now = day(10) + ChronoDuration::hours(1);
    let (a, b) = tokio::join!(orch.sync_series(&plan, now), orch.sync_series(&plan, now));

    assert_eq!(provider.peak_in_flight(), 1);
    assert_eq!(provider.calls(), 1, "second cycle sees the fresh table");
    assert!(matches!(a, Outcome::Created { rows: 10 }), "{a}");
    assert!(matches!(b, Outcome::Fresh), "{b}");
}

#[tokio::test]
async fn successful_cycle_leaves_identity_fresh() {
    let (_dir, store) = temp_store();
    let provider = ScriptedProvider::new();
    provider.serve("AAPL", &bars(1..=10, 0.0));
    let orch = orchestrator(provider.clone(), &store);
    let plan = daily_plan("AAPL");
    let now = day(12);

    orch.sync_series(&plan, now).await;
    let master = store.read(&aapl()).unwrap();
    assert!(!needs_refresh(master.as_ref(), now, plan.staleness));

    let again = orch.sync_series(&plan, now).await;
    assert!(matches!(again, Outcome::Fresh), "{again}");
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn empty_provider_result_is_no_data() {
    let (_dir, store) = temp_store();
    let provider = ScriptedProvider::new();
    let summary = orchestrator(provider, &store)
        .run(vec![daily_plan("AAPL")], day(10))
        .await;
    assert_eq!(summary.no_data(), 1);
    assert_eq!(summary.failed(), 0);
    assert!(store.list().unwrap().is_empty());
}

#[tokio::test]
async fn concurrency_is_bounded() {
    let (_dir, store) = temp_store();
    let provider = ScriptedProvider::new();
    let symbols = ["A", "B", "C", "D", "E", "F"];
    for s in symbols {
        provider.set(
            s,
            Script::Delay(
                Duration::from_millis(30),
                Box::new(Script::Table(common::raw_daily(&bars(1..=2, 0.0)))),
            ),
        );
    }

    let orch = Orchestrator::new(
        provider.clone(),
        store,
        RunOptions {
            max_concurrency: 2,
            ..RunOptions::default()
        },
    );
    let plans = symbols.iter().map(|s| daily_plan(s)).collect();
    let summary = orch.run(plans, day(10)).await;

    assert_eq!(summary.created(), 6);
    assert!(provider.peak_in_flight() <= 2, "peak {}", provider.peak_in_flight());
    assert_eq!(provider.calls(), 6);
}

#[tokio::test]
async fn shared_locks_span_orchestrators() {
    let (_dir, store) = temp_store();
    let provider = ScriptedProvider::new();
    provider.set(
        "AAPL",
        Script::Delay(
            Duration::from_millis(50),
            Box::new(Script::Table(common::raw_daily(&bars(1..=4, 0.0)))),
        ),
    );

    let first = orchestrator(provider.clone(), &store);
    let locks = Arc::new(asset_sync::locks::IdentityLocks::new());
    let first = first.with_locks(Arc::clone(&locks));
    let second = orchestrator(provider.clone(), &store).with_locks(locks);

    let plan = daily_plan("AAPL");
    let now = day(5);
    let (a, b) = tokio::join!(first.sync_series(&plan, now), second.sync_series(&plan, now));
    assert_eq!(provider.peak_in_flight(), 1);
    assert_eq!(a.rows_added() + b.rows_added(), 4);
}
