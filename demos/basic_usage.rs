// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic courtside-sync usage example.
//!
//! Demonstrates:
//! 1. Wiring the replica, remote and coordinator together
//! 2. Scoring points while offline (writes land locally)
//! 3. Reconciling when connectivity returns
//! 4. A concurrent edit resolved by last-writer-wins
//! 5. Sync metrics and the raw metrics facade (OTEL-compatible)
//! 6. The background cadence loop and clean shutdown
//!
//! Runs entirely in memory; no backend required.
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;
use std::time::Duration;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::json;
use tokio::sync::watch;

use courtside_sync::{
    DataAccessManager, Entity, InMemoryRemote, LoadOptions, Query, SchemaRegistry, SqliteReplica,
    SyncConfig, SyncCoordinator,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder (captures all metrics for OTEL export)
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    // Simple logging (no filter for simplicity)
    tracing_subscriber::fmt().with_target(false).compact().init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           courtside-sync: Basic Usage Example                 ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Wire the engine together
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Wiring replica, remote and coordinator...");

    let config = SyncConfig {
        // Fast cadence so the background loop is visible in the demo
        sync_interval_ms: 200,
        ..Default::default()
    };

    let schemas = Arc::new(SchemaRegistry::builtin());
    let replica = Arc::new(SqliteReplica::in_memory(schemas)?);
    let remote = Arc::new(InMemoryRemote::new());
    let coordinator = Arc::new(SyncCoordinator::new(
        config.clone(),
        replica.clone(),
        remote.clone(),
    ));
    let data = DataAccessManager::new(
        config,
        replica.clone(),
        remote.clone(),
        coordinator.health().clone(),
    );

    println!("   ✅ Engine ready (in-memory replica, in-memory remote)");

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Score points while offline
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🏐 Gym wifi drops. Scoring three points offline...");
    remote.set_online(false);

    let points = vec![
        ("p1", json!({"id": "p1", "match_id": "m1", "home_score": 1, "skill": "attack"})),
        ("p2", json!({"id": "p2", "match_id": "m1", "home_score": 2, "skill": "block"})),
        ("p3", json!({"id": "p3", "match_id": "m1", "home_score": 3, "skill": "serve"})),
    ];
    for (id, payload) in &points {
        let start = std::time::Instant::now();
        data.create("score_points", payload.clone())?;
        println!("   └─ Scored: {} ({:?}, no network involved)", id, start.elapsed());
    }

    let loaded = data
        .load_data("score_points", &Query::eq("match_id", "m1"), &LoadOptions::default())
        .await?;
    println!(
        "   📖 Read back {} points, served from {:?}",
        loaded.data.len(),
        loaded.source
    );
    println!(
        "   ⏳ Pending push: {} entities",
        replica.pending_count("score_points")?
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Reconcile when connectivity returns
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📡 Wifi is back. Running one reconciliation cycle...");
    remote.set_online(true);

    let mut events = coordinator.on_collection_event("score_points");
    let outcome = coordinator.reconcile("score_points").await?;

    println!(
        "   └─ pulled={} pushed={} conflicts={} checkpoint={}",
        outcome.pulled, outcome.pushed, outcome.conflicts, outcome.checkpoint
    );
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(100), events.recv()).await
    {
        println!(
            "   └─ event: {} → {} ({} pending)",
            event.collection, event.status, event.pending
        );
    }
    println!("   ☁️  Remote now holds {} points", remote.len("score_points"));

    let reloaded = data
        .load_data("score_points", &Query::eq("match_id", "m1"), &LoadOptions::default())
        .await?;
    println!("   📖 Reads come from {:?} again", reloaded.source);

    // ─────────────────────────────────────────────────────────────────────────
    // 4. A concurrent edit, resolved by last-writer-wins
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n⚔️  Both sides edit p1. The later write must win...");

    data.update("score_points", "p1", &json!({"home_score": 6}))?;
    remote.seed(
        "score_points",
        Entity {
            id: "p1".into(),
            content: json!({"id": "p1", "match_id": "m1", "home_score": 7, "skill": "attack"}),
            updated_at: courtside_sync::now_millis() + 60_000,
            dirty: false,
        },
    );

    let outcome = coordinator.reconcile("score_points").await?;
    let kept = replica
        .get("score_points", "p1")?
        .and_then(|e| e.field("home_score").cloned());
    println!(
        "   └─ conflicts={}, local copy now home_score={}",
        outcome.conflicts,
        kept.unwrap_or(json!(null))
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Sync metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Sync metrics for score_points:");
    let sync_metrics = coordinator.sync_metrics();
    println!("   └─ attempts: {}", sync_metrics.attempts("score_points"));
    println!(
        "   └─ success rate: {:.0}%",
        sync_metrics.success_rate("score_points") * 100.0
    );
    println!(
        "   └─ average duration: {:?}",
        sync_metrics.average_duration("score_points")
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Background cadence loop
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔁 Running the background loop for half a second...");
    data.create(
        "score_points",
        json!({"id": "p4", "match_id": "m1", "home_score": 8, "skill": "other"}),
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let background = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.run(shutdown_rx).await })
    };
    tokio::time::sleep(Duration::from_millis(500)).await;
    shutdown_tx.send(true)?;
    background.await?;

    println!(
        "   └─ p4 pushed by the loop: {}",
        remote.entity("score_points", "p4").is_some()
    );
    println!(
        "   └─ pending after shutdown: {}",
        replica.pending_count("score_points")?
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 7. Raw metrics dump (OTEL-compatible)
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Raw Metrics (OTEL export format):");
    dump_metrics(&snapshotter);

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Dump all captured metrics in OTEL-compatible format
fn dump_metrics(snapshotter: &Snapshotter) {
    let snapshot = snapshotter.snapshot();

    let mut counters: Vec<_> = vec![];
    let mut gauges: Vec<_> = vec![];
    let mut histograms: Vec<_> = vec![];

    for (composite_key, _, _, value) in snapshot.into_vec() {
        let (_kind, key) = composite_key.into_parts();
        let name = key.name();
        let labels: Vec<_> = key
            .labels()
            .map(|l| format!("{}={}", l.key(), l.value()))
            .collect();
        let label_str = if labels.is_empty() {
            String::new()
        } else {
            format!("{{{}}}", labels.join(","))
        };

        match value {
            DebugValue::Counter(v) => counters.push((name.to_string(), label_str, v)),
            DebugValue::Gauge(v) => gauges.push((name.to_string(), label_str, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                let avg = if count > 0 { sum / count as f64 } else { 0.0 };
                histograms.push((name.to_string(), label_str, count, avg));
            }
        }
    }

    counters.sort_by(|a, b| a.0.cmp(&b.0));
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    if !counters.is_empty() {
        println!("   ┌─ Counters (cumulative)");
        for (name, labels, value) in &counters {
            println!("   │  └─ {}{} = {}", name, labels, value);
        }
    }
    if !gauges.is_empty() {
        println!("   ├─ Gauges (current value)");
        for (name, labels, value) in &gauges {
            println!("   │  └─ {}{} = {:.2}", name, labels, value);
        }
    }
    if !histograms.is_empty() {
        println!("   └─ Histograms (distributions)");
        for (name, labels, count, avg) in &histograms {
            println!("   │  └─ {}{} count={} avg={:.4}s", name, labels, count, avg);
        }
    }
    if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
}
