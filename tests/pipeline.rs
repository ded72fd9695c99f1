use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};

use pool_sync::api::health::HealthState;
use pool_sync::api::latency::LatencyStats;
use pool_sync::config::Config;
use pool_sync::connections::{ConnectionSettings, Connections};
use pool_sync::lookup::get_token_pools;
use pool_sync::pool_toml::export_pool_toml;
use pool_sync::scheduler::Scheduler;

type Payload = Arc<Mutex<(StatusCode, Value)>>;

async fn provider(State(payload): State<Payload>) -> (StatusCode, Json<Value>) {
    let (status, body) = payload.lock().unwrap().clone();
    (status, Json(body))
}

async fn spawn_provider(payload: Payload) -> String {
    let app = Router::new().route("/dex/json", get(provider)).with_state(payload);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}/dex/json")
}

fn config(provider_url: String) -> Config {
    Config {
        provider_url,
        database_url: "sqlite::memory:".to_string(),
        cache_url: "memory://".to_string(),
        sync_interval_secs: 120,
        api_port: 0,
        log_level: "info".to_string(),
        log_file: "pool_sync_test.log".to_string(),
        pool_toml_path: "pool.toml".to_string(),
    }
}

fn pool(dex_id: &str, labels: &[&str], usd: f64, pair: &str) -> Value {
    json!({
        "dexId": dex_id,
        "pairAddress": pair,
        "labels": labels,
        "liquidity": { "usd": usd },
        "priceUsd": "0.01",
    })
}

async fn started(payload: &Payload) -> (Arc<Scheduler>, Arc<Connections>, Arc<HealthState>) {
    let cfg = config(spawn_provider(payload.clone()).await);
    let conns = Arc::new(Connections::new(ConnectionSettings::from(&cfg)));
    let health = Arc::new(HealthState::new());
    let sched = Scheduler::new(cfg, conns.clone(), health.clone(), Arc::new(LatencyStats::new())).unwrap();
    sched.start().await.unwrap();
    (Arc::new(sched), conns, health)
}

#[tokio::test]
async fn cycle_persists_qualifying_tokens_and_keeps_created_at() {
    let payload: Payload = Arc::new(Mutex::new((
        StatusCode::OK,
        json!({ "data": {
            "tokenA": [
                pool("pumpswap", &[], 5000.0, "PA"),
                pool("orca", &["wp"], 3000.0, "OA"),
                pool("meteora", &["DLMM"], 500.0, "MA"),
            ],
            "tokenB": [pool("pumpswap", &[], 9000.0, "PB"), pool("pumpswap", &[], 8000.0, "PB2")],
            "tokenC": "not a list",
        }}),
    )));
    let (sched, conns, _) = started(&payload).await;

    let report = sched.run_cycle().await.unwrap();
    assert_eq!(report.ingest.tokens_seen, 3);
    assert_eq!(report.sync.records_written, 1);

    let docs = conns.document_store().unwrap();
    let first = docs.find("tokenA").await.unwrap().unwrap();
    assert_eq!(first.pools.len(), 2);
    assert_eq!(first.created_at, first.updated_at);
    assert!(docs.find("tokenB").await.unwrap().is_none());

    payload.lock().unwrap().1 = json!({ "data": {
        "tokenA": [
            pool("pumpswap", &[], 5000.0, "PA"),
            pool("orca", &["wp"], 3000.0, "OA"),
            pool("raydium", &[], 2500.0, "RA"),
        ],
    }});
    tokio::time::sleep(Duration::from_millis(5)).await;
    sched.run_cycle().await.unwrap();

    let second = docs.find("tokenA").await.unwrap().unwrap();
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at > first.updated_at);
    assert_eq!(second.pools.len(), 3);

    let cached = get_token_pools(&conns, "tokenA").await.unwrap().unwrap();
    assert_eq!(cached.created_at, first.created_at);
    assert_eq!(cached.updated_at, second.updated_at);
    assert_eq!(cached.pools[0].extra["priceUsd"], json!("0.01"));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pool.toml");
    let export = export_pool_toml(conns.cache().unwrap().as_ref(), &path).await.unwrap();
    assert!(export.written);
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("tokenA"));
    assert!(written.contains("RA"));
}

#[tokio::test]
async fn provider_error_fails_the_cycle_without_writing() {
    let payload: Payload = Arc::new(Mutex::new((StatusCode::INTERNAL_SERVER_ERROR, json!({}))));
    let (sched, conns, health) = started(&payload).await;

    assert!(sched.tick().await.is_none());
    assert_eq!(health.snapshot().cycles_failed, 1);
    assert_eq!(conns.document_store().unwrap().count().await.unwrap(), 0);

    *payload.lock().unwrap() = (
        StatusCode::OK,
        json!({ "data": { "tokenA": [pool("pumpswap", &[], 5000.0, "PA"), pool("raydium", &[], 5000.0, "RA")] } }),
    );
    let report = sched.tick().await.unwrap();
    assert_eq!(report.sync.records_written, 1);
    assert_eq!(health.snapshot().cycles_ok, 1);
}
