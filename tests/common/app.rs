use axum::Router;
use tokio::sync::{broadcast, watch};

use breath_monitor::config::Config;
use breath_monitor::routes::build_router;
use breath_monitor::sampler::MonitorSnapshot;
use breath_monitor::state::AppState;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    pub snapshot_tx: watch::Sender<MonitorSnapshot>,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl TestApp {
    pub fn publish(&self, snapshot: MonitorSnapshot) {
        self.snapshot_tx.send_replace(snapshot);
    }
}

/// Router over a hand-driven snapshot channel; no sampling loop runs.
pub fn spawn_test_app() -> TestApp {
    // 直接构造 Config，避免 set_var 造成多线程测试环境变量竞态
    let config = Config {
        http_enabled: true,
        ..Config::default()
    };
    let (snapshot_tx, snapshot_rx) = watch::channel(MonitorSnapshot::default());
    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    let state = AppState::new(snapshot_rx, &config, shutdown_tx.clone());
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        snapshot_tx,
        shutdown_tx,
    }
}
