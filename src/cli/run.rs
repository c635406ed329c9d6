//! Run command implementation

use crate::config::Config;
use crate::execution::{PaperEngine, RetryPolicy, RetryingExecutor};
use crate::feed::{MarketFeed, ReplayFeed};
use crate::persistence::{JsonStateStore, StateStore};
use crate::strategy::{StrategyFactory, StrategyRunner};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Tick file to replay, overriding `feed.replay_path`
    #[arg(short, long)]
    pub replay: Option<PathBuf>,

    /// Directory for state snapshots, overriding `persistence.state_dir`
    #[arg(long)]
    pub state_dir: Option<PathBuf>,
}

impl RunArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let Some(path) = self.replay.clone().or_else(|| config.feed.replay_path.clone()) else {
            anyhow::bail!("No tick source: pass --replay or set feed.replay_path");
        };
        let state_dir = self
            .state_dir
            .clone()
            .unwrap_or_else(|| config.persistence.state_dir.clone());

        let factory = StrategyFactory::from_config(config)?;
        if factory.is_empty() {
            anyhow::bail!("No enabled strategies configured");
        }

        let exec = &config.execution;
        let engine = Arc::new(PaperEngine::with_balance(
            exec.fee_rate,
            &exec.quote_currency,
            exec.initial_balance,
        ));
        let executor =
            RetryingExecutor::new(engine.clone(), RetryPolicy::from(&exec.retry), exec.order_timeout());
        let store: Arc<dyn StateStore> = Arc::new(JsonStateStore::new(&state_dir));
        let feed = ReplayFeed::new(&path).with_channel_size(config.feed.channel_size);

        tracing::info!(
            strategies = factory.len(),
            replay = ?path,
            state_dir = ?state_dir,
            balance = %exec.initial_balance,
            "Starting paper trading"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::new();
        for id in factory.ids() {
            let runner = StrategyRunner::new(
                factory.create(id)?,
                executor.clone(),
                engine.clone(),
                store.clone(),
            );
            let ticks = feed.subscribe().await?;
            let shutdown = shutdown_rx.clone();
            let id = id.to_string();
            handles.push((id, tokio::spawn(runner.run(ticks, shutdown))));
        }

        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received, stopping runners");
                let _ = shutdown_tx.send(true);
            }
        });

        for (id, handle) in handles {
            match handle.await? {
                Ok(state) => println!(
                    "{id}: phase={} daily_pnl={} trades={} suspended={}",
                    state.phase(),
                    state.daily_pnl,
                    state.daily_trades.len(),
                    state.is_suspended
                ),
                Err(e) => tracing::error!(strategy_id = %id, error = %e, "Runner failed"),
            }
        }

        Ok(())
    }
}
