//! Status and resume commands

use crate::config::Config;
use crate::persistence::{JsonStateStore, StateStore};
use crate::strategy::{Strategy, StrategyFactory};
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only show this strategy
    pub id: Option<String>,

    /// Print the full description as JSON
    #[arg(long)]
    pub json: bool,

    /// Directory for state snapshots, overriding `persistence.state_dir`
    #[arg(long)]
    pub state_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// Strategy to resume
    pub id: String,

    /// Directory for state snapshots, overriding `persistence.state_dir`
    #[arg(long)]
    pub state_dir: Option<PathBuf>,
}

fn store(config: &Config, state_dir: &Option<PathBuf>) -> JsonStateStore {
    JsonStateStore::new(
        state_dir
            .clone()
            .unwrap_or_else(|| config.persistence.state_dir.clone()),
    )
}

/// Build an instance and load its snapshot; `None` when nothing was saved
async fn load(
    factory: &StrategyFactory,
    store: &JsonStateStore,
    id: &str,
) -> anyhow::Result<Option<Box<dyn Strategy>>> {
    let mut strategy = factory.create(id)?;
    let Some(state) = store.load_state(id).await? else {
        return Ok(None);
    };
    strategy.restore_state(state)?;
    Ok(Some(strategy))
}

impl StatusArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let factory = StrategyFactory::from_config(config)?;
        let store = store(config, &self.state_dir);
        let ids: Vec<String> = match &self.id {
            Some(id) => vec![id.clone()],
            None => factory.ids().map(str::to_string).collect(),
        };

        for id in ids {
            let Some(strategy) = load(&factory, &store, &id).await? else {
                println!("{id}: no saved state");
                continue;
            };
            let info = strategy.describe();
            if self.json {
                println!("{}", serde_json::to_string_pretty(&info)?);
                continue;
            }

            println!("{} ({})", info.id, info.market);
            println!("  Phase: {}", info.phase);
            println!(
                "  Position: {} @ {} ({} entries, {} averaging)",
                info.position.total_quantity,
                info.position.average_price,
                info.position.entry_count,
                info.position.averaging_count
            );
            if let Some(price) = info.breakeven_price {
                println!("  Breakeven: {price}");
            }
            println!("  Daily pnl: {}", info.daily_pnl);
            println!("  Consecutive losses: {}", info.consecutive_losses);
            match &info.suspension_reason {
                Some(reason) if info.is_suspended => println!("  Suspended: {reason}"),
                _ => println!("  Suspended: no"),
            }
            println!("  Milestones done: {:?}", info.completed_milestones);
            if let Some(stop) = info.trailing_stop_price {
                println!("  Trailing stop: {stop}");
            }
        }
        Ok(())
    }
}

impl ResumeArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let factory = StrategyFactory::from_config(config)?;
        let store = store(config, &self.state_dir);
        let Some(mut strategy) = load(&factory, &store, &self.id).await? else {
            anyhow::bail!("No saved state for {}", self.id);
        };

        strategy.resume();
        store.save_state(&self.id, &strategy.serialize_state()).await?;
        println!("{}: resumed", self.id);
        Ok(())
    }
}
