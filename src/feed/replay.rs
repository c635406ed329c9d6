//! JSON-lines tick replay feed

use super::{InputError, MarketFeed, MarketTick};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Replays ticks recorded one JSON object per line
pub struct ReplayFeed {
    path: PathBuf,
    channel_size: usize,
}

impl ReplayFeed {
    /// Create a replay feed over the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            channel_size: 1024,
        }
    }

    pub fn with_channel_size(mut self, channel_size: usize) -> Self {
        self.channel_size = channel_size.max(1);
        self
    }

    /// Parse a single recorded line
    pub fn parse_line(line: &str) -> Result<MarketTick, InputError> {
        let tick: MarketTick =
            serde_json::from_str(line).map_err(|e| InputError::Malformed(e.to_string()))?;
        tick.validate()?;
        Ok(tick)
    }

    async fn run_reader(path: PathBuf, tick_tx: mpsc::Sender<MarketTick>) -> anyhow::Result<()> {
        let file = tokio::fs::File::open(&path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut line_no = 0usize;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match Self::parse_line(&line) {
                Ok(tick) => {
                    if tick_tx.send(tick).await.is_err() {
                        tracing::debug!("Tick receiver dropped, stopping replay");
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(line = line_no, error = %e, "Skipping malformed tick");
                }
            }
        }

        tracing::info!(lines = line_no, path = ?path, "Replay finished");
        Ok(())
    }
}

#[async_trait]
impl MarketFeed for ReplayFeed {
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<MarketTick>> {
        if !tokio::fs::try_exists(&self.path).await? {
            anyhow::bail!("Replay file not found: {}", self.path.display());
        }

        let (tick_tx, tick_rx) = mpsc::channel(self.channel_size);
        let path = self.path.clone();

        tracing::info!(path = ?path, "Subscribing to replay feed");

        tokio::spawn(async move {
            if let Err(e) = Self::run_reader(path, tick_tx).await {
                tracing::error!(error = %e, "Replay feed failed");
            }
        });

        Ok(tick_rx)
    }
}
