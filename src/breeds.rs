//! Breed validity cache.
//!
//! Agent creation only accepts breeds known to TheCatAPI. The list changes
//! rarely, so it is fetched in the background and kept in memory; request
//! handlers consult the cached snapshot and never wait on the network.

use std::{
    collections::BTreeSet,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use jiff::Timestamp;
use serde::Deserialize;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};

/// Errors from fetching the breed list.
#[derive(Debug, thiserror::Error)]
pub enum BreedError {
    #[error("breed request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// One entry of the upstream breed list. Only the name is kept.
#[derive(Debug, Deserialize)]
struct Breed {
    name: String,
}

/// HTTP client for the upstream breed list.
#[derive(Debug, Clone)]
pub struct BreedClient {
    http: reqwest::Client,
    url: String,
}

impl BreedClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, BreedError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    /// Fetches every breed name from the upstream list.
    pub async fn fetch(&self) -> Result<Vec<String>, BreedError> {
        let breeds: Vec<Breed> = self
            .http
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(breeds.into_iter().map(|b| b.name).collect())
    }
}

/// An immutable view of the known breeds at one point in time.
#[derive(Debug, Default)]
pub struct BreedSnapshot {
    pub names: BTreeSet<String>,

    /// When the names were last replaced by a successful fetch. `None` while
    /// the cache only holds seed names.
    pub refreshed_at: Option<Timestamp>,
}

/// Shared handle to the current breed snapshot. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct BreedCache {
    current: Arc<RwLock<Arc<BreedSnapshot>>>,
}

impl BreedCache {
    /// A cache pre-populated with `seed` names.
    pub fn seeded<I, S>(seed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let snapshot = BreedSnapshot {
            names: seed.into_iter().map(Into::into).collect(),
            refreshed_at: None,
        };
        Self {
            current: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    /// The current snapshot. Holding it doesn't block refreshes.
    pub fn snapshot(&self) -> Arc<BreedSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Whether `name` is a known breed. Exact, case-sensitive match.
    pub fn is_valid_breed(&self, name: &str) -> bool {
        self.snapshot().names.contains(name)
    }

    /// Swaps in a freshly fetched list.
    pub fn replace(&self, names: Vec<String>) {
        let snapshot = Arc::new(BreedSnapshot {
            names: names.into_iter().collect(),
            refreshed_at: Some(Timestamp::now()),
        });
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    /// Fetches once and replaces the snapshot. On failure the previous
    /// snapshot stays in place.
    pub async fn refresh(&self, client: &BreedClient) -> Result<usize, BreedError> {
        let names = client.fetch().await?;
        let count = names.len();
        self.replace(names);
        Ok(count)
    }

    /// Starts a background task that refreshes immediately and then once
    /// per `every`, until [`BreedRefresher::stop`] is called.
    pub fn start(&self, client: BreedClient, every: Duration) -> BreedRefresher {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let cache = self.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::debug!("breed refresher stopping");
                            break;
                        }
                    }
                    _ = ticker.tick() => match cache.refresh(&client).await {
                        Ok(count) => tracing::info!(count, "breed cache refreshed"),
                        Err(e) => tracing::warn!(error = %e, "breed refresh failed, keeping previous list"),
                    },
                }
            }
        });

        BreedRefresher {
            shutdown: shutdown_tx,
            handle,
        }
    }
}

/// Handle to the background refresh task.
pub struct BreedRefresher {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl BreedRefresher {
    /// Signals the task to stop and waits for it to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "breed refresher ended abnormally");
        }
    }
}
