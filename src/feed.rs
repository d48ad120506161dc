//! Live feeds over the public question board and shared posts.
//!
//! Writers announce changes on a broadcast channel; every subscriber runs its
//! own task that re-reads the newest window and pushes the full ordered
//! snapshot. A subscription ends when its [`CancellationToken`] is cancelled,
//! which also happens when the [`Subscription`] is dropped.

use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, Stream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewPost, NewQuestion, Post, PostStore, PublicQuestion, QuestionStore};

pub const DEFAULT_FEED_LIMIT: i64 = 50;
pub const MAX_FEED_LIMIT: i64 = 200;

const CHANGE_BUFFER: usize = 64;
const SNAPSHOT_BUFFER: usize = 8;

/// Ordered snapshots from one live subscription.
pub struct Subscription<T> {
    snapshots: mpsc::Receiver<Vec<T>>,
    token: CancellationToken,
}

impl<T: Send + 'static> Subscription<T> {
    /// Next snapshot, or `None` once unsubscribed.
    pub async fn next(&mut self) -> Option<Vec<T>> {
        if self.token.is_cancelled() {
            return None;
        }
        self.snapshots.recv().await
    }

    /// Token that ends this subscription when cancelled.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn unsubscribe(&self) {
        self.token.cancel();
    }

    pub fn into_stream(self) -> impl Stream<Item = Vec<T>> {
        stream::unfold(self, |mut subscription| async move {
            subscription
                .next()
                .await
                .map(|snapshot| (snapshot, subscription))
        })
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Fan-out of "something changed" signals to live subscribers.
#[derive(Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<()>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANGE_BUFFER);
        ChangeNotifier { tx }
    }

    pub fn notify(&self) {
        // No receivers simply means nobody is watching.
        let _ = self.tx.send(());
    }

    /// Spawns a task that pushes `load()` once immediately and again after
    /// every change, until the subscription is cancelled or dropped.
    pub fn subscribe<T, F, Fut>(&self, load: F) -> Subscription<T>
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<T>, AppError>> + Send + 'static,
    {
        // Subscribe before the first load so no change can slip in between.
        let mut changes = self.tx.subscribe();
        let (snapshot_tx, snapshots) = mpsc::channel(SNAPSHOT_BUFFER);
        let token = CancellationToken::new();
        let task_token = token.clone();

        tokio::spawn(async move {
            loop {
                match load().await {
                    Ok(snapshot) => {
                        tokio::select! {
                            _ = task_token.cancelled() => break,
                            sent = snapshot_tx.send(snapshot) => {
                                if sent.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to load feed snapshot"),
                }

                tokio::select! {
                    _ = task_token.cancelled() => break,
                    changed = changes.recv() => match changed {
                        Ok(()) | Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!("Feed subscription closed");
        });

        Subscription { snapshots, token }
    }
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_FEED_LIMIT).clamp(1, MAX_FEED_LIMIT)
}

/// Public question board: pending/answered lifecycle plus live snapshots.
#[derive(Clone)]
pub struct QuestionFeed {
    store: Arc<dyn QuestionStore>,
    changes: ChangeNotifier,
}

impl QuestionFeed {
    pub fn new(store: Arc<dyn QuestionStore>) -> Self {
        QuestionFeed {
            store,
            changes: ChangeNotifier::new(),
        }
    }

    pub async fn create(&self, question: NewQuestion) -> Result<Uuid, AppError> {
        let id = self.store.create(question).await?;
        self.changes.notify();
        Ok(id)
    }

    pub async fn record_answer(&self, id: Uuid, answer: &str) -> Result<bool, AppError> {
        let transitioned = self.store.record_answer(id, answer).await?;
        if transitioned {
            self.changes.notify();
        }
        Ok(transitioned)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<PublicQuestion>, AppError> {
        self.store.get(id).await
    }

    pub fn subscribe(&self, limit: Option<i64>) -> Subscription<PublicQuestion> {
        let limit = clamp_limit(limit);
        let store = self.store.clone();
        self.changes.subscribe(move || {
            let store = store.clone();
            async move { store.latest(limit).await }
        })
    }
}

/// Shared posts feed.
#[derive(Clone)]
pub struct PostFeed {
    store: Arc<dyn PostStore>,
    changes: ChangeNotifier,
}

impl PostFeed {
    pub fn new(store: Arc<dyn PostStore>) -> Self {
        PostFeed {
            store,
            changes: ChangeNotifier::new(),
        }
    }

    pub async fn create(&self, post: NewPost) -> Result<Uuid, AppError> {
        let id = self.store.create(post).await?;
        self.changes.notify();
        Ok(id)
    }

    pub fn subscribe(&self, limit: Option<i64>) -> Subscription<Post> {
        let limit = clamp_limit(limit);
        let store = self.store.clone();
        self.changes.subscribe(move || {
            let store = store.clone();
            async move { store.latest(limit).await }
        })
    }
}
