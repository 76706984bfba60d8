//! Background writer that applies persistence writes off the caller's path.
//!
//! Writes are queued on an unbounded channel and applied by a single task, so they land on the
//! medium in send order. Writes to the same store name inside one debounce window coalesce and
//! only the latest value is written. Values queued through [`PersistWriter::write_with`] are
//! encoded by the writer, once per applied write, on the blocking pool.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::{BlobStore, Result, StorageError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PersistConfig {
    /// How long queued writes wait for more changes before they are applied.
    #[serde(rename = "save_delay_ms", with = "duration_ms")]
    pub save_delay: Duration,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Backoff before retry `n` is `retry_backoff * n`.
    #[serde(rename = "retry_backoff_ms", with = "duration_ms")]
    pub retry_backoff: Duration,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            save_delay: Duration::from_millis(250),
            max_retries: 3,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// A write that still failed after every retry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistFailure {
    pub store_name: String,
    pub attempts: u32,
    pub message: String,
}

pub type FailureListener = Arc<dyn Fn(&PersistFailure) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Deferred producer of the value to store.
pub type Encoder = Box<dyn FnOnce() -> std::result::Result<String, String> + Send>;

enum Op {
    Set(Arc<str>),
    Encode(Encoder),
    Delete,
}

/// An op with its value resolved, ready to be retried.
#[derive(Clone)]
enum Resolved {
    Set(Arc<str>),
    Delete,
}

enum Command {
    Apply { name: String, op: Op },
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Default)]
struct Shared {
    save_count: AtomicUsize,
    failure_count: AtomicUsize,
    next_listener: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, FailureListener)>>,
}

impl Shared {
    fn notify(&self, failure: &PersistFailure) {
        let listeners: Vec<FailureListener> = self
            .listeners
            .lock()
            .expect("listener mutex poisoned")
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(failure);
        }
    }
}

pub struct PersistWriter {
    store: Arc<dyn BlobStore>,
    tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PersistWriter {
    /// Start the writer task on the current tokio runtime.
    pub fn spawn(store: Arc<dyn BlobStore>, config: PersistConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());
        let task = tokio::spawn(run(store.clone(), config, rx, shared.clone()));
        Self {
            store,
            tx,
            shared,
            task: Mutex::new(Some(task)),
        }
    }

    /// The medium this writer applies to. Reads go straight to it.
    pub fn store(&self) -> Arc<dyn BlobStore> {
        self.store.clone()
    }

    pub fn write(&self, name: impl Into<String>, value: impl Into<Arc<str>>) -> Result<()> {
        self.send(Command::Apply {
            name: name.into(),
            op: Op::Set(value.into()),
        })
    }

    /// Queue a write whose value is produced by `encode` when the write is applied. A later
    /// write to the same name in the same window drops `encode` without calling it.
    pub fn write_with(
        &self,
        name: impl Into<String>,
        encode: impl FnOnce() -> std::result::Result<String, String> + Send + 'static,
    ) -> Result<()> {
        self.send(Command::Apply {
            name: name.into(),
            op: Op::Encode(Box::new(encode)),
        })
    }

    pub fn delete(&self, name: impl Into<String>) -> Result<()> {
        self.send(Command::Apply {
            name: name.into(),
            op: Op::Delete,
        })
    }

    /// Apply everything queued so far and wait for it to land.
    pub async fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(Command::Flush(done_tx))?;
        done_rx.await.map_err(|_| StorageError::WriterClosed)
    }

    /// Flush and stop the writer task. Later writes fail with [`StorageError::WriterClosed`].
    pub async fn shutdown(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        if self.send(Command::Shutdown(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
        let task = self.task.lock().expect("writer mutex poisoned").take();
        if let Some(task) = task {
            task.await.map_err(|e| StorageError::Task(e.to_string()))?;
        }
        Ok(())
    }

    /// Number of writes applied successfully.
    pub fn save_count(&self) -> usize {
        self.shared.save_count.load(Ordering::SeqCst)
    }

    /// Number of writes abandoned after exhausting retries.
    pub fn failure_count(&self) -> usize {
        self.shared.failure_count.load(Ordering::SeqCst)
    }

    /// Register a listener called for every abandoned write.
    pub fn on_failure(
        &self,
        listener: impl Fn(&PersistFailure) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.shared.next_listener.fetch_add(1, Ordering::SeqCst));
        self.shared
            .listeners
            .lock()
            .expect("listener mutex poisoned")
            .push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.shared.listeners.lock().expect("listener mutex poisoned");
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| StorageError::WriterClosed)
    }
}

async fn run(
    store: Arc<dyn BlobStore>,
    config: PersistConfig,
    mut rx: mpsc::UnboundedReceiver<Command>,
    shared: Arc<Shared>,
) {
    let mut pending: Vec<(String, Op)> = Vec::new();
    let mut deadline: Option<Instant> = None;

    loop {
        let command = match deadline {
            Some(at) => tokio::select! {
                command = rx.recv() => command,
                _ = tokio::time::sleep_until(at) => {
                    apply_pending(&store, &config, &shared, &mut pending).await;
                    deadline = None;
                    continue;
                }
            },
            None => rx.recv().await,
        };

        match command {
            Some(Command::Apply { name, op }) => {
                match pending.iter_mut().find(|(queued, _)| *queued == name) {
                    Some(entry) => entry.1 = op,
                    None => pending.push((name, op)),
                }
                deadline.get_or_insert_with(|| Instant::now() + config.save_delay);
            }
            Some(Command::Flush(done)) => {
                apply_pending(&store, &config, &shared, &mut pending).await;
                deadline = None;
                let _ = done.send(());
            }
            Some(Command::Shutdown(done)) => {
                apply_pending(&store, &config, &shared, &mut pending).await;
                let _ = done.send(());
                break;
            }
            None => {
                apply_pending(&store, &config, &shared, &mut pending).await;
                break;
            }
        }
    }
    log::debug!("persistence writer stopped");
}

async fn apply_pending(
    store: &Arc<dyn BlobStore>,
    config: &PersistConfig,
    shared: &Shared,
    pending: &mut Vec<(String, Op)>,
) {
    for (name, op) in pending.drain(..) {
        let op = match resolve(name.clone(), op).await {
            Ok(op) => op,
            Err(err) => {
                log::warn!("dropping write of {name:?}: {err}");
                give_up(shared, &name, 1, &err);
                continue;
            }
        };
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match apply_once(store.clone(), name.clone(), op.clone()).await {
                Ok(()) => {
                    shared.save_count.fetch_add(1, Ordering::SeqCst);
                    break;
                }
                Err(err) if attempt <= config.max_retries => {
                    log::debug!("persisting {name:?} failed (attempt {attempt}): {err}; retrying");
                    tokio::time::sleep(config.retry_backoff * attempt).await;
                }
                Err(err) => {
                    log::warn!("giving up persisting {name:?} after {attempt} attempts: {err}");
                    give_up(shared, &name, attempt, &err);
                    break;
                }
            }
        }
    }
}

fn give_up(shared: &Shared, name: &str, attempts: u32, err: &StorageError) {
    shared.failure_count.fetch_add(1, Ordering::SeqCst);
    shared.notify(&PersistFailure {
        store_name: name.to_string(),
        attempts,
        message: err.to_string(),
    });
}

async fn resolve(name: String, op: Op) -> Result<Resolved> {
    match op {
        Op::Set(value) => Ok(Resolved::Set(value)),
        Op::Delete => Ok(Resolved::Delete),
        Op::Encode(encode) => {
            let encoded = tokio::task::spawn_blocking(encode)
                .await
                .map_err(|e| StorageError::Task(e.to_string()))?;
            encoded
                .map(|text| Resolved::Set(text.into()))
                .map_err(|message| StorageError::Encode { name, message })
        }
    }
}

async fn apply_once(store: Arc<dyn BlobStore>, name: String, op: Resolved) -> Result<()> {
    tokio::task::spawn_blocking(move || match op {
        Resolved::Set(value) => store.set(&name, &value),
        Resolved::Delete => store.delete(&name),
    })
    .await
    .map_err(|e| StorageError::Task(e.to_string()))?
}
