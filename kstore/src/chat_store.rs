//! Chat repository served by a fixed pool of workers over a bounded queue.
//!
//! Every operation travels as an [`OperationRequest`] carrying its own
//! single-use reply channel. Mutations follow cache-then-persist: the cache
//! changes first, the whole file is rewritten, and the cache change is
//! reverted when the rewrite fails.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};
use std::task::{Context, Poll};
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::files::{ensure_file, load_jsonl, write_jsonl};
use crate::{ChatFilter, ChatRecord, NoopStoreHooks, StoreError, StoreHooks, StoreOperation};

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_WORKER_COUNT: usize = 5;

type Reply<T> = oneshot::Sender<Result<T, StoreError>>;

/// A queued operation and the channel its single response is written to.
pub enum OperationRequest {
    List {
        filter: ChatFilter,
        reply: Reply<Vec<ChatRecord>>,
    },
    Get {
        id: String,
        reply: Reply<Option<ChatRecord>>,
    },
    Add {
        record: ChatRecord,
        reply: Reply<ChatRecord>,
    },
    Update {
        record: ChatRecord,
        reply: Reply<ChatRecord>,
    },
    Delete {
        id: String,
        reply: Reply<bool>,
    },
}

impl OperationRequest {
    pub fn operation(&self) -> StoreOperation {
        match self {
            Self::List { .. } => StoreOperation::List,
            Self::Get { .. } => StoreOperation::Get,
            Self::Add { .. } => StoreOperation::Add,
            Self::Update { .. } => StoreOperation::Update,
            Self::Delete { .. } => StoreOperation::Delete,
        }
    }
}

/// Resolves to the response of one submitted operation.
pub struct PendingResponse<T> {
    state: PendingState<T>,
}

enum PendingState<T> {
    Waiting(oneshot::Receiver<Result<T, StoreError>>),
    Failed(Option<StoreError>),
}

impl<T> PendingResponse<T> {
    fn waiting(receiver: oneshot::Receiver<Result<T, StoreError>>) -> Self {
        Self {
            state: PendingState::Waiting(receiver),
        }
    }

    fn failed(error: StoreError) -> Self {
        Self {
            state: PendingState::Failed(Some(error)),
        }
    }
}

impl<T> Future for PendingResponse<T> {
    type Output = Result<T, StoreError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            PendingState::Waiting(receiver) => Pin::new(receiver).poll(cx).map(|received| {
                received.unwrap_or_else(|_| {
                    Err(StoreError::disconnected("worker dropped the operation"))
                })
            }),
            PendingState::Failed(error) => Poll::Ready(Err(error
                .take()
                .unwrap_or_else(|| StoreError::disconnected("response already taken")))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatStoreOptions {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for ChatStoreOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKER_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl ChatStoreOptions {
    /// Zero values fall back to the defaults.
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        let defaults = Self::default();
        Self {
            workers: if workers == 0 { defaults.workers } else { workers },
            queue_capacity: if queue_capacity == 0 {
                defaults.queue_capacity
            } else {
                queue_capacity
            },
        }
    }
}

struct StoreState {
    path: PathBuf,
    cache: RwLock<HashMap<String, ChatRecord>>,
    persist_lock: tokio::sync::Mutex<()>,
    hooks: Arc<dyn StoreHooks>,
}

pub struct ChatStore {
    state: Arc<StoreState>,
    sender: Mutex<Option<mpsc::Sender<OperationRequest>>>,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for ChatStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStore")
            .field("path", &self.state.path)
            .finish()
    }
}

impl ChatStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with(path, ChatStoreOptions::default(), Arc::new(NoopStoreHooks)).await
    }

    /// Creates the file if needed, loads it into the cache and starts the workers.
    pub async fn open_with(
        path: impl AsRef<Path>,
        options: ChatStoreOptions,
        hooks: Arc<dyn StoreHooks>,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        ensure_file(&path).await?;

        let records: Vec<ChatRecord> =
            load_jsonl(&path, |line, reason| hooks.on_line_skipped(&path, line, reason)).await?;
        hooks.on_loaded(&path, records.len());

        let cache = records
            .into_iter()
            .map(|mut record| {
                record.strip_system();
                (record.id.clone(), record)
            })
            .collect::<HashMap<_, _>>();

        let state = Arc::new(StoreState {
            path,
            cache: RwLock::new(cache),
            persist_lock: tokio::sync::Mutex::new(()),
            hooks,
        });

        let options = ChatStoreOptions::new(options.workers, options.queue_capacity);
        let (sender, receiver) = mpsc::channel(options.queue_capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let workers = (0..options.workers)
            .map(|worker| {
                let state = Arc::clone(&state);
                let receiver = Arc::clone(&receiver);
                tokio::spawn(run_worker(worker, state, receiver))
            })
            .collect();

        Ok(Self {
            state,
            sender: Mutex::new(Some(sender)),
            workers: tokio::sync::Mutex::new(workers),
        })
    }

    pub fn path(&self) -> &Path {
        &self.state.path
    }

    pub fn is_shutdown(&self) -> bool {
        self.sender
            .lock()
            .map(|sender| sender.is_none())
            .unwrap_or(true)
    }

    pub async fn list_async(
        &self,
        filter: ChatFilter,
        cancel: &CancellationToken,
    ) -> PendingResponse<Vec<ChatRecord>> {
        self.submit(cancel, |reply| OperationRequest::List { filter, reply })
            .await
    }

    pub async fn get_async(
        &self,
        id: impl Into<String>,
        cancel: &CancellationToken,
    ) -> PendingResponse<Option<ChatRecord>> {
        let id = id.into();
        self.submit(cancel, |reply| OperationRequest::Get { id, reply })
            .await
    }

    pub async fn add_async(
        &self,
        record: ChatRecord,
        cancel: &CancellationToken,
    ) -> PendingResponse<ChatRecord> {
        self.submit(cancel, |reply| OperationRequest::Add { record, reply })
            .await
    }

    pub async fn update_async(
        &self,
        record: ChatRecord,
        cancel: &CancellationToken,
    ) -> PendingResponse<ChatRecord> {
        self.submit(cancel, |reply| OperationRequest::Update { record, reply })
            .await
    }

    pub async fn delete_async(
        &self,
        id: impl Into<String>,
        cancel: &CancellationToken,
    ) -> PendingResponse<bool> {
        let id = id.into();
        self.submit(cancel, |reply| OperationRequest::Delete { id, reply })
            .await
    }

    pub async fn list(&self, filter: ChatFilter) -> Result<Vec<ChatRecord>, StoreError> {
        self.list_async(filter, &CancellationToken::new()).await.await
    }

    pub async fn get(&self, id: impl Into<String>) -> Result<Option<ChatRecord>, StoreError> {
        self.get_async(id, &CancellationToken::new()).await.await
    }

    pub async fn add(&self, record: ChatRecord) -> Result<ChatRecord, StoreError> {
        self.add_async(record, &CancellationToken::new()).await.await
    }

    pub async fn update(&self, record: ChatRecord) -> Result<ChatRecord, StoreError> {
        self.update_async(record, &CancellationToken::new()).await.await
    }

    pub async fn delete(&self, id: impl Into<String>) -> Result<bool, StoreError> {
        self.delete_async(id, &CancellationToken::new()).await.await
    }

    /// Stops accepting operations, lets queued ones drain and waits for the
    /// workers to exit. Later calls return immediately.
    pub async fn shutdown(&self) {
        let sender = match self.sender.lock() {
            Ok(mut sender) => sender.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(sender) = sender else {
            return;
        };
        drop(sender);

        let workers = std::mem::take(&mut *self.workers.lock().await);
        for worker in workers {
            let _ = worker.await;
        }
        self.state.hooks.on_shutdown();
    }

    /// Enqueues a request unless the store is shut down or `cancel` fires
    /// first. A cancelled submission is never enqueued.
    async fn submit<T>(
        &self,
        cancel: &CancellationToken,
        build: impl FnOnce(Reply<T>) -> OperationRequest,
    ) -> PendingResponse<T> {
        let sender = match self.sender.lock() {
            Ok(sender) => sender.clone(),
            Err(_) => return PendingResponse::failed(StoreError::poisoned("queue sender")),
        };
        let Some(sender) = sender else {
            return PendingResponse::failed(StoreError::shutdown());
        };

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return PendingResponse::failed(StoreError::cancelled("submission cancelled"));
            }
            permit = sender.reserve() => permit,
        };
        let Ok(permit) = permit else {
            return PendingResponse::failed(StoreError::shutdown());
        };

        let (reply, receiver) = oneshot::channel();
        let request = build(reply);
        self.state.hooks.on_operation_enqueued(request.operation());
        permit.send(request);
        PendingResponse::waiting(receiver)
    }
}

async fn run_worker(
    worker: usize,
    state: Arc<StoreState>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<OperationRequest>>>,
) {
    state.hooks.on_worker_started(worker);
    loop {
        let request = receiver.lock().await.recv().await;
        let Some(request) = request else {
            break;
        };
        state.process(request).await;
    }
    state.hooks.on_worker_stopped(worker);
}

impl StoreState {
    async fn process(&self, request: OperationRequest) {
        let operation = request.operation();
        let started = Instant::now();
        match request {
            OperationRequest::List { filter, reply } => {
                self.respond(operation, started, reply, self.list(&filter));
            }
            OperationRequest::Get { id, reply } => {
                self.respond(operation, started, reply, self.get(&id));
            }
            OperationRequest::Add { record, reply } => {
                let result = self.add(record).await;
                self.respond(operation, started, reply, result);
            }
            OperationRequest::Update { record, reply } => {
                let result = self.update(record).await;
                self.respond(operation, started, reply, result);
            }
            OperationRequest::Delete { id, reply } => {
                let result = self.delete(&id).await;
                self.respond(operation, started, reply, result);
            }
        }
    }

    fn respond<T>(
        &self,
        operation: StoreOperation,
        started: Instant,
        reply: Reply<T>,
        result: Result<T, StoreError>,
    ) {
        match &result {
            Ok(_) => self.hooks.on_operation_completed(operation, started.elapsed()),
            Err(error) => self.hooks.on_operation_failed(operation, error),
        }
        // The caller may have stopped waiting.
        let _ = reply.send(result);
    }

    fn list(&self, filter: &ChatFilter) -> Result<Vec<ChatRecord>, StoreError> {
        Ok(filter.apply(self.snapshot()?))
    }

    fn get(&self, id: &str) -> Result<Option<ChatRecord>, StoreError> {
        let cache = self.cache.read().map_err(|_| StoreError::poisoned("chat cache"))?;
        Ok(cache.get(id).cloned())
    }

    async fn add(&self, mut record: ChatRecord) -> Result<ChatRecord, StoreError> {
        if record.id.is_empty() {
            return Err(StoreError::invalid_input("chat id is empty"));
        }
        record.strip_system();

        let _persist = self.persist_lock.lock().await;
        let previous = self.write_cache(|cache| cache.insert(record.id.clone(), record.clone()))?;
        self.persist_or_restore(StoreOperation::Add, &record.id, previous)
            .await?;
        Ok(record)
    }

    async fn update(&self, mut record: ChatRecord) -> Result<ChatRecord, StoreError> {
        record.strip_system();

        let _persist = self.persist_lock.lock().await;
        let previous = self.write_cache(|cache| {
            cache
                .get_mut(&record.id)
                .map(|slot| std::mem::replace(slot, record.clone()))
        })?;
        let Some(previous) = previous else {
            return Err(StoreError::not_found(format!(
                "chat with id {} not found",
                record.id
            )));
        };
        self.persist_or_restore(StoreOperation::Update, &record.id, Some(previous))
            .await?;
        Ok(record)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let _persist = self.persist_lock.lock().await;
        let Some(previous) = self.write_cache(|cache| cache.remove(id))? else {
            return Ok(false);
        };
        self.persist_or_restore(StoreOperation::Delete, id, Some(previous))
            .await?;
        Ok(true)
    }

    /// Rewrites the file; on failure puts `previous` back under `id`, or
    /// removes `id` when there was nothing before.
    async fn persist_or_restore(
        &self,
        operation: StoreOperation,
        id: &str,
        previous: Option<ChatRecord>,
    ) -> Result<(), StoreError> {
        let result = match self.snapshot() {
            Ok(records) => write_jsonl(&self.path, &records).await,
            Err(error) => Err(error),
        };
        let Err(error) = result else {
            return Ok(());
        };

        self.write_cache(|cache| match previous {
            Some(previous) => {
                cache.insert(id.to_string(), previous);
            }
            None => {
                cache.remove(id);
            }
        })?;
        self.hooks.on_rollback(operation, id, &error);
        Err(error)
    }

    /// All records, newest first.
    fn snapshot(&self) -> Result<Vec<ChatRecord>, StoreError> {
        let cache = self.cache.read().map_err(|_| StoreError::poisoned("chat cache"))?;
        let mut records = cache.values().cloned().collect::<Vec<_>>();
        drop(cache);
        records.sort_by(|left, right| {
            right
                .create_time
                .cmp(&left.create_time)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(records)
    }

    fn write_cache<R>(
        &self,
        change: impl FnOnce(&mut HashMap<String, ChatRecord>) -> R,
    ) -> Result<R, StoreError> {
        let mut cache = self
            .cache
            .write()
            .map_err(|_| StoreError::poisoned("chat cache"))?;
        Ok(change(&mut cache))
    }
}
