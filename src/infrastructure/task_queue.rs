use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// TaskHandler はキューに投入されたタスクを1件ずつ処理する。
#[async_trait]
pub trait TaskHandler<T>: Send + Sync + 'static {
    async fn handle(&self, task: T) -> anyhow::Result<()>;
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TaskQueueError {
    #[error("task queue is full")]
    QueueFull,

    #[error("task queue is shutting down")]
    ShuttingDown,
}

#[derive(Debug, Default)]
pub struct TaskQueueStats {
    processed: AtomicU64,
    failed: AtomicU64,
}

impl TaskQueueStats {
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// TaskQueue はワーカーごとに容量制限付きキューを持つタスク実行器。
///
/// タスクはパーティションキーの剰余で固定のワーカーへ振り分けられるため、
/// 同じキーのタスクは投入順に1件ずつ処理される。満杯時の投入は待たずに QueueFull を返す。
/// shutdown は新規投入を止め、各ワーカーが自分のキューに残ったタスクを処理し終えてから戻る。
pub struct TaskQueue<T: Send + 'static> {
    name: &'static str,
    senders: Vec<mpsc::Sender<T>>,
    workers: Mutex<JoinSet<()>>,
    cancel: CancellationToken,
    stats: Arc<TaskQueueStats>,
}

impl<T: Send + 'static> TaskQueue<T> {
    /// ワーカーを起動する。tokio ランタイム内で呼び出すこと。
    /// capacity はワーカー1つあたりのキュー長。
    pub fn start(
        name: &'static str,
        handler: Arc<dyn TaskHandler<T>>,
        workers: usize,
        capacity: usize,
    ) -> Self {
        let workers = workers.max(1);
        let cancel = CancellationToken::new();
        let stats = Arc::new(TaskQueueStats::default());

        let mut senders = Vec::with_capacity(workers);
        let mut set = JoinSet::new();
        for worker_id in 0..workers {
            let (sender, receiver) = mpsc::channel(capacity.max(1));
            senders.push(sender);
            set.spawn(run_worker(
                name,
                worker_id,
                receiver,
                handler.clone(),
                cancel.clone(),
                stats.clone(),
            ));
        }
        tracing::info!(queue = name, workers, capacity, "task queue started");

        Self {
            name,
            senders,
            workers: Mutex::new(set),
            cancel,
            stats,
        }
    }

    /// key が同じタスクは同じワーカーで投入順に処理される。
    pub fn submit(&self, key: u64, task: T) -> Result<(), TaskQueueError> {
        if self.cancel.is_cancelled() {
            return Err(TaskQueueError::ShuttingDown);
        }
        let partition = self.partition(key);
        self.senders[partition].try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                tracing::warn!(queue = self.name, partition, "task queue full, rejecting task");
                TaskQueueError::QueueFull
            }
            mpsc::error::TrySendError::Closed(_) => TaskQueueError::ShuttingDown,
        })
    }

    fn partition(&self, key: u64) -> usize {
        (key % self.senders.len() as u64) as usize
    }

    pub fn stats(&self) -> Arc<TaskQueueStats> {
        self.stats.clone()
    }

    /// 新規投入を止め、全ワーカーが残りのタスクを処理して終了するのを待つ。
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let mut workers = std::mem::take(&mut *self.workers.lock().await);
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(queue = self.name, error = %e, "task queue worker panicked");
            }
        }

        tracing::info!(
            queue = self.name,
            processed = self.stats.processed(),
            failed = self.stats.failed(),
            "task queue stopped"
        );
    }
}

async fn run_worker<T: Send + 'static>(
    name: &'static str,
    worker_id: usize,
    mut receiver: mpsc::Receiver<T>,
    handler: Arc<dyn TaskHandler<T>>,
    cancel: CancellationToken,
    stats: Arc<TaskQueueStats>,
) {
    loop {
        let next = tokio::select! {
            biased;
            task = receiver.recv() => task,
            _ = cancel.cancelled() => None,
        };
        match next {
            Some(task) => process(name, handler.as_ref(), &stats, task).await,
            None => break,
        }
    }

    // キャンセル後に積まれていた分も投入順のまま処理する
    receiver.close();
    let mut drained = 0u64;
    while let Ok(task) = receiver.try_recv() {
        process(name, handler.as_ref(), &stats, task).await;
        drained += 1;
    }
    tracing::debug!(queue = name, worker_id, drained, "task queue worker exited");
}

async fn process<T: Send + 'static>(
    name: &'static str,
    handler: &dyn TaskHandler<T>,
    stats: &TaskQueueStats,
    task: T,
) {
    match handler.handle(task).await {
        Ok(()) => {
            stats.processed.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(queue = name, error = %e, "task failed");
        }
    }
}
