//! Job executor.
//!
//! One consumer loop per configured queue, each with its own concurrency
//! limit, so a backlog of long clip polls never starves finishing jobs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use mvgen_queue::{Delivery, PipelineGraph, QueueName};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::handler::{Backoff, JobHandler};
use crate::tasks::TaskSet;

/// Maximum messages taken from a stream per read.
const MAX_BATCH: usize = 5;

/// Job executor that processes jobs from the configured queues.
pub struct JobExecutor {
    config: WorkerConfig,
    graph: PipelineGraph,
    handler: Arc<JobHandler>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, graph: PipelineGraph, tasks: TaskSet) -> Self {
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        let backoff = Backoff {
            base: config.retry_base_delay,
            max: config.retry_max_delay,
        };
        // Well inside the idle threshold, so a live job is never claimed.
        let heartbeat_interval = config.claim_min_idle / 3;
        let handler = Arc::new(JobHandler::new(
            Arc::new(graph.clone()),
            tasks,
            backoff,
            consumer_name.clone(),
            heartbeat_interval,
        ));

        Self {
            config,
            graph,
            handler,
            shutdown,
            consumer_name,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Start the executor. Returns after shutdown once in-flight jobs drained.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' on {:?} with {} max concurrent jobs per queue",
            self.consumer_name, self.config.queues, self.config.max_concurrent_jobs
        );

        self.graph.queue().init().await?;

        let loops: Vec<_> = self
            .config
            .queues
            .iter()
            .map(|&queue| {
                let consumer = QueueConsumer {
                    queue,
                    graph: self.graph.clone(),
                    handler: Arc::clone(&self.handler),
                    semaphore: Arc::new(Semaphore::new(self.config.max_concurrent_jobs)),
                    config: self.config.clone(),
                    consumer_name: self.consumer_name.clone(),
                };
                let shutdown = self.shutdown.subscribe();
                tokio::spawn(async move { consumer.run(shutdown).await })
            })
            .collect();

        for (queue, handle) in self.config.queues.iter().zip(loops) {
            if let Err(e) = handle.await {
                error!("Consumer loop for {} panicked: {}", queue, e);
            }
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Consumer loop of one queue.
struct QueueConsumer {
    queue: QueueName,
    graph: PipelineGraph,
    handler: Arc<JobHandler>,
    semaphore: Arc<Semaphore>,
    config: WorkerConfig,
    consumer_name: String,
}

impl QueueConsumer {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Consuming {} as '{}'", self.queue, self.consumer_name);

        // Claim right away: pending messages of a crashed predecessor wait otherwise.
        let mut last_claim: Option<Instant> = None;

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                result = self.step(&mut last_claim) => {
                    if let Err(e) = result {
                        error!("Error consuming {}: {}", self.queue, e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        info!("Stopping {} consumer, waiting for in-flight jobs", self.queue);
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "{} jobs still running after {}s; they stay pending for another worker",
                self.queue,
                self.config.shutdown_timeout.as_secs()
            );
        }
    }

    async fn step(&self, last_claim: &mut Option<Instant>) -> WorkerResult<()> {
        let available = self.semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }
        let count = available.min(MAX_BATCH);
        let jobs = self.graph.queue();

        let claim_due = last_claim.map_or(true, |at| at.elapsed() >= self.config.claim_interval);
        if claim_due {
            *last_claim = Some(Instant::now());
            let min_idle_ms = self.config.claim_min_idle.as_millis() as u64;
            match jobs.claim_pending(self.queue, &self.consumer_name, min_idle_ms, count).await {
                Ok(claimed) if !claimed.is_empty() => {
                    info!("Claimed {} pending {} jobs", claimed.len(), self.queue);
                    return self.spawn_all(claimed).await;
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to claim pending {} jobs: {}", self.queue, e),
            }
        }

        let block_ms = self.config.consume_block.as_millis() as u64;
        let deliveries = jobs.consume(self.queue, &self.consumer_name, block_ms, count).await?;
        if !deliveries.is_empty() {
            debug!("Consumed {} jobs from {}", deliveries.len(), self.queue);
        }
        self.spawn_all(deliveries).await
    }

    async fn spawn_all(&self, deliveries: Vec<Delivery>) -> WorkerResult<()> {
        for delivery in deliveries {
            let permit = Arc::clone(&self.semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::SemaphoreClosed)?;
            let handler = Arc::clone(&self.handler);
            let queue = self.queue;

            tokio::spawn(async move {
                let _permit = permit;
                handler.handle(queue, delivery).await;
            });
        }
        Ok(())
    }

    async fn wait_for_jobs(&self) {
        while self.semaphore.available_permits() < self.config.max_concurrent_jobs {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
