//! Background ingestion: a shared job queue drained by a pool of threads,
//! each owning its own database connection.

use std::{
    collections::VecDeque,
    panic::{AssertUnwindSafe, catch_unwind},
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    config::Config,
    domain::catalog::{FileId, LayerId},
    ingest::{IngestError, IngestOutcome, IngestRequest, Ingestor},
    storage::{db, error::StorageError},
};

pub type JobId = Uuid;

/// How many times a job is run when running it panics.
pub const MAX_DELIVERIES: u32 = 3;

type JobResult = Result<IngestOutcome, IngestError>;

struct Job {
    id: JobId,
    request: IngestRequest,
    reply: Sender<JobResult>,
}

pub enum JobStatus {
    Finished(JobResult),
    Pending,
}

/// The submitter's side of a queued job. Waiting never cancels the job.
pub struct JobHandle {
    id: JobId,
    result: Receiver<JobResult>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Blocks up to `timeout` for the job's result. The result is handed out
    /// once; waiting again afterwards reports [`IngestError::WorkerLost`].
    pub fn wait(&self, timeout: Duration) -> JobStatus {
        match self.result.recv_timeout(timeout) {
            Ok(result) => JobStatus::Finished(result),
            Err(RecvTimeoutError::Timeout) => JobStatus::Pending,
            Err(RecvTimeoutError::Disconnected) => {
                JobStatus::Finished(Err(IngestError::WorkerLost))
            }
        }
    }

    /// Blocks until the job is done.
    pub fn join(self) -> JobResult {
        self.result.recv().unwrap_or(Err(IngestError::WorkerLost))
    }

    /// Waits up to `wait` and tells the uploader how it went. A job still
    /// running when the wait is over is reported as accepted and keeps running.
    pub fn respond(&self, wait: Duration) -> UploadResponse {
        match self.wait(wait) {
            JobStatus::Finished(result) => UploadResponse::from_result(result),
            JobStatus::Pending => {
                info!("job {} still running after {wait:?}", self.id);
                UploadResponse::Accepted { job_id: self.id }
            }
        }
    }
}

pub struct WorkerPool {
    queue: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Opens one connection per worker and starts the workers.
    ///
    /// An in-memory database is private to its connection, so it gets a
    /// single worker.
    pub fn start(config: &Config) -> Result<Self, StorageError> {
        let threads = if config.database.in_memory {
            if config.worker.threads > 1 {
                warn!("in-memory database, running a single worker");
            }
            1
        } else {
            config.worker.threads.max(1)
        };
        let connections = (0..threads)
            .map(|_| db::open(&config.database))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::with_connections(
            Ingestor::from_config(config),
            connections,
        ))
    }

    pub fn with_connections(ingestor: Ingestor, connections: Vec<Connection>) -> Self {
        Self::spawn(connections, move |conn: &mut Connection, request: &IngestRequest| {
            ingestor.ingest(conn, request.clone())
        })
    }

    fn spawn<H>(connections: Vec<Connection>, handler: H) -> Self
    where
        H: Fn(&mut Connection, &IngestRequest) -> JobResult + Clone + Send + 'static,
    {
        let (queue, jobs) = channel::unbounded::<Job>();
        let workers = connections
            .into_iter()
            .enumerate()
            .map(|(index, conn)| {
                let jobs = jobs.clone();
                let handler = handler.clone();
                thread::spawn(move || work(index, conn, jobs, handler))
            })
            .collect::<Vec<_>>();
        info!("started {} ingestion workers", workers.len());

        Self {
            queue: Some(queue),
            workers,
        }
    }

    pub fn submit(&self, request: IngestRequest) -> JobHandle {
        let id = Uuid::new_v4();
        let (reply, result) = channel::bounded(1);
        debug!("queueing job {id} for {}", request.original_filename);

        let job = Job { id, request, reply };
        match &self.queue {
            Some(queue) => {
                if queue.send(job).is_err() {
                    // dropping the reply sender makes the handle report a lost worker
                    error!("no worker left to run job {id}");
                }
            }
            None => error!("pool is shut down, dropping job {id}"),
        }
        JobHandle { id, result }
    }

    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Turns `items` into requests one at a time, keeping at most `limit`
    /// unreported jobs. Once the limit is reached the oldest job is handed to
    /// `finished` before the next item is prepared.
    pub fn submit_bounded<T, E>(
        &self,
        items: impl IntoIterator<Item = T>,
        limit: usize,
        mut prepare: impl FnMut(&T) -> Result<IngestRequest, E>,
        mut finished: impl FnMut(T, JobHandle) -> Result<(), E>,
    ) -> Result<(), E> {
        let limit = limit.max(1);
        let mut in_flight: VecDeque<(T, JobHandle)> = VecDeque::with_capacity(limit);

        for item in items {
            if in_flight.len() >= limit {
                if let Some((done, handle)) = in_flight.pop_front() {
                    debug!("window full, reporting job {}", handle.id());
                    finished(done, handle)?;
                }
            }
            let request = prepare(&item)?;
            in_flight.push_back((item, self.submit(request)));
        }
        while let Some((done, handle)) = in_flight.pop_front() {
            finished(done, handle)?;
        }
        Ok(())
    }

    /// Stops accepting jobs and waits for the queued ones to finish.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.queue.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("ingestion worker panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn work<H>(index: usize, mut conn: Connection, jobs: Receiver<Job>, handler: H)
where
    H: Fn(&mut Connection, &IngestRequest) -> JobResult,
{
    for job in jobs.iter() {
        debug!("worker {index} started job {}", job.id);
        let result = deliver(&job, &mut conn, &handler);
        match &result {
            Ok(outcome) => info!(
                "job {} done: file {} layer {}",
                job.id, outcome.file_id, outcome.layer_id
            ),
            Err(err) => warn!("job {} failed: {err}", job.id),
        }
        if job.reply.send(result).is_err() {
            debug!("nobody is waiting for job {}", job.id);
        }
    }
    debug!("worker {index} exiting");
}

/// Runs the job, running it again from scratch if it panics.
fn deliver<H>(job: &Job, conn: &mut Connection, handler: &H) -> JobResult
where
    H: Fn(&mut Connection, &IngestRequest) -> JobResult,
{
    for delivery in 1..=MAX_DELIVERIES {
        match catch_unwind(AssertUnwindSafe(|| handler(conn, &job.request))) {
            Ok(result) => return result,
            Err(_) => warn!(
                "job {} panicked on delivery {delivery}/{MAX_DELIVERIES}",
                job.id
            ),
        }
    }
    error!("job {} abandoned after {MAX_DELIVERIES} deliveries", job.id);
    Err(IngestError::WorkerLost)
}

/// What an uploader gets back.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadResponse {
    Created { file_id: FileId, layer_id: LayerId },
    Accepted { job_id: JobId },
    Failed { error: String, transient: bool },
}

impl UploadResponse {
    fn from_result(result: JobResult) -> Self {
        match result {
            Ok(outcome) => UploadResponse::Created {
                file_id: outcome.file_id,
                layer_id: outcome.layer_id,
            },
            Err(err) => UploadResponse::Failed {
                transient: err.is_transient(),
                error: err.to_string(),
            },
        }
    }
}

/// Queues `request` and waits up to `wait` for it.
pub fn upload(pool: &WorkerPool, request: IngestRequest, wait: Duration) -> UploadResponse {
    pool.submit(request).respond(wait)
}
