use std::{
    any::Any,
    num::NonZeroUsize,
    panic::{AssertUnwindSafe, catch_unwind},
    thread,
    time::Instant,
};

use futures::future::try_join_all;
use metrics::{counter, histogram};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::infra::error::InfraError;

use super::{Component, RenderContext, RenderError};

/// Deferred unit of work executed against the worker's [`RenderContext`].
pub type RenderJob = Box<dyn FnOnce(&mut RenderContext) -> Result<String, RenderError> + Send>;

/// Wrap a component as a render job.
pub fn component_job(component: Box<dyn Component>) -> RenderJob {
    Box::new(move |ctx: &mut RenderContext| component.render(ctx))
}

struct Envelope {
    job: RenderJob,
    reply: oneshot::Sender<Result<String, RenderError>>,
}

/// Owner of the render worker thread.
pub struct RenderEngine {
    handle: RenderHandle,
    worker: thread::JoinHandle<()>,
}

impl RenderEngine {
    /// Start the worker. `capacity` bounds how many jobs may wait in its queue;
    /// submitters beyond that wait for room.
    pub fn spawn(capacity: NonZeroUsize) -> Result<Self, InfraError> {
        let (sender, receiver) = mpsc::channel(capacity.get());
        let worker = thread::Builder::new()
            .name("patchwork-render".to_string())
            .spawn(move || run_worker(receiver))?;

        Ok(Self {
            handle: RenderHandle { sender },
            worker,
        })
    }

    pub fn handle(&self) -> RenderHandle {
        self.handle.clone()
    }

    /// Release this engine's handle and wait for the worker to finish.
    ///
    /// Blocks until every other [`RenderHandle`] has been dropped.
    pub fn shutdown(self) -> Result<(), InfraError> {
        let Self { handle, worker } = self;
        drop(handle);
        worker
            .join()
            .map_err(|_| InfraError::render_worker("render worker panicked"))
    }
}

fn run_worker(mut receiver: mpsc::Receiver<Envelope>) {
    let mut ctx = RenderContext::new();
    debug!(target = "patchwork::render", "render worker started");

    while let Some(Envelope { job, reply }) = receiver.blocking_recv() {
        ctx.begin_job();
        let result = catch_unwind(AssertUnwindSafe(|| job(&mut ctx))).unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            error!(
                target = "patchwork::render",
                panic = %message,
                "render job panicked"
            );
            Err(RenderError::Panicked { message })
        });
        counter!("patchwork_render_tasks_total").increment(1);
        if reply.send(result).is_err() {
            debug!(
                target = "patchwork::render",
                "render caller went away before the reply"
            );
        }
    }

    debug!(
        target = "patchwork::render",
        jobs = ctx.jobs_rendered(),
        "render worker stopped"
    );
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Cheap, cloneable submitter for the render worker.
#[derive(Clone)]
pub struct RenderHandle {
    sender: mpsc::Sender<Envelope>,
}

impl RenderHandle {
    pub async fn render(&self, job: RenderJob) -> Result<String, RenderError> {
        let (reply, receiver) = oneshot::channel();
        self.sender
            .send(Envelope { job, reply })
            .await
            .map_err(|_| RenderError::Closed)?;
        receiver.await.map_err(|_| RenderError::Dropped)?
    }

    /// Submit every job and wait for all of them.
    ///
    /// Output order is submission order. The first failure fails the batch.
    pub async fn render_all(&self, jobs: Vec<RenderJob>) -> Result<Vec<String>, RenderError> {
        let started = Instant::now();
        let count = jobs.len();

        let result = try_join_all(jobs.into_iter().map(|job| self.render(job))).await;

        histogram!("patchwork_render_batch_ms").record(started.elapsed().as_secs_f64() * 1000.0);
        if let Err(err) = &result {
            counter!("patchwork_render_failures_total").increment(1);
            warn!(
                target = "patchwork::render",
                jobs = count,
                error = %err,
                "render batch failed"
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::{
        num::NonZeroUsize,
        sync::{Arc, Mutex},
        thread::{self, ThreadId},
    };

    use super::*;

    fn engine() -> RenderEngine {
        RenderEngine::spawn(NonZeroUsize::new(4).expect("non-zero")).expect("worker starts")
    }

    fn recording_job(label: &'static str, seen: Arc<Mutex<Vec<ThreadId>>>) -> RenderJob {
        Box::new(move |ctx: &mut RenderContext| {
            seen.lock().expect("lock").push(thread::current().id());
            Ok(format!("<div id=\"{label}\">{}</div>", ctx.next_id(label)))
        })
    }

    #[tokio::test]
    async fn batch_output_follows_submission_order_on_one_thread() {
        let engine = engine();
        let handle = engine.handle();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let jobs = ["a", "b", "c", "d", "e", "f"]
            .into_iter()
            .map(|label| recording_job(label, seen.clone()))
            .collect();
        let output = handle.render_all(jobs).await.expect("batch renders");

        assert_eq!(
            output,
            vec![
                "<div id=\"a\">a-1</div>",
                "<div id=\"b\">b-2</div>",
                "<div id=\"c\">c-3</div>",
                "<div id=\"d\">d-4</div>",
                "<div id=\"e\">e-5</div>",
                "<div id=\"f\">f-6</div>",
            ]
        );

        let threads = seen.lock().expect("lock").clone();
        assert_eq!(threads.len(), 6);
        assert!(threads.iter().all(|id| *id == threads[0]));
        assert_ne!(threads[0], thread::current().id());

        drop(handle);
        engine.shutdown().expect("worker joins");
    }

    #[tokio::test]
    async fn one_failing_job_fails_the_batch() {
        let engine = engine();
        let handle = engine.handle();

        let jobs: Vec<RenderJob> = vec![
            Box::new(|_: &mut RenderContext| Ok("<p id=\"ok\"></p>".to_string())),
            Box::new(|_: &mut RenderContext| Err(RenderError::component("broken", "boom"))),
        ];
        let err = handle.render_all(jobs).await.expect_err("batch fails");

        assert!(matches!(err, RenderError::Component { component: "broken", .. }));

        drop(handle);
        engine.shutdown().expect("worker joins");
    }

    #[tokio::test]
    async fn panicking_job_fails_alone_and_the_worker_keeps_serving() {
        let engine = engine();
        let handle = engine.handle();

        let exploding: RenderJob = Box::new(|_: &mut RenderContext| -> Result<String, RenderError> {
            panic!("component exploded")
        });
        let err = handle
            .render(exploding)
            .await
            .expect_err("panic is reported");
        assert!(
            matches!(&err, RenderError::Panicked { message } if message == "component exploded")
        );

        let html = handle
            .render(Box::new(|ctx: &mut RenderContext| Ok(ctx.next_id("after"))))
            .await
            .expect("worker still renders");
        assert!(html.starts_with("after-"));

        drop(handle);
        engine.shutdown().expect("worker joins");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_context() {
        let engine = engine();
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let handle = engine.handle();
            tasks.push(tokio::spawn(async move {
                handle
                    .render(Box::new(|ctx: &mut RenderContext| Ok(ctx.next_id("n"))))
                    .await
            }));
        }

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.expect("task joins").expect("job renders"));
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);

        engine.shutdown().expect("worker joins");
    }

    #[tokio::test]
    async fn submitting_after_shutdown_reports_closed() {
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);
        let handle = RenderHandle { sender };

        let err = handle
            .render(Box::new(|_: &mut RenderContext| Ok(String::new())))
            .await
            .expect_err("closed");
        assert!(matches!(err, RenderError::Closed));
    }
}
