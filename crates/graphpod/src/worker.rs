use std::sync::Arc;
use std::thread;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::bootstrap::{Bootstrapper, WorkerState};
use crate::bridge::Backend;
use crate::config::WorkerConfig;
use crate::logger::Logger;
use crate::protocol::OutboundMessage;
use crate::sandbox::Sandbox;

/// Reply to any request received before the worker reached `Ready`, and to
/// every request after a failed bootstrap.
pub const NOT_READY_ERROR: &str = "Agent runtime not initialized yet";

#[derive(Clone)]
pub struct WorkerHandle {
    inbound: mpsc::UnboundedSender<String>,
}

impl WorkerHandle {
    pub fn send(&self, message: impl Into<String>) -> anyhow::Result<()> {
        self.inbound
            .send(message.into())
            .map_err(|_| anyhow::anyhow!("worker is gone"))
    }
}

/// Boots the sandbox on a dedicated thread and returns the inbound handle
/// plus the stream of outbound messages. The worker reaches `Ready` or
/// `Failed` exactly once and is never restarted; to retry a failed
/// bootstrap, discard it and spawn a fresh one.
///
/// Must be called from within a Tokio runtime; the worker thread drives its
/// network round-trips to completion on that runtime's handle.
pub fn spawn(
    config: WorkerConfig,
    backend: Arc<dyn Backend>,
) -> anyhow::Result<(WorkerHandle, mpsc::UnboundedReceiver<OutboundMessage>)> {
    let runtime = Handle::try_current()
        .map_err(|err| anyhow::anyhow!("tokio runtime handle unavailable: {err}"))?;
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    thread::Builder::new()
        .name("graphpod-worker".to_owned())
        .spawn(move || run_worker(config, backend, runtime, inbound_rx, outbound_tx))?;

    Ok((WorkerHandle { inbound: inbound_tx }, outbound_rx))
}

fn run_worker(
    config: WorkerConfig,
    backend: Arc<dyn Backend>,
    runtime: Handle,
    mut inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
) {
    let logger = Logger::new(config.enable_logging);
    let mut state = WorkerState::Uninitialized;
    let sandbox = boot(
        config,
        backend,
        runtime,
        &mut state,
        &mut inbound,
        &outbound,
        &logger,
    );

    while let Some(message) = inbound.blocking_recv() {
        match (&state, sandbox.as_ref()) {
            (WorkerState::Ready, Some(sandbox)) => dispatch(sandbox, &message, &outbound, &logger),
            _ => post(&outbound, OutboundMessage::error(NOT_READY_ERROR)),
        }
    }
}

fn boot(
    config: WorkerConfig,
    backend: Arc<dyn Backend>,
    runtime: Handle,
    state: &mut WorkerState,
    inbound: &mut mpsc::UnboundedReceiver<String>,
    outbound: &mpsc::UnboundedSender<OutboundMessage>,
    logger: &Logger,
) -> Option<Sandbox> {
    let mut bootstrapper = Bootstrapper::new(config, backend, runtime);
    while let Some(stage) = bootstrapper.next_stage() {
        *state = WorkerState::Initializing(stage);
        post(outbound, OutboundMessage::status(stage.status_line()));
        logger.stage(stage);
        if let Err(err) = bootstrapper.advance() {
            let detail = format!("{err:#}");
            logger.bootstrap_failed(&detail);
            *state = WorkerState::Failed(detail.clone());
            post(
                outbound,
                OutboundMessage::error(format!("Initialization failed: {detail}")),
            );
            return None;
        }
        // Requests that arrived while the stage was in flight are rejected
        // here, at the stage boundary, instead of queuing behind bootstrap.
        reject_pending(inbound, outbound);
    }
    match bootstrapper.finish() {
        Ok(sandbox) => {
            *state = WorkerState::Ready;
            post(outbound, OutboundMessage::ready());
            logger.ready();
            Some(sandbox)
        }
        Err(err) => {
            let detail = format!("{err:#}");
            logger.bootstrap_failed(&detail);
            *state = WorkerState::Failed(detail.clone());
            post(
                outbound,
                OutboundMessage::error(format!("Initialization failed: {detail}")),
            );
            None
        }
    }
}

fn dispatch(
    sandbox: &Sandbox,
    message: &str,
    outbound: &mpsc::UnboundedSender<OutboundMessage>,
    logger: &Logger,
) {
    logger.request(message);
    match sandbox.run_agent(message) {
        Ok(result) => {
            logger.result(&result);
            post(outbound, OutboundMessage::result(result));
        }
        Err(err) => {
            let detail = format!("{err:#}");
            logger.request_failed(&detail);
            post(
                outbound,
                OutboundMessage::error(format!("Agent error: {detail}")),
            );
        }
    }
}

fn reject_pending(
    inbound: &mut mpsc::UnboundedReceiver<String>,
    outbound: &mpsc::UnboundedSender<OutboundMessage>,
) {
    while inbound.try_recv().is_ok() {
        post(outbound, OutboundMessage::error(NOT_READY_ERROR));
    }
}

fn post(outbound: &mpsc::UnboundedSender<OutboundMessage>, message: OutboundMessage) {
    let _ = outbound.send(message);
}
