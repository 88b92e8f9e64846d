//! Connected session: inbound loop, writer task and periodic tasks.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use verdant_core::{CoordinateMapper, StateStore};

use crate::connection::handshake::Joined;
use crate::connection::outbox::{Outbox, Wire};
use crate::connection::task::{run_periodic, SessionTask, TaskContext};
use crate::protocol::{is_text_ping, ProtocolProcessor, TEXT_PONG};

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    /// The link closed or a write failed.
    LinkLost,
    /// Shutdown was requested.
    Shutdown,
}

pub(crate) struct Session<'a> {
    pub(crate) processor: ProtocolProcessor,
    pub(crate) wire: Wire,
    pub(crate) outbox: &'a Outbox,
    pub(crate) store: Arc<StateStore>,
    pub(crate) mapper: Arc<dyn CoordinateMapper>,
    pub(crate) tasks: Vec<Arc<dyn SessionTask>>,
}

impl Session<'_> {
    /// Runs until the link drops or `shutdown` is raised.
    pub(crate) async fn run(self, joined: Joined, mut shutdown: watch::Receiver<bool>) -> SessionEnd {
        let Joined { mut link, room, replay } = joined;

        for raw in &replay {
            if let Some(reply) = self.processor.handle_text(raw) {
                if self.wire.send(&reply).await.is_err() {
                    return SessionEnd::LinkLost;
                }
            }
        }

        let (active_tx, active_rx) = watch::channel(true);
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        self.outbox.attach(out_tx);

        let writer_wire = self.wire.clone();
        let mut writer = tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                if let Err(error) = writer_wire.send(&message).await {
                    tracing::debug!("writer stopped: {}", error);
                    break;
                }
            }
        });

        let ctx = TaskContext::new(
            Arc::clone(&self.store),
            self.outbox.clone(),
            Arc::clone(&self.mapper),
            active_rx,
        );
        let mut running = JoinSet::new();
        for task in &self.tasks {
            running.spawn(run_periodic(Arc::clone(task), ctx.clone()));
        }
        tracing::info!("session started in {} with {} tasks", room, self.tasks.len());

        let end = loop {
            tokio::select! {
                frame = link.rx.recv() => {
                    let Some(raw) = frame else { break SessionEnd::LinkLost };
                    if !self.handle_frame(&raw).await {
                        break SessionEnd::LinkLost;
                    }
                }
                _ = &mut writer => break SessionEnd::LinkLost,
                () = flag_raised(&mut shutdown) => break SessionEnd::Shutdown,
            }
        };

        self.outbox.detach();
        active_tx.send_replace(false);
        while running.join_next().await.is_some() {}
        writer.abort();
        tracing::info!("session in {} ended: {:?}", room, end);
        end
    }

    /// Handles one inbound frame. Returns false when the link is gone.
    async fn handle_frame(&self, raw: &str) -> bool {
        self.wire.received(raw);
        if is_text_ping(raw) {
            if self.wire.send_text(TEXT_PONG.to_owned()).await.is_err() {
                return false;
            }
            self.wire.stats().record_pong_sent();
            return true;
        }
        match self.processor.handle_text(raw) {
            Some(reply) => self.wire.send(&reply).await.is_ok(),
            None => true,
        }
    }
}

/// Resolves once `flag` reads true or its sender is gone.
pub(crate) async fn flag_raised(flag: &mut watch::Receiver<bool>) {
    loop {
        if *flag.borrow_and_update() {
            return;
        }
        if flag.changed().await.is_err() {
            return;
        }
    }
}
