//! Shared front door to the engine.
//!
//! Every operation takes the single engine lock, runs to completion and
//! hands its outbox to the [`Hub`] before letting go, so the notifications
//! of one operation can't be overtaken by those of a later one. Nothing in
//! here awaits while holding the lock.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info};

use crate::{
    config::Config,
    engine::{Engine, Phase, Stats, SweepReport},
    error::EngineError,
    hub::Hub,
    lock,
    protocol::{ClientEvent, ConnId, ServerEvent, SignalKind},
};

/// Floor for the reaper period, since a zero interval can't tick.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Clone)]
pub struct Coordinator {
    engine: Arc<Mutex<Engine>>,
    hub: Hub,
    sweep_interval: Duration,
}

impl Coordinator {
    pub fn new(config: Config) -> Self {
        Self::from_engine(Engine::new(config))
    }

    pub fn from_engine(engine: Engine) -> Self {
        let sweep_interval = engine.config().sweep_interval;
        Self {
            engine: Arc::new(Mutex::new(engine)),
            hub: Hub::default(),
            sweep_interval,
        }
    }

    fn with_engine<T>(&self, f: impl FnOnce(&mut Engine) -> T) -> T {
        f(&mut lock(&self.engine))
    }

    pub fn accepting(&self) -> bool {
        self.with_engine(|engine| engine.has_capacity())
    }

    /// Registers a new socket and hands out its handle.
    pub fn connect(&self, outbound: mpsc::Sender<ServerEvent>) -> Result<ConnId, EngineError> {
        let handle = ConnId::new();
        self.with_engine(|engine| {
            engine.connect(handle)?;
            self.hub.register(handle, outbound);
            Ok(handle)
        })
    }

    /// Applies one inbound event. Rejections go back to `handle` only.
    pub fn handle(&self, handle: ConnId, event: ClientEvent) {
        let now = Instant::now();
        self.with_engine(|engine| {
            let result = match event {
                ClientEvent::FindMatch(form) => engine.find_match(handle, form, now),
                ClientEvent::LeaveQueue => engine.leave_queue(handle),
                ClientEvent::SendMessage { content, kind } => engine
                    .relay_message(handle, content, kind, now)
                    .map(|(_, outbox)| outbox),
                ClientEvent::Typing { is_typing } => engine.relay_typing(handle, is_typing, now),
                ClientEvent::EndChat => engine.end_chat(handle),
                ClientEvent::Offer(payload) => engine.relay_signal(handle, SignalKind::Offer, payload, now),
                ClientEvent::Answer(payload) => engine.relay_signal(handle, SignalKind::Answer, payload, now),
                ClientEvent::IceCandidate(payload) => {
                    engine.relay_signal(handle, SignalKind::IceCandidate, payload, now)
                }
            };

            match result {
                Ok(outbox) => self.hub.deliver(outbox),
                Err(err) => self.send_rejection(handle, &err),
            }
        })
    }

    /// Reports a problem with an inbound frame that never reached the engine.
    pub fn reject(&self, handle: ConnId, err: EngineError) {
        self.send_rejection(handle, &err);
    }

    fn send_rejection(&self, handle: ConnId, err: &EngineError) {
        debug!(%handle, code = err.code(), "rejected: {err}");
        self.hub.send(handle, err.to_event());
    }

    pub fn disconnect(&self, handle: ConnId) {
        self.with_engine(|engine| {
            let outbox = engine.disconnect(handle);
            self.hub.unregister(handle);
            self.hub.deliver(outbox);
        })
    }

    /// Runs one reaper pass. Each phase takes the lock on its own, and a
    /// phase that panics is logged and skipped.
    pub fn sweep(&self) -> SweepReport {
        let now = Instant::now();
        let mut report = SweepReport::default();

        for phase in Phase::ALL {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                self.with_engine(|engine| {
                    let outbox = engine.run_phase(phase, now, &mut report);
                    self.hub.deliver(outbox);
                })
            }));
            if result.is_err() {
                error!(?phase, "reaper phase panicked");
            }
        }

        if !report.is_empty() {
            info!(?report, "reaper sweep");
        }
        report
    }

    pub fn spawn_reaper(&self) -> JoinHandle<()> {
        let coordinator = self.clone();
        let period = self.sweep_interval.max(MIN_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                coordinator.sweep();
            }
        })
    }

    pub fn stats(&self) -> Stats {
        self.with_engine(|engine| engine.stats())
    }

    /// Read-only access to the engine, mostly for assertions.
    pub fn inspect<T>(&self, f: impl FnOnce(&Engine) -> T) -> T {
        f(&lock(&self.engine))
    }
}
