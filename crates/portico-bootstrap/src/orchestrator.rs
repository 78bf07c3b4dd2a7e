//! Page-load bootstrap sequencing.
//!
//! ```text
//! WaitingForDocument -> MountingShell -> InitializingApp -> Running
//! ```
//!
//! The shell attempt always finishes before the application factory runs,
//! and its failures never stop the application from starting.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::app::Application;
use crate::config::BootstrapConfig;
use crate::document::Document;
use crate::error::{BootstrapError, BootstrapResult};
use crate::shell::{MountOutcome, ShellMounter};

/// Bootstrap phase, observable through [`BootstrapOrchestrator::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootPhase {
    WaitingForDocument,
    MountingShell,
    InitializingApp,
    Running,
}

impl fmt::Display for BootPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::WaitingForDocument => "waiting_for_document",
            Self::MountingShell => "mounting_shell",
            Self::InitializingApp => "initializing_app",
            Self::Running => "running",
        };
        f.write_str(s)
    }
}

/// One-shot "document is ready" signal.
///
/// Clones share state. Only the first [`fire`](Self::fire) has an effect.
#[derive(Debug, Clone)]
pub struct ReadySignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ReadySignal {
    /// Signal for a document that is still loading.
    pub fn loading() -> Self {
        Self {
            tx: Arc::new(watch::channel(false).0),
        }
    }

    /// Signal for a document that has already finished parsing.
    pub fn ready() -> Self {
        Self {
            tx: Arc::new(watch::channel(true).0),
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    /// Mark the document ready. Returns `false` if it already was.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|ready| !std::mem::replace(ready, true))
    }

    /// Wait until the document is ready.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting.
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

/// Summary of a successful bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootReport {
    pub mount: MountOutcome,
    /// Whether the run had to wait for the ready signal.
    pub waited_for_document: bool,
    pub elapsed: Duration,
}

/// Sequences shell mounting and application start for one page load.
#[derive(Debug)]
pub struct BootstrapOrchestrator {
    mounter: ShellMounter,
    ready: ReadySignal,
    started: AtomicBool,
    phase: watch::Sender<BootPhase>,
    dev_mode: bool,
    reloads: AtomicUsize,
}

impl BootstrapOrchestrator {
    pub fn new(mounter: ShellMounter, ready: ReadySignal) -> Self {
        Self {
            mounter,
            ready,
            started: AtomicBool::new(false),
            phase: watch::channel(BootPhase::WaitingForDocument).0,
            dev_mode: false,
            reloads: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &BootstrapConfig, mounter: ShellMounter, ready: ReadySignal) -> Self {
        Self::new(mounter, ready).with_dev_mode(config.dev_mode)
    }

    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    pub fn phase(&self) -> BootPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<BootPhase> {
        self.phase.subscribe()
    }

    fn enter(&self, phase: BootPhase) {
        debug!(%phase, "bootstrap phase");
        self.phase.send_replace(phase);
    }

    /// Run the bootstrap: wait for the document, mount the shell, start the app.
    ///
    /// `make_app` is called only after the shell attempt has completed.
    pub async fn run<A, F>(
        &self,
        document: &mut Document,
        make_app: F,
    ) -> BootstrapResult<(A, BootReport)>
    where
        A: Application,
        F: FnOnce() -> A,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(BootstrapError::AlreadyStarted);
        }
        let started_at = Instant::now();

        let waited_for_document = !self.ready.is_ready();
        if waited_for_document {
            debug!("document loading, waiting for ready signal");
            self.ready.wait().await;
        }

        self.enter(BootPhase::MountingShell);
        let mount = self.mounter.mount(document).await;

        self.enter(BootPhase::InitializingApp);
        let mut app = make_app();
        if let Err(source) = app.init().await {
            warn!(error = %source, "application init failed");
            return Err(BootstrapError::AppInit { source });
        }

        self.enter(BootPhase::Running);
        let report = BootReport {
            mount,
            waited_for_document,
            elapsed: started_at.elapsed(),
        };
        info!(
            shell_degraded = mount.is_degraded(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "application running"
        );
        Ok((app, report))
    }

    /// Accept a development module reload. No state is reset.
    ///
    /// Returns `false` outside dev mode.
    pub fn accept_reload(&self) -> bool {
        if !self.dev_mode {
            return false;
        }
        let count = self.reloads.fetch_add(1, Ordering::SeqCst) + 1;
        info!(reloads = count, "module reload accepted");
        true
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}
