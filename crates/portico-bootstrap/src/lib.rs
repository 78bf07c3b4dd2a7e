//! Progressive shell bootstrap.
//!
//! Assembles the page shell (header and footer) around the application mount
//! anchor before the main application starts. Shell assembly is best-effort:
//! layout, rendering and anchor failures degrade the page, they never block
//! the application.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use portico_bootstrap::{
//!     Application, BootstrapConfig, BootstrapOrchestrator, Document, LayoutData, ReadySignal,
//!     ShellMounter,
//! };
//!
//! struct App;
//!
//! #[async_trait::async_trait]
//! impl Application for App {
//!     async fn init(&mut self) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = BootstrapConfig::from_env();
//! let provider = Arc::new(config.layout_provider()?);
//! let header = Arc::new(|l: &LayoutData| format!("<header>{}</header>", l.str_field("title").unwrap_or("")));
//! let footer = Arc::new(|_: &LayoutData| "<footer></footer>".to_string());
//! let mounter = ShellMounter::from_config(&config, provider, header, footer);
//!
//! let orchestrator = BootstrapOrchestrator::from_config(&config, mounter, ReadySignal::ready());
//! let mut document = Document::with_anchor(&config.anchor_id);
//! let (_app, report) = orchestrator.run(&mut document, || App).await?;
//! println!("shell degraded: {}", report.mount.is_degraded());
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod config;
pub mod document;
pub mod error;
pub mod layout;
pub mod markup;
pub mod orchestrator;
pub mod shell;

pub use app::Application;
pub use config::{BootstrapConfig, DEFAULT_ANCHOR_ID};
pub use document::{Document, NodeId};
pub use error::{BootstrapError, BootstrapResult};
pub use layout::{HttpLayoutProvider, LayoutData, LayoutProvider};
pub use markup::{first_element, Element};
pub use orchestrator::{BootPhase, BootReport, BootstrapOrchestrator, ReadySignal};
pub use shell::{
    FragmentRenderer, MountOutcome, Placement, Relation, ShellMounter, ShellPlan, ShellSlot,
    SkipReason,
};
