//! Shell mounting: header and footer placed around the application anchor.
//!
//! Mounting is best-effort. Every failure is logged and reported as a
//! [`MountOutcome::Skipped`]; nothing here prevents the application from
//! starting.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{BootstrapConfig, DEFAULT_ANCHOR_ID};
use crate::document::{Document, NodeId};
use crate::error::{BootstrapError, BootstrapResult};
use crate::layout::{LayoutData, LayoutProvider};
use crate::markup::{first_element, Element};

/// Turns layout data into a markup fragment.
pub trait FragmentRenderer: Send + Sync {
    fn render(&self, layout: &LayoutData) -> String;
}

impl<F> FragmentRenderer for F
where
    F: Fn(&LayoutData) -> String + Send + Sync,
{
    fn render(&self, layout: &LayoutData) -> String {
        self(layout)
    }
}

/// Which shell fragment a placement carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellSlot {
    Header,
    Footer,
}

/// Position relative to the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Before,
    After,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub slot: ShellSlot,
    pub element: Element,
    pub relation: Relation,
    pub anchor: NodeId,
}

/// Ordered placements; header placements precede footer placements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShellPlan {
    placements: Vec<Placement>,
}

impl ShellPlan {
    pub fn build(anchor: NodeId, header: Option<Element>, footer: Option<Element>) -> Self {
        let mut placements = Vec::with_capacity(2);
        if let Some(element) = header {
            placements.push(Placement {
                slot: ShellSlot::Header,
                element,
                relation: Relation::Before,
                anchor,
            });
        }
        if let Some(element) = footer {
            placements.push(Placement {
                slot: ShellSlot::Footer,
                element,
                relation: Relation::After,
                anchor,
            });
        }
        Self { placements }
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn contains(&self, slot: ShellSlot) -> bool {
        self.placements.iter().any(|p| p.slot == slot)
    }

    /// Apply every placement. The document is left untouched on error.
    pub fn apply(&self, document: &mut Document) -> BootstrapResult<()> {
        for placement in &self.placements {
            if document.parent(placement.anchor).is_none() {
                return Err(BootstrapError::Document {
                    message: format!("anchor {:?} has no parent", placement.anchor),
                });
            }
        }

        for placement in &self.placements {
            let Some(parent) = document.parent(placement.anchor) else {
                continue;
            };
            let reference = match placement.relation {
                Relation::Before => Some(placement.anchor),
                Relation::After => document.next_sibling(placement.anchor),
            };
            let node = document.create_fragment(placement.element.clone());
            document.insert_before(parent, node, reference)?;
        }
        Ok(())
    }
}

/// Why the shell was not mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Layout data could not be obtained.
    LayoutUnavailable,
    /// Neither fragment contained an element.
    EmptyShell,
    /// No element carries the anchor id.
    AnchorMissing,
    /// The anchor has no parent to insert into.
    AnchorDetached,
    /// The document rejected the insertion.
    Document,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::LayoutUnavailable => "layout unavailable",
            Self::EmptyShell => "empty shell",
            Self::AnchorMissing => "anchor missing",
            Self::AnchorDetached => "anchor detached",
            Self::Document => "document rejected insertion",
        };
        f.write_str(s)
    }
}

/// Result of a mount attempt. Never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    Mounted { header: bool, footer: bool },
    Skipped(SkipReason),
}

impl MountOutcome {
    pub fn is_mounted(&self) -> bool {
        matches!(self, Self::Mounted { .. })
    }

    /// True for any skip or a partial shell.
    pub fn is_degraded(&self) -> bool {
        match self {
            Self::Mounted { header, footer } => !(*header && *footer),
            Self::Skipped(_) => true,
        }
    }
}

/// Fetches layout data, renders the shell and splices it around the anchor.
pub struct ShellMounter {
    provider: Arc<dyn LayoutProvider>,
    header: Arc<dyn FragmentRenderer>,
    footer: Arc<dyn FragmentRenderer>,
    anchor_id: String,
    layout_timeout: Option<Duration>,
}

impl fmt::Debug for ShellMounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellMounter")
            .field("anchor_id", &self.anchor_id)
            .field("layout_timeout", &self.layout_timeout)
            .finish_non_exhaustive()
    }
}

impl ShellMounter {
    pub fn new(
        provider: Arc<dyn LayoutProvider>,
        header: Arc<dyn FragmentRenderer>,
        footer: Arc<dyn FragmentRenderer>,
    ) -> Self {
        Self {
            provider,
            header,
            footer,
            anchor_id: DEFAULT_ANCHOR_ID.to_string(),
            layout_timeout: None,
        }
    }

    /// Mounter using the anchor id and layout bound from `config`.
    pub fn from_config(
        config: &BootstrapConfig,
        provider: Arc<dyn LayoutProvider>,
        header: Arc<dyn FragmentRenderer>,
        footer: Arc<dyn FragmentRenderer>,
    ) -> Self {
        Self::new(provider, header, footer)
            .with_anchor_id(config.anchor_id.clone())
            .with_layout_timeout(config.layout_timeout())
    }

    pub fn with_anchor_id(mut self, id: impl Into<String>) -> Self {
        self.anchor_id = id.into();
        self
    }

    pub fn with_layout_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.layout_timeout = timeout;
        self
    }

    pub fn anchor_id(&self) -> &str {
        &self.anchor_id
    }

    /// Attempt to mount the shell into `document`.
    pub async fn mount(&self, document: &mut Document) -> MountOutcome {
        let layout = match self.fetch_layout().await {
            Ok(layout) => layout,
            Err(e) => {
                warn!(error = %e, "shell layout unavailable, continuing without header/footer");
                return MountOutcome::Skipped(SkipReason::LayoutUnavailable);
            }
        };

        let header = first_element(&self.header.render(&layout));
        let footer = first_element(&self.footer.render(&layout));
        if header.is_none() {
            debug!("header fragment has no element");
        }
        if footer.is_none() {
            debug!("footer fragment has no element");
        }

        let Some(anchor) = document.get_element_by_id(&self.anchor_id) else {
            debug!(anchor_id = %self.anchor_id, "mount anchor not found");
            return MountOutcome::Skipped(SkipReason::AnchorMissing);
        };
        if document.parent(anchor).is_none() {
            debug!(anchor_id = %self.anchor_id, "mount anchor has no parent");
            return MountOutcome::Skipped(SkipReason::AnchorDetached);
        }

        let plan = ShellPlan::build(anchor, header, footer);
        if plan.is_empty() {
            return MountOutcome::Skipped(SkipReason::EmptyShell);
        }

        if let Err(e) = plan.apply(document) {
            warn!(error = %e, "shell insertion failed");
            return MountOutcome::Skipped(SkipReason::Document);
        }

        let outcome = MountOutcome::Mounted {
            header: plan.contains(ShellSlot::Header),
            footer: plan.contains(ShellSlot::Footer),
        };
        info!(anchor_id = %self.anchor_id, degraded = outcome.is_degraded(), "shell mounted");
        outcome
    }

    async fn fetch_layout(&self) -> BootstrapResult<LayoutData> {
        match self.layout_timeout {
            Some(after) => tokio::time::timeout(after, self.provider.get_header_footer())
                .await
                .map_err(|_| BootstrapError::LayoutTimeout { after })?,
            None => self.provider.get_header_footer().await,
        }
    }
}
