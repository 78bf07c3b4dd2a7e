//! Main application contract.

use async_trait::async_trait;

/// The application started once the shell attempt has completed.
#[async_trait]
pub trait Application: Send {
    /// Start the application. Errors propagate to the bootstrap caller.
    async fn init(&mut self) -> anyhow::Result<()>;
}

#[async_trait]
impl<A: Application + ?Sized> Application for Box<A> {
    async fn init(&mut self) -> anyhow::Result<()> {
        (**self).init().await
    }
}
