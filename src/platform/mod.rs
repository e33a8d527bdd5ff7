//! Messaging platform seam. The orchestrator only ever talks to
//! [`PlatformClient`]; [`GatewayClient`] is the HTTP-backed implementation.
use async_trait::async_trait;

use crate::community::CommunityRef;
use crate::error::PlatformError;
use crate::model::Recipient;

pub mod gateway;
pub mod model;

pub use gateway::GatewayClient;

#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Current membership of a group or channel.
    async fn list_members(&self, community: &CommunityRef)
        -> Result<Vec<Recipient>, PlatformError>;

    /// Add the recipient to the operator's contacts.
    async fn add_contact(&self, recipient: &Recipient) -> Result<(), PlatformError>;

    /// Enroll one user into the destination. Called exactly once per dispatch.
    async fn enroll(
        &self,
        destination: &CommunityRef,
        recipient_id: i64,
    ) -> Result<(), PlatformError>;

    /// Look a phone number up as a platform user; `None` when nobody is
    /// registered under it.
    async fn resolve_phone(&self, phone: &str) -> Result<Option<Recipient>, PlatformError>;
}
