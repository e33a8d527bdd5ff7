use tracing::{info, warn};

use crate::error::InviteError;
use crate::model::{BridgeOutcome, Recipient};
use crate::platform::PlatformClient;

/// Make sure the recipient is a contact before enrollment is attempted.
///
/// Never fails the run: every non-linked result is logged and the caller
/// proceeds to dispatch regardless.
pub async fn ensure_contact(platform: &dyn PlatformClient, recipient: &Recipient) -> BridgeOutcome {
    if recipient.mutual_contact {
        return BridgeOutcome::AlreadyLinked;
    }
    let has_phone = recipient
        .phone
        .as_deref()
        .is_some_and(|p| !p.trim().is_empty());
    if !has_phone {
        let err = InviteError::BridgeUnavailable {
            recipient_id: recipient.id,
        };
        info!(recipient = %recipient.label(), %err, "continuing without contact bridge");
        return BridgeOutcome::Unavailable;
    }
    match platform.add_contact(recipient).await {
        Ok(()) => {
            info!(recipient_id = recipient.id, "added contact");
            BridgeOutcome::Linked
        }
        Err(err) => {
            warn!(recipient_id = recipient.id, %err, "failed to add contact");
            BridgeOutcome::Failed
        }
    }
}
