use tracing::{info, warn};

use crate::community::CommunityRef;
use crate::error::{InviteError, PlatformError};
use crate::ledger::InvitedLedger;
use crate::model::{Recipient, RecipientStatus};
use crate::platform::PlatformClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Invited,
    Failed(PlatformError),
}

impl DispatchOutcome {
    pub fn status(&self) -> RecipientStatus {
        match self {
            DispatchOutcome::Invited => RecipientStatus::Invited,
            DispatchOutcome::Failed(err) => RecipientStatus::Failed(err.code().to_string()),
        }
    }
}

/// Enroll one recipient and record it in the ledger whatever the outcome.
///
/// The remote call is made exactly once; a rejection is never retried here and
/// the ledger entry keeps later runs from retrying it either.
pub async fn dispatch(
    platform: &dyn PlatformClient,
    destination: &CommunityRef,
    recipient: &Recipient,
    ledger: &mut InvitedLedger,
) -> DispatchOutcome {
    let outcome = match platform.enroll(destination, recipient.id).await {
        Ok(()) => {
            info!(recipient = %recipient.label(), %destination, "invited");
            DispatchOutcome::Invited
        }
        Err(error) => {
            let err = InviteError::DispatchRejected {
                recipient_id: recipient.id,
                error: error.clone(),
            };
            warn!(recipient = %recipient.label(), code = error.code(), %err, "invite failed");
            DispatchOutcome::Failed(error)
        }
    };
    ledger.record(recipient.id, recipient.display_name.as_deref());
    outcome
}
