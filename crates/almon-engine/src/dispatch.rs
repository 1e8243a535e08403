use almon_common::types::{ApiCredential, Contact};
use almon_notify::SmsSender;
use std::sync::Arc;

/// Fans one message out to the whole active-contact roster.
///
/// A failed send is logged and the remaining contacts are still attempted;
/// the call never fails outward and never retries — a contact missed here
/// is only reached again by the next qualifying dispatch.
pub struct Dispatcher {
    sender: Arc<dyn SmsSender>,
}

impl Dispatcher {
    pub fn new(sender: Arc<dyn SmsSender>) -> Self {
        Self { sender }
    }

    /// Returns the number of successful deliveries.
    pub async fn dispatch(
        &self,
        creds: &ApiCredential,
        contacts: &[Contact],
        message: &str,
    ) -> usize {
        let mut delivered = 0;
        for contact in contacts {
            match self.sender.send(creds, &contact.phone_number, message).await {
                Ok(message_id) => {
                    tracing::info!(
                        to = %contact.phone_number,
                        message_id = %message_id,
                        "Notification sent"
                    );
                    delivered += 1;
                }
                Err(e) => {
                    tracing::error!(
                        to = %contact.phone_number,
                        error = %e,
                        "Failed to send notification"
                    );
                }
            }
        }
        delivered
    }
}
