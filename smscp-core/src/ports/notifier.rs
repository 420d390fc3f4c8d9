//! Notification port - outbound message delivery (SMS echo, reset links)

use crate::domain::result::Result;

/// Delivers a text to an address (a phone number for SMS senders)
pub trait NotificationSender: Send + Sync {
    fn send(&self, destination: &str, text: &str) -> Result<()>;
}
