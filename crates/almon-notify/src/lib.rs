//! Outbound SMS delivery.
//!
//! The dispatcher consumes the [`SmsSender`] trait; [`gateway::SmsGatewayClient`]
//! is the HTTP implementation against a REST SMS gateway.

pub mod error;
pub mod gateway;


use async_trait::async_trait;

use almon_common::types::ApiCredential;
use error::SendError;

/// An SMS delivery backend.
///
/// `send` delivers one message to one recipient and returns the gateway's
/// message id. Retry policy is the caller's concern: a failed send is
/// reported once and not retried within the same dispatch.
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(
        &self,
        creds: &ApiCredential,
        to: &str,
        body: &str,
    ) -> Result<String, SendError>;

    /// Verifies the stored credentials against the gateway account endpoint.
    async fn check_connection(&self, creds: &ApiCredential) -> bool;
}
