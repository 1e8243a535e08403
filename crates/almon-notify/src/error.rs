/// Errors that can occur while sending a notification.
///
/// # Examples
///
/// ```rust
/// use almon_notify::error::SendError;
///
/// let err = SendError::Auth("account suspended".to_string());
/// assert!(err.to_string().contains("account suspended"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The gateway rejected the stored credentials.
    #[error("SMS: authentication failed: {0}")]
    Auth(String),

    /// An HTTP request to the gateway failed outright.
    #[error("SMS: HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway returned a non-success response.
    #[error("SMS: gateway error: status={status}, body={body}")]
    Api { status: u16, body: String },

    /// The gateway response was not the expected JSON shape.
    #[error("SMS: malformed gateway response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Convenience `Result` alias for send operations.
pub type Result<T> = std::result::Result<T, SendError>;
