//! Platform transport port.
//!
//! The shape mirrors what an MTProto client offers per session: connect with
//! persisted state, authorization check, the three login primitives, and the
//! contact import/delete pair the prober needs. One adapter per underlying
//! client library; `fake` ships an in-process implementation for tests and
//! development runs.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{ApiCredentials, ContactProfile, UserProfile};
use crate::errors::TransportError;

pub mod fake;

/// Device identity presented to the platform on connect.
#[derive(Clone, Debug)]
pub struct DeviceProfile {
    pub device_model: String,
    pub system_version: String,
    pub app_version: String,
}

/// A QR login token issued by the platform, rendered out-of-band.
#[derive(Clone, Debug)]
pub struct QrLogin {
    pub url: String,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish a connection, loading any persisted cryptographic state for
    /// `session_name`.
    async fn connect(
        &self,
        credentials: &ApiCredentials,
        session_name: &str,
        device: &DeviceProfile,
    ) -> Result<Arc<dyn Connection>, TransportError>;

    /// Remove the persisted cryptographic state for a session name.
    async fn purge_session_state(&self, session_name: &str) -> Result<(), TransportError>;
}

/// One live, connected client identity.
///
/// Every successful `Transport::connect` must be balanced by exactly one
/// `disconnect`, on every exit path; a leaked connection holds transport and
/// file-descriptor resources indefinitely.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Whether the platform currently recognizes this session as logged in.
    async fn is_authorized(&self) -> Result<bool, TransportError>;

    /// Ask the platform to deliver a login code to `phone`.
    async fn request_code(&self, phone: &str) -> Result<(), TransportError>;

    /// Complete a code login. Errors with [`TransportError::PasswordRequired`]
    /// when the account has two-factor authentication enabled.
    async fn sign_in_code(&self, phone: &str, code: &str) -> Result<UserProfile, TransportError>;

    /// Complete the two-factor branch of a login.
    async fn sign_in_password(&self, password: &str) -> Result<UserProfile, TransportError>;

    /// Issue a QR login token. The platform enforces the token's own expiry.
    async fn qr_login(&self) -> Result<QrLogin, TransportError>;

    /// Wait for the issued QR token to be scanned and confirmed. Errors with
    /// [`TransportError::PasswordRequired`] when 2FA gates the confirmation.
    async fn qr_wait(&self) -> Result<UserProfile, TransportError>;

    /// Import `phone` into the contact list, resolving it to a profile when
    /// the platform knows the number.
    async fn import_contact(&self, phone: &str) -> Result<Option<ContactProfile>, TransportError>;

    /// Reverse a contact import.
    async fn delete_contact(&self, user_id: i64) -> Result<(), TransportError>;

    /// Release the underlying transport.
    async fn disconnect(&self) -> Result<(), TransportError>;
}
