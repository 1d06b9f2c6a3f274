//! The single unit of verification work: is this phone known to the platform.

use crate::domain::{ContactProfile, ProbeOutcome, SessionRecord};
use crate::errors::TransportError;
use crate::transport::{Connection, DeviceProfile, Transport};

/// Probe one phone number through one stored session.
///
/// The connection is released on every path, and an imported contact is
/// deleted again before the outcome is returned so probes leave no residue in
/// the account's contact list.
pub async fn probe_number(
    transport: &dyn Transport,
    device: &DeviceProfile,
    session: &SessionRecord,
    phone: &str,
) -> ProbeOutcome {
    let conn = match transport
        .connect(&session.credentials, &session.session_name, device)
        .await
    {
        Ok(conn) => conn,
        Err(e) => {
            return ProbeOutcome::Transient {
                message: e.to_string(),
            }
        }
    };

    let outcome = run_probe(conn.as_ref(), phone).await;

    if let Err(e) = conn.disconnect().await {
        tracing::warn!(session = %session.session_name, "disconnect failed: {e}");
    }

    outcome
}

async fn run_probe(conn: &dyn Connection, phone: &str) -> ProbeOutcome {
    match conn.is_authorized().await {
        Ok(true) => {}
        Ok(false) => return ProbeOutcome::SessionInvalid,
        Err(e) => return outcome_for(e),
    }

    match conn.import_contact(phone).await {
        Ok(Some(contact)) => {
            cleanup_contact(conn, phone, &contact).await;
            ProbeOutcome::Registered {
                first_name: contact.first_name,
                last_name: contact.last_name,
                username: contact.username,
            }
        }
        Ok(None) => ProbeOutcome::NotRegistered,
        Err(e) => outcome_for(e),
    }
}

async fn cleanup_contact(conn: &dyn Connection, phone: &str, contact: &ContactProfile) {
    if let Err(e) = conn.delete_contact(contact.user_id).await {
        tracing::warn!(phone, "contact cleanup failed: {e}");
    }
}

fn outcome_for(e: TransportError) -> ProbeOutcome {
    match e {
        TransportError::FloodWait { seconds } => ProbeOutcome::RateLimited {
            wait_seconds: seconds,
        },
        TransportError::Unauthorized => ProbeOutcome::SessionInvalid,
        other => ProbeOutcome::Transient {
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ApiCredentials, SessionRowId, UserId};
    use crate::transport::fake::{DirectoryEntry, FakeTransport};
    use chrono::Utc;

    fn session(name: &str) -> SessionRecord {
        SessionRecord {
            id: SessionRowId(1),
            owner: UserId(1),
            phone: "+380000000000".to_string(),
            credentials: ApiCredentials {
                api_id: 1,
                api_hash: "h".to_string(),
            },
            session_name: name.to_string(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn device() -> DeviceProfile {
        DeviceProfile {
            device_model: "Test".to_string(),
            system_version: "1".to_string(),
            app_version: "1".to_string(),
        }
    }

    fn registered_fake() -> FakeTransport {
        let fake = FakeTransport::default();
        fake.authorize_session("s1");
        fake.register(DirectoryEntry {
            phone: "+380991234567".to_string(),
            first_name: "Ivan".to_string(),
            last_name: "Petrov".to_string(),
            username: Some("ivanp".to_string()),
        });
        fake
    }

    #[tokio::test]
    async fn registered_number_yields_profile_and_cleanup() {
        let fake = registered_fake();
        let outcome = probe_number(&fake, &device(), &session("s1"), "+380991234567").await;

        assert_eq!(
            outcome,
            ProbeOutcome::Registered {
                first_name: "Ivan".to_string(),
                last_name: "Petrov".to_string(),
                username: Some("ivanp".to_string()),
            }
        );
        assert_eq!(fake.deleted_contacts(), vec![380991234567]);
        assert_eq!(fake.connect_count("s1"), 1);
        assert_eq!(fake.disconnect_count("s1"), 1);
    }

    #[tokio::test]
    async fn failed_cleanup_does_not_change_the_outcome() {
        let fake = registered_fake();
        fake.fail_contact_delete(true);

        let outcome = probe_number(&fake, &device(), &session("s1"), "+380991234567").await;
        assert!(matches!(outcome, ProbeOutcome::Registered { .. }));
        assert_eq!(fake.disconnect_count("s1"), 1);
    }

    #[tokio::test]
    async fn unknown_number_is_not_registered() {
        let fake = registered_fake();
        let outcome = probe_number(&fake, &device(), &session("s1"), "+447700900000").await;
        assert_eq!(outcome, ProbeOutcome::NotRegistered);
        assert!(fake.deleted_contacts().is_empty());
        assert_eq!(fake.disconnect_count("s1"), 1);
    }

    #[tokio::test]
    async fn unauthorized_session_is_invalid_and_still_disconnects() {
        let fake = FakeTransport::default();
        let outcome = probe_number(&fake, &device(), &session("s1"), "+380991234567").await;
        assert_eq!(outcome, ProbeOutcome::SessionInvalid);
        assert_eq!(fake.connect_count("s1"), 1);
        assert_eq!(fake.disconnect_count("s1"), 1);
    }

    #[tokio::test]
    async fn flood_wait_maps_to_rate_limited() {
        let fake = registered_fake();
        fake.flood_session("s1", 420);
        let outcome = probe_number(&fake, &device(), &session("s1"), "+380991234567").await;
        assert_eq!(outcome, ProbeOutcome::RateLimited { wait_seconds: 420 });
        assert_eq!(fake.disconnect_count("s1"), 1);
    }

    #[tokio::test]
    async fn connect_failure_is_transient() {
        let fake = FakeTransport::default();
        fake.refuse_connect("s1");
        let outcome = probe_number(&fake, &device(), &session("s1"), "+380991234567").await;
        assert!(matches!(outcome, ProbeOutcome::Transient { .. }));
        assert_eq!(fake.connect_count("s1"), 0);
        assert_eq!(fake.disconnect_count("s1"), 0);
    }
}
