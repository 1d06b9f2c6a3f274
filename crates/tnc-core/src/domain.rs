use chrono::{DateTime, Utc};

/// Front-end user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Database row id of a stored account session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionRowId(pub i64);

/// Which sessions a pool operation applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    Owner(UserId),
    Global,
}

/// Platform API credential pair.
///
/// Credentials are bound to the session state they created; an upsert always
/// replaces the session name together with the credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiCredentials {
    pub api_id: i32,
    pub api_hash: String,
}

/// One authenticated account usable for probes.
#[derive(Clone, Debug)]
pub struct SessionRecord {
    pub id: SessionRowId,
    pub owner: UserId,
    pub phone: String,
    pub credentials: ApiCredentials,
    pub session_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Payload for inserting or reactivating an account session.
#[derive(Clone, Debug)]
pub struct NewSession {
    pub owner: UserId,
    pub phone: String,
    pub credentials: ApiCredentials,
    pub session_name: String,
}

/// Durable record of an in-progress login flow, enabling resumption after a
/// process restart.
#[derive(Clone, Debug)]
pub struct PendingAuth {
    pub user: UserId,
    pub phone: String,
    pub credentials: ApiCredentials,
    pub session_name: String,
    pub state: PendingState,
    pub created_at: DateTime<Utc>,
}

/// Persisted flow position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingState {
    WaitingCode,
    Waiting2fa,
}

impl PendingState {
    pub fn as_str(self) -> &'static str {
        match self {
            PendingState::WaitingCode => "waiting_code",
            PendingState::Waiting2fa => "waiting_2fa",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting_code" => Some(PendingState::WaitingCode),
            "waiting_2fa" => Some(PendingState::Waiting2fa),
            _ => None,
        }
    }
}

/// Profile of the account that completed a login step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub phone: String,
    pub first_name: Option<String>,
}

/// Profile fields resolved by a contact import.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContactProfile {
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub username: Option<String>,
}

/// One line of operator input destined for a probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchEntry {
    pub phone: String,
    pub name: String,
}

/// Result of probing one phone number against one session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    Registered {
        first_name: String,
        last_name: String,
        username: Option<String>,
    },
    NotRegistered,
    RateLimited { wait_seconds: u32 },
    SessionInvalid,
    Transient { message: String },
}

/// Message destined for the conversational front-end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outbound {
    pub user: UserId,
    pub text: String,
}
