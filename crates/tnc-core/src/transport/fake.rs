//! In-process transport implementation.
//!
//! Backs the test suite and the development runs of the service binary. The
//! scripted state covers the signals the core reacts to: registered numbers,
//! login codes and 2FA passwords, flood limits, remote logouts, and QR
//! confirmations. Connect/disconnect accounting is kept so tests can assert
//! the exactly-once disconnect contract.

use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use serde::Deserialize;

use super::{Connection, DeviceProfile, QrLogin, Transport};
use crate::domain::{ApiCredentials, ContactProfile, UserProfile};
use crate::errors::TransportError;
use crate::Result;

/// A registered account in the fake platform directory.
#[derive(Clone, Debug, Deserialize)]
pub struct DirectoryEntry {
    pub phone: String,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Default)]
struct FakeState {
    directory: HashMap<String, DirectoryEntry>,
    authorized: HashSet<String>,
    flooded: HashMap<String, u32>,
    refuse_connect: HashSet<String>,
    invalid_phones: HashSet<String>,
    login_codes: HashMap<String, String>,
    passwords: HashMap<String, String>,
    qr_confirmed: HashMap<String, UserProfile>,
    revoke_after: HashMap<String, usize>,
    fail_contact_delete: bool,

    // Accounting for assertions.
    code_requests: Vec<String>,
    connects: HashMap<String, u32>,
    disconnects: HashMap<String, u32>,
    probes: Vec<(String, String)>,
    deleted_contacts: Vec<i64>,
    purged: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a registered account to the directory.
    pub fn register(&self, entry: DirectoryEntry) {
        self.lock().directory.insert(entry.phone.clone(), entry);
    }

    /// Seed the directory from a JSON file (an array of entries).
    pub fn load_directory(&self, path: &Path) -> Result<usize> {
        let text = std::fs::read_to_string(path)?;
        let entries: Vec<DirectoryEntry> = serde_json::from_str(&text)?;
        let count = entries.len();
        let mut st = self.lock();
        for entry in entries {
            st.directory.insert(entry.phone.clone(), entry);
        }
        Ok(count)
    }

    /// Mark a session name as already logged in (as if its persisted state
    /// carried a valid authorization).
    pub fn authorize_session(&self, session_name: &str) {
        self.lock().authorized.insert(session_name.to_string());
    }

    /// Simulate a remote logout of a session.
    pub fn revoke_session(&self, session_name: &str) {
        self.lock().authorized.remove(session_name);
    }

    /// Log a session out remotely after it has served `probes` contact imports.
    pub fn revoke_session_after(&self, session_name: &str, probes: usize) {
        self.lock()
            .revoke_after
            .insert(session_name.to_string(), probes);
    }

    /// Make every probe through a session report a flood limit.
    pub fn flood_session(&self, session_name: &str, wait_seconds: u32) {
        self.lock()
            .flooded
            .insert(session_name.to_string(), wait_seconds);
    }

    /// Make connects for a session name fail at the transport level.
    pub fn refuse_connect(&self, session_name: &str) {
        self.lock().refuse_connect.insert(session_name.to_string());
    }

    /// Make code requests for a phone fail as an invalid number.
    pub fn set_invalid_phone(&self, phone: &str) {
        self.lock().invalid_phones.insert(phone.to_string());
    }

    pub fn set_login_code(&self, phone: &str, code: &str) {
        self.lock()
            .login_codes
            .insert(phone.to_string(), code.to_string());
    }

    /// Enable 2FA for a phone; code logins will demand this password.
    pub fn set_password(&self, phone: &str, password: &str) {
        self.lock()
            .passwords
            .insert(phone.to_string(), password.to_string());
    }

    /// Confirm an outstanding QR token for a session name.
    pub fn confirm_qr(&self, session_name: &str, profile: UserProfile) {
        self.lock()
            .qr_confirmed
            .insert(session_name.to_string(), profile);
    }

    pub fn fail_contact_delete(&self, fail: bool) {
        self.lock().fail_contact_delete = fail;
    }

    pub fn connect_count(&self, session_name: &str) -> u32 {
        self.lock().connects.get(session_name).copied().unwrap_or(0)
    }

    pub fn disconnect_count(&self, session_name: &str) -> u32 {
        self.lock()
            .disconnects
            .get(session_name)
            .copied()
            .unwrap_or(0)
    }

    pub fn code_requests(&self) -> Vec<String> {
        self.lock().code_requests.clone()
    }

    /// Every `(session_name, phone)` contact import attempted so far.
    pub fn probe_log(&self) -> Vec<(String, String)> {
        self.lock().probes.clone()
    }

    pub fn deleted_contacts(&self) -> Vec<i64> {
        self.lock().deleted_contacts.clone()
    }

    pub fn purged_sessions(&self) -> Vec<String> {
        self.lock().purged.clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(
        &self,
        _credentials: &ApiCredentials,
        session_name: &str,
        _device: &DeviceProfile,
    ) -> std::result::Result<Arc<dyn Connection>, TransportError> {
        {
            let mut st = self.lock();
            if st.refuse_connect.contains(session_name) {
                return Err(TransportError::Connection(format!(
                    "{session_name}: connection refused"
                )));
            }
            *st.connects.entry(session_name.to_string()).or_insert(0) += 1;
        }

        Ok(Arc::new(FakeConnection {
            state: Arc::clone(&self.state),
            session_name: session_name.to_string(),
            connected: Mutex::new(true),
            current_phone: Mutex::new(None),
        }))
    }

    async fn purge_session_state(
        &self,
        session_name: &str,
    ) -> std::result::Result<(), TransportError> {
        let mut st = self.lock();
        st.authorized.remove(session_name);
        st.purged.push(session_name.to_string());
        Ok(())
    }
}

struct FakeConnection {
    state: Arc<Mutex<FakeState>>,
    session_name: String,
    connected: Mutex<bool>,
    current_phone: Mutex<Option<String>>,
}

impl FakeConnection {
    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_open(&self) -> bool {
        *self.connected.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_current_phone(&self, phone: &str) {
        *self
            .current_phone
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(phone.to_string());
    }

    fn profile_for(st: &FakeState, phone: &str) -> UserProfile {
        UserProfile {
            phone: phone.to_string(),
            first_name: st.directory.get(phone).map(|e| e.first_name.clone()),
        }
    }
}

#[async_trait]
impl Connection for FakeConnection {
    async fn is_authorized(&self) -> std::result::Result<bool, TransportError> {
        Ok(self.lock().authorized.contains(&self.session_name))
    }

    async fn request_code(&self, phone: &str) -> std::result::Result<(), TransportError> {
        let mut st = self.lock();
        st.code_requests.push(phone.to_string());
        if st.invalid_phones.contains(phone) {
            return Err(TransportError::InvalidPhoneNumber);
        }
        if !st.login_codes.contains_key(phone) {
            // Development convenience: announce the code a real platform
            // would deliver out-of-band.
            st.login_codes
                .insert(phone.to_string(), "00000".to_string());
            tracing::info!(phone, code = "00000", "fake transport issued a login code");
        }
        drop(st);
        self.set_current_phone(phone);
        Ok(())
    }

    async fn sign_in_code(
        &self,
        phone: &str,
        code: &str,
    ) -> std::result::Result<UserProfile, TransportError> {
        let mut st = self.lock();
        match st.login_codes.get(phone) {
            Some(expected) if expected == code => {}
            _ => return Err(TransportError::Other("invalid login code".to_string())),
        }
        if st.passwords.contains_key(phone) {
            drop(st);
            self.set_current_phone(phone);
            return Err(TransportError::PasswordRequired);
        }
        st.authorized.insert(self.session_name.clone());
        Ok(Self::profile_for(&st, phone))
    }

    async fn sign_in_password(
        &self,
        password: &str,
    ) -> std::result::Result<UserProfile, TransportError> {
        let phone = self
            .current_phone
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| TransportError::Other("no login in progress".to_string()))?;

        let mut st = self.lock();
        match st.passwords.get(&phone) {
            Some(expected) if expected == password => {}
            _ => return Err(TransportError::Other("invalid password".to_string())),
        }
        st.authorized.insert(self.session_name.clone());
        Ok(Self::profile_for(&st, &phone))
    }

    async fn qr_login(&self) -> std::result::Result<QrLogin, TransportError> {
        Ok(QrLogin {
            url: format!("tg://login?token=fake-{}", self.session_name),
        })
    }

    async fn qr_wait(&self) -> std::result::Result<UserProfile, TransportError> {
        loop {
            if !self.is_open() {
                return Err(TransportError::Connection("disconnected".to_string()));
            }

            {
                let mut st = self.lock();
                if let Some(profile) = st.qr_confirmed.remove(&self.session_name) {
                    if st.passwords.contains_key(&profile.phone) {
                        drop(st);
                        self.set_current_phone(&profile.phone);
                        return Err(TransportError::PasswordRequired);
                    }
                    st.authorized.insert(self.session_name.clone());
                    return Ok(profile);
                }
            }

            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    async fn import_contact(
        &self,
        phone: &str,
    ) -> std::result::Result<Option<ContactProfile>, TransportError> {
        let mut st = self.lock();
        st.probes.push((self.session_name.clone(), phone.to_string()));

        if let Some(&limit) = st.revoke_after.get(&self.session_name) {
            let served = st
                .probes
                .iter()
                .filter(|(s, _)| s == &self.session_name)
                .count();
            if served > limit {
                let name = self.session_name.clone();
                st.authorized.remove(&name);
            }
        }

        if let Some(&wait) = st.flooded.get(&self.session_name) {
            return Err(TransportError::FloodWait { seconds: wait });
        }
        if !st.authorized.contains(&self.session_name) {
            return Err(TransportError::Unauthorized);
        }

        Ok(st.directory.get(phone).map(|entry| ContactProfile {
            user_id: phone
                .chars()
                .filter(|c| c.is_ascii_digit())
                .collect::<String>()
                .parse()
                .unwrap_or(0),
            first_name: entry.first_name.clone(),
            last_name: entry.last_name.clone(),
            username: entry.username.clone(),
        }))
    }

    async fn delete_contact(&self, user_id: i64) -> std::result::Result<(), TransportError> {
        let mut st = self.lock();
        if st.fail_contact_delete {
            return Err(TransportError::Other("contact delete failed".to_string()));
        }
        st.deleted_contacts.push(user_id);
        Ok(())
    }

    async fn disconnect(&self) -> std::result::Result<(), TransportError> {
        let mut open = self.connected.lock().unwrap_or_else(|e| e.into_inner());
        if !*open {
            return Err(TransportError::Other(
                "disconnect on a closed connection".to_string(),
            ));
        }
        *open = false;
        drop(open);

        let mut st = self.lock();
        *st.disconnects
            .entry(self.session_name.clone())
            .or_insert(0) += 1;
        Ok(())
    }
}
