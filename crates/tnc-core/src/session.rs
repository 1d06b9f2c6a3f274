//! Account session identity helpers.

use crate::domain::UserId;

/// Deterministic name for the persisted connection state of (owner, phone).
///
/// Re-authenticating the same pair must reuse the same state blob instead of
/// leaving orphans behind, so the name carries no random component.
pub fn derive_session_name(owner: UserId, phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    format!("session_{}_{digits}", owner.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_name_is_deterministic() {
        let a = derive_session_name(UserId(42), "+380991234567");
        let b = derive_session_name(UserId(42), "+380991234567");
        assert_eq!(a, b);
        assert_eq!(a, "session_42_380991234567");
    }

    #[test]
    fn session_name_strips_non_digits() {
        assert_eq!(
            derive_session_name(UserId(7), "+38 (099) 123-45-67"),
            "session_7_380991234567"
        );
    }

    #[test]
    fn session_name_differs_per_owner_and_phone() {
        let a = derive_session_name(UserId(1), "+380991234567");
        let b = derive_session_name(UserId(2), "+380991234567");
        let c = derive_session_name(UserId(1), "+380997654321");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
