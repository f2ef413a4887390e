//! Which message kinds each role may send once authenticated.

use bank_core::Role;
use bank_protocol::MessageKind;

/// Returns true if an authenticated session of `role` may send `kind`.
///
/// Every (kind, role) pair is spelled out, so adding a message kind fails
/// to compile until it is placed in this table.
pub fn is_permitted(kind: MessageKind, role: Role) -> bool {
    use MessageKind as K;

    match (kind, role) {
        // Shared by both roles
        (K::LoadProfile, _)
        | (K::LoadAccount, _)
        | (K::ExitAccount, _)
        | (K::Transaction, _)
        | (K::ShareAccount, _)
        | (K::Disconnect, _) => true,

        // Role-specific logouts
        (K::LogoutAtm | K::LogoutClient, Role::Client) => true,
        (K::LogoutAtm | K::LogoutClient, Role::Teller) => false,
        (K::LogoutTeller, Role::Teller) => true,
        (K::LogoutTeller, Role::Client) => false,

        // Teller-only administration
        (
            K::SaveProfile
            | K::CreateProfile
            | K::DeleteProfile
            | K::ExitProfile
            | K::SaveAccount
            | K::CreateAccount
            | K::DeleteAccount,
            Role::Teller,
        ) => true,
        (
            K::SaveProfile
            | K::CreateProfile
            | K::DeleteProfile
            | K::ExitProfile
            | K::SaveAccount
            | K::CreateAccount
            | K::DeleteAccount,
            Role::Client,
        ) => false,

        // Never valid inside a session
        (K::LoginClient | K::LoginTeller, _) => false,

        // Server-to-client kinds, or nothing recognizable
        (K::Success | K::Failure | K::Shutdown | K::Unknown, _) => false,
    }
}

/// Returns true for the logout kinds.
pub fn is_logout(kind: MessageKind) -> bool {
    matches!(
        kind,
        MessageKind::LogoutAtm | MessageKind::LogoutClient | MessageKind::LogoutTeller
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT_KINDS: &[MessageKind] = &[
        MessageKind::LoadProfile,
        MessageKind::LoadAccount,
        MessageKind::ExitAccount,
        MessageKind::Transaction,
        MessageKind::ShareAccount,
        MessageKind::LogoutAtm,
        MessageKind::LogoutClient,
        MessageKind::Disconnect,
    ];

    const TELLER_ONLY: &[MessageKind] = &[
        MessageKind::SaveProfile,
        MessageKind::CreateProfile,
        MessageKind::DeleteProfile,
        MessageKind::ExitProfile,
        MessageKind::SaveAccount,
        MessageKind::CreateAccount,
        MessageKind::DeleteAccount,
        MessageKind::LogoutTeller,
    ];

    #[test]
    fn test_client_permissions() {
        for kind in CLIENT_KINDS {
            assert!(is_permitted(*kind, Role::Client), "{kind} should be allowed");
        }
        for kind in TELLER_ONLY {
            assert!(!is_permitted(*kind, Role::Client), "{kind} should be denied");
        }
    }

    #[test]
    fn test_teller_permissions() {
        for kind in TELLER_ONLY {
            assert!(is_permitted(*kind, Role::Teller), "{kind} should be allowed");
        }
        assert!(is_permitted(MessageKind::Transaction, Role::Teller));
        assert!(!is_permitted(MessageKind::LogoutAtm, Role::Teller));
    }

    #[test]
    fn test_never_permitted() {
        for role in [Role::Client, Role::Teller] {
            assert!(!is_permitted(MessageKind::LoginClient, role));
            assert!(!is_permitted(MessageKind::Shutdown, role));
            assert!(!is_permitted(MessageKind::Unknown, role));
        }
    }
}
