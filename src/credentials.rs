//! Credential store lookup, keyed by service name and account.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::process::Command;

/// `security` exits with this status when no matching item exists.
const SECURITY_ITEM_NOT_FOUND: i32 = 44;

pub trait CredentialStore {
    /// Returns `Ok(None)` when the store has no secret for this service/account.
    fn lookup(&self, service: &str, account: &str) -> Result<Option<String>>;
}

/// macOS Keychain through the `security` command-line tool.
#[derive(Clone, Debug, Default)]
pub struct KeychainStore;

impl CredentialStore for KeychainStore {
    fn lookup(&self, service: &str, account: &str) -> Result<Option<String>> {
        let output = Command::new("security")
            .args(["find-generic-password", "-s", service, "-a", account, "-w"])
            .output()
            .context("failed to run `security` for keychain lookup")?;

        if output.status.success() {
            let secret = String::from_utf8(output.stdout)
                .context("keychain secret is not valid UTF-8")?
                .trim_end_matches(['\r', '\n'])
                .to_string();
            return Ok(Some(secret));
        }
        if output.status.code() == Some(SECURITY_ITEM_NOT_FOUND) {
            return Ok(None);
        }
        Err(anyhow!(
            "keychain lookup for {}/{} failed: {}",
            service,
            account,
            String::from_utf8_lossy(&output.stderr).trim()
        ))
    }
}

/// In-memory store, for secrets supplied up front.
#[derive(Clone, Debug, Default)]
pub struct StaticStore {
    secrets: HashMap<(String, String), String>,
}

impl StaticStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, service: &str, account: &str, secret: &str) -> Self {
        self.secrets
            .insert((service.to_string(), account.to_string()), secret.to_string());
        self
    }
}

impl CredentialStore for StaticStore {
    fn lookup(&self, service: &str, account: &str) -> Result<Option<String>> {
        Ok(self
            .secrets
            .get(&(service.to_string(), account.to_string()))
            .cloned())
    }
}

/// Camera credentials resolved at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Resolve camera credentials.
///
/// No username means an anonymous stream. With a username, an explicit password wins;
/// otherwise the store must know the account, and a miss is a startup failure.
pub fn resolve_credentials(
    username: Option<&str>,
    password: Option<&str>,
    service: &str,
    store: &dyn CredentialStore,
) -> Result<Option<Credentials>> {
    let Some(username) = username else {
        return Ok(None);
    };
    let password = match password {
        Some(password) => password.to_string(),
        None => store.lookup(service, username)?.ok_or_else(|| {
            anyhow!(
                "no password for camera account '{}': set CAM_PASSWORD or add a '{}' item to the credential store",
                username,
                service
            )
        })?,
    };
    Ok(Some(Credentials {
        username: username.to_string(),
        password,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_password_wins_over_store() {
        let store = StaticStore::new().with_secret("aicam", "admin", "from-store");
        let creds = resolve_credentials(Some("admin"), Some("explicit"), "aicam", &store)
            .unwrap()
            .unwrap();
        assert_eq!(creds.password, "explicit");
    }

    #[test]
    fn falls_back_to_store_and_fails_when_missing() {
        let store = StaticStore::new().with_secret("aicam", "admin", "s3cret");
        let creds = resolve_credentials(Some("admin"), None, "aicam", &store)
            .unwrap()
            .unwrap();
        assert_eq!(creds.password, "s3cret");

        assert!(resolve_credentials(Some("viewer"), None, "aicam", &store).is_err());
    }

    #[test]
    fn no_username_means_anonymous() {
        let store = StaticStore::new();
        assert!(resolve_credentials(None, None, "aicam", &store).unwrap().is_none());
    }

    #[test]
    fn debug_output_redacts_password() {
        let creds = Credentials {
            username: "admin".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
