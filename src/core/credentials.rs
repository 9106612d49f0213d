use keyring::Entry;
use tracing::warn;

const KEYRING_SERVICE: &str = "causerie";
const KEYRING_USER: &str = "api-credential";

/// Supplies the opaque bearer credential attached to outgoing requests.
///
/// Absence is meaningful: a transport with no credential refuses to start a
/// network exchange. Implementations decide where the string lives; the
/// transport only ever asks for the current value, so tests can inject a
/// fake without any shared global state.
pub trait CredentialProvider {
    fn get(&self) -> Option<String>;

    /// Store a new credential. An empty string clears the stored value.
    fn set(&mut self, credential: &str);
}

/// Credential held in process memory only.
#[derive(Default, Clone, Debug)]
pub struct MemoryCredentialStore {
    credential: Option<String>,
}

impl MemoryCredentialStore {
    pub fn new(credential: impl Into<String>) -> Self {
        let mut store = Self::default();
        store.set(&credential.into());
        store
    }
}

impl CredentialProvider for MemoryCredentialStore {
    fn get(&self) -> Option<String> {
        self.credential.clone()
    }

    fn set(&mut self, credential: &str) {
        if credential.is_empty() {
            self.credential = None;
        } else {
            self.credential = Some(credential.to_owned());
        }
    }
}

/// Credential persisted in the platform keyring.
///
/// Keyring outages are tolerated: a failed read behaves as an absent
/// credential and a failed write is logged, so a locked keychain leaves the
/// client in its unconfigured state instead of failing hard.
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self {
            service: KEYRING_SERVICE.to_owned(),
        }
    }

    /// Use a custom keyring service name, for embedders that share a
    /// keyring namespace across tools.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self) -> keyring::Result<Entry> {
        Entry::new(&self.service, KEYRING_USER)
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialProvider for KeyringCredentialStore {
    fn get(&self) -> Option<String> {
        let entry = match self.entry() {
            Ok(entry) => entry,
            Err(err) => {
                warn!("keyring unavailable: {err}");
                return None;
            }
        };
        match entry.get_password() {
            Ok(credential) => Some(credential),
            Err(keyring::Error::NoEntry) => None,
            Err(err) => {
                warn!("keyring read failed: {err}");
                None
            }
        }
    }

    fn set(&mut self, credential: &str) {
        let entry = match self.entry() {
            Ok(entry) => entry,
            Err(err) => {
                warn!("keyring unavailable: {err}");
                return;
            }
        };
        let result = if credential.is_empty() {
            match entry.delete_credential() {
                Err(keyring::Error::NoEntry) => Ok(()),
                other => other,
            }
        } else {
            entry.set_password(credential)
        };
        if let Err(err) = result {
            warn!("keyring write failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_starts_empty() {
        let store = MemoryCredentialStore::default();
        assert_eq!(store.get(), None);
    }

    #[test]
    fn memory_store_round_trips_a_credential() {
        let mut store = MemoryCredentialStore::default();
        store.set("sk-test");
        assert_eq!(store.get(), Some("sk-test".to_string()));
    }

    #[test]
    fn empty_string_clears_the_credential() {
        let mut store = MemoryCredentialStore::new("sk-test");
        store.set("");
        assert_eq!(store.get(), None);
    }
}
