use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Domain appended to bare usernames so one credential backend serves both
/// username and email login.
pub const LOCAL_IDENTIFIER_DOMAIN: &str = "dayline.local";

const MIN_PASSWORD_CHARS: usize = 6;
const ACCOUNTS_FILE: &str = "accounts.data";

/// The authenticated user as reported by the identity provider. Never written
/// into the task record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl Identity {
    /// Preferred human-facing label: display name, else email, else raw id.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }
}

/// Authentication failures. Always surfaced as a user-visible message and
/// recoverable by retrying; never silently swallowed.
#[derive(Debug)]
pub enum AuthError {
    MissingCredentials,
    InvalidCredentials,
    DuplicateAccount(String),
    WeakPassword { minimum: usize },
    ProviderCancelled,
    ProviderUnavailable(String),
    Backend(String),
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCredentials => write!(f, "enter email/username and password"),
            Self::InvalidCredentials => write!(f, "invalid email/username or password"),
            Self::DuplicateAccount(email) => {
                write!(f, "an account already exists for {email}")
            }
            Self::WeakPassword { minimum } => {
                write!(f, "password must be at least {minimum} characters")
            }
            Self::ProviderCancelled => write!(f, "sign-in was cancelled"),
            Self::ProviderUnavailable(message) => write!(f, "{message}"),
            Self::Backend(message) => write!(f, "authentication failed: {message}"),
        }
    }
}

impl Error for AuthError {}

/// Seam to the external identity service. Callers pass already-normalized
/// email addresses; see [`normalize_identifier`].
pub trait IdentityProvider {
    fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Identity, AuthError>;

    fn sign_in_federated(&self) -> Result<Identity, AuthError>;
}

/// Canonicalizes a login identifier: trim and lowercase, and treat values
/// without an `@` as usernames on the fixed local domain.
pub fn normalize_identifier(identifier: &str) -> String {
    let value = identifier.trim().to_lowercase();
    if value.contains('@') {
        value
    } else {
        format!("{value}@{LOCAL_IDENTIFIER_DOMAIN}")
    }
}

/// Process-wide current-identity state. Downstream components observe the
/// identity through [`Session::current_user`]; sign-out clears it.
#[derive(Debug)]
pub struct Session<P> {
    provider: P,
    current: Option<Identity>,
}

impl<P: IdentityProvider> Session<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            current: None,
        }
    }

    pub fn current_user(&self) -> Option<&Identity> {
        self.current.as_ref()
    }

    /// Restores an identity established earlier (the provider's equivalent of
    /// an auth-state-changed event on startup).
    pub fn resume(&mut self, identity: Identity) -> &Identity {
        debug!(user_id = %identity.id, "resumed session");
        self.current.insert(identity)
    }

    pub fn sign_in_with_credentials(
        &mut self,
        identifier: &str,
        password: &str,
    ) -> Result<&Identity, AuthError> {
        if identifier.trim().is_empty() || password.trim().is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let email = normalize_identifier(identifier);
        let identity = self.provider.sign_in(&email, password)?;
        info!(user_id = %identity.id, "signed in");
        Ok(self.current.insert(identity))
    }

    pub fn sign_up_with_credentials(
        &mut self,
        identifier: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<&Identity, AuthError> {
        if identifier.trim().is_empty() || password.trim().is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let email = normalize_identifier(identifier);
        let display_name = display_name.map(str::trim).filter(|name| !name.is_empty());
        let identity = self.provider.sign_up(&email, password, display_name)?;
        info!(user_id = %identity.id, "account created");
        Ok(self.current.insert(identity))
    }

    pub fn sign_in_with_federated_provider(&mut self) -> Result<&Identity, AuthError> {
        let identity = self.provider.sign_in_federated()?;
        info!(user_id = %identity.id, "signed in via federated provider");
        Ok(self.current.insert(identity))
    }

    pub fn sign_out(&mut self) {
        if let Some(identity) = self.current.take() {
            info!(user_id = %identity.id, "signed out");
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccountRecord {
    user_id: String,
    email: String,
    password_digest: String,
    display_name: Option<String>,
}

impl AccountRecord {
    fn identity(&self) -> Identity {
        Identity {
            id: self.user_id.clone(),
            display_name: self.display_name.clone(),
            email: Some(self.email.clone()),
        }
    }
}

/// File-backed development stand-in for the external identity service.
/// Accounts live as JSON lines under the data dir with sha256 password
/// digests; ids are stable per account.
#[derive(Debug)]
pub struct LocalDirectoryProvider {
    accounts_path: PathBuf,
}

impl LocalDirectoryProvider {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let accounts_path = data_dir.join(ACCOUNTS_FILE);
        if !accounts_path.exists() {
            fs::write(&accounts_path, "")
                .with_context(|| format!("failed to create {}", accounts_path.display()))?;
        }
        debug!(accounts = %accounts_path.display(), "opened account directory");
        Ok(Self { accounts_path })
    }

    /// Looks up the identity for a previously issued user id.
    pub fn lookup(&self, user_id: &str) -> Result<Option<Identity>, AuthError> {
        let accounts = self.load_accounts()?;
        Ok(accounts
            .iter()
            .find(|record| record.user_id == user_id)
            .map(AccountRecord::identity))
    }

    fn load_accounts(&self) -> Result<Vec<AccountRecord>, AuthError> {
        let file = fs::File::open(&self.accounts_path)
            .map_err(|err| AuthError::Backend(err.to_string()))?;
        let reader = BufReader::new(file);

        let mut out = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|err| AuthError::Backend(err.to_string()))?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let record: AccountRecord = serde_json::from_str(trimmed).map_err(|err| {
                AuthError::Backend(format!("account record line {} invalid: {err}", idx + 1))
            })?;
            out.push(record);
        }

        Ok(out)
    }

    fn save_accounts(&self, accounts: &[AccountRecord]) -> Result<(), AuthError> {
        let dir = self
            .accounts_path
            .parent()
            .unwrap_or_else(|| Path::new("."));
        let write = || -> anyhow::Result<()> {
            let mut temp = NamedTempFile::new_in(dir)?;
            for record in accounts {
                let serialized = serde_json::to_string(record)?;
                writeln!(temp, "{serialized}")?;
            }
            temp.flush()?;
            temp.persist(&self.accounts_path)?;
            Ok(())
        };
        write().map_err(|err| AuthError::Backend(err.to_string()))
    }
}

impl IdentityProvider for LocalDirectoryProvider {
    fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let accounts = self.load_accounts()?;
        let digest = password_digest(password);

        accounts
            .iter()
            .find(|record| record.email == email && record.password_digest == digest)
            .map(AccountRecord::identity)
            .ok_or(AuthError::InvalidCredentials)
    }

    fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Identity, AuthError> {
        if password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(AuthError::WeakPassword {
                minimum: MIN_PASSWORD_CHARS,
            });
        }

        let mut accounts = self.load_accounts()?;
        if accounts.iter().any(|record| record.email == email) {
            warn!(email, "sign-up rejected: duplicate account");
            return Err(AuthError::DuplicateAccount(email.to_string()));
        }

        let record = AccountRecord {
            user_id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            password_digest: password_digest(password),
            display_name: display_name.map(str::to_string),
        };
        let identity = record.identity();
        accounts.push(record);
        self.save_accounts(&accounts)?;

        Ok(identity)
    }

    fn sign_in_federated(&self) -> Result<Identity, AuthError> {
        Err(AuthError::ProviderUnavailable(
            "federated sign-in is not available with the local account directory".to_string(),
        ))
    }
}

fn password_digest(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::{
        AuthError, Identity, IdentityProvider, LOCAL_IDENTIFIER_DOMAIN, LocalDirectoryProvider,
        Session, normalize_identifier,
    };

    struct FakeProvider {
        cancel_federated: bool,
    }

    impl IdentityProvider for FakeProvider {
        fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
            if email == "alice@dayline.local" && password == "hunter22" {
                Ok(Identity {
                    id: "uid-alice".to_string(),
                    display_name: Some("Alice".to_string()),
                    email: Some(email.to_string()),
                })
            } else {
                Err(AuthError::InvalidCredentials)
            }
        }

        fn sign_up(
            &self,
            email: &str,
            _password: &str,
            display_name: Option<&str>,
        ) -> Result<Identity, AuthError> {
            Ok(Identity {
                id: "uid-new".to_string(),
                display_name: display_name.map(str::to_string),
                email: Some(email.to_string()),
            })
        }

        fn sign_in_federated(&self) -> Result<Identity, AuthError> {
            if self.cancel_federated {
                Err(AuthError::ProviderCancelled)
            } else {
                Ok(Identity {
                    id: "uid-federated".to_string(),
                    display_name: None,
                    email: None,
                })
            }
        }
    }

    #[test]
    fn normalization_canonicalizes_bare_usernames() {
        assert_eq!(
            normalize_identifier("  Alice "),
            format!("alice@{LOCAL_IDENTIFIER_DOMAIN}")
        );
        assert_eq!(normalize_identifier("Bob@Example.COM"), "bob@example.com");
    }

    #[test]
    fn session_tracks_sign_in_and_sign_out() {
        let mut session = Session::new(FakeProvider {
            cancel_federated: false,
        });
        assert!(session.current_user().is_none());

        session
            .sign_in_with_credentials("Alice", "hunter22")
            .expect("sign in with bare username");
        assert_eq!(
            session.current_user().map(|identity| identity.id.as_str()),
            Some("uid-alice")
        );

        session.sign_out();
        assert!(session.current_user().is_none());
    }

    #[test]
    fn blank_credentials_are_rejected_before_the_provider() {
        let mut session = Session::new(FakeProvider {
            cancel_federated: false,
        });
        let err = session
            .sign_in_with_credentials("   ", "pw")
            .expect_err("blank identifier must fail");
        assert!(matches!(err, AuthError::MissingCredentials));
    }

    #[test]
    fn federated_cancellation_surfaces_and_leaves_session_empty() {
        let mut session = Session::new(FakeProvider {
            cancel_federated: true,
        });
        let err = session
            .sign_in_with_federated_provider()
            .expect_err("cancelled federated sign-in must fail");
        assert!(matches!(err, AuthError::ProviderCancelled));
        assert!(session.current_user().is_none());
    }

    #[test]
    fn local_directory_round_trips_accounts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let provider = LocalDirectoryProvider::open(temp.path()).expect("open provider");

        let created = provider
            .sign_up("carol@dayline.local", "secret7", Some("Carol"))
            .expect("sign up");
        assert_eq!(created.email.as_deref(), Some("carol@dayline.local"));

        let signed_in = provider
            .sign_in("carol@dayline.local", "secret7")
            .expect("sign in");
        assert_eq!(signed_in.id, created.id);

        let looked_up = provider
            .lookup(&created.id)
            .expect("lookup")
            .expect("account exists");
        assert_eq!(looked_up.display_name.as_deref(), Some("Carol"));

        let err = provider
            .sign_in("carol@dayline.local", "wrong-pw")
            .expect_err("wrong password must fail");
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[test]
    fn duplicate_and_weak_sign_ups_fail() {
        let temp = tempfile::tempdir().expect("tempdir");
        let provider = LocalDirectoryProvider::open(temp.path()).expect("open provider");

        provider
            .sign_up("dave@dayline.local", "secret7", None)
            .expect("first sign up");

        let dup = provider
            .sign_up("dave@dayline.local", "other-pw", None)
            .expect_err("duplicate must fail");
        assert!(matches!(dup, AuthError::DuplicateAccount(_)));

        let weak = provider
            .sign_up("erin@dayline.local", "short", None)
            .expect_err("weak password must fail");
        assert!(matches!(weak, AuthError::WeakPassword { minimum: 6 }));
    }
}
