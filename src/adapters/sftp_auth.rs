//! SSH authentication method selection for SFTP.

use std::fmt;

use log::{debug, warn};
use ssh2::Session;

use crate::constants::ERROR_NO_AUTH_METHODS;
use crate::error::{Error, Result};
use crate::models::Credentials;

#[derive(Clone, PartialEq, Eq)]
pub enum AuthMethod {
    PublicKey {
        private_key: String,
        passphrase: Option<String>,
    },
    Password(String),
}

impl AuthMethod {
    pub fn name(&self) -> &'static str {
        match self {
            AuthMethod::PublicKey { .. } => "publickey",
            AuthMethod::Password(_) => "password",
        }
    }
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthMethod({})", self.name())
    }
}

/// Methods to try, in order: public key first, then password. Methods whose
/// material is absent are left out, so the list may be empty.
pub fn auth_methods(credentials: &Credentials) -> Vec<AuthMethod> {
    let mut methods = Vec::with_capacity(2);

    if let Some(key) = credentials.private_key() {
        methods.push(AuthMethod::PublicKey {
            private_key: key.to_string(),
            passphrase: credentials.private_key_passphrase().map(str::to_string),
        });
    }

    if let Some(password) = credentials.password() {
        methods.push(AuthMethod::Password(password.to_string()));
    }

    methods
}

/// The part of an SSH session that authentication needs. Failures are the
/// session's own; `authenticate` attaches the target.
pub trait Authenticator {
    fn try_public_key(
        &self,
        user: &str,
        private_key: &str,
        passphrase: Option<&str>,
    ) -> std::result::Result<(), ssh2::Error>;

    fn try_password(&self, user: &str, password: &str) -> std::result::Result<(), ssh2::Error>;

    fn is_authenticated(&self) -> bool;
}

impl Authenticator for Session {
    fn try_public_key(
        &self,
        user: &str,
        private_key: &str,
        passphrase: Option<&str>,
    ) -> std::result::Result<(), ssh2::Error> {
        self.userauth_pubkey_memory(user, None, private_key, passphrase)
    }

    fn try_password(&self, user: &str, password: &str) -> std::result::Result<(), ssh2::Error> {
        self.userauth_password(user, password)
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated()
    }
}

/// Try each method in order until the server accepts one.
pub fn authenticate<A: Authenticator + ?Sized>(
    session: &A,
    user: &str,
    methods: &[AuthMethod],
    target: &str,
) -> Result<()> {
    if methods.is_empty() {
        return Err(Error::authentication(target, ERROR_NO_AUTH_METHODS));
    }

    let mut failures = Vec::with_capacity(methods.len());

    for method in methods {
        let attempt = match method {
            AuthMethod::PublicKey {
                private_key,
                passphrase,
            } => session.try_public_key(user, private_key, passphrase.as_deref()),
            AuthMethod::Password(password) => session.try_password(user, password),
        };

        match attempt {
            Ok(()) if session.is_authenticated() => {
                debug!("Authenticated to {} as {} via {}", target, user, method.name());
                return Ok(());
            }
            Ok(()) => failures.push(format!("{}: rejected", method.name())),
            Err(e) => {
                debug!("{} authentication to {} failed: {}", method.name(), target, e);
                failures.push(format!("{}: {}", method.name(), e));
            }
        }
    }

    warn!("All authentication methods failed for {}", target);
    Err(Error::authentication(target, failures.join("; ")))
}
