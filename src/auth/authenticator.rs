use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::Account;
use crate::error::AppError;

use super::ConsoleUser;

/// Checks a login attempt. `Ok(None)` means the credentials were wrong.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, email: &str, password: &str) -> Result<Option<ConsoleUser>, AppError>;
}

pub type SharedAuthenticator = Arc<dyn Authenticator>;

/// Authenticates against the accounts listed in configuration.
pub struct CredentialAuthenticator {
    accounts: Vec<Account>,
}

impl CredentialAuthenticator {
    pub fn new(accounts: Vec<Account>) -> Self {
        Self { accounts }
    }
}

impl Authenticator for CredentialAuthenticator {
    #[instrument(skip_all, fields(email = %email))]
    fn authenticate(&self, email: &str, password: &str) -> Result<Option<ConsoleUser>, AppError> {
        let Some(account) = self
            .accounts
            .iter()
            .find(|a| a.email.eq_ignore_ascii_case(email.trim()))
        else {
            info!("Unknown account");
            return Ok(None);
        };

        match bcrypt::verify(password, &account.password_hash) {
            Ok(true) => Ok(Some(ConsoleUser {
                email: account.email.clone(),
                role: account.role,
            })),
            Ok(false) => Ok(None),
            Err(e) => {
                warn!(error = %e, "Stored password hash could not be checked");
                Ok(None)
            }
        }
    }
}
