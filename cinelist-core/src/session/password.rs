use std::time::Duration;

use crate::error::PasswordResetError;

/// Checks a new password and its confirmation before anything is sent to the
/// backend.
pub fn validate_new_password(
    new_password: &str,
    confirmation: &str,
    min_len: usize,
) -> Result<(), PasswordResetError> {
    if new_password.is_empty() {
        return Err(PasswordResetError::Empty);
    }
    if new_password.chars().count() < min_len {
        return Err(PasswordResetError::TooShort { min: min_len });
    }
    if new_password != confirmation {
        return Err(PasswordResetError::Mismatch);
    }
    Ok(())
}

/// Loose shape check; the backend does the real validation.
pub fn validate_email(email: &str) -> Result<(), PasswordResetError> {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(PasswordResetError::InvalidEmail);
    };
    let domain_ok = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.');
    if local.is_empty() || !domain_ok || email.contains(char::is_whitespace) {
        return Err(PasswordResetError::InvalidEmail);
    }
    Ok(())
}

/// Instruction to send the user to the login screen once `delay` has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginRedirect {
    delay: Duration,
}

impl LoginRedirect {
    pub(crate) fn after(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Sleeps until the redirect is due.
    pub async fn wait(self) {
        tokio::time::sleep(self.delay).await;
    }
}
