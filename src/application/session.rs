use crate::domain::Account;

use super::AppError;

/// Who is at the machine. Passed explicitly to whatever drives the
/// service; there is no process-wide "current account".
#[derive(Debug, Clone, Default)]
pub enum Session {
    #[default]
    Anonymous,
    Authenticated(Account),
}

impl Session {
    pub fn login(&mut self, account: Account) {
        *self = Session::Authenticated(account);
    }

    /// End the session, returning the account that was logged in.
    pub fn logout(&mut self) -> Option<Account> {
        match std::mem::take(self) {
            Session::Authenticated(account) => Some(account),
            Session::Anonymous => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated(_))
    }

    pub fn account(&self) -> Option<&Account> {
        match self {
            Session::Authenticated(account) => Some(account),
            Session::Anonymous => None,
        }
    }

    pub fn require(&self) -> Result<&Account, AppError> {
        self.account().ok_or(AppError::NotAuthenticated)
    }

    /// Replace the cached account snapshot after an operation. Ignored when
    /// the account belongs to someone else or nobody is logged in.
    pub fn refresh(&mut self, account: Account) {
        if let Session::Authenticated(current) = self {
            if current.account_id == account.account_id {
                *current = account;
            }
        }
    }
}
