use super::Account;

/// Who is making a request.
///
/// `Anonymous` is the fixed sentinel for requests without credentials. It has
/// no id and no role, is never persisted and is never granted a permission.
#[derive(Debug, Clone)]
pub enum Identity {
    Anonymous,
    Account(Box<Account>),
}

impl Identity {
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    #[must_use]
    pub fn account(&self) -> Option<&Account> {
        match self {
            Self::Anonymous => None,
            Self::Account(account) => Some(account),
        }
    }
}

impl From<Account> for Identity {
    fn from(account: Account) -> Self {
        Self::Account(Box::new(account))
    }
}
