//! Authenticated session context.
//!
//! A `Session` is produced by a successful login, handed by reference to every
//! read and mutation, and consumed by logout. Views never mutate it.

use std::fmt;

use serde::{Deserialize, Serialize};
use shared::{plan::PlanTier, protocol::Account};

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    token: AccessToken,
    account: Account,
}

impl Session {
    pub fn new(token: AccessToken, account: Account) -> Self {
        Self { token, account }
    }

    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn plan(&self) -> PlanTier {
        self.account.plan
    }
}
