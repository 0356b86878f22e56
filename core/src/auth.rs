//! Authentication context read by the request pipeline.
//!
//! The pipeline never writes session state. It receives an
//! `Arc<dyn AuthContext>` at construction and consults it on every call; the
//! sign-in/sign-out flow owns the writes.

use std::sync::{PoisonError, RwLock};

/// Read-only view of the current session.
pub trait AuthContext: Send + Sync {
    fn is_logged_in(&self) -> bool;

    fn access_token(&self) -> Option<String>;

    fn authentication_identifier(&self) -> Option<String>;

    /// Public-tier users are signed out when the engine answers 403.
    fn is_public_user(&self) -> bool;

    /// Location to return to after signing in.
    fn current_location(&self) -> String;
}

#[derive(Debug, Clone, Default)]
struct Session {
    access_token: Option<String>,
    authentication_identifier: Option<String>,
    public_user: bool,
    location: String,
}

/// Process-wide session state with a single writer (sign-in/sign-out).
#[derive(Debug, Default)]
pub struct SessionAuth {
    session: RwLock<Session>,
}

impl SessionAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(token: &str, identifier: Option<&str>) -> Self {
        let auth = Self::new();
        auth.sign_in(token, identifier, false);
        auth
    }

    pub fn sign_in(&self, token: &str, identifier: Option<&str>, public_user: bool) {
        let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
        session.access_token = Some(token.to_string());
        session.authentication_identifier = identifier.map(str::to_owned);
        session.public_user = public_user;
    }

    pub fn sign_out(&self) {
        let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
        session.access_token = None;
        session.authentication_identifier = None;
        session.public_user = false;
    }

    pub fn set_location(&self, location: &str) {
        let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
        session.location = location.to_string();
    }

    fn read(&self) -> Session {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AuthContext for SessionAuth {
    fn is_logged_in(&self) -> bool {
        self.read().access_token.is_some()
    }

    fn access_token(&self) -> Option<String> {
        self.read().access_token
    }

    fn authentication_identifier(&self) -> Option<String> {
        self.read().authentication_identifier
    }

    fn is_public_user(&self) -> bool {
        self.read().public_user
    }

    fn current_location(&self) -> String {
        self.read().location
    }
}
