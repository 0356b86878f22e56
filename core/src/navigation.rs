//! Navigation hook used for the executor's recovery redirects.

use std::sync::{Mutex, PoisonError};

pub const SIGN_IN_PATH: &str = "/login";
pub const PUBLIC_SIGN_OUT_PATH: &str = "/public/sign-out";

/// Full-page navigation owned by the host UI.
pub trait Navigator: Send + Sync {
    /// Path portion of the current location, without the query string.
    fn current_path(&self) -> String;

    fn navigate(&self, href: &str);
}

/// In-memory navigator for headless hosts and tests.
///
/// Keeps the current path and every href it was asked to visit.
#[derive(Debug)]
pub struct HistoryNavigator {
    state: Mutex<History>,
}

#[derive(Debug)]
struct History {
    current: String,
    visited: Vec<String>,
}

impl HistoryNavigator {
    pub fn new(current_path: &str) -> Self {
        Self {
            state: Mutex::new(History {
                current: current_path.to_string(),
                visited: Vec::new(),
            }),
        }
    }

    pub fn visited(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .visited
            .clone()
    }
}

impl Default for HistoryNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Navigator for HistoryNavigator {
    fn current_path(&self) -> String {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .clone()
    }

    fn navigate(&self, href: &str) {
        tracing::info!(href, "navigating");
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let path = href.split_once('?').map_or(href, |(path, _)| path);
        state.current = path.to_string();
        state.visited.push(href.to_string());
    }
}
