//! Login directory.
//!
//! Tracks which identities are logged in and which of those have a live
//! socket. An identity can be held by one login at a time; the channel engine
//! relies on this but does not check it.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info};

/// Login errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoginError {
    /// No identity given.
    #[error("Identity required")]
    Empty,

    /// Identity exceeds the configured length.
    #[error("Identity longer than {0} bytes")]
    TooLong(usize),

    /// Another login holds this identity.
    #[error("Identity already in use: {0}")]
    InUse(String),

    #[error("Not logged in: {0}")]
    NotLoggedIn(String),

    /// A socket is already open for this identity.
    #[error("Identity already connected: {0}")]
    AlreadyConnected(String),

    /// Logout refused while a socket is open.
    #[error("Identity still connected: {0}")]
    StillConnected(String),
}

/// Logged-in identities, each flagged while it has a socket.
#[derive(Debug)]
pub struct Lobby {
    identities: DashMap<String, bool>,
    max_identity_length: usize,
}

impl Lobby {
    /// Create an empty lobby.
    #[must_use]
    pub fn new(max_identity_length: usize) -> Self {
        Self {
            identities: DashMap::new(),
            max_identity_length,
        }
    }

    /// Log in `requested`, trimmed of surrounding whitespace.
    ///
    /// Returns the identity as stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity is empty, too long or already taken.
    pub fn login(&self, requested: &str) -> Result<String, LoginError> {
        let identity = requested.trim();
        if identity.is_empty() {
            return Err(LoginError::Empty);
        }
        if identity.len() > self.max_identity_length {
            return Err(LoginError::TooLong(self.max_identity_length));
        }
        match self.identities.entry(identity.to_string()) {
            Entry::Occupied(_) => return Err(LoginError::InUse(identity.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(false);
            }
        }

        info!(identity = %identity, "Logged in");
        Ok(identity.to_string())
    }

    /// Release `identity`. Returns `true` if it was logged in.
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::StillConnected`] while a socket is open for it.
    pub fn logout(&self, identity: &str) -> Result<bool, LoginError> {
        match self.identities.entry(identity.to_string()) {
            Entry::Occupied(entry) if *entry.get() => {
                Err(LoginError::StillConnected(identity.to_string()))
            }
            Entry::Occupied(entry) => {
                entry.remove();
                debug!(identity = %identity, "Logged out");
                Ok(true)
            }
            Entry::Vacant(_) => Ok(false),
        }
    }

    /// Claim the socket slot of a logged-in identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity is not logged in or already has a
    /// socket.
    pub fn connect(&self, identity: &str) -> Result<(), LoginError> {
        let mut connected = self
            .identities
            .get_mut(identity)
            .ok_or_else(|| LoginError::NotLoggedIn(identity.to_string()))?;
        if *connected {
            return Err(LoginError::AlreadyConnected(identity.to_string()));
        }
        *connected = true;
        Ok(())
    }

    /// Give back the socket slot taken by [`Lobby::connect`].
    pub fn release(&self, identity: &str) {
        if let Some(mut connected) = self.identities.get_mut(identity) {
            *connected = false;
        }
    }

    /// Whether `identity` is logged in.
    #[must_use]
    pub fn is_logged_in(&self, identity: &str) -> bool {
        self.identities.contains_key(identity)
    }

    /// Whether `identity` has a socket open.
    #[must_use]
    pub fn is_connected(&self, identity: &str) -> bool {
        self.identities.get(identity).is_some_and(|entry| *entry)
    }

    /// Number of logged-in identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.identities.len()
    }
}
