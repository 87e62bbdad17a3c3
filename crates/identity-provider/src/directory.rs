//! User and client directories.
//!
//! Clients are fixed at startup. Users can be created, updated, disabled and
//! deleted at runtime through the management API, so the user list sits
//! behind a lock and every read hands out a cloned record.

use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form user attributes, copied into token claims and `/userinfo`.
pub type Attributes = Map<String, Value>;

/// A user account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    /// Stored and compared as given; never serialized in responses.
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub attributes: Attributes,
}

/// A configured OAuth2 / login API client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default)]
    pub audience: String,
}

/// Why a username/password pair was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    InvalidCredentials,
    Disabled,
}

/// Fields accepted by `PUT /users/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub attributes: Option<Attributes>,
}

/// Result of an upsert: whether the user was newly created.
#[derive(Debug, Clone, PartialEq)]
pub enum Upserted {
    Created(User),
    Updated(User),
}

pub struct UserDirectory {
    users: RwLock<Vec<User>>,
}

impl UserDirectory {
    pub fn new(users: Vec<User>) -> Self {
        Self {
            users: RwLock::new(users),
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn list(&self) -> Vec<User> {
        self.read().clone()
    }

    pub fn get(&self, id: &str) -> Option<User> {
        self.read().iter().find(|u| u.id == id).cloned()
    }

    /// Look up the user matching both username and password.
    ///
    /// A match on a disabled account is reported separately; callers decide
    /// whether to tell the two apart.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<User, AuthFailure> {
        let users = self.read();
        let user = users
            .iter()
            .find(|u| u.username == username && u.password == password)
            .ok_or(AuthFailure::InvalidCredentials)?;

        if user.disabled {
            return Err(AuthFailure::Disabled);
        }
        Ok(user.clone())
    }

    /// Create the user if `id` is unknown, otherwise update it in place.
    ///
    /// On update, empty username/password keep their current values and
    /// absent attributes keep the current map.
    pub fn upsert(&self, id: &str, update: UserUpdate) -> Upserted {
        let mut users = self.write();

        if let Some(existing) = users.iter_mut().find(|u| u.id == id) {
            if !update.username.is_empty() {
                existing.username = update.username;
            }
            if !update.password.is_empty() {
                existing.password = update.password;
            }
            if let Some(attributes) = update.attributes {
                existing.attributes = attributes;
            }
            return Upserted::Updated(existing.clone());
        }

        let user = User {
            id: id.to_string(),
            username: update.username,
            password: update.password,
            disabled: false,
            attributes: update.attributes.unwrap_or_default(),
        };
        users.push(user.clone());
        Upserted::Created(user)
    }

    /// Remove a user. List order is not meaningful, so this swap-removes.
    pub fn delete(&self, id: &str) -> bool {
        let mut users = self.write();
        match users.iter().position(|u| u.id == id) {
            Some(index) => {
                users.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Set the disabled flag. Returns false if the user does not exist.
    pub fn set_disabled(&self, id: &str, disabled: bool) -> bool {
        let mut users = self.write();
        match users.iter_mut().find(|u| u.id == id) {
            Some(user) => {
                user.disabled = disabled;
                true
            }
            None => false,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<User>> {
        self.users.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<User>> {
        self.users.write().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct ClientDirectory {
    clients: Vec<Client>,
}

impl ClientDirectory {
    pub fn new(clients: Vec<Client>) -> Self {
        Self { clients }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.iter().find(|c| c.id == id)
    }

    /// Find the client registered with exactly this id and redirect URI.
    pub fn find_by_redirect(&self, id: &str, redirect_uri: &str) -> Option<&Client> {
        self.clients
            .iter()
            .find(|c| c.id == id && c.redirect_uri == redirect_uri)
    }

    /// Find the client whose id and secret both match.
    pub fn authenticate(&self, id: &str, secret: &str) -> Option<&Client> {
        self.clients.iter().find(|c| c.id == id && c.secret == secret)
    }
}
