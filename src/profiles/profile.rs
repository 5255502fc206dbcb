//! Profile records and the rules that keep a set of them consistent.

use crate::address::ServerAddress;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Name of the profile created when no file exists yet.
pub const DEFAULT_PROFILE_NAME: &str = "local";

/// Address of the profile created when no file exists yet.
pub const DEFAULT_PROFILE_ADDRESS: &str = "127.0.0.1:11211";

/// A named server entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerProfile {
    pub name: String,
    pub address: String,
    #[serde(rename = "default", default)]
    pub is_default: bool,
}

impl ServerProfile {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            is_default: false,
        }
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }
}

/// Every saved profile plus the one used last, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSet {
    #[serde(default)]
    pub servers: Vec<ServerProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<String>,
}

impl ProfileSet {
    /// The set a fresh installation starts with.
    pub fn defaults() -> Self {
        Self {
            servers: vec![
                ServerProfile::new(DEFAULT_PROFILE_NAME, DEFAULT_PROFILE_ADDRESS).as_default(),
            ],
            last_used: None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ServerProfile> {
        self.servers.iter().find(|p| p.name == name)
    }

    /// The flagged default, else the first profile.
    pub fn get_default(&self) -> Option<&ServerProfile> {
        self.servers
            .iter()
            .find(|p| p.is_default)
            .or_else(|| self.servers.first())
    }

    /// `last_used` if it still names a profile, else [`get_default`](Self::get_default).
    pub fn get_last_used(&self) -> Option<&ServerProfile> {
        self.last_used
            .as_deref()
            .and_then(|name| self.get(name))
            .or_else(|| self.get_default())
    }

    /// Appends `profile` after validating it against the set.
    ///
    /// A profile added as default takes the flag from every other profile.
    pub fn add(&mut self, mut profile: ServerProfile) -> Result<()> {
        profile.name = profile.name.trim().to_string();
        profile.address = profile.address.trim().to_string();

        if profile.name.is_empty() {
            return Err(Error::Config("profile name is empty".to_string()));
        }
        if self.get(&profile.name).is_some() {
            return Err(Error::Config(format!(
                "profile {:?} already exists",
                profile.name
            )));
        }
        if profile.address.is_empty() {
            return Err(Error::Config(format!(
                "profile {:?} has no address",
                profile.name
            )));
        }
        ServerAddress::parse(&profile.address).map_err(|e| {
            Error::Config(format!("profile {:?}: {}", profile.name, e))
        })?;

        if profile.is_default {
            self.clear_default();
        }
        self.servers.push(profile);
        Ok(())
    }

    /// Removes `name`. The last remaining profile cannot be removed.
    ///
    /// If `name` was the last-used profile, `last_used` moves to the default
    /// (or first) of the remaining profiles.
    pub fn remove(&mut self, name: &str) -> Result<ServerProfile> {
        let index = self.index_of(name)?;
        if self.servers.len() == 1 {
            return Err(Error::Config(
                "cannot remove the only server profile".to_string(),
            ));
        }

        let removed = self.servers.remove(index);
        if self.last_used.as_deref() == Some(name) {
            self.last_used = self.get_default().map(|p| p.name.clone());
        }
        Ok(removed)
    }

    /// Flags `name` as the default and clears every other flag.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        let index = self.index_of(name)?;
        self.clear_default();
        self.servers[index].is_default = true;
        Ok(())
    }

    pub fn set_last_used(&mut self, name: &str) -> Result<()> {
        self.index_of(name)?;
        self.last_used = Some(name.to_string());
        Ok(())
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.servers
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| Error::Config(format!("no server profile named {:?}", name)))
    }

    fn clear_default(&mut self) {
        for profile in &mut self.servers {
            profile.is_default = false;
        }
    }
}
