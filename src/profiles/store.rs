//! YAML persistence for [`ProfileSet`].

use crate::error::{Error, Result};
use crate::profiles::profile::{ProfileSet, ServerProfile};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const FILE_NAME: &str = "servers.yaml";

/// Profile file handle.
///
/// Holds only the path. Every mutator loads the file, applies one change and
/// saves it back, so two stores on the same path never disagree for longer
/// than one write.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// A store at [`default_location`](Self::default_location) for `app`.
    pub fn for_app(app: &str) -> Self {
        Self::new(Self::default_location(app))
    }

    /// `$XDG_CONFIG_HOME/<app>/servers.yaml`, else
    /// `$HOME/.config/<app>/servers.yaml`, else `./.config/<app>/servers.yaml`.
    pub fn default_location(app: &str) -> PathBuf {
        let xdg = std::env::var("XDG_CONFIG_HOME").ok();
        let home = std::env::var("HOME").ok();
        location_from(xdg.as_deref(), home.as_deref(), app)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file. A missing or empty file yields [`ProfileSet::defaults`].
    pub fn load(&self) -> Result<ProfileSet> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No profile file, using defaults");
                return Ok(ProfileSet::defaults());
            }
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            return Ok(ProfileSet::defaults());
        }
        let set: ProfileSet = serde_yaml::from_str(&contents)?;
        debug!(path = %self.path.display(), profiles = set.servers.len(), "Profiles loaded");
        Ok(set)
    }

    /// Writes `set` to a sibling temp file and renames it into place.
    pub fn save(&self, set: &ProfileSet) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        // an existing directory keeps whatever mode its owner chose
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            set_mode(&dir, 0o755)?;
        }

        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| Error::Config(format!("{} is not a file path", self.path.display())))?;
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(format!(".tmp{}", std::process::id()));
        let tmp_path = dir.join(tmp_name);

        let yaml = serde_yaml::to_string(set)?;
        let written = write_file(&tmp_path, yaml.as_bytes()).and_then(|_| {
            fs::rename(&tmp_path, &self.path)?;
            Ok(())
        });
        if written.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        written?;

        debug!(path = %self.path.display(), profiles = set.servers.len(), "Profiles saved");
        Ok(())
    }

    pub fn add(&self, profile: ServerProfile) -> Result<()> {
        let name = profile.name.clone();
        self.update(|set| set.add(profile))?;
        info!(profile = %name.trim(), "Server profile added");
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<ServerProfile> {
        let removed = self.update(|set| set.remove(name))?;
        info!(profile = %name, "Server profile removed");
        Ok(removed)
    }

    pub fn set_default(&self, name: &str) -> Result<()> {
        self.update(|set| set.set_default(name))
    }

    pub fn set_last_used(&self, name: &str) -> Result<()> {
        self.update(|set| set.set_last_used(name))
    }

    pub fn get(&self, name: &str) -> Result<Option<ServerProfile>> {
        Ok(self.load()?.get(name).cloned())
    }

    pub fn get_default(&self) -> Result<Option<ServerProfile>> {
        Ok(self.load()?.get_default().cloned())
    }

    pub fn get_last_used(&self) -> Result<Option<ServerProfile>> {
        Ok(self.load()?.get_last_used().cloned())
    }

    fn update<T>(&self, mutate: impl FnOnce(&mut ProfileSet) -> Result<T>) -> Result<T> {
        let mut set = self.load()?;
        let out = mutate(&mut set)?;
        self.save(&set)?;
        Ok(out)
    }
}

fn location_from(xdg_config_home: Option<&str>, home: Option<&str>, app: &str) -> PathBuf {
    let base = match (xdg_config_home, home) {
        (Some(xdg), _) if !xdg.is_empty() => PathBuf::from(xdg),
        (_, Some(home)) if !home.is_empty() => Path::new(home).join(".config"),
        _ => PathBuf::from(".config"),
    };
    base.join(app).join(FILE_NAME)
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);
    set_mode(path, 0o644)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
