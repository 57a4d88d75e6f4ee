//! Per-avatar OSC configuration files.
//!
//! VRChat writes one JSON file per avatar under
//! `<osc_dir>/usr_<user id>/Avatars/<avatar id>.json`, listing every
//! parameter the avatar exposes over OSC.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use shocker_kernel::{AvatarConfigSource, ParameterDescriptor};

/// VRChat's OSC directory relative to the user profile.
const OSC_DIR_SUFFIX: &[&str] = &["AppData", "LocalLow", "VRChat", "VRChat", "OSC"];

/// The platform's default OSC directory, if a home directory is known.
pub fn default_osc_dir() -> Option<PathBuf> {
    let home = std::env::var_os("USERPROFILE").or_else(|| std::env::var_os("HOME"))?;
    let mut dir = PathBuf::from(home);
    dir.extend(OSC_DIR_SUFFIX);
    Some(dir)
}

/// Avatar OSC config file contents.
#[derive(Debug, Deserialize)]
pub struct AvatarFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<AvatarParameter>,
}

/// One parameter entry of an avatar config file.
#[derive(Debug, Deserialize)]
pub struct AvatarParameter {
    pub name: String,
    pub input: Option<ParameterEndpoint>,
    pub output: Option<ParameterEndpoint>,
}

/// Address and type of one direction of a parameter.
#[derive(Debug, Deserialize)]
pub struct ParameterEndpoint {
    pub address: String,
    #[serde(rename = "type")]
    pub value_type: String,
}

impl AvatarFile {
    /// Parse file contents, tolerating a UTF-8 byte order mark.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
        serde_json::from_str(raw).context("Failed to parse avatar config")
    }

    /// Parameter declarations; the output type wins over the input type.
    pub fn descriptors(&self) -> Vec<ParameterDescriptor> {
        self.parameters
            .iter()
            .filter_map(|p| {
                let endpoint = p.output.as_ref().or(p.input.as_ref())?;
                Some(ParameterDescriptor {
                    name: p.name.clone(),
                    declared_type: endpoint.value_type.clone(),
                })
            })
            .collect()
    }
}

/// Avatar configs read from the OSC directory on demand.
#[derive(Debug, Clone)]
pub struct OscConfigDirectory {
    root: PathBuf,
}

impl OscConfigDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Locate the config file for `avatar_id` in any user directory.
    pub fn find(&self, avatar_id: &str) -> Result<PathBuf> {
        let file_name = format!("{}.json", avatar_id);
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read OSC directory {}", self.root.display()))?;

        for entry in entries.flatten() {
            let is_user_dir = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with("usr_"));
            if !is_user_dir {
                continue;
            }
            let candidate = entry.path().join("Avatars").join(&file_name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        anyhow::bail!("No OSC config for avatar {}", avatar_id)
    }

    fn read(path: &Path) -> Result<AvatarFile> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        AvatarFile::parse(&raw).with_context(|| format!("In {}", path.display()))
    }
}

impl AvatarConfigSource for OscConfigDirectory {
    fn lookup(&self, avatar_id: &str) -> Result<Vec<ParameterDescriptor>> {
        let path = self.find(avatar_id)?;
        let file = Self::read(&path)?;
        debug!(
            avatar = %file.id,
            name = %file.name,
            path = %path.display(),
            "Read avatar config"
        );
        Ok(file.descriptors())
    }
}
