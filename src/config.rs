use anyhow::{Context, Result};
use converge::{Attributes, DesiredState, PollBudget, StateToken};
use sacloud::{Credentials, ResourceKind, ResourceRef, Zone};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_NAME: &str = "sacloud-converge";

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join(APP_NAME))
}

/// Default manifest location
pub fn default_manifest_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("manifest.toml"))
}

/// Expand `~` in a user-supplied path
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).as_ref())
}

// ============================================================================
// Manifest
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub credentials: Option<CredentialsConfig>,
    #[serde(default)]
    pub zone: Option<Zone>,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsConfig {
    pub token: String,
    pub secret: String,
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("token", &self.token)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollConfig {
    /// Seconds between observations
    pub interval: Option<u64>,
    pub attempts: Option<u32>,
}

/// Ids may be written as strings or as bare integers.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ResourceId {
    Text(String),
    Number(u64),
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Text(id) => f.write_str(id),
            ResourceId::Number(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceEntry {
    pub name: String,
    pub kind: ResourceKind,
    pub state: StateToken,
    #[serde(default)]
    pub id: Option<ResourceId>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl ResourceEntry {
    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(self.kind, self.id.as_ref().map(ToString::to_string))
    }

    /// Desired state of this entry.
    ///
    /// The entry name becomes the resource name unless the attributes
    /// carry one.
    pub fn desired_state(&self, dry_run: bool) -> converge::Result<DesiredState> {
        let mut attributes = self.attributes.clone();
        if !attributes.contains("name") {
            attributes.insert("name", self.name.as_str());
        }
        Ok(DesiredState::new(self.reference(), self.state, attributes)?.with_dry_run(dry_run))
    }
}

impl Manifest {
    /// Load a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid manifest {}", path.display()))
    }

    /// Load the manifest at `path` if the file exists
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if path.exists() {
            Self::load(path).map(Some)
        } else {
            Ok(None)
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Connection and polling settings after merging flags, environment and
/// manifest.
#[derive(Debug)]
pub struct Settings {
    pub credentials: Credentials,
    pub zone: Zone,
    pub budget: PollBudget,
}

/// Values given on the command line (or through the environment).
#[derive(Debug, Default)]
pub struct Overrides {
    pub token: Option<String>,
    pub secret: Option<String>,
    pub zone: Option<Zone>,
    pub poll_interval: Option<u64>,
    pub poll_attempts: Option<u32>,
}

impl Settings {
    /// Command line first, then the manifest, then defaults.
    pub fn resolve(overrides: &Overrides, manifest: Option<&Manifest>) -> converge::Result<Self> {
        let from_manifest = manifest.and_then(|m| m.credentials.as_ref());
        let token = overrides
            .token
            .clone()
            .or_else(|| from_manifest.map(|c| c.token.clone()));
        let secret = overrides
            .secret
            .clone()
            .or_else(|| from_manifest.map(|c| c.secret.clone()));
        let (Some(token), Some(secret)) = (token, secret) else {
            return Err(converge::Error::Auth(
                "no credentials: pass --token and --secret, set SAKURACLOUD_ACCESS_TOKEN and \
                 SAKURACLOUD_ACCESS_TOKEN_SECRET, or add [credentials] to the manifest"
                    .to_string(),
            ));
        };

        let zone = overrides
            .zone
            .or_else(|| manifest.and_then(|m| m.zone))
            .unwrap_or_default();

        let defaults = PollBudget::default();
        let poll = manifest.map(|m| &m.poll);
        let interval = overrides
            .poll_interval
            .or_else(|| poll.and_then(|p| p.interval))
            .map_or(defaults.interval, Duration::from_secs);
        let attempts = overrides
            .poll_attempts
            .or_else(|| poll.and_then(|p| p.attempts))
            .unwrap_or(defaults.max_attempts);
        if attempts == 0 {
            return Err(converge::Error::validation("poll attempts must be at least 1"));
        }

        Ok(Self {
            credentials: Credentials::new(token, secret),
            zone,
            budget: PollBudget::new(interval, attempts),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
