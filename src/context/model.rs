use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Connection settings for one Orthanc server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub insecure: bool,
}

impl ServerSettings {
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    #[serde(default)]
    pub orthanc: ServerSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(default)]
    pub json: bool,
}

/// On-disk shape of `.orthanc-cli.yaml`.
///
/// The top-level `orthanc` block is the legacy single-server layout. It is
/// read so it can be migrated, and never written back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigDocument {
    #[serde(default)]
    pub contexts: BTreeMap<String, ContextEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_context: Option<String>,
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default, skip_serializing)]
    pub orthanc: Option<ServerSettings>,
}

pub const PASSWORD_MASK: &str = "********";

impl ConfigDocument {
    /// Copy with every non-empty password replaced by [`PASSWORD_MASK`].
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        for entry in copy.contexts.values_mut() {
            if !entry.orthanc.password.is_empty() {
                entry.orthanc.password = PASSWORD_MASK.to_owned();
            }
        }
        copy
    }
}

/// A named server context, as handed to the HTTP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    pub name: String,
    pub settings: ServerSettings,
}

/// Field changes for `set-context`. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct ContextUpdate {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub insecure: Option<bool>,
}

impl ContextUpdate {
    pub(super) fn apply(self, settings: &mut ServerSettings) {
        if let Some(url) = self.url {
            settings.url = url;
        }
        if let Some(username) = self.username {
            settings.username = username;
        }
        if let Some(password) = self.password {
            settings.password = password;
        }
        if let Some(insecure) = self.insecure {
            settings.insecure = insecure;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetOutcome {
    pub created: bool,
    pub made_current: bool,
}

/// Keys accepted by `config get` / `config set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    OrthancUrl,
    OrthancUsername,
    OrthancPassword,
    OrthancInsecure,
    OutputJson,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 5] = [
        ConfigKey::OrthancUrl,
        ConfigKey::OrthancUsername,
        ConfigKey::OrthancPassword,
        ConfigKey::OrthancInsecure,
        ConfigKey::OutputJson,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::OrthancUrl => "orthanc.url",
            ConfigKey::OrthancUsername => "orthanc.username",
            ConfigKey::OrthancPassword => "orthanc.password",
            ConfigKey::OrthancInsecure => "orthanc.insecure",
            ConfigKey::OutputJson => "output.json",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }

    pub fn is_secret(self) -> bool {
        self == ConfigKey::OrthancPassword
    }

    pub fn valid_keys() -> String {
        Self::ALL
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Lenient boolean parsing shared by `config set` and the environment.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_hides_only_set_passwords() {
        let mut document = ConfigDocument::default();
        for (name, password) in [("a", "secret"), ("b", "")] {
            let mut entry = ContextEntry::default();
            entry.orthanc.password = password.into();
            document.contexts.insert(name.into(), entry);
        }

        let masked = document.masked();
        assert_eq!(masked.contexts["a"].orthanc.password, PASSWORD_MASK);
        assert_eq!(masked.contexts["b"].orthanc.password, "");
        assert_eq!(document.contexts["a"].orthanc.password, "secret");
    }

    #[test]
    fn config_keys_round_trip_by_name() {
        for key in ConfigKey::ALL {
            assert_eq!(ConfigKey::parse(key.as_str()), Some(key));
        }
        assert_eq!(ConfigKey::parse("orthanc.port"), None);
        assert_eq!(parse_bool(" Yes "), Some(true));
        assert_eq!(parse_bool("maybe"), None);
    }
}
