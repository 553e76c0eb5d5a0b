use super::{ServerSettings, parse_bool};
use tracing::warn;

pub const ENV_URL: &str = "ORTHANC_URL";
pub const ENV_USERNAME: &str = "ORTHANC_USERNAME";
pub const ENV_PASSWORD: &str = "ORTHANC_PASSWORD";
pub const ENV_INSECURE: &str = "ORTHANC_INSECURE";

/// Server settings taken from the environment. Each one that is set wins
/// over the value stored in the active context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub insecure: Option<bool>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let insecure = non_empty(ENV_INSECURE).and_then(|raw| {
            let parsed = parse_bool(&raw);
            if parsed.is_none() {
                warn!(value = %raw, "ignoring {ENV_INSECURE}: not a boolean");
            }
            parsed
        });

        Self {
            url: non_empty(ENV_URL),
            username: non_empty(ENV_USERNAME),
            password: non_empty(ENV_PASSWORD),
            insecure,
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply(&self, settings: &mut ServerSettings) {
        if let Some(url) = &self.url {
            settings.url = url.clone();
        }
        if let Some(username) = &self.username {
            settings.username = username.clone();
        }
        if let Some(password) = &self.password {
            settings.password = password.clone();
        }
        if let Some(insecure) = self.insecure {
            settings.insecure = insecure;
        }
    }
}
