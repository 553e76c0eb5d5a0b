use super::store::{self, read, write};
use super::{
    ConfigDocument, ConfigKey, Context, ContextEntry, ContextError, ContextResult, ContextUpdate,
    EnvOverrides, ServerSettings, SetOutcome, parse_bool,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const MIGRATED_CONTEXT: &str = "default";
const ENV_CONTEXT: &str = "environment";

/// The loaded configuration file and the path it came from.
///
/// Mutations only touch memory; callers persist them with [`ConfigStore::save`].
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    document: ConfigDocument,
    migrated: bool,
}

impl ConfigStore {
    /// Read the config at `path`, or at [`store::default_path`] when `None`.
    ///
    /// A missing file yields an empty store. A legacy single-server document
    /// is translated in memory; see [`ConfigStore::persist_migration`].
    pub fn load(path: Option<&Path>) -> ContextResult<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => store::default_path()?,
        };

        let mut document = read(&path)?.unwrap_or_default();
        let migrated = migrate_legacy(&mut document);
        select_fallback_current(&mut document);

        debug!(
            path = %path.display(),
            contexts = document.contexts.len(),
            migrated,
            "config loaded"
        );

        Ok(Self {
            path,
            document,
            migrated,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &ConfigDocument {
        &self.document
    }

    /// True when `load` translated a legacy document that is not yet on disk.
    pub fn needs_migration_write(&self) -> bool {
        self.migrated
    }

    /// Write back a migrated document. Returns whether anything was written.
    pub fn persist_migration(&mut self) -> ContextResult<bool> {
        if !self.migrated {
            return Ok(false);
        }

        self.save()?;
        self.migrated = false;
        info!(path = %self.path.display(), "migrated legacy config to contexts");
        Ok(true)
    }

    pub fn save(&self) -> ContextResult<()> {
        write(&self.path, &self.document)
    }

    pub fn current_name(&self) -> Option<&str> {
        self.document.current_context.as_deref()
    }

    pub fn output_json(&self) -> bool {
        self.document.output.json
    }

    /// The active context with `ORTHANC_*` environment overrides applied.
    pub fn current_context(&self) -> ContextResult<Context> {
        self.current_context_with(&EnvOverrides::from_env())
    }

    /// With no stored context, a set `ORTHANC_URL` still yields a usable
    /// context named `environment`.
    pub fn current_context_with(&self, env: &EnvOverrides) -> ContextResult<Context> {
        let mut ctx = match self.stored_current() {
            Ok(ctx) => ctx,
            Err(ContextError::NoContextSelected) if env.url.is_some() => Context {
                name: ENV_CONTEXT.to_owned(),
                settings: ServerSettings::default(),
            },
            Err(err) => return Err(err),
        };
        env.apply(&mut ctx.settings);
        Ok(ctx)
    }

    /// The active context exactly as stored in the file.
    pub fn stored_current(&self) -> ContextResult<Context> {
        let name = self.current_name().ok_or(ContextError::NoContextSelected)?;
        self.get(name)
    }

    pub fn get(&self, name: &str) -> ContextResult<Context> {
        self.document
            .contexts
            .get(name)
            .map(|entry| Context {
                name: name.to_owned(),
                settings: entry.orthanc.clone(),
            })
            .ok_or_else(|| ContextError::UnknownContext(name.to_string()))
    }

    /// All contexts sorted by name, paired with whether each is current.
    pub fn list(&self) -> Vec<(Context, bool)> {
        let current = self.current_name();

        self.document
            .contexts
            .iter()
            .map(|(name, entry)| {
                let ctx = Context {
                    name: name.clone(),
                    settings: entry.orthanc.clone(),
                };
                (ctx, current == Some(name.as_str()))
            })
            .collect()
    }

    /// Create `name` or update the given fields in place. A new context
    /// becomes current when requested or when nothing is current yet.
    pub fn set_context(
        &mut self,
        name: &str,
        update: ContextUpdate,
        make_current: bool,
    ) -> ContextResult<SetOutcome> {
        validate_name(name)?;

        let created = !self.document.contexts.contains_key(name);
        let entry = self
            .document
            .contexts
            .entry(name.to_owned())
            .or_insert_with(ContextEntry::default);
        update.apply(&mut entry.orthanc);

        let made_current = make_current || self.document.current_context.is_none();
        if made_current {
            self.document.current_context = Some(name.to_owned());
        }

        Ok(SetOutcome {
            created,
            made_current,
        })
    }

    pub fn use_context(&mut self, name: &str) -> ContextResult<()> {
        if !self.document.contexts.contains_key(name) {
            return Err(ContextError::UnknownContext(name.to_string()));
        }

        self.document.current_context = Some(name.to_owned());
        Ok(())
    }

    pub fn rename_context(&mut self, original: &str, new_name: &str) -> ContextResult<()> {
        if !self.document.contexts.contains_key(original) {
            return Err(ContextError::UnknownContext(original.to_string()));
        }

        if original == new_name {
            return Ok(());
        }

        validate_name(new_name)?;

        if self.document.contexts.contains_key(new_name) {
            return Err(ContextError::DuplicateContext(new_name.to_string()));
        }

        if let Some(entry) = self.document.contexts.remove(original) {
            self.document.contexts.insert(new_name.to_owned(), entry);
        }

        if self.current_name() == Some(original) {
            self.document.current_context = Some(new_name.to_owned());
        }

        Ok(())
    }

    pub fn delete_context(&mut self, name: &str) -> ContextResult<()> {
        if !self.document.contexts.contains_key(name) {
            return Err(ContextError::UnknownContext(name.to_string()));
        }

        if self.current_name() == Some(name) {
            return Err(ContextError::DeleteCurrent(name.to_string()));
        }

        self.document.contexts.remove(name);
        Ok(())
    }

    /// `config set`: `orthanc.*` keys edit the current context.
    pub fn set_value(&mut self, key: ConfigKey, value: &str) -> ContextResult<()> {
        let parse = |value: &str| {
            parse_bool(value).ok_or_else(|| ContextError::InvalidBool {
                key: key.as_str().to_string(),
                value: value.to_string(),
            })
        };

        match key {
            ConfigKey::OutputJson => self.document.output.json = parse(value)?,
            ConfigKey::OrthancUrl => self.current_settings_mut()?.url = value.to_owned(),
            ConfigKey::OrthancUsername => self.current_settings_mut()?.username = value.to_owned(),
            ConfigKey::OrthancPassword => self.current_settings_mut()?.password = value.to_owned(),
            ConfigKey::OrthancInsecure => {
                let insecure = parse(value)?;
                self.current_settings_mut()?.insecure = insecure;
            }
        }

        Ok(())
    }

    /// `config get`: `None` when the value is unset.
    pub fn get_value(&self, key: ConfigKey) -> ContextResult<Option<String>> {
        let value = match key {
            ConfigKey::OutputJson => self.document.output.json.to_string(),
            ConfigKey::OrthancUrl => self.stored_current()?.settings.url,
            ConfigKey::OrthancUsername => self.stored_current()?.settings.username,
            ConfigKey::OrthancPassword => self.stored_current()?.settings.password,
            ConfigKey::OrthancInsecure => self.stored_current()?.settings.insecure.to_string(),
        };

        Ok(Some(value).filter(|v| !v.is_empty()))
    }

    fn current_settings_mut(&mut self) -> ContextResult<&mut ServerSettings> {
        let name = self
            .current_name()
            .ok_or(ContextError::NoContextSelected)?
            .to_owned();

        self.document
            .contexts
            .get_mut(&name)
            .map(|entry| &mut entry.orthanc)
            .ok_or(ContextError::UnknownContext(name))
    }
}

fn validate_name(name: &str) -> ContextResult<()> {
    if name.trim().is_empty() {
        return Err(ContextError::EmptyName);
    }
    Ok(())
}

/// Move a legacy top-level `orthanc` block into `contexts.default`.
fn migrate_legacy(document: &mut ConfigDocument) -> bool {
    if !document.contexts.is_empty() {
        document.orthanc = None;
        return false;
    }

    let Some(legacy) = document.orthanc.take() else {
        return false;
    };

    document
        .contexts
        .insert(MIGRATED_CONTEXT.to_owned(), ContextEntry { orthanc: legacy });
    document.current_context = Some(MIGRATED_CONTEXT.to_owned());
    true
}

fn select_fallback_current(document: &mut ConfigDocument) {
    if document.current_context.as_deref() == Some("") {
        document.current_context = None;
    }

    if document.current_context.is_none() {
        document.current_context = document.contexts.keys().next().cloned();
    }
}
