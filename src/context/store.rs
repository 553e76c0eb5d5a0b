use super::ConfigDocument;
use super::error::{ContextError, ContextResult};
use directories::BaseDirs;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::debug;

const CONFIG_FILE: &str = ".orthanc-cli.yaml";

const STARTER_CONFIG: &str = r#"# Orthanc CLI configuration
# Each context describes one Orthanc server.
contexts:
  local:
    orthanc:
      url: "http://localhost:8042"
      username: "orthanc"
      password: "orthanc"
      insecure: false

# The currently active context
current-context: local

output:
  json: false  # print every result as JSON by default
"#;

/// `$HOME/.orthanc-cli.yaml`, or `./.orthanc-cli.yaml` when only that one exists.
pub fn default_path() -> ContextResult<PathBuf> {
    let home = BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(CONFIG_FILE))
        .ok_or(ContextError::MissingConfigDir)?;

    if !home.exists() {
        let local = PathBuf::from(CONFIG_FILE);
        if local.is_file() {
            return Ok(local);
        }
    }

    Ok(home)
}

pub(super) fn read(path: &Path) -> ContextResult<Option<ConfigDocument>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(None);
        }
        Err(source) => {
            return Err(ContextError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let parse_error = |source| ContextError::Parse {
        path: path.to_path_buf(),
        source,
    };

    // Comment-only files parse as null.
    let value: serde_yaml::Value = serde_yaml::from_str(&contents).map_err(parse_error)?;
    if value.is_null() {
        return Ok(None);
    }

    Ok(Some(serde_yaml::from_value(value).map_err(parse_error)?))
}

pub(super) fn write(path: &Path, document: &ConfigDocument) -> ContextResult<()> {
    let data = serde_yaml::to_string(document)?;
    write_bytes(path, data.as_bytes())?;
    debug!(path = %path.display(), "config saved");
    Ok(())
}

/// Write the starter configuration used by `config init`.
pub fn write_starter(path: &Path) -> ContextResult<()> {
    write_bytes(path, STARTER_CONFIG.as_bytes())
}

fn write_bytes(path: &Path, data: &[u8]) -> ContextResult<()> {
    let write_error = |source| ContextError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_error)?;
    }

    fs::write(path, data).map_err(write_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starter_config_parses_into_local_context() {
        let doc: ConfigDocument = serde_yaml::from_str(STARTER_CONFIG).unwrap();
        assert_eq!(doc.current_context.as_deref(), Some("local"));
        assert_eq!(doc.contexts["local"].orthanc.url, "http://localhost:8042");
        assert!(!doc.output.json);
    }

    #[test]
    fn comment_only_file_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.yaml");
        fs::write(&path, "# nothing here\n").unwrap();
        assert!(read(&path).unwrap().is_none());
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.yaml");
        fs::write(&path, "contexts: [unterminated\n").unwrap();
        assert!(matches!(read(&path), Err(ContextError::Parse { .. })));
    }
}
