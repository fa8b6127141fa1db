//! Loading `<repo>/config` and dotted-key access used by the `config`
//! commands. Writes go through the stored JSON so that keys the typed
//! [`Config`] does not model are kept and no empty sections are added.
use crate::config::Config;
use crate::error::ConfigError;
use crate::expand::resolve_document;
use autoconf::Client;
use serde_json::{Map, Value};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config";

#[derive(Clone, Debug)]
pub struct Repo {
    root: PathBuf,
}

impl Repo {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Repo { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    /// The config exactly as stored, as JSON.
    pub fn read_value(&self) -> Result<Value, ConfigError> {
        let path = self.config_path();
        let bytes = fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ConfigError::NotFound(path.clone()),
            _ => ConfigError::Io(e),
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn load(&self) -> Result<Config, ConfigError> {
        Ok(serde_json::from_value(self.read_value()?)?)
    }

    /// The stored config with `"auto"` placeholders expanded. Nothing is
    /// written back.
    pub fn expanded_value(&self, client: &Client) -> Result<Value, ConfigError> {
        let raw = self.read_value()?;
        let config: Config = serde_json::from_value(raw.clone())?;
        let document = resolve_document(client, &config);
        Ok(config.expand_auto_values(&raw, document.as_deref(), &mut rand::rng()))
    }

    pub fn get(&self, key: &str) -> Result<Value, ConfigError> {
        lookup(&self.read_value()?, key)
    }

    pub fn get_expanded(&self, key: &str, client: &Client) -> Result<Value, ConfigError> {
        lookup(&self.expanded_value(client)?, key)
    }

    /// Sets a dotted key. The result must still be a valid config, otherwise
    /// nothing is written. `expand_auto` is accepted only to reject it: the
    /// expanded view is read-only and the stored config keeps `"auto"`.
    pub fn set(&self, key: &str, value: Value, expand_auto: bool) -> Result<(), ConfigError> {
        if expand_auto {
            return Err(ConfigError::ExpandAutoWrite);
        }

        let mut raw = self.read_value()?;
        assign(&mut raw, key, value)?;
        serde_json::from_value::<Config>(raw.clone())?;
        self.write_value(&raw)
    }

    fn write_value(&self, value: &Value) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.root)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".config-")
            .tempfile_in(&self.root)?;
        serde_json::to_writer_pretty(&mut tmp, value)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        tmp.persist(self.config_path())?;
        Ok(())
    }
}

fn lookup(value: &Value, key: &str) -> Result<Value, ConfigError> {
    let mut current = value;
    for part in key.split('.') {
        current = current
            .as_object()
            .and_then(|object| object.get(part))
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;
    }
    Ok(current.clone())
}

fn assign(root: &mut Value, key: &str, value: Value) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    let parts: Vec<&str> = key.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(invalid("empty key segment"));
    }
    let Some((last, sections)) = parts.split_last() else {
        return Err(invalid("empty key"));
    };

    let mut current = root;
    for section in sections {
        let object = current
            .as_object_mut()
            .ok_or_else(|| invalid("parent is not an object"))?;
        current = object
            .entry(section.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    current
        .as_object_mut()
        .ok_or_else(|| invalid("parent is not an object"))?
        .insert(last.to_string(), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoconf::{ClientConfig, MAINNET_BOOTSTRAP_PEERS};
    use serde_json::json;

    fn repo_with(value: &Value) -> (tempfile::TempDir, Repo) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repo::open(dir.path());
        repo.write_value(value).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repo::open(dir.path());
        assert!(matches!(repo.load(), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_get_and_set() {
        let (_dir, repo) = repo_with(&json!({ "Identity": { "PeerID": "id" }, "Bootstrap": [] }));

        assert_eq!(repo.get("Identity.PeerID").unwrap(), "id");
        assert!(matches!(repo.get("Identity.Missing"), Err(ConfigError::KeyNotFound(_))));

        repo.set("Routing.Type", json!("dhtclient"), false).unwrap();
        assert_eq!(repo.load().unwrap().routing.routing_type(), "dhtclient");
        assert_eq!(repo.get("Identity.PeerID").unwrap(), "id");

        assert!(matches!(
            repo.set("Bootstrap.Nested", json!(1), false),
            Err(ConfigError::InvalidKey { .. })
        ));
        // Would produce an invalid config.
        assert!(repo.set("Bootstrap", json!("not-a-list"), false).is_err());
        assert_eq!(repo.get("Bootstrap").unwrap(), json!([]));
    }

    #[test]
    fn test_set_with_expand_auto_rejected() {
        let (_dir, repo) = repo_with(&json!({ "Bootstrap": ["auto"] }));
        let before = fs::read(repo.config_path()).unwrap();

        let err = repo
            .set("Bootstrap", json!(["/ip4/1.2.3.4/tcp/1"]), true)
            .unwrap_err();
        assert!(matches!(err, ConfigError::ExpandAutoWrite));
        assert!(err.to_string().contains("--expand-auto"));
        assert!(err.to_string().contains("read-only"));

        assert_eq!(fs::read(repo.config_path()).unwrap(), before);
    }

    #[test]
    fn test_expanded_view_is_not_persisted() {
        let (dir, repo) = repo_with(&json!({ "Bootstrap": ["auto"], "Routing": { "Type": "auto" } }));
        let client = Client::new(dir.path(), ClientConfig::default()).unwrap();

        assert_eq!(
            repo.get_expanded("Bootstrap", &client).unwrap(),
            json!(MAINNET_BOOTSTRAP_PEERS)
        );
        assert_eq!(repo.get("Bootstrap").unwrap(), json!(["auto"]));
    }

    #[test]
    fn test_set_keeps_other_keys() {
        let original = json!({
            "Identity": { "PeerID": "id", "PrivKey": "secret" },
            "Bootstrap": ["auto"],
            "Swarm": { "ConnMgr": { "HighWater": 96 } }
        });
        let (_dir, repo) = repo_with(&original);

        repo.set("Swarm.ConnMgr.LowWater", json!(32), false).unwrap();
        let saved = repo.read_value().unwrap();
        assert_eq!(saved["Identity"], original["Identity"]);
        assert_eq!(saved["Bootstrap"], original["Bootstrap"]);
        assert_eq!(saved["Swarm"], json!({ "ConnMgr": { "HighWater": 96, "LowWater": 32 } }));

        // Sections the file never had are not filled in.
        let object = saved.as_object().unwrap();
        for section in ["DNS", "Routing", "Ipns", "AutoConf"] {
            assert!(!object.contains_key(section), "{section} was added");
        }
    }
}
