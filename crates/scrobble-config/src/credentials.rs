use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

const SIMKL_ACCESS_TOKEN: &str = "simkl_access_token";
const SIMKL_AUTHORIZED_AT: &str = "simkl_authorized_at";
const SIMKL_USERNAME: &str = "simkl_username";

#[derive(Debug, Serialize, Deserialize, Default)]
struct CredentialsData {
    #[serde(flatten)]
    data: HashMap<String, String>,
}

/// Key/value secrets persisted next to the configuration file
pub struct CredentialStore {
    path: PathBuf,
    credentials: HashMap<String, String>,
}

impl CredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            credentials: HashMap::new(),
        }
    }

    /// Open the store at `path`, reading existing values if the file exists
    pub fn open(path: PathBuf) -> Result<Self> {
        let mut store = Self::new(path);
        store.load()?;
        Ok(store)
    }

    pub fn load(&mut self) -> Result<()> {
        if self.path.exists() {
            let content = std::fs::read_to_string(&self.path)?;
            let creds_data: CredentialsData = toml::from_str(&content)?;
            self.credentials = creds_data.data;
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let creds_data = CredentialsData {
            data: self.credentials.clone(),
        };
        let content = toml::to_string_pretty(&creds_data)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.credentials.get(key)
    }

    pub fn set(&mut self, key: String, value: String) {
        self.credentials.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) {
        self.credentials.remove(key);
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn get_simkl_access_token(&self) -> Option<&String> {
        self.get(SIMKL_ACCESS_TOKEN).filter(|t| !t.is_empty())
    }

    /// Store a freshly authorized token along with when it was granted
    pub fn set_simkl_access_token(&mut self, token: String) {
        self.set(SIMKL_ACCESS_TOKEN.to_string(), token);
        self.set(SIMKL_AUTHORIZED_AT.to_string(), Utc::now().to_rfc3339());
    }

    pub fn get_simkl_authorized_at(&self) -> Option<DateTime<Utc>> {
        self.get(SIMKL_AUTHORIZED_AT)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn get_simkl_username(&self) -> Option<&String> {
        self.get(SIMKL_USERNAME)
    }

    pub fn set_simkl_username(&mut self, username: String) {
        self.set(SIMKL_USERNAME.to_string(), username);
    }

    /// Forget everything tied to the SIMKL account (sign out)
    pub fn clear_simkl(&mut self) {
        self.remove(SIMKL_ACCESS_TOKEN);
        self.remove(SIMKL_AUTHORIZED_AT);
        self.remove(SIMKL_USERNAME);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_credential_store_load_and_save() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();

        let mut store = CredentialStore::new(path.clone());
        store.set_simkl_access_token("test_token".to_string());
        store.set_simkl_username("viewer".to_string());
        store.save().unwrap();

        let loaded = CredentialStore::open(path).unwrap();
        assert_eq!(loaded.get_simkl_access_token(), Some(&"test_token".to_string()));
        assert_eq!(loaded.get_simkl_username(), Some(&"viewer".to_string()));
        let authorized = loaded.get_simkl_authorized_at().unwrap();
        assert!((Utc::now() - authorized).num_seconds().abs() < 5);
    }

    #[test]
    fn test_clear_simkl_signs_out() {
        let mut store = CredentialStore::new(PathBuf::from("/tmp/unused"));
        store.set_simkl_access_token("token".to_string());
        store.set("other".to_string(), "kept".to_string());

        store.clear_simkl();
        assert_eq!(store.get_simkl_access_token(), None);
        assert!(store.get_simkl_authorized_at().is_none());
        assert_eq!(store.get("other"), Some(&"kept".to_string()));
    }

    #[test]
    fn test_empty_token_is_treated_as_missing() {
        let mut store = CredentialStore::new(PathBuf::from("/tmp/unused"));
        store.set(SIMKL_ACCESS_TOKEN.to_string(), String::new());
        assert_eq!(store.get_simkl_access_token(), None);
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::open(dir.path().join("credentials.toml")).unwrap();
        assert!(store.is_empty());
    }
}
