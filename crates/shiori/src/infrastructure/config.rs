use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use shiori_auth::mangadex::DEFAULT_AUTH_URL;

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct MangaDexConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    #[serde(skip)]
    path: PathBuf,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_uploads_url")]
    pub uploads_url: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_create_database")]
    pub create_database: bool,
    #[serde(default)]
    pub preserve_notes_on_save: bool,
    #[serde(default = "default_language")]
    pub language: String,
    pub mangadex: Option<MangaDexConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: shiori_home().join("config.yml"),
            auth_url: default_auth_url(),
            api_url: default_api_url(),
            uploads_url: default_uploads_url(),
            database_path: default_database_path(),
            create_database: default_create_database(),
            preserve_notes_on_save: false,
            language: default_language(),
            mangadex: None,
        }
    }
}

fn shiori_home() -> PathBuf {
    match std::env::var("SHIORI_HOME") {
        Ok(path) => PathBuf::from(path),
        Err(_) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".shiori"),
    }
}

fn default_auth_url() -> String {
    DEFAULT_AUTH_URL.to_string()
}

fn default_api_url() -> String {
    "https://api.mangadex.org".to_string()
}

fn default_uploads_url() -> String {
    "https://uploads.mangadex.org".to_string()
}

fn default_database_path() -> String {
    let path = shiori_home();
    if !path.exists() {
        let _ = std::fs::create_dir_all(&path);
    }
    path.join("shiori.db").display().to_string()
}

fn default_create_database() -> bool {
    true
}

fn default_language() -> String {
    "en".to_string()
}

impl Config {
    pub fn open<P: AsRef<Path>>(path: Option<P>) -> Result<Config, anyhow::Error> {
        let config_path = match path {
            Some(p) => PathBuf::new().join(p),
            None => shiori_home().join("config.yml"),
        };

        let mut cfg = match std::fs::File::open(&config_path) {
            Ok(file) => {
                info!("Open config from {:?}", config_path);
                let mut cfg: Self = serde_yml::from_reader(file)?;
                cfg.path = config_path;
                cfg
            }
            Err(_) => {
                let cfg = Config {
                    path: config_path,
                    ..Default::default()
                };
                cfg.save()?;
                info!("Write default config at {:?}", cfg.path);
                cfg
            }
        };

        cfg.apply_env();
        Ok(cfg)
    }

    pub fn save(&self) -> Result<(), anyhow::Error> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_yml::to_string(&self)?)?;

        Ok(())
    }

    /// `MANGADEX_*` variables take precedence over the file.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    fn apply_env_with<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let overrides = [
            ("MANGADEX_USERNAME", var("MANGADEX_USERNAME")),
            ("MANGADEX_PASSWORD", var("MANGADEX_PASSWORD")),
            ("MANGADEX_CLIENT_ID", var("MANGADEX_CLIENT_ID")),
            ("MANGADEX_CLIENT_SECRET", var("MANGADEX_CLIENT_SECRET")),
        ];

        for (key, value) in overrides {
            let Some(value) = value else {
                continue;
            };
            let mangadex = self.mangadex.get_or_insert_with(MangaDexConfig::default);
            match key {
                "MANGADEX_USERNAME" => mangadex.username = value,
                "MANGADEX_PASSWORD" => mangadex.password = value,
                "MANGADEX_CLIENT_ID" => mangadex.client_id = value,
                _ => mangadex.client_secret = value,
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let cfg: Config = serde_yml::from_str("database_path: /tmp/shiori-test.db\n").unwrap();

        assert_eq!(cfg.database_path, "/tmp/shiori-test.db");
        assert_eq!(cfg.auth_url, DEFAULT_AUTH_URL);
        assert_eq!(cfg.api_url, "https://api.mangadex.org");
        assert_eq!(cfg.language, "en");
        assert!(cfg.create_database);
        assert!(!cfg.preserve_notes_on_save);
        assert_eq!(cfg.mangadex, None);
    }

    #[test]
    fn test_mangadex_section() {
        let cfg: Config = serde_yml::from_str(
            r#"
database_path: /tmp/shiori-test.db
preserve_notes_on_save: true
mangadex:
  username: reader
  password: hunter22
  client_id: personal-client-abc
  client_secret: s3cret
"#,
        )
        .unwrap();

        assert!(cfg.preserve_notes_on_save);
        assert_eq!(
            cfg.mangadex,
            Some(MangaDexConfig {
                username: "reader".to_string(),
                password: "hunter22".to_string(),
                client_id: "personal-client-abc".to_string(),
                client_secret: "s3cret".to_string(),
            })
        );
    }

    #[test]
    fn test_env_overrides_file() {
        let mut cfg: Config = serde_yml::from_str(
            r#"
database_path: /tmp/shiori-test.db
mangadex:
  username: reader
  password: from-file
"#,
        )
        .unwrap();
        let env = HashMap::from([
            ("MANGADEX_PASSWORD", "from-env"),
            ("MANGADEX_CLIENT_ID", "env-client"),
        ]);

        cfg.apply_env_with(|key| env.get(key).map(|v| v.to_string()));

        let mangadex = cfg.mangadex.unwrap();
        assert_eq!(mangadex.username, "reader");
        assert_eq!(mangadex.password, "from-env");
        assert_eq!(mangadex.client_id, "env-client");
        assert_eq!(mangadex.client_secret, "");
    }

    #[test]
    fn test_no_env_leaves_account_unset() {
        let mut cfg: Config = serde_yml::from_str("database_path: /tmp/shiori-test.db\n").unwrap();

        cfg.apply_env_with(|_| None);

        assert_eq!(cfg.mangadex, None);
    }
}
