use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::classify::ClientClasses;
use crate::error::{Error, Result};
use crate::options::OptionRegistry;
use crate::packet::Family;

/// Client classification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Family every class expression is compiled for.
    pub family: Family,
    /// Site-specific option names usable as `option[name]`.
    #[serde(default)]
    pub option_definitions: Vec<OptionDefinition>,
    /// Classes in evaluation order.
    #[serde(default)]
    pub client_classes: Vec<ClientClassDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OptionDefinition {
    pub name: String,
    pub code: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientClassDefinition {
    pub name: String,
    /// Boolean expression a packet must satisfy to join the class.
    pub test: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            family: Family::V4,
            option_definitions: Vec::new(),
            client_classes: vec![
                ClientClassDefinition {
                    name: "pxe-clients".to_string(),
                    test: "substring(option[vendor-class-identifier].text, 0, 9) == 'PXEClient'"
                        .to_string(),
                },
                ClientClassDefinition {
                    name: "relayed".to_string(),
                    test: "relay4[1].exists or not pkt4.giaddr == 0.0.0.0".to_string(),
                },
            ],
        }
    }
}

impl Config {
    /// Loads and validates the configuration at `path`.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`, writing the default configuration there first if the
    /// file does not exist.
    pub async fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if tokio::fs::try_exists(path).await? {
            Self::load(path).await
        } else {
            let config = Config::default();
            config.save(path).await?;
            Ok(config)
        }
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Checks names and compiles every class test.
    pub fn validate(&self) -> Result<()> {
        self.check_names()?;
        ClientClasses::from_config(self).map(|_| ())
    }

    pub(crate) fn check_names(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for class in &self.client_classes {
            if class.name.trim().is_empty() {
                return Err(Error::InvalidConfig(
                    "client class name must not be empty".to_string(),
                ));
            }
            if !seen.insert(class.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "client class '{}' is defined more than once",
                    class.name
                )));
            }
        }
        Ok(())
    }

    /// Standard option names plus this configuration's definitions.
    pub fn registry(&self) -> Result<OptionRegistry> {
        let mut registry = OptionRegistry::standard();
        for definition in &self.option_definitions {
            registry.define(self.family, &definition.name, definition.code)?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestGuard(String);
    impl Drop for TestGuard {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    fn class(name: &str, test: &str) -> ClientClassDefinition {
        ClientClassDefinition {
            name: name.to_string(),
            test: test.to_string(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_class_name() {
        let config = Config {
            client_classes: vec![
                class("a", "option[1].exists"),
                class("a", "option[2].exists"),
            ],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_expression_is_rejected() {
        let config = Config {
            client_classes: vec![class("broken", "option[60].text ==")],
            ..Default::default()
        };
        let error = config.validate().unwrap_err().to_string();
        assert!(error.contains("broken"));
        assert!(error.contains("syntax error"));
    }

    #[test]
    fn test_wrong_family_expression_is_rejected() {
        let config = Config {
            family: Family::V6,
            client_classes: vec![class("v4-only", "pkt4.htype == 0x01")],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_option_definitions_extend_registry() {
        let config = Config {
            option_definitions: vec![OptionDefinition {
                name: "site-tag".to_string(),
                code: 224,
            }],
            client_classes: vec![class("tagged", "option[site-tag].exists")],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.registry().unwrap().lookup(Family::V4, "site-tag"), Some(224));
    }

    #[test]
    fn test_invalid_option_definition() {
        let config = Config {
            option_definitions: vec![OptionDefinition {
                name: "bad".to_string(),
                code: 255,
            }],
            ..Default::default()
        };
        assert!(config.registry().is_err());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let path = "test_config_save_and_load.json".to_string();
        let _guard = TestGuard(path.clone());

        let config = Config {
            family: Family::V6,
            client_classes: vec![class("relayed", "relay6[0].option[18].exists")],
            ..Default::default()
        };
        config.save(&path).await.unwrap();

        let loaded = Config::load(&path).await.unwrap();
        assert_eq!(loaded.family, Family::V6);
        assert_eq!(loaded.client_classes, config.client_classes);
    }

    #[tokio::test]
    async fn test_load_or_create_writes_default() {
        let path = "test_config_load_or_create.json".to_string();
        let _guard = TestGuard(path.clone());

        let created = Config::load_or_create(&path).await.unwrap();
        assert!(std::path::Path::new(&path).exists());
        let loaded = Config::load_or_create(&path).await.unwrap();
        assert_eq!(created.client_classes, loaded.client_classes);
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_file() {
        let path = "test_config_invalid.json".to_string();
        let _guard = TestGuard(path.clone());

        tokio::fs::write(
            &path,
            r#"{"family":"v4","client_classes":[{"name":"x","test":"pkt6.msgtype == 0x01"}]}"#,
        )
        .await
        .unwrap();
        let error = Config::load(&path).await.unwrap_err();
        assert!(matches!(error, Error::InvalidConfig(_)));
    }
}
