//! # Shop Configuration
//!
//! [`ShopConfig`] comes from three layers, later ones winning:
//!
//! 1. Built-in defaults
//! 2. An optional TOML file (path in `SHOP_CONFIG`)
//! 3. `SHOP_*` environment variables, e.g. `SHOP_JWT_SECRET`, `SHOP_TAX_RATE`
//!
//! The `config` module exports it as a [`Record`] so consumers can import
//! single fields, e.g. `config: ["jwt_secret"]`.

use crate::error::ShopError;
use modwire::Record;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

pub const ENV_PREFIX: &str = "SHOP_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub payment_secret_key: String,
    pub tax_rate: f64,
    pub host: String,
    pub port: u16,
    /// Capacity of the app server's request channel.
    pub request_buffer: usize,
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            database_url: "memory://shop".to_string(),
            jwt_secret: "change-me-in-production".to_string(),
            payment_secret_key: "sk_test_local".to_string(),
            tax_rate: 0.085,
            host: "127.0.0.1".to_string(),
            port: 3000,
            request_buffer: 32,
        }
    }
}

impl ShopConfig {
    /// Loads defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ShopError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| ShopError::Config(format!("{}: {e}", path.display())))?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        config.apply_env(std::env::vars())?;
        config.validate()?;
        info!(host = %config.host, port = config.port, "Configuration loaded");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ShopError> {
        toml::from_str(text).map_err(|e| ShopError::Config(e.to_string()))
    }

    /// Applies every `SHOP_<FIELD>` variable found in `vars`.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<(), ShopError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(field) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            debug!(variable = %name, "Environment override");
            match field {
                "DATABASE_URL" => self.database_url = value,
                "JWT_SECRET" => self.jwt_secret = value,
                "PAYMENT_SECRET_KEY" => self.payment_secret_key = value,
                "TAX_RATE" => self.tax_rate = parse(&name, &value)?,
                "HOST" => self.host = value,
                "PORT" => self.port = parse(&name, &value)?,
                "REQUEST_BUFFER" => self.request_buffer = parse(&name, &value)?,
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ShopError> {
        if self.payment_secret_key.is_empty() {
            return Err(ShopError::Config(
                "payment_secret_key is required".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.tax_rate) {
            return Err(ShopError::Config(format!(
                "tax_rate must be within [0, 1), got {}",
                self.tax_rate
            )));
        }
        if self.request_buffer == 0 {
            return Err(ShopError::Config("request_buffer must be positive".to_string()));
        }
        Ok(())
    }

    /// The field-addressable form other modules import from.
    pub fn to_record(&self) -> Record {
        Record::new()
            .with("database_url", self.database_url.clone())
            .with("jwt_secret", self.jwt_secret.clone())
            .with("payment_secret_key", self.payment_secret_key.clone())
            .with("tax_rate", self.tax_rate)
            .with("host", self.host.clone())
            .with("port", self.port)
            .with("request_buffer", self.request_buffer)
    }
}

fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ShopError> {
    value
        .parse()
        .map_err(|_| ShopError::Config(format!("{name} has an invalid value: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_overrides_defaults() {
        let config = ShopConfig::from_toml("jwt_secret = \"abc\"\nport = 8080\n").unwrap();
        assert_eq!(config.jwt_secret, "abc");
        assert_eq!(config.port, 8080);
        assert_eq!(config.tax_rate, 0.085);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = ShopConfig::from_toml("tax_rate = 0.2").unwrap();
        config
            .apply_env([
                ("SHOP_TAX_RATE".to_string(), "0.1".to_string()),
                ("HOME".to_string(), "/root".to_string()),
            ])
            .unwrap();
        assert_eq!(config.tax_rate, 0.1);

        let err = config
            .apply_env([("SHOP_PORT".to_string(), "eighty".to_string())])
            .unwrap_err();
        assert!(err.to_string().contains("SHOP_PORT"));
    }

    #[test]
    fn test_validation() {
        let config = ShopConfig {
            payment_secret_key: String::new(),
            ..ShopConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(ShopConfig::default().validate().is_ok());
    }

    #[test]
    fn test_record_fields() {
        let record = ShopConfig::default().to_record();
        assert_eq!(record.get::<String>("jwt_secret").unwrap(), "change-me-in-production");
        assert_eq!(*record.get::<f64>("tax_rate").unwrap(), 0.085);
        assert_eq!(record.len(), 7);
    }
}
