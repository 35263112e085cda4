//! Settings module which allows to manipulate the server from the outside.
//!
//! Sensible defaults are compiled in; a **.toml** file can override any of
//! them without touching the code.
use std::{fmt, path::Path};

use config::{Config, ConfigError, ValueKind};
use displaydoc::Display;
use serde::{
    de::{self, Deserializer, Visitor},
    Deserialize,
};
use thiserror::Error;
use tracing_subscriber::filter::EnvFilter;
use validator::{Validate, ValidationErrors};

#[derive(Debug, Display, Error)]
/// An error related to loading and validation of settings.
pub enum SettingsError {
    /// Loading configuration file failed: {0}.
    Loading(#[from] ConfigError),
    /// Validation failed: {0}.
    Validation(#[from] ValidationErrors),
}

#[derive(Debug, Validate, Deserialize)]
pub struct Settings {
    /// Defines where the aggregation REST API is exposed.
    pub api: ApiSettings,
    /// Settings regarding the model that is trained.
    pub model: ModelSettings,
    /// Defines the way the logging of the server is done via filter.
    pub log: LogSettings,
}

impl Settings {
    /// Loads and validates the settings via a configuration file.
    ///
    /// # Errors
    /// Fails when the loading of the configuration file or its validation failed.
    pub fn new(path: Option<impl AsRef<Path>>) -> Result<Self, SettingsError> {
        let settings = Self::load(path)?;
        settings.validate()?;
        Ok(settings)
    }

    fn load(path: Option<impl AsRef<Path>>) -> Result<Self, ConfigError> {
        match path {
            None => Self::set_default().build()?.try_deserialize(),
            Some(path) => Self::set_default()
                .add_source(config::File::from(path.as_ref()))
                .build()?
                .try_deserialize(),
        }
    }

    fn set_default() -> config::ConfigBuilder<config::builder::DefaultState> {
        Config::builder()
            .set_default(
                "api.bind_address",
                ValueKind::String("0.0.0.0:8000".to_string()),
            )
            .unwrap_or_default()
            .set_default("model.feature_weight", ValueKind::I64(12))
            .unwrap_or_default()
            .set_default(
                "log.filter",
                ValueKind::String("quilt=debug,info".to_string()),
            )
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Clone)]
/// Defines where the aggregation REST API is exposed.
pub struct ApiSettings {
    /// The address the HTTP server binds to.
    ///
    /// # Example
    ///
    /// **TOML**
    /// ```text
    /// [api]
    /// bind_address = "0.0.0.0:8000"
    /// ```
    pub bind_address: std::net::SocketAddr,
}

#[derive(Debug, Deserialize, Clone)]
/// Settings regarding the model that is trained during runtime.
pub struct ModelSettings {
    /// The number of input features. The global weight vector carries one
    /// additional entry for the bias.
    ///
    /// # Example
    ///
    /// **TOML**
    /// ```text
    /// [model]
    /// feature_weight = 12
    /// ```
    pub feature_weight: usize,
}

#[derive(Debug, Default, Deserialize)]
/// Defines the way the logging of the server is done via filter.
pub struct LogSettings {
    /// Tokio tracing filter which filters spans and events based on a set of filter directives.
    ///
    /// # Example
    ///
    /// **TOML**
    /// ```text
    /// [log]
    /// filter = "quilt=debug,info"
    /// ```
    #[serde(deserialize_with = "deserialize_env_filter")]
    pub filter: EnvFilter,
}

// https://serde.rs/impl-deserialize.html
fn deserialize_env_filter<'de, D>(deserializer: D) -> Result<EnvFilter, D::Error>
where
    D: Deserializer<'de>,
{
    struct EnvFilterVisitor;
    impl<'de> Visitor<'de> for EnvFilterVisitor {
        type Value = EnvFilter;
        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(formatter, "check for valid tracing filter: https://docs.rs/tracing-subscriber/0.2.6/tracing_subscriber/filter/struct.EnvFilter.html#directives")
        }
        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            EnvFilter::try_new(value)
                .map_err(|_| de::Error::invalid_value(serde::de::Unexpected::Str(value), &self))
        }
    }
    deserializer.deserialize_str(EnvFilterVisitor)
}
