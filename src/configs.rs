// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Configuration
//!
//! Broker connection parameters, loaded from an optional `config/amqp` file
//! (any format the `config` crate understands) overlaid with `AMQP_*`
//! environment variables, e.g. `AMQP_HOST`, `AMQP_PORT`, `AMQP_CONNECTION_NAME`.

use crate::errors::AmqpError;
use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::error;

/// RabbitMQ connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AmqpConfigs {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
    /// Name reported to the broker for this connection.
    pub connection_name: String,
}

impl Default for AmqpConfigs {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 5672,
            user: "guest".to_owned(),
            password: "guest".to_owned(),
            vhost: "/".to_owned(),
            connection_name: "pubsub".to_owned(),
        }
    }
}

impl AmqpConfigs {
    /// Loads settings from `config/amqp` and the environment, falling back to
    /// the defaults for anything left unset.
    ///
    /// # Returns
    /// The merged settings, or `AmqpError::ConfigError` if a source is malformed
    pub fn load() -> Result<AmqpConfigs, AmqpError> {
        Self::load_from("config/amqp")
    }

    /// Same as [`AmqpConfigs::load`] with an explicit file stem.
    ///
    /// # Parameters
    /// * `file` - Path of the config file without extension; it may be missing
    pub fn load_from(file: &str) -> Result<AmqpConfigs, AmqpError> {
        Config::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(Environment::with_prefix("AMQP").try_parsing(true))
            .build()
            .and_then(|cfg| cfg.try_deserialize::<AmqpConfigs>())
            .map_err(|err| {
                error!(error = err.to_string(), "failure to load amqp configs");
                AmqpError::ConfigError(err.to_string())
            })
    }

    /// Renders the `amqp://` URI.
    ///
    /// User, password and vhost are percent-encoded, so the default `/` vhost
    /// becomes `%2F` and credentials may contain `@`, `:` or `/`.
    ///
    /// # Returns
    /// The URI handed to `lapin::Connection::connect`
    pub fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            encode_component(&self.user),
            encode_component(&self.password),
            self.host,
            self.port,
            encode_component(&self.vhost)
        )
    }
}

/// Percent-encodes everything outside the RFC 3986 unreserved set.
fn encode_component(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}
