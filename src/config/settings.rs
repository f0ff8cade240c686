use config::ConfigError;
use serde::Deserialize;

use crate::broker::Endpoint;

/// Top-level configuration settings for the application.
///
/// Includes settings for the HTTP server, the broker connection and logging.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub log: LogSettings,
}

/// Configuration settings for the server.
///
/// Defines the host and port the long-poll server will bind to.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    /// Bind address as `host:port`, bracketing IPv6 hosts.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Sets host and port from `host:port`. An empty host (`:4152`) binds
    /// every interface.
    pub fn set_address(&mut self, address: &str) -> Result<(), ConfigError> {
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| ConfigError::Message(format!("address {address:?} has no port")))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| ConfigError::Message(format!("address {address:?}: {e}")))?;

        self.host = if host.is_empty() {
            "0.0.0.0".to_string()
        } else {
            host.trim_start_matches('[').trim_end_matches(']').to_string()
        };
        self.port = port;
        Ok(())
    }
}

/// Configuration settings for the broker connection.
///
/// `nsqd` is a single broker node; `lookupd` is a discovery service. When
/// both are set the node address wins. An empty string disables either.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    pub nsqd: String,
    pub lookupd: String,
}

impl BrokerSettings {
    pub fn endpoint(&self) -> Option<Endpoint> {
        if !self.nsqd.is_empty() {
            Some(Endpoint::Nsqd(self.nsqd.clone()))
        } else if !self.lookupd.is_empty() {
            Some(Endpoint::Lookupd(self.lookupd.clone()))
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub nsqd: Option<String>,
    pub lookupd: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

/// Values given on the command line. They win over file and environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub address: Option<String>,
    pub nsqd: Option<String>,
    pub lookupd: Option<String>,
    pub log_level: Option<String>,
}

impl Settings {
    pub fn apply(&mut self, overrides: Overrides) -> Result<(), ConfigError> {
        if let Some(address) = overrides.address {
            self.server.set_address(&address)?;
        }
        if let Some(nsqd) = overrides.nsqd {
            self.broker.nsqd = nsqd;
        }
        if let Some(lookupd) = overrides.lookupd {
            self.broker.lookupd = lookupd;
        }
        if let Some(level) = overrides.log_level {
            self.log.level = level;
        }
        Ok(())
    }
}

/// Provides default values for `Settings`.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 4152,
            },
            broker: BrokerSettings {
                nsqd: "127.0.0.1:4150".to_string(),
                lookupd: "127.0.0.1:4161".to_string(),
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}
