//! Link service configuration

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use datalink_core::{CREATOR_PORT, LINK_PORT, MAX_RECEIVE};
use datalink_transport::{KeepaliveConfig, TcpLinkConfig};
use datalink_wire::Hello;

/// Environment variable prefix read by [`LinkConfig::from_env`]
pub const ENV_PREFIX: &str = "DATALINK_";

/// Invalid configuration value
#[derive(Error, Debug, PartialEq, Eq)]
#[error("Invalid value {value:?} for {var}: {reason}")]
pub struct ConfigError {
    pub var: String,
    pub value: String,
    pub reason: String,
}

/// How `service_start` brings the link up
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StartMode {
    /// Try to connect out, host a server if nobody is listening
    #[default]
    Auto,
    /// Only ever host
    ServerOnly,
    /// Only ever connect out
    ClientOnly,
}

impl FromStr for StartMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(StartMode::Auto),
            "server" | "server-only" | "server_only" => Ok(StartMode::ServerOnly),
            "client" | "client-only" | "client_only" => Ok(StartMode::ClientOnly),
            other => Err(format!("unknown start mode '{other}'")),
        }
    }
}

/// Identity announced in our HELLO
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalIdentity {
    pub application: String,
    pub version: String,
    /// Folder the peer should export files into
    pub path: String,
    pub exe: String,
}

impl Default for LocalIdentity {
    fn default() -> Self {
        LocalIdentity {
            application: "Data Link".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            path: String::new(),
            exe: String::new(),
        }
    }
}

impl LocalIdentity {
    pub fn hello(&self) -> Hello {
        Hello {
            application: self.application.clone(),
            version: self.version.clone(),
            path: self.path.clone(),
            exe: self.exe.clone(),
        }
    }
}

/// Link service configuration
#[derive(Clone, Debug)]
pub struct LinkConfig {
    /// Nominal tick interval while idle
    pub tick_interval: Duration,
    /// Messages dispatched per tick at most
    pub max_receive: usize,
    /// Host the client side connects to
    pub host: String,
    /// Port the client side connects to
    pub port: u16,
    /// Port the server side listens on
    pub listen_port: u16,
    pub start_mode: StartMode,
    pub transport: TcpLinkConfig,
    pub identity: LocalIdentity,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            tick_interval: Duration::from_secs(1) / 30,
            max_receive: MAX_RECEIVE,
            host: "127.0.0.1".to_string(),
            port: CREATOR_PORT,
            listen_port: LINK_PORT,
            start_mode: StartMode::default(),
            transport: TcpLinkConfig::default(),
            identity: LocalIdentity::default(),
        }
    }
}

impl LinkConfig {
    /// Defaults overlaid with `DATALINK_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with values from `lookup`, keyed by full variable
    /// name.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = LinkConfig::default();
        let env = Env { lookup };

        if let Some(v) = env.get("HOST") {
            config.host = v;
        }
        env.parse("PORT", &mut config.port)?;
        env.parse("LISTEN_PORT", &mut config.listen_port)?;
        env.parse("MAX_RECEIVE", &mut config.max_receive)?;
        env.parse("START_MODE", &mut config.start_mode)?;
        env.duration("TICK_INTERVAL", &mut config.tick_interval)?;

        let transport = &mut config.transport;
        env.duration("SOCKET_TIMEOUT", &mut transport.socket_timeout)?;
        env.parse("MAX_CHUNK_SIZE", &mut transport.max_chunk_size)?;

        let keepalive: &mut KeepaliveConfig = &mut transport.keepalive;
        env.duration("HANDSHAKE_TIMEOUT", &mut keepalive.handshake_timeout)?;
        env.duration("KEEPALIVE_TIMEOUT", &mut keepalive.keepalive_timeout)?;
        env.duration("PING_INTERVAL", &mut keepalive.ping_interval)?;
        env.flag("USE_KEEPALIVE", &mut keepalive.use_keepalive)?;
        env.flag("USE_PING", &mut keepalive.use_ping)?;

        let identity = &mut config.identity;
        if let Some(v) = env.get("APPLICATION") {
            identity.application = v;
        }
        if let Some(v) = env.get("PATH") {
            identity.path = v;
        }
        if let Some(v) = env.get("EXE") {
            identity.exe = v;
        }

        if config.max_receive == 0 {
            return Err(env.error("MAX_RECEIVE", "0", "must be at least 1"));
        }

        Ok(config)
    }
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(&format!("{ENV_PREFIX}{key}"))
    }

    fn error(&self, key: &str, value: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError {
            var: format!("{ENV_PREFIX}{key}"),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    fn parse<T>(&self, key: &str, slot: &mut T) -> Result<(), ConfigError>
    where
        T: FromStr,
        T::Err: ToString,
    {
        if let Some(v) = self.get(key) {
            *slot = v
                .trim()
                .parse()
                .map_err(|e: T::Err| self.error(key, &v, e.to_string()))?;
        }
        Ok(())
    }

    fn duration(&self, key: &str, slot: &mut Duration) -> Result<(), ConfigError> {
        if let Some(v) = self.get(key) {
            *slot = humantime::parse_duration(v.trim())
                .map_err(|e| self.error(key, &v, e.to_string()))?;
        }
        Ok(())
    }

    fn flag(&self, key: &str, slot: &mut bool) -> Result<(), ConfigError> {
        if let Some(v) = self.get(key) {
            *slot = match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(self.error(key, &v, "expected a boolean")),
            };
        }
        Ok(())
    }
}
