use anyhow::Context;
use serde_derive::Deserialize;
use serde_inline_default::serde_inline_default;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3002;
pub const DEFAULT_BODY_LIMIT: usize = 64 * 1024;

#[serde_inline_default]
#[derive(Debug, Deserialize, Eq, PartialEq, Clone)]
pub struct Config {
    #[serde_inline_default(DEFAULT_BIND.to_string())]
    pub bind: String,

    #[serde_inline_default(DEFAULT_PORT)]
    pub port: u16,

    /// Maximum accepted request body in bytes.
    #[serde_inline_default(DEFAULT_BODY_LIMIT)]
    pub body_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl Config {
    /// Applies a `PORT` value taken from the environment.
    pub fn with_env_port(mut self, port: Option<String>) -> anyhow::Result<Self> {
        if let Some(port) = port {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("invalid PORT value {port:?}"))?;
        }
        Ok(self)
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.bind, self.port);
        addr.parse()
            .with_context(|| format!("invalid listen address {addr}"))
    }
}

pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let res = toml::from_str(&content)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(res)
}
