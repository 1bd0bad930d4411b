use std::env;
use std::path::PathBuf;
use vlcore::types::events::IceServer;

/// Server configuration, read from the environment with sensible
/// defaults for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to. `VOICELINK_ADDR`.
    pub bind_addr: String,
    /// Path of the redb database file. `VOICELINK_DB`.
    pub db_path: PathBuf,
    /// STUN/TURN endpoints handed to clients with call invitations.
    /// `VOICELINK_STUN` (comma-separated URLs) plus optionally
    /// `VOICELINK_TURN_URL`/`VOICELINK_TURN_USER`/`VOICELINK_TURN_PASS`.
    pub ice_servers: Vec<IceServer>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".into(),
            db_path: "voicelink.redb".into(),
            ice_servers: vec![
                IceServer::stun("stun:stun.l.google.com:19302"),
                IceServer::stun("stun:stun1.l.google.com:19302"),
            ],
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = env::var("VOICELINK_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(path) = env::var("VOICELINK_DB") {
            config.db_path = path.into();
        }
        if let Ok(urls) = env::var("VOICELINK_STUN") {
            config.ice_servers = urls
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(IceServer::stun)
                .collect();
        }
        if let (Ok(url), Ok(user), Ok(pass)) = (
            env::var("VOICELINK_TURN_URL"),
            env::var("VOICELINK_TURN_USER"),
            env::var("VOICELINK_TURN_PASS"),
        ) {
            config.ice_servers.push(IceServer::turn(url, user, pass));
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_include_stun_endpoints() {
        let config = ServerConfig::default();
        assert!(!config.ice_servers.is_empty());
        assert!(config.ice_servers.iter().all(|s| s.username.is_none()));
    }
}
