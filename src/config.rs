//! Persisted JSON configuration for the two binaries.
//!
//! A missing private key is generated on first run and written back, so an
//! operator only has to fill in the chat account details and exchange public
//! keys between the two sides.

use std::path::Path;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::crypto::KeyPair;
use crate::error::{Error, Result};

/// Default config file name for the client binary.
pub const DEFAULT_CLIENT_CONFIG: &str = "config.json";

/// Default config file name for the server binary.
pub const DEFAULT_SERVER_CONFIG: &str = "config_server.json";

fn default_proxy_listen_addr() -> String {
    "127.0.0.1:9090".to_owned()
}

fn default_api_base_url() -> String {
    crate::chat::DEFAULT_API_BASE_URL.to_owned()
}

/// Chat account the tunnel runs over.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Provider session token.
    pub token: String,
    /// Room carrying the tunnel. Unused by the server, which serves every
    /// room its account can see.
    #[serde(default)]
    pub room_id: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Local address the SOCKS5 listener binds to.
    #[serde(default = "default_proxy_listen_addr")]
    pub proxy_listen_addr: String,
    /// Local identity, base64. Generated and written back when empty.
    #[serde(default)]
    pub private_key: String,
    /// The server's announced public key, base64.
    pub server_public_key: String,
    pub chat: ChatConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Local identity, base64. Generated and written back when empty.
    #[serde(default)]
    pub private_key: String,
    pub chat: ChatConfig,
}

impl ClientConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(path.as_ref(), self)
    }

    /// Parse the configured identity, generating and persisting one first
    /// if the config has none yet.
    pub fn ensure_keys(&mut self, path: impl AsRef<Path>) -> Result<KeyPair> {
        let (keys, generated) = materialize_keys(&mut self.private_key)?;
        if generated {
            self.save(path)?;
            tracing::info!(public_key = %keys.public(), "generated new client identity");
        }
        Ok(keys)
    }
}

impl ServerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(path.as_ref(), self)
    }

    /// Parse the configured identity, generating and persisting one first
    /// if the config has none yet. The public key is what operators put in
    /// each client's `server_public_key`.
    pub fn ensure_keys(&mut self, path: impl AsRef<Path>) -> Result<KeyPair> {
        let (keys, generated) = materialize_keys(&mut self.private_key)?;
        if generated {
            self.save(path)?;
            tracing::info!(public_key = %keys.public(), "generated new server identity");
        }
        Ok(keys)
    }
}

fn materialize_keys(private_key: &mut String) -> Result<(KeyPair, bool)> {
    if private_key.is_empty() {
        let keys = KeyPair::generate();
        *private_key = keys.secret().to_base64();
        Ok((keys, true))
    } else {
        Ok((KeyPair::from_secret_base64(private_key)?, false))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let raw = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Config(format!("cannot serialize config: {e}")))?;
    std::fs::write(path, raw)
        .map_err(|e| Error::Config(format!("cannot write {}: {e}", path.display())))?;

    // The file holds a private key.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| Error::Config(format!("cannot restrict {}: {e}", path.display())))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("sideband-test-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_client_config_defaults() {
        let parsed: ClientConfig = serde_json::from_str(
            r#"{
                "server_public_key": "abc",
                "chat": {"token": "tok", "room_id": "42"}
            }"#,
        )
        .unwrap();

        assert_eq!(parsed.proxy_listen_addr, "127.0.0.1:9090");
        assert_eq!(parsed.chat.api_base_url, crate::chat::DEFAULT_API_BASE_URL);
        assert!(parsed.private_key.is_empty());
    }

    #[test]
    fn test_ensure_keys_generates_and_persists() {
        let path = temp_path("client.json");
        let mut config: ClientConfig = serde_json::from_str(
            r#"{"server_public_key": "k", "chat": {"token": "t", "room_id": "42"}}"#,
        )
        .unwrap();

        let generated = config.ensure_keys(&path).unwrap();
        assert!(!config.private_key.is_empty());

        // The persisted file parses back to the same identity.
        let mut reloaded = ClientConfig::load(&path).unwrap();
        let restored = reloaded.ensure_keys(&path).unwrap();
        assert_eq!(restored.public(), generated.public());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_bad_key_string_rejected() {
        let mut config: ServerConfig = serde_json::from_str(
            r#"{"private_key": "!!!", "chat": {"token": "t"}}"#,
        )
        .unwrap();
        assert!(config.ensure_keys(temp_path("unused.json")).is_err());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        assert!(matches!(
            ClientConfig::load("/nonexistent/sideband.json"),
            Err(Error::Config(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_config_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let path = temp_path("server.json");
        let mut config: ServerConfig =
            serde_json::from_str(r#"{"chat": {"token": "t"}}"#).unwrap();
        config.ensure_keys(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        std::fs::remove_file(&path).ok();
    }
}
