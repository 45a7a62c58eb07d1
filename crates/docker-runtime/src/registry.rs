//! Registry authentication, scoped per container operation
//!
//! Instead of mutating the daemon-wide docker login state, each container
//! operation that needs registry credentials gets a throwaway `DOCKER_CONFIG`
//! directory holding exactly the auth entries it needs. The directory is
//! removed when the [`AuthScope`] drops, so credentials never outlive the
//! operation they were created for.

use crate::{Error, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::TempDir;

/// Auth key docker uses for the official registry
const OFFICIAL_REGISTRY: &str = "https://index.docker.io/v1/";

/// Login credentials for one container registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryLogin {
    /// Registry URL; `None` means the official registry
    pub registry_url: Option<String>,
    /// Login user
    pub username: String,
    /// Login password or access token
    pub password: String,
}

/// Synthetic login for the platform's own built-in registry
///
/// Constructed per job from the externally configured server URL and the
/// job's token, plus the step-scoped access token, and prepended to the
/// configured logins for the duration of one container operation.
#[derive(Debug, Clone)]
pub struct BuiltInRegistryLogin {
    /// Externally configured server base URL
    pub server_url: String,
    /// The job token, used as login user
    pub job_token: String,
    /// Step-scoped registry access token
    pub access_token: String,
}

impl BuiltInRegistryLogin {
    /// The registry auth key: the server authority without scheme
    fn registry_key(&self) -> String {
        self.server_url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string()
    }
}

/// Reject two logins for the same registry URL
///
/// Later entries would silently shadow earlier ones inside the generated
/// docker config, so duplicates are a configuration error surfaced before
/// execution begins.
pub fn validate_registry_logins(logins: &[RegistryLogin]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for login in logins {
        if !seen.insert(login.registry_url.clone()) {
            let message = match &login.registry_url {
                Some(url) => format!("duplicate login entry for registry '{url}'"),
                None => "duplicate login entry for official registry".to_string(),
            };
            return Err(Error::Config(message));
        }
    }
    Ok(())
}

/// A temporary `DOCKER_CONFIG` directory carrying registry credentials
///
/// Lives exactly as long as the container operation it was created for.
#[derive(Debug)]
pub struct AuthScope {
    dir: TempDir,
}

impl AuthScope {
    /// Write a docker config with the given logins, built-in login first
    pub fn new(
        logins: &[RegistryLogin],
        builtin: Option<&BuiltInRegistryLogin>,
    ) -> Result<Self> {
        let mut auths = BTreeMap::new();
        if let Some(builtin) = builtin {
            auths.insert(
                builtin.registry_key(),
                json!({
                    "auth": BASE64.encode(format!("{}:{}", builtin.job_token, builtin.access_token))
                }),
            );
        }
        for login in logins {
            let key = login
                .registry_url
                .clone()
                .unwrap_or_else(|| OFFICIAL_REGISTRY.to_string());
            auths.entry(key).or_insert_with(|| {
                json!({
                    "auth": BASE64.encode(format!("{}:{}", login.username, login.password))
                })
            });
        }

        let dir = TempDir::with_prefix("docker-auth-")?;
        let config = json!({ "auths": auths });
        std::fs::write(
            dir.path().join("config.json"),
            serde_json::to_vec_pretty(&config)?,
        )?;
        Ok(Self { dir })
    }

    /// The directory to export as `DOCKER_CONFIG`
    pub fn config_dir(&self) -> &Path {
        self.dir.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login(url: Option<&str>) -> RegistryLogin {
        RegistryLogin {
            registry_url: url.map(str::to_string),
            username: "user".to_string(),
            password: "secret".to_string(),
        }
    }

    #[test]
    fn duplicate_registry_url_rejected() {
        let logins = vec![login(Some("ghcr.io")), login(Some("ghcr.io"))];
        let err = validate_registry_logins(&logins).unwrap_err();
        assert!(err.to_string().contains("ghcr.io"));
    }

    #[test]
    fn duplicate_official_registry_rejected() {
        let logins = vec![login(None), login(None)];
        assert!(validate_registry_logins(&logins).is_err());
    }

    #[test]
    fn distinct_registries_pass() {
        let logins = vec![login(None), login(Some("ghcr.io"))];
        assert!(validate_registry_logins(&logins).is_ok());
    }

    #[test]
    fn auth_scope_writes_config_json() {
        let builtin = BuiltInRegistryLogin {
            server_url: "https://ci.example.com".to_string(),
            job_token: "token".to_string(),
            access_token: "access".to_string(),
        };
        let scope = AuthScope::new(&[login(Some("ghcr.io"))], Some(&builtin)).unwrap();

        let raw = std::fs::read_to_string(scope.config_dir().join("config.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let auths = parsed.get("auths").unwrap();
        assert!(auths.get("ci.example.com").is_some());
        assert_eq!(
            auths["ghcr.io"]["auth"],
            BASE64.encode("user:secret")
        );
    }

    #[test]
    fn auth_scope_dir_removed_on_drop() {
        let scope = AuthScope::new(&[login(None)], None).unwrap();
        let path = scope.config_dir().to_path_buf();
        assert!(path.join("config.json").exists());
        drop(scope);
        assert!(!path.exists());
    }
}
