//! Resolution of a server's SSH target and credentials

use std::path::PathBuf;

use rk_core::store::{self, method_key, server_key};
use rk_core::{AuthMethod, ConfigError, ConfigStore, Secret, ServerId};

/// Where and how to open a tunnel for one server
#[derive(Debug, Clone)]
pub struct ResolvedCredentials {
    /// Method the credentials were resolved for
    pub auth_method: AuthMethod,
    /// `user@host:port`
    pub hostname: String,
    /// Private key file for key authentication
    pub sshkey: Option<PathBuf>,
    /// Password, or the key's passphrase
    pub password: Option<Secret>,
}

/// Resolve hostname and credentials for `id`.
///
/// Only keys belonging to the server's configured method are read:
/// a password login never touches key-file settings and vice versa.
pub fn resolve(store: &dyn ConfigStore, id: &ServerId) -> Result<ResolvedCredentials, ConfigError> {
    let auth_method = store::auth_method(store, id)?;

    let address = store::require_string(store, &method_key(id, auth_method, "address"))?;
    let username = store::require_string(store, &method_key(id, auth_method, "username"))?;
    let port = store::require_string(store, &method_key(id, auth_method, "port"))?;
    let hostname = format!("{}@{}:{}", username, address, port);

    let (sshkey, password) = match auth_method {
        AuthMethod::Password => (None, store.get_secret(&server_key(id, "password"))),
        AuthMethod::KeyFile => {
            let keyfile = store::require_string(store, &method_key(id, auth_method, "keyfile"))?;
            let passphrase = store
                .get_secret(&server_key(id, "passphrase"))
                .filter(|p| !p.is_empty());
            (Some(PathBuf::from(keyfile)), passphrase)
        }
        AuthMethod::ConfigFile => {
            tracing::warn!(
                "Server {} uses config-file authentication; connecting without credentials",
                id
            );
            (None, None)
        }
    };

    Ok(ResolvedCredentials {
        auth_method,
        hostname,
        sshkey,
        password,
    })
}
