//! Signing server configuration.

/// Configuration of the signing server, loaded from the environment.
#[derive(Clone)]
pub struct SignServerConfig {
    /// Bind address.
    pub listen: String,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Access key id the signatures are for.
    pub access_key_id: Option<String>,
    /// Secret used to derive signing keys.
    pub secret_access_key: Option<String>,
}

impl std::fmt::Debug for SignServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignServerConfig")
            .field("listen", &self.listen)
            .field("log_level", &self.log_level)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Default for SignServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_owned(),
            log_level: "info".to_owned(),
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

impl SignServerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `SIGN_LISTEN` | `0.0.0.0:8080` |
    /// | `LOG_LEVEL` | `info` |
    /// | `AWS_ACCESS_KEY_ID` | none |
    /// | `AWS_SECRET_ACCESS_KEY` | none (required to serve) |
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(v) = lookup("SIGN_LISTEN") {
            config.listen = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }
        config.access_key_id = lookup("AWS_ACCESS_KEY_ID").filter(|v| !v.is_empty());
        config.secret_access_key = lookup("AWS_SECRET_ACCESS_KEY").filter(|v| !v.is_empty());
        config
    }
}
