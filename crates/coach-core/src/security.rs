use secrecy::{ExposeSecret, SecretString};

/// Wraps an API key or password with secrecy protection (zeroized on drop, redacted in Debug).
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    /// Non-empty key or `None`.
    pub fn non_empty(value: Option<&str>) -> Option<Self> {
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(Self::new)
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_is_redacted() {
        let key = ApiKey::new("sk-secret");
        assert_eq!(format!("{key:?}"), "ApiKey([REDACTED])");
        assert_eq!(key.expose(), "sk-secret");
    }

    #[test]
    fn non_empty_filters_blank() {
        assert!(ApiKey::non_empty(None).is_none());
        assert!(ApiKey::non_empty(Some("  ")).is_none());
        assert_eq!(ApiKey::non_empty(Some(" k ")).unwrap().expose(), "k");
    }
}
