use crate::cli::ServeArgs;
use crate::k8s::types::IdentityScheme;
use crate::{PodtagError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_FORWARD_URL: &str = "http://localhost:9411/api/v2/spans";
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address the HTTP server binds to
    pub listen: SocketAddr,
    /// Collector endpoint span batches are posted to
    pub forward_url: String,
    pub forward_timeout_secs: u64,
    /// Largest span batch accepted, before and after decompression
    pub max_body_bytes: usize,
    pub identity_scheme: IdentityScheme,
    /// Namespaces to watch; empty watches all namespaces
    pub namespaces: Vec<String>,
    /// Labels attached to spans; empty attaches every label
    pub label_allow_list: Vec<String>,
    /// Prepended to every tag key added to a span
    pub tag_prefix: String,
    /// Span tags holding the pod identity, in priority order
    pub identity_keys: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            forward_url: DEFAULT_FORWARD_URL.to_string(),
            forward_timeout_secs: 10,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            identity_scheme: IdentityScheme::Namespaced,
            namespaces: Vec::new(),
            label_allow_list: Vec::new(),
            tag_prefix: String::new(),
            identity_keys: vec!["k8s.pod".to_string(), "pod".to_string()],
        }
    }
}

impl Config {
    /// Read a YAML config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        serde_yaml::from_str(&raw).map_err(|e| {
            PodtagError::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Defaults, or the given file if any
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    /// Command line flags win over the file
    pub fn apply_overrides(&mut self, args: &ServeArgs) {
        if let Some(listen) = args.listen {
            self.listen = listen;
        }
        if let Some(url) = &args.forward_url {
            self.forward_url = url.clone();
        }
        if let Some(max) = args.max_body_bytes {
            self.max_body_bytes = max;
        }
        if args.name_only {
            self.identity_scheme = IdentityScheme::NameOnly;
        }
        if !args.namespaces.is_empty() {
            self.namespaces = args.namespaces.clone();
        }
        if !args.labels.is_empty() {
            self.label_allow_list = args.labels.clone();
        }
        if let Some(prefix) = &args.tag_prefix {
            self.tag_prefix = prefix.clone();
        }
        if !args.identity_keys.is_empty() {
            self.identity_keys = args.identity_keys.clone();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.identity_keys.is_empty() {
            return Err(PodtagError::ConfigError(
                "identity_keys must name at least one span tag".to_string(),
            ));
        }
        if self.identity_keys.iter().any(|k| k.is_empty()) {
            return Err(PodtagError::ConfigError(
                "identity_keys must not contain empty keys".to_string(),
            ));
        }
        if self.namespaces.iter().any(|ns| ns.trim().is_empty()) {
            return Err(PodtagError::ConfigError(
                "namespaces must not contain empty names".to_string(),
            ));
        }
        if self.label_allow_list.iter().any(|l| l.is_empty()) {
            return Err(PodtagError::ConfigError(
                "label_allow_list must not contain empty keys".to_string(),
            ));
        }
        if self.forward_timeout_secs == 0 {
            return Err(PodtagError::ConfigError(
                "forward_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(PodtagError::ConfigError(
                "max_body_bytes must be greater than 0".to_string(),
            ));
        }

        let url = reqwest::Url::parse(&self.forward_url).map_err(|e| {
            PodtagError::ConfigError(format!("Invalid forward_url {}: {}", self.forward_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PodtagError::ConfigError(format!(
                "forward_url must be http or https, got {}",
                url.scheme()
            )));
        }

        Ok(())
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(self.forward_timeout_secs)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| PodtagError::ConfigError(format!("Failed to render config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.listen.port(), 8080);
        assert_eq!(config.identity_scheme, IdentityScheme::Namespaced);
        assert!(config.namespaces.is_empty());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "identity_scheme: name-only\nnamespaces: [prod, staging]\nlabel_allow_list: [app]\ntag_prefix: k8s."
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();

        assert_eq!(config.identity_scheme, IdentityScheme::NameOnly);
        assert_eq!(config.namespaces, vec!["prod", "staging"]);
        assert_eq!(config.label_allow_list, vec!["app"]);
        assert_eq!(config.tag_prefix, "k8s.");
        assert_eq!(config.forward_url, DEFAULT_FORWARD_URL);
        assert_eq!(config.identity_keys, vec!["k8s.pod", "pod"]);
        assert_eq!(config.forward_timeout_secs, 10);
        assert_eq!(config.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "namespace: prod").unwrap();

        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, PodtagError::ConfigError(_)));
    }

    #[test]
    fn test_overrides_win() {
        let mut config = Config::default();
        let args = ServeArgs {
            listen: Some("127.0.0.1:9000".parse().unwrap()),
            forward_url: Some("http://zipkin:9411/api/v2/spans".to_string()),
            max_body_bytes: Some(1024),
            name_only: true,
            namespaces: vec!["prod".to_string()],
            labels: vec!["app".to_string()],
            tag_prefix: Some("pod.".to_string()),
            identity_keys: vec!["peer.pod".to_string()],
        };

        config.apply_overrides(&args);

        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.forward_url, "http://zipkin:9411/api/v2/spans");
        assert_eq!(config.max_body_bytes, 1024);
        assert_eq!(config.identity_scheme, IdentityScheme::NameOnly);
        assert_eq!(config.namespaces, vec!["prod"]);
        assert_eq!(config.label_allow_list, vec!["app"]);
        assert_eq!(config.tag_prefix, "pod.");
        assert_eq!(config.identity_keys, vec!["peer.pod"]);
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            Config {
                identity_keys: vec![],
                ..Config::default()
            },
            Config {
                namespaces: vec!["".to_string()],
                ..Config::default()
            },
            Config {
                forward_url: "not a url".to_string(),
                ..Config::default()
            },
            Config {
                forward_url: "ftp://collector/spans".to_string(),
                ..Config::default()
            },
            Config {
                forward_timeout_secs: 0,
                ..Config::default()
            },
            Config {
                max_body_bytes: 0,
                ..Config::default()
            },
        ];

        for config in cases {
            assert!(config.validate().is_err(), "{:?} should be invalid", config);
        }
    }
}
