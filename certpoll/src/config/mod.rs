//! Selection configuration
//!
//! Programmatic options used when wiring a selector, and the TOML sections
//! they are read from.

mod error;

pub use error::*;

use crate::defaults::{DEFAULT_POLLING_INTERVAL, DEFAULT_STORE_LOCATION, MIN_POLLING_INTERVAL};
use crate::selector::PollingCertificateSelector;
use crate::source::local_store::FindType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Callback run against a freshly built selector, typically to register observers
pub type SelectorConfigurator = Arc<dyn Fn(&PollingCertificateSelector) + Send + Sync>;

/// Options shared by every source kind
#[derive(Clone)]
pub struct SelectionOptions {
    pub polling_interval: Duration,
    /// Require a trusted chain; only disable outside production
    pub valid_certificates_only: bool,
    pub configure_selector: Option<SelectorConfigurator>,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            polling_interval: DEFAULT_POLLING_INTERVAL,
            valid_certificates_only: true,
            configure_selector: None,
        }
    }
}

impl SelectionOptions {
    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    pub fn with_valid_certificates_only(mut self, valid_only: bool) -> Self {
        self.valid_certificates_only = valid_only;
        self
    }

    pub fn with_configurator<F>(mut self, configure: F) -> Self
    where
        F: Fn(&PollingCertificateSelector) + Send + Sync + 'static,
    {
        self.configure_selector = Some(Arc::new(configure));
        self
    }
}

impl fmt::Debug for SelectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectionOptions")
            .field("polling_interval", &self.polling_interval)
            .field("valid_certificates_only", &self.valid_certificates_only)
            .field("configure_selector", &self.configure_selector.is_some())
            .finish()
    }
}

/// Reject intervals below [`MIN_POLLING_INTERVAL`]
pub fn validate_polling_interval(interval: Duration) -> Result<()> {
    if interval < MIN_POLLING_INTERVAL {
        return Err(ConfigError::InvalidPollingInterval {
            interval,
            minimum: MIN_POLLING_INTERVAL,
        });
    }
    Ok(())
}

/// Options for selecting from a local certificate store
#[derive(Debug, Clone)]
pub struct LocalStoreOptions {
    pub location: PathBuf,
    pub find_type: FindType,
    pub find_value: String,
    /// PEM bundles of trusted roots; empty means the system bundle
    pub trust_anchors: Vec<PathBuf>,
    pub selection: SelectionOptions,
}

impl LocalStoreOptions {
    pub fn new(find_value: impl Into<String>) -> Self {
        Self {
            location: PathBuf::from(DEFAULT_STORE_LOCATION),
            find_type: FindType::default(),
            find_value: find_value.into(),
            trust_anchors: Vec::new(),
            selection: SelectionOptions::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.find_value.trim().is_empty() {
            return Err(ConfigError::Validation(
                "local store find_value is required".to_string(),
            ));
        }
        validate_polling_interval(self.selection.polling_interval)
    }
}

/// `[selection]` section of the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionSection {
    pub polling_interval_secs: u64,
    pub valid_certificates_only: bool,
    pub trust_anchors: Vec<PathBuf>,
}

impl Default for SelectionSection {
    fn default() -> Self {
        Self {
            polling_interval_secs: DEFAULT_POLLING_INTERVAL.as_secs(),
            valid_certificates_only: true,
            trust_anchors: Vec::new(),
        }
    }
}

impl SelectionSection {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        validate_polling_interval(self.polling_interval())
    }

    pub fn to_options(&self) -> SelectionOptions {
        SelectionOptions::default()
            .with_polling_interval(self.polling_interval())
            .with_valid_certificates_only(self.valid_certificates_only)
    }
}

/// `[source]` fields for `type = "local_store"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalStoreSection {
    #[serde(default = "default_store_location")]
    pub location: PathBuf,
    #[serde(default)]
    pub find_type: FindType,
    pub find_value: String,
}

fn default_store_location() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_LOCATION)
}

impl LocalStoreSection {
    pub fn validate(&self) -> Result<()> {
        if self.find_value.trim().is_empty() {
            return Err(ConfigError::Validation(
                "source.find_value must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_options(&self, selection: &SelectionSection) -> LocalStoreOptions {
        LocalStoreOptions {
            location: self.location.clone(),
            find_type: self.find_type,
            find_value: self.find_value.clone(),
            trust_anchors: selection.trust_anchors.clone(),
            selection: selection.to_options(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_defaults() {
        let section: SelectionSection = toml::from_str("").unwrap();
        assert_eq!(section, SelectionSection::default());
        assert_eq!(section.polling_interval(), Duration::from_secs(300));
        assert!(section.valid_certificates_only);

        let options = section.to_options();
        assert_eq!(options.polling_interval, DEFAULT_POLLING_INTERVAL);
        assert!(options.valid_certificates_only);
        assert!(options.configure_selector.is_none());
    }

    #[test]
    fn test_selection_rejects_short_interval() {
        let section: SelectionSection = toml::from_str("polling_interval_secs = 1").unwrap();
        assert!(matches!(
            section.validate(),
            Err(ConfigError::InvalidPollingInterval { .. })
        ));
    }

    #[test]
    fn test_minimum_interval_is_accepted() {
        validate_polling_interval(MIN_POLLING_INTERVAL).unwrap();
        assert!(validate_polling_interval(MIN_POLLING_INTERVAL - Duration::from_millis(1)).is_err());
    }

    #[test]
    fn test_local_store_section() {
        let section: LocalStoreSection = toml::from_str(
            r#"
find_type = "thumbprint"
find_value = "AB:CD"
"#,
        )
        .unwrap();

        assert_eq!(section.location, PathBuf::from(DEFAULT_STORE_LOCATION));
        assert_eq!(section.find_type, FindType::Thumbprint);
        section.validate().unwrap();

        let selection = SelectionSection {
            trust_anchors: vec![PathBuf::from("/tmp/roots.pem")],
            ..Default::default()
        };
        let options = section.to_options(&selection);
        assert_eq!(options.find_value, "AB:CD");
        assert_eq!(options.trust_anchors, vec![PathBuf::from("/tmp/roots.pem")]);
    }

    #[test]
    fn test_local_store_requires_find_value() {
        let section: LocalStoreSection = toml::from_str(r#"find_value = "  ""#).unwrap();
        assert!(matches!(section.validate(), Err(ConfigError::Validation(_))));

        let options = LocalStoreOptions::new("");
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_selection_options_debug_hides_callback() {
        let options = SelectionOptions::default().with_configurator(|_| {});
        let debug = format!("{:?}", options);
        assert!(debug.contains("configure_selector: true"));
    }
}
