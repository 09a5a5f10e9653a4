use scrobble_config::{ExclusionConfig, MAX_CUSTOM_PATHS};
use std::fmt;
use tracing::{debug, warn};

/// One exclusion rule, stored already normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionRule {
    /// URL scheme such as `pvr://`, compared case-insensitively
    ProtocolPrefix(String),
    /// Directory or file prefix; subdirectories are covered too
    PathPrefix(String),
}

/// Lowercase with forward slashes, so `\\NAS\Kids` and `//nas/kids` compare equal
pub fn normalize_path(path: &str) -> String {
    path.trim().replace('\\', "/").to_lowercase()
}

impl ExclusionRule {
    pub fn protocol(prefix: &str) -> Self {
        ExclusionRule::ProtocolPrefix(prefix.trim().to_lowercase())
    }

    pub fn path(prefix: &str) -> Self {
        ExclusionRule::PathPrefix(normalize_path(prefix))
    }

    fn matches(&self, normalized: &str) -> bool {
        match self {
            ExclusionRule::ProtocolPrefix(prefix) | ExclusionRule::PathPrefix(prefix) => {
                !prefix.is_empty() && normalized.starts_with(prefix.as_str())
            }
        }
    }
}

impl fmt::Display for ExclusionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionRule::ProtocolPrefix(prefix) => write!(f, "protocol {}", prefix),
            ExclusionRule::PathPrefix(prefix) => write!(f, "path {}", prefix),
        }
    }
}

/// Ordered exclusion rules; the first matching rule wins
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    rules: Vec<ExclusionRule>,
}

impl ExclusionFilter {
    pub fn new(rules: Vec<ExclusionRule>) -> Self {
        Self { rules }
    }

    pub fn from_config(config: &ExclusionConfig) -> Self {
        let mut rules = Vec::new();
        if config.exclude_live_tv {
            rules.push(ExclusionRule::protocol("pvr://"));
        }
        if config.exclude_http {
            rules.push(ExclusionRule::protocol("http://"));
            rules.push(ExclusionRule::protocol("https://"));
        }
        if config.exclude_plugin {
            rules.push(ExclusionRule::protocol("plugin://"));
        }

        if config.paths.len() > MAX_CUSTOM_PATHS {
            warn!(
                configured = config.paths.len(),
                max = MAX_CUSTOM_PATHS,
                "Too many excluded paths, ignoring the extras"
            );
        }
        rules.extend(
            config
                .paths
                .iter()
                .filter(|p| !p.trim().is_empty())
                .take(MAX_CUSTOM_PATHS)
                .map(|p| ExclusionRule::path(p)),
        );

        Self { rules }
    }

    pub fn rules(&self) -> &[ExclusionRule] {
        &self.rules
    }

    /// The rule that excludes `source_path`, if any
    pub fn matching_rule(&self, source_path: &str) -> Option<&ExclusionRule> {
        let normalized = normalize_path(source_path);
        self.rules.iter().find(|rule| rule.matches(&normalized))
    }

    /// Whether playback of `source_path` must not be scrobbled.
    ///
    /// An empty path is always excluded: nothing can be identified from it.
    pub fn is_excluded(&self, source_path: &str) -> bool {
        if source_path.trim().is_empty() {
            debug!("Empty source path, excluding");
            return true;
        }
        match self.matching_rule(source_path) {
            Some(rule) => {
                debug!(path = source_path, rule = %rule, "Source excluded");
                true
            }
            None => false,
        }
    }

    pub fn summary(&self) -> String {
        if self.rules.is_empty() {
            return "no exclusions".to_string();
        }
        self.rules
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
