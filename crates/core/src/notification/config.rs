use serde::{Deserialize, Serialize};

/// Notification emitter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Prefix for links to an analysis; the analysis id is appended.
    #[serde(default = "default_link_prefix")]
    pub link_prefix: String,
    /// Upper bound on error text embedded in failure messages, in characters.
    #[serde(default = "default_max_error_chars")]
    pub max_error_chars: usize,
}

fn default_link_prefix() -> String {
    "/analyses".to_string()
}

fn default_max_error_chars() -> usize {
    100
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            link_prefix: default_link_prefix(),
            max_error_chars: default_max_error_chars(),
        }
    }
}
