use std::{sync::LazyLock, time::Duration};

use ureq::Agent;

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub user_agent: Option<String>,
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: Some(concat!("cdnsync/", env!("CARGO_PKG_VERSION")).into()),
            timeout: Some(Duration::from_secs(120)),
        }
    }
}

impl ClientConfig {
    /// Builds an `Agent` that reports every HTTP status as a response.
    ///
    /// Callers map status codes themselves; only transport failures surface
    /// as `ureq::Error`.
    pub fn build(&self) -> Agent {
        let mut config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(self.timeout);

        if let Some(user_agent) = &self.user_agent {
            config = config.user_agent(user_agent);
        }

        config.build().into()
    }
}

/// Process-wide agent used by the version sources.
pub static SHARED_AGENT: LazyLock<Agent> = LazyLock::new(|| ClientConfig::default().build());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_user_agent() {
        let cfg = ClientConfig::default();
        assert!(cfg.user_agent.unwrap().starts_with("cdnsync/"));
        assert_eq!(cfg.timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_build_agent() {
        let agent = ClientConfig {
            user_agent: None,
            timeout: None,
        }
        .build();
        let _req = agent.get("https://example.com");
    }
}
