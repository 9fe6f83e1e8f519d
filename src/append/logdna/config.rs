// Copyright 2024 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;
use std::time::Duration;

use super::batch::DEFAULT_CAPACITY;

/// The ingestion API key. Its presence enables the backend.
pub const ENV_API_KEY: &str = "PP_LOG_KEY";
/// The hostname reported with every delivery.
pub const ENV_HOSTNAME: &str = "PP_HOSTNAME";
/// Comma-separated tags reported with every delivery.
pub const ENV_TAGS: &str = "PP_LOG_TAGS";
/// The ingestion endpoint.
pub const ENV_URL: &str = "PP_LOG_URL";
/// The environment tag stamped on every line.
pub const ENV_ENV: &str = "PP_LOG_ENV";

/// The default ingestion endpoint.
pub const DEFAULT_URL: &str = "https://logs.logdna.com/logs/ingest";
/// The hostname reported when none is configured.
pub const DEFAULT_HOSTNAME: &str = "hostname.not.provided";
/// The default interval at which buffered lines are delivered regardless of the batch size.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);
/// The default bound of a single delivery request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings of a LogDNA client.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use logship::append::logdna::Config;
///
/// let config = Config::new("my-api-key")
///     .hostname("web-1")
///     .tags(["production", "eu"])
///     .flush_interval(Duration::from_secs(10));
/// assert_eq!(config.get_hostname(), "web-1");
/// ```
#[derive(Clone)]
pub struct Config {
    api_key: String,
    hostname: String,
    tags: Vec<String>,
    url: String,
    app: Option<String>,
    env: Option<String>,
    capacity: usize,
    flush_interval: Duration,
    request_timeout: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("hostname", &self.hostname)
            .field("tags", &self.tags)
            .field("url", &self.url)
            .field("app", &self.app)
            .field("env", &self.env)
            .field("capacity", &self.capacity)
            .field("flush_interval", &self.flush_interval)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Config {
    /// Creates a config with the given API key and defaults for everything else.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            hostname: DEFAULT_HOSTNAME.to_string(),
            tags: vec![],
            url: DEFAULT_URL.to_string(),
            app: None,
            env: None,
            capacity: DEFAULT_CAPACITY,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Reads the config from the process environment.
    ///
    /// Returns `None` if [`ENV_API_KEY`] is unset or empty, meaning the backend is disabled.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the config through `lookup`, which maps a variable name to its value.
    ///
    /// Unset and empty variables fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let lookup = |name: &str| lookup(name).filter(|value| !value.is_empty());

        let mut config = Config::new(lookup(ENV_API_KEY)?);
        if let Some(hostname) = lookup(ENV_HOSTNAME) {
            config = config.hostname(hostname);
        }
        if let Some(tags) = lookup(ENV_TAGS) {
            config = config.tags(tags.split(','));
        }
        if let Some(url) = lookup(ENV_URL) {
            config = config.url(url);
        }
        if let Some(env) = lookup(ENV_ENV) {
            config = config.env(env);
        }
        Some(config)
    }

    /// Sets the reported hostname. It is also the default app name of every line.
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Sets the reported tags. Blank tags are dropped.
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = tags
            .into_iter()
            .map(|tag| tag.as_ref().trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
        self
    }

    /// Sets the ingestion endpoint.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Sets the app name of every line. Defaults to the hostname.
    pub fn app(mut self, app: impl Into<String>) -> Self {
        self.app = Some(app.into());
        self
    }

    /// Sets the environment tag of every line.
    pub fn env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }

    /// Sets the number of buffered lines that triggers a delivery.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the interval at which buffered lines are delivered regardless of the batch size.
    pub fn flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    /// Sets the bound of a single delivery request.
    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub(crate) fn get_api_key(&self) -> &str {
        &self.api_key
    }

    /// The reported hostname.
    pub fn get_hostname(&self) -> &str {
        &self.hostname
    }

    /// The reported tags.
    pub fn get_tags(&self) -> &[String] {
        &self.tags
    }

    /// The ingestion endpoint.
    pub fn get_url(&self) -> &str {
        &self.url
    }

    /// The app name of every line.
    pub fn get_app(&self) -> &str {
        self.app.as_deref().unwrap_or(&self.hostname)
    }

    /// The environment tag of every line.
    pub fn get_env(&self) -> Option<&str> {
        self.env.as_deref()
    }

    /// The number of buffered lines that triggers a delivery.
    pub fn get_capacity(&self) -> usize {
        self.capacity
    }

    /// The interval of forced deliveries.
    pub fn get_flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// The bound of a single delivery request.
    pub fn get_request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_disabled_without_api_key() {
        assert!(Config::from_lookup(lookup(&[])).is_none());
        assert!(Config::from_lookup(lookup(&[(ENV_API_KEY, "")])).is_none());
        assert!(Config::from_lookup(lookup(&[(ENV_HOSTNAME, "web-1")])).is_none());
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[(ENV_API_KEY, "secret")])).unwrap();
        assert_eq!(config.get_api_key(), "secret");
        assert_eq!(config.get_hostname(), DEFAULT_HOSTNAME);
        assert_eq!(config.get_app(), DEFAULT_HOSTNAME);
        assert!(config.get_tags().is_empty());
        assert_eq!(config.get_url(), DEFAULT_URL);
        assert_eq!(config.get_env(), None);
        assert_eq!(config.get_capacity(), 100);
        assert_eq!(config.get_flush_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            (ENV_API_KEY, "secret"),
            (ENV_HOSTNAME, "web-1"),
            (ENV_TAGS, "production, eu,,canary"),
            (ENV_URL, "http://localhost:8080/ingest"),
            (ENV_ENV, "prod"),
        ]))
        .unwrap();
        assert_eq!(config.get_hostname(), "web-1");
        assert_eq!(config.get_app(), "web-1");
        assert_eq!(config.get_tags(), ["production", "eu", "canary"]);
        assert_eq!(config.get_url(), "http://localhost:8080/ingest");
        assert_eq!(config.get_env(), Some("prod"));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = Config::new("super-secret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
