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

use jiff::Timestamp;
use log::Record;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::Error;

/// The key whose value replaces the record message.
const MESSAGE_KEY: &str = "msg";
/// The key whose value replaces the record level.
const LEVEL_KEY: &str = "level";

/// One log event as the ingestion endpoint receives it.
///
/// Output format:
///
/// ```json
/// {"timestamp":1723387497172,"line":"Hello info!","app":"web-1","level":"info","meta":{"user":42}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogLine {
    timestamp: i64,
    line: String,
    app: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    env: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    meta: Map<String, Value>,
}

impl LogLine {
    /// Creates a line observed now.
    pub fn new(line: impl Into<String>, app: impl Into<String>) -> Self {
        Self {
            timestamp: Timestamp::now().as_millisecond(),
            line: line.into(),
            app: app.into(),
            level: None,
            env: None,
            meta: Map::new(),
        }
    }

    /// Sets the observed time in milliseconds since the Unix epoch.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Sets the severity level.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// Sets the environment tag.
    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }

    /// Adds one metadata entry, replacing any previous value of `key`.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Builds a line from a [`log::Record`].
    ///
    /// The record message becomes the line and its level the line level. Every key-value pair
    /// goes to the metadata, except `msg` and `level` which override the message and the level.
    pub fn from_record(record: &Record, app: &str, env: Option<&str>) -> Result<Self, Error> {
        let mut line = None;
        let mut level = None;
        let mut meta = Map::new();

        let mut collector = KvCollector {
            line: &mut line,
            level: &mut level,
            meta: &mut meta,
        };
        record
            .key_values()
            .visit(&mut collector)
            .map_err(|err| Error::new("failed to collect key-values").with_source(err))?;

        Ok(Self {
            timestamp: Timestamp::now().as_millisecond(),
            line: line.unwrap_or_else(|| record.args().to_string()),
            app: app.to_string(),
            level: Some(level.unwrap_or_else(|| record.level().as_str().to_ascii_lowercase())),
            env: env.map(str::to_string),
            meta,
        })
    }

    /// The observed time in milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// The message text.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// The originating application or host name.
    pub fn app(&self) -> &str {
        &self.app
    }

    /// The severity level.
    pub fn level(&self) -> Option<&str> {
        self.level.as_deref()
    }

    /// The environment tag.
    pub fn env(&self) -> Option<&str> {
        self.env.as_deref()
    }

    /// The metadata entries.
    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }
}

struct KvCollector<'a> {
    line: &'a mut Option<String>,
    level: &'a mut Option<String>,
    meta: &'a mut Map<String, Value>,
}

impl<'kvs> log::kv::VisitSource<'kvs> for KvCollector<'_> {
    fn visit_pair(
        &mut self,
        key: log::kv::Key<'kvs>,
        value: log::kv::Value<'kvs>,
    ) -> Result<(), log::kv::Error> {
        match key.as_str() {
            MESSAGE_KEY => *self.line = Some(value.to_string()),
            LEVEL_KEY => *self.level = Some(value.to_string()),
            key => {
                let value = serde_json::to_value(&value)
                    .unwrap_or_else(|_| Value::String(value.to_string()));
                self.meta.insert(key.to_string(), value);
            }
        }
        Ok(())
    }
}

/// The request body of one delivery.
#[derive(Debug, Serialize)]
pub(crate) struct Payload<'a> {
    pub(crate) lines: &'a [LogLine],
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;

    #[test]
    fn test_from_record_plain() {
        let line = LogLine::from_record(
            &Record::builder()
                .args(format_args!("Hello {}!", "world"))
                .level(log::Level::Warn)
                .build(),
            "web-1",
            None,
        )
        .unwrap();

        assert_eq!(line.line(), "Hello world!");
        assert_eq!(line.app(), "web-1");
        assert_eq!(line.level(), Some("warn"));
        assert_eq!(line.env(), None);
        assert!(line.meta().is_empty());
        assert!(line.timestamp() > 0);
    }

    #[test]
    fn test_from_record_reserved_keys() {
        let kvs = [("msg", "overridden"), ("level", "notice"), ("user", "alice")];
        let line = LogLine::from_record(
            &Record::builder()
                .args(format_args!("original"))
                .key_values(&kvs)
                .build(),
            "web-1",
            Some("staging"),
        )
        .unwrap();

        assert_eq!(line.line(), "overridden");
        assert_eq!(line.level(), Some("notice"));
        assert_eq!(line.env(), Some("staging"));
        assert_eq!(line.meta().len(), 1);
        assert_eq!(line.meta()["user"], Value::from("alice"));
    }

    #[test]
    fn test_from_record_keeps_value_types() {
        let kvs: [(&str, log::kv::Value); 2] = [
            ("attempt", log::kv::Value::from(3u64)),
            ("cached", log::kv::Value::from(true)),
        ];
        let line = LogLine::from_record(
            &Record::builder()
                .args(format_args!("retrying"))
                .key_values(&kvs)
                .build(),
            "web-1",
            None,
        )
        .unwrap();

        assert_eq!(line.meta()["attempt"], Value::from(3));
        assert_eq!(line.meta()["cached"], Value::from(true));
    }

    #[test]
    fn test_payload_wire_shape() {
        let lines = [
            LogLine::new("first", "web-1")
                .with_timestamp(1723387497172)
                .with_level("info"),
            LogLine::new("second", "web-1")
                .with_timestamp(1723387497173)
                .with_env("production")
                .with_meta("user", 42)
                .with_meta("path", "/login"),
        ];

        let json = serde_json::to_string(&Payload { lines: &lines }).unwrap();
        assert_snapshot!(json, @r#"{"lines":[{"timestamp":1723387497172,"line":"first","app":"web-1","level":"info"},{"timestamp":1723387497173,"line":"second","app":"web-1","env":"production","meta":{"path":"/login","user":42}}]}"#);
    }
}
