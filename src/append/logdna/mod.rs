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

//! Appender shipping log records to a LogDNA-compatible ingestion endpoint.
//!
//! Records are buffered into a batch shared by every [`LogDna`] appender of a [`Registry`]. A
//! full batch is delivered on a background thread; a monitor thread delivers whatever is
//! buffered at a fixed interval. Delivery is best effort: there is no retry, and lines are
//! dropped once their request completes, successful or not.
//!
//! # Examples
//!
//! ```
//! use logship::append::LogDna;
//! use logship::append::logdna::Config;
//!
//! // without PP_LOG_KEY in the environment the appender only forwards records
//! let append = LogDna::builder().config(None).build();
//! assert!(!append.is_enabled());
//!
//! let config = Config::new("my-api-key").hostname("web-1");
//! # let config = config.url("http://127.0.0.1:9/ingest");
//! let append = LogDna::builder().config(config).build();
//! assert!(append.is_enabled());
//! append.close();
//! ```

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use log::Record;

use crate::Append;
use crate::Error;
use crate::Trap;
use crate::trap::DefaultTrap;

mod batch;
mod client;
mod config;
mod line;
mod machine;
mod monitor;
mod registry;

pub use self::batch::Batch;
pub use self::batch::DEFAULT_CAPACITY;
pub use self::client::Client;
pub use self::config::*;
pub use self::line::LogLine;
pub use self::machine::Machine;
pub use self::registry::Registry;

/// An appender that ships records to a LogDNA-compatible endpoint, then passes them on.
///
/// Every appender built against the same [`Registry`] shares one [`Client`]. Without a config
/// (no `PP_LOG_KEY` in the environment), the appender is disabled and only forwards records to
/// the next link.
#[derive(Debug)]
pub struct LogDna {
    client: ArcSwapOption<Client>,
    next: Option<Box<dyn Append>>,
    trap: Arc<dyn Trap>,
}

impl Default for LogDna {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl LogDna {
    /// Creates a builder reading its config from the environment.
    pub fn builder() -> LogDnaBuilder {
        LogDnaBuilder::new()
    }

    /// Whether this appender ships records.
    pub fn is_enabled(&self) -> bool {
        self.client.load().is_some()
    }

    /// The shared client, if this appender is enabled.
    pub fn client(&self) -> Option<Arc<Client>> {
        self.client.load_full()
    }

    /// Delivers buffered records and stops the shared client's monitor.
    ///
    /// The client is shared: closing one appender stops periodic delivery for all appenders of
    /// the registry. Afterwards this appender only forwards records to the next link. Calling
    /// it again does nothing.
    pub fn close(&self) {
        if let Some(client) = self.client.swap(None) {
            client.close();
        }
    }
}

impl Append for LogDna {
    fn append(&self, record: &Record) -> Result<(), Error> {
        if let Some(client) = &*self.client.load() {
            if !Client::is_delivery_record(record) {
                match LogLine::from_record(record, client.app(), client.env()) {
                    Ok(line) => client.write(line),
                    Err(err) => self.trap.trap(&err),
                }
            }
        }

        match &self.next {
            Some(next) => next.append(record),
            None => Ok(()),
        }
    }

    fn flush(&self) -> Result<(), Error> {
        if let Some(client) = &*self.client.load() {
            client.send(true);
        }

        match &self.next {
            Some(next) => next.flush(),
            None => Ok(()),
        }
    }
}

/// A builder to configure and create a [`LogDna`] appender.
#[derive(Debug)]
pub struct LogDnaBuilder {
    config: Option<Config>,
    next: Option<Box<dyn Append>>,
    trap: Box<dyn Trap>,
}

impl Default for LogDnaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LogDnaBuilder {
    /// Creates a builder with the config read from the environment.
    ///
    /// See [`Config::from_env`].
    pub fn new() -> Self {
        Self {
            config: Config::from_env(),
            next: None,
            trap: Box::new(DefaultTrap::default()),
        }
    }

    /// Replaces the config. `None` disables shipping.
    pub fn config(mut self, config: impl Into<Option<Config>>) -> Self {
        self.config = config.into();
        self
    }

    /// Sets the link records are passed to after being buffered.
    pub fn next(mut self, next: impl Into<Box<dyn Append>>) -> Self {
        self.next = Some(next.into());
        self
    }

    /// Sets the trap receiving delivery errors.
    ///
    /// Only the trap of the appender that creates the shared client receives delivery errors.
    pub fn trap(mut self, trap: impl Into<Box<dyn Trap>>) -> Self {
        self.trap = trap.into();
        self
    }

    /// Builds the appender against the process-wide registry.
    pub fn build(self) -> LogDna {
        self.build_in(Registry::global())
    }

    /// Builds the appender against the given registry.
    ///
    /// A client that cannot be created is reported to the trap and leaves the appender
    /// disabled.
    pub fn build_in(self, registry: &Registry) -> LogDna {
        let Self { config, next, trap } = self;
        let trap: Arc<dyn Trap> = Arc::from(trap);

        let client = config.and_then(|config| {
            registry
                .get_or_init(&config, trap.clone())
                .inspect_err(|err| trap.trap(err))
                .ok()
        });

        LogDna {
            client: ArcSwapOption::from(client),
            next,
            trap,
        }
    }
}
