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

use std::io::Write;

use log::LevelFilter;
use log::Metadata;
use log::Record;

use crate::Append;
use crate::Error;

/// A logger facade driving the head of an appender chain.
///
/// This struct implements [`log::Log`] to bridge the [`log`] crate with the chain.
///
/// # Examples
///
/// ```no_run
/// use log::LevelFilter;
/// use logship::Logger;
/// use logship::append::LogDna;
///
/// Logger::new(LogDna::default())
///     .max_level(LevelFilter::Info)
///     .apply()
///     .unwrap();
/// log::info!("Hello world!");
/// ```
#[derive(Debug)]
pub struct Logger {
    head: Box<dyn Append>,
    max_level: LevelFilter,
}

impl Logger {
    /// Creates a logger passing every record to `head`.
    pub fn new(head: impl Into<Box<dyn Append>>) -> Self {
        Self {
            head: head.into(),
            max_level: LevelFilter::Trace,
        }
    }

    /// Set the maximum log level.
    ///
    /// This will be passed to [`log::set_max_level`] on [`Logger::apply`].
    pub fn max_level(mut self, max_level: LevelFilter) -> Self {
        self.max_level = max_level;
        self
    }

    /// Set up the global logger.
    ///
    /// # Errors
    ///
    /// This function will fail if it is called more than once, or if another library has already
    /// initialized a global logger.
    pub fn apply(self) -> Result<(), log::SetLoggerError> {
        let max_level = self.max_level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        if let Err(err) = self.head.append(record) {
            handle_log_error(record, err);
        }
    }

    fn flush(&self) {
        if let Err(err) = self.head.flush() {
            handle_flush_error(err);
        }
    }
}

// A failed stderr write is ignored: logging never fails the caller.
fn handle_log_error(record: &Record, error: Error) {
    let _ = write!(
        std::io::stderr(),
        r###"
Error perform logging.
    Attempted to log: {args}
    Record: {record:?}
    Error: {error:?}
"###,
        args = record.args(),
        record = record,
        error = error,
    );
}

fn handle_flush_error(error: Error) {
    let _ = write!(
        std::io::stderr(),
        r###"
Error perform flush.
    Error: {error:?}
"###,
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use log::Level;
    use log::Log;

    use super::*;

    #[derive(Debug, Default, Clone)]
    struct Recorded(Arc<Mutex<Vec<String>>>);

    impl Append for Recorded {
        fn append(&self, record: &Record) -> Result<(), Error> {
            self.0.lock().unwrap().push(record.args().to_string());
            Ok(())
        }
    }

    #[test]
    fn test_max_level_filters_records() {
        let recorded = Recorded::default();
        let logger = Logger::new(recorded.clone()).max_level(LevelFilter::Warn);

        for (level, message) in [(Level::Error, "kept"), (Level::Info, "dropped")] {
            logger.log(
                &Record::builder()
                    .level(level)
                    .args(format_args!("{message}"))
                    .build(),
            );
        }
        logger.flush();

        assert_eq!(*recorded.0.lock().unwrap(), ["kept"]);
    }

    #[derive(Debug)]
    struct Failing;

    impl Append for Failing {
        fn append(&self, _: &Record) -> Result<(), Error> {
            Err(Error::new("next link failed"))
        }

        fn flush(&self) -> Result<(), Error> {
            Err(Error::new("next link failed to flush"))
        }
    }

    #[test]
    fn test_append_and_flush_errors_do_not_reach_the_caller() {
        let logger = Logger::new(Failing);
        logger.log(&Record::builder().args(format_args!("lost")).build());
        logger.flush();
    }
}
