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

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use jiff::Timestamp;
use log::Record;
use reqwest::Url;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;

use super::batch::Batch;
use super::config::Config;
use super::line::LogLine;
use super::line::Payload;
use super::machine::Machine;
use super::monitor::Monitor;
use crate::Error;
use crate::Trap;

thread_local! {
    static DELIVERING: Cell<bool> = const { Cell::new(false) };
}

// crates on the delivery path, including threads of the HTTP client's own runtime
const TRANSPORT_TARGETS: [&str; 6] = ["reqwest", "hyper", "hyper_util", "h2", "rustls", "want"];

/// Marks the current thread as delivering until dropped.
struct Delivering {
    previous: bool,
}

impl Delivering {
    fn enter() -> Self {
        let previous = DELIVERING.with(|delivering| delivering.replace(true));
        Self { previous }
    }
}

impl Drop for Delivering {
    fn drop(&mut self) {
        DELIVERING.with(|delivering| delivering.set(self.previous));
    }
}

/// The shared sender of one LogDNA backend.
///
/// A client owns the batch every appender writes into, the monitor that delivers stale lines,
/// and the HTTP client. Deliveries are serialized: at most one request is in flight at a time.
/// Delivery is best effort. Lines are dropped once their request completes, whatever the
/// outcome, so a failing endpoint never grows the buffer without bound.
pub struct Client {
    url: Url,
    hostname: String,
    tags: String,
    app: String,
    env: Option<String>,
    machine: Machine,

    batch: Batch,
    http: HttpClient,
    trap: Arc<dyn Trap>,

    // held for the duration of a delivery
    sending: Mutex<()>,
    monitor: Mutex<Option<Monitor>>,
    closed: AtomicBool,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // the url carries the api key
        f.debug_struct("Client")
            .field("host", &self.url.host_str())
            .field("hostname", &self.hostname)
            .field("tags", &self.tags)
            .field("app", &self.app)
            .field("env", &self.env)
            .field("machine", &self.machine)
            .field("batch", &self.batch)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        let monitor = self
            .monitor
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(monitor) = monitor {
            monitor.signal();
        }
    }
}

impl Client {
    /// Creates a client and starts its monitor.
    pub fn new(
        config: &Config,
        machine: Machine,
        trap: Arc<dyn Trap>,
    ) -> Result<Arc<Self>, Error> {
        let mut url = Url::parse(config.get_url()).map_err(|err| {
            Error::new("failed to parse ingestion url")
                .with_context("url", config.get_url())
                .with_source(err)
        })?;
        url.set_username(config.get_api_key()).map_err(|()| {
            Error::new("ingestion url cannot carry credentials")
                .with_context("url", config.get_url())
        })?;

        let http = HttpClient::builder()
            .timeout(config.get_request_timeout())
            .build()
            .map_err(|err| Error::new("failed to build http client").with_source(err))?;

        let client = Arc::new(Self {
            url,
            hostname: config.get_hostname().to_string(),
            tags: config.get_tags().join(","),
            app: config.get_app().to_string(),
            env: config.get_env().map(str::to_string),
            machine,
            batch: Batch::new(config.get_capacity()),
            http,
            trap,
            sending: Mutex::new(()),
            monitor: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        let monitor = Monitor::start(&client, config.get_flush_interval())?;
        *client.monitor.lock().unwrap_or_else(PoisonError::into_inner) = Some(monitor);
        Ok(client)
    }

    /// The batch every appender of this client writes into.
    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    /// The app name stamped on lines built from records.
    pub fn app(&self) -> &str {
        &self.app
    }

    /// The environment tag stamped on lines built from records.
    pub fn env(&self) -> Option<&str> {
        self.env.as_deref()
    }

    /// The identity reported with every delivery.
    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    /// Whether [`Client::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether `record` was emitted by a delivery.
    ///
    /// Such records must not be buffered: each delivery would otherwise produce the lines of the
    /// next one, and the batch would never drain.
    pub fn is_delivery_record(record: &Record) -> bool {
        if DELIVERING.with(Cell::get) {
            return true;
        }

        record
            .target()
            .split("::")
            .next()
            .is_some_and(|krate| TRANSPORT_TARGETS.contains(&krate))
    }

    /// Buffers a line, dispatching a delivery in the background once the batch is full.
    ///
    /// Never blocks on the network.
    pub fn write(self: &Arc<Self>, line: LogLine) {
        if self.batch.append(line) {
            self.dispatch();
        }
    }

    /// Delivers in the background. Failures are reported to the trap.
    pub fn dispatch(self: &Arc<Self>) {
        let client = self.clone();
        let spawned = std::thread::Builder::new()
            .name("logship-dispatch".to_string())
            .spawn(move || client.send(false));
        if let Err(err) = spawned {
            self.trap
                .trap(&Error::new("failed to spawn delivery thread").with_source(err));
        }
    }

    /// Delivers buffered lines.
    ///
    /// Each request carries up to the batch capacity of the oldest lines. A forced send repeats
    /// until every line buffered when it started has been delivered; otherwise it repeats only
    /// while the batch is still full. An empty batch makes no request.
    pub fn send(&self, force: bool) {
        let _sending = self.sending.lock().unwrap_or_else(PoisonError::into_inner);
        let _delivering = Delivering::enter();

        let capacity = self.batch.capacity();
        // a forced send stops after the lines buffered when it started, even if producers
        // keep appending
        let mut budget = if force { self.batch.size() } else { 0 };

        loop {
            let lines = self.batch.take(capacity);
            if lines.is_empty() {
                return;
            }

            let body = match serde_json::to_vec(&Payload { lines: &lines }) {
                Ok(body) => body,
                Err(err) => {
                    // the only failure that keeps the lines
                    self.batch.restore(lines);
                    self.trap
                        .trap(&Error::new("failed to serialize log lines").with_source(err));
                    return;
                }
            };

            budget = budget.saturating_sub(lines.len());
            self.post(body, lines.len());

            if budget == 0 && self.batch.size() < capacity {
                return;
            }
        }
    }

    /// Forces a final delivery and stops the monitor.
    ///
    /// Idempotent. Appenders still referencing this client keep buffering and dispatching full
    /// batches, but stale lines are no longer delivered.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.send(true);

        let monitor = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(monitor) = monitor {
            monitor.stop();
        }
    }

    fn request_url(&self) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("hostname", &self.hostname)
            .append_pair("ip", self.machine.ip())
            .append_pair("mac", self.machine.mac())
            .append_pair("now", &Timestamp::now().as_millisecond().to_string())
            .append_pair("tags", &self.tags);
        url
    }

    fn post(&self, body: Vec<u8>, count: usize) {
        let url = self.request_url();
        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send();

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                self.trap.trap(
                    &Error::new("failed to send log lines")
                        .with_context("lines", count)
                        .with_source(err),
                );
                return;
            }
        };

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let err = Error::new("log lines rejected by ingestion endpoint")
                .with_context("status", status)
                .with_context("lines", count);
            let err = match response.text() {
                Ok(body) => err.with_context("body", body),
                Err(read_err) => err.with_source(read_err),
            };
            self.trap.trap(&err);
        } else {
            // drain the body so the connection can be reused
            let _ = response.bytes();
        }
    }
}
