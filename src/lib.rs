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

//! A log-shipping appender for the [`log`] crate.
//!
//! [`LogDna`](append::LogDna) buffers records into bounded batches and posts each batch to a
//! LogDNA-compatible HTTP ingestion endpoint in the background. It is one link of an appender
//! chain: every record is passed on to the next link, whether shipping is enabled or not.
//!
//! Shipping is enabled by the `PP_LOG_KEY` environment variable. Without it the appender is a
//! pure pass-through.
//!
//! # Examples
//!
//! ```no_run
//! use logship::Logger;
//! use logship::append::LogDna;
//!
//! let append = LogDna::default();
//! Logger::new(append).apply().unwrap();
//!
//! log::info!(user = "alice"; "Hello world!");
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod append;
pub mod trap;

pub use append::Append;
pub use trap::Trap;

mod error;
pub use error::Error;

mod logger;
pub use logger::Logger;
