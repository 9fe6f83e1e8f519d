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

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use super::client::Client;
use super::config::Config;
use super::machine::Machine;
use crate::Error;
use crate::Trap;

static GLOBAL: Registry = Registry::new();

/// The slot holding the one live [`Client`] shared by every appender built against it.
///
/// Appenders are cheap and may be created in large numbers; the client, with its buffer, its
/// monitor thread and its connection pool, exists once per registry. Most programs use
/// [`Registry::global`].
#[derive(Debug, Default)]
pub struct Registry {
    slot: Mutex<Option<Arc<Client>>>,
}

impl Registry {
    /// Creates an empty registry.
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    /// Returns the live client, creating it from `config` if there is none.
    ///
    /// The first caller's config and trap win; later ones are ignored until the client is
    /// closed, after which the next caller creates a fresh one.
    pub fn get_or_init(
        &self,
        config: &Config,
        trap: Arc<dyn Trap>,
    ) -> Result<Arc<Client>, Error> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = slot.as_ref().filter(|client| !client.is_closed()) {
            return Ok(client.clone());
        }

        let machine = Machine::discover().unwrap_or_else(|err| {
            trap.trap(&err);
            Machine::default()
        });
        let client = Client::new(config, machine, trap)?;
        *slot = Some(client.clone());
        Ok(client)
    }

    /// The live client, if any.
    pub fn current(&self) -> Option<Arc<Client>> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref().filter(|client| !client.is_closed()).cloned()
    }
}
