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
use std::sync::Weak;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;

use super::client::Client;
use crate::Error;

/// A background thread forcing a delivery every interval.
///
/// The thread only holds a weak reference to its client and exits once the client is gone. It is
/// not restartable: stopping it is final, and does not flush anything by itself.
#[derive(Debug)]
pub(crate) struct Monitor {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

impl Monitor {
    pub(crate) fn start(client: &Arc<Client>, interval: Duration) -> Result<Self, Error> {
        let interval = interval.max(Duration::from_millis(1));
        let (shutdown, shutdown_rx) = crossbeam_channel::bounded(1);
        let client = Arc::downgrade(client);

        let handle = std::thread::Builder::new()
            .name("logship-monitor".to_string())
            .spawn(move || run(client, interval, shutdown_rx))
            .map_err(|err| Error::new("failed to spawn monitor thread").with_source(err))?;

        Ok(Self { shutdown, handle })
    }

    /// Asks the thread to exit without waiting for it.
    pub(crate) fn signal(&self) {
        let _ = self.shutdown.try_send(());
    }

    /// Asks the thread to exit and waits until it has.
    pub(crate) fn stop(self) {
        self.signal();

        // the last client reference may be released on the monitor thread itself
        if self.handle.thread().id() != std::thread::current().id() {
            let _ = self.handle.join();
        }
    }
}

fn run(client: Weak<Client>, interval: Duration, shutdown: Receiver<()>) {
    let ticker = crossbeam_channel::tick(interval);
    loop {
        crossbeam_channel::select! {
            recv(ticker) -> _ => match client.upgrade() {
                Some(client) => client.send(true),
                None => return,
            },
            // a disconnected channel means the owner is gone
            recv(shutdown) -> _ => return,
        }
    }
}
