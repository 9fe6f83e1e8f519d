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

use std::net::IpAddr;

use network_interface::NetworkInterface;
use network_interface::NetworkInterfaceConfig;

use crate::Error;

/// The addresses reported along with every delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Machine {
    ip: String,
    mac: String,
}

impl Machine {
    /// Creates an identity from known addresses.
    pub fn new(ip: impl Into<String>, mac: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            mac: mac.into(),
        }
    }

    /// Finds the first non-loopback IPv4 address of an interface that has a hardware address.
    ///
    /// Returns an empty identity if no interface qualifies.
    pub fn discover() -> Result<Self, Error> {
        let interfaces = NetworkInterface::show()
            .map_err(|err| Error::new("failed to list network interfaces").with_source(err))?;

        let candidates = interfaces.iter().map(|interface| {
            let ips = interface.addr.iter().map(|addr| addr.ip()).collect();
            (interface.mac_addr.as_deref(), ips)
        });
        Ok(select(candidates).unwrap_or_default())
    }

    /// The IPv4 address, or empty if unknown.
    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// The hardware address, or empty if unknown.
    pub fn mac(&self) -> &str {
        &self.mac
    }
}

fn select<'a, I>(candidates: I) -> Option<Machine>
where
    I: IntoIterator<Item = (Option<&'a str>, Vec<IpAddr>)>,
{
    candidates.into_iter().find_map(|(mac, ips)| {
        let mac = mac.filter(|mac| !mac.is_empty())?;
        ips.into_iter().find_map(|ip| match ip {
            IpAddr::V4(ip) if !ip.is_loopback() => Some(Machine::new(ip.to_string(), mac)),
            _ => None,
        })
    })
}
