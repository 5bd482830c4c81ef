// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Ephemeral port reservation.
//!
//! Ports are reserved by holding a bound listener on port 0 until the session
//! config naming them has been written. The listeners are closed right before
//! the engine is spawned, which leaves a short window where another process
//! can grab the port first. Handing the bound descriptor to the engine would
//! close that window but is not something the engine supports, so the race is
//! accepted.

use crate::config::BindAddress;
use crate::error::{Error, IoContext, Result};
use log::debug;
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener};

/// Role of the plain HTTP listener.
pub const PORT: &str = "port";
/// Role of the TLS listener, present only when TLS is configured.
pub const TLS_PORT: &str = "tls_port";

/// Concrete port numbers keyed by role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortSet(BTreeMap<String, u16>);

impl PortSet {
    pub fn get(&self, role: &str) -> Option<u16> {
        self.0.get(role).copied()
    }

    pub fn contains(&self, role: &str) -> bool {
        self.0.contains_key(role)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, u16)> for PortSet {
    fn from_iter<I: IntoIterator<Item = (String, u16)>>(iter: I) -> Self {
        PortSet(iter.into_iter().collect())
    }
}

/// Holds one bound listener per role, all on the same bind address.
#[derive(Debug)]
pub struct PortAllocator {
    bind_address: BindAddress,
    sockets: BTreeMap<String, TcpListener>,
}

impl PortAllocator {
    /// Parse `bind_address` and reserve a port for every role in `roles`.
    ///
    /// An unknown address or a repeated role fails before anything is bound.
    pub fn open(bind_address: &str, roles: &[&str]) -> Result<Self> {
        let bind_address: BindAddress = bind_address.parse()?;
        Self::bind(bind_address, roles)
    }

    pub fn bind(bind_address: BindAddress, roles: &[&str]) -> Result<Self> {
        for (i, role) in roles.iter().enumerate() {
            if roles.iter().take(i).any(|r| r == role) {
                return Err(Error::validation(format!("duplicate port role {role:?}")));
            }
        }
        let mut allocator = Self {
            bind_address,
            sockets: BTreeMap::new(),
        };
        for role in roles {
            allocator.add(role)?;
        }
        Ok(allocator)
    }

    /// Reserve one more port under `role`.
    pub fn add(&mut self, role: &str) -> Result<u16> {
        if self.sockets.contains_key(role) {
            return Err(Error::validation(format!("duplicate port role {role:?}")));
        }
        let listener = TcpListener::bind(socket_addr(self.bind_address))
            .io_context(|| format!("binding {} for {role}", self.bind_address))?;
        let port = local_port(&listener)?;
        debug!("reserved {}:{port} for {role}", self.bind_address);
        self.sockets.insert(role.to_string(), listener);
        Ok(port)
    }

    pub fn bind_address(&self) -> BindAddress {
        self.bind_address
    }

    /// Port numbers currently held; nothing is released.
    pub fn ports(&self) -> Result<PortSet> {
        self.sockets
            .iter()
            .map(|(role, listener)| Ok((role.clone(), local_port(listener)?)))
            .collect()
    }

    /// Release every reservation.
    ///
    /// Call this only once the config naming these ports is on disk, right
    /// before spawning the engine.
    pub fn close(self) {
        for (role, listener) in self.sockets {
            debug!("releasing port for {role}");
            drop(listener);
        }
    }
}

fn socket_addr(bind_address: BindAddress) -> SocketAddr {
    let ip = match bind_address {
        BindAddress::Ipv4Loopback => IpAddr::V4(Ipv4Addr::LOCALHOST),
        BindAddress::Ipv4Any => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        BindAddress::Ipv6Loopback => IpAddr::V6(Ipv6Addr::LOCALHOST),
        BindAddress::Ipv6Any => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    SocketAddr::new(ip, 0)
}

fn local_port(listener: &TcpListener) -> Result<u16> {
    Ok(listener
        .local_addr()
        .io_context(|| "reading reserved port")?
        .port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_ipv4() {
        let alloc = PortAllocator::open("127.0.0.1", &[PORT, TLS_PORT]).unwrap();
        let ports = alloc.ports().unwrap();
        assert_eq!(ports.len(), 2);
        let (a, b) = (ports.get(PORT).unwrap(), ports.get(TLS_PORT).unwrap());
        assert_ne!(a, 0);
        assert_ne!(a, b);

        // Still held, so binding the same port again must fail.
        assert!(TcpListener::bind(("127.0.0.1", a)).is_err());
        assert_eq!(alloc.ports().unwrap(), ports);

        alloc.close();
        assert!(TcpListener::bind(("127.0.0.1", a)).is_ok());
    }

    #[test]
    fn test_open_ipv6() {
        // Hosts without IPv6 loopback skip this.
        if TcpListener::bind("[::1]:0").is_err() {
            return;
        }
        let alloc = PortAllocator::open("::1", &[PORT]).unwrap();
        assert_eq!(alloc.bind_address(), BindAddress::Ipv6Loopback);
        let port = alloc.ports().unwrap().get(PORT).unwrap();
        assert_ne!(port, 0);
        assert!(TcpListener::bind(("::1", port)).is_err());

        alloc.close();
        assert!(TcpListener::bind(("::1", port)).is_ok());
    }

    #[test]
    fn test_open_rejects_bad_address() {
        let err = PortAllocator::open("localhost", &[PORT]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_duplicate_role() {
        assert!(PortAllocator::open("127.0.0.1", &[PORT, PORT]).is_err());

        let mut alloc = PortAllocator::bind(BindAddress::Ipv4Loopback, &[PORT]).unwrap();
        assert!(alloc.add(PORT).is_err());
        let tls = alloc.add(TLS_PORT).unwrap();
        assert_eq!(alloc.ports().unwrap().get(TLS_PORT), Some(tls));
    }

    #[test]
    fn test_empty_roles() {
        let alloc = PortAllocator::bind(BindAddress::Ipv4Any, &[]).unwrap();
        assert!(alloc.ports().unwrap().is_empty());
        assert_eq!(alloc.bind_address(), BindAddress::Ipv4Any);
    }
}
