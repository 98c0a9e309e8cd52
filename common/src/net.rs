use std::{
    fmt::Display,
    future::Future,
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use crate::{config::NetworkConfig, error::ConnectError};

/// Runs `attempt` until it succeeds or `network.connect_attempts` is used up,
/// calling `sleep` with the configured delay between tries. `attempt` gets the
/// 1-based attempt number.
pub fn connect_with_retry<T, E: Display>(
    network: &NetworkConfig,
    mut attempt: impl FnMut(u32) -> Result<T, E>,
    mut sleep: impl FnMut(Duration),
) -> Result<T, ConnectError> {
    let attempts = network.connect_attempts.max(1);
    let delay = Duration::from_millis(network.connect_retry_delay_ms);
    let mut last_error = String::new();

    for number in 1..=attempts {
        match attempt(number) {
            Ok(handle) => return Ok(handle),
            Err(err) => last_error = err.to_string(),
        }
        if number < attempts {
            sleep(delay);
        }
    }

    Err(ConnectError {
        attempts,
        last_error,
    })
}

/// Async form of [`connect_with_retry`] for backends running on an executor.
/// `sleep` returns the executor's timer future so the retry delay never
/// blocks a worker thread.
pub async fn connect_with_retry_async<T, E, A, AF, S, SF>(
    network: &NetworkConfig,
    mut attempt: A,
    mut sleep: S,
) -> Result<T, ConnectError>
where
    E: Display,
    A: FnMut(u32) -> AF,
    AF: Future<Output = Result<T, E>>,
    S: FnMut(Duration) -> SF,
    SF: Future<Output = ()>,
{
    let attempts = network.connect_attempts.max(1);
    let delay = Duration::from_millis(network.connect_retry_delay_ms);
    let mut last_error = String::new();

    for number in 1..=attempts {
        match attempt(number).await {
            Ok(handle) => return Ok(handle),
            Err(err) => last_error = err.to_string(),
        }
        if number < attempts {
            sleep(delay).await;
        }
    }

    Err(ConnectError {
        attempts,
        last_error,
    })
}

/// Caller address as the allow-list sees it. IPv4-mapped IPv6 peers (dual
/// stack listeners) are reported in dotted IPv4 form.
pub fn caller_address(ip: IpAddr) -> String {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        },
        IpAddr::V4(v4) => v4.to_string(),
    }
}

pub fn caller_from_socket(addr: &SocketAddr) -> String {
    caller_address(addr.ip())
}

/// Address family of a raw peer record from the socket layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerFamily {
    Inet,
    Inet6,
    Other(u32),
}

/// Caller address from a raw peer record. `octets` is the address field in
/// network order; it must be at least as long as the family requires.
pub fn caller_from_peer(family: PeerFamily, octets: &[u8]) -> Option<String> {
    match family {
        PeerFamily::Inet6 => {
            let octets: [u8; 16] = octets.get(..16)?.try_into().ok()?;
            Some(caller_address(IpAddr::V6(octets.into())))
        }
        PeerFamily::Inet => {
            let octets: [u8; 4] = octets.get(..4)?.try_into().ok()?;
            Some(caller_address(IpAddr::V4(octets.into())))
        }
        PeerFamily::Other(_) => None,
    }
}
