//! Finding candidate thermostats: a configured host list resolved through
//! DNS, or an SSDP search on the local network.

use std::net::{IpAddr, SocketAddr};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::protocol::{
    location_host, parse_advertisement, parse_usn, search_request, SSDP_MULTICAST_ADDR,
};
use crate::Result;

const ADDRESS_MAX_LEN: usize = 14;
const IDENTITY_LEN: usize = 8;

static INVALID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>`~!@#$%^&*(){}\[\]?/\\;:"']+"#).unwrap());

/// A host that may be a thermostat, before its info endpoint is checked.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub hostname: String,
    /// Name and class are only known up front for SSDP responses.
    pub name: Option<String>,
    pub class: Option<String>,
}

/// Host-safe node address: invalid characters removed, lowercased, last 14
/// characters kept.
pub fn derive_address(raw: &str) -> String {
    let cleaned = INVALID_CHARS.replace_all(raw, "");
    tail(&cleaned, ADDRESS_MAX_LEN).to_lowercase()
}

/// Display name with invalid characters removed. Case and length are kept.
pub fn derive_node_name(raw: &str) -> String {
    INVALID_CHARS.replace_all(raw, "").into_owned()
}

/// Thermostat node address from a candidate identity.
pub fn thermostat_address(id: &str) -> String {
    derive_address(tail(id, IDENTITY_LEN))
}

/// Child sensor address under a thermostat.
pub fn sensor_address(parent: &str, seq: usize) -> String {
    derive_address(&format!("{parent}_S{seq}"))
}

/// Last eight hex digits of the numeric address.
pub fn identity_from_ip(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => format!("{:08x}", u32::from(v4)),
        IpAddr::V6(v6) => {
            let hex = format!("{:032x}", u128::from(v6));
            hex[hex.len() - IDENTITY_LEN..].to_string()
        }
    }
}

fn tail(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    let idx = s.char_indices().nth(count - n).map_or(s.len(), |(i, _)| i);
    &s[idx..]
}

/// Resolve one configured hostname. Literal addresses skip DNS.
pub async fn resolve_host(host: &str) -> std::io::Result<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    if let Ok(sock) = host.parse::<SocketAddr>() {
        return Ok(sock.ip());
    }
    let target = match host.rsplit_once(':') {
        Some((_, port)) if port.parse::<u16>().is_ok() => host.to_string(),
        _ => format!("{host}:80"),
    };
    tokio::net::lookup_host(target)
        .await?
        .next()
        .map(|sock| sock.ip())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses"))
}

/// Candidates for the configured hosts. Unresolvable names are returned in
/// the second list for the caller to surface.
pub async fn resolve_static(hosts: &[String]) -> (Vec<Candidate>, Vec<String>) {
    let mut candidates = Vec::new();
    let mut unresolved = Vec::new();
    for host in hosts {
        match resolve_host(host).await {
            Ok(ip) => {
                let id = identity_from_ip(ip);
                debug!(%host, %ip, %id, "resolved configured thermostat");
                candidates.push(Candidate {
                    id,
                    hostname: host.clone(),
                    name: None,
                    class: None,
                });
            }
            Err(e) => {
                warn!(%host, error = %e, "unable to resolve address for configured hostname");
                unresolved.push(host.clone());
            }
        }
    }
    (candidates, unresolved)
}

/// Candidate from one SSDP response body.
pub fn candidate_from_response(text: &str) -> Option<Candidate> {
    let ad = parse_advertisement(text)?;
    debug!(usn = %ad.usn, location = %ad.location, "thermostat advertisement");
    let usn = parse_usn(&ad.usn)?;
    let hostname = location_host(&ad.location)?;
    Some(Candidate {
        id: usn.id,
        hostname,
        name: Some(usn.name),
        class: Some(usn.class),
    })
}

/// Multicast an M-SEARCH and collect responses until `timeout` passes.
/// Duplicate responders are reported once.
pub async fn search(timeout: Duration) -> Result<Vec<Candidate>> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let request = search_request(timeout.as_secs().clamp(1, 5));
    socket.send_to(request.as_bytes(), SSDP_MULTICAST_ADDR).await?;

    let mut candidates: Vec<Candidate> = Vec::new();
    let deadline = tokio::time::Instant::now() + timeout;
    let mut buf = [0u8; 2048];
    loop {
        let recv = tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await;
        let (len, from) = match recv {
            Err(_) => break,
            Ok(Ok(received)) => received,
            Ok(Err(e)) => {
                warn!(error = %e, "SSDP receive failed");
                break;
            }
        };
        let text = String::from_utf8_lossy(&buf[..len]);
        match candidate_from_response(&text) {
            Some(c) if !candidates.iter().any(|k| k.id == c.id) => candidates.push(c),
            Some(_) => {}
            None => debug!(%from, "ignoring unrelated SSDP response"),
        }
    }
    debug!(count = candidates.len(), "SSDP search finished");
    Ok(candidates)
}
