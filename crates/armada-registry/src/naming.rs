//! Record naming for cluster registrations
//!
//! A cluster's Secret name is derived from its server URI:
//! `<prefix>-<host>-<fnv32a(server)>`. The host stem keeps names readable;
//! the checksum over the verbatim URI keeps them unique when stems collide
//! (different ports, paths or schemes on one host).
//!
//! Existing deployments already store records under these names, so the
//! output must stay byte-identical. The tests pin golden values.

use std::net::IpAddr;

use armada_common::{Error, Result};

const FNV32_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;

/// Derive the record name for a cluster server
///
/// Fails only when `server` cannot be parsed as a request URI. A parseable URI
/// with an empty host still yields a name with an empty stem.
pub fn uri_to_secret_name(prefix: &str, server: &str) -> Result<String> {
    let uri = RequestUri::parse(server)?;
    let stem = match uri.host {
        Some(host) => host_stem(host)?,
        None => String::new(),
    };
    Ok(format!("{}-{}-{}", prefix, stem, fnv32a(server.as_bytes())))
}

/// Normalize a server URI for equality checks and cache keys
///
/// Lowercases scheme and host, canonicalizes IP literals, folds the scheme's
/// default port and strips trailing slashes. Input that does not parse is
/// returned with only trailing slashes removed.
pub fn normalize_server(server: &str) -> String {
    let trimmed = server.trim_end_matches('/');
    let uri = match RequestUri::parse(trimmed) {
        Ok(uri) => uri,
        Err(_) => return trimmed.to_string(),
    };
    let (Some(scheme), Some(host)) = (uri.scheme, uri.host) else {
        return trimmed.to_string();
    };

    let scheme = scheme.to_ascii_lowercase();
    let (host, port) = match split_host_port(host) {
        Ok(parts) => parts,
        Err(_) => return trimmed.to_string(),
    };
    let port = port.filter(|p| !p.is_empty() && Some(*p) != default_port(&scheme));

    let mut out = format!("{}://", scheme);
    if let Some(userinfo) = uri.userinfo {
        out.push_str(userinfo);
        out.push('@');
    }
    out.push_str(&host);
    if let Some(port) = port {
        out.push(':');
        out.push_str(port);
    }
    out.push_str(uri.path);
    if let Some(query) = uri.query {
        out.push('?');
        out.push_str(query);
    }
    out
}

/// 32-bit FNV-1a
fn fnv32a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV32_OFFSET_BASIS, |hash, b| {
        (hash ^ u32::from(*b)).wrapping_mul(FNV32_PRIME)
    })
}

fn default_port(scheme: &str) -> Option<&'static str> {
    match scheme {
        "http" | "ws" => Some("80"),
        "https" | "wss" => Some("443"),
        _ => None,
    }
}

/// Readable stem for a host: IP literals canonicalized with `:` replaced by
/// `-`, otherwise everything before the first colon
fn host_stem(host: &str) -> Result<String> {
    if host.starts_with('[') {
        let end = host
            .find(']')
            .ok_or_else(|| Error::invalid_argument(format!("missing ']' in host {:?}", host)))?;
        let literal = canonical_ip_literal(&host[1..end])?;
        return Ok(literal.replace(':', "-"));
    }
    let bare = match host.find(':') {
        Some(i) => &host[..i],
        None => host,
    };
    Ok(bare.to_lowercase())
}

/// Split an authority host into a normalized host and its raw port
fn split_host_port(host: &str) -> Result<(String, Option<&str>)> {
    if host.starts_with('[') {
        let end = host
            .find(']')
            .ok_or_else(|| Error::invalid_argument(format!("missing ']' in host {:?}", host)))?;
        let literal = canonical_ip_literal(&host[1..end])?;
        let port = host[end + 1..].strip_prefix(':');
        return Ok((format!("[{}]", literal), port));
    }
    match host.rfind(':') {
        Some(i) => Ok((host[..i].to_lowercase(), Some(&host[i + 1..]))),
        None => Ok((host.to_lowercase(), None)),
    }
}

/// Canonical text form of a bracketed IP literal, keeping any zone suffix
fn canonical_ip_literal(literal: &str) -> Result<String> {
    let literal = literal.replace("%25", "%");
    let (addr, zone) = match literal.split_once('%') {
        Some((addr, zone)) => (addr, Some(zone)),
        None => (literal.as_str(), None),
    };
    let ip: IpAddr = addr
        .parse()
        .map_err(|e| Error::invalid_argument(format!("invalid IP literal {:?}: {}", addr, e)))?;
    Ok(match zone {
        Some(zone) => format!("{}%{}", ip, zone),
        None => ip.to_string(),
    })
}

/// The pieces of a URI as received in a request line: an absolute URI or an
/// absolute path
#[derive(Debug, PartialEq, Eq)]
struct RequestUri<'a> {
    scheme: Option<&'a str>,
    userinfo: Option<&'a str>,
    /// Host with optional port, `None` for absolute paths and opaque URIs
    host: Option<&'a str>,
    path: &'a str,
    query: Option<&'a str>,
}

impl<'a> RequestUri<'a> {
    fn parse(raw: &'a str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::invalid_argument("empty server URI"));
        }
        if raw.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(Error::invalid_argument(format!(
                "server URI {:?} contains whitespace or control characters",
                raw
            )));
        }

        let (scheme, rest) = split_scheme(raw)?;
        let (rest, query) = match rest.split_once('?') {
            Some((rest, query)) => (rest, Some(query)),
            None => (rest, None),
        };

        if !rest.starts_with('/') {
            if scheme.is_some() {
                // Opaque form such as `mailto:x`: parseable, no host
                return Ok(Self {
                    scheme,
                    userinfo: None,
                    host: None,
                    path: rest,
                    query,
                });
            }
            return Err(Error::invalid_argument(format!(
                "server URI {:?} is neither absolute nor an absolute path",
                raw
            )));
        }

        let Some(after_slashes) = rest.strip_prefix("//").filter(|_| scheme.is_some()) else {
            return Ok(Self {
                scheme,
                userinfo: None,
                host: None,
                path: rest,
                query,
            });
        };

        let (authority, path) = match after_slashes.find('/') {
            Some(i) => (&after_slashes[..i], &after_slashes[i..]),
            None => (after_slashes, ""),
        };
        let (userinfo, host) = match authority.rfind('@') {
            Some(i) => (Some(&authority[..i]), &authority[i + 1..]),
            None => (None, authority),
        };
        validate_host(host)?;

        Ok(Self {
            scheme,
            userinfo,
            host: Some(host),
            path,
            query,
        })
    }
}

/// Split off a leading `scheme:`; a string whose first `:` is preceded by a
/// non-scheme character has no scheme
fn split_scheme(raw: &str) -> Result<(Option<&str>, &str)> {
    for (i, c) in raw.char_indices() {
        match c {
            'a'..='z' | 'A'..='Z' => {}
            '0'..='9' | '+' | '-' | '.' if i > 0 => {}
            ':' if i == 0 => {
                return Err(Error::invalid_argument(format!(
                    "server URI {:?} is missing a scheme",
                    raw
                )))
            }
            ':' => return Ok((Some(&raw[..i]), &raw[i + 1..])),
            _ => return Ok((None, raw)),
        }
    }
    Ok((None, raw))
}

fn validate_host(host: &str) -> Result<()> {
    if host.starts_with('[') {
        let end = host
            .find(']')
            .ok_or_else(|| Error::invalid_argument(format!("missing ']' in host {:?}", host)))?;
        return validate_optional_port(&host[end + 1..]);
    }
    match host.rfind(':') {
        Some(i) => validate_optional_port(&host[i..]),
        None => Ok(()),
    }
}

/// Empty, or a colon followed by zero or more digits
fn validate_optional_port(port: &str) -> Result<()> {
    if port.is_empty() {
        return Ok(());
    }
    match port.strip_prefix(':') {
        Some(digits) if digits.bytes().all(|b| b.is_ascii_digit()) => Ok(()),
        _ => Err(Error::invalid_argument(format!(
            "invalid port {:?} after host",
            port
        ))),
    }
}
