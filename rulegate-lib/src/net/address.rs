//! Textual IP address parsing.
//!
//! The standard library parsers only accept the strict dotted-quad and RFC 4291 forms.
//! Operator-authored rules and request metadata also use the classic `inet_aton` shorthand
//! for IPv4 (`"10.1"`, `"192.168.65535"`, `"4294967295"`), so parsing is done here.
//!
//! Every function in this module is a soft parser: malformed text yields `None`, never an
//! error, so callers holding untrusted input can degrade to "does not match".

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Parse an IPv4 address into its 4-byte network-order form.
///
/// Accepts one to four dot separated decimal segments. The last segment absorbs all the
/// remaining bits:
///
/// - `a`: a single 32 bit value
/// - `a.b`: `a` is 8 bits, `b` is 24 bits
/// - `a.b.c`: `a` and `b` are 8 bits, `c` is 16 bits
/// - `a.b.c.d`: four 8 bit values
pub fn parse_ipv4(text: &str) -> Option<[u8; 4]> {
    if text.is_empty() {
        return None;
    }

    let mut segments = [0u64; 4];
    let mut count = 0usize;
    for part in text.split('.') {
        if count == segments.len() {
            return None;
        }
        segments[count] = parse_decimal(part)?;
        count += 1;
    }

    let (head, last) = segments[..count].split_at(count - 1);
    if head.iter().any(|&s| s > 0xFF) {
        return None;
    }
    let last = last[0];
    let last_bits = 8 * (4 - head.len() as u32);
    if last >= 1u64 << last_bits {
        return None;
    }

    let mut value: u32 = 0;
    for (i, &segment) in head.iter().enumerate() {
        value |= (segment as u32) << (24 - 8 * i as u32);
    }
    value |= last as u32;
    Some(value.to_be_bytes())
}

/// Parse an IPv6 address into its 16-byte network-order form.
///
/// Supports the full eight group form, `::` zero compression (at most once, standing for at
/// least one group) and a trailing dotted-quad IPv4 part in either the mapped
/// (`::ffff:a.b.c.d`) or compatible (`::a.b.c.d`) position.
pub fn parse_ipv6(text: &str) -> Option<[u8; 16]> {
    if text.is_empty() {
        return None;
    }

    let (head, tail) = match text.find("::") {
        Some(at) => (&text[..at], Some(&text[at + 2..])),
        None => (text, None),
    };

    let mut groups = [0u16; 8];
    match tail {
        None => {
            let parsed = parse_groups(head, true)?;
            if parsed.len() != 8 {
                return None;
            }
            groups.copy_from_slice(&parsed);
        }
        Some(tail) => {
            if tail.contains("::") {
                return None;
            }
            let front = parse_groups(head, false)?;
            let back = parse_groups(tail, true)?;
            if front.len() + back.len() > 7 {
                return None;
            }
            groups[..front.len()].copy_from_slice(&front);
            groups[8 - back.len()..].copy_from_slice(&back);
        }
    }

    let mut bytes = [0u8; 16];
    for (i, group) in groups.iter().enumerate() {
        bytes[2 * i..2 * i + 2].copy_from_slice(&group.to_be_bytes());
    }
    Some(bytes)
}

/// Parse either address family.
///
/// Text containing a `:` is treated as IPv6, anything else as IPv4. IPv4-mapped IPv6 text
/// stays an IPv6 address here; callers that key on identity should use
/// [`IpAddr::to_canonical`].
pub fn parse_address(text: &str) -> Option<IpAddr> {
    let text = text.trim();
    if text.contains(':') {
        parse_ipv6(text).map(|b| IpAddr::V6(Ipv6Addr::from(b)))
    } else {
        parse_ipv4(text).map(|b| IpAddr::V4(Ipv4Addr::from(b)))
    }
}

/// Canonical byte form of an address: 4 bytes for IPv4, 16 bytes for IPv6.
pub fn address_bytes(addr: &IpAddr) -> Vec<u8> {
    match addr {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

/// The IPv4 address embedded in an IPv4-mapped (`::ffff:0:0/96`) IPv6 address.
pub fn ipv4_mapped(addr: &Ipv6Addr) -> Option<Ipv4Addr> {
    addr.to_ipv4_mapped()
}

/// The IPv4 address embedded in an IPv6 address whose 96 high order bits are zero.
pub fn ipv4_compatible(addr: &Ipv6Addr) -> Option<Ipv4Addr> {
    let octets = addr.octets();
    if octets[..12].iter().all(|&b| b == 0) {
        Some(Ipv4Addr::new(octets[12], octets[13], octets[14], octets[15]))
    } else {
        None
    }
}

/// The IPv4 address carried by an IPv6 address in either mapped or compatible form.
pub fn embedded_ipv4(addr: &Ipv6Addr) -> Option<Ipv4Addr> {
    ipv4_mapped(addr).or_else(|| ipv4_compatible(addr))
}

fn parse_decimal(part: &str) -> Option<u64> {
    // 4294967295 is the widest legal segment
    if part.is_empty() || part.len() > 10 || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

fn parse_hex_group(part: &str) -> Option<u16> {
    if part.is_empty() || part.len() > 4 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u16::from_str_radix(part, 16).ok()
}

/// Parse a run of colon separated groups. An empty run yields no groups; an empty group
/// inside a run is malformed.
fn parse_groups(run: &str, allow_ipv4_suffix: bool) -> Option<Vec<u16>> {
    if run.is_empty() {
        return Some(Vec::new());
    }

    let parts: Vec<&str> = run.split(':').collect();
    let mut groups = Vec::with_capacity(8);
    for (i, part) in parts.iter().enumerate() {
        let is_last = i + 1 == parts.len();
        if is_last && allow_ipv4_suffix && part.contains('.') {
            let quad = parse_dotted_quad(part)?;
            groups.push(u16::from_be_bytes([quad[0], quad[1]]));
            groups.push(u16::from_be_bytes([quad[2], quad[3]]));
        } else {
            groups.push(parse_hex_group(part)?);
        }
        if groups.len() > 8 {
            return None;
        }
    }
    Some(groups)
}

/// Strict four segment form, used for the IPv4 tail of an IPv6 address.
fn parse_dotted_quad(text: &str) -> Option<[u8; 4]> {
    let mut quad = [0u8; 4];
    let mut count = 0usize;
    for part in text.split('.') {
        if count == 4 {
            return None;
        }
        let value = parse_decimal(part)?;
        quad[count] = u8::try_from(value).ok()?;
        count += 1;
    }
    (count == 4).then_some(quad)
}
