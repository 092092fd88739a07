use std::cmp::Ordering;
use std::net::IpAddr;

use rulegate_lib::net::{parse_ipv4, parse_ipv6};
use rulegate_lib::{parse_address, CidrBlock, CidrError};

type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[test]
fn test_dotted_quads_parse_to_their_octets() {
    for (a, b, c, d) in [(127, 0, 0, 1), (0, 0, 0, 0), (255, 255, 255, 255), (10, 200, 3, 99)] {
        let text = format!("{a}.{b}.{c}.{d}");
        assert_eq!(parse_ipv4(&text), Some([a, b, c, d]), "{text}");
    }
}

#[test]
fn test_ipv6_canonical_forms() {
    let mut loopback = [0u8; 16];
    loopback[15] = 1;
    assert_eq!(parse_ipv6("::1"), Some(loopback));
    assert_eq!(parse_ipv6("::"), Some([0u8; 16]));

    let mut mapped = [0u8; 16];
    mapped[10] = 0xff;
    mapped[11] = 0xff;
    mapped[12..].copy_from_slice(&[129, 144, 52, 38]);
    assert_eq!(parse_ipv6("::FFFF:129.144.52.38"), Some(mapped));

    assert_eq!(
        parse_ipv6("1080::8:800:200C:417A"),
        Some([0x10, 0x80, 0, 0, 0, 0, 0, 0, 0, 0x08, 0x08, 0x00, 0x20, 0x0C, 0x41, 0x7A])
    );
}

#[test]
fn test_malformed_text_is_soft_failure() {
    for text in ["", "1.2.3.4.5", "256.0.0.1", "1:2:3:4:5:6:7:8:9", "::1::", "host.example", "1.2.3.-4"] {
        assert_eq!(parse_address(text), None, "{text:?}");
    }
}

#[test]
fn test_block_compares_equal_to_itself() -> TestResult {
    for text in ["10.0.0.0/8", "192.168.0.0/24", "2001:db8::/32", "0.0.0.0/0"] {
        let block: CidrBlock = text.parse()?;
        assert_eq!(block.cmp(&block), Ordering::Equal, "{text}");
    }
    Ok(())
}

#[test]
fn test_disjoint_blocks_order_one_way() -> TestResult {
    let blocks: Vec<CidrBlock> = ["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16", "200.1.0.0/16"]
        .iter()
        .map(|s| s.parse())
        .collect::<Result<_, _>>()?;
    for a in &blocks {
        for b in &blocks {
            if a == b {
                continue;
            }
            let forward = a.cmp(b) == Ordering::Greater;
            let backward = b.cmp(a) == Ordering::Greater;
            assert!(forward ^ backward, "{a} vs {b}");
        }
    }
    let mut sorted = blocks.clone();
    sorted.reverse();
    sorted.sort();
    assert_eq!(sorted, blocks);
    Ok(())
}

#[test]
fn test_cross_family_containment() -> TestResult {
    let v4_block: CidrBlock = "129.144.52.0/24".parse()?;
    let mapped = parse_address("::ffff:129.144.52.38").ok_or("mapped address")?;
    let compatible = parse_address("::129.144.52.38").ok_or("compatible address")?;
    let native = parse_address("2001:db8::1").ok_or("native address")?;

    assert!(v4_block.contains(&mapped)?);
    assert!(v4_block.contains(&compatible)?);
    let err = v4_block.contains(&native);
    assert!(err.is_err());
    if let Err(e) = err {
        assert_eq!(e.address, native);
        assert_eq!(e.block, v4_block);
    }
    Ok(())
}

#[test]
fn test_construction_errors() {
    let v4: IpAddr = IpAddr::from([192, 168, 0, 0]);
    assert!(matches!(CidrBlock::new(v4, 33), Err(CidrError::PrefixLength { .. })));
    assert!(matches!(CidrBlock::new(v4, 8), Err(CidrError::HostBits { .. })));
    assert!(CidrBlock::new(v4, 16).is_ok());
    assert!(CidrBlock::new(IpAddr::from([0u16; 8]), 129).is_err());
}
