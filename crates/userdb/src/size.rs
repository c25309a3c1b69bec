//! Human-readable size strings for quota limits.
//!
//! Byte limits use binary multiples (`10Ki` = 10 * 2^10) while inode limits
//! use decimal multiples (`10k` = 10 * 10^3). Mixing the two up silently
//! changes a limit by 2.4% per prefix step, so each has its own parser.

use crate::error::{Error, Result};

/// Parse a byte size with binary suffixes.
///
/// Accepted suffixes: `Ki`/`k`/`K` (2^10), `Mi`/`m`/`M` (2^20),
/// `Gi`/`g`/`G` (2^30), `Ti`/`t`/`T` (2^40). No suffix means bytes.
pub fn parse_iec_size(input: &str) -> Result<u64> {
    let (digits, suffix) = split_number(input)?;
    let multiplier: u64 = match suffix {
        "" => 1,
        "Ki" | "k" | "K" => 1 << 10,
        "Mi" | "m" | "M" => 1 << 20,
        "Gi" | "g" | "G" => 1 << 30,
        "Ti" | "t" | "T" => 1 << 40,
        _ => return Err(Error::InvalidSize(input.to_string())),
    };
    scale(input, digits, multiplier)
}

/// Parse an inode count with decimal suffixes.
///
/// Accepted suffixes: `k` (10^3), `m` (10^6), `g` (10^9), `t` (10^12).
pub fn parse_si_size(input: &str) -> Result<u64> {
    let (digits, suffix) = split_number(input)?;
    let multiplier: u64 = match suffix {
        "" => 1,
        "k" => 1_000,
        "m" => 1_000_000,
        "g" => 1_000_000_000,
        "t" => 1_000_000_000_000,
        _ => return Err(Error::InvalidSize(input.to_string())),
    };
    scale(input, digits, multiplier)
}

fn split_number(input: &str) -> Result<(&str, &str)> {
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, suffix) = input.split_at(split);
    if digits.is_empty() {
        return Err(Error::InvalidSize(input.to_string()));
    }
    Ok((digits, suffix))
}

fn scale(input: &str, digits: &str, multiplier: u64) -> Result<u64> {
    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| Error::SizeOverflow(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_number() {
        assert_eq!(parse_iec_size("100").unwrap(), 100);
        assert_eq!(parse_si_size("100").unwrap(), 100);
        assert_eq!(parse_iec_size("0").unwrap(), 0);
    }

    #[test]
    fn test_iec_suffixes() {
        assert_eq!(parse_iec_size("10k").unwrap(), 10_240);
        assert_eq!(parse_iec_size("10Ki").unwrap(), 10_240);
        assert_eq!(parse_iec_size("5m").unwrap(), 5_242_880);
        assert_eq!(parse_iec_size("2g").unwrap(), 2_147_483_648);
        assert_eq!(parse_iec_size("1Gi").unwrap(), 1_073_741_824);
        assert_eq!(parse_iec_size("1t").unwrap(), 1_099_511_627_776);
    }

    #[test]
    fn test_si_suffixes() {
        assert_eq!(parse_si_size("10k").unwrap(), 10_000);
        assert_eq!(parse_si_size("3m").unwrap(), 3_000_000);
        assert_eq!(parse_si_size("2g").unwrap(), 2_000_000_000);
        assert_eq!(parse_si_size("1t").unwrap(), 1_000_000_000_000);
    }

    #[test]
    fn test_byte_and_inode_parsers_use_different_bases() {
        for input in ["10k", "7m", "1g", "2t"] {
            let bytes = parse_iec_size(input).unwrap();
            let inodes = parse_si_size(input).unwrap();
            assert_ne!(bytes, inodes, "{input} must not parse identically");
            assert!(bytes > inodes);
        }
    }

    #[test]
    fn test_invalid_strings() {
        assert_eq!(
            parse_iec_size("abc").unwrap_err().to_string(),
            "invalid size string: abc"
        );
        assert!(parse_iec_size("").is_err());
        assert!(parse_iec_size("10Xi").is_err());
        assert!(parse_si_size("10Ki").is_err());
        assert!(parse_si_size("-1").is_err());
    }

    #[test]
    fn test_overflow() {
        assert!(matches!(
            parse_iec_size("99999999999999999999"),
            Err(Error::SizeOverflow(_))
        ));
        assert!(matches!(
            parse_iec_size("17179869184Gi"),
            Err(Error::SizeOverflow(_))
        ));
    }
}
