//! Provider-independent transaction shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token movement inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    /// Contract address (EVM) or mint (Solana).
    pub token_address: String,
    pub symbol: String,
    /// Amount in whole token units, as a decimal string.
    pub amount: String,
}

/// A transaction normalized from any chain provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedTx {
    pub hash: String,
    pub from: String,
    pub to: String,
    /// Native value in whole units, as a decimal string.
    pub value: String,
    pub timestamp: DateTime<Utc>,
    pub token_transfers: Vec<TokenTransfer>,
}

impl NormalizedTx {
    /// Whether any token transfer moves the given token (case-insensitive).
    pub fn touches_token(&self, token_address: &str) -> bool {
        self.transfer_for(token_address).is_some()
    }

    /// First transfer of the given token, if any.
    pub fn transfer_for(&self, token_address: &str) -> Option<&TokenTransfer> {
        self.token_transfers
            .iter()
            .find(|t| t.token_address.eq_ignore_ascii_case(token_address))
    }
}

/// Render an integer amount of base units as a decimal string.
///
/// Works on the digit string so values wider than u128 (uint256 on EVM)
/// format without overflow. Trailing fractional zeros are dropped.
pub fn format_units(raw: &str, decimals: u32) -> String {
    let digits = raw.trim().trim_start_matches('0');
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return "0".to_string();
    }

    let decimals = decimals as usize;
    let (int_part, frac_part) = if digits.len() > decimals {
        let split = digits.len() - decimals;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        ("0".to_string(), format!("{:0>width$}", digits, width = decimals))
    };

    let frac_part = frac_part.trim_end_matches('0');
    if frac_part.is_empty() {
        int_part
    } else {
        format!("{}.{}", int_part, frac_part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(address: &str) -> TokenTransfer {
        TokenTransfer {
            token_address: address.to_string(),
            symbol: "USDC".to_string(),
            amount: "1".to_string(),
        }
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units("1000000000000000000", 18), "1");
        assert_eq!(format_units("1500000000000000000", 18), "1.5");
        assert_eq!(format_units("1", 18), "0.000000000000000001");
        assert_eq!(format_units("2500000", 6), "2.5");
        assert_eq!(format_units("0", 18), "0");
        assert_eq!(format_units("", 9), "0");
        assert_eq!(format_units("12345", 0), "12345");
        assert_eq!(format_units("not-a-number", 6), "0");
    }

    #[test]
    fn test_format_units_wider_than_u128() {
        let raw = "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        let formatted = format_units(raw, 18);
        assert!(formatted.starts_with("115792089237316195423570985008687907853269984665640564039457"));
        assert!(formatted.contains('.'));
    }

    #[test]
    fn test_touches_token_case_insensitive() {
        let tx = NormalizedTx {
            hash: "0x1".to_string(),
            from: "0xa".to_string(),
            to: "0xb".to_string(),
            value: "0".to_string(),
            timestamp: Utc::now(),
            token_transfers: vec![transfer("0xAbCd")],
        };
        assert!(tx.touches_token("0xabcd"));
        assert!(tx.touches_token("0XABCD"));
        assert!(!tx.touches_token("0xdead"));
    }
}
