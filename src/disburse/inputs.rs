//! Input lists and recipient address validation

use crate::chain::Account;
use crate::error::{DisburseError, DisburseResult};

use ethers::types::{Address, U256};
use ethers::utils::to_checksum;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

lazy_static! {
    static ref HEX_ADDRESS: Regex =
        Regex::new(r"^(0x)?([0-9a-fA-F]{40})$").expect("static pattern");
    static ref ICAP_ADDRESS: Regex =
        Regex::new(r"^XE[0-9]{2}[0-9A-Za-z]{30,31}$").expect("static pattern");
}

/// Read a JSON array of strings
pub fn load_string_list(path: &Path) -> DisburseResult<Vec<String>> {
    let input_error = |message: String| DisburseError::Input {
        path: path.display().to_string(),
        message,
    };

    let raw = std::fs::read_to_string(path).map_err(|e| input_error(e.to_string()))?;
    serde_json::from_str(&raw).map_err(|e| input_error(e.to_string()))
}

/// Load funding accounts from a JSON array of private keys
pub fn load_accounts(path: &Path) -> DisburseResult<Vec<Account>> {
    load_string_list(path)?
        .iter()
        .enumerate()
        .map(|(index, key)| {
            // Never echo the key itself
            Account::from_private_key(key).map_err(|_| DisburseError::Input {
                path: path.display().to_string(),
                message: format!("entry {} is not a valid private key", index + 1),
            })
        })
        .collect()
}

/// Parse a recipient, rejecting malformed input and bad EIP-55 or ICAP checksums
pub fn parse_destination(input: &str) -> Option<Address> {
    if ICAP_ADDRESS.is_match(input) {
        return parse_icap(input);
    }

    let caps = HEX_ADDRESS.captures(input)?;
    let body = &caps[2];
    let address: Address = format!("0x{}", body).parse().ok()?;

    let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper && to_checksum(&address, None)[2..] != *body {
        return None;
    }

    Some(address)
}

/// Direct ICAP: `XE`, two IBAN check digits, base-36 account number
fn parse_icap(input: &str) -> Option<Address> {
    let upper = input.to_ascii_uppercase();

    // Check digits are computed over BBAN + "XE00", letters expanded to 10..35
    let remainder = upper[4..]
        .chars()
        .chain("XE00".chars())
        .try_fold(0u32, |acc, c| {
            let value = c.to_digit(36)?;
            let shift = if value < 10 { 10 } else { 100 };
            Some((acc * shift + value) % 97)
        })?;
    let check_digits: u32 = upper[2..4].parse().ok()?;
    if check_digits != 98 - remainder {
        return None;
    }

    let mut value = U256::zero();
    for c in upper[4..].chars() {
        value = value
            .checked_mul(U256::from(36u8))?
            .checked_add(U256::from(c.to_digit(36)?))?;
    }
    if value.bits() > 160 {
        return None;
    }

    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    Some(Address::from_slice(&bytes[12..]))
}
