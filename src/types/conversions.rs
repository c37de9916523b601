use crate::error::ConfigError;
use ethers::types::Address;
use std::str::FromStr;

// Addresses are always rendered lower-case, which is also how allow-lists are
// compared and sent to providers.
pub fn address_to_string(addr: Address) -> String {
    format!("{:?}", addr).to_lowercase()
}

/// Parses a `0x`-prefixed (or bare) 20-byte hex address, any letter case.
pub fn string_to_address(s: &str) -> Result<Address, ConfigError> {
    let trimmed = s.trim();
    let hex = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")).unwrap_or(trimmed);
    if hex.len() != 40 {
        return Err(ConfigError::InvalidAddress(trimmed.to_string()));
    }
    Address::from_str(&hex.to_lowercase()).map_err(|_| ConfigError::InvalidAddress(trimmed.to_string()))
}
