use super::errors::TrackerError;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

pub const INVALID_ADDRESS: &str = "invalid address";

/// Parses a base58 account address, rejecting anything that is not exactly 32 encoded bytes.
pub fn parse_address(identifier: &str) -> Result<Pubkey, TrackerError> {
    Pubkey::from_str(identifier).map_err(|_| TrackerError::Validation(INVALID_ADDRESS.to_string()))
}

pub fn is_valid(identifier: &str) -> bool {
    parse_address(identifier).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "vines1vzrYbzLMRdu58ou5XTby4qAqVRLmqo36NKPTg";

    #[test]
    fn accepts_a_well_formed_address() {
        assert!(is_valid(ADDRESS));
        assert!(is_valid("11111111111111111111111111111111"));
        assert_eq!(parse_address(ADDRESS).unwrap().to_string(), ADDRESS);
    }

    #[test]
    fn rejects_empty_and_blank_input() {
        assert!(!is_valid(""));
        assert!(!is_valid("   "));
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(!is_valid(&ADDRESS[..ADDRESS.len() - 1]));
        assert!(!is_valid(&format!("{ADDRESS}1")));
        assert!(!is_valid("1111111111111111111111111111111"));
    }

    #[test]
    fn rejects_characters_outside_the_alphabet() {
        for bad in ['0', 'O', 'I', 'l', '+', '/'] {
            let candidate = format!("{}{}", bad, &ADDRESS[1..]);
            assert!(!is_valid(&candidate), "{candidate} should be rejected");
        }
    }

    #[test]
    fn reports_a_validation_error() {
        assert_eq!(
            parse_address("not-an-address"),
            Err(TrackerError::Validation(INVALID_ADDRESS.to_string()))
        );
    }
}
