//! Contract address extraction.
//!
//! Scans free-form text for base58 runs of the right length and keeps the
//! ones that decode to a 32-byte public key. Stateless: nothing is remembered
//! between calls.

use lazy_static::lazy_static;
use regex::Regex;
use smallvec::SmallVec;
use tracing::warn;

/// Size in bytes of a decoded public key.
const PUBKEY_LEN: usize = 32;

#[allow(clippy::expect_used)]
mod patterns {
    use super::*;

    lazy_static! {
        pub(super) static ref GENERAL: Regex =
            Regex::new(r"\b[1-9A-HJ-NP-Za-km-z]{32,44}\b").expect("valid address regex");
        pub(super) static ref STRICT: Regex =
            Regex::new(r"\b[1-9A-HJ-NP-Za-km-z]{44}\b").expect("valid address regex");
    }
}

/// A structurally valid contract address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContractAddress(String);

impl ContractAddress {
    /// Validate `candidate` as a base58 public key.
    pub fn parse(candidate: &str) -> Result<Self, AddressError> {
        if candidate.len() > 44 {
            return Err(AddressError::TooLong(candidate.len()));
        }
        let decoded = bs58::decode(candidate)
            .into_vec()
            .map_err(|_| AddressError::NotBase58)?;
        if decoded.len() != PUBKEY_LEN {
            return Err(AddressError::WrongLength(decoded.len()));
        }
        Ok(Self(candidate.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContractAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("candidate is {0} characters, longer than any public key")]
    TooLong(usize),
    #[error("candidate is not valid base58")]
    NotBase58,
    #[error("candidate decodes to {0} bytes, expected 32")]
    WrongLength(usize),
}

/// Which candidate shape to look for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Any base58 run of 32 to 44 characters.
    General,
    /// Exactly 44 characters, the shape of launchpad mint addresses.
    #[default]
    Strict,
}

/// Extracts contract addresses from message text.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressExtractor {
    mode: ExtractionMode,
}

impl AddressExtractor {
    pub fn new(mode: ExtractionMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    /// Every valid address in `text`, in order of first appearance, each once.
    ///
    /// Candidates that match the alphabet but fail to decode are dropped with
    /// a warning. Never fails; empty input gives an empty result.
    pub fn extract(&self, text: &str) -> SmallVec<[ContractAddress; 2]> {
        let mut found: SmallVec<[ContractAddress; 2]> = SmallVec::new();
        if text.is_empty() {
            return found;
        }

        let pattern: &Regex = match self.mode {
            ExtractionMode::General => &*patterns::GENERAL,
            ExtractionMode::Strict => &*patterns::STRICT,
        };

        for candidate in pattern.find_iter(text).map(|m| m.as_str()) {
            if found.iter().any(|a| a.as_str() == candidate) {
                continue;
            }
            match ContractAddress::parse(candidate) {
                Ok(address) => found.push(address),
                Err(e) => {
                    warn!(candidate, error = %e, "Dropping malformed address candidate");
                }
            }
        }

        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUMP: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
    // 43 characters: only the general mode picks it up.
    const SYSTEM_PROGRAM_LIKE: &str = "So11111111111111111111111111111111111111112";

    #[test]
    fn test_scenario_single_address() {
        let extractor = AddressExtractor::new(ExtractionMode::Strict);
        let found = extractor.extract(&format!("check out {PUMP} now"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].as_str(), PUMP);
    }

    #[test]
    fn test_empty_and_plain_text() {
        let extractor = AddressExtractor::default();
        assert!(extractor.extract("").is_empty());
        assert!(extractor.extract("gm frens, new call dropping in 5 min").is_empty());
        // Alphabet excludes 0, O, I and l.
        assert!(
            extractor
                .extract("0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl")
                .is_empty()
        );
    }

    #[test]
    fn test_repeats_are_reported_once() {
        let extractor = AddressExtractor::new(ExtractionMode::Strict);
        let text = format!("{PUMP}\n{USDC}\nagain: {PUMP} and {USDC}");
        let found: Vec<_> = extractor.extract(&text).into_iter().map(|a| a.into_string()).collect();
        assert_eq!(found, vec![PUMP.to_string(), USDC.to_string()]);
    }

    #[test]
    fn test_strict_ignores_shorter_runs() {
        let strict = AddressExtractor::new(ExtractionMode::Strict);
        let general = AddressExtractor::new(ExtractionMode::General);
        let text = format!("wrapped sol {SYSTEM_PROGRAM_LIKE}");
        assert!(strict.extract(&text).is_empty());
        assert_eq!(general.extract(&text).len(), 1);
    }

    #[test]
    fn test_longer_runs_do_not_match() {
        let extractor = AddressExtractor::new(ExtractionMode::Strict);
        let text = format!("{PUMP}abc");
        assert!(extractor.extract(&text).is_empty());
    }

    #[test]
    fn test_structurally_invalid_candidate_is_dropped() {
        // Right shape, but decodes to more than 32 bytes.
        let bogus = "zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz";
        assert_eq!(bogus.len(), 44);
        let extractor = AddressExtractor::new(ExtractionMode::Strict);
        assert!(extractor.extract(bogus).is_empty());
        assert!(matches!(
            ContractAddress::parse(bogus),
            Err(AddressError::WrongLength(_))
        ));
    }

    #[test]
    fn test_url_embedded_address() {
        let extractor = AddressExtractor::new(ExtractionMode::Strict);
        let found = extractor.extract(&format!("https://pump.fun/coin/{PUMP}"));
        assert_eq!(found.len(), 1);
    }
}
