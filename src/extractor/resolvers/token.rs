// Token recovery from the provider's companion script
//
// Heuristics run in fixed priority order and the first match wins:
// 1. a literal /secure/<token>/ path
// 2. atob("<b64>") whose decoded text is stored reversed
// 3. "<text>".split("").reverse() string literal

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use lazy_static::lazy_static;
use regex::Regex;

/// Decoded+reversed tokens must be longer than this
pub const MIN_DECODED_TOKEN_LEN: usize = 16;

const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

lazy_static! {
    static ref SECURE_PATH: Regex = Regex::new(r"/secure/([A-Za-z0-9_-]{8,})/").unwrap();
    static ref ATOB_CALL: Regex =
        Regex::new(r#"atob\(\s*["']([A-Za-z0-9+/=]+)["']\s*\)"#).unwrap();
    static ref REVERSED_LITERAL: Regex =
        Regex::new(r#"["']([^"']+)["']\s*\.split\(\s*["']{2}\s*\)\s*\.reverse\(\)"#).unwrap();
}

/// Which heuristic produced a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    SecurePath,
    ReversedBase64,
    ReversedLiteral,
}

impl TokenSource {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::SecurePath => "literal secure path",
            Self::ReversedBase64 => "reversed base64",
            Self::ReversedLiteral => "reversed string literal",
        }
    }
}

fn reverse(text: &str) -> String {
    text.chars().rev().collect()
}

fn from_secure_path(script: &str) -> Option<String> {
    SECURE_PATH
        .captures(script)
        .map(|caps| caps[1].to_string())
}

fn from_reversed_base64(script: &str) -> Option<String> {
    ATOB_CALL.captures_iter(script).find_map(|caps| {
        let bytes = LENIENT_BASE64.decode(&caps[1]).ok()?;
        let decoded = String::from_utf8(bytes).ok()?;
        let token = reverse(&decoded);
        (token.chars().count() > MIN_DECODED_TOKEN_LEN).then_some(token)
    })
}

fn from_reversed_literal(script: &str) -> Option<String> {
    REVERSED_LITERAL
        .captures(script)
        .map(|caps| reverse(&caps[1]))
}

/// Try every heuristic in priority order
pub fn extract_token(script: &str) -> Option<(String, TokenSource)> {
    if let Some(token) = from_secure_path(script) {
        return Some((token, TokenSource::SecurePath));
    }
    if let Some(token) = from_reversed_base64(script) {
        return Some((token, TokenSource::ReversedBase64));
    }
    from_reversed_literal(script).map(|token| (token, TokenSource::ReversedLiteral))
}
