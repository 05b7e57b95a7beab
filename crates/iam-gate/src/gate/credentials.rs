//! Credential extraction from the request query string.

use std::collections::HashMap;
use std::fmt;

use super::{GateError, IamConfig};

/// Query string decoded into parameter name -> values, in order of appearance.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueryParams(HashMap<String, Vec<String>>);

impl QueryParams {
    /// Parse an `application/x-www-form-urlencoded` query string.
    ///
    /// A pair without `=` is a key with an empty value. Empty pairs, pairs
    /// containing `;` and pairs with a malformed `%` escape are dropped.
    pub fn parse(query: &str) -> Self {
        let mut params: HashMap<String, Vec<String>> = HashMap::new();
        for pair in query.split('&') {
            if pair.is_empty() || pair.contains(';') {
                continue;
            }
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let (Some(key), Some(value)) = (decode_component(key), decode_component(value))
            else {
                continue;
            };
            params.entry(key).or_default().push(value);
        }
        Self(params)
    }

    /// First value given for `name`, if the parameter appears at all.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// Decode one query component: `+` is a space and `%XX` is a byte.
///
/// Returns `None` if any escape is malformed. Bytes that are not valid
/// UTF-8 become U+FFFD.
fn decode_component(raw: &str) -> Option<String> {
    if !has_valid_escapes(raw.as_bytes()) {
        return None;
    }
    let spaced = raw.replace('+', " ");
    let bytes = urlencoding::decode_binary(spaced.as_bytes());
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Every `%` is followed by two hex digits.
fn has_valid_escapes(raw: &[u8]) -> bool {
    let mut i = 0;
    while i < raw.len() {
        if raw[i] != b'%' {
            i += 1;
            continue;
        }
        match raw.get(i + 1..i + 3) {
            Some([hi, lo]) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => i += 3,
            _ => return false,
        }
    }
    true
}

/// Username/password pair taken from the query string.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Pull the configured username and password parameters out of a query.
    ///
    /// When a parameter repeats, the first occurrence wins.
    pub fn from_query(query: Option<&str>, config: &IamConfig) -> Result<Self, GateError> {
        let params = QueryParams::parse(query.unwrap_or_default());

        let username = params
            .first(config.username_param())
            .ok_or_else(|| GateError::MalformedQuery(config.username_param().to_string()))?;
        let password = params
            .first(config.password_param())
            .ok_or_else(|| GateError::MalformedQuery(config.password_param().to_string()))?;

        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
