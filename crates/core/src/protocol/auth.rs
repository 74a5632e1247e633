//! Basic and Digest authentication for RTSP requests (RFC 2617 / RFC 2069).
//!
//! When a request is answered with `401 Unauthorized`, the server's
//! `WWW-Authenticate` challenge is parsed into a [`Challenge`] and every
//! following request carries an `Authorization` header derived from it.
//! Digest is preferred when the server offers both schemes.
//!
//! Digest follows the original RFC 2069 form without `qop`/`cnonce`:
//!
//! ```text
//! HA1      = MD5(username:realm:password)
//! HA2      = MD5(method:uri)
//! response = MD5(hex(HA1):nonce:hex(HA2))
//! ```

use base64::prelude::{BASE64_STANDARD, Engine as _};
use md5::{Digest, Md5};

use crate::error::{Result, RtspError};

/// Username and password for a protected stream.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// A parsed `WWW-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    Basic { realm: Option<String> },
    Digest { realm: String, nonce: String },
}

impl Challenge {
    /// Pick the challenge from a 401 response's `WWW-Authenticate` values.
    ///
    /// Returns [`RtspError::UnknownAuthChallenge`] if none is Digest or Basic.
    pub fn from_headers<'a>(values: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let mut basic = None;

        for value in values {
            let value = value.trim();
            if let Some(params) = strip_scheme(value, "digest") {
                let realm = param(params, "realm");
                let nonce = param(params, "nonce");
                if let (Some(realm), Some(nonce)) = (realm, nonce) {
                    return Ok(Challenge::Digest { realm, nonce });
                }
                tracing::warn!(challenge = value, "digest challenge without realm or nonce");
            } else if let Some(params) = strip_scheme(value, "basic") {
                basic.get_or_insert(Challenge::Basic {
                    realm: param(params, "realm"),
                });
            }
        }

        basic.ok_or(RtspError::UnknownAuthChallenge)
    }

    /// `Authorization` header value for one request.
    ///
    /// Digest responses depend on `method` and `uri`, so this is computed
    /// per request.
    pub fn authorization(&self, credentials: &Credentials, method: &str, uri: &str) -> String {
        match self {
            Challenge::Basic { .. } => basic_authorization(credentials),
            Challenge::Digest { realm, nonce } => {
                digest_authorization(credentials, realm, nonce, method, uri)
            }
        }
    }
}

fn strip_scheme<'a>(value: &'a str, scheme: &str) -> Option<&'a str> {
    let head = value.get(..scheme.len())?;
    if !head.eq_ignore_ascii_case(scheme) {
        return None;
    }
    let rest = &value[scheme.len()..];
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

/// Value of `key="value"` (or unquoted `key=value`) in a challenge.
fn param(params: &str, key: &str) -> Option<String> {
    let mut rest = params;
    while !rest.is_empty() {
        let (name, after) = rest.split_once('=')?;
        let name = name.trim().trim_start_matches(',').trim();

        let (value, next) = if let Some(quoted) = after.trim_start().strip_prefix('"') {
            let end = quoted.find('"')?;
            (&quoted[..end], &quoted[end + 1..])
        } else {
            let end = after.find(',').unwrap_or(after.len());
            (after[..end].trim(), &after[end..])
        };

        if name.eq_ignore_ascii_case(key) {
            return Some(value.to_string());
        }
        rest = next.trim_start_matches([',', ' ', '\t']);
    }
    None
}

/// `Basic <base64(username:password)>`, with the pair encoded as ISO-8859-1.
pub fn basic_authorization(credentials: &Credentials) -> String {
    let pair = format!("{}:{}", credentials.username, credentials.password);
    let latin1: Vec<u8> = pair
        .chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect();
    format!("Basic {}", BASE64_STANDARD.encode(latin1))
}

fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// The hex `response` value of a Digest authorization.
pub fn digest_response(
    credentials: &Credentials,
    realm: &str,
    nonce: &str,
    method: &str,
    uri: &str,
) -> String {
    let ha1 = md5_hex(&format!(
        "{}:{}:{}",
        credentials.username, realm, credentials.password
    ));
    let ha2 = md5_hex(&format!("{method}:{uri}"));
    md5_hex(&format!("{ha1}:{nonce}:{ha2}"))
}

/// Full `Digest ...` header value for `method` on `uri`.
pub fn digest_authorization(
    credentials: &Credentials,
    realm: &str,
    nonce: &str,
    method: &str,
    uri: &str,
) -> String {
    let response = digest_response(credentials, realm, nonce, method, uri);
    format!(
        "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\"",
        credentials.username, realm, nonce, uri, response
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_known_vector() {
        let creds = Credentials::new("admin", "secret");
        let response = digest_response(
            &creds,
            "IP Camera",
            "0123abcd",
            "DESCRIBE",
            "rtsp://192.168.1.10:554/stream",
        );
        assert_eq!(response, "0828812690f82cf3efa2bdbb96c3971a");
    }

    #[test]
    fn digest_rfc_example_inputs() {
        let creds = Credentials::new("Mufasa", "Circle Of Life");
        let response = digest_response(
            &creds,
            "testrealm@host.com",
            "dcd98b7102dd2f0e8b11d0f600bfb0c093",
            "GET",
            "/dir/index.html",
        );
        assert_eq!(response, "670fd8c2df070c60b045671b8b24ff02");
    }

    #[test]
    fn digest_header_format() {
        let creds = Credentials::new("user", "pass");
        let header = digest_authorization(
            &creds,
            "live",
            "abc",
            "SETUP",
            "rtsp://127.0.0.1/live/trackID=1",
        );
        assert_eq!(
            header,
            "Digest username=\"user\", realm=\"live\", nonce=\"abc\", \
             uri=\"rtsp://127.0.0.1/live/trackID=1\", \
             response=\"2d8ed3f238597b6dfabad7e03651401b\""
        );
    }

    #[test]
    fn basic_header() {
        assert_eq!(
            basic_authorization(&Credentials::new("admin", "secret")),
            "Basic YWRtaW46c2VjcmV0"
        );
        assert_eq!(
            basic_authorization(&Credentials::new("admin", "pässword")),
            "Basic YWRtaW46cORzc3dvcmQ="
        );
    }

    #[test]
    fn digest_preferred_over_basic() {
        let challenge = Challenge::from_headers([
            "Basic realm=\"cam\"",
            "Digest realm=\"cam\", nonce=\"4f2a\", stale=FALSE",
        ])
        .unwrap();
        assert_eq!(
            challenge,
            Challenge::Digest {
                realm: "cam".into(),
                nonce: "4f2a".into()
            }
        );
    }

    #[test]
    fn basic_only() {
        let challenge = Challenge::from_headers(["BASIC realm=\"Streaming Server\""]).unwrap();
        assert_eq!(
            challenge,
            Challenge::Basic {
                realm: Some("Streaming Server".into())
            }
        );
        let creds = Credentials::new("a", "b");
        assert!(challenge.authorization(&creds, "PLAY", "rtsp://x").starts_with("Basic "));
    }

    #[test]
    fn realm_with_comma_and_unquoted_params() {
        let challenge = Challenge::from_headers([
            "Digest algorithm=MD5, realm=\"Cam, Inc\", nonce=\"n1\"",
        ])
        .unwrap();
        assert_eq!(
            challenge,
            Challenge::Digest {
                realm: "Cam, Inc".into(),
                nonce: "n1".into()
            }
        );
    }

    #[test]
    fn unknown_scheme() {
        assert!(matches!(
            Challenge::from_headers(["Bearer realm=\"x\""]),
            Err(RtspError::UnknownAuthChallenge)
        ));
        assert!(matches!(
            Challenge::from_headers(std::iter::empty()),
            Err(RtspError::UnknownAuthChallenge)
        ));
    }

    #[test]
    fn password_not_in_debug() {
        let creds = Credentials::new("admin", "hunter2");
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
