use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

const SIGNED_PREFIX: &str = "s:";

/// Cookies parsed from the request, attached as a request extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: Vec<(String, String)>,
}

impl CookieJar {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut cookies = Vec::new();
        for value in headers.get_all(header::COOKIE) {
            let Ok(s) = value.to_str() else { continue; };
            for part in s.split(';') {
                let p = part.trim();
                if let Some((k, v)) = p.split_once('=') {
                    let v = v.trim().trim_matches('"');
                    let decoded = urlencoding::decode(v).map(|c| c.into_owned()).unwrap_or_else(|_| v.to_string());
                    cookies.push((k.trim().to_string(), decoded));
                }
            }
        }
        Self { cookies }
    }

    /// First cookie with this name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize { self.cookies.len() }

    pub fn is_empty(&self) -> bool { self.cookies.is_empty() }
}

/// Middleware: parse the Cookie header once and expose it as a [`CookieJar`].
pub async fn cookie_parser(mut req: Request, next: Next) -> Response {
    let jar = CookieJar::from_headers(req.headers());
    req.extensions_mut().insert(jar);
    next.run(req).await
}

fn mac_for(secret: &str) -> HmacSha256 {
    match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC accepts keys of any length"),
    }
}

/// `s:<id>.<signature>` where the signature is HMAC-SHA256 over the id.
pub fn sign_session_id(sid: &str, secret: &str) -> String {
    let mut mac = mac_for(secret);
    mac.update(sid.as_bytes());
    let sig = base64::engine::general_purpose::STANDARD_NO_PAD.encode(mac.finalize().into_bytes());
    format!("{}{}.{}", SIGNED_PREFIX, sid, sig)
}

/// Verify a signed cookie value and return the session id it carries.
pub fn unsign_session_id(value: &str, secret: &str) -> Option<String> {
    let body = value.strip_prefix(SIGNED_PREFIX)?;
    let (sid, sig) = body.rsplit_once('.')?;
    let sig = base64::engine::general_purpose::STANDARD_NO_PAD.decode(sig).ok()?;
    let mut mac = mac_for(secret);
    mac.update(sid.as_bytes());
    mac.verify_slice(&sig).ok()?;
    Some(sid.to_string())
}

/// HttpOnly session cookie. SameSite=Lax keeps it on the provider's redirect back.
pub fn session_cookie(name: &str, signed: &str, max_age_secs: u64, secure: bool) -> AppResult<HeaderValue> {
    let mut v = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        name,
        urlencoding::encode(signed),
        max_age_secs
    );
    if secure {
        v.push_str("; Secure");
    }
    HeaderValue::from_str(&v).map_err(|e| AppError::session("cookie_encode", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trip_and_tamper() {
        let signed = sign_session_id("abc123", "secret");
        assert!(signed.starts_with("s:abc123."));
        assert_eq!(unsign_session_id(&signed, "secret").as_deref(), Some("abc123"));
        assert_eq!(unsign_session_id(&signed, "other-secret"), None);
        let tampered = signed.replace("abc123", "abc124");
        assert_eq!(unsign_session_id(&tampered, "secret"), None);
        assert_eq!(unsign_session_id("abc123", "secret"), None);
    }

    #[test]
    fn jar_parses_multiple_headers_and_decodes() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1; site.sid=s%3Axyz.sig"));
        headers.append(header::COOKIE, HeaderValue::from_static("b=\"two\""));
        let jar = CookieJar::from_headers(&headers);
        assert_eq!(jar.len(), 3);
        assert_eq!(jar.get("site.sid"), Some("s:xyz.sig"));
        assert_eq!(jar.get("b"), Some("two"));
        assert_eq!(jar.get("missing"), None);
    }

    #[test]
    fn cookie_header_encodes_signed_value() {
        let signed = sign_session_id("abc", "k");
        let h = session_cookie("site.sid", &signed, 60, false).unwrap();
        let s = h.to_str().unwrap();
        assert!(s.starts_with("site.sid=s%3Aabc."));
        assert!(s.contains("HttpOnly"));
        assert!(!s.contains("Secure"));
        assert!(session_cookie("site.sid", &signed, 60, true).unwrap().to_str().unwrap().ends_with("; Secure"));
    }
}
