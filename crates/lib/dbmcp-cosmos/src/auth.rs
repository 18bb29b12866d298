//! Master-key authorization for the Cosmos DB REST API.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::form_urlencoded;

type HmacSha256 = Hmac<Sha256>;

/// Decoded account key.
#[derive(Clone)]
pub(crate) struct MasterKey(Vec<u8>);

impl MasterKey {
    pub(crate) fn decode(encoded: &str) -> Result<Self, base64::DecodeError> {
        BASE64.decode(encoded.trim()).map(Self)
    }

    /// Builds the url-encoded `authorization` header value for one request.
    pub(crate) fn authorization(
        &self,
        verb: &str,
        resource_type: &str,
        resource_link: &str,
        date: &str,
    ) -> String {
        let payload = string_to_sign(verb, resource_type, resource_link, date);
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.0) else {
            // HMAC accepts keys of any length.
            return String::new();
        };
        mac.update(payload.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());
        let token = format!("type=master&ver=1.0&sig={signature}");
        form_urlencoded::byte_serialize(token.as_bytes()).collect()
    }
}

/// Canonical request description signed with the master key.
pub(crate) fn string_to_sign(verb: &str, resource_type: &str, resource_link: &str, date: &str) -> String {
    format!(
        "{}\n{}\n{}\n{}\n\n",
        verb.to_lowercase(),
        resource_type.to_lowercase(),
        resource_link,
        date.to_lowercase()
    )
}

/// RFC 1123 timestamp used for the `x-ms-date` header.
pub(crate) fn http_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn string_to_sign_lowercases_all_but_link() {
        let payload = string_to_sign("GET", "Colls", "dbs/Shop", "Thu, 27 Apr 2017 00:51:12 GMT");
        assert_eq!(payload, "get\ncolls\ndbs/Shop\nthu, 27 apr 2017 00:51:12 gmt\n\n");
    }

    #[test]
    fn http_date_is_rfc1123() {
        let now = Utc.with_ymd_and_hms(2017, 4, 27, 0, 51, 12).unwrap();
        assert_eq!(http_date(now), "Thu, 27 Apr 2017 00:51:12 GMT");
    }

    #[test]
    fn authorization_is_url_encoded_master_token() {
        let key = MasterKey::decode("c2VjcmV0LWtleQ==").unwrap();
        let token = key.authorization("GET", "dbs", "dbs/Shop", "Thu, 27 Apr 2017 00:51:12 GMT");

        assert!(token.starts_with("type%3Dmaster%26ver%3D1.0%26sig%3D"));
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
    }

    #[test]
    fn signature_depends_on_request() {
        let key = MasterKey::decode("c2VjcmV0LWtleQ==").unwrap();
        let date = "Thu, 27 Apr 2017 00:51:12 GMT";
        let get = key.authorization("GET", "docs", "dbs/Shop/colls/orders/docs/1", date);
        let again = key.authorization("get", "DOCS", "dbs/Shop/colls/orders/docs/1", date);
        let post = key.authorization("POST", "docs", "dbs/Shop/colls/orders", date);

        assert_eq!(get, again);
        assert_ne!(get, post);
    }

    #[test]
    fn invalid_key_is_rejected() {
        assert!(MasterKey::decode("not base64!").is_err());
    }
}
