//! SigV4 query-string presigning for the AWS IoT Core MQTT WebSocket endpoint.
//!
//! The session token is appended after signing; IoT Core rejects URLs
//! where it is part of the canonical query.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::{Digest, Sha256};

use cp_protocol::Credential;

use crate::error::{MqttError, MqttResult};

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "iotdevicegateway";
const CANONICAL_URI: &str = "/mqtt";

/// RFC 3986 unreserved characters stay as-is; everything else is escaped.
const URI_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Build the presigned `wss://` URL for `credential`, signed at `now`.
pub fn presigned_url(credential: &Credential, now: DateTime<Utc>) -> MqttResult<String> {
    let host = credential.broker_endpoint.trim();
    if host.is_empty() {
        return Err(MqttError::Signing("credential has no broker endpoint".into()));
    }

    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let scope = format!("{date}/{}/{SERVICE}/aws4_request", credential.region);

    // Parameters must stay in byte order of their names.
    let query = format!(
        "X-Amz-Algorithm={ALGORITHM}&X-Amz-Credential={}&X-Amz-Date={amz_date}&X-Amz-SignedHeaders=host",
        encode(&format!("{}/{scope}", credential.access_key)),
    );

    let canonical_request = format!(
        "GET\n{CANONICAL_URI}\n{query}\nhost:{host}\n\nhost\n{}",
        hex(&Sha256::digest(b""))
    );
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex(&Sha256::digest(canonical_request.as_bytes()))
    );

    let key = signing_key(&credential.secret_key, &date, &credential.region, SERVICE)?;
    let signature = hex(&hmac_sha256(&key, string_to_sign.as_bytes())?);

    let mut url = format!("wss://{host}{CANONICAL_URI}?{query}&X-Amz-Signature={signature}");
    if !credential.session_token.is_empty() {
        url.push_str("&X-Amz-Security-Token=");
        url.push_str(&encode(&credential.session_token));
    }
    Ok(url)
}

/// Derive the SigV4 signing key for one day, region and service.
pub fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> MqttResult<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> MqttResult<Vec<u8>> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(key).map_err(|e| MqttError::Signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, URI_ENCODE).to_string()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
