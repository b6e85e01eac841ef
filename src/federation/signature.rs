//! HTTP Signatures for ActivityPub
//!
//! Signing and verification per:
//! https://docs.joinmastodon.org/spec/security/
//!
//! Every outbound delivery and authorized fetch is signed with the
//! originating event's RSA key; every inbound inbox POST must carry a
//! verifiable signature before it is dispatched.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::{RsaPublicKey, pkcs1v15::Signature as Pkcs1v15Signature};
use sha2::{Digest, Sha256};
use std::net::IpAddr;

use crate::error::AppError;

/// Maximum accepted clock skew on the Date header, in seconds.
const MAX_DATE_SKEW_SECS: i64 = 300;

fn is_disallowed_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || v6.is_multicast()
                || v6.is_unspecified()
        }
    }
}

fn is_disallowed_host(host: &str) -> bool {
    let normalized = host.trim_end_matches('.').to_ascii_lowercase();
    if normalized == "localhost" || normalized.ends_with(".localhost") {
        return true;
    }

    normalized
        .parse::<IpAddr>()
        .map(is_disallowed_ip)
        .unwrap_or(false)
}

/// Resolve a host and reject it if any address is local or private.
///
/// Hosts that look public but resolve internally are an SSRF vector.
pub async fn validate_resolved_host_ips(host: &str, port: u16) -> Result<(), AppError> {
    let normalized = host.trim_end_matches('.').to_ascii_lowercase();

    let mut resolved_any = false;
    let lookup = tokio::net::lookup_host((normalized.as_str(), port))
        .await
        .map_err(|e| AppError::Federation(format!("Failed to resolve remote host: {}", e)))?;

    for addr in lookup {
        resolved_any = true;
        if is_disallowed_ip(addr.ip()) {
            return Err(AppError::Forbidden);
        }
    }

    if !resolved_any {
        return Err(AppError::Federation(
            "No DNS records for remote host".to_string(),
        ));
    }

    Ok(())
}

/// Extract and validate the remote domain from an actor URL or key ID URL.
///
/// Rejects non-HTTP(S) URLs and obvious local/private hosts.
pub fn extract_actor_domain(actor_or_key_id: &str) -> Result<String, AppError> {
    let actor_url = actor_or_key_id.split('#').next().unwrap_or(actor_or_key_id);
    let parsed = url::Url::parse(actor_url)
        .map_err(|e| AppError::Validation(format!("Invalid actor URL: {}", e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(AppError::Validation(format!(
                "Unsupported actor URL scheme: {}",
                scheme
            )));
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| AppError::Validation("Missing host in actor URL".to_string()))?
        .to_ascii_lowercase();

    if is_disallowed_host(&host) {
        return Err(AppError::Forbidden);
    }

    Ok(host)
}

/// Headers produced for a signed request
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    /// Signature header value
    pub signature: String,
    /// Date header value (RFC 2822)
    pub date: String,
    /// Digest header value (only when a body was signed)
    pub digest: Option<String>,
}

/// Sign an outgoing HTTP request with an event's private key.
///
/// The signing string covers `(request-target)`, `host`, `date` and,
/// when a body is present, `digest`.
///
/// # Arguments
/// * `method` - HTTP method (e.g., "POST")
/// * `url` - Full URL being requested
/// * `body` - Request body, when present
/// * `private_key_pem` - RSA private key in PKCS#8 PEM
/// * `key_id` - URL of the public key (`{actor}#main-key`)
pub fn sign_request(
    method: &str,
    url: &str,
    body: Option<&[u8]>,
    private_key_pem: &str,
    key_id: &str,
) -> Result<SignedHeaders, AppError> {
    let parsed_url =
        url::Url::parse(url).map_err(|e| AppError::Validation(format!("Invalid URL: {}", e)))?;

    let host = parsed_url
        .host_str()
        .ok_or_else(|| AppError::Validation("Missing host in URL".to_string()))?;

    let path_and_query = match parsed_url.query() {
        Some(q) => format!("{}?{}", parsed_url.path(), q),
        None => parsed_url.path().to_string(),
    };

    let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    let digest = body.map(generate_digest);

    let request_target = format!("{} {}", method.to_lowercase(), path_and_query);

    let mut signing_parts = vec![
        format!("(request-target): {}", request_target),
        format!("host: {}", host),
        format!("date: {}", date),
    ];
    let mut headers_list = vec!["(request-target)", "host", "date"];

    if let Some(ref digest_value) = digest {
        signing_parts.push(format!("digest: {}", digest_value));
        headers_list.push("digest");
    }

    let signing_string = signing_parts.join("\n");

    use rsa::pkcs8::DecodePrivateKey;
    use rsa::signature::{RandomizedSigner, SignatureEncoding};

    let private_key = rsa::RsaPrivateKey::from_pkcs8_pem(private_key_pem)
        .map_err(|e| AppError::Validation(format!("Invalid private key: {}", e)))?;

    let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new_unprefixed(private_key);
    let mut rng = rand::thread_rng();
    let signature = signing_key.sign_with_rng(&mut rng, signing_string.as_bytes());
    let signature_b64 = BASE64.encode(signature.to_bytes());

    let signature_header = format!(
        "keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{}\"",
        key_id,
        headers_list.join(" "),
        signature_b64
    );

    Ok(SignedHeaders {
        signature: signature_header,
        date,
        digest,
    })
}

/// Verify an inbound HTTP signature against a known public key.
///
/// Checks the signed header set, Date freshness, Digest integrity and
/// finally the RSA signature itself.
///
/// # Errors
/// `AppError::InvalidSignature` when the cryptographic check fails,
/// `AppError::Validation` for malformed or incomplete signature material.
pub fn verify_signature(
    method: &str,
    path: &str,
    headers: &http::HeaderMap,
    body: Option<&[u8]>,
    public_key_pem: &str,
) -> Result<(), AppError> {
    let signature_header = headers
        .get("signature")
        .ok_or_else(|| AppError::Validation("Missing Signature header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Validation("Invalid Signature header".to_string()))?;

    let parsed = parse_signature_header(signature_header)?;

    if parsed.algorithm != "rsa-sha256" && parsed.algorithm != "hs2019" {
        return Err(AppError::Validation(format!(
            "Unsupported signature algorithm: {}",
            parsed.algorithm
        )));
    }

    for required in ["(request-target)", "host", "date"] {
        if !parsed.headers.iter().any(|h| h == required) {
            return Err(AppError::Validation(format!(
                "Signed headers must include: {}",
                required
            )));
        }
    }

    if body.is_some() && !parsed.headers.iter().any(|h| h == "digest") {
        return Err(AppError::Validation(
            "Signed headers must include: digest".to_string(),
        ));
    }

    // Reject stale or future-dated requests.
    let date_str = headers
        .get("date")
        .ok_or_else(|| AppError::Validation("Missing Date header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Validation("Invalid Date header".to_string()))?;

    let date = DateTime::parse_from_rfc2822(date_str)
        .map_err(|_| AppError::Validation("Invalid Date format".to_string()))?;

    if (Utc::now().timestamp() - date.timestamp()).abs() > MAX_DATE_SKEW_SECS {
        return Err(AppError::Validation(
            "Date header too old or in future".to_string(),
        ));
    }

    if let Some(body_data) = body {
        let digest_str = headers
            .get("digest")
            .ok_or_else(|| AppError::Validation("Missing Digest header".to_string()))?
            .to_str()
            .map_err(|_| AppError::Validation("Invalid Digest header".to_string()))?;

        if digest_str != generate_digest(body_data) {
            return Err(AppError::Validation("Digest mismatch".to_string()));
        }
    }

    // Rebuild the signing string from the headers the sender claims to
    // have signed.
    let mut signing_parts = Vec::new();
    for header_name in &parsed.headers {
        let value = match header_name.as_str() {
            "(request-target)" => format!("{} {}", method.to_lowercase(), path),
            "host" | "date" | "digest" => headers
                .get(header_name.as_str())
                .ok_or_else(|| {
                    AppError::Validation(format!("Missing {} header", header_name))
                })?
                .to_str()
                .map_err(|_| AppError::Validation(format!("Invalid {} header", header_name)))?
                .to_string(),
            _ => {
                return Err(AppError::Validation(format!(
                    "Unsupported header in signature: {}",
                    header_name
                )));
            }
        };

        signing_parts.push(format!("{}: {}", header_name, value));
    }

    let signing_string = signing_parts.join("\n");

    let signature_bytes = BASE64
        .decode(&parsed.signature)
        .map_err(|_| AppError::Validation("Invalid signature encoding".to_string()))?;

    let public_key = RsaPublicKey::from_public_key_pem(public_key_pem)
        .map_err(|e| AppError::Validation(format!("Invalid public key: {}", e)))?;

    // new_unprefixed for compatibility with Mastodon-style signatures.
    let verifier = rsa::pkcs1v15::VerifyingKey::<Sha256>::new_unprefixed(public_key);

    let signature = Pkcs1v15Signature::try_from(signature_bytes.as_slice())
        .map_err(|e| AppError::Validation(format!("Invalid signature format: {}", e)))?;

    verifier
        .verify(signing_string.as_bytes(), &signature)
        .map_err(|_| AppError::InvalidSignature)?;

    Ok(())
}

/// Extract keyId from the Signature header.
pub fn extract_signature_key_id(headers: &http::HeaderMap) -> Result<String, AppError> {
    let signature_header = headers
        .get("signature")
        .ok_or_else(|| AppError::Validation("Missing Signature header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Validation("Invalid Signature header".to_string()))?;

    let parsed = parse_signature_header(signature_header)?;
    Ok(parsed.key_id)
}

/// A keyId may only sign on behalf of its own actor.
pub fn key_id_matches_actor(key_id: &str, actor_id: &str) -> bool {
    let key_actor = key_id.split('#').next().unwrap_or(key_id);
    let actor = actor_id.split('#').next().unwrap_or(actor_id);
    key_actor == actor
}

/// Parsed Signature header
#[derive(Debug, Clone)]
pub struct ParsedSignature {
    pub key_id: String,
    pub algorithm: String,
    /// Signed header names, lowercase
    pub headers: Vec<String>,
    /// Base64-encoded signature
    pub signature: String,
}

/// Parse a `keyId="...",algorithm="...",headers="...",signature="..."`
/// header value.
pub fn parse_signature_header(header: &str) -> Result<ParsedSignature, AppError> {
    let mut key_id = None;
    let mut algorithm = None;
    let mut headers = None;
    let mut signature = None;

    for part in header.split(',') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            let value = value.trim().trim_matches('"');

            match key.trim() {
                "keyId" => key_id = Some(value.to_string()),
                "algorithm" => algorithm = Some(value.to_string()),
                "headers" => {
                    headers = Some(
                        value
                            .split_whitespace()
                            .map(|s| s.to_ascii_lowercase())
                            .collect(),
                    )
                }
                "signature" => signature = Some(value.to_string()),
                _ => {}
            }
        }
    }

    Ok(ParsedSignature {
        key_id: key_id.ok_or_else(|| AppError::Validation("Missing keyId".to_string()))?,
        algorithm: algorithm
            .ok_or_else(|| AppError::Validation("Missing algorithm".to_string()))?,
        headers: headers.ok_or_else(|| AppError::Validation("Missing headers".to_string()))?,
        signature: signature
            .ok_or_else(|| AppError::Validation("Missing signature".to_string()))?,
    })
}

/// SHA-256 digest of a body, in `SHA-256=base64(hash)` form.
pub fn generate_digest(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    format!("SHA-256={}", BASE64.encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, HeaderValue};
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use rsa::{RsaPrivateKey, RsaPublicKey};

    fn generate_test_keypair() -> (String, String) {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 1024).expect("key generation should work");
        let public_key = RsaPublicKey::from(&private_key);

        let private_key_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .expect("private key pem")
            .to_string();
        let public_key_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .expect("public key pem");

        (private_key_pem, public_key_pem)
    }

    fn build_signed_header_map(
        method: &str,
        url: &str,
        body: Option<&[u8]>,
        private_key_pem: &str,
    ) -> (HeaderMap, String) {
        let key_id = "https://events.example/xy2bqyz3#main-key";
        let signed = sign_request(method, url, body, private_key_pem, key_id).expect("signed");
        let parsed_url = url::Url::parse(url).expect("valid test url");
        let host = parsed_url.host_str().expect("host");
        let path_and_query = match parsed_url.query() {
            Some(query) => format!("{}?{}", parsed_url.path(), query),
            None => parsed_url.path().to_string(),
        };

        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_str(host).expect("host header"));
        headers.insert(
            "date",
            HeaderValue::from_str(&signed.date).expect("date header"),
        );
        if let Some(digest) = signed.digest {
            headers.insert(
                "digest",
                HeaderValue::from_str(&digest).expect("digest header"),
            );
        }
        headers.insert(
            "signature",
            HeaderValue::from_str(&signed.signature).expect("signature header"),
        );

        (headers, path_and_query)
    }

    #[test]
    fn verify_signature_accepts_valid_signed_request() {
        let (private_key_pem, public_key_pem) = generate_test_keypair();
        let body = br#"{"type":"Follow"}"#;
        let (headers, path) = build_signed_header_map(
            "POST",
            "https://remote.example/inbox?foo=bar",
            Some(body),
            &private_key_pem,
        );

        let result = verify_signature("POST", &path, &headers, Some(body), &public_key_pem);
        assert!(result.is_ok(), "valid signature should verify: {result:?}");
    }

    #[test]
    fn verify_signature_rejects_tampered_body() {
        let (private_key_pem, public_key_pem) = generate_test_keypair();
        let body = br#"{"type":"Follow"}"#;
        let (headers, path) = build_signed_header_map(
            "POST",
            "https://remote.example/inbox",
            Some(body),
            &private_key_pem,
        );

        let tampered = br#"{"type":"Delete"}"#;
        match verify_signature("POST", &path, &headers, Some(tampered), &public_key_pem) {
            Err(AppError::Validation(msg)) => assert!(msg.contains("Digest mismatch")),
            other => panic!("expected digest mismatch, got: {other:?}"),
        }
    }

    #[test]
    fn verify_signature_rejects_wrong_key() {
        let (private_key_pem, _) = generate_test_keypair();
        let (_, other_public_key_pem) = generate_test_keypair();
        let body = br#"{"type":"Follow"}"#;
        let (headers, path) = build_signed_header_map(
            "POST",
            "https://remote.example/inbox",
            Some(body),
            &private_key_pem,
        );

        match verify_signature("POST", &path, &headers, Some(body), &other_public_key_pem) {
            Err(AppError::InvalidSignature) => {}
            other => panic!("expected invalid signature, got: {other:?}"),
        }
    }

    #[test]
    fn verify_signature_rejects_missing_date_header() {
        let (private_key_pem, public_key_pem) = generate_test_keypair();
        let body = br#"{"type":"Follow"}"#;
        let (mut headers, path) = build_signed_header_map(
            "POST",
            "https://remote.example/inbox",
            Some(body),
            &private_key_pem,
        );
        headers.remove("date");

        match verify_signature("POST", &path, &headers, Some(body), &public_key_pem) {
            Err(AppError::Validation(msg)) => assert!(msg.contains("Missing Date header")),
            other => panic!("expected missing Date header error, got: {other:?}"),
        }
    }

    #[test]
    fn verify_signature_rejects_missing_digest_header_for_body() {
        let (private_key_pem, public_key_pem) = generate_test_keypair();
        let body = br#"{"type":"Follow"}"#;
        let (mut headers, path) = build_signed_header_map(
            "POST",
            "https://remote.example/inbox",
            Some(body),
            &private_key_pem,
        );
        headers.remove("digest");

        match verify_signature("POST", &path, &headers, Some(body), &public_key_pem) {
            Err(AppError::Validation(msg)) => assert!(msg.contains("Missing Digest header")),
            other => panic!("expected missing Digest header error, got: {other:?}"),
        }
    }

    #[test]
    fn verify_signature_rejects_when_date_not_in_signed_headers() {
        let (private_key_pem, public_key_pem) = generate_test_keypair();
        let body = br#"{"type":"Follow"}"#;
        let (mut headers, path) = build_signed_header_map(
            "POST",
            "https://remote.example/inbox",
            Some(body),
            &private_key_pem,
        );

        let signature_header = headers
            .get("signature")
            .expect("signature")
            .to_str()
            .expect("signature str");
        let parsed = parse_signature_header(signature_header).expect("parsed signature");
        let tampered = format!(
            "keyId=\"{}\",algorithm=\"{}\",headers=\"(request-target) host digest\",signature=\"{}\"",
            parsed.key_id, parsed.algorithm, parsed.signature
        );
        headers.insert(
            "signature",
            HeaderValue::from_str(&tampered).expect("tampered signature"),
        );

        match verify_signature("POST", &path, &headers, Some(body), &public_key_pem) {
            Err(AppError::Validation(msg)) => {
                assert!(msg.contains("Signed headers must include: date"))
            }
            other => panic!("expected missing signed date error, got: {other:?}"),
        }
    }

    #[test]
    fn extract_actor_domain_rejects_localhost() {
        match extract_actor_domain("https://localhost/users/alice#main-key") {
            Err(AppError::Forbidden) => {}
            other => panic!("expected forbidden for localhost, got: {other:?}"),
        }
    }

    #[test]
    fn extract_actor_domain_rejects_private_ip() {
        match extract_actor_domain("http://192.168.1.10/users/alice#main-key") {
            Err(AppError::Forbidden) => {}
            other => panic!("expected forbidden for private ip, got: {other:?}"),
        }
    }

    #[test]
    fn extract_actor_domain_accepts_public_host() {
        let domain = extract_actor_domain("https://example.com/users/alice#main-key")
            .expect("public host should be accepted");
        assert_eq!(domain, "example.com");
    }

    #[tokio::test]
    async fn validate_resolved_host_ips_rejects_localhost() {
        match validate_resolved_host_ips("localhost", 80).await {
            Err(AppError::Forbidden) => {}
            other => panic!("expected forbidden for localhost resolution, got: {other:?}"),
        }
    }

    #[test]
    fn extract_signature_key_id_reads_key_id() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "signature",
            HeaderValue::from_static(
                "keyId=\"https://remote.example/users/alice#main-key\",algorithm=\"rsa-sha256\",headers=\"(request-target) host date\",signature=\"ZmFrZQ==\"",
            ),
        );

        let key_id = extract_signature_key_id(&headers).expect("keyId should be parsed");
        assert_eq!(key_id, "https://remote.example/users/alice#main-key");
    }

    #[test]
    fn key_id_matches_actor_accepts_same_actor() {
        assert!(key_id_matches_actor(
            "https://remote.example/users/alice#main-key",
            "https://remote.example/users/alice",
        ));
    }

    #[test]
    fn key_id_matches_actor_rejects_different_actor() {
        assert!(!key_id_matches_actor(
            "https://remote.example/users/bob#main-key",
            "https://remote.example/users/alice",
        ));
    }
}
