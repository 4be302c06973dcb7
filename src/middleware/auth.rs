use std::collections::HashMap;

use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Shared-secret table for request signatures, keyed by the `X-Public-Key`
/// header value. Signatures are `hex(HMAC-SHA1(secret, method‖path‖body))`
/// carried in `X-Request-Signature`.
#[derive(Debug, Clone, Default)]
pub struct HmacKeystore {
    secrets: HashMap<String, String>,
}

impl HmacKeystore {
    pub fn new(secrets: HashMap<String, String>) -> Self {
        HmacKeystore { secrets }
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Constant-time verification of a hex signature for the named key.
    pub fn verify(
        &self,
        public_key: &str,
        method: &str,
        path: &str,
        body: &[u8],
        signature_hex: &str,
    ) -> bool {
        let Some(secret) = self.secrets.get(public_key) else {
            return false;
        };
        let Ok(signature) = hex::decode(signature_hex) else {
            return false;
        };
        let Ok(mut mac) = HmacSha1::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(method.as_bytes());
        mac.update(path.as_bytes());
        mac.update(body);
        mac.verify_slice(&signature).is_ok()
    }

    /// Produce the signature a client must send. Also used by tests.
    pub fn sign(secret: &str, method: &str, path: &str, body: &[u8]) -> String {
        let Ok(mut mac) = HmacSha1::new_from_slice(secret.as_bytes()) else {
            return String::new();
        };
        mac.update(method.as_bytes());
        mac.update(path.as_bytes());
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keystore() -> HmacKeystore {
        let mut secrets = HashMap::new();
        secrets.insert("alice".to_string(), "sekrit".to_string());
        HmacKeystore::new(secrets)
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let ks = keystore();
        let sig = HmacKeystore::sign("sekrit", "POST", "/photo", b"{\"url\":\"x\"}");
        assert!(ks.verify("alice", "POST", "/photo", b"{\"url\":\"x\"}", &sig));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let ks = keystore();
        let sig = HmacKeystore::sign("sekrit", "POST", "/photo", b"{}");
        assert!(!ks.verify("alice", "POST", "/photo", b"{\"url\":\"x\"}", &sig));
    }

    #[test]
    fn test_unknown_public_key_rejected() {
        let ks = keystore();
        let sig = HmacKeystore::sign("sekrit", "GET", "/photo", b"");
        assert!(!ks.verify("bob", "GET", "/photo", b"", &sig));
    }

    #[test]
    fn test_garbage_signature_rejected() {
        let ks = keystore();
        assert!(!ks.verify("alice", "GET", "/photo", b"", "not-hex"));
    }
}
