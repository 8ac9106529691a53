use hmac::{Hmac, Mac};
use sha2::Sha256;

/// HMAC-SHA256 over `data` under `secret`, base64-encoded. All three providers sign webhook bodies this way.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(data);
    base64::encode(mac.finalize().into_bytes())
}

/// Checks a base64 signature against the HMAC of `data`. The comparison goes through `Mac::verify_slice`,
/// which is constant-time; the signature is attacker-supplied.
pub fn verify_hmac(secret: &str, data: &[u8], signature: &str) -> bool {
    let Ok(decoded) = base64::decode(signature) else {
        return false;
    };
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.verify_slice(&decoded).is_ok()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn known_vector() {
        // echo -n 'hello' | openssl dgst -sha256 -hmac 'key' -binary | base64
        assert_eq!(calculate_hmac("key", b"hello"), "kwezuRXvtRcf8U2MtV+8x5jGwO8UVtZt7RpqpyOli3s=");
    }

    #[test]
    fn signature_depends_on_both_inputs() {
        let sig = calculate_hmac("secret", b"payload");
        assert_ne!(sig, calculate_hmac("secret", b"payload2"));
        assert_ne!(sig, calculate_hmac("secret2", b"payload"));
    }

    #[test]
    fn verification_accepts_only_the_matching_signature() {
        let sig = calculate_hmac("key", b"hello");
        assert!(verify_hmac("key", b"hello", &sig));
        assert!(!verify_hmac("key", b"hello2", &sig));
        assert!(!verify_hmac("key2", b"hello", &sig));
        assert!(!verify_hmac("key", b"hello", "not even base64!!"));
        assert!(!verify_hmac("key", b"hello", ""));
    }
}
