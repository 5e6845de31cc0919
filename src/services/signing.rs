//! HMAC-SHA256 signatures for time-boxed object URLs.

use crate::errors::{PostError, PostResult};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// The request attributes a signature is bound to.
#[derive(Debug, Clone, Copy)]
pub struct SignedRequest<'a> {
    pub method: &'a str,
    pub key: &'a str,
    pub upload_id: Option<&'a str>,
    pub part_number: Option<u32>,
    /// Unix seconds after which the URL is rejected.
    pub expires: i64,
}

impl SignedRequest<'_> {
    fn canonical(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}\n{}",
            self.method,
            self.key,
            self.upload_id.unwrap_or(""),
            self.part_number.map(|n| n.to_string()).unwrap_or_default(),
            self.expires
        )
    }
}

#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner").finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self, request: &SignedRequest<'_>) -> PostResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| PostError::store("failed to initialize hmac"))?;
        mac.update(request.canonical().as_bytes());
        Ok(mac)
    }

    pub fn sign(&self, request: &SignedRequest<'_>) -> PostResult<String> {
        let bytes = self.mac(request)?.finalize().into_bytes();
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Check the signature and the expiry of an incoming request.
    pub fn verify(&self, request: &SignedRequest<'_>, signature: &str) -> PostResult<()> {
        if request.expires < Utc::now().timestamp() {
            return Err(PostError::Signature("url expired".into()));
        }
        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| PostError::Signature("malformed signature".into()))?;
        self.mac(request)?
            .verify_slice(&provided)
            .map_err(|_| PostError::Signature("signature mismatch".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(expires: i64) -> SignedRequest<'static> {
        SignedRequest {
            method: "PUT",
            key: "alice/image/p1",
            upload_id: Some("u1"),
            part_number: Some(2),
            expires,
        }
    }

    #[test]
    fn accepts_its_own_signature() {
        let signer = UrlSigner::new("secret");
        let req = request(Utc::now().timestamp() + 60);
        let sig = signer.sign(&req).unwrap();
        signer.verify(&req, &sig).unwrap();
    }

    #[test]
    fn signature_is_bound_to_every_attribute() {
        let signer = UrlSigner::new("secret");
        let req = request(Utc::now().timestamp() + 60);
        let sig = signer.sign(&req).unwrap();

        let tampered = [
            SignedRequest { method: "GET", ..req },
            SignedRequest { key: "alice/image/p2", ..req },
            SignedRequest { upload_id: None, ..req },
            SignedRequest { part_number: Some(3), ..req },
            SignedRequest { expires: req.expires + 1, ..req },
        ];
        for other in tampered {
            assert!(matches!(
                signer.verify(&other, &sig),
                Err(PostError::Signature(_))
            ));
        }

        let foreign = UrlSigner::new("other secret");
        assert!(foreign.verify(&req, &sig).is_err());
    }

    #[test]
    fn rejects_expired_urls() {
        let signer = UrlSigner::new("secret");
        let req = request(Utc::now().timestamp() - 1);
        let sig = signer.sign(&req).unwrap();
        assert!(matches!(
            signer.verify(&req, &sig),
            Err(PostError::Signature(msg)) if msg == "url expired"
        ));
    }
}
