//! NIST curve key material, tagged by curve
//!
//! P-256, P-384 and P-521 share one RustCrypto API, so most operations are
//! written once and expanded per curve by `by_curve!`. ECDSA on P-521 goes
//! through the `p521::ecdsa` newtypes and is spelled out by hand.

use crate::crypto::keys::Curve;
use crate::error::{CascadeError, Result};
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use pkcs8::{DecodePrivateKey, DecodePublicKey, Document, EncodePrivateKey, EncodePublicKey, SecretDocument};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

/// Runs `$body` for whichever curve `$value` holds, with `$key` bound to the
/// inner key and `$curve` naming that curve's crate.
macro_rules! by_curve {
    ($value:expr, $kind:ident, $key:ident, $curve:ident => $body:expr) => {
        match $value {
            $kind::P256($key) => {
                #[allow(unused_imports)]
                use p256 as $curve;
                $body
            }
            $kind::P384($key) => {
                #[allow(unused_imports)]
                use p384 as $curve;
                $body
            }
            $kind::P521($key) => {
                #[allow(unused_imports)]
                use p521 as $curve;
                $body
            }
        }
    };
}

#[derive(Clone, PartialEq)]
pub enum NistPublicKey {
    P256(p256::PublicKey),
    P384(p384::PublicKey),
    P521(p521::PublicKey),
}

#[derive(Clone)]
pub enum NistSecretKey {
    P256(p256::SecretKey),
    P384(p384::SecretKey),
    P521(p521::SecretKey),
}

/// One-shot ECDH key shared by all recipients of a message
pub enum NistEphemeral {
    P256(p256::ecdh::EphemeralSecret),
    P384(p384::ecdh::EphemeralSecret),
    P521(p521::ecdh::EphemeralSecret),
}

fn unsupported_curve(curve: Curve) -> CascadeError {
    CascadeError::UnsupportedKeyParams(format!("{} is not a NIST curve", curve.name()))
}

impl NistPublicKey {
    pub fn curve(&self) -> Curve {
        match self {
            Self::P256(_) => Curve::P256,
            Self::P384(_) => Curve::P384,
            Self::P521(_) => Curve::P521,
        }
    }

    /// Affine coordinates, `None` for the identity point
    pub fn coordinates(&self) -> Option<(Vec<u8>, Vec<u8>)> {
        by_curve!(self, NistPublicKey, public, _c => {
            let point = public.to_encoded_point(false);
            Some((point.x()?.to_vec(), point.y()?.to_vec()))
        })
    }

    /// SPKI DER; the curve is read from the algorithm parameters
    pub fn from_der(der: &[u8]) -> Result<Self> {
        p256::PublicKey::from_public_key_der(der)
            .map(Self::P256)
            .or_else(|_| p384::PublicKey::from_public_key_der(der).map(Self::P384))
            .or_else(|_| p521::PublicKey::from_public_key_der(der).map(Self::P521))
            .map_err(|e| CascadeError::InvalidKeyFormat(e.to_string()))
    }

    pub fn to_der(&self) -> Result<Document> {
        by_curve!(self, NistPublicKey, public, _c => public.to_public_key_der())
            .map_err(|e| CascadeError::InvalidKeyFormat(e.to_string()))
    }

    /// `false` for malformed signatures as well as for mismatches
    pub fn verify_prehash(&self, digest: &[u8], signature: &[u8]) -> bool {
        match self {
            Self::P256(public) => p256::ecdsa::Signature::from_slice(signature)
                .map(|sig| {
                    p256::ecdsa::VerifyingKey::from(public)
                        .verify_prehash(digest, &sig)
                        .is_ok()
                })
                .unwrap_or(false),
            Self::P384(public) => p384::ecdsa::Signature::from_slice(signature)
                .map(|sig| {
                    p384::ecdsa::VerifyingKey::from(public)
                        .verify_prehash(digest, &sig)
                        .is_ok()
                })
                .unwrap_or(false),
            Self::P521(public) => {
                let point = public.to_encoded_point(false);
                let (Ok(key), Ok(sig)) = (
                    p521::ecdsa::VerifyingKey::from_sec1_bytes(point.as_bytes()),
                    p521::ecdsa::Signature::from_slice(signature),
                ) else {
                    return false;
                };
                key.verify_prehash(digest, &sig).is_ok()
            }
        }
    }
}

impl NistSecretKey {
    pub fn random(curve: Curve) -> Result<Self> {
        match curve {
            Curve::P256 => Ok(Self::P256(p256::SecretKey::random(&mut OsRng))),
            Curve::P384 => Ok(Self::P384(p384::SecretKey::random(&mut OsRng))),
            Curve::P521 => Ok(Self::P521(p521::SecretKey::random(&mut OsRng))),
            other => Err(unsupported_curve(other)),
        }
    }

    pub fn curve(&self) -> Curve {
        self.public_key().curve()
    }

    pub fn public_key(&self) -> NistPublicKey {
        match self {
            Self::P256(secret) => NistPublicKey::P256(secret.public_key()),
            Self::P384(secret) => NistPublicKey::P384(secret.public_key()),
            Self::P521(secret) => NistPublicKey::P521(secret.public_key()),
        }
    }

    /// Unencrypted PKCS#8 DER
    pub fn from_der(der: &[u8]) -> Result<Self> {
        p256::SecretKey::from_pkcs8_der(der)
            .map(Self::P256)
            .or_else(|_| p384::SecretKey::from_pkcs8_der(der).map(Self::P384))
            .or_else(|_| p521::SecretKey::from_pkcs8_der(der).map(Self::P521))
            .map_err(|e| CascadeError::InvalidKeyFormat(e.to_string()))
    }

    /// PKCS#8 DER, as `EncryptedPrivateKeyInfo` when a passphrase is given
    pub fn to_der(&self, passphrase: Option<&str>) -> Result<SecretDocument> {
        by_curve!(self, NistSecretKey, secret, _c => match passphrase {
            Some(passphrase) => secret.to_pkcs8_encrypted_der(OsRng, passphrase),
            None => secret.to_pkcs8_der(),
        })
        .map_err(|e| CascadeError::InvalidKeyFormat(e.to_string()))
    }

    /// ECDH with the sender's ephemeral key (SPKI DER on the same curve)
    pub fn diffie_hellman(&self, ephemeral_der: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        by_curve!(self, NistSecretKey, secret, c => {
            let ephemeral = c::PublicKey::from_public_key_der(ephemeral_der)
                .map_err(|e| CascadeError::InvalidFormat(format!("ephemeral key: {}", e)))?;
            let shared = c::ecdh::diffie_hellman(secret.to_nonzero_scalar(), ephemeral.as_affine());
            Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
        })
    }

    /// ECDSA over an already computed digest. P-521 needs a digest of at
    /// least 33 bytes, i.e. SHA-384 or SHA-512.
    pub fn sign_prehash(&self, digest: &[u8]) -> Result<Vec<u8>> {
        let signed = match self {
            Self::P256(secret) => p256::ecdsa::SigningKey::from(secret)
                .sign_prehash(digest)
                .map(|sig: p256::ecdsa::Signature| sig.to_bytes().to_vec()),
            Self::P384(secret) => p384::ecdsa::SigningKey::from(secret)
                .sign_prehash(digest)
                .map(|sig: p384::ecdsa::Signature| sig.to_bytes().to_vec()),
            Self::P521(secret) => {
                let key = p521::ecdsa::SigningKey::from_bytes(&secret.to_bytes())
                    .map_err(|e| CascadeError::Signing(e.to_string()))?;
                key.sign_prehash(digest)
                    .map(|sig: p521::ecdsa::Signature| sig.to_bytes().to_vec())
            }
        };
        signed.map_err(|e| CascadeError::Signing(e.to_string()))
    }
}

impl NistEphemeral {
    pub fn random(curve: Curve) -> Result<Self> {
        match curve {
            Curve::P256 => Ok(Self::P256(p256::ecdh::EphemeralSecret::random(&mut OsRng))),
            Curve::P384 => Ok(Self::P384(p384::ecdh::EphemeralSecret::random(&mut OsRng))),
            Curve::P521 => Ok(Self::P521(p521::ecdh::EphemeralSecret::random(&mut OsRng))),
            other => Err(unsupported_curve(other)),
        }
    }

    pub fn public_key_der(&self) -> Result<Document> {
        by_curve!(self, NistEphemeral, ephemeral, _c => ephemeral.public_key().to_public_key_der())
            .map_err(|e| CascadeError::Encryption(e.to_string()))
    }

    pub fn agree(&self, peer: &NistPublicKey) -> Result<Zeroizing<Vec<u8>>> {
        let shared = match (self, peer) {
            (Self::P256(ephemeral), NistPublicKey::P256(public)) => {
                ephemeral.diffie_hellman(public).raw_secret_bytes().to_vec()
            }
            (Self::P384(ephemeral), NistPublicKey::P384(public)) => {
                ephemeral.diffie_hellman(public).raw_secret_bytes().to_vec()
            }
            (Self::P521(ephemeral), NistPublicKey::P521(public)) => {
                ephemeral.diffie_hellman(public).raw_secret_bytes().to_vec()
            }
            _ => {
                return Err(CascadeError::UnsupportedAlgorithm(format!(
                    "recipient key on {} cannot share an ephemeral key on another curve",
                    peer.curve().name()
                )))
            }
        };
        Ok(Zeroizing::new(shared))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::HashAlgorithm;

    const CURVES: [Curve; 3] = [Curve::P256, Curve::P384, Curve::P521];

    #[test]
    fn test_der_roundtrip_keeps_curve() {
        for curve in CURVES {
            let secret = NistSecretKey::random(curve).unwrap();
            let public = secret.public_key();

            let spki = public.to_der().unwrap();
            assert!(NistPublicKey::from_der(spki.as_bytes()).unwrap() == public);

            let pkcs8 = secret.to_der(None).unwrap();
            let imported = NistSecretKey::from_der(pkcs8.as_bytes()).unwrap();
            assert_eq!(imported.curve(), curve);
            assert!(imported.public_key() == public);
        }
    }

    #[test]
    fn test_ephemeral_agreement_matches_recipient_side() {
        for curve in CURVES {
            let recipient = NistSecretKey::random(curve).unwrap();
            let ephemeral = NistEphemeral::random(curve).unwrap();

            let sender_side = ephemeral.agree(&recipient.public_key()).unwrap();
            let der = ephemeral.public_key_der().unwrap();
            let recipient_side = recipient.diffie_hellman(der.as_bytes()).unwrap();
            assert_eq!(&*sender_side, &*recipient_side);
        }
    }

    #[test]
    fn test_ephemeral_rejects_other_curve() {
        let ephemeral = NistEphemeral::random(Curve::P256).unwrap();
        let p384 = NistSecretKey::random(Curve::P384).unwrap().public_key();
        assert!(matches!(
            ephemeral.agree(&p384),
            Err(CascadeError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_sign_verify_prehash_per_curve() {
        let digest = HashAlgorithm::Sha512.digest(b"prehashed");
        for curve in CURVES {
            let secret = NistSecretKey::random(curve).unwrap();
            let signature = secret.sign_prehash(&digest).unwrap();
            assert!(secret.public_key().verify_prehash(&digest, &signature));

            let other = HashAlgorithm::Sha512.digest(b"something else");
            assert!(!secret.public_key().verify_prehash(&other, &signature));
            assert!(!secret.public_key().verify_prehash(&digest, &signature[1..]));
        }
    }

    #[test]
    fn test_curve25519_is_not_nist() {
        assert!(matches!(
            NistSecretKey::random(Curve::Curve25519),
            Err(CascadeError::UnsupportedKeyParams(_))
        ));
    }
}
