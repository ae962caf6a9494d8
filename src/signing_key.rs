use {
    crate::{
        crypto::{hmac_sha256, mac_equal},
        SignatureError,
    },
    ring::{
        rand::SystemRandom,
        signature::{
            EcdsaKeyPair, RsaEncoding, RsaKeyPair, UnparsedPublicKey, ECDSA_P256_SHA256_FIXED,
            ECDSA_P256_SHA256_FIXED_SIGNING, RSA_PKCS1_2048_8192_SHA256, RSA_PKCS1_SHA256, RSA_PSS_2048_8192_SHA512,
            RSA_PSS_SHA512,
        },
    },
    std::{
        fmt::{Debug, Display, Formatter, Result as FmtResult},
        str::FromStr,
    },
};

/// Minimum length, in bytes, of an HMAC-SHA256 shared key.
pub(crate) const HMAC_SHA256_MIN_KEY_LEN: usize = 64;

/// A signature algorithm, identified on the wire by the `alg` signature parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Algorithm {
    /// HMAC using SHA-256 over a shared key.
    HmacSha256,

    /// RSASSA-PKCS1-v1_5 using SHA-256.
    RsaV1_5Sha256,

    /// RSASSA-PSS using SHA-512.
    RsaPssSha512,

    /// ECDSA over the NIST P-256 curve using SHA-256, with the signature carried as the
    /// fixed-length concatenation of `r` and `s` (32 bytes each, big-endian).
    EcdsaP256Sha256,
}

impl Algorithm {
    /// The wire identifier for this algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::HmacSha256 => "hmac-sha256",
            Algorithm::RsaV1_5Sha256 => "rsa-v1_5-sha256",
            Algorithm::RsaPssSha512 => "rsa-pss-sha512",
            Algorithm::EcdsaP256Sha256 => "ecdsa-p256-sha256",
        }
    }
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, SignatureError> {
        match s {
            "hmac-sha256" => Ok(Algorithm::HmacSha256),
            "rsa-v1_5-sha256" => Ok(Algorithm::RsaV1_5Sha256),
            "rsa-pss-sha512" => Ok(Algorithm::RsaPssSha512),
            "ecdsa-p256-sha256" => Ok(Algorithm::EcdsaP256Sha256),
            _ => Err(SignatureError::InvalidConfig(format!("unknown algorithm '{}'", s))),
        }
    }
}

/// Private key material paired with the algorithm it signs under.
pub(crate) struct SigningKey {
    alg: Algorithm,
    inner: SigningKeyInner,
    rng: SystemRandom,
}

enum SigningKeyInner {
    HmacSha256(Vec<u8>),
    Rsa(RsaKeyPair),
    EcdsaP256(EcdsaKeyPair),
}

impl SigningKey {
    /// A shared HMAC-SHA256 key. The key must be at least 64 bytes long.
    pub(crate) fn hmac_sha256(key: &[u8]) -> Result<Self, SignatureError> {
        if key.len() < HMAC_SHA256_MIN_KEY_LEN {
            return Err(SignatureError::InvalidConfig(format!(
                "key must be at least {} bytes long",
                HMAC_SHA256_MIN_KEY_LEN
            )));
        }
        Ok(SigningKey {
            alg: Algorithm::HmacSha256,
            inner: SigningKeyInner::HmacSha256(key.to_vec()),
            rng: SystemRandom::new(),
        })
    }

    /// An RSA private key (unencrypted PKCS#8 DER) used with RSASSA-PKCS1-v1_5 SHA-256.
    pub(crate) fn rsa_v1_5_sha256(private_key: &[u8]) -> Result<Self, SignatureError> {
        Ok(SigningKey {
            alg: Algorithm::RsaV1_5Sha256,
            inner: SigningKeyInner::Rsa(parse_rsa_private_key(private_key)?),
            rng: SystemRandom::new(),
        })
    }

    /// An RSA private key (unencrypted PKCS#8 DER) used with RSASSA-PSS SHA-512.
    pub(crate) fn rsa_pss_sha512(private_key: &[u8]) -> Result<Self, SignatureError> {
        Ok(SigningKey {
            alg: Algorithm::RsaPssSha512,
            inner: SigningKeyInner::Rsa(parse_rsa_private_key(private_key)?),
            rng: SystemRandom::new(),
        })
    }

    /// A P-256 private key (unencrypted PKCS#8 DER) used with ECDSA SHA-256.
    pub(crate) fn ecdsa_p256_sha256(private_key: &[u8]) -> Result<Self, SignatureError> {
        let rng = SystemRandom::new();
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, private_key, &rng)
            .map_err(|e| SignatureError::InvalidConfig(format!("P-256 private key rejected: {}", e)))?;
        Ok(SigningKey {
            alg: Algorithm::EcdsaP256Sha256,
            inner: SigningKeyInner::EcdsaP256(key_pair),
            rng,
        })
    }

    pub(crate) fn algorithm(&self) -> Algorithm {
        self.alg
    }

    /// Sign a signature base, returning the raw signature octets for the wire.
    pub(crate) fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignatureError> {
        match (&self.inner, self.alg) {
            (SigningKeyInner::HmacSha256(key), _) => Ok(hmac_sha256(key, message).to_vec()),
            (SigningKeyInner::Rsa(key_pair), alg) => {
                let padding: &'static dyn RsaEncoding = if alg == Algorithm::RsaPssSha512 {
                    &RSA_PSS_SHA512
                } else {
                    &RSA_PKCS1_SHA256
                };
                let mut signature = vec![0; key_pair.public().modulus_len()];
                key_pair
                    .sign(padding, &self.rng, message, &mut signature)
                    .map_err(|_| SignatureError::Crypto("RSA signing failed".to_string()))?;
                Ok(signature)
            }
            (SigningKeyInner::EcdsaP256(key_pair), _) => {
                let signature = key_pair
                    .sign(&self.rng, message)
                    .map_err(|_| SignatureError::Crypto("ECDSA signing failed".to_string()))?;
                Ok(signature.as_ref().to_vec())
            }
        }
    }
}

impl Debug for SigningKey {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "SigningKey({})", self.alg)
    }
}

fn parse_rsa_private_key(private_key: &[u8]) -> Result<RsaKeyPair, SignatureError> {
    RsaKeyPair::from_pkcs8(private_key)
        .map_err(|e| SignatureError::InvalidConfig(format!("RSA private key rejected: {}", e)))
}

/// Public (or shared) key material paired with the algorithm it verifies under.
pub(crate) struct VerifyingKey {
    alg: Algorithm,
    inner: VerifyingKeyInner,
}

enum VerifyingKeyInner {
    HmacSha256(Vec<u8>),
    /// A DER-encoded `RSAPublicKey`.
    Rsa(Vec<u8>),
    /// An uncompressed SEC1 point (65 bytes, starting with 0x04).
    EcdsaP256(Vec<u8>),
}

impl VerifyingKey {
    pub(crate) fn hmac_sha256(key: &[u8]) -> Result<Self, SignatureError> {
        if key.len() < HMAC_SHA256_MIN_KEY_LEN {
            return Err(SignatureError::InvalidConfig(format!(
                "key must be at least {} bytes long",
                HMAC_SHA256_MIN_KEY_LEN
            )));
        }
        Ok(VerifyingKey {
            alg: Algorithm::HmacSha256,
            inner: VerifyingKeyInner::HmacSha256(key.to_vec()),
        })
    }

    pub(crate) fn rsa_v1_5_sha256(public_key: &[u8]) -> Result<Self, SignatureError> {
        check_non_empty_key(public_key)?;
        Ok(VerifyingKey {
            alg: Algorithm::RsaV1_5Sha256,
            inner: VerifyingKeyInner::Rsa(public_key.to_vec()),
        })
    }

    pub(crate) fn rsa_pss_sha512(public_key: &[u8]) -> Result<Self, SignatureError> {
        check_non_empty_key(public_key)?;
        Ok(VerifyingKey {
            alg: Algorithm::RsaPssSha512,
            inner: VerifyingKeyInner::Rsa(public_key.to_vec()),
        })
    }

    pub(crate) fn ecdsa_p256_sha256(public_key: &[u8]) -> Result<Self, SignatureError> {
        check_non_empty_key(public_key)?;
        Ok(VerifyingKey {
            alg: Algorithm::EcdsaP256Sha256,
            inner: VerifyingKeyInner::EcdsaP256(public_key.to_vec()),
        })
    }

    pub(crate) fn algorithm(&self) -> Algorithm {
        self.alg
    }

    /// Verify a signature over a rebuilt signature base.
    pub(crate) fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), SignatureError> {
        match (&self.inner, self.alg) {
            (VerifyingKeyInner::HmacSha256(key), _) => {
                let expected = hmac_sha256(key, message);
                if mac_equal(&expected, signature) {
                    Ok(())
                } else {
                    Err(SignatureError::SignatureMismatch(Some("HMAC digest differs".to_string())))
                }
            }
            (VerifyingKeyInner::Rsa(key), alg) => {
                let verification_alg = if alg == Algorithm::RsaPssSha512 {
                    &RSA_PSS_2048_8192_SHA512
                } else {
                    &RSA_PKCS1_2048_8192_SHA256
                };
                UnparsedPublicKey::new(verification_alg, key)
                    .verify(message, signature)
                    .map_err(|_| SignatureError::SignatureMismatch(None))
            }
            (VerifyingKeyInner::EcdsaP256(key), _) => UnparsedPublicKey::new(&ECDSA_P256_SHA256_FIXED, key)
                .verify(message, signature)
                .map_err(|_| SignatureError::SignatureMismatch(None)),
        }
    }
}

impl Debug for VerifyingKey {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "VerifyingKey({})", self.alg)
    }
}

fn check_non_empty_key(key: &[u8]) -> Result<(), SignatureError> {
    if key.is_empty() {
        return Err(SignatureError::InvalidConfig("key must not be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Algorithm, SigningKey, VerifyingKey};
    use ring::{
        rand::SystemRandom,
        signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING},
    };
    use std::str::FromStr;

    #[test_log::test]
    fn test_algorithm_names() {
        for alg in [
            Algorithm::HmacSha256,
            Algorithm::RsaV1_5Sha256,
            Algorithm::RsaPssSha512,
            Algorithm::EcdsaP256Sha256,
        ] {
            assert_eq!(Algorithm::from_str(alg.as_str()).unwrap(), alg);
        }
        assert!(Algorithm::from_str("ed25519").is_err());
    }

    #[test_log::test]
    fn test_hmac_key_length() {
        assert!(SigningKey::hmac_sha256(&[1u8; 63]).is_err());
        assert!(SigningKey::hmac_sha256(&[1u8; 64]).is_ok());
        assert!(VerifyingKey::hmac_sha256(&[]).is_err());
    }

    #[test_log::test]
    fn test_hmac_sign_verify() {
        let key = [7u8; 64];
        let signer = SigningKey::hmac_sha256(&key).unwrap();
        let verifier = VerifyingKey::hmac_sha256(&key).unwrap();

        let signature = signer.sign(b"covered content").unwrap();
        assert_eq!(signature.len(), 32);
        verifier.verify(b"covered content", &signature).unwrap();
        assert!(verifier.verify(b"altered content", &signature).is_err());
    }

    #[test_log::test]
    fn test_ecdsa_fixed_length_signatures() {
        let rng = SystemRandom::new();
        let document = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng).unwrap();
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, document.as_ref(), &rng).unwrap();

        let signer = SigningKey::ecdsa_p256_sha256(document.as_ref()).unwrap();
        let verifier = VerifyingKey::ecdsa_p256_sha256(key_pair.public_key().as_ref()).unwrap();

        let signature = signer.sign(b"covered content").unwrap();
        // Raw r||s, not DER.
        assert_eq!(signature.len(), 64);
        verifier.verify(b"covered content", &signature).unwrap();
        assert!(verifier.verify(b"altered content", &signature).is_err());
    }
}
