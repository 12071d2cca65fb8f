//! Hashing and ECDSA verification
//!
//! One primitive matters here: [`verify_signature`]. It takes a named curve,
//! a public key in any of the encodings vendors ship (raw X‖Y, SEC1 point,
//! DER SubjectPublicKeyInfo, PEM), a precomputed digest and a signature
//! (raw r/s or DER), and answers `true` or `false`. It never returns an
//! error: malformed keys, malformed signatures and curve mismatches all
//! verify as `false`. [`try_verify_signature`] exposes the underlying error
//! for proof traces.

use std::fmt;
use std::str::FromStr;

use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey, EcPoint, PointConversionForm};
use openssl::ecdsa::EcdsaSig;
use openssl::nid::Nid;
use openssl::pkey::Public;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use crate::codec::TextEncoding;
use crate::error::CryptoError;

// ============================================================================
// Digests
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha224 => "SHA224",
            HashAlgorithm::Sha256 => "SHA256",
            HashAlgorithm::Sha384 => "SHA384",
            HashAlgorithm::Sha512 => "SHA512",
        }
    }

    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha224 => Sha224::digest(data).to_vec(),
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = CryptoError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let normalized: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "SHA224" => Ok(HashAlgorithm::Sha224),
            "SHA256" => Ok(HashAlgorithm::Sha256),
            "SHA384" => Ok(HashAlgorithm::Sha384),
            "SHA512" => Ok(HashAlgorithm::Sha512),
            _ => Err(CryptoError::UnknownHashAlgorithm(name.to_string())),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn digest(algorithm: HashAlgorithm, data: &[u8]) -> Vec<u8> {
    algorithm.digest(data)
}

/// Keep the first `n` bytes of a digest. `None` or a length beyond the
/// digest leaves it untouched.
pub fn truncate_digest(digest: &[u8], n: Option<usize>) -> &[u8] {
    match n {
        Some(n) if n < digest.len() => &digest[..n],
        _ => digest,
    }
}

// ============================================================================
// Curves
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Curve {
    Secp192r1,
    Secp192k1,
    Secp224r1,
    Secp256r1,
    Secp256k1,
    Secp384r1,
    Secp521r1,
    BrainpoolP256r1,
    BrainpoolP384r1,
}

impl Curve {
    pub const ALL: [Curve; 9] = [
        Curve::Secp192r1,
        Curve::Secp192k1,
        Curve::Secp224r1,
        Curve::Secp256r1,
        Curve::Secp256k1,
        Curve::Secp384r1,
        Curve::Secp521r1,
        Curve::BrainpoolP256r1,
        Curve::BrainpoolP384r1,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Curve::Secp192r1 => "secp192r1",
            Curve::Secp192k1 => "secp192k1",
            Curve::Secp224r1 => "secp224r1",
            Curve::Secp256r1 => "secp256r1",
            Curve::Secp256k1 => "secp256k1",
            Curve::Secp384r1 => "secp384r1",
            Curve::Secp521r1 => "secp521r1",
            Curve::BrainpoolP256r1 => "brainpoolP256r1",
            Curve::BrainpoolP384r1 => "brainpoolP384r1",
        }
    }

    pub fn nid(&self) -> Nid {
        match self {
            Curve::Secp192r1 => Nid::X9_62_PRIME192V1,
            Curve::Secp192k1 => Nid::SECP192K1,
            Curve::Secp224r1 => Nid::SECP224R1,
            Curve::Secp256r1 => Nid::X9_62_PRIME256V1,
            Curve::Secp256k1 => Nid::SECP256K1,
            Curve::Secp384r1 => Nid::SECP384R1,
            Curve::Secp521r1 => Nid::SECP521R1,
            Curve::BrainpoolP256r1 => Nid::BRAINPOOL_P256R1,
            Curve::BrainpoolP384r1 => Nid::BRAINPOOL_P384R1,
        }
    }

    pub fn from_nid(nid: Nid) -> Option<Self> {
        Curve::ALL.into_iter().find(|curve| curve.nid() == nid)
    }

    /// Byte length of one field element (and of r, s)
    pub fn field_size(&self) -> usize {
        match self {
            Curve::Secp192r1 | Curve::Secp192k1 => 24,
            Curve::Secp224r1 => 28,
            Curve::Secp256r1 | Curve::Secp256k1 | Curve::BrainpoolP256r1 => 32,
            Curve::Secp384r1 | Curve::BrainpoolP384r1 => 48,
            Curve::Secp521r1 => 66,
        }
    }

    pub fn group(&self) -> Result<EcGroup, CryptoError> {
        Ok(EcGroup::from_curve_name(self.nid())?)
    }
}

impl FromStr for Curve {
    type Err = CryptoError;

    /// Accepts `secp256r1`, `prime256v1`, `P-256`, `nistp256`, `ECC_secp256r1`
    /// and the equivalents for the other curves.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let lowered = name.trim().to_ascii_lowercase();
        let stripped = lowered.strip_prefix("ecc_").unwrap_or(&lowered);
        let compact: String = stripped.chars().filter(|c| *c != '-' && *c != '_').collect();
        let curve = match compact.as_str() {
            "secp192r1" | "prime192v1" | "p192" | "nistp192" => Curve::Secp192r1,
            "secp192k1" => Curve::Secp192k1,
            "secp224r1" | "p224" | "nistp224" => Curve::Secp224r1,
            "secp256r1" | "prime256v1" | "p256" | "nistp256" => Curve::Secp256r1,
            "secp256k1" => Curve::Secp256k1,
            "secp384r1" | "p384" | "nistp384" => Curve::Secp384r1,
            "secp521r1" | "p521" | "nistp521" => Curve::Secp521r1,
            "brainpoolp256r1" => Curve::BrainpoolP256r1,
            "brainpoolp384r1" => Curve::BrainpoolP384r1,
            _ => return Err(CryptoError::UnknownCurve(name.to_string())),
        };
        Ok(curve)
    }
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Key and signature inputs
// ============================================================================

/// Public key as shipped by a vendor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKeyBytes {
    /// X‖Y, or a SEC1 point (`04‖X‖Y`, `02/03‖X`)
    Raw(Vec<u8>),
    /// DER SubjectPublicKeyInfo
    Der(Vec<u8>),
    /// PEM `-----BEGIN PUBLIC KEY-----`
    Pem(String),
}

impl PublicKeyBytes {
    /// Decode a textual key. `format` is `raw`/`der`/`pem` (case-insensitive);
    /// PEM ignores the encoding.
    pub fn from_text(format: &str, encoding: TextEncoding, value: &str) -> Result<Self, CryptoError> {
        match format.trim().to_ascii_lowercase().as_str() {
            "pem" => Ok(PublicKeyBytes::Pem(value.to_string())),
            "der" => Ok(PublicKeyBytes::Der(encoding.decode(value)?)),
            "raw" | "" => Ok(PublicKeyBytes::Raw(encoding.decode(value)?)),
            other => Err(CryptoError::UnknownPublicKeyFormat(other.to_string())),
        }
    }

    /// Guess the encoding of a bare byte string: a DER SEQUENCE starts
    /// with 0x30, everything else is treated as a point.
    pub fn sniff(bytes: Vec<u8>) -> Self {
        if bytes.first() == Some(&0x30) {
            PublicKeyBytes::Der(bytes)
        } else {
            PublicKeyBytes::Raw(bytes)
        }
    }
}

/// ECDSA signature as shipped by a vendor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureBytes {
    Raw { r: Vec<u8>, s: Vec<u8> },
    /// ASN.1 `SEQUENCE { INTEGER r, INTEGER s }`
    Der(Vec<u8>),
}

impl SignatureBytes {
    /// Split a concatenated r‖s blob into its halves
    pub fn from_concatenated(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.is_empty() || bytes.len() % 2 != 0 {
            return Err(CryptoError::InvalidSignature(format!(
                "r||s blob of odd length {}",
                bytes.len()
            )));
        }
        let (r, s) = bytes.split_at(bytes.len() / 2);
        Ok(SignatureBytes::Raw {
            r: r.to_vec(),
            s: s.to_vec(),
        })
    }

    fn to_ecdsa(&self) -> Result<EcdsaSig, CryptoError> {
        match self {
            SignatureBytes::Raw { r, s } => {
                if r.is_empty() || s.is_empty() {
                    return Err(CryptoError::InvalidSignature("empty r or s".into()));
                }
                let r = BigNum::from_slice(r)?;
                let s = BigNum::from_slice(s)?;
                Ok(EcdsaSig::from_private_components(r, s)?)
            }
            SignatureBytes::Der(der) => EcdsaSig::from_der(der)
                .map_err(|e| CryptoError::InvalidSignature(e.to_string())),
        }
    }

    /// (r, s) as big-endian bytes, for proof traces
    pub fn components(&self) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
        let sig = self.to_ecdsa()?;
        Ok((sig.r().to_vec(), sig.s().to_vec()))
    }
}

/// Decode a public key and check it lies on `curve`
pub fn load_public_key(curve: Curve, key: &PublicKeyBytes) -> Result<EcKey<Public>, CryptoError> {
    let decoded = match key {
        PublicKeyBytes::Raw(bytes) => {
            let group = curve.group()?;
            let point_bytes = if bytes.len() == 2 * curve.field_size() {
                let mut prefixed = Vec::with_capacity(bytes.len() + 1);
                prefixed.push(0x04);
                prefixed.extend_from_slice(bytes);
                prefixed
            } else {
                bytes.clone()
            };
            let mut ctx = BigNumContext::new()?;
            let point = EcPoint::from_bytes(&group, &point_bytes, &mut ctx)
                .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
            return EcKey::from_public_key(&group, &point)
                .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()));
        }
        PublicKeyBytes::Der(der) => EcKey::public_key_from_der(der)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?,
        PublicKeyBytes::Pem(pem) => EcKey::public_key_from_pem(pem.as_bytes())
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?,
    };

    match decoded.group().curve_name() {
        Some(nid) if nid == curve.nid() => Ok(decoded),
        found => Err(CryptoError::CurveMismatch {
            expected: curve.name().to_string(),
            found: found
                .and_then(Curve::from_nid)
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        }),
    }
}

/// Curve named by a DER or PEM encoded key
pub fn curve_of_public_key(key: &PublicKeyBytes) -> Result<Curve, CryptoError> {
    let decoded = match key {
        PublicKeyBytes::Der(der) => EcKey::public_key_from_der(der),
        PublicKeyBytes::Pem(pem) => EcKey::public_key_from_pem(pem.as_bytes()),
        PublicKeyBytes::Raw(_) => {
            return Err(CryptoError::UnknownPublicKeyFormat("raw keys carry no curve".into()))
        }
    }
    .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    decoded
        .group()
        .curve_name()
        .and_then(Curve::from_nid)
        .ok_or_else(|| CryptoError::UnknownCurve("unnamed curve".into()))
}

/// Uncompressed SEC1 point of a key, for proof traces
pub fn public_key_point(key: &EcKey<Public>) -> Result<Vec<u8>, CryptoError> {
    let mut ctx = BigNumContext::new()?;
    Ok(key
        .public_key()
        .to_bytes(key.group(), PointConversionForm::UNCOMPRESSED, &mut ctx)?)
}

/// Verify, surfacing the reason a key or signature could not be used
pub fn try_verify_signature(
    curve: Curve,
    public_key: &PublicKeyBytes,
    message_digest: &[u8],
    signature: &SignatureBytes,
) -> Result<bool, CryptoError> {
    let key = load_public_key(curve, public_key)?;
    let sig = signature.to_ecdsa()?;
    Ok(sig.verify(message_digest, &key)?)
}

/// Fail-closed verification: any decoding problem yields `false`
pub fn verify_signature(
    curve: Curve,
    public_key: &PublicKeyBytes,
    message_digest: &[u8],
    signature: &SignatureBytes,
) -> bool {
    match try_verify_signature(curve, public_key, message_digest, signature) {
        Ok(valid) => valid,
        Err(e) => {
            tracing::debug!("Crypto: verification failed closed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::pkey::Private;

    fn keypair(curve: Curve) -> EcKey<Private> {
        EcKey::generate(&curve.group().unwrap()).unwrap()
    }

    fn raw_point(key: &EcKey<Private>) -> Vec<u8> {
        let mut ctx = BigNumContext::new().unwrap();
        key.public_key()
            .to_bytes(key.group(), PointConversionForm::UNCOMPRESSED, &mut ctx)
            .unwrap()
    }

    #[test]
    fn test_digest_lengths() {
        assert_eq!(digest(HashAlgorithm::Sha224, b"abc").len(), 28);
        assert_eq!(
            hex::encode(digest(HashAlgorithm::Sha256, b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(digest(HashAlgorithm::Sha384, b"abc").len(), 48);
        assert_eq!(digest(HashAlgorithm::Sha512, b"abc").len(), 64);
        assert_eq!("sha-256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert!("md5".parse::<HashAlgorithm>().is_err());
    }

    #[test]
    fn test_truncate_digest() {
        let d = digest(HashAlgorithm::Sha256, b"x");
        assert_eq!(truncate_digest(&d, Some(24)).len(), 24);
        assert_eq!(truncate_digest(&d, Some(64)).len(), 32);
        assert_eq!(truncate_digest(&d, None).len(), 32);
    }

    #[test]
    fn test_curve_names() {
        for name in ["secp256r1", "prime256v1", "P-256", "ECC_secp256r1", "NISTP256"] {
            assert_eq!(name.parse::<Curve>().unwrap(), Curve::Secp256r1, "{name}");
        }
        assert_eq!("secp192r1".parse::<Curve>().unwrap().field_size(), 24);
        assert!("curve25519".parse::<Curve>().is_err());
    }

    #[test]
    fn test_verify_raw_and_der_keys() {
        for curve in [Curve::Secp192r1, Curve::Secp256r1, Curve::Secp256k1, Curve::Secp384r1] {
            let key = keypair(curve);
            let d = digest(HashAlgorithm::Sha256, b"meter reading");
            let sig = EcdsaSig::sign(&d, &key).unwrap();

            let point = raw_point(&key);
            let raw_sig = SignatureBytes::Raw {
                r: sig.r().to_vec(),
                s: sig.s().to_vec(),
            };
            let der_sig = SignatureBytes::Der(sig.to_der().unwrap());

            assert!(verify_signature(curve, &PublicKeyBytes::Raw(point.clone()), &d, &raw_sig));
            // X||Y without the 0x04 prefix
            assert!(verify_signature(curve, &PublicKeyBytes::Raw(point[1..].to_vec()), &d, &der_sig));

            let der_key = PublicKeyBytes::Der(key.public_key_to_der().unwrap());
            assert!(verify_signature(curve, &der_key, &d, &der_sig));
            assert_eq!(curve_of_public_key(&der_key).unwrap(), curve);

            let pem = String::from_utf8(key.public_key_to_pem().unwrap()).unwrap();
            assert!(verify_signature(curve, &PublicKeyBytes::Pem(pem), &d, &raw_sig));
        }
    }

    #[test]
    fn test_fail_closed() {
        let key = keypair(Curve::Secp256r1);
        let d = digest(HashAlgorithm::Sha256, b"payload");
        let sig = EcdsaSig::sign(&d, &key).unwrap();
        let der_key = PublicKeyBytes::Der(key.public_key_to_der().unwrap());
        let good = SignatureBytes::Der(sig.to_der().unwrap());

        // wrong digest
        let other = digest(HashAlgorithm::Sha256, b"payload!");
        assert!(!verify_signature(Curve::Secp256r1, &der_key, &other, &good));

        // malformed DER
        let broken = SignatureBytes::Der(vec![0x30, 0x05, 0x02, 0x01]);
        assert!(!verify_signature(Curve::Secp256r1, &der_key, &d, &broken));

        // wrong-length raw key
        let short = PublicKeyBytes::Raw(vec![0x04; 17]);
        assert!(!verify_signature(Curve::Secp256r1, &short, &d, &good));

        // curve mismatch
        assert!(!verify_signature(Curve::Secp384r1, &der_key, &d, &good));
        assert!(matches!(
            try_verify_signature(Curve::Secp384r1, &der_key, &d, &good),
            Err(CryptoError::CurveMismatch { .. })
        ));

        // empty components
        let empty = SignatureBytes::Raw { r: vec![], s: vec![] };
        assert!(!verify_signature(Curve::Secp256r1, &der_key, &d, &empty));
    }

    #[test]
    fn test_deterministic() {
        let key = keypair(Curve::Secp256r1);
        let d = digest(HashAlgorithm::Sha256, b"same input");
        let sig = SignatureBytes::Der(EcdsaSig::sign(&d, &key).unwrap().to_der().unwrap());
        let pk = PublicKeyBytes::Der(key.public_key_to_der().unwrap());
        let first = verify_signature(Curve::Secp256r1, &pk, &d, &sig);
        let second = verify_signature(Curve::Secp256r1, &pk, &d, &sig);
        assert_eq!(first, second);
        assert!(first);
    }

    #[test]
    fn test_split_concatenated_signature() {
        let sig = SignatureBytes::from_concatenated(&[1, 2, 3, 4]).unwrap();
        assert_eq!(sig, SignatureBytes::Raw { r: vec![1, 2], s: vec![3, 4] });
        assert!(SignatureBytes::from_concatenated(&[1, 2, 3]).is_err());
    }
}
