//! Hashing and binary encodings shared by signers and the verifier
//!
//! The challenge layout is the compatibility contract between the signing
//! coordinator and every verifier:
//!
//! ```text
//! e = keccak256(R_x || R_y || P_x || P_y || message_hash) mod n
//! ```
//!
//! with each coordinate as a 32-byte big-endian integer.

use crate::arith::{field, Point, N};
use crate::types::{GroupPublicKey, Signature};
use crate::{verify, Error, Result};
use k256::elliptic_curve::bigint::U256;
use serde::{Deserialize, Serialize};
use tiny_keccak::{Hasher, Keccak};

/// Size of the challenge preimage
pub const CHALLENGE_INPUT_LEN: usize = 160;

/// Version tag of the authorization request encoding
pub const REQUEST_ENCODING_VERSION: u8 = 1;

/// Keccak-256 over the concatenation of `chunks`
pub fn keccak256(chunks: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    for chunk in chunks {
        hasher.update(chunk);
    }
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// Hash an arbitrary message down to the 32 bytes that get signed
pub fn hash_message(message: &[u8]) -> [u8; 32] {
    keccak256(&[message])
}

/// `R_x || R_y || P_x || P_y || message_hash`
pub fn challenge_input(
    r: &Point,
    public_key: &Point,
    message_hash: &[u8; 32],
) -> [u8; CHALLENGE_INPUT_LEN] {
    let mut input = [0u8; CHALLENGE_INPUT_LEN];
    input[..64].copy_from_slice(&r.to_uncompressed());
    input[64..128].copy_from_slice(&public_key.to_uncompressed());
    input[128..].copy_from_slice(message_hash);
    input
}

/// Challenge scalar `e`, reduced mod `n`
pub fn challenge(r: &Point, public_key: &Point, message_hash: &[u8; 32]) -> U256 {
    let input = challenge_input(r, public_key, message_hash);
    let digest = keccak256(&[input.as_slice()]);
    field::reduce(&U256::from_be_slice(&digest), &N)
}

/// Access request whose approval the quorum signs.
///
/// Encoded as `version || len16(request_id) || request_id || len16(principal)
/// || principal || len16(resource) || resource || len16(action) || action`
/// with big-endian `u16` lengths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub request_id: String,
    pub principal: String,
    pub resource: String,
    pub action: String,
}

impl AuthorizationRequest {
    pub fn new(
        request_id: impl Into<String>,
        principal: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            principal: principal.into(),
            resource: resource.into(),
            action: action.into(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let fields = [
            self.request_id.as_bytes(),
            self.principal.as_bytes(),
            self.resource.as_bytes(),
            self.action.as_bytes(),
        ];
        let mut out = Vec::with_capacity(1 + fields.iter().map(|f| 2 + f.len()).sum::<usize>());
        out.push(REQUEST_ENCODING_VERSION);
        for field in fields {
            let len = u16::try_from(field.len()).map_err(|_| {
                Error::MalformedInput(format!("request field of {} bytes is too long", field.len()))
            })?;
            out.extend_from_slice(&len.to_be_bytes());
            out.extend_from_slice(field);
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (&version, mut rest) = bytes
            .split_first()
            .ok_or_else(|| Error::MalformedInput("empty request encoding".into()))?;
        if version != REQUEST_ENCODING_VERSION {
            return Err(Error::MalformedInput(format!(
                "unsupported request encoding version {version}"
            )));
        }

        let mut fields = Vec::with_capacity(4);
        for _ in 0..4 {
            if rest.len() < 2 {
                return Err(Error::MalformedInput("truncated request field length".into()));
            }
            let len = usize::from(u16::from_be_bytes([rest[0], rest[1]]));
            rest = &rest[2..];
            if rest.len() < len {
                return Err(Error::MalformedInput("truncated request field".into()));
            }
            let field = std::str::from_utf8(&rest[..len])
                .map_err(|e| Error::MalformedInput(e.to_string()))?;
            fields.push(field.to_string());
            rest = &rest[len..];
        }
        if !rest.is_empty() {
            return Err(Error::MalformedInput("trailing bytes after request".into()));
        }

        let [request_id, principal, resource, action]: [String; 4] = fields
            .try_into()
            .map_err(|_| Error::Internal("request field count".into()))?;
        Ok(Self {
            request_id,
            principal,
            resource,
            action,
        })
    }

    /// The 32-byte value the quorum signs for this request
    pub fn message_hash(&self) -> Result<[u8; 32]> {
        Ok(hash_message(&self.encode()?))
    }
}

/// Signed request together with the verifier's decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRecord {
    pub request: AuthorizationRequest,
    pub signature: Signature,
    pub decision: bool,
}

impl AuthorizationRecord {
    /// Check `signature` over `request` against the group key and record the outcome
    pub fn evaluate(
        request: AuthorizationRequest,
        signature: Signature,
        group_key: &GroupPublicKey,
    ) -> Self {
        let decision = match request.message_hash() {
            Ok(hash) => verify::verify(&hash, &signature.to_bytes(), group_key.as_bytes()),
            Err(_) => false,
        };
        Self {
            request,
            signature,
            decision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arith::mul_generator;

    #[test]
    fn test_keccak_empty_vector() {
        assert_eq!(
            hex::encode(keccak256(&[])),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_keccak_chunking_is_concatenation() {
        assert_eq!(
            keccak256(&[b"ab".as_slice(), b"c".as_slice()]),
            keccak256(&[b"abc".as_slice()])
        );
    }

    #[test]
    fn test_challenge_layout() {
        let r = mul_generator(&U256::from_u64(5));
        let p = mul_generator(&U256::from_u64(9));
        let m = [7u8; 32];
        let input = challenge_input(&r, &p, &m);
        assert_eq!(&input[..64], &r.to_uncompressed());
        assert_eq!(&input[64..128], &p.to_uncompressed());
        assert_eq!(&input[128..], &m);

        let e = challenge(&r, &p, &m);
        assert!(e < N);
        assert_ne!(challenge(&p, &r, &m), e);
    }

    #[test]
    fn test_request_encoding_round_trip() {
        let request = AuthorizationRequest::new("req-1", "alice", "bucket/file", "read");
        let encoded = request.encode().unwrap();
        assert_eq!(encoded[0], REQUEST_ENCODING_VERSION);
        assert_eq!(AuthorizationRequest::decode(&encoded).unwrap(), request);
    }

    #[test]
    fn test_request_encoding_is_unambiguous() {
        // Shifting a byte between adjacent fields must change the hash.
        let a = AuthorizationRequest::new("req", "ab", "c", "read");
        let b = AuthorizationRequest::new("req", "a", "bc", "read");
        assert_ne!(a.message_hash().unwrap(), b.message_hash().unwrap());
    }

    #[test]
    fn test_request_decode_rejects_garbage() {
        assert!(AuthorizationRequest::decode(&[]).is_err());
        assert!(AuthorizationRequest::decode(&[2, 0, 0]).is_err());
        let mut encoded = AuthorizationRequest::new("r", "p", "x", "a").encode().unwrap();
        encoded.push(0);
        assert!(AuthorizationRequest::decode(&encoded).is_err());
    }

    #[test]
    fn test_oversized_field_rejected() {
        let request = AuthorizationRequest::new("r", "p".repeat(70_000), "x", "a");
        assert!(matches!(request.encode(), Err(Error::MalformedInput(_))));
    }
}
