//! `AttestationService` (spec §4.5): wraps `NsmBridge` and the verifier,
//! owns the enclave's own PCR baseline captured once at startup, and
//! applies the downward-compatibility PCR list.

use serde::{Deserialize, Serialize};

use crate::attestation::verifier::{self, VerifyError};
use crate::canonical_json::{self, CanonicalJsonError};
use crate::nsm::{NsmBridge, NsmError};

#[derive(Debug, thiserror::Error)]
pub enum AttestationServiceError {
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error(transparent)]
    Nsm(#[from] NsmError),
    #[error(transparent)]
    Json(#[from] CanonicalJsonError),
    #[error("user_data did not decode to the expected {{fnName, hashList}} shape")]
    MalformedUserData,
    #[error("PCR0..2 did not match this enclave's baseline or any configured predecessor")]
    PcrMismatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashEntry {
    pub name: String,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserData {
    #[serde(rename = "fnName")]
    fn_name: String,
    #[serde(rename = "hashList")]
    hash_list: Vec<HashEntry>,
}

/// A PCR0/PCR1/PCR2 triple this enclave image accepts as a valid predecessor,
/// configured at startup (spec §4.5 "DOWNWARD_COMP_VERSION").
#[derive(Debug, Clone)]
pub struct PcrTriple {
    pub pcr0: Vec<u8>,
    pub pcr1: Vec<u8>,
    pub pcr2: Vec<u8>,
}

pub struct AttestationService {
    baseline: PcrTriple,
    downward_compat: Vec<PcrTriple>,
}

impl AttestationService {
    /// Fetches the enclave's own PCR0..2 once, by issuing a throwaway
    /// self-attestation through `nsm` (spec §4.9 "fetched once from NSM at
    /// startup and cached").
    pub fn bootstrap(
        nsm: &NsmBridge,
        downward_compat: Vec<PcrTriple>,
    ) -> Result<Self, AttestationServiceError> {
        let doc = nsm.attest(None, None, None)?;
        let verified = verifier::verify(&doc)?;
        let baseline = PcrTriple {
            pcr0: verified.pcr(0).unwrap_or_default_vec(),
            pcr1: verified.pcr(1).unwrap_or_default_vec(),
            pcr2: verified.pcr(2).unwrap_or_default_vec(),
        };
        Ok(AttestationService {
            baseline,
            downward_compat,
        })
    }

    /// `issue(fn_name, hash_list) -> AttestBytes` (spec §4.5).
    pub fn issue(
        &self,
        nsm: &NsmBridge,
        fn_name: &str,
        hash_list: Vec<HashEntry>,
    ) -> Result<Vec<u8>, AttestationServiceError> {
        let user_data = UserData {
            fn_name: fn_name.to_string(),
            hash_list,
        };
        let bytes = canonical_json::to_canonical_bytes(&user_data)?;
        Ok(nsm.attest(Some(bytes), None, None)?)
    }

    /// `verify_and_check_pcrs(doc) -> (fn_name, hash_list, timestamp_ms)`.
    pub fn verify_and_check_pcrs(
        &self,
        doc: &[u8],
    ) -> Result<(String, Vec<HashEntry>, u64), AttestationServiceError> {
        let verified = verifier::verify(doc)?;

        let pcr0 = verified.pcr(0).unwrap_or(&[]);
        let pcr1 = verified.pcr(1).unwrap_or(&[]);
        let pcr2 = verified.pcr(2).unwrap_or(&[]);

        let matches_baseline =
            pcr0 == self.baseline.pcr0.as_slice() && pcr1 == self.baseline.pcr1.as_slice() && pcr2 == self.baseline.pcr2.as_slice();
        let matches_downward = self.downward_compat.iter().any(|t| {
            pcr0 == t.pcr0.as_slice() && pcr1 == t.pcr1.as_slice() && pcr2 == t.pcr2.as_slice()
        });

        if !matches_baseline && !matches_downward {
            return Err(AttestationServiceError::PcrMismatch);
        }

        let user_data = verified
            .user_data
            .ok_or(AttestationServiceError::MalformedUserData)?;
        let parsed: UserData = serde_json::from_slice(&user_data)
            .map_err(|_| AttestationServiceError::MalformedUserData)?;

        Ok((parsed.fn_name, parsed.hash_list, verified.timestamp_ms))
    }
}

trait PcrSliceExt {
    fn unwrap_or_default_vec(self) -> Vec<u8>;
}

impl PcrSliceExt for Option<&[u8]> {
    fn unwrap_or_default_vec(self) -> Vec<u8> {
        self.map(|s| s.to_vec()).unwrap_or_default()
    }
}
