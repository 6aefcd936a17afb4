//! CBOR payload shape of a COSE_Sign1-wrapped Nitro attestation document,
//! generalized from the teacher's `NitroAdDocPayload` (spec §4.3 step 2).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

#[derive(Debug, Serialize, Deserialize)]
pub struct AttestationPayload {
    pub module_id: String,
    pub digest: String,
    pub timestamp: u64,
    pub pcrs: HashMap<u8, ByteBuf>,
    pub certificate: ByteBuf,
    pub cabundle: Vec<ByteBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<ByteBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<ByteBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<ByteBuf>,
}

/// What callers actually want out of a verified document (spec §4.3
/// contract): the PCR map, the timestamp and the two optional bound blobs.
#[derive(Debug, Clone)]
pub struct VerifiedAttestation {
    pub pcrs: HashMap<u8, Vec<u8>>,
    pub timestamp_ms: u64,
    pub user_data: Option<Vec<u8>>,
    pub public_key: Option<Vec<u8>>,
}

impl VerifiedAttestation {
    pub fn pcr(&self, index: u8) -> Option<&[u8]> {
        self.pcrs.get(&index).map(|v| v.as_slice())
    }
}
