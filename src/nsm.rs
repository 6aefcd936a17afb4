//! `NsmBridge` (spec §4.1): the sole channel to the Nitro Security Module
//! device. Wraps `aws-nitro-enclaves-nsm-api`, replacing the ctypes shim
//! the original implementation used to call `/usr/lib64/libnsm.so`.

use aws_nitro_enclaves_nsm_api::api::{ErrorCode as NsmErrorCode, Request, Response};
use aws_nitro_enclaves_nsm_api::driver::{nsm_exit, nsm_init, nsm_process_request};

/// Attestation-document `user_data` is capped at 512 bytes and `public_key`
/// at 1024 bytes (spec §4.1) — both are attacker-influenced-sized fields
/// that the enclave itself bounds before handing them to the device.
pub const MAX_USER_DATA_LEN: usize = 512;
pub const MAX_PUBLIC_KEY_LEN: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum NsmError {
    #[error("user_data exceeds {MAX_USER_DATA_LEN} bytes")]
    UserDataTooLarge,
    #[error("public_key exceeds {MAX_PUBLIC_KEY_LEN} bytes")]
    PublicKeyTooLarge,
    #[error("NSM device returned error: {0:?}")]
    Device(NsmErrorCode),
    #[error("NSM device returned an unexpected response variant")]
    UnexpectedResponse,
}

/// Owns the NSM device file descriptor for the lifetime of the process.
pub struct NsmBridge {
    fd: i32,
}

impl NsmBridge {
    pub fn open() -> Self {
        NsmBridge { fd: nsm_init() }
    }

    /// Requests an attestation document over the given `user_data` (the
    /// application payload hash being attested to) and an optional
    /// `public_key` to bind into the document (used when requesting a KMS
    /// decryption recipient key).
    pub fn attest(
        &self,
        user_data: Option<Vec<u8>>,
        public_key: Option<Vec<u8>>,
        nonce: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, NsmError> {
        if let Some(ref d) = user_data {
            if d.len() > MAX_USER_DATA_LEN {
                return Err(NsmError::UserDataTooLarge);
            }
        }
        if let Some(ref k) = public_key {
            if k.len() > MAX_PUBLIC_KEY_LEN {
                return Err(NsmError::PublicKeyTooLarge);
            }
        }

        let request = Request::Attestation {
            public_key: public_key.map(|v| v.into()),
            user_data: user_data.map(|v| v.into()),
            nonce: nonce.map(|v| v.into()),
        };

        match nsm_process_request(self.fd, request) {
            Response::Attestation { document } => Ok(document),
            Response::Error(code) => Err(NsmError::Device(code)),
            _ => Err(NsmError::UnexpectedResponse),
        }
    }

    /// Cryptographically secure random bytes sourced from the NSM device's
    /// RNG, used in addition to (not instead of) `openssl`'s own RNG where
    /// the original explicitly re-seeds from `/dev/nsm` style entropy.
    pub fn random(&self, len: usize) -> Result<Vec<u8>, NsmError> {
        match nsm_process_request(self.fd, Request::GetRandom) {
            Response::GetRandom { random } => {
                let mut out = random;
                out.truncate(len);
                Ok(out)
            }
            Response::Error(code) => Err(NsmError::Device(code)),
            _ => Err(NsmError::UnexpectedResponse),
        }
    }
}

impl Drop for NsmBridge {
    fn drop(&mut self) {
        nsm_exit(self.fd);
    }
}
