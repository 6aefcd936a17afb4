pub mod doc;
pub mod service;
pub mod verifier;

pub use doc::VerifiedAttestation;
pub use service::{AttestationService, AttestationServiceError, HashEntry, PcrTriple};
pub use verifier::{VerifyError, AWS_NITRO_ROOT_CERT_PEM};
