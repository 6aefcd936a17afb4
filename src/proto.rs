//! POR/POI/Summary wire types (spec §3), CBOR-encoded where noted.

use serde::{Deserialize, Serialize};

/// Proof-of-Request, minted by `SendReq` and consumed by `ConfirmIntent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Por {
    #[serde(rename = "payloadHash")]
    pub payload_hash: String,
    #[serde(rename = "signerIdx")]
    pub signer_idx: u32,
    #[serde(rename = "secretHash")]
    pub secret_hash: String,
    #[serde(rename = "phoneRequired")]
    pub phone_required: bool,
}

/// Proof-of-Intent, minted by `ConfirmIntent` and consumed by `AttachESig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poi {
    #[serde(rename = "payloadHash")]
    pub payload_hash: String,
    #[serde(rename = "signerIdx")]
    pub signer_idx: u32,
    #[serde(rename = "ipAddress")]
    pub ip_address: String,
    #[serde(rename = "porTime")]
    pub por_time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarySigner {
    pub name: String,
    #[serde(rename = "emailAddr")]
    pub email_addr: String,
    #[serde(rename = "ipAddress")]
    pub ip_address: String,
    #[serde(rename = "signingTime")]
    pub signing_time: u64,
    #[serde(rename = "phoneNumber", skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// Final bundle manifest (spec §3), canonical-JSON-serialized into the
/// `.spf` sidecar and the attested `summary` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    #[serde(rename = "signerList")]
    pub signer_list: Vec<SummarySigner>,
    #[serde(rename = "magicNumber")]
    pub magic_number: String,
    #[serde(rename = "bindingDataHash")]
    pub binding_data_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BindingDataHashInput {
    #[serde(rename = "inOrder")]
    pub in_order: bool,
    #[serde(rename = "taskConfigHash")]
    pub task_config_hash: String,
    #[serde(rename = "templateInfoHash")]
    pub template_info_hash: String,
    #[serde(rename = "templateDataHash")]
    pub template_data_hash: String,
}

pub fn cbor_encode<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_cbor::Error> {
    serde_cbor::to_vec(value)
}

pub fn cbor_decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, serde_cbor::Error> {
    serde_cbor::from_slice(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn por_survives_cbor_encode_then_decode_with_camel_case_keys() {
        let por = Por {
            payload_hash: "deadbeef".into(),
            signer_idx: 2,
            secret_hash: "cafef00d".into(),
            phone_required: true,
        };
        let bytes = cbor_encode(&por).unwrap();
        let decoded: Por = cbor_decode(&bytes).unwrap();
        assert_eq!(decoded.payload_hash, por.payload_hash);
        assert_eq!(decoded.signer_idx, por.signer_idx);
        assert_eq!(decoded.secret_hash, por.secret_hash);
        assert_eq!(decoded.phone_required, por.phone_required);
    }

    #[test]
    fn binding_data_hash_input_serializes_with_expected_camel_case_field_names() {
        let input = BindingDataHashInput {
            in_order: true,
            task_config_hash: "a".into(),
            template_info_hash: "b".into(),
            template_data_hash: "c".into(),
        };
        let value = serde_json::to_value(&input).unwrap();
        assert_eq!(value["inOrder"], true);
        assert_eq!(value["taskConfigHash"], "a");
        assert_eq!(value["templateInfoHash"], "b");
        assert_eq!(value["templateDataHash"], "c");
    }
}
