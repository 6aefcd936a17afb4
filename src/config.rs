//! `WorkerConfig` (SPEC_FULL.md §A "Configuration"): a handful of
//! environment variables read once at startup. No config-file format is
//! warranted at this scale — plain `std::env`, the same minimalism the
//! teacher crate itself shows.

const ENV_HOST_BASE_URL: &str = "LETSESIGN_HOST_BASE_URL";
const ENV_LOG_FILTER: &str = "LETSESIGN_LOG";
const ENV_MAIL_TEMPLATE_FOLDER: &str = "LETSESIGN_MAIL_TEMPLATE_FOLDER";
const ENV_DOWNWARD_COMPAT_PCRS: &str = "LETSESIGN_DOWNWARD_COMPAT_PCR_HEX";

const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_MAIL_TEMPLATE_FOLDER: &str = "/server/resources/template";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{ENV_DOWNWARD_COMPAT_PCRS} entry {0:?} is not valid hex")]
    BadPcrHex(String),
}

pub struct WorkerConfig {
    /// Overrides the host loopback base URL (spec §4.9); `None` keeps
    /// `HostRpc`'s own `http://127.0.0.1` default.
    pub host_base_url_override: Option<String>,
    pub log_filter: String,
    pub mail_template_folder: String,
    /// PCR0..2 triples, hex-encoded and `;`-joined per triple, `,`-joined
    /// across triples, this image accepts as valid predecessors (spec §4.5
    /// "DOWNWARD_COMP_VERSION").
    pub downward_compat_pcr_hex: String,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        WorkerConfig {
            host_base_url_override: std::env::var(ENV_HOST_BASE_URL).ok(),
            log_filter: std::env::var(ENV_LOG_FILTER).unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
            mail_template_folder: std::env::var(ENV_MAIL_TEMPLATE_FOLDER)
                .unwrap_or_else(|_| DEFAULT_MAIL_TEMPLATE_FOLDER.to_string()),
            downward_compat_pcr_hex: std::env::var(ENV_DOWNWARD_COMPAT_PCRS).unwrap_or_default(),
        }
    }

    /// Parses `downward_compat_pcr_hex` into `PcrTriple`s (spec §4.5).
    /// Empty/unset means no predecessor image is accepted.
    pub fn downward_compat_pcrs(&self) -> Result<Vec<crate::attestation::PcrTriple>, ConfigError> {
        if self.downward_compat_pcr_hex.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.downward_compat_pcr_hex
            .split(',')
            .map(|triple| {
                let mut parts = triple.splitn(3, ';');
                let (p0, p1, p2) = (
                    parts.next().unwrap_or(""),
                    parts.next().unwrap_or(""),
                    parts.next().unwrap_or(""),
                );
                let decode = |s: &str| hex::decode(s).map_err(|_| ConfigError::BadPcrHex(triple.to_string()));
                Ok(crate::attestation::PcrTriple {
                    pcr0: decode(p0)?,
                    pcr1: decode(p1)?,
                    pcr2: decode(p2)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(hex_list: &str) -> WorkerConfig {
        WorkerConfig {
            host_base_url_override: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            mail_template_folder: DEFAULT_MAIL_TEMPLATE_FOLDER.to_string(),
            downward_compat_pcr_hex: hex_list.to_string(),
        }
    }

    #[test]
    fn empty_downward_compat_list_parses_to_no_entries() {
        let triples = config_with("").downward_compat_pcrs().unwrap();
        assert!(triples.is_empty());
    }

    #[test]
    fn parses_comma_joined_semicolon_separated_pcr_triples() {
        let triples = config_with("aa;bb;cc,dd;ee;ff").downward_compat_pcrs().unwrap();
        assert_eq!(triples.len(), 2);
        assert_eq!(triples[0].pcr0, vec![0xaa]);
        assert_eq!(triples[0].pcr1, vec![0xbb]);
        assert_eq!(triples[0].pcr2, vec![0xcc]);
        assert_eq!(triples[1].pcr0, vec![0xdd]);
    }

    #[test]
    fn rejects_non_hex_pcr_entries() {
        let err = config_with("zz;bb;cc").downward_compat_pcrs().unwrap_err();
        assert!(matches!(err, ConfigError::BadPcrHex(_)));
    }
}
