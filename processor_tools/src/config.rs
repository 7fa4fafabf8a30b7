use log::*;
use mps_common::Secret;

pub const DEFAULT_API_URL: &str = "https://api.cardworks.example/v1";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Default)]
pub struct ProcessorConfig {
    /// Base URL of the processor's REST API, without a trailing slash.
    pub api_url: String,
    /// The secret API key used to authenticate outbound calls.
    pub secret_key: Secret<String>,
    /// The shared secret the processor signs webhook payloads with.
    pub webhook_secret: Secret<String>,
    /// Upper bound on any single outbound call. Calls must fail, not hang.
    pub request_timeout_secs: u64,
}

impl ProcessorConfig {
    pub fn new_from_env_or_default() -> Self {
        let api_url = std::env::var("MPS_PROCESSOR_API_URL").unwrap_or_else(|_| {
            warn!("MPS_PROCESSOR_API_URL not set, using {DEFAULT_API_URL} as default");
            DEFAULT_API_URL.to_string()
        });
        let secret_key = Secret::new(std::env::var("MPS_PROCESSOR_SECRET_KEY").unwrap_or_else(|_| {
            warn!("MPS_PROCESSOR_SECRET_KEY not set, using a (probably useless) default");
            "sk_test_00000000000000".to_string()
        }));
        let webhook_secret = Secret::new(std::env::var("MPS_PROCESSOR_WEBHOOK_SECRET").unwrap_or_else(|_| {
            warn!("MPS_PROCESSOR_WEBHOOK_SECRET not set, using a (probably useless) default");
            "whsec_00000000000000".to_string()
        }));
        let request_timeout_secs = std::env::var("MPS_PROCESSOR_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        Self { api_url, secret_key, webhook_secret, request_timeout_secs }
    }
}
