use std::env;

use log::*;
use mps_common::{parse_boolean_flag, MinorUnits};
use processor_tools::ProcessorConfig;
use settlement_engine::commission::{
    CommissionSchedule,
    DEFAULT_MINIMUM_CHARGE,
    DEFAULT_PLATFORM_RATE_BPS,
    DEFAULT_PROCESSOR_FIXED_FEE,
    DEFAULT_PROCESSOR_RATE_BPS,
};

const DEFAULT_MPS_HOST: &str = "127.0.0.1";
const DEFAULT_MPS_PORT: u16 = 8380;
const DEFAULT_ONBOARDING_REFRESH_URL: &str = "https://marketplace.example/onboarding/refresh";
const DEFAULT_ONBOARDING_RETURN_URL: &str = "https://marketplace.example/onboarding/complete";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Credentials and endpoint for the card-payment processor.
    pub processor: ProcessorConfig,
    /// Where the processor's hosted onboarding flow sends the payee when the link expires mid-flow.
    pub onboarding_refresh_url: String,
    /// Where the payee lands after completing (or abandoning) the hosted flow.
    pub onboarding_return_url: String,
    pub commission: CommissionSchedule,
    /// Periodically drop webhook dedup records older than the processor's redelivery window.
    pub purge_seen_events: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MPS_HOST.to_string(),
            port: DEFAULT_MPS_PORT,
            database_url: String::default(),
            processor: ProcessorConfig::default(),
            onboarding_refresh_url: DEFAULT_ONBOARDING_REFRESH_URL.to_string(),
            onboarding_return_url: DEFAULT_ONBOARDING_RETURN_URL.to_string(),
            commission: CommissionSchedule::default(),
            purge_seen_events: true,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("MPS_HOST").ok().unwrap_or_else(|| DEFAULT_MPS_HOST.into());
        let port = env::var("MPS_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!("🪛️ {s} is not a valid port for MPS_PORT. {e} Using the default, {DEFAULT_MPS_PORT}, instead.");
                    DEFAULT_MPS_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_MPS_PORT);
        let database_url = env::var("MPS_DATABASE_URL").unwrap_or_else(|_| {
            warn!("🪛️ MPS_DATABASE_URL is not set. Using the default sqlite database.");
            "sqlite://data/settlement_store.db".to_string()
        });
        let onboarding_refresh_url =
            env::var("MPS_ONBOARDING_REFRESH_URL").unwrap_or_else(|_| DEFAULT_ONBOARDING_REFRESH_URL.to_string());
        let onboarding_return_url =
            env::var("MPS_ONBOARDING_RETURN_URL").unwrap_or_else(|_| DEFAULT_ONBOARDING_RETURN_URL.to_string());
        let processor = ProcessorConfig::new_from_env_or_default();
        let commission = commission_from_env();
        let purge_seen_events = parse_boolean_flag(env::var("MPS_PURGE_SEEN_EVENTS").ok(), true);
        Self {
            host,
            port,
            database_url,
            processor,
            onboarding_refresh_url,
            onboarding_return_url,
            commission,
            purge_seen_events,
        }
    }
}

/// The fee schedule is configuration, so that pricing changes never require a code change.
fn commission_from_env() -> CommissionSchedule {
    let rate = |var: &str, default: u32| {
        env::var(var)
            .ok()
            .and_then(|s| {
                s.parse::<u32>()
                    .map_err(|e| error!("🪛️ {s} is not a valid value for {var} ({e}). Using the default."))
                    .ok()
            })
            .unwrap_or(default)
    };
    let cents = |var: &str, default: MinorUnits| {
        env::var(var)
            .ok()
            .and_then(|s| {
                s.parse::<i64>()
                    .map_err(|e| error!("🪛️ {s} is not a valid value for {var} ({e}). Using the default."))
                    .ok()
            })
            .map(MinorUnits::from_cents)
            .unwrap_or(default)
    };
    CommissionSchedule {
        processor_rate_bps: rate("MPS_PROCESSOR_RATE_BPS", DEFAULT_PROCESSOR_RATE_BPS),
        processor_fixed_fee: cents("MPS_PROCESSOR_FIXED_FEE_CENTS", DEFAULT_PROCESSOR_FIXED_FEE),
        platform_rate_bps: rate("MPS_PLATFORM_RATE_BPS", DEFAULT_PLATFORM_RATE_BPS),
        minimum_charge: cents("MPS_MINIMUM_CHARGE_CENTS", DEFAULT_MINIMUM_CHARGE),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_commission_schedule_matches_published_pricing() {
        let schedule = commission_from_env();
        assert_eq!(schedule.processor_rate_bps, 290);
        assert_eq!(schedule.platform_rate_bps, 2000);
        assert_eq!(schedule.processor_fixed_fee, MinorUnits::from_cents(30));
    }
}
