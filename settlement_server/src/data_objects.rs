use std::fmt::Display;

use mps_common::MinorUnits;
use serde::{Deserialize, Serialize};
use settlement_engine::db_types::{AccountType, RefundReason};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePurchaseRequest {
    pub app_id: String,
    pub payee_id: String,
    /// Gross charge amount in minor currency units.
    pub amount: MinorUnits,
    pub buyer_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingRequest {
    pub email: String,
    pub country: String,
    #[serde(default = "default_account_type")]
    pub account_type: AccountType,
}

fn default_account_type() -> AccountType {
    AccountType::Express
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequestBody {
    pub purchase_id: i64,
    /// Omitted means the full remaining refundable balance.
    pub amount: Option<MinorUnits>,
    pub reason: RefundReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingResponse {
    pub owner_id: String,
    pub processor_account_id: String,
    pub onboarding_url: String,
}
