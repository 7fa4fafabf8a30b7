//! Wire data objects for the processor REST API and its webhook event envelope.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use mps_common::MinorUnits;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

//--------------------------------------  Connected accounts  --------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorAccount {
    /// The processor-assigned account id, e.g. `acct_1H2i3j4k`.
    pub id: String,
    pub email: Option<String>,
    pub country: String,
    #[serde(rename = "type")]
    pub account_type: String,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub details_submitted: bool,
    /// Set when the processor has rejected or is still reviewing the account.
    pub disabled_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountLink {
    pub url: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// The flavour of hosted flow an account link sends the payee to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountLinkType {
    Onboarding,
    Update,
}

impl AccountLinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountLinkType::Onboarding => "account_onboarding",
            AccountLinkType::Update => "account_update",
        }
    }
}

//--------------------------------------      Customers       --------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorCustomer {
    pub id: String,
    pub email: Option<String>,
}

//--------------------------------------   Payment intents    --------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub amount: MinorUnits,
    pub currency: String,
    pub status: String,
    pub customer: Option<String>,
    pub application_fee_amount: Option<MinorUnits>,
    pub transfer_destination: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Outbound request to create a payment intent with split instructions attached at charge time.
#[derive(Debug, Clone)]
pub struct NewPaymentIntent {
    pub amount: MinorUnits,
    pub currency: String,
    pub customer: String,
    /// The platform's cut, retained from the charge before transfer.
    pub application_fee_amount: MinorUnits,
    /// The connected account that receives the remainder.
    pub transfer_destination: String,
    pub metadata: HashMap<String, String>,
}

//--------------------------------------       Refunds        --------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorRefund {
    pub id: String,
    pub payment_intent: String,
    pub amount: MinorUnits,
    pub status: String,
    pub reason: Option<String>,
}

//--------------------------------------       Disputes       --------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorDispute {
    pub id: String,
    pub payment_intent: String,
    pub amount: MinorUnits,
    pub reason: Option<String>,
    pub status: String,
    pub evidence_due_by: Option<DateTime<Utc>>,
}

/// Structured evidence forwarded to the card network when contesting a dispute.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisputeEvidence {
    pub product_description: Option<String>,
    pub customer_email_address: Option<String>,
    pub receipt: Option<String>,
    pub uncategorized_text: Option<String>,
}

//--------------------------------------  Balance and methods  -------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub available: MinorUnits,
    pub pending: MinorUnits,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: String,
}

//--------------------------------------    Webhook events    --------------------------------------------------------

/// The envelope the processor wraps every webhook notification in.
///
/// Delivery is at-least-once with no ordering guarantee; `id` is the dedup key and `created` drives the per-entity
/// causal watermark in the settlement ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created: DateTime<Utc>,
    pub data: EventData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

impl ProcessorEvent {
    /// Deserialize the event payload into the concrete object type for this event family.
    pub fn object<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.object.clone())
    }
}

/// Envelope for list responses, e.g. `GET /customers?email=...`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn event_envelope_round_trip() {
        let raw = serde_json::json!({
            "id": "evt_0001",
            "type": "payment_intent.succeeded",
            "created": 1_717_000_000,
            "data": { "object": { "id": "pi_123", "payment_intent": "pi_123", "amount": 10000,
                "status": "succeeded", "reason": null } }
        })
        .to_string();
        let event: ProcessorEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(event.id, "evt_0001");
        assert_eq!(event.event_type, "payment_intent.succeeded");
        let refund: ProcessorRefund = event.object().unwrap();
        assert_eq!(refund.amount, MinorUnits::from(10000));
    }
}
