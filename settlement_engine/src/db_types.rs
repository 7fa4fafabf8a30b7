use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use mps_common::MinorUnits;
use processor_tools::data_objects::ProcessorAccount;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------   PaymentIntentId    --------------------------------------------------------
/// The processor's identifier for a payment intent. This is the natural external key that correlates webhook events
/// with ledger rows.
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct PaymentIntentId(pub String);

impl FromStr for PaymentIntentId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for PaymentIntentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for PaymentIntentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PaymentIntentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------     AccountType      --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Express,
    Standard,
    Custom,
}

impl Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountType::Express => write!(f, "express"),
            AccountType::Standard => write!(f, "standard"),
            AccountType::Custom => write!(f, "custom"),
        }
    }
}

impl FromStr for AccountType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "express" => Ok(Self::Express),
            "standard" => Ok(Self::Standard),
            "custom" => Ok(Self::Custom),
            s => Err(ConversionError(format!("Invalid account type: {s}"))),
        }
    }
}

//--------------------------------------  VerificationStatus  --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

impl Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationStatus::Pending => write!(f, "pending"),
            VerificationStatus::Verified => write!(f, "verified"),
            VerificationStatus::Rejected => write!(f, "rejected"),
        }
    }
}

//--------------------------------------     PayeeAccount     --------------------------------------------------------
/// The local mirror of a developer's connected payout account at the processor.
///
/// Capability flags are only ever overwritten from processor state (via `account.updated` webhooks or an explicit
/// refresh), never from client-supplied data. Rows are soft state and are never hard-deleted.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PayeeAccount {
    pub id: i64,
    pub owner_id: String,
    pub processor_account_id: String,
    pub account_type: AccountType,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub details_submitted: bool,
    pub verification_status: VerificationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayeeAccount {
    pub owner_id: String,
    pub processor_account_id: String,
    pub account_type: AccountType,
}

/// Explicit update struct for payee capability state. Every field is written on each refresh, since the processor is
/// authoritative for all of them.
#[derive(Debug, Clone)]
pub struct PayeeStateUpdate {
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub details_submitted: bool,
    pub verification_status: VerificationStatus,
}

impl From<&ProcessorAccount> for PayeeStateUpdate {
    fn from(account: &ProcessorAccount) -> Self {
        // `verified` implies charges and payouts are enabled, by construction.
        let verification_status = if account.charges_enabled && account.payouts_enabled && account.details_submitted {
            VerificationStatus::Verified
        } else if account.disabled_reason.as_deref().is_some_and(|r| r.contains("rejected")) {
            VerificationStatus::Rejected
        } else {
            VerificationStatus::Pending
        };
        Self {
            charges_enabled: account.charges_enabled,
            payouts_enabled: account.payouts_enabled,
            details_submitted: account.details_submitted,
            verification_status,
        }
    }
}

//--------------------------------------    PurchaseStatus    --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    /// Ledger row exists; no verified charge confirmation yet.
    Pending,
    /// A verified `payment_intent.succeeded` webhook has confirmed the charge.
    Completed,
    Refunded,
    PartiallyRefunded,
    Disputed,
    Failed,
}

impl Display for PurchaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PurchaseStatus::Pending => write!(f, "pending"),
            PurchaseStatus::Completed => write!(f, "completed"),
            PurchaseStatus::Refunded => write!(f, "refunded"),
            PurchaseStatus::PartiallyRefunded => write!(f, "partially_refunded"),
            PurchaseStatus::Disputed => write!(f, "disputed"),
            PurchaseStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for PurchaseStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "refunded" => Ok(Self::Refunded),
            "partially_refunded" => Ok(Self::PartiallyRefunded),
            "disputed" => Ok(Self::Disputed),
            "failed" => Ok(Self::Failed),
            s => Err(ConversionError(format!("Invalid purchase status: {s}"))),
        }
    }
}

impl From<String> for PurchaseStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid purchase status: {value}. But this conversion cannot fail. Defaulting to Pending");
            PurchaseStatus::Pending
        })
    }
}

//--------------------------------------       Purchase       --------------------------------------------------------
/// A row in the settlement ledger. The single source of local truth for what we believe happened to a buyer's
/// payment.
///
/// Invariant: `gross_amount = processor_fee + platform_fee + payee_amount` at all times.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Purchase {
    pub id: i64,
    pub buyer_id: String,
    pub app_id: String,
    /// The owner id of the developer who receives the payout.
    pub payee_id: String,
    pub gross_amount: MinorUnits,
    pub processor_fee: MinorUnits,
    pub platform_fee: MinorUnits,
    pub payee_amount: MinorUnits,
    pub payment_intent_id: Option<PaymentIntentId>,
    pub status: PurchaseStatus,
    /// The settlement status to restore if an open dispute is won.
    pub prior_status: Option<PurchaseStatus>,
    pub failure_reason: Option<String>,
    /// Causal watermark: the processor timestamp of the last event applied to this row. Events with an earlier
    /// timestamp are stale and are rejected.
    pub last_event_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Purchase parameters as they arrive from the (already authenticated) buyer flow. Amounts are validated and split
/// server-side; nothing in here is trusted for money movement beyond the gross amount itself.
#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub buyer_id: String,
    pub app_id: String,
    pub payee_id: String,
    pub gross_amount: MinorUnits,
}

//--------------------------------------     RefundReason     --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RefundReason {
    Duplicate,
    Fraudulent,
    RequestedByCustomer,
    Other,
}

impl RefundReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundReason::Duplicate => "duplicate",
            RefundReason::Fraudulent => "fraudulent",
            RefundReason::RequestedByCustomer => "requested_by_customer",
            RefundReason::Other => "other",
        }
    }
}

impl Display for RefundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RefundReason {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "duplicate" => Ok(Self::Duplicate),
            "fraudulent" => Ok(Self::Fraudulent),
            "requested_by_customer" => Ok(Self::RequestedByCustomer),
            "other" => Ok(Self::Other),
            s => Err(ConversionError(format!("Invalid refund reason: {s}"))),
        }
    }
}

//--------------------------------------     RefundStatus     --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Succeeded,
    Failed,
    Canceled,
}

impl RefundStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RefundStatus::Pending)
    }
}

impl Display for RefundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefundStatus::Pending => write!(f, "pending"),
            RefundStatus::Succeeded => write!(f, "succeeded"),
            RefundStatus::Failed => write!(f, "failed"),
            RefundStatus::Canceled => write!(f, "canceled"),
        }
    }
}

impl FromStr for RefundStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            s => Err(ConversionError(format!("Invalid refund status: {s}"))),
        }
    }
}

//--------------------------------------     RefundRequest    --------------------------------------------------------
/// A refund tracked independently of its original charge. Status is mutated only by the webhook reconciler (or by a
/// processor-confirmed cancellation).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RefundRequest {
    pub id: i64,
    pub purchase_id: i64,
    pub payment_intent_id: PaymentIntentId,
    pub processor_refund_id: String,
    pub amount: MinorUnits,
    pub reason: RefundReason,
    pub status: RefundStatus,
    /// The administrator who requested the refund.
    pub admin_id: String,
    pub last_event_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRefund {
    pub purchase_id: i64,
    pub payment_intent_id: PaymentIntentId,
    pub processor_refund_id: String,
    pub amount: MinorUnits,
    pub reason: RefundReason,
    pub admin_id: String,
}

//--------------------------------------    DisputeStatus     --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    WarningNeedsResponse,
    WarningUnderReview,
    NeedsResponse,
    UnderReview,
    Won,
    Lost,
}

impl DisputeStatus {
    /// `won` and `lost` are immutable once reached.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DisputeStatus::Won | DisputeStatus::Lost)
    }
}

impl Display for DisputeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisputeStatus::WarningNeedsResponse => write!(f, "warning_needs_response"),
            DisputeStatus::WarningUnderReview => write!(f, "warning_under_review"),
            DisputeStatus::NeedsResponse => write!(f, "needs_response"),
            DisputeStatus::UnderReview => write!(f, "under_review"),
            DisputeStatus::Won => write!(f, "won"),
            DisputeStatus::Lost => write!(f, "lost"),
        }
    }
}

impl FromStr for DisputeStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warning_needs_response" => Ok(Self::WarningNeedsResponse),
            "warning_under_review" => Ok(Self::WarningUnderReview),
            "needs_response" => Ok(Self::NeedsResponse),
            "under_review" => Ok(Self::UnderReview),
            "won" => Ok(Self::Won),
            "lost" => Ok(Self::Lost),
            s => Err(ConversionError(format!("Invalid dispute status: {s}"))),
        }
    }
}

//--------------------------------------     DisputeCase      --------------------------------------------------------
/// A card-network dispute against a settled purchase. Created exclusively by the webhook reconciler; the processor
/// enforces at most one open dispute per charge.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DisputeCase {
    pub id: i64,
    pub purchase_id: i64,
    pub processor_dispute_id: String,
    pub amount: MinorUnits,
    pub reason: Option<String>,
    pub status: DisputeStatus,
    pub evidence_due_by: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDispute {
    pub payment_intent_id: PaymentIntentId,
    pub processor_dispute_id: String,
    pub amount: MinorUnits,
    pub reason: Option<String>,
    pub status: DisputeStatus,
    pub evidence_due_by: Option<DateTime<Utc>>,
}

//--------------------------------------    PayeeEarnings     --------------------------------------------------------
/// Ledger-side earnings summary for a payee. This reports gross commitments only; payout timing lives with the
/// processor and is reported best-effort by the dashboard collaborator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PayeeEarnings {
    pub payee_id: String,
    pub settled_gross: MinorUnits,
    pub settled_payee_amount: MinorUnits,
    pub pending_payee_amount: MinorUnits,
    pub refunded_amount: MinorUnits,
    pub disputed_gross: MinorUnits,
    pub purchase_count: i64,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn purchase_status_round_trips_through_strings() {
        for status in [
            PurchaseStatus::Pending,
            PurchaseStatus::Completed,
            PurchaseStatus::Refunded,
            PurchaseStatus::PartiallyRefunded,
            PurchaseStatus::Disputed,
            PurchaseStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<PurchaseStatus>().unwrap(), status);
        }
        assert!("paid".parse::<PurchaseStatus>().is_err());
    }

    #[test]
    fn dispute_terminal_states() {
        assert!(DisputeStatus::Won.is_terminal());
        assert!(DisputeStatus::Lost.is_terminal());
        assert!(!DisputeStatus::NeedsResponse.is_terminal());
        assert!(!DisputeStatus::WarningUnderReview.is_terminal());
    }

    #[test]
    fn verification_follows_processor_capabilities() {
        let mut account = ProcessorAccount {
            id: "acct_1".to_string(),
            email: None,
            country: "US".to_string(),
            account_type: "express".to_string(),
            charges_enabled: true,
            payouts_enabled: true,
            details_submitted: true,
            disabled_reason: None,
        };
        let update = PayeeStateUpdate::from(&account);
        assert_eq!(update.verification_status, VerificationStatus::Verified);
        assert!(update.charges_enabled && update.payouts_enabled);

        account.payouts_enabled = false;
        account.disabled_reason = Some("requirements.pending_verification".to_string());
        assert_eq!(PayeeStateUpdate::from(&account).verification_status, VerificationStatus::Pending);

        account.disabled_reason = Some("rejected.fraud".to_string());
        assert_eq!(PayeeStateUpdate::from(&account).verification_status, VerificationStatus::Rejected);
    }
}
