//! Helpers for integration tests: a scripted processor client and a throwaway migrated database.

pub mod mock_processor;

pub use mock_processor::MockProcessor;

#[cfg(feature = "sqlite")]
use crate::{
    db::sqlite::SqliteDatabase,
    db_types::{AccountType, NewPayeeAccount, PayeeAccount, PayeeStateUpdate, VerificationStatus},
    traits::PayeeAccountManagement,
};

/// A fresh, fully migrated database in a temp file. File-based rather than in-memory, because each pooled connection
/// to `sqlite::memory:` would get its own empty database.
#[cfg(feature = "sqlite")]
pub async fn prepare_test_db() -> SqliteDatabase {
    let path = std::env::temp_dir().join(format!("settlement_test_{:016x}.db", rand::random::<u64>()));
    let url = format!("sqlite://{}", path.display());
    SqliteDatabase::new_with_url(&url, 5).await.expect("test database should be creatable")
}

/// Insert a payee whose processor account is fully verified, so purchases against it pass the eligibility gate.
#[cfg(feature = "sqlite")]
pub async fn seed_verified_payee(db: &SqliteDatabase, owner_id: &str, processor_account_id: &str) -> PayeeAccount {
    let payee = NewPayeeAccount {
        owner_id: owner_id.to_string(),
        processor_account_id: processor_account_id.to_string(),
        account_type: AccountType::Express,
    };
    db.upsert_payee_account(payee).await.expect("payee insert should succeed");
    let update = PayeeStateUpdate {
        charges_enabled: true,
        payouts_enabled: true,
        details_submitted: true,
        verification_status: VerificationStatus::Verified,
    };
    db.update_payee_state(processor_account_id, update).await.expect("payee state update should succeed")
}
