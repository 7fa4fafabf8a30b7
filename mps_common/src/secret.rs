//! Log-safe wrapper for the credentials this service carries around: the processor's API key and the webhook
//! signing secret.

use std::{
    fmt,
    fmt::{Debug, Display},
};

/// Holds a credential that must never appear in logs or error strings.
///
/// Both the `ProcessorConfig` (API key) and the webhook reconciler (signing secret) keep their material in a
/// `Secret`, so a `{:?}` dump of a config struct or a formatted error is always safe to ship to a log aggregator.
/// The value is only obtainable through [`Secret::reveal`], which keeps accidental leaks greppable.
#[derive(Clone, Default)]
pub struct Secret<T>
where T: Clone + Default
{
    value: T,
}

impl<T: Clone + Default> Secret<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    /// Hand out the underlying credential, e.g. to sign a request or verify a webhook signature.
    pub fn reveal(&self) -> &T {
        &self.value
    }
}

impl<T: Clone + Default> Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl<T: Clone + Default> Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}
