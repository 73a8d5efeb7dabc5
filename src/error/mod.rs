mod vault;

pub use vault::VaultError;

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}
