use crate::customer::{Customer, CustomerDraft, CustomerPatch};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Customer not found")]
    NotFound,
    #[error("Customer with document {0} already exists")]
    DuplicateDocument(String),
    #[error("Customer with email {0} already exists")]
    DuplicateEmail(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Row store for customer records.
///
/// Implementations provide the primitives; `create` and `update` layer the
/// document/email uniqueness rules on top of them. The lookups in `create`
/// are advisory; `insert` itself must reject an existing document.
pub trait CustomerStore: Send + Sync {
    fn find_by_id(&self, document: &str) -> Result<Option<Customer>, StoreError>;
    fn find_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError>;
    /// Insert-only write; an existing document is a conflict.
    fn insert(&self, customer: &Customer) -> Result<(), StoreError>;
    fn upsert(&self, customer: &Customer) -> Result<(), StoreError>;
    /// Returns `false` when no row matched.
    fn delete(&self, document: &str) -> Result<bool, StoreError>;
    fn list(&self, skip: usize, limit: usize) -> Result<Vec<Customer>, StoreError>;
    fn ping(&self) -> Result<(), StoreError>;
    fn now_millis(&self) -> u64;

    fn create(&self, draft: CustomerDraft) -> Result<Customer, StoreError> {
        if self.find_by_id(&draft.document)?.is_some() {
            return Err(StoreError::DuplicateDocument(draft.document));
        }
        if self.find_by_email(&draft.email)?.is_some() {
            return Err(StoreError::DuplicateEmail(draft.email));
        }
        let customer = Customer::from_draft(draft, self.now_millis());
        self.insert(&customer)?;
        Ok(customer)
    }

    fn update(&self, document: &str, patch: CustomerPatch) -> Result<Customer, StoreError> {
        let mut customer = self.find_by_id(document)?.ok_or(StoreError::NotFound)?;

        if let Some(email) = patch.email.as_deref() {
            if email != customer.email {
                if let Some(other) = self.find_by_email(email)? {
                    if other.document != document {
                        return Err(StoreError::DuplicateEmail(email.to_string()));
                    }
                }
            }
        }

        customer.apply(patch, self.now_millis());
        self.upsert(&customer)?;
        Ok(customer)
    }
}
