//! Address book trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{AddressId, UserId};
use domain::AddressSnapshot;
use tokio::sync::RwLock;

use crate::error::ServiceError;

/// Resolves a customer's saved address into a snapshot.
#[async_trait]
pub trait AddressBook: Send + Sync {
    /// Returns None if the address does not exist or belongs to someone else.
    async fn resolve(
        &self,
        customer_id: UserId,
        address_id: AddressId,
    ) -> Result<Option<AddressSnapshot>, ServiceError>;
}

/// In-memory address book for testing and database-less runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAddressBook {
    addresses: Arc<RwLock<HashMap<AddressId, (UserId, AddressSnapshot)>>>,
}

impl InMemoryAddressBook {
    /// Creates a new empty address book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Saves an address for a customer and returns its id.
    pub async fn add(&self, customer_id: UserId, address: AddressSnapshot) -> AddressId {
        let id = AddressId::new();
        self.addresses
            .write()
            .await
            .insert(id, (customer_id, address));
        id
    }

    /// Saves an address under a known id, replacing any entry with that id.
    pub async fn insert(&self, id: AddressId, customer_id: UserId, address: AddressSnapshot) {
        self.addresses
            .write()
            .await
            .insert(id, (customer_id, address));
    }

    /// Deletes an address. Orders keep their snapshot.
    pub async fn remove(&self, address_id: AddressId) {
        self.addresses.write().await.remove(&address_id);
    }
}

#[async_trait]
impl AddressBook for InMemoryAddressBook {
    async fn resolve(
        &self,
        customer_id: UserId,
        address_id: AddressId,
    ) -> Result<Option<AddressSnapshot>, ServiceError> {
        Ok(self
            .addresses
            .read()
            .await
            .get(&address_id)
            .filter(|(owner, _)| *owner == customer_id)
            .map(|(_, address)| address.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> AddressSnapshot {
        AddressSnapshot {
            recipient_name: "María".to_string(),
            phone: "3151234567".to_string(),
            street: "Calle 50 # 40-10".to_string(),
            city: "Barranquilla".to_string(),
            region: "Atlántico".to_string(),
            postal_code: None,
            country: "CO".to_string(),
            notes: Some("Portería".to_string()),
        }
    }

    #[tokio::test]
    async fn test_resolve_own_address() {
        let book = InMemoryAddressBook::new();
        let customer = UserId::new();
        let id = book.add(customer, address()).await;

        let snapshot = book.resolve(customer, id).await.unwrap().unwrap();
        assert_eq!(snapshot.city, "Barranquilla");
    }

    #[tokio::test]
    async fn test_other_customers_address_is_not_found() {
        let book = InMemoryAddressBook::new();
        let id = book.add(UserId::new(), address()).await;
        assert!(book.resolve(UserId::new(), id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_keeps_given_id() {
        let book = InMemoryAddressBook::new();
        let customer = UserId::new();
        let id = AddressId::new();
        book.insert(id, customer, address()).await;

        let snapshot = book.resolve(customer, id).await.unwrap().unwrap();
        assert_eq!(snapshot.notes.as_deref(), Some("Portería"));
    }
}
