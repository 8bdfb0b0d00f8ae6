use chrono::{NaiveDate, Utc};
use roadbuddy_core::payment::PaymentMethodType;
use roadbuddy_core::repository::PaymentMethodRepository;
use roadbuddy_core::{KeyedLocks, PaymentMethod};
use roadbuddy_shared::Masked;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct NewPaymentMethod {
    pub method_type: PaymentMethodType,
    /// Card number, wallet handle or account number; only the last four
    /// characters are kept.
    pub identifier: Masked<String>,
    pub expiry: Option<NaiveDate>,
    /// Provider token used for charges.
    pub token: Masked<String>,
    #[serde(default)]
    pub make_default: bool,
}

/// A rider's stored payment methods.
///
/// A user with any methods has exactly one default. Changes for one user
/// are serialized.
pub struct Wallet {
    methods: Arc<dyn PaymentMethodRepository>,
    locks: KeyedLocks<String>,
}

impl Wallet {
    pub fn new(methods: Arc<dyn PaymentMethodRepository>) -> Self {
        Self {
            methods,
            locks: KeyedLocks::new(),
        }
    }

    pub async fn list_methods(&self, user_id: &str) -> Result<Vec<PaymentMethod>, WalletError> {
        self.methods.list_methods(user_id).await.map_err(store_err)
    }

    pub async fn default_method(&self, user_id: &str) -> Result<Option<PaymentMethod>, WalletError> {
        Ok(self.list_methods(user_id).await?.into_iter().find(|m| m.is_default))
    }

    pub async fn add_method(&self, user_id: &str, new: NewPaymentMethod) -> Result<PaymentMethod, WalletError> {
        let last_four = last_four(new.identifier.expose()).ok_or(WalletError::InvalidIdentifier)?;
        if new.token.expose().trim().is_empty() {
            return Err(WalletError::MissingToken);
        }
        if let Some(expiry) = new.expiry {
            if expiry < Utc::now().date_naive() {
                return Err(WalletError::Expired(expiry));
            }
        }

        let _guard = self.locks.lock(&user_id.to_string()).await;
        let mut methods = self.list_methods(user_id).await?;

        let make_default = new.make_default || methods.is_empty();
        if make_default {
            for m in methods.iter_mut() {
                m.is_default = false;
            }
        }

        let method = PaymentMethod {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            method_type: new.method_type,
            masked_identifier: format!("•••• {}", last_four),
            expiry: new.expiry,
            is_default: make_default,
            token: new.token,
            created_at: Utc::now(),
        };
        methods.push(method.clone());
        self.methods.replace_methods(user_id, &methods).await.map_err(store_err)?;

        info!("Added {} {} for {}", method.method_type.as_str(), method.masked_identifier, user_id);
        Ok(method)
    }

    pub async fn set_default(&self, user_id: &str, method_id: Uuid) -> Result<PaymentMethod, WalletError> {
        let _guard = self.locks.lock(&user_id.to_string()).await;
        let mut methods = self.list_methods(user_id).await?;

        if !methods.iter().any(|m| m.id == method_id) {
            return Err(WalletError::NotFound(method_id));
        }
        for m in methods.iter_mut() {
            m.is_default = m.id == method_id;
        }
        self.methods.replace_methods(user_id, &methods).await.map_err(store_err)?;

        methods
            .into_iter()
            .find(|m| m.id == method_id)
            .ok_or(WalletError::NotFound(method_id))
    }

    /// Remove a method. Removing the default promotes the most recently
    /// added remaining method.
    pub async fn remove_method(&self, user_id: &str, method_id: Uuid) -> Result<(), WalletError> {
        let _guard = self.locks.lock(&user_id.to_string()).await;
        let mut methods = self.list_methods(user_id).await?;

        let position = methods
            .iter()
            .position(|m| m.id == method_id)
            .ok_or(WalletError::NotFound(method_id))?;
        let removed = methods.remove(position);

        if removed.is_default {
            if let Some(next) = methods.iter_mut().max_by_key(|m| m.created_at) {
                next.is_default = true;
            }
        }
        self.methods.replace_methods(user_id, &methods).await.map_err(store_err)?;

        info!("Removed payment method {} for {}", method_id, user_id);
        Ok(())
    }
}

fn last_four(identifier: &str) -> Option<String> {
    let chars: Vec<char> = identifier.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if chars.len() < 4 {
        return None;
    }
    Some(chars[chars.len() - 4..].iter().collect())
}

fn store_err(e: roadbuddy_core::repository::StoreError) -> WalletError {
    WalletError::Store(e.to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("Payment method not found: {0}")]
    NotFound(Uuid),

    #[error("Identifier must contain at least four letters or digits")]
    InvalidIdentifier,

    #[error("Provider token is required")]
    MissingToken,

    #[error("Payment method expired on {0}")]
    Expired(NaiveDate),

    #[error("Wallet store failure: {0}")]
    Store(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use roadbuddy_store::memory::InMemoryPaymentMethodRepository;

    fn wallet() -> Wallet {
        Wallet::new(Arc::new(InMemoryPaymentMethodRepository::new()))
    }

    fn visa(number: &str) -> NewPaymentMethod {
        NewPaymentMethod {
            method_type: PaymentMethodType::Card,
            identifier: Masked(number.to_string()),
            expiry: None,
            token: Masked(format!("tok_{}", number)),
            make_default: false,
        }
    }

    async fn defaults(wallet: &Wallet, user: &str) -> Vec<Uuid> {
        wallet
            .list_methods(user)
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.is_default)
            .map(|m| m.id)
            .collect()
    }

    #[tokio::test]
    async fn test_first_method_becomes_default() {
        let wallet = wallet();
        let first = wallet.add_method("rider-1", visa("4242 4242 4242 4242")).await.unwrap();
        let second = wallet.add_method("rider-1", visa("5555 5555 5555 4444")).await.unwrap();

        assert!(first.is_default);
        assert!(!second.is_default);
        assert_eq!(first.masked_identifier, "•••• 4242");
        assert_eq!(defaults(&wallet, "rider-1").await, vec![first.id]);
    }

    #[tokio::test]
    async fn test_set_default_keeps_a_single_default() {
        let wallet = wallet();
        let first = wallet.add_method("rider-1", visa("4242424242424242")).await.unwrap();
        let second = wallet.add_method("rider-1", visa("5555555555554444")).await.unwrap();

        wallet.set_default("rider-1", second.id).await.unwrap();
        assert_eq!(defaults(&wallet, "rider-1").await, vec![second.id]);

        let mut third = visa("378282246310005");
        third.make_default = true;
        let third = wallet.add_method("rider-1", third).await.unwrap();
        assert_eq!(defaults(&wallet, "rider-1").await, vec![third.id]);

        assert!(matches!(
            wallet.set_default("rider-2", first.id).await,
            Err(WalletError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_removing_default_promotes_most_recent() {
        let wallet = wallet();
        let first = wallet.add_method("rider-1", visa("4242424242424242")).await.unwrap();
        let _second = wallet.add_method("rider-1", visa("5555555555554444")).await.unwrap();
        let third = wallet.add_method("rider-1", visa("378282246310005")).await.unwrap();

        wallet.remove_method("rider-1", first.id).await.unwrap();
        assert_eq!(defaults(&wallet, "rider-1").await, vec![third.id]);

        wallet.remove_method("rider-1", third.id).await.unwrap();
        assert_eq!(defaults(&wallet, "rider-1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let wallet = wallet();
        assert!(matches!(
            wallet.add_method("rider-1", visa("12")).await,
            Err(WalletError::InvalidIdentifier)
        ));

        let mut expired = visa("4242424242424242");
        expired.expiry = NaiveDate::from_ymd_opt(2001, 1, 31);
        assert!(matches!(wallet.add_method("rider-1", expired).await, Err(WalletError::Expired(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_keep_one_default() {
        let wallet = Arc::new(wallet());
        let mut handles = Vec::new();
        for i in 0..10 {
            let wallet = wallet.clone();
            handles.push(tokio::spawn(async move {
                let mut method = visa(&format!("4000 0000 0000 {:04}", i));
                method.make_default = i % 3 == 0;
                wallet.add_method("rider-1", method).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(wallet.list_methods("rider-1").await.unwrap().len(), 10);
        assert_eq!(defaults(&wallet, "rider-1").await.len(), 1);
    }
}
