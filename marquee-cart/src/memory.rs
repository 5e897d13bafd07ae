use async_trait::async_trait;
use marquee_core::CoreResult;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Cart, CartStatus};
use crate::repository::CartRepository;

/// Carts kept in process memory, keyed by user.
#[derive(Default)]
pub struct InMemoryCartRepository {
    carts: RwLock<HashMap<String, Cart>>,
}

impl InMemoryCartRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartRepository for InMemoryCartRepository {
    async fn get_cart(&self, user_id: &str) -> CoreResult<Option<Cart>> {
        Ok(self.carts.read().await.get(user_id).cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> CoreResult<()> {
        self.carts
            .write()
            .await
            .insert(cart.user_id.clone(), cart.clone());
        Ok(())
    }

    async fn delete_cart(&self, user_id: &str, cart_id: Uuid) -> CoreResult<bool> {
        let mut carts = self.carts.write().await;
        match carts.get(user_id) {
            Some(cart) if cart.id == cart_id => {
                carts.remove(user_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_checking_out(&self) -> CoreResult<Vec<Cart>> {
        let mut carts: Vec<Cart> = self
            .carts
            .read()
            .await
            .values()
            .filter(|c| c.status == CartStatus::CheckingOut)
            .cloned()
            .collect();
        carts.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(carts)
    }
}
