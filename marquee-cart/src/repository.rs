use async_trait::async_trait;
use marquee_core::CoreResult;
use uuid::Uuid;

use crate::models::Cart;

/// Where carts live between requests. One cart per user.
#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn get_cart(&self, user_id: &str) -> CoreResult<Option<Cart>>;

    /// Insert the cart or replace the stored one, lines included.
    async fn save_cart(&self, cart: &Cart) -> CoreResult<()>;

    /// Delete the user's cart if it is still `cart_id`. Returns whether it was.
    async fn delete_cart(&self, user_id: &str, cart_id: Uuid) -> CoreResult<bool>;

    /// Carts left in `checking_out`, e.g. by a process that stopped mid-checkout.
    async fn list_checking_out(&self) -> CoreResult<Vec<Cart>>;
}
