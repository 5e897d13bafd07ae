use std::sync::Arc;

use marquee_catalog::{InventoryError, InventoryLedger, Reservation};
use marquee_core::{CoreError, KeyedLocks};
use tracing::{info, warn};
use uuid::Uuid;

use crate::memory::InMemoryCartRepository;
use crate::models::{Cart, CartLine, CartSnapshot, CartStatus, SnapshotLine};
use crate::repository::CartRepository;

/// Owns every user's cart and turns a cart into seat reservations at checkout.
///
/// Changes to one user's cart are serialized; the stored cart is re-read under
/// that lock before every edit.
pub struct CartManager {
    repo: Arc<dyn CartRepository>,
    ledger: Arc<InventoryLedger>,
    user_locks: KeyedLocks<String>,
}

impl CartManager {
    pub fn new(repo: Arc<dyn CartRepository>, ledger: Arc<InventoryLedger>) -> Self {
        Self {
            repo,
            ledger,
            user_locks: KeyedLocks::new(),
        }
    }

    pub fn in_memory(ledger: Arc<InventoryLedger>) -> Self {
        Self::new(Arc::new(InMemoryCartRepository::new()), ledger)
    }

    pub fn ledger(&self) -> &Arc<InventoryLedger> {
        &self.ledger
    }

    async fn load(&self, user_id: &str) -> Result<Cart, CartError> {
        self.repo
            .get_cart(user_id)
            .await?
            .ok_or_else(|| CartError::CartNotFound(user_id.to_string()))
    }

    /// Add a showing to the user's cart, creating the cart on first use.
    pub async fn add_item(
        &self,
        user_id: &str,
        showing_id: Uuid,
        quantity: u32,
    ) -> Result<Cart, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity(quantity));
        }
        if !self.ledger.is_registered(showing_id).await {
            return Err(CartError::ShowingNotFound(showing_id));
        }

        let _guard = self.user_locks.lock(&user_id.to_string()).await;
        let now = self.ledger.now();
        let mut cart = match self.repo.get_cart(user_id).await? {
            Some(cart) => cart,
            None => Cart::new(user_id.to_string(), now),
        };

        if cart.status == CartStatus::CheckingOut {
            return Err(CartError::CartLocked);
        }
        if cart.line(showing_id).is_some() {
            return Err(CartError::AlreadyInCart(showing_id));
        }

        cart.lines.push(CartLine { showing_id, quantity, added_at: now });
        cart.updated_at = now;
        self.repo.save_cart(&cart).await?;
        Ok(cart)
    }

    pub async fn remove_item(&self, user_id: &str, showing_id: Uuid) -> Result<Cart, CartError> {
        let _guard = self.user_locks.lock(&user_id.to_string()).await;
        let mut cart = self.load(user_id).await?;

        if cart.status == CartStatus::CheckingOut {
            return Err(CartError::CartLocked);
        }

        let before = cart.lines.len();
        cart.lines.retain(|l| l.showing_id != showing_id);
        if cart.lines.len() == before {
            return Err(CartError::NotInCart(showing_id));
        }
        cart.updated_at = self.ledger.now();
        self.repo.save_cart(&cart).await?;
        Ok(cart)
    }

    pub async fn get(&self, user_id: &str) -> Result<Cart, CartError> {
        self.load(user_id).await
    }

    /// Drop the cart. Nothing is held while a cart is open, so no seats move.
    pub async fn abandon(&self, user_id: &str) -> Result<(), CartError> {
        let _guard = self.user_locks.lock(&user_id.to_string()).await;
        let cart = self.load(user_id).await?;
        if cart.status == CartStatus::CheckingOut {
            return Err(CartError::CartLocked);
        }
        self.repo.delete_cart(user_id, cart.id).await?;
        info!("Cart abandoned by {}", user_id);
        Ok(())
    }

    /// Reserve seats for every line. Either every line is held or none is.
    ///
    /// On success the cart stays locked until `complete_checkout` or
    /// `cancel_checkout` is called for it.
    pub async fn checkout(&self, user_id: &str) -> Result<CartSnapshot, CartError> {
        let (cart_id, lines) = {
            let _guard = self.user_locks.lock(&user_id.to_string()).await;
            let mut cart = self.load(user_id).await?;

            if cart.status == CartStatus::CheckingOut {
                return Err(CartError::CheckoutInProgress);
            }
            if cart.is_empty() {
                return Err(CartError::EmptyCart);
            }
            cart.status = CartStatus::CheckingOut;
            cart.updated_at = self.ledger.now();
            self.repo.save_cart(&cart).await?;
            (cart.id, cart.lines)
        };

        let mut held: Vec<SnapshotLine> = Vec::with_capacity(lines.len());
        for line in &lines {
            match self.ledger.reserve(line.showing_id, line.quantity).await {
                Ok(reservation) => held.push(SnapshotLine {
                    showing_id: line.showing_id,
                    quantity: line.quantity,
                    reservation,
                }),
                Err(e) => {
                    warn!(
                        cart_id = %cart_id,
                        showing_id = %line.showing_id,
                        "Checkout failed, releasing {} earlier holds: {}",
                        held.len(),
                        e
                    );
                    self.release_all(held.iter().map(|l| &l.reservation)).await;
                    self.unlock(user_id, cart_id).await;
                    return Err(CartError::Inventory(e));
                }
            }
        }

        info!(cart_id = %cart_id, "Checkout reserved seats on {} showings", held.len());
        Ok(CartSnapshot {
            cart_id,
            user_id: user_id.to_string(),
            lines: held,
            taken_at: self.ledger.now(),
        })
    }

    /// The order exists; the cart is gone.
    pub async fn complete_checkout(&self, user_id: &str, cart_id: Uuid) -> Result<(), CartError> {
        let _guard = self.user_locks.lock(&user_id.to_string()).await;
        if self.repo.delete_cart(user_id, cart_id).await? {
            Ok(())
        } else {
            Err(CartError::CartNotFound(user_id.to_string()))
        }
    }

    /// Give back the snapshot's seats and reopen the cart for edits.
    pub async fn cancel_checkout(&self, snapshot: &CartSnapshot) {
        self.release_all(snapshot.reservations()).await;
        self.unlock(&snapshot.user_id, snapshot.cart_id).await;
    }

    /// Carts stuck in checkout. Only meaningful before any checkout runs,
    /// i.e. right after startup.
    pub async fn stale_checkouts(&self) -> Result<Vec<Cart>, CartError> {
        Ok(self.repo.list_checking_out().await?)
    }

    /// Make `cart_id` editable again. No-op if the user's cart is another one.
    pub async fn reopen(&self, user_id: &str, cart_id: Uuid) -> Result<(), CartError> {
        let _guard = self.user_locks.lock(&user_id.to_string()).await;
        if let Some(mut cart) = self.repo.get_cart(user_id).await? {
            if cart.id == cart_id && cart.status == CartStatus::CheckingOut {
                cart.status = CartStatus::Open;
                cart.updated_at = self.ledger.now();
                self.repo.save_cart(&cart).await?;
            }
        }
        Ok(())
    }

    async fn release_all<'a>(&self, reservations: impl Iterator<Item = &'a Reservation>) {
        for reservation in reservations {
            if let Err(e) = self.ledger.release(reservation.id).await {
                warn!(reservation_id = %reservation.id, "Failed to release hold: {}", e);
            }
        }
    }

    async fn unlock(&self, user_id: &str, cart_id: Uuid) {
        if let Err(e) = self.reopen(user_id, cart_id).await {
            warn!(cart_id = %cart_id, "Could not reopen cart: {}", e);
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CartError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("No cart for user {0}")]
    CartNotFound(String),

    #[error("Showing {0} is already in the cart")]
    AlreadyInCart(Uuid),

    #[error("Showing {0} is not in the cart")]
    NotInCart(Uuid),

    #[error("Cart is locked while checkout is in progress")]
    CartLocked,

    #[error("Checkout already in progress")]
    CheckoutInProgress,

    #[error("Showing not found: {0}")]
    ShowingNotFound(Uuid),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(u32),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Storage(#[from] CoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_catalog::LedgerConfig;
    use marquee_core::ManualClock;

    async fn setup(capacities: &[u32]) -> (Arc<CartManager>, Vec<Uuid>) {
        let ledger = Arc::new(InventoryLedger::new(
            LedgerConfig::default(),
            Arc::new(ManualClock::default()),
        ));
        let mut showings = Vec::new();
        for capacity in capacities {
            let id = Uuid::new_v4();
            ledger.register_showing(id, *capacity, 0).await.unwrap();
            showings.push(id);
        }
        (Arc::new(CartManager::in_memory(ledger)), showings)
    }

    #[tokio::test]
    async fn test_add_and_remove_items() {
        let (carts, showings) = setup(&[10, 10]).await;

        carts.add_item("alice", showings[0], 2).await.unwrap();
        let cart = carts.add_item("alice", showings[1], 1).await.unwrap();
        assert_eq!(cart.total_seats(), 3);

        assert!(matches!(
            carts.add_item("alice", showings[0], 1).await,
            Err(CartError::AlreadyInCart(_))
        ));
        assert!(matches!(
            carts.add_item("alice", Uuid::new_v4(), 1).await,
            Err(CartError::ShowingNotFound(_))
        ));
        assert!(matches!(
            carts.add_item("alice", showings[0], 0).await,
            Err(CartError::InvalidQuantity(0))
        ));

        let cart = carts.remove_item("alice", showings[0]).await.unwrap();
        assert_eq!(cart.lines.len(), 1);
        assert!(matches!(
            carts.remove_item("alice", showings[0]).await,
            Err(CartError::NotInCart(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_checkout_leaves_no_holds() {
        let (carts, showings) = setup(&[5, 1]).await;
        carts.add_item("bob", showings[0], 3).await.unwrap();
        carts.add_item("bob", showings[1], 2).await.unwrap();

        let result = carts.checkout("bob").await;
        assert!(matches!(
            result,
            Err(CartError::Inventory(InventoryError::CapacityExceeded { .. }))
        ));

        let first = carts.ledger().availability(showings[0]).await.unwrap();
        let second = carts.ledger().availability(showings[1]).await.unwrap();
        assert_eq!(first.held, 0);
        assert_eq!(second.held, 0);

        // cart is editable again
        assert_eq!(carts.get("bob").await.unwrap().status, CartStatus::Open);
        carts.remove_item("bob", showings[1]).await.unwrap();
    }

    #[tokio::test]
    async fn test_checkout_locks_cart() {
        let (carts, showings) = setup(&[10]).await;
        carts.add_item("carol", showings[0], 2).await.unwrap();

        let snapshot = carts.checkout("carol").await.unwrap();
        assert_eq!(snapshot.lines.len(), 1);
        assert_eq!(carts.ledger().availability(showings[0]).await.unwrap().held, 2);

        assert!(matches!(carts.checkout("carol").await, Err(CartError::CheckoutInProgress)));
        assert!(matches!(carts.abandon("carol").await, Err(CartError::CartLocked)));
        assert!(matches!(
            carts.remove_item("carol", showings[0]).await,
            Err(CartError::CartLocked)
        ));

        carts.cancel_checkout(&snapshot).await;
        assert_eq!(carts.ledger().availability(showings[0]).await.unwrap().held, 0);
        carts.abandon("carol").await.unwrap();
        assert!(matches!(carts.get("carol").await, Err(CartError::CartNotFound(_))));
    }

    #[tokio::test]
    async fn test_complete_checkout_destroys_cart() {
        let (carts, showings) = setup(&[10]).await;
        carts.add_item("dave", showings[0], 1).await.unwrap();
        assert!(matches!(carts.checkout("erin").await, Err(CartError::CartNotFound(_))));

        let snapshot = carts.checkout("dave").await.unwrap();
        carts.complete_checkout("dave", snapshot.cart_id).await.unwrap();
        assert!(carts.get("dave").await.is_err());

        // a fresh cart starts empty
        carts.add_item("dave", showings[0], 1).await.unwrap();
        carts.remove_item("dave", showings[0]).await.unwrap();
        assert!(matches!(carts.checkout("dave").await, Err(CartError::EmptyCart)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checkouts_of_one_cart() {
        let (carts, showings) = setup(&[10]).await;
        carts.add_item("frank", showings[0], 4).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let carts = carts.clone();
            handles.push(tokio::spawn(async move { carts.checkout("frank").await }));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(CartError::CheckoutInProgress) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(succeeded, 1);
        assert_eq!(carts.ledger().availability(showings[0]).await.unwrap().held, 4);
    }

    #[tokio::test]
    async fn test_carts_outlive_the_manager() {
        let ledger = Arc::new(InventoryLedger::new(
            LedgerConfig::default(),
            Arc::new(ManualClock::default()),
        ));
        let showing = Uuid::new_v4();
        ledger.register_showing(showing, 10, 0).await.unwrap();
        let repo: Arc<dyn CartRepository> = Arc::new(InMemoryCartRepository::new());

        let first = CartManager::new(repo.clone(), ledger.clone());
        first.add_item("gina", showing, 2).await.unwrap();
        first.checkout("gina").await.unwrap();
        drop(first);

        // a new process finds the cart stuck mid-checkout
        let second = CartManager::new(repo, ledger);
        let stale = second.stale_checkouts().await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].user_id, "gina");

        second.reopen("gina", stale[0].id).await.unwrap();
        let cart = second.get("gina").await.unwrap();
        assert_eq!(cart.status, CartStatus::Open);
        assert_eq!(cart.total_seats(), 2);
        assert!(second.stale_checkouts().await.unwrap().is_empty());
    }
}
