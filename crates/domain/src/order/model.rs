//! Orders, their line items and the input for placing one.

use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};

use super::{OrderError, OrderStatus};
use crate::error::DomainError;
use crate::inventory::{InventoryError, Product, StockRequest, consolidate_requests};
use crate::Money;

/// Longest idempotency key accepted from callers.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// A line of an order.
///
/// `product_name` and `unit_price` are snapshots taken when the order was
/// placed; later catalog changes never touch them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: common::ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderItem {
    /// Captures the product's current name and price for `quantity` units.
    pub fn snapshot(product: &Product, quantity: u32) -> Self {
        Self {
            product_id: product.id,
            product_name: product.name.clone(),
            quantity,
            unit_price: product.price,
        }
    }

    /// `quantity * unit_price`, or `None` if it does not fit.
    pub fn checked_total(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }

    /// Line total, saturating at [`Money::MAX`].
    pub fn total_price(&self) -> Money {
        self.checked_total().unwrap_or(Money::MAX)
    }
}

/// An order with its items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Sum of all line totals, or `None` if it does not fit.
    pub fn checked_total(&self) -> Option<Money> {
        self.items
            .iter()
            .try_fold(Money::ZERO, |acc, item| acc.checked_add(item.checked_total()?))
    }

    /// Order total, saturating at [`Money::MAX`]. `NewOrder::into_order`
    /// refuses orders whose total does not fit, so stored orders never
    /// saturate.
    pub fn total_amount(&self) -> Money {
        self.checked_total().unwrap_or(Money::MAX)
    }

    /// Total number of units across all items.
    pub fn unit_count(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }

    /// The quantities a cancellation has to give back to the ledger.
    pub fn restock_requests(&self) -> Vec<StockRequest> {
        self.items
            .iter()
            .map(|item| StockRequest::new(item.product_id, item.quantity))
            .collect()
    }
}

/// Input for placing an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<StockRequest>,
    pub idempotency_key: Option<String>,
}

impl NewOrder {
    pub fn new(user_id: UserId, items: Vec<StockRequest>) -> Self {
        Self {
            user_id,
            items,
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.items.is_empty() {
            return Err(OrderError::NoItems.into());
        }
        if let Some(bad) = self.items.iter().find(|i| i.quantity == 0) {
            return Err(InventoryError::InvalidQuantity {
                quantity: i64::from(bad.quantity),
            }
            .into());
        }
        if let Some(key) = &self.idempotency_key
            && (key.trim().is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN)
        {
            return Err(OrderError::InvalidIdempotencyKey.into());
        }
        Ok(())
    }

    /// Builds the order row for products that have already passed reservation
    /// planning. `products` must contain every requested product.
    ///
    /// Fails with `OrderError::TotalOverflow` when the order total does not
    /// fit in `Money`; stores call this before committing, so such an order
    /// changes nothing.
    pub fn into_order(
        self,
        id: OrderId,
        products: &[Product],
        now: DateTime<Utc>,
    ) -> Result<Order, DomainError> {
        let items = consolidate_requests(&self.items)?
            .into_iter()
            .map(|request| {
                products
                    .iter()
                    .find(|p| p.id == request.product_id)
                    .map(|p| OrderItem::snapshot(p, request.quantity))
                    .ok_or_else(|| InventoryError::ProductsNotFound(vec![request.product_id]))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let order = Order {
            id,
            user_id: self.user_id,
            status: OrderStatus::Pending,
            items,
            created_at: now,
            updated_at: now,
        };
        if order.checked_total().is_none() {
            return Err(OrderError::TotalOverflow.into());
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use common::ProductId;

    use super::*;
    use crate::NewProduct;

    #[test]
    fn test_order_totals() {
        let widget =
            NewProduct::new("W", "Widget", Money::from_cents(1000), 10).into_product(Utc::now());
        let gadget =
            NewProduct::new("G", "Gadget", Money::from_cents(250), 10).into_product(Utc::now());
        let order = NewOrder::new(
            UserId::new(),
            vec![
                StockRequest::new(widget.id, 2),
                StockRequest::new(gadget.id, 3),
            ],
        )
        .into_order(OrderId::new(), &[widget, gadget], Utc::now())
        .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount(), Money::from_cents(2750));
        assert_eq!(order.unit_count(), 5);
    }

    #[test]
    fn test_items_snapshot_price_and_name() {
        let mut widget =
            NewProduct::new("W", "Widget", Money::from_cents(1000), 10).into_product(Utc::now());
        let order = NewOrder::new(UserId::new(), vec![StockRequest::new(widget.id, 1)])
            .into_order(OrderId::new(), std::slice::from_ref(&widget), Utc::now())
            .unwrap();

        widget.price = Money::from_cents(1500);
        widget.name = "Widget v2".to_string();

        assert_eq!(order.items[0].unit_price, Money::from_cents(1000));
        assert_eq!(order.items[0].product_name, "Widget");
    }

    #[test]
    fn test_total_overflow_is_rejected() {
        let pricey = NewProduct::new("P", "Pricey", Money::from_cents(i64::MAX / 2), 10)
            .into_product(Utc::now());
        let result = NewOrder::new(UserId::new(), vec![StockRequest::new(pricey.id, 3)])
            .into_order(OrderId::new(), std::slice::from_ref(&pricey), Utc::now());

        assert_eq!(result, Err(DomainError::Order(OrderError::TotalOverflow)));
    }

    #[test]
    fn test_total_amount_saturates_instead_of_panicking() {
        let order = Order {
            id: OrderId::new(),
            user_id: UserId::new(),
            status: OrderStatus::Pending,
            items: vec![OrderItem {
                product_id: ProductId::new(),
                product_name: "Pricey".to_string(),
                quantity: 3,
                unit_price: Money::from_cents(i64::MAX / 2),
            }],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(order.checked_total(), None);
        assert_eq!(order.total_amount(), Money::MAX);
    }

    #[test]
    fn test_validate_rejects_empty_and_zero_quantity() {
        let empty = NewOrder::new(UserId::new(), vec![]);
        assert!(matches!(
            empty.validate(),
            Err(DomainError::Order(OrderError::NoItems))
        ));

        let zero = NewOrder::new(UserId::new(), vec![StockRequest::new(ProductId::new(), 0)]);
        assert!(matches!(
            zero.validate(),
            Err(DomainError::Inventory(InventoryError::InvalidQuantity { quantity: 0 }))
        ));
    }

    #[test]
    fn test_validate_rejects_blank_idempotency_key() {
        let order = NewOrder::new(UserId::new(), vec![StockRequest::new(ProductId::new(), 1)])
            .with_idempotency_key("   ");
        assert!(matches!(
            order.validate(),
            Err(DomainError::Order(OrderError::InvalidIdempotencyKey))
        ));
    }

    #[test]
    fn test_restock_requests_mirror_items() {
        let product_id = ProductId::new();
        let order = Order {
            id: OrderId::new(),
            user_id: UserId::new(),
            status: OrderStatus::Pending,
            items: vec![OrderItem {
                product_id,
                product_name: "Widget".to_string(),
                quantity: 4,
                unit_price: Money::from_cents(100),
            }],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(
            order.restock_requests(),
            vec![StockRequest::new(product_id, 4)]
        );
    }
}
