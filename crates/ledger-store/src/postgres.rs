use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use common::{OrderId, ProductId, UserId};
use domain::inventory::{plan_adjustment, plan_reservation, plan_restock};
use domain::{
    Money, NewOrder, NewProduct, Order, OrderItem, OrderStatus, Product, ProductUpdate,
    StockChange, StockDelta, StockRequest,
};
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{LedgerStore, Placement},
};

/// Lock wait applied to every transaction unless configured otherwise.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

const SKU_CONSTRAINT: &str = "products_sku_key";
const IDEMPOTENCY_CONSTRAINT: &str = "orders_user_idempotency_key";

/// PostgreSQL-backed ledger store.
///
/// Stock mutations lock the affected product rows with `SELECT ... FOR UPDATE`
/// in ascending id order, plan the change on the locked rows and write it in
/// the same transaction. Order status changes lock the order row first.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresLedgerStore {
    /// Creates a new PostgreSQL ledger store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Sets how long a transaction waits for a row lock before failing with
    /// `StoreError::Conflict`.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    fn row_to_product(row: &PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            sku: row.try_get("sku")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price: Money::from_cents(row.try_get("price")?),
            stock: row.try_get("stock")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_item(row: &PgRow) -> Result<OrderItem> {
        let quantity: i64 = row.try_get("quantity")?;
        Ok(OrderItem {
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            product_name: row.try_get("product_name")?,
            quantity: u32::try_from(quantity)
                .map_err(|_| StoreError::Corrupt(format!("order item quantity {quantity}")))?,
            unit_price: Money::from_cents(row.try_get("price")?),
        })
    }

    fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
        let status: String = row.try_get("status")?;
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            status: status
                .parse()
                .map_err(|_| StoreError::Corrupt(format!("order status {status}")))?,
            items,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Locks the given product rows in ascending id order and returns the ones
    /// that exist.
    async fn lock_products(
        conn: &mut PgConnection,
        ids: impl IntoIterator<Item = ProductId>,
    ) -> Result<Vec<Product>> {
        let mut ids: Vec<Uuid> = ids.into_iter().map(|id| id.as_uuid()).collect();
        ids.sort_unstable();
        ids.dedup();

        let rows = sqlx::query(
            r#"
            SELECT id, sku, name, description, price, stock, created_at, updated_at
            FROM products
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await?;

        rows.iter().map(Self::row_to_product).collect()
    }

    async fn write_changes(
        conn: &mut PgConnection,
        changes: &[StockChange],
    ) -> Result<Vec<Product>> {
        let mut products = Vec::with_capacity(changes.len());
        for change in changes {
            let row = sqlx::query(
                r#"
                UPDATE products
                SET stock = $2, updated_at = NOW()
                WHERE id = $1
                RETURNING id, sku, name, description, price, stock, created_at, updated_at
                "#,
            )
            .bind(change.product_id.as_uuid())
            .bind(change.current)
            .fetch_one(&mut *conn)
            .await?;
            products.push(Self::row_to_product(&row)?);
        }
        Ok(products)
    }

    async fn load_items(conn: &mut PgConnection, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, product_name, quantity, price
            FROM order_items
            WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&mut *conn)
        .await?;

        rows.iter().map(Self::row_to_item).collect()
    }

    async fn load_order(conn: &mut PgConnection, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, status, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => {
                let items = Self::load_items(conn, id).await?;
                Ok(Some(Self::row_to_order(&row, items)?))
            }
            None => Ok(None),
        }
    }

    async fn insert_order(
        conn: &mut PgConnection,
        order: &Order,
        idempotency_key: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, status, idempotency_key, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.status.as_str())
        .bind(idempotency_key)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            // A concurrent call with the same key won the insert; the retry
            // will find and replay that order.
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(IDEMPOTENCY_CONSTRAINT)
            {
                return StoreError::Conflict(format!(
                    "idempotency key already used by a concurrent order for user {}",
                    order.user_id
                ));
            }
            StoreError::from(e)
        })?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, position, product_id, product_name, quantity, price)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(order.id.as_uuid())
            .bind(position as i32)
            .bind(item.product_id.as_uuid())
            .bind(&item.product_name)
            .bind(i64::from(item.quantity))
            .bind(item.unit_price.cents())
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    fn open_statuses() -> Vec<String> {
        OrderStatus::ALL
            .into_iter()
            .filter(OrderStatus::is_open)
            .map(|s| s.as_str().to_string())
            .collect()
    }

    /// Postgres keeps microseconds; truncating up front keeps returned values
    /// equal to what a later read produces.
    fn now() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn create_product(&self, product: NewProduct) -> Result<Product> {
        product.validate()?;
        let sku = product.sku.clone();
        let product = product.into_product(Self::now());

        let row = sqlx::query(
            r#"
            INSERT INTO products (id, sku, name, description, price, stock, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, sku, name, description, price, stock, created_at, updated_at
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.cents())
        .bind(product.stock)
        .bind(product.created_at)
        .bind(product.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(SKU_CONSTRAINT)
            {
                return StoreError::DuplicateSku(sku.clone());
            }
            StoreError::from(e)
        })?;

        Self::row_to_product(&row)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, sku, name, description, price, stock, created_at, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_product).transpose()
    }

    async fn get_product_by_sku(&self, sku: &str) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, sku, name, description, price, stock, created_at, updated_at
            FROM products
            WHERE sku = $1
            "#,
        )
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_product).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sku, name, description, price, stock, created_at, updated_at
            FROM products
            ORDER BY sku ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_product).collect()
    }

    async fn update_product(&self, id: ProductId, update: ProductUpdate) -> Result<Product> {
        update.validate()?;

        let mut tx = self.begin().await?;
        let row = sqlx::query(
            r#"
            UPDATE products
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                price = COALESCE($4, price),
                stock = COALESCE($5, stock),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, sku, name, description, price, stock, created_at, updated_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(update.name.as_deref())
        .bind(update.description.as_deref())
        .bind(update.price.map(|p| p.cents()))
        .bind(update.stock)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::product_not_found(id))?;

        let product = Self::row_to_product(&row)?;
        tx.commit().await?;
        Ok(product)
    }

    async fn delete_product(&self, id: ProductId) -> Result<()> {
        let mut tx = self.begin().await?;

        if Self::lock_products(&mut tx, [id]).await?.is_empty() {
            return Err(StoreError::product_not_found(id));
        }

        let in_use: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM order_items oi
                JOIN orders o ON o.id = oi.order_id
                WHERE oi.product_id = $1 AND o.status = ANY($2)
            )
            "#,
        )
        .bind(id.as_uuid())
        .bind(Self::open_statuses())
        .fetch_one(&mut *tx)
        .await?;

        if in_use {
            return Err(StoreError::ProductInUse(id));
        }

        sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_low_stock(&self, threshold: i64) -> Result<Vec<Product>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sku, name, description, price, stock, created_at, updated_at
            FROM products
            WHERE stock < $1
            ORDER BY stock ASC, sku ASC
            "#,
        )
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_product).collect()
    }

    async fn reserve(&self, requests: Vec<StockRequest>) -> Result<Vec<Product>> {
        let mut tx = self.begin().await?;
        let products = Self::lock_products(&mut tx, requests.iter().map(|r| r.product_id)).await?;
        let changes = plan_reservation(&products, &requests)?;
        let updated = Self::write_changes(&mut tx, &changes).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn restock(&self, requests: Vec<StockRequest>) -> Result<Vec<Product>> {
        let mut tx = self.begin().await?;
        let products = Self::lock_products(&mut tx, requests.iter().map(|r| r.product_id)).await?;
        let changes = plan_restock(&products, &requests)?;
        let updated = Self::write_changes(&mut tx, &changes).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn adjust_stock(&self, deltas: Vec<StockDelta>) -> Result<Vec<Product>> {
        let mut tx = self.begin().await?;
        let products = Self::lock_products(&mut tx, deltas.iter().map(|d| d.product_id)).await?;
        let changes = plan_adjustment(&products, &deltas)?;
        let updated = Self::write_changes(&mut tx, &changes).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn place_order(&self, order: NewOrder) -> Result<Placement> {
        order.validate()?;

        let mut tx = self.begin().await?;

        if let Some(key) = order.idempotency_key.as_deref() {
            let existing: Option<Uuid> = sqlx::query_scalar(
                "SELECT id FROM orders WHERE user_id = $1 AND idempotency_key = $2",
            )
            .bind(order.user_id.as_uuid())
            .bind(key)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(existing) = existing {
                let existing_id = OrderId::from_uuid(existing);
                tracing::debug!(order_id = %existing_id, "idempotency key matched an existing order");
                let existing = Self::load_order(&mut tx, existing_id)
                    .await?
                    .ok_or_else(|| StoreError::order_not_found(existing_id))?;
                tx.commit().await?;
                return Ok(Placement::replayed(existing));
            }
        }

        let products = Self::lock_products(&mut tx, order.items.iter().map(|r| r.product_id)).await?;
        let changes = plan_reservation(&products, &order.items)?;
        Self::write_changes(&mut tx, &changes).await?;

        let idempotency_key = order.idempotency_key.clone();
        let placed = order.into_order(OrderId::new(), &products, Self::now())?;
        Self::insert_order(&mut tx, &placed, idempotency_key.as_deref()).await?;

        tx.commit().await?;
        tracing::debug!(order_id = %placed.id, lines = placed.items.len(), "order committed");
        Ok(Placement::fresh(placed))
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        Self::load_order(&mut conn, id).await
    }

    async fn list_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;

        let order_rows = sqlx::query(
            r#"
            SELECT id, user_id, status, created_at, updated_at
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&mut *conn)
        .await?;

        let order_ids: Vec<Uuid> = order_rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<_, _>>()?;

        let item_rows = sqlx::query(
            r#"
            SELECT order_id, product_id, product_name, quantity, price
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, position ASC
            "#,
        )
        .bind(&order_ids)
        .fetch_all(&mut *conn)
        .await?;

        let mut items_by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in &item_rows {
            let order_id: Uuid = row.try_get("order_id")?;
            items_by_order
                .entry(order_id)
                .or_default()
                .push(Self::row_to_item(row)?);
        }

        order_rows
            .iter()
            .zip(order_ids)
            .map(|(row, id)| {
                Self::row_to_order(row, items_by_order.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn transition_order(&self, id: OrderId, target: OrderStatus) -> Result<Order> {
        let mut tx = self.begin().await?;

        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        let status = status.ok_or_else(|| StoreError::order_not_found(id))?;
        let current: OrderStatus = status
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("order status {status}")))?;
        let next = current.transition_to(target)?;

        if next == OrderStatus::Canceled {
            let requests: Vec<StockRequest> = Self::load_items(&mut tx, id)
                .await?
                .iter()
                .map(|item| StockRequest::new(item.product_id, item.quantity))
                .collect();
            let products =
                Self::lock_products(&mut tx, requests.iter().map(|r| r.product_id)).await?;
            let changes = plan_restock(&products, &requests)?;
            Self::write_changes(&mut tx, &changes).await?;
            tracing::debug!(order_id = %id, lines = changes.len(), "stock released for canceled order");
        }

        sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(next.as_str())
            .bind(Self::now())
            .execute(&mut *tx)
            .await?;

        let order = Self::load_order(&mut tx, id)
            .await?
            .ok_or_else(|| StoreError::order_not_found(id))?;
        tx.commit().await?;
        Ok(order)
    }
}
