//! Database operations for the `products` table.

use catsync_core::{LocalRecord, LookupTargets, PendingPatch, ProductStore};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

pub(crate) const LIST_PRODUCTS_SQL: &str = "SELECT id, vendor_code, barcode, numeric_id, category_label, updated_at \
     FROM products \
     ORDER BY id";

pub(crate) const LOAD_BY_KEYS_SQL: &str = "SELECT id, vendor_code, barcode, numeric_id, category_label, updated_at \
     FROM products \
     WHERE barcode = ANY($1) \
        OR vendor_code = ANY($2) \
        OR numeric_id = ANY($3) \
     ORDER BY id";

// A NULL label leaves the stored one untouched, so re-applying a patch is a no-op.
pub(crate) const APPLY_PATCH_SQL: &str = "UPDATE products SET \
         numeric_id     = $2, \
         category_label = COALESCE($3, category_label), \
         updated_at     = NOW() \
     WHERE id = $1";

/// A row from the `products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub vendor_code: Option<String>,
    pub barcode: Option<String>,
    pub numeric_id: Option<i64>,
    pub category_label: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProductRow> for LocalRecord {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            vendor_code: row.vendor_code,
            barcode: row.barcode,
            numeric_id: row.numeric_id,
            category_label: row.category_label,
        }
    }
}

/// Returns every product, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_products(pool: &PgPool) -> Result<Vec<ProductRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductRow>(LIST_PRODUCTS_SQL)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Returns the products whose barcode, vendor code, or numeric id appears in
/// `targets`, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn load_products_by_keys(
    pool: &PgPool,
    targets: &LookupTargets,
) -> Result<Vec<ProductRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductRow>(LOAD_BY_KEYS_SQL)
        .bind(&targets.barcodes)
        .bind(&targets.vendor_codes)
        .bind(&targets.numeric_ids)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Overwrites `numeric_id` and, when the patch carries one, `category_label`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row has `patch.record_id`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn apply_product_patch(pool: &PgPool, patch: &PendingPatch) -> Result<(), DbError> {
    let result = sqlx::query(APPLY_PATCH_SQL)
        .bind(patch.record_id)
        .bind(patch.numeric_id)
        .bind(patch.category_label.as_deref())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound(patch.record_id));
    }
    Ok(())
}

/// [`ProductStore`] backed by the Postgres `products` table.
#[derive(Debug, Clone)]
pub struct PgProductStore {
    pool: PgPool,
}

impl PgProductStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl ProductStore for PgProductStore {
    type Error = DbError;

    async fn load_records(
        &self,
        targets: Option<&LookupTargets>,
    ) -> Result<Vec<LocalRecord>, Self::Error> {
        let rows = match targets {
            Some(targets) => load_products_by_keys(&self.pool, targets).await?,
            None => list_products(&self.pool).await?,
        };
        tracing::debug!(rows = rows.len(), targeted = targets.is_some(), "loaded products");
        Ok(rows.into_iter().map(LocalRecord::from).collect())
    }

    async fn apply_patch(&self, patch: &PendingPatch) -> Result<(), Self::Error> {
        apply_product_patch(&self.pool, patch).await
    }
}
