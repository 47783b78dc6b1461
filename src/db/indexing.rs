//! Indexing gate
//!
//! Creates the collection tables and the index set. Every statement is
//! idempotent, so running it on each start is safe. The listener is only
//! bound after this succeeds.

use super::{Collections, DbError};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMethod {
    BTree,
    /// Full-text search over a tsvector expression
    Gin,
}

/// One required index on a collection
#[derive(Debug, Clone, Copy)]
pub struct IndexSpec {
    pub collection: &'static str,
    pub name: &'static str,
    pub method: IndexMethod,
    pub expression: &'static str,
}

const fn btree(collection: &'static str, name: &'static str, expression: &'static str) -> IndexSpec {
    IndexSpec {
        collection,
        name,
        method: IndexMethod::BTree,
        expression,
    }
}

const fn gin(collection: &'static str, name: &'static str, expression: &'static str) -> IndexSpec {
    IndexSpec {
        collection,
        name,
        method: IndexMethod::Gin,
        expression,
    }
}

/// Indexes the storefront needs before it can serve
pub const INDEX_SET: &[IndexSpec] = &[
    btree("users", "idx_users_email", "(doc->>'userEmail')"),
    btree("products", "idx_products_permalink", "(doc->>'productPermalink')"),
    btree("products", "idx_products_published", "(doc->>'productPublished')"),
    gin(
        "products",
        "idx_products_search",
        "to_tsvector('simple', coalesce(doc->>'productTitle', '') || ' ' || coalesce(doc->>'productTags', '') || ' ' || coalesce(doc->>'productDescription', ''))",
    ),
    btree("orders", "idx_orders_email", "(doc->>'orderEmail')"),
    btree("orders", "idx_orders_status", "(doc->>'orderStatus')"),
    gin(
        "orders",
        "idx_orders_search",
        "to_tsvector('simple', coalesce(doc->>'orderEmail', '') || ' ' || coalesce(doc->>'orderLastname', '') || ' ' || coalesce(doc->>'orderPostcode', ''))",
    ),
    btree("pages", "idx_pages_slug", "(doc->>'pageSlug')"),
    btree("menu", "idx_menu_order", "(doc->>'order')"),
    btree("customers", "idx_customers_email", "(doc->>'email')"),
    gin(
        "customers",
        "idx_customers_search",
        "to_tsvector('simple', coalesce(doc->>'email', '') || ' ' || coalesce(doc->>'firstName', '') || ' ' || coalesce(doc->>'lastName', ''))",
    ),
];

/// DDL creating the backing table of a collection
pub fn table_ddl(collection: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id BIGSERIAL PRIMARY KEY,
            doc JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        collection
    )
}

pub fn index_ddl(spec: &IndexSpec) -> String {
    let method = match spec.method {
        IndexMethod::BTree => "btree",
        IndexMethod::Gin => "gin",
    };
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} USING {} ({})",
        spec.name, spec.collection, method, spec.expression
    )
}

/// Build every collection table and index; any failure aborts startup
pub async fn run_indexing(collections: &Collections) -> Result<(), DbError> {
    let client = collections.users.pool().get().await?;

    for collection in collections.all() {
        client.batch_execute(&table_ddl(collection.name())).await?;
    }

    for spec in INDEX_SET {
        client.batch_execute(&index_ddl(spec)).await?;
        debug!("Index {} ready on {}", spec.name, spec.collection);
    }

    info!("✅ Indexing complete ({} indexes)", INDEX_SET.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabaseHandle;

    #[test]
    fn test_index_ddl_is_idempotent() {
        for spec in INDEX_SET {
            assert!(index_ddl(spec).starts_with("CREATE INDEX IF NOT EXISTS "));
        }
        assert!(table_ddl("orders").starts_with("CREATE TABLE IF NOT EXISTS orders"));
    }

    #[test]
    fn test_gin_index_ddl() {
        let spec = INDEX_SET
            .iter()
            .find(|s| s.name == "idx_products_search")
            .unwrap();
        assert!(index_ddl(spec).contains("ON products USING gin (to_tsvector("));
    }

    #[tokio::test]
    async fn test_every_index_targets_a_bound_collection() {
        let collections = Collections::bind(&DatabaseHandle::detached());
        let names: Vec<_> = collections.all().iter().map(|c| c.name()).collect();
        for spec in INDEX_SET {
            assert!(names.contains(&spec.collection), "{}", spec.collection);
        }
    }

    #[tokio::test]
    async fn test_unreachable_database_fails_indexing() {
        let collections = Collections::bind(&DatabaseHandle::detached());
        assert!(run_indexing(&collections).await.is_err());
    }
}
