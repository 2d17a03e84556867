//! Product datastore on Postgres with pgvector.
//!
//! One data-access layer, three operations: bulk load from a seed file,
//! export back out, and a cosine-distance nearest-neighbor query over the
//! `product_embeddings` table joined back to `products`.
//!
//! Vectors are bound as pgvector text literals (`[0.1,0.2,...]`) and cast
//! with `::vector` in SQL; see [`crate::embedding::vector_literal`].

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::path::Path;

use crate::config::Config;
use crate::embedding;
use crate::models::{Product, ProductEmbedding, ProductMatch, SeedData};

pub async fn connect(config: &Config) -> Result<PgPool> {
    let url = config.datastore.url()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .context("Failed to connect to Postgres")?;

    Ok(pool)
}

// ============ Bulk load ============

/// Drop and recreate both tables, then insert every seed record.
///
/// The embeddings table is created with a `vector(dims)` column, so every
/// seed vector must have exactly `dims` elements.
pub async fn load(pool: &PgPool, dims: usize, seed: &SeedData) -> Result<()> {
    for emb in &seed.embeddings {
        if emb.embedding.len() != dims {
            anyhow::bail!(
                "embedding for product {} has {} dims, expected {}",
                emb.product_id,
                emb.embedding.len(),
                dims
            );
        }
    }

    let mut tx = pool.begin().await?;

    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(&mut *tx)
        .await?;

    sqlx::query("DROP TABLE IF EXISTS product_embeddings")
        .execute(&mut *tx)
        .await?;
    sqlx::query("DROP TABLE IF EXISTS products CASCADE")
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE products (
            product_id VARCHAR(1024) PRIMARY KEY,
            product_name TEXT,
            description TEXT,
            list_price DOUBLE PRECISION
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE product_embeddings (
            product_id VARCHAR(1024) NOT NULL REFERENCES products(product_id),
            content TEXT,
            embedding vector({})
        )
        "#,
        dims
    ))
    .execute(&mut *tx)
    .await?;

    for product in &seed.products {
        sqlx::query("INSERT INTO products VALUES ($1, $2, $3, $4)")
            .bind(&product.product_id)
            .bind(&product.product_name)
            .bind(&product.description)
            .bind(product.list_price)
            .execute(&mut *tx)
            .await?;
    }

    for emb in &seed.embeddings {
        sqlx::query("INSERT INTO product_embeddings VALUES ($1, $2, $3::vector)")
            .bind(&emb.product_id)
            .bind(&emb.content)
            .bind(embedding::vector_literal(&emb.embedding))
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

// ============ Export ============

pub async fn export(pool: &PgPool) -> Result<SeedData> {
    let product_rows = sqlx::query(
        "SELECT product_id, product_name, description, list_price \
         FROM products ORDER BY product_id",
    )
    .fetch_all(pool)
    .await?;

    let products: Vec<Product> = product_rows
        .iter()
        .map(|row| Product {
            product_id: row.get("product_id"),
            product_name: row.get("product_name"),
            description: row.get("description"),
            list_price: row.get("list_price"),
        })
        .collect();

    let emb_rows = sqlx::query(
        "SELECT product_id, content, embedding::text AS embedding \
         FROM product_embeddings ORDER BY product_id",
    )
    .fetch_all(pool)
    .await?;

    let mut embeddings = Vec::with_capacity(emb_rows.len());
    for row in &emb_rows {
        let literal: String = row.get("embedding");
        embeddings.push(ProductEmbedding {
            product_id: row.get("product_id"),
            content: row.get("content"),
            embedding: parse_vector_literal(&literal)?,
        });
    }

    Ok(SeedData {
        products,
        embeddings,
    })
}

// ============ Similarity search ============

/// Nearest-neighbor query: cosine similarity above `threshold`, best
/// `top_k` embedding rows, joined back to `products` for display fields.
pub async fn similarity_search(
    pool: &PgPool,
    query_vec: &[f32],
    threshold: f64,
    top_k: i64,
) -> Result<Vec<ProductMatch>> {
    let literal = embedding::vector_literal(query_vec);

    let rows = sqlx::query(
        r#"
        WITH vector_matches AS (
            SELECT product_id, 1 - (embedding <=> $1::vector) AS similarity
            FROM product_embeddings
            WHERE 1 - (embedding <=> $1::vector) > $2
            ORDER BY similarity DESC
            LIMIT $3
        )
        SELECT
            product_name,
            list_price,
            description
        FROM products
        WHERE product_id IN (SELECT product_id FROM vector_matches)
        "#,
    )
    .bind(&literal)
    .bind(threshold)
    .bind(top_k)
    .fetch_all(pool)
    .await?;

    let matches = rows
        .iter()
        .map(|row| ProductMatch {
            product_name: row.get("product_name"),
            list_price: row.get("list_price"),
            description: row.get("description"),
        })
        .collect();

    Ok(matches)
}

/// Parse a pgvector text literal back into floats.
pub fn parse_vector_literal(literal: &str) -> Result<Vec<f32>> {
    let inner = literal
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| anyhow::anyhow!("Invalid vector literal: {}", literal))?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .with_context(|| format!("Invalid vector element: {}", part))
        })
        .collect()
}

// ============ CLI entry points ============

pub async fn run_load(config: &Config, seed_path: &Path) -> Result<()> {
    let dims = config
        .embedding
        .dims
        .ok_or_else(|| anyhow::anyhow!("embedding.dims required to load the datastore"))?;

    let content = std::fs::read_to_string(seed_path)
        .with_context(|| format!("Failed to read seed file: {}", seed_path.display()))?;
    let seed: SeedData =
        serde_json::from_str(&content).with_context(|| "Failed to parse seed file")?;

    let pool = connect(config).await?;
    load(&pool, dims, &seed).await?;
    pool.close().await;

    println!(
        "Loaded {} products and {} embeddings.",
        seed.products.len(),
        seed.embeddings.len()
    );
    Ok(())
}

pub async fn run_export(config: &Config, output: Option<&Path>) -> Result<()> {
    let pool = connect(config).await?;
    let data = export(&pool).await?;
    pool.close().await;

    let json = serde_json::to_string_pretty(&data)?;
    match output {
        Some(path) => {
            std::fs::write(path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "Exported {} products and {} embeddings to {}",
                data.products.len(),
                data.embeddings.len(),
                path.display()
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}

pub async fn run_search(
    config: &Config,
    query: &str,
    top_k: Option<i64>,
    threshold: Option<f64>,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    if !config.embedding.is_enabled() {
        anyhow::bail!("data search requires embeddings. Set [embedding] provider in config.");
    }

    let query_vec = embedding::embed_query(&config.embedding, query).await?;

    let pool = connect(config).await?;
    let matches = similarity_search(
        &pool,
        &query_vec,
        threshold.unwrap_or(config.datastore.similarity_threshold),
        top_k.unwrap_or(config.datastore.top_k),
    )
    .await?;
    pool.close().await;

    if matches.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, m) in matches.iter().enumerate() {
        println!("{}. {} (${:.2})", i + 1, m.product_name, m.list_price);
        println!("    {}", m.description);
        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vector_literal_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0];
        let literal = embedding::vector_literal(&vec);
        assert_eq!(parse_vector_literal(&literal).unwrap(), vec);
    }

    #[test]
    fn test_parse_vector_literal_empty() {
        assert_eq!(parse_vector_literal("[]").unwrap(), Vec::<f32>::new());
    }

    #[test]
    fn test_parse_vector_literal_spaces() {
        assert_eq!(
            parse_vector_literal("[1, 2.5, -3]").unwrap(),
            vec![1.0, 2.5, -3.0]
        );
    }

    #[test]
    fn test_parse_vector_literal_invalid() {
        assert!(parse_vector_literal("1,2,3").is_err());
        assert!(parse_vector_literal("[1,two,3]").is_err());
    }

    #[test]
    fn test_seed_file_format() {
        let raw = r#"{
            "products": [
                { "product_id": "p1", "product_name": "Neck pillow",
                  "description": "A travel pillow", "list_price": 19.99 }
            ],
            "embeddings": [
                { "product_id": "p1", "content": "A travel pillow",
                  "embedding": [0.1, 0.2, 0.3] }
            ]
        }"#;
        let seed: SeedData = serde_json::from_str(raw).unwrap();
        assert_eq!(seed.products.len(), 1);
        assert_eq!(seed.embeddings[0].embedding.len(), 3);
    }
}
