//! CSV ingestion for seeding a SQLite database.

use super::SqliteStorage;
use crate::error::{Nl2SqlError, Result};
use itertools::Itertools;
use std::path::{Path, PathBuf};
use tracing::info;

/// Load `path` into `table`, creating it from the CSV header when missing.
/// Every column is stored as TEXT. Returns the number of inserted rows.
pub async fn ingest_csv(storage: &SqliteStorage, path: impl AsRef<Path>, table: &str) -> Result<usize> {
    let path: PathBuf = path.as_ref().to_path_buf();
    let table = table.trim().to_string();
    if table.is_empty() {
        return Err(Nl2SqlError::Config("Table name must not be empty".to_string()));
    }

    let table_name = table.clone();
    let inserted = storage
        .with_connection(move |conn| {
            let mut reader = csv::Reader::from_path(&path)?;
            let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
            if headers.is_empty() || headers.iter().any(|h| h.is_empty()) {
                return Err(Nl2SqlError::Config(format!(
                    "CSV file {} has an empty header",
                    path.display()
                )));
            }

            let tx = conn.transaction()?;
            tx.execute(&create_table_sql(&table_name, &headers), [])?;

            let mut count = 0;
            {
                let mut insert = tx.prepare(&insert_sql(&table_name, &headers))?;
                for record in reader.records() {
                    let record = record?;
                    insert.execute(rusqlite::params_from_iter(record.iter()))?;
                    count += 1;
                }
            }
            tx.commit()?;
            Ok(count)
        })
        .await?;

    info!("Ingested {} rows into {}", inserted, table);
    Ok(inserted)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn create_table_sql(table: &str, headers: &[String]) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(table),
        headers.iter().map(|h| format!("{} TEXT", quote_ident(h))).join(", ")
    )
}

fn insert_sql(table: &str, headers: &[String]) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        headers.iter().map(|h| quote_ident(h)).join(", "),
        (1..=headers.len()).map(|i| format!("?{}", i)).join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{QueryOutcome, StorageEngine};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_generated_sql_quotes_identifiers() {
        let headers = vec!["order id".to_string(), "total".to_string()];
        assert_eq!(
            create_table_sql("Orders", &headers),
            r#"CREATE TABLE IF NOT EXISTS "Orders" ("order id" TEXT, "total" TEXT)"#
        );
        assert_eq!(
            insert_sql("Orders", &headers),
            r#"INSERT INTO "Orders" ("order id", "total") VALUES (?1, ?2)"#
        );
        assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
    }

    #[tokio::test]
    async fn test_ingest_creates_and_fills_table() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = temp_dir.path().join("orders.csv");
        fs::write(&csv_path, "order_id,order_date,amount\n1,2024-01-02,250.00\n2,2024-02-03,900.50\n").unwrap();

        let storage = SqliteStorage::open_in_memory().unwrap();
        let inserted = ingest_csv(&storage, &csv_path, "Orders").await.unwrap();
        assert_eq!(inserted, 2);

        let schema = storage.get_schema().await.unwrap();
        let names: Vec<&str> = schema["Orders"].iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["order_id", "order_date", "amount"]);

        let outcome = storage.execute_query("SELECT amount FROM Orders WHERE order_id = '2'").await.unwrap();
        match outcome {
            QueryOutcome::Rows { rows, .. } => assert_eq!(rows[0]["amount"], "900.50"),
            other => panic!("expected rows, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_table_name_is_trimmed_and_appends() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = temp_dir.path().join("customers.csv");
        fs::write(&csv_path, "customer_id,name\n1,Ada\n").unwrap();

        let storage = SqliteStorage::open_in_memory().unwrap();
        assert_eq!(ingest_csv(&storage, &csv_path, "  Customers \n").await.unwrap(), 1);
        assert_eq!(ingest_csv(&storage, &csv_path, "Customers").await.unwrap(), 1);

        let schema = storage.get_schema().await.unwrap();
        assert_eq!(schema.keys().collect::<Vec<_>>(), vec!["Customers"]);
        let count = storage.execute_query("SELECT COUNT(*) AS n FROM Customers").await.unwrap();
        match count {
            QueryOutcome::Rows { rows, .. } => assert_eq!(rows[0]["n"], 2),
            other => panic!("expected rows, got {:?}", other),
        }
        assert!(matches!(
            ingest_csv(&storage, &csv_path, "   ").await,
            Err(Nl2SqlError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_ragged_csv_is_rejected_without_partial_insert() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = temp_dir.path().join("bad.csv");
        fs::write(&csv_path, "a,b\n1,2\n3\n").unwrap();

        let storage = SqliteStorage::open_in_memory().unwrap();
        let err = ingest_csv(&storage, &csv_path, "bad").await.unwrap_err();
        assert!(matches!(err, Nl2SqlError::Csv(_)));
        assert!(storage.get_schema().await.unwrap().is_empty());
    }
}
