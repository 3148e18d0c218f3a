//! End-to-end pipeline runs against an in-memory SQLite database with
//! scripted completion and retrieval services.

use async_trait::async_trait;
use nl2sql::error::{Nl2SqlError, Result};
use nl2sql::llm::CompletionService;
use nl2sql::pipeline::{Pipeline, QueryOutput, Timeouts, VALIDATION_FAILED_MESSAGE};
use nl2sql::retrieval::SchemaRetriever;
use nl2sql::storage::{SqliteStorage, StorageEngine};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TOTALS_SQL: &str = "SELECT c.name, SUM(o.total) AS total_spent
FROM Customers c
JOIN Orders o ON o.customer_id = c.customer_id
GROUP BY c.customer_id
HAVING SUM(o.total) > 1000
ORDER BY total_spent DESC";

struct ScriptedLlm {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    user_prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn new(replies: &[std::result::Result<&str, &str>]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(
                replies
                    .iter()
                    .copied()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            user_prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl CompletionService for ScriptedLlm {
    async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.user_prompts.lock().unwrap().push(user_prompt.to_string());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(Nl2SqlError::Llm(message)),
            None => Err(Nl2SqlError::Llm("no scripted reply".to_string())),
        }
    }
}

/// Never answers.
struct SilentLlm;

#[async_trait]
impl CompletionService for SilentLlm {
    async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok("SELECT".to_string())
    }
}

struct FixedRetriever(Vec<(&'static str, f32)>);

#[async_trait]
impl SchemaRetriever for FixedRetriever {
    async fn search(&self, _question: &str) -> Result<Vec<(String, f32)>> {
        Ok(self.0.iter().map(|(table, score)| (table.to_string(), *score)).collect())
    }
}

fn customers_and_orders() -> FixedRetriever {
    FixedRetriever(vec![("Customers", 0.9), ("Orders", 0.8)])
}

async fn seeded_storage() -> Arc<SqliteStorage> {
    let storage = SqliteStorage::open_in_memory().unwrap();
    for sql in [
        "CREATE TABLE Customers (customer_id INTEGER PRIMARY KEY, name TEXT, city TEXT)",
        "CREATE TABLE Orders (order_id INTEGER PRIMARY KEY, customer_id INTEGER, order_date TEXT, total REAL)",
        "INSERT INTO Customers VALUES (1, 'Ada', 'London'), (2, 'Grace', 'New York'), (3, 'Linus', 'Helsinki')",
        "INSERT INTO Orders VALUES
            (10, 1, '2024-01-05', 900.0),
            (11, 1, '2024-02-11', 450.0),
            (12, 2, '2024-03-02', 1500.0),
            (13, 3, '2024-03-09', 120.0)",
    ] {
        storage.execute_query(sql).await.unwrap();
    }
    Arc::new(storage)
}

#[tokio::test]
async fn test_customers_over_threshold() {
    let llm = ScriptedLlm::new(&[Ok("SELECT"), Ok(TOTALS_SQL)]);
    let pipeline = Pipeline::new(llm.clone(), Arc::new(customers_and_orders()), seeded_storage().await);

    let result = pipeline
        .execute_query("List customers with total orders over $1000")
        .await;

    assert_eq!(result.error, None);
    assert!(result.sql_validated);
    assert_eq!(result.query_intent, "SELECT");
    assert_eq!(result.relevant_tables, vec!["Customers", "Orders"]);
    assert!(!result.generated_sql.contains('\n'));

    let rows = match result.query_result {
        Some(QueryOutput::Rows(rows)) => rows,
        other => panic!("expected rows, got {:?}", other),
    };
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], json!("Grace"));
    assert_eq!(rows[0]["total_spent"], json!(1500.0));
    assert_eq!(rows[1]["name"], json!("Ada"));
    let columns: Vec<&str> = rows[0].keys().map(String::as_str).collect();
    assert_eq!(columns, vec!["name", "total_spent"]);

    // synthesis prompt carries both relevant tables
    let prompts = llm.user_prompts.lock().unwrap();
    assert!(prompts[1].contains("Table: Customers\nColumns: customer_id (INTEGER), name (TEXT), city (TEXT)"));
    assert!(prompts[1].contains("Table: Orders"));
}

#[tokio::test]
async fn test_broken_sql_is_not_executed() {
    let storage = seeded_storage().await;
    let llm = ScriptedLlm::new(&[Ok("DELETE"), Ok("DELETE FROM Orders WHERE nonexistent_column = 1")]);
    let pipeline = Pipeline::new(llm, Arc::new(customers_and_orders()), storage.clone());

    let result = pipeline.execute_query("Delete the bad orders").await;

    assert!(!result.sql_validated);
    assert_eq!(result.error.as_deref(), Some(VALIDATION_FAILED_MESSAGE));
    assert_eq!(result.query_result, None);
    let remaining = storage.execute_query("SELECT COUNT(*) AS n FROM Orders").await.unwrap();
    match remaining {
        nl2sql::storage::QueryOutcome::Rows { rows, .. } => assert_eq!(rows[0]["n"], json!(4)),
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_classification_failure() {
    let llm = ScriptedLlm::new(&[Err("503 Service Unavailable")]);
    let pipeline = Pipeline::new(llm.clone(), Arc::new(customers_and_orders()), seeded_storage().await);

    let result = pipeline.execute_query("How many customers?").await;

    assert!(result.error.as_deref().unwrap().contains("503 Service Unavailable"));
    assert!(result.relevant_tables.is_empty());
    assert!(result.generated_sql.is_empty());
    assert_eq!(result.query_result, None);
    assert_eq!(llm.user_prompts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unresponsive_llm_times_out() {
    let timeouts = Timeouts {
        llm: Duration::from_millis(50),
        retrieval: Duration::from_secs(1),
        storage: Duration::from_secs(1),
    };
    let pipeline = Pipeline::new(Arc::new(SilentLlm), Arc::new(customers_and_orders()), seeded_storage().await)
        .with_timeouts(timeouts);

    let result = tokio::time::timeout(Duration::from_secs(5), pipeline.execute_query("Anything"))
        .await
        .expect("pipeline stalled");

    let error = result.error.unwrap();
    assert!(error.starts_with("Intent classification failed:"));
    assert!(error.contains("timed out"));
}

#[tokio::test]
async fn test_update_reports_affected_rows() {
    let storage = seeded_storage().await;
    let llm = ScriptedLlm::new(&[
        Ok("UPDATE"),
        Ok("UPDATE Customers SET city = 'Paris'\nWHERE customer_id IN (1, 2)"),
    ]);
    let pipeline = Pipeline::new(llm, Arc::new(FixedRetriever(vec![("Customers", 0.7)])), storage);

    let result = pipeline.execute_query("Move Ada and Grace to Paris").await;

    assert_eq!(result.error, None);
    assert_eq!(
        result.query_result,
        Some(QueryOutput::Message(
            "Statement executed successfully. Rows affected: 2".to_string()
        ))
    );
}

#[tokio::test]
async fn test_relevant_tables_order_is_stable() {
    let storage = seeded_storage().await;
    let retriever = Arc::new(FixedRetriever(vec![("Orders", 0.95), ("Missing", 0.5), ("Customers", 0.3)]));
    let mut seen = Vec::new();
    for _ in 0..3 {
        let llm = ScriptedLlm::new(&[Ok("SELECT"), Ok("SELECT COUNT(*) FROM Orders")]);
        let pipeline = Pipeline::new(llm, retriever.clone(), storage.clone());
        let result = pipeline.generate_sql("How many orders?").await;
        assert!(result.sql_validated);
        seen.push(result.relevant_tables);
    }
    assert!(seen.iter().all(|tables| tables == &vec!["Orders", "Missing", "Customers"]));
}

#[tokio::test]
async fn test_json_record_shape() {
    let llm = ScriptedLlm::new(&[Ok("SELECT"), Ok("SELECT name FROM Customers WHERE city = 'Nowhere'")]);
    let pipeline = Pipeline::new(llm, Arc::new(customers_and_orders()), seeded_storage().await);

    let result = pipeline.execute_query("Customers in Nowhere").await;
    let value = serde_json::to_value(&result).unwrap();

    assert_eq!(value["query"], json!("Customers in Nowhere"));
    assert_eq!(value["relevant_tables"], json!(["Customers", "Orders"]));
    assert_eq!(value["sql_validated"], json!(true));
    assert_eq!(value["query_result"], json!("The query returned no results."));
    assert_eq!(value["error"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_timed_out_write_is_rolled_back() {
    let storage = seeded_storage().await;
    storage.execute_query("CREATE TABLE t (x INTEGER)").await.unwrap();
    let llm = ScriptedLlm::new(&[
        Ok("INSERT"),
        Ok("INSERT INTO t WITH RECURSIVE seq(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM seq WHERE x < 3000000) SELECT x FROM seq"),
    ]);
    let timeouts = Timeouts {
        llm: Duration::from_secs(5),
        retrieval: Duration::from_secs(5),
        storage: Duration::from_millis(100),
    };
    let pipeline = Pipeline::new(llm, Arc::new(FixedRetriever(vec![("t", 0.9)])), storage.clone())
        .with_timeouts(timeouts);

    let result = pipeline.execute_query("Fill t with three million numbers").await;

    assert!(result.sql_validated);
    let error = result.error.unwrap();
    assert!(error.starts_with("Query execution failed:"));
    assert!(error.contains("timed out"));
    assert_eq!(result.query_result, None);

    let remaining = storage.execute_query("SELECT COUNT(*) AS n FROM t").await.unwrap();
    match remaining {
        nl2sql::storage::QueryOutcome::Rows { rows, .. } => assert_eq!(rows[0]["n"], json!(0)),
        other => panic!("unexpected outcome {:?}", other),
    }
}
