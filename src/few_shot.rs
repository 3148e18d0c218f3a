//! Few-shot exemplar catalog
//!
//! Worked (question, SQL) pairs shown to the model to steer output style.
//! The built-in catalog is created once per process and never mutated.

use lazy_static::lazy_static;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Number of exemplars drawn for each prompt.
pub const SAMPLE_SIZE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FewShotExample {
    pub natural_language: String,
    pub sql: String,
}

impl FewShotExample {
    pub fn new(natural_language: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            natural_language: natural_language.into(),
            sql: sql.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FewShotLibrary {
    examples: Vec<FewShotExample>,
}

lazy_static! {
    static ref BUILTIN_LIBRARY: Arc<FewShotLibrary> = Arc::new(FewShotLibrary::new(builtin_examples()));
}

impl FewShotLibrary {
    pub fn new(examples: Vec<FewShotExample>) -> Self {
        Self { examples }
    }

    /// The process-wide built-in catalog.
    pub fn builtin() -> Arc<FewShotLibrary> {
        Arc::clone(&BUILTIN_LIBRARY)
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Draw `min(SAMPLE_SIZE, len)` distinct exemplars uniformly at random.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<&FewShotExample> {
        self.examples
            .choose_multiple(rng, SAMPLE_SIZE.min(self.examples.len()))
            .collect()
    }
}

fn builtin_examples() -> Vec<FewShotExample> {
    vec![
        FewShotExample::new(
            "What are the names of customers who have placed orders?",
            "SELECT DISTINCT c.first_name, c.last_name FROM Customers c JOIN Orders o ON o.customer_id = c.customer_id",
        ),
        FewShotExample::new(
            "List the products with their prices and current inventory levels.",
            "SELECT p.product_name, p.price, i.quantity FROM Products p JOIN Inventory i ON i.product_id = p.product_id",
        ),
        FewShotExample::new(
            "Show me the total revenue from each customer.",
            "SELECT c.customer_id, c.first_name, c.last_name, SUM(o.total_amount) AS total_revenue FROM Customers c JOIN Orders o ON o.customer_id = c.customer_id GROUP BY c.customer_id, c.first_name, c.last_name",
        ),
        FewShotExample::new(
            "What are the top 5 products by sales quantity?",
            "SELECT p.product_name, SUM(oi.quantity) AS total_quantity FROM Products p JOIN OrderItems oi ON oi.product_id = p.product_id GROUP BY p.product_id, p.product_name ORDER BY total_quantity DESC LIMIT 5",
        ),
        FewShotExample::new(
            "Find all orders placed in the last month with their customer details.",
            "SELECT o.order_id, o.order_date, c.first_name, c.last_name, c.email FROM Orders o JOIN Customers c ON c.customer_id = o.customer_id WHERE o.order_date >= date('now', '-1 month')",
        ),
        FewShotExample::new(
            "How many orders were placed each month in 2023?",
            "SELECT strftime('%Y-%m', order_date) AS month, COUNT(*) AS order_count FROM Orders WHERE strftime('%Y', order_date) = '2023' GROUP BY month ORDER BY month",
        ),
        FewShotExample::new(
            "Add a new customer named Jane Smith with email jane@example.com.",
            "INSERT INTO Customers (first_name, last_name, email) VALUES ('Jane', 'Smith', 'jane@example.com')",
        ),
        FewShotExample::new(
            "Increase the price of all products in the Electronics category by 10 percent.",
            "UPDATE Products SET price = price * 1.10 WHERE category = 'Electronics'",
        ),
        FewShotExample::new(
            "Delete orders that were cancelled before 2022.",
            "DELETE FROM Orders WHERE status = 'cancelled' AND order_date < '2022-01-01'",
        ),
        FewShotExample::new(
            "Which customers have never placed an order?",
            "SELECT c.customer_id, c.first_name, c.last_name FROM Customers c LEFT JOIN Orders o ON o.customer_id = c.customer_id WHERE o.order_id IS NULL",
        ),
    ]
}
