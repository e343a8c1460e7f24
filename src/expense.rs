//! Expense management for the expense tracking service.
//!
//! This module contains everything related to expenses:
//! - The `Expense` model and `NewExpense` insert parameters
//! - Database functions for storing, querying, and deleting expenses
//! - Route handlers for the expense API endpoints

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use rusqlite::{Connection, Row, params_from_iter, types::Value};
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{AppState, Error, database_id::DatabaseID};

// ============================================================================
// MODELS
// ============================================================================

/// A record of money spent on something on a particular day.
///
/// Expenses are immutable once created: they can be listed and deleted, but
/// never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    /// The ID of the expense.
    pub id: DatabaseID,
    /// How much money was spent, in the currency's minor unit (e.g. cents),
    /// so an integer of 10050 represents 100.50.
    pub amount: i64,
    /// A free-form label used to group related expenses.
    pub category: String,
    /// A text description of what the expense was for.
    pub description: String,
    /// When the expense occurred.
    pub date: Date,
}

/// The fields for creating an [Expense].
///
/// The ID is assigned by the database on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    /// How much money was spent, in the currency's minor unit.
    pub amount: i64,
    /// A free-form label used to group related expenses.
    pub category: String,
    /// A text description of what the expense was for.
    pub description: String,
    /// When the expense occurred.
    pub date: Date,
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// The state needed for the expense endpoints.
#[derive(Debug, Clone)]
pub struct ExpenseState {
    /// The database connection for managing expenses.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for ExpenseState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The query parameters for listing expenses.
///
/// Absent parameters mean "no filter": omitting `category` includes every
/// category, and omitting `sort` (or passing an unrecognised value) returns
/// expenses in the order they are stored.
#[derive(Debug, Default, Deserialize)]
pub struct ListExpensesParams {
    /// Only include expenses whose category matches this value exactly.
    pub category: Option<String>,
    /// The sort order. The only recognised value is "date_desc".
    pub sort: Option<String>,
}

/// A route handler for listing expenses, optionally filtered by category and
/// sorted by date (newest first).
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub async fn get_expenses_endpoint(
    State(state): State<ExpenseState>,
    Query(params): Query<ListExpensesParams>,
) -> impl IntoResponse {
    let query = ExpenseQuery {
        category: params.category,
        sort_date: match params.sort.as_deref() {
            Some("date_desc") => Some(SortOrder::Descending),
            _ => None,
        },
    };

    let connection = state.db_connection.lock().unwrap();
    query_expenses(query, &connection).map(|expenses| (StatusCode::OK, Json(expenses)))
}

/// The JSON body for creating an expense.
///
/// All fields are required. A missing or mistyped field is rejected with a
/// 422 response before the handler runs.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateExpenseRequest {
    /// How much money was spent, in the currency's minor unit.
    pub amount: i64,
    /// A free-form label used to group related expenses.
    pub category: String,
    /// A text description of what the expense was for.
    pub description: String,
    /// When the expense occurred, as an ISO-8601 date.
    pub expense_date: Date,
}

/// The JSON response for a successfully created expense.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateExpenseResponse {
    /// A confirmation message.
    pub message: String,
    /// The ID assigned to the new expense.
    pub id: DatabaseID,
}

/// A route handler for creating a new expense.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub async fn create_expense_endpoint(
    State(state): State<ExpenseState>,
    Json(request): Json<CreateExpenseRequest>,
) -> impl IntoResponse {
    let new_expense = NewExpense {
        amount: request.amount,
        category: request.category,
        description: request.description,
        date: request.expense_date,
    };

    let connection = state.db_connection.lock().unwrap();
    create_expense(new_expense, &connection).map(|expense| {
        (
            StatusCode::OK,
            Json(CreateExpenseResponse {
                message: "Expense recorded successfully".to_owned(),
                id: expense.id,
            }),
        )
    })
}

/// The JSON response for a successfully deleted expense.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteExpenseResponse {
    /// A confirmation message.
    pub message: String,
}

/// A route handler for deleting an expense by its database ID.
///
/// This function will return the status code 404 if the requested expense
/// does not exist (e.g., already deleted).
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub async fn delete_expense_endpoint(
    State(state): State<ExpenseState>,
    Path(expense_id): Path<DatabaseID>,
) -> impl IntoResponse {
    let connection = state.db_connection.lock().unwrap();
    delete_expense(expense_id, &connection).map(|()| {
        (
            StatusCode::OK,
            Json(DeleteExpenseResponse {
                message: "Deleted successfully".to_owned(),
            }),
        )
    })
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create a new expense in the database.
///
/// # Errors
/// This function will return an [Error::SqlError] if there is an SQL error.
pub fn create_expense(new_expense: NewExpense, connection: &Connection) -> Result<Expense, Error> {
    let expense = connection
        .prepare(
            "INSERT INTO expenses (amount, category, description, date)
             VALUES (?1, ?2, ?3, ?4)
             RETURNING id, amount, category, description, date",
        )?
        .query_row(
            (
                new_expense.amount,
                new_expense.category,
                new_expense.description,
                new_expense.date,
            ),
            map_expense_row,
        )?;

    Ok(expense)
}

/// Defines which expenses should be fetched from [query_expenses].
#[derive(Default)]
pub struct ExpenseQuery {
    /// Include only expenses whose category equals `category` exactly.
    pub category: Option<String>,
    /// Orders expenses by date in the order `sort_date`. None returns
    /// expenses in the order they are stored.
    pub sort_date: Option<SortOrder>,
}

/// The order to sort expenses in an [ExpenseQuery].
pub enum SortOrder {
    /// Sort in order of decreasing value.
    Descending,
}

/// Query for expenses in the database.
///
/// # Errors
/// This function will return an [Error::SqlError] if there is an SQL error.
pub fn query_expenses(
    filter: ExpenseQuery,
    connection: &Connection,
) -> Result<Vec<Expense>, Error> {
    let mut query_string_parts =
        vec!["SELECT id, amount, category, description, date FROM expenses".to_string()];
    let mut query_parameters = vec![];

    if let Some(category) = filter.category {
        query_string_parts.push(format!(
            "WHERE category = ?{}",
            query_parameters.len() + 1
        ));
        query_parameters.push(Value::Text(category));
    }

    if let Some(SortOrder::Descending) = filter.sort_date {
        query_string_parts.push("ORDER BY date DESC".to_string());
    }

    let query_string = query_string_parts.join(" ");
    let params = params_from_iter(query_parameters.iter());

    connection
        .prepare(&query_string)?
        .query_map(params, map_expense_row)?
        .map(|expense_result| expense_result.map_err(Error::SqlError))
        .collect()
}

/// Delete an expense from the database by its `id`.
///
/// The delete is a single statement, so two concurrent deletes of the same
/// expense cannot both succeed.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to an expense in the database,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn delete_expense(id: DatabaseID, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute("DELETE FROM expenses WHERE id = ?1", [id])?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Create the expenses table and its indexes in the database.
///
/// The primary key uses AUTOINCREMENT so the ID of a deleted expense is
/// never reassigned. Category and date are indexed as the common filter and
/// sort targets.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_expense_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS expenses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            amount INTEGER,
            category TEXT,
            description TEXT,
            date TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_expenses_category ON expenses(category);
        CREATE INDEX IF NOT EXISTS idx_expenses_date ON expenses(date);",
    )?;

    // Ensure the sequence starts at 1
    connection.execute(
        "INSERT OR IGNORE INTO sqlite_sequence (name, seq) VALUES ('expenses', 0)",
        (),
    )?;

    Ok(())
}

/// Map a database row to an [Expense].
fn map_expense_row(row: &Row) -> Result<Expense, rusqlite::Error> {
    let id = row.get(0)?;
    let amount = row.get(1)?;
    let category = row.get(2)?;
    let description = row.get(3)?;
    let date = row.get(4)?;

    Ok(Expense {
        id,
        amount,
        category,
        description,
        date,
    })
}
