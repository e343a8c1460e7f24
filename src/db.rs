//! Database initialization for the application's domain models.

use rusqlite::{Connection, Transaction as SqlTransaction};

use crate::{Error, expense::create_expense_table};

/// Create the application's tables and indexes if they do not already exist.
///
/// This function is intended to be called once during process start-up,
/// before the server starts accepting requests.
///
/// # Errors
/// Returns an error if the schema cannot be created or if there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    let transaction =
        SqlTransaction::new_unchecked(connection, rusqlite::TransactionBehavior::Exclusive)?;

    create_expense_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}
