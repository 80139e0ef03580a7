use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Row};

use clientele_core::time::{Clock, SystemClock};
use clientele_core::{Customer, CustomerStore, StoreError};

const COLUMNS: &str = "document, firstname, lastname, address, phone, email, created_at, updated_at";

pub struct SqliteCustomerStore {
    conn: Mutex<Connection>,
    clock: Box<dyn Clock>,
}

impl SqliteCustomerStore {
    pub fn new(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(backend)?;
        Self::with_connection(conn, Box::new(SystemClock))
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        Self::with_connection(conn, Box::new(SystemClock))
    }

    pub fn with_connection(conn: Connection, clock: Box<dyn Clock>) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(conn),
            clock,
        };
        store.init_tables()?;
        Ok(store)
    }

    fn init_tables(&self) -> Result<(), StoreError> {
        self.conn()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS customer (
                document TEXT PRIMARY KEY NOT NULL,
                firstname TEXT NOT NULL,
                lastname TEXT NOT NULL,
                address TEXT NOT NULL,
                phone TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            ",
            )
            .map_err(backend)?;
        tracing::debug!("customer table ready");
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("connection lock poisoned".to_string()))
    }

    fn write(&self, sql: &str, customer: &Customer) -> Result<(), StoreError> {
        let result = self.conn()?.execute(
            sql,
            params![
                customer.document,
                customer.firstname,
                customer.lastname,
                customer.address,
                customer.phone,
                customer.email,
                customer.created_at as i64,
                customer.updated_at as i64,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, message))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                // "UNIQUE constraint failed: customer.<column>"
                if message.as_deref().is_some_and(|m| m.contains("customer.document")) {
                    Err(StoreError::DuplicateDocument(customer.document.clone()))
                } else {
                    Err(StoreError::DuplicateEmail(customer.email.clone()))
                }
            }
            Err(e) => Err(backend(e)),
        }
    }

    fn find_one(&self, column: &str, value: &str) -> Result<Option<Customer>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {COLUMNS} FROM customer WHERE {column} = ?1"))
            .map_err(backend)?;
        stmt.query_row([value], row_to_customer).optional().map_err(backend)
    }
}

impl CustomerStore for SqliteCustomerStore {
    fn find_by_id(&self, document: &str) -> Result<Option<Customer>, StoreError> {
        self.find_one("document", document)
    }

    fn find_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError> {
        self.find_one("email", email)
    }

    fn insert(&self, customer: &Customer) -> Result<(), StoreError> {
        self.write(
            &format!("INSERT INTO customer ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            customer,
        )
    }

    fn upsert(&self, customer: &Customer) -> Result<(), StoreError> {
        self.write(
            &format!(
                "INSERT INTO customer ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(document) DO UPDATE SET
                    firstname = excluded.firstname,
                    lastname = excluded.lastname,
                    address = excluded.address,
                    phone = excluded.phone,
                    email = excluded.email,
                    updated_at = excluded.updated_at"
            ),
            customer,
        )
    }

    fn delete(&self, document: &str) -> Result<bool, StoreError> {
        let affected = self
            .conn()?
            .execute("DELETE FROM customer WHERE document = ?1", [document])
            .map_err(backend)?;
        Ok(affected > 0)
    }

    fn list(&self, skip: usize, limit: usize) -> Result<Vec<Customer>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM customer ORDER BY created_at, document LIMIT ?1 OFFSET ?2"
            ))
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![limit as i64, skip as i64], row_to_customer)
            .map_err(backend)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(backend)
    }

    fn ping(&self) -> Result<(), StoreError> {
        self.conn()?
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map(|_| ())
            .map_err(backend)
    }

    fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }
}

fn row_to_customer(row: &Row<'_>) -> rusqlite::Result<Customer> {
    Ok(Customer {
        document: row.get(0)?,
        firstname: row.get(1)?,
        lastname: row.get(2)?,
        address: row.get(3)?,
        phone: row.get(4)?,
        email: row.get(5)?,
        created_at: row.get::<_, i64>(6)? as u64,
        updated_at: row.get::<_, i64>(7)? as u64,
    })
}

fn backend(e: rusqlite::Error) -> StoreError {
    tracing::error!(error = %e, "sqlite error");
    StoreError::Backend(e.to_string())
}
