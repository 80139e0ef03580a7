mod sqlite;

pub use sqlite::SqliteCustomerStore;
