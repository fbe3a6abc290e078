// Warning stores. Supabase when credentials are present, SQLite otherwise.

#[path = "sqlite_warning_store.rs"]
pub mod sqlite_warning_store;

#[path = "supabase_warning_store.rs"]
pub mod supabase_warning_store;

pub use sqlite_warning_store::SqliteWarningStore;
pub use supabase_warning_store::SupabaseWarningStore;
