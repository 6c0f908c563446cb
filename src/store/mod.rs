pub mod db;
pub mod pg;

pub use db::Db;
pub use pg::PgStore;
