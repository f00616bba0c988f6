pub mod taxonomy_db;
