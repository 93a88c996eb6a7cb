pub mod dbdocs;

pub use dbdocs::DbDocs;
