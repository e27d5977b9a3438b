//! # pbit-lineage
//!
//! A library for recovering table-level lineage from Power BI templates.
//!
//! # Features
//!
//! - Read the data model schema out of a `.pbit` archive.
//! - Find every imported table fed by a `Sql.Database` source and recover its host, database and query.
//! - Tell direct table imports apart from query-bearing sources.
//! - Resolve the tables each query reads from with an embedded SQL parser, in parallel.
//! - Export the tables used per source database as CSV.
//!
//! # Example
//!
//! ```rust,no_run
//! use pbit_lineage::{
//!     export::{used_tables, write_csv},
//!     lineage::extract_from_pbit,
//!     resolver::{Dialect, SqlParserResolver, resolve_all},
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     env_logger::init();
//!
//!     let pbit = std::fs::read("report.pbit")?;
//!     let records = extract_from_pbit(&pbit)?;
//!     for record in &records {
//!         println!("{} <- {}.{}: {}", record.name, record.host, record.database, record.query);
//!     }
//!
//!     let resolved = resolve_all(records, &SqlParserResolver, Dialect::Tsql, true);
//!     write_csv(&used_tables(&resolved), std::io::stdout())?;
//!     Ok(())
//! }
//! ```
pub mod archive;
pub mod config;
pub mod error;
pub mod export;
pub mod expression;
pub mod lineage;
pub mod resolver;
pub mod scanner;
pub mod schema;
