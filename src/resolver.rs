use std::ops::ControlFlow;

use indexmap::IndexSet;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sqlparser::ast::{ObjectName, ObjectNamePart, Query, Visit, Visitor};
use sqlparser::parser::Parser;
use strum_macros::{Display, EnumString};

use crate::lineage::LineageRecord;

/// SQL dialect used to resolve the tables a query reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Dialect {
    #[default]
    #[strum(to_string = "tsql", serialize = "mssql")]
    #[serde(alias = "mssql")]
    Tsql,
    Generic,
    Ansi,
    Postgres,
    Mysql,
    Bigquery,
    Snowflake,
}

impl Dialect {
    pub fn to_sqlparser_dialect(&self) -> Box<dyn sqlparser::dialect::Dialect> {
        use sqlparser::dialect::{
            AnsiDialect, BigQueryDialect, GenericDialect, MsSqlDialect, MySqlDialect,
            PostgreSqlDialect, SnowflakeDialect,
        };
        match self {
            Self::Tsql => Box::new(MsSqlDialect {}),
            Self::Generic => Box::new(GenericDialect {}),
            Self::Ansi => Box::new(AnsiDialect {}),
            Self::Postgres => Box::new(PostgreSqlDialect {}),
            Self::Mysql => Box::new(MySqlDialect {}),
            Self::Bigquery => Box::new(BigQueryDialect {}),
            Self::Snowflake => Box::new(SnowflakeDialect {}),
        }
    }
}

/// Finds the tables a SQL query reads from. `None` means the query could not
/// be understood.
pub trait TableResolver: Send + Sync {
    fn resolve(&self, query: &str, dialect: Dialect) -> Option<Vec<String>>;
}

/// Resolves tables with an embedded SQL parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlParserResolver;

impl TableResolver for SqlParserResolver {
    fn resolve(&self, query: &str, dialect: Dialect) -> Option<Vec<String>> {
        let statements = match Parser::parse_sql(dialect.to_sqlparser_dialect().as_ref(), query) {
            Ok(statements) => statements,
            Err(err) => {
                log::debug!("Could not parse query as {}: {}", dialect, err);
                return None;
            }
        };

        let mut collector = RelationCollector::default();
        for statement in &statements {
            let _ = statement.visit(&mut collector);
        }
        Some(collector.tables())
    }
}

#[derive(Default)]
struct RelationCollector {
    cte_names: Vec<String>,
    relations: IndexSet<String>,
}

impl RelationCollector {
    fn tables(self) -> Vec<String> {
        let cte_names = self.cte_names;
        self.relations
            .into_iter()
            .filter(|name| !cte_names.iter().any(|cte| cte.eq_ignore_ascii_case(name)))
            .collect()
    }
}

impl Visitor for RelationCollector {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            self.cte_names
                .extend(with.cte_tables.iter().map(|cte| cte.alias.name.value.clone()));
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        self.relations.insert(table_name(relation));
        ControlFlow::Continue(())
    }
}

/// `schema.table` (or just `table`) with identifier quoting removed.
fn table_name(name: &ObjectName) -> String {
    let parts = name
        .0
        .iter()
        .map(|part| match part {
            ObjectNamePart::Identifier(ident) => ident.value.clone(),
            other => other.to_string(),
        })
        .map(|part| part.replace(['"', '[', ']'], ""))
        .collect::<Vec<_>>();
    parts[parts.len().saturating_sub(2)..].join(".")
}

/// A lineage record with the tables its query reads from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLineage {
    #[serde(flatten)]
    pub record: LineageRecord,
    /// `None` when the query was empty or could not be resolved.
    pub tables: Option<Vec<String>>,
}

/// Resolves the tables of every record independently. The output keeps the
/// order of `records` whatever the order resolutions complete in.
pub fn resolve_all<R: TableResolver + ?Sized>(
    records: Vec<LineageRecord>,
    resolver: &R,
    dialect: Dialect,
    parallel: bool,
) -> Vec<ResolvedLineage> {
    let resolve_one = |record: LineageRecord| {
        let tables = if record.query.trim().is_empty() {
            log::debug!("Nothing to resolve for `{}`", record.name);
            None
        } else {
            resolver.resolve(&record.query, dialect)
        };
        if tables.is_none() {
            log::debug!("No tables resolved for `{}`", record.name);
        }
        ResolvedLineage { record, tables }
    };

    if parallel {
        records.into_par_iter().map(resolve_one).collect()
    } else {
        records.into_iter().map(resolve_one).collect()
    }
}
