use serde::{Deserialize, Serialize};

use crate::archive::read_schema;
use crate::error::{ExtractError, LineageError};
use crate::expression::{ParsedCall, classify, extract_braced, normalize_query, quoted_span, unquote};
use crate::schema::{SchemaDocument, SelectedPartition, select_partitions};

/// Where the data of one imported partition comes from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LineageRecord {
    /// Partition name.
    pub name: String,
    pub host: String,
    pub database: String,
    /// The M text the query was taken from, kept verbatim.
    pub original_expression: String,
    /// SQL sent to the source. Best-effort text: never validated and
    /// possibly empty when no quoted query could be found.
    pub query: String,
    pub is_table_direct_import: bool,
}

/// Extracts one lineage record per imported `Sql.Database` partition, in
/// document order. Partitions whose source cannot be understood are skipped.
pub fn build_lineage(doc: &SchemaDocument) -> Result<Vec<LineageRecord>, LineageError> {
    let records = select_partitions(doc)?
        .iter()
        .filter_map(|selected| match partition_lineage(selected) {
            Ok(record) => Some(record),
            Err(err @ ExtractError::UnrecognizedSourceType(_)) => {
                log::debug!("Skipping partition `{}`: {}", selected.name(), err);
                None
            }
            Err(err @ ExtractError::Unparsable(_)) => {
                log::warn!(
                    "Skipping partition `{}` of table `{}`: {}",
                    selected.name(),
                    selected.table.name.as_deref().unwrap_or_default(),
                    err
                );
                None
            }
        })
        .collect::<Vec<_>>();
    log::debug!("Extracted {} lineage records", records.len());
    Ok(records)
}

/// Deserializes a schema document and extracts its lineage.
pub fn extract_lineage(schema_json: &str) -> Result<Vec<LineageRecord>, LineageError> {
    build_lineage(&SchemaDocument::from_json(schema_json)?)
}

/// Reads the schema out of a template archive and extracts its lineage.
pub fn extract_from_pbit(pbit: &[u8]) -> Result<Vec<LineageRecord>, LineageError> {
    extract_lineage(&read_schema(pbit)?)
}

fn partition_lineage(selected: &SelectedPartition) -> Result<LineageRecord, ExtractError> {
    let lines = selected.expression.lines();
    let call = classify(&lines)?;

    let host = call_argument(&call, 0)?;
    let database = call_argument(&call, 1)?;

    let (original_expression, query) = if call.is_direct_import {
        direct_import_query(&lines)?
    } else {
        let original_expression = call.text_after_argument(1).unwrap_or_default().to_owned();
        let query = normalize_query(quoted_span(&original_expression));
        if query.is_empty() {
            log::debug!("No quoted query in partition `{}`", selected.name());
        }
        (original_expression, query)
    };

    Ok(LineageRecord {
        name: selected.name().to_owned(),
        host,
        database,
        original_expression,
        query,
        is_table_direct_import: call.is_direct_import,
    })
}

fn call_argument(call: &ParsedCall, idx: usize) -> Result<String, ExtractError> {
    call.argument(idx)
        .map(|arg| unquote(arg.trim()).to_owned())
        .ok_or_else(|| {
            ExtractError::Unparsable(format!(
                "missing argument {} in `{}`",
                idx + 1,
                call.call_text.trim()
            ))
        })
}

/// The navigation line of a direct import, e.g.
/// `dbo_Customers = Source{[Schema="dbo",Item="Customers"]}[Data]`.
fn direct_import_query(lines: &[String]) -> Result<(String, String), ExtractError> {
    let navigation = lines
        .get(2)
        .ok_or_else(|| ExtractError::Unparsable("direct import without navigation line".to_owned()))?;
    let fields = extract_braced(navigation).ok_or_else(|| {
        ExtractError::Unparsable(format!("no navigation record in `{}`", navigation.trim()))
    })?;
    match (fields.get("schema"), fields.get("item")) {
        (Some(schema), Some(item)) => Ok((
            navigation.clone(),
            format!("SELECT * FROM {}.{}", schema, item),
        )),
        _ => Err(ExtractError::Unparsable(format!(
            "navigation record without schema and item in `{}`",
            navigation.trim()
        ))),
    }
}
