use serde::{Deserialize, Deserializer};

use crate::error::LineageError;

pub const IMPORT_MODE: &str = "import";
pub const M_SOURCE_TYPE: &str = "m";

/// The data model schema embedded in a template (`DataModelSchema`).
/// Only the parts needed to trace table sources are modelled; every other
/// field of the document is ignored.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct SchemaDocument {
    pub model: Option<Model>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Model {
    pub tables: Option<Vec<Table>>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub name: Option<String>,
    pub partitions: Option<Vec<Partition>>,
    /// Only set on tables created internally by the authoring tool. Any
    /// value, `null` included, marks the table hidden.
    #[serde(default, deserialize_with = "present")]
    pub is_hidden: Option<serde_json::Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Partition {
    pub name: Option<String>,
    pub mode: Option<String>,
    pub source: Option<SourceDescriptor>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SourceDescriptor {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub expression: Option<Expression>,
}

/// M source of a partition, stored either as a list of lines or as one
/// multi-line string.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum Expression {
    Lines(Vec<String>),
    Text(String),
}

impl Expression {
    pub fn lines(&self) -> Vec<String> {
        match self {
            Expression::Lines(lines) => lines.clone(),
            Expression::Text(text) => text.lines().map(str::to_owned).collect(),
        }
    }
}

impl SchemaDocument {
    pub fn from_json(json: &str) -> Result<Self, LineageError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn tables(&self) -> Result<&[Table], LineageError> {
        self.model
            .as_ref()
            .and_then(|model| model.tables.as_deref())
            .ok_or(LineageError::MissingRoot)
    }
}

impl Table {
    fn is_eligible(&self) -> bool {
        self.partitions.is_some() && self.is_hidden.is_none()
    }
}

impl Partition {
    fn is_import(&self) -> bool {
        self.name.is_some() && self.mode.as_deref() == Some(IMPORT_MODE)
    }

    fn m_expression(&self) -> Option<&Expression> {
        let source = self.source.as_ref()?;
        let kind = source.kind.as_deref()?;
        let expression = source.expression.as_ref()?;
        (kind == M_SOURCE_TYPE).then_some(expression)
    }
}

/// A partition eligible for lineage extraction, with the table it belongs to.
#[derive(Debug, Clone)]
pub struct SelectedPartition<'a> {
    pub table: &'a Table,
    pub partition: &'a Partition,
    pub expression: &'a Expression,
}

impl SelectedPartition<'_> {
    pub fn name(&self) -> &str {
        self.partition.name.as_deref().unwrap_or_default()
    }
}

/// Returns the imported, visible partitions sourced from an M expression, in
/// document order.
pub fn select_partitions(doc: &SchemaDocument) -> Result<Vec<SelectedPartition<'_>>, LineageError> {
    let selected = doc
        .tables()?
        .iter()
        .filter(|table| table.is_eligible())
        .flat_map(|table| {
            table
                .partitions
                .iter()
                .flatten()
                .map(move |partition| (table, partition))
        })
        .filter(|(_, partition)| partition.is_import())
        .filter_map(|(table, partition)| {
            partition.m_expression().map(|expression| SelectedPartition {
                table,
                partition,
                expression,
            })
        })
        .collect::<Vec<_>>();
    log::debug!("Selected {} partitions for lineage extraction", selected.len());
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(doc: &SchemaDocument) -> Vec<String> {
        select_partitions(doc)
            .unwrap()
            .iter()
            .map(|selected| selected.name().to_owned())
            .collect()
    }

    #[test]
    fn test_missing_root() {
        let doc = SchemaDocument::from_json(r#"{"name": "x"}"#).unwrap();
        assert!(matches!(select_partitions(&doc), Err(LineageError::MissingRoot)));
        let doc = SchemaDocument::from_json(r#"{"model": {"culture": "en-US"}}"#).unwrap();
        assert!(matches!(select_partitions(&doc), Err(LineageError::MissingRoot)));
    }

    #[test]
    fn test_malformed_schema() {
        let err = SchemaDocument::from_json(r#"{"model": {"tables": 3}}"#).unwrap_err();
        assert!(matches!(err, LineageError::MalformedSchema(_)));
    }

    #[test]
    fn test_selects_visible_import_m_partitions() {
        let doc = SchemaDocument::from_json(
            r#"{"model": {"tables": [
                {"name": "Hidden", "isHidden": false, "partitions": [
                    {"name": "h", "mode": "import", "source": {"type": "m", "expression": ["let", "x"]}}
                ]},
                {"name": "NoPartitions"},
                {"name": "Sales", "partitions": [
                    {"name": "a", "mode": "import", "source": {"type": "m", "expression": ["let", "x"]}},
                    {"name": "b", "mode": "directQuery", "source": {"type": "m", "expression": ["let", "x"]}},
                    {"name": "c", "mode": "import", "source": {"type": "calculated", "expression": "x"}},
                    {"name": "d", "mode": "import", "source": {"type": "m"}},
                    {"mode": "import", "source": {"type": "m", "expression": ["let", "x"]}},
                    {"name": "e", "mode": "import", "source": {"type": "m", "expression": "let\nx"}}
                ]}
            ]}}"#,
        )
        .unwrap();
        assert_eq!(names(&doc), vec!["a", "e"]);
    }

    #[test]
    fn test_any_hidden_flag_value_hides_the_table() {
        let doc = SchemaDocument::from_json(
            r#"{"model": {"tables": [
                {"name": "A", "isHidden": "yes", "partitions": [
                    {"name": "a", "mode": "import", "source": {"type": "m", "expression": ["let", "x"]}}
                ]},
                {"name": "B", "isHidden": null, "partitions": [
                    {"name": "b", "mode": "import", "source": {"type": "m", "expression": ["let", "x"]}}
                ]},
                {"name": "C", "isHidden": {"by": "tool"}, "partitions": [
                    {"name": "c", "mode": "import", "source": {"type": "m", "expression": ["let", "x"]}}
                ]},
                {"name": "D", "partitions": [
                    {"name": "d", "mode": "import", "source": {"type": "m", "expression": ["let", "x"]}}
                ]}
            ]}}"#,
        )
        .unwrap();
        assert_eq!(names(&doc), vec!["d"]);
    }

    #[test]
    fn test_expression_text_is_split_into_lines() {
        let expression = Expression::Text("let\n    Source = x\nin\n    Source".to_owned());
        assert_eq!(expression.lines()[1], "    Source = x");
    }
}
