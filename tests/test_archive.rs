use std::io::{Cursor, Write};

use pbit_lineage::archive::{SCHEMA_ENTRY, read_schema};
use pbit_lineage::error::{ArchiveError, LineageError};
use pbit_lineage::export::{used_tables, write_csv};
use pbit_lineage::lineage::extract_from_pbit;
use pbit_lineage::resolver::{Dialect, SqlParserResolver, resolve_all};
use zip::CompressionMethod;
use zip::write::FileOptions;

const SCHEMA: &str = r#"{
  "name": "f1c0b3",
  "compatibilityLevel": 1550,
  "model": {
    "culture": "en-US",
    "tables": [
      {"name": "Orders", "partitions": [
        {"name": "Orders-1", "mode": "import", "source": {"type": "m", "expression": [
          "let",
          "    Source = Sql.Database(\"sql01\", \"Sales\", [Query=\"SELECT o.id FROM dbo.Orders o JOIN dbo.OrderLines l ON l.oid = o.id\"])",
          "in",
          "    Source"
        ]}}
      ]},
      {"name": "Customers", "partitions": [
        {"name": "Customers-1", "mode": "import", "source": {"type": "m", "expression": [
          "let",
          "    Source = Sql.Database(\"sql01\", \"Sales\"),",
          "    dbo_Customers = Source{[Schema=\"dbo\",Item=\"Customers\"]}[Data]",
          "in",
          "    dbo_Customers"
        ]}}
      ]},
      {"name": "Broken", "partitions": [
        {"name": "Broken-1", "mode": "import", "source": {"type": "m", "expression": [
          "let",
          "    Source = Sql.Database(\"sql02\", \"Ops\", [Query=\"SELEKT everything\"])",
          "in",
          "    Source"
        ]}}
      ]},
      {"name": "LocalDateTable_0d4", "isHidden": true, "partitions": [
        {"name": "LocalDateTable_0d4", "mode": "import", "source": {"type": "calculated", "expression": "Calendar(Date(2015, 1, 1), Date(2015, 12, 31))"}}
      ]}
    ]
  }
}"#;

fn utf16_le_with_bom(text: &str) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xFE];
    bytes.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
    bytes
}

fn pbit(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, content) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn template() -> Vec<u8> {
    pbit(&[
        ("Version", utf16_le_with_bom("1.28")),
        (SCHEMA_ENTRY, utf16_le_with_bom(SCHEMA)),
        ("Report/Layout", utf16_le_with_bom("{}")),
    ])
}

#[test]
fn test_read_schema() {
    assert_eq!(read_schema(&template()).unwrap(), SCHEMA);
}

#[test]
fn test_missing_schema_entry() {
    let archive = pbit(&[("Version", utf16_le_with_bom("1.28"))]);
    assert!(matches!(
        read_schema(&archive),
        Err(ArchiveError::MissingSchemaEntry(_))
    ));
    assert!(matches!(
        extract_from_pbit(&archive),
        Err(LineageError::Archive(ArchiveError::MissingSchemaEntry(_)))
    ));
}

#[test]
fn test_template_to_used_tables() {
    let records = extract_from_pbit(&template()).unwrap();
    assert_eq!(
        records.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        vec!["Orders-1", "Customers-1", "Broken-1"]
    );

    let resolved = resolve_all(records, &SqlParserResolver, Dialect::Tsql, true);
    assert_eq!(
        resolved[0].tables,
        Some(vec!["dbo.Orders".to_owned(), "dbo.OrderLines".to_owned()])
    );
    assert_eq!(resolved[1].tables, Some(vec!["dbo.Customers".to_owned()]));
    assert_eq!(resolved[2].tables, None);

    let mut out = vec![];
    write_csv(&used_tables(&resolved), &mut out).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "object,table\nsql01.Sales,dbo.Orders\nsql01.Sales,dbo.OrderLines\nsql01.Sales,dbo.Customers\n"
    );
}
