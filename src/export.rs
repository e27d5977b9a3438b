use std::io::Write;

use indexmap::{IndexMap, IndexSet};

use crate::resolver::ResolvedLineage;

/// Tables read from each source database, keyed by `host.database`.
pub type UsedTables = IndexMap<String, IndexSet<String>>;

/// Groups the resolved tables of every record by source database. Records
/// whose tables could not be resolved are left out.
pub fn used_tables(resolved: &[ResolvedLineage]) -> UsedTables {
    let mut used = UsedTables::new();
    for item in resolved {
        let Some(tables) = &item.tables else {
            continue;
        };
        used.entry(format!("{}.{}", item.record.host, item.record.database))
            .or_default()
            .extend(tables.iter().cloned());
    }
    used
}

/// Writes `object,table` rows, one per table of each source database.
pub fn write_csv<W: Write>(used: &UsedTables, writer: W) -> csv::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(["object", "table"])?;
    for (object, tables) in used {
        for table in tables {
            csv_writer.write_record([object.as_str(), table.as_str()])?;
        }
    }
    csv_writer.flush()?;
    Ok(())
}
