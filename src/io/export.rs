use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::Writer;
use tracing::info;

use super::columns::EXPORT_HEADER;
use crate::core::RecordSet;
use crate::error::ExportError;

pub fn write_records<W: Write>(records: &RecordSet, output: W) -> Result<(), ExportError> {
    let mut wtr = Writer::from_writer(output);
    wtr.write_record(EXPORT_HEADER)?;

    for record in records.iter() {
        let optional = |value: Option<f64>| value.map(|v| v.to_string()).unwrap_or_default();
        wtr.write_record([
            record.name.clone(),
            record.spend.to_string(),
            record.usage.to_string(),
            optional(record.growth_rate()),
            optional(record.growth_amount()),
            optional(record.new_total()),
            record.cancelled.to_string(),
        ])?;
    }

    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

pub fn export_to_path(records: &RecordSet, path: &Path) -> Result<(), ExportError> {
    let file = File::create(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    write_records(records, file)?;
    info!(path = %path.display(), rows = records.len(), "exported records");
    Ok(())
}

pub fn export_to_string(records: &RecordSet) -> Result<String, ExportError> {
    let mut buffer = Vec::new();
    write_records(records, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
