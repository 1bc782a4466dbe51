//! Conversion of raw backend records into result records.

use std::path::PathBuf;

use crate::backend::{MetadataQuery, RawRecord};
use crate::query::{cap, Attribute, AttributeSource};
use crate::types::ResultRecord;

/// Reads up to `limit` records in backend order.
///
/// Records without a path are skipped. Every other attribute is optional,
/// and a value of the wrong type is treated as absent.
pub fn extract_records(query: &dyn MetadataQuery, limit: usize) -> Vec<ResultRecord> {
    let available = query.result_count();
    let mut skipped = 0usize;

    let readable = (0..available).filter_map(|index| {
        let record = query.result_at(index).as_ref().and_then(to_result_record);
        if record.is_none() {
            skipped += 1;
        }
        record
    });
    let records: Vec<ResultRecord> = cap(readable, limit).collect();

    if skipped > 0 {
        log::debug!("skipped {skipped} unreadable records of {available}");
    }
    records
}

pub fn to_result_record(raw: &RawRecord) -> Option<ResultRecord> {
    let path = PathBuf::from(raw.text(Attribute::Path)?.into_owned());
    let name = raw
        .text(Attribute::FileName)
        .map(|name| name.into_owned())
        .or_else(|| {
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_default();

    Some(ResultRecord {
        name,
        kind: raw.text(Attribute::Kind).map(|kind| kind.into_owned()),
        size: raw.bytes(Attribute::Size),
        created_at: raw.time(Attribute::CreatedAt),
        modified_at: raw.time(Attribute::ModifiedAt),
        path,
    })
}
