//! Device/count record packaging

use serde::{Deserialize, Serialize};
use std::num::ParseIntError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: String,
    pub total: i64,
}

/// `{"data": [record]}` wrapper expected by the consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEnvelope {
    pub data: Vec<DeviceRecord>,
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid total '{input}': {source}")]
    InvalidTotal {
        input: String,
        #[source]
        source: ParseIntError,
    },
}

/// Wrap a device id and a textual total into a single-record envelope.
///
/// Surrounding whitespace and a leading sign are accepted; anything else that
/// is not a base-10 integer is an error. Totals are limited to the `i64`
/// range, and `_` digit separators are rejected.
pub fn format_record(device_id: &str, total: &str) -> Result<RecordEnvelope, RecordError> {
    let parsed = total
        .trim()
        .parse::<i64>()
        .map_err(|source| RecordError::InvalidTotal {
            input: total.to_string(),
            source,
        })?;

    Ok(RecordEnvelope {
        data: vec![DeviceRecord {
            device_id: device_id.to_string(),
            total: parsed,
        }],
    })
}
