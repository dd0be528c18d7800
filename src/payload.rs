//! Structured payload decoders used by `record!(serde ...)` records

use serde::de::DeserializeOwned;

use crate::error::{BindError, Result};

/// Replace `target` with the JSON document in `raw`
pub fn json_into<T: DeserializeOwned>(target: &mut T, raw: &[u8]) -> Result<()> {
    *target = serde_json::from_slice(raw).map_err(|e| BindError::Payload {
        format: "JSON",
        reason: e.to_string(),
    })?;
    Ok(())
}

/// Replace `target` with the XML document in `raw`
pub fn xml_into<T: DeserializeOwned>(target: &mut T, raw: &[u8]) -> Result<()> {
    *target = quick_xml::de::from_reader(raw).map_err(|e| BindError::Payload {
        format: "XML",
        reason: e.to_string(),
    })?;
    Ok(())
}
