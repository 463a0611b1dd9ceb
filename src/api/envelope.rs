//! Wire envelope for document creation requests.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CrptError, Result};

/// Document type of goods introduced into circulation.
pub const DOC_TYPE: &str = "LP_INTRODUCE_GOODS";
/// Document format sent in every envelope.
pub const DOCUMENT_FORMAT: &str = "MANUAL";
/// Field injected into every document.
pub const DOC_TYPE_FIELD: &str = "doc_type";

/// A document as a JSON object.
pub type Document = serde_json::Map<String, Value>;

/// The JSON body posted to `/doc/create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEnvelope {
    pub document_format: String,
    /// Base64 of the JSON-serialized document
    pub product_document: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub signature: String,
}

/// Serialize `document` and return a copy with `doc_type` set.
///
/// The caller's value is left untouched. Fails with
/// [`CrptError::InvalidArgument`] if the document is not a JSON object.
pub fn enrich<D>(document: &D) -> Result<Document>
where
    D: Serialize + ?Sized,
{
    match serde_json::to_value(document)? {
        Value::Object(mut map) => {
            map.insert(DOC_TYPE_FIELD.to_string(), Value::from(DOC_TYPE));
            Ok(map)
        }
        other => Err(CrptError::InvalidArgument(format!(
            "document must serialize to a JSON object, got {}",
            json_type(&other)
        ))),
    }
}

/// Build the envelope for `document` signed with `signature`.
///
/// Top-level keys of the encoded document are sorted, so equal documents
/// always produce the same payload.
pub fn build<D>(document: &D, signature: &str) -> Result<DocumentEnvelope>
where
    D: Serialize + ?Sized,
{
    let document = enrich(document)?;
    let sorted: BTreeMap<&String, &Value> = document.iter().collect();
    let json = serde_json::to_vec(&sorted)?;

    Ok(DocumentEnvelope {
        document_format: DOCUMENT_FORMAT.to_string(),
        product_document: STANDARD.encode(json),
        doc_type: DOC_TYPE.to_string(),
        signature: signature.to_string(),
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
