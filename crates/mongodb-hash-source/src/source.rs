//! Full-collection reads from MongoDB.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bson::{doc, spec::BinarySubtype, Bson, Document};
use mongodb::{options::ClientOptions, Client, Collection};
use std::collections::BTreeMap;
use std::time::Duration;
use sync_core::{Record, UniversalValue};
use uuid::Uuid;

/// Reads every document of one collection.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// All documents, in the order the source returns them.
    async fn fetch_all(&self) -> Result<Vec<Record>>;
}

/// Convert a BSON value to a [`UniversalValue`].
///
/// Object ids become their hex string and embedded documents keep their
/// structure. Decimal128 stays textual so no precision is lost.
pub fn convert_bson_to_universal_value(value: Bson) -> Result<UniversalValue> {
    match value {
        Bson::Double(f) => Ok(UniversalValue::Float64(f)),
        Bson::String(s) => Ok(UniversalValue::String(s)),
        Bson::Array(items) => {
            let values = items
                .into_iter()
                .map(convert_bson_to_universal_value)
                .collect::<Result<Vec<_>>>()?;
            Ok(UniversalValue::Array(values))
        }
        Bson::Document(doc) => Ok(UniversalValue::Object(convert_document(doc)?)),
        Bson::Boolean(b) => Ok(UniversalValue::Bool(b)),
        Bson::Null | Bson::Undefined => Ok(UniversalValue::Null),
        Bson::RegularExpression(regex) => Ok(UniversalValue::String(format!(
            "/{}/{}",
            regex.pattern, regex.options
        ))),
        Bson::JavaScriptCode(code) => Ok(UniversalValue::String(code)),
        Bson::JavaScriptCodeWithScope(code_with_scope) => {
            let mut object = BTreeMap::new();
            object.insert(
                "$code".to_string(),
                UniversalValue::String(code_with_scope.code),
            );
            object.insert(
                "$scope".to_string(),
                UniversalValue::Object(convert_document(code_with_scope.scope)?),
            );
            Ok(UniversalValue::Object(object))
        }
        Bson::Int32(i) => Ok(UniversalValue::Int32(i)),
        Bson::Int64(i) => Ok(UniversalValue::Int64(i)),
        // Seconds and ordinal as in extended JSON's `{"$timestamp": {"t", "i"}}`.
        Bson::Timestamp(ts) => {
            let mut object = BTreeMap::new();
            object.insert("t".to_string(), UniversalValue::Int64(ts.time as i64));
            object.insert("i".to_string(), UniversalValue::Int64(ts.increment as i64));
            Ok(UniversalValue::Object(object))
        }
        Bson::Binary(binary) => {
            if binary.subtype == BinarySubtype::Uuid {
                if let Ok(uuid) = Uuid::from_slice(&binary.bytes) {
                    return Ok(UniversalValue::Uuid(uuid));
                }
            }
            Ok(UniversalValue::Bytes(binary.bytes))
        }
        Bson::ObjectId(oid) => Ok(UniversalValue::String(oid.to_hex())),
        Bson::DateTime(dt) => Ok(UniversalValue::TimestampTz(dt.to_chrono())),
        Bson::Symbol(s) => Ok(UniversalValue::String(s)),
        Bson::Decimal128(d) => Ok(UniversalValue::Decimal(d.to_string())),
        Bson::MaxKey => Ok(UniversalValue::String("$maxKey".to_string())),
        Bson::MinKey => Ok(UniversalValue::String("$minKey".to_string())),
        Bson::DbPointer(_) => Ok(UniversalValue::String("$dbPointer".to_string())),
    }
}

fn convert_document(doc: Document) -> Result<BTreeMap<String, UniversalValue>> {
    doc.into_iter()
        .map(|(key, value)| Ok((key, convert_bson_to_universal_value(value)?)))
        .collect()
}

/// Convert a whole document, `_id` included, keeping field order.
pub fn document_to_record(doc: Document) -> Result<Record> {
    let mut record = Record::new();
    for (key, value) in doc {
        let converted = convert_bson_to_universal_value(value)
            .with_context(|| format!("Failed to convert field '{key}'"))?;
        record.insert(key, converted);
    }
    Ok(record)
}

/// [`DocumentSource`] reading a live MongoDB collection.
pub struct MongoDocumentSource {
    collection: Collection<Document>,
    namespace: String,
}

impl MongoDocumentSource {
    /// Create a client for `uri` and address `database.collection`.
    ///
    /// No round trip happens here; an unreachable server surfaces on the
    /// first read.
    pub async fn connect(uri: &str, database: &str, collection: &str) -> Result<Self> {
        let mut options = ClientOptions::parse(uri)
            .await
            .context("Failed to parse MongoDB connection options")?;
        options.connect_timeout = Some(Duration::from_secs(10));
        options.server_selection_timeout = Some(Duration::from_secs(10));
        tracing::debug!("Creating MongoDB client for {database}.{collection}");

        let client = Client::with_options(options)?;
        Ok(Self {
            collection: client.database(database).collection::<Document>(collection),
            namespace: format!("{database}.{collection}"),
        })
    }
}

#[async_trait]
impl DocumentSource for MongoDocumentSource {
    async fn fetch_all(&self) -> Result<Vec<Record>> {
        let mut cursor = self
            .collection
            .find(doc! {})
            .await
            .with_context(|| format!("Failed to query {}", self.namespace))?;

        let mut records = Vec::new();
        while cursor.advance().await? {
            let doc: Document = cursor.current().try_into()?;
            tracing::trace!("Read document {} from {}", records.len() + 1, self.namespace);
            records.push(document_to_record(doc)?);
        }
        Ok(records)
    }
}
