//! JSON REST implementation of `CrmSession`.
//!
//! Speaks a small resource-oriented contract:
//! - `GET  {base}/objects/{object}/records?registrations=...` -> snapshot chunk
//! - `PATCH {base}/objects/{object}/records/{id}`              -> field update
//! - `GET  {base}/objects/{object}/fields/{field}/picklists`   -> per-record-type values
//! - `GET  {base}/objects/{object}/record-types`               -> record-type ids
//!
//! Field names on the wire come from the configured `FieldMap`; the engine
//! itself never sees them.

use std::collections::{BTreeMap, HashSet};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, warn};
use serde_json::Value;

use crate::config::FieldMap;

use super::records::{CrmRecord, FieldKey, FieldValue, OrderStatus};
use super::session::{CrmSession, RecordTypePicklist, UpdateAck};

/// REST-backed CRM session. Cheap to clone; holds a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct RestCrmSession {
    client: reqwest::Client,
    base_url: String,
    token: String,
    object: String,
    chunk_size: usize,
    fields: FieldMap,
}

impl RestCrmSession {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        object: impl Into<String>,
        chunk_size: usize,
        fields: FieldMap,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            object: object.into(),
            chunk_size: chunk_size.max(1),
            fields,
        }
    }

    fn records_url(&self) -> String {
        format!("{}/objects/{}/records", self.base_url, self.object)
    }

    async fn fetch_chunk(&self, registrations: &[String]) -> Result<Vec<CrmRecord>> {
        let keys = registrations.join(",");
        let url = format!(
            "{}?registrations={}",
            self.records_url(),
            urlencoding::encode(&keys)
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context("CRM snapshot request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("CRM snapshot fetch returned {}: {}", status, body);
        }

        let payload: Value = response
            .json()
            .await
            .context("CRM snapshot response was not valid JSON")?;

        let rows = payload
            .get("records")
            .and_then(Value::as_array)
            .context("CRM snapshot response missing 'records' array")?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match parse_record(row, &self.fields) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Dropping unparsable CRM record: {:#}", e),
            }
        }
        Ok(records)
    }

    /// Render an intent's fields into the wire payload.
    fn wire_payload(&self, fields: &BTreeMap<FieldKey, FieldValue>) -> Value {
        let mut body = serde_json::Map::new();
        for (key, value) in fields {
            let wire = match value {
                FieldValue::Status(OrderStatus::Closed) => {
                    Value::String(self.fields.status_closed.clone())
                }
                FieldValue::Status(OrderStatus::Open) => {
                    Value::String(self.fields.status_open.clone())
                }
                other => other.to_json(),
            };
            body.insert(self.fields.wire_name(*key).to_string(), wire);
        }
        Value::Object(body)
    }
}

/// Map one wire record into the typed snapshot model.
fn parse_record(row: &Value, fields: &FieldMap) -> Result<CrmRecord> {
    let id = row
        .get(&fields.id)
        .and_then(Value::as_str)
        .with_context(|| format!("record missing '{}'", fields.id))?
        .to_string();

    let registration = row
        .get(&fields.registration)
        .and_then(Value::as_str)
        .with_context(|| format!("record {} missing '{}'", id, fields.registration))?
        .trim()
        .to_uppercase();

    let status_raw = row.get(&fields.status).and_then(Value::as_str).unwrap_or("");
    let status = if status_raw == fields.status_closed {
        OrderStatus::Closed
    } else {
        if status_raw != fields.status_open {
            debug!("Record {}: unrecognized status '{}', treating as open", id, status_raw);
        }
        OrderStatus::Open
    };

    let return_date = row
        .get(&fields.return_date)
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());

    let odometer = row.get(&fields.odometer).and_then(Value::as_i64);
    let renewed = row.get(&fields.renewed).and_then(Value::as_bool);
    let termination_reason = row
        .get(&fields.termination_reason)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let extra_costs = row.get(&fields.extra_costs).and_then(Value::as_f64);

    Ok(CrmRecord {
        id,
        registration,
        status,
        return_date,
        odometer,
        renewed,
        termination_reason,
        extra_costs,
    })
}

#[async_trait]
impl CrmSession for RestCrmSession {
    async fn fetch_records(&self, registrations: &[String]) -> Result<Vec<CrmRecord>> {
        let mut records = Vec::new();
        for chunk in registrations.chunks(self.chunk_size) {
            let fetched = self.fetch_chunk(chunk).await?;
            debug!("Fetched {} records for {} keys", fetched.len(), chunk.len());
            records.extend(fetched);
        }
        Ok(records)
    }

    async fn update_record(
        &self,
        id: &str,
        fields: &BTreeMap<FieldKey, FieldValue>,
    ) -> Result<UpdateAck> {
        let url = format!("{}/{}", self.records_url(), urlencoding::encode(id));
        let body = self.wire_payload(fields);

        let response = self
            .client
            .patch(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Update request for {} failed", id))?;

        let status = response.status();
        if status.is_success() {
            Ok(UpdateAck::ok(status.as_u16()))
        } else {
            let text = response.text().await.unwrap_or_default();
            Ok(UpdateAck::rejected(Some(status.as_u16()), text))
        }
    }

    async fn describe_picklist(
        &self,
        object: &str,
        field: &str,
    ) -> Result<Vec<RecordTypePicklist>> {
        let url = format!(
            "{}/objects/{}/fields/{}/picklists",
            self.base_url,
            urlencoding::encode(object),
            urlencoding::encode(field)
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context("Picklist describe request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Picklist describe returned {}: {}", status, body);
        }

        let payload: Value = response
            .json()
            .await
            .context("Picklist describe response was not valid JSON")?;

        let entries = payload
            .get("picklists")
            .and_then(Value::as_array)
            .context("Picklist describe response missing 'picklists' array")?;

        let mut picklists = Vec::with_capacity(entries.len());
        for entry in entries {
            let record_type_id = entry
                .get("record_type_id")
                .and_then(Value::as_str)
                .context("picklist entry missing 'record_type_id'")?
                .to_string();
            let allowed_values: HashSet<String> = entry
                .get("values")
                .and_then(Value::as_array)
                .map(|vals| {
                    vals.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            picklists.push(RecordTypePicklist {
                record_type_id,
                allowed_values,
            });
        }
        Ok(picklists)
    }

    async fn list_record_types(&self, object: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/objects/{}/record-types",
            self.base_url,
            urlencoding::encode(object)
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context("Record-type list request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Record-type list returned {}: {}", status, body);
        }

        let payload: Value = response
            .json()
            .await
            .context("Record-type list response was not valid JSON")?;

        let ids = payload
            .get("ids")
            .and_then(Value::as_array)
            .context("Record-type list response missing 'ids' array")?
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn italian_field_map() -> FieldMap {
        FieldMap {
            id: "Id".to_string(),
            registration: "Targa_Veicolo__c".to_string(),
            status: "Stato__c".to_string(),
            status_open: "Live".to_string(),
            status_closed: "Chiuso".to_string(),
            return_date: "Data_Fine_Contratto__c".to_string(),
            odometer: "Return_Odo__c".to_string(),
            renewed: "Rinnovato__c".to_string(),
            termination_reason: "causale__c".to_string(),
            extra_costs: "Costi_Extra_Contratto__c".to_string(),
        }
    }

    #[test]
    fn test_parse_record_full_row() {
        let row = json!({
            "Id": "R1",
            "Targa_Veicolo__c": "ab123cd",
            "Stato__c": "Live",
            "Data_Fine_Contratto__c": "2026-03-14",
            "Return_Odo__c": 15000,
            "Rinnovato__c": false,
            "causale__c": "Incidente",
            "Costi_Extra_Contratto__c": 120.5
        });

        let record = parse_record(&row, &italian_field_map()).unwrap();
        assert_eq!(record.id, "R1");
        // Registration is normalized to uppercase at the boundary
        assert_eq!(record.registration, "AB123CD");
        assert_eq!(record.status, OrderStatus::Open);
        assert_eq!(record.odometer, Some(15000));
        assert_eq!(record.termination_reason.as_deref(), Some("Incidente"));
    }

    #[test]
    fn test_parse_record_closed_status() {
        let row = json!({
            "Id": "R2",
            "Targa_Veicolo__c": "XY987ZT",
            "Stato__c": "Chiuso"
        });

        let record = parse_record(&row, &italian_field_map()).unwrap();
        assert_eq!(record.status, OrderStatus::Closed);
        assert!(record.return_date.is_none());
        assert!(record.renewed.is_none());
    }

    #[test]
    fn test_parse_record_missing_id_fails() {
        let row = json!({ "Targa_Veicolo__c": "AB123CD" });
        assert!(parse_record(&row, &italian_field_map()).is_err());
    }

    #[test]
    fn test_wire_payload_uses_field_map() {
        let session = RestCrmSession::new(
            "https://crm.example.test/api/",
            "token",
            "Ordine__c",
            200,
            italian_field_map(),
        );

        let mut fields = BTreeMap::new();
        fields.insert(FieldKey::Status, FieldValue::Status(OrderStatus::Closed));
        fields.insert(FieldKey::Odometer, FieldValue::Int(15000));

        let payload = session.wire_payload(&fields);
        assert_eq!(payload["Stato__c"], json!("Chiuso"));
        assert_eq!(payload["Return_Odo__c"], json!(15000));
        assert!(payload.get("status").is_none());
    }
}
