//! Encoding and decoding helpers between domain types and SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings (microsecond
//! precision, `Z` suffix) so that lexical order in SQL equals time order.
//! UUIDs are stored as hyphenated lowercase strings. Sponsor documents are
//! compact JSON.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use sponsor_core::record::{SponsorRecord, TargetRecord};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Sponsor documents ───────────────────────────────────────────────────────

/// The JSON body stored for each sponsor.
#[derive(Debug, Serialize, Deserialize)]
pub struct SponsorDocument {
  pub name:            String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub alternate_names: Vec<String>,
  pub active:          bool,
}

impl From<&SponsorRecord> for SponsorDocument {
  fn from(s: &SponsorRecord) -> Self {
    Self {
      name:            s.name.clone(),
      alternate_names: s.alternate_names.clone(),
      active:          s.active,
    }
  }
}

/// Projected columns of a sponsor document row.
///
/// Held as untyped values so a document with a wrong field type still loads
/// as a row and fails in [`RawSponsor::into_sponsor`] instead.
pub struct RawSponsor {
  pub doc_id:          String,
  pub name:            Value,
  /// JSON text of the `alternate_names` array, if present.
  pub alternate_names: Value,
  pub active:          Value,
}

impl RawSponsor {
  pub fn into_sponsor(self) -> Result<SponsorRecord> {
    let sponsor_id = decode_uuid(&self.doc_id)?;
    let malformed = |msg: &str| Error::MalformedDocument(sponsor_id, msg.to_owned());

    let name = match self.name {
      Value::Text(name) => name,
      Value::Null => return Err(malformed("missing name")),
      _ => return Err(malformed("name is not a string")),
    };
    let alternate_names = match self.alternate_names {
      Value::Null => vec![],
      Value::Text(json) => serde_json::from_str(&json)
        .map_err(|_| malformed("alternate_names is not an array of strings"))?,
      _ => return Err(malformed("alternate_names is not an array of strings")),
    };
    let active = match self.active {
      Value::Null => false,
      Value::Integer(flag) => flag != 0,
      _ => return Err(malformed("active is not a boolean")),
    };

    Ok(SponsorRecord { sponsor_id, name, alternate_names, active })
  }
}

// ─── Targets ─────────────────────────────────────────────────────────────────

pub const TARGET_COLUMNS: &str =
  "target_id, name, is_sponsor, matched_sponsor_id, flag_updated_at";

pub struct RawTarget {
  pub target_id:          String,
  pub name:               String,
  pub is_sponsor:         i64,
  pub matched_sponsor_id: Option<String>,
  pub flag_updated_at:    Option<String>,
}

impl RawTarget {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      target_id:          row.get(0)?,
      name:               row.get(1)?,
      is_sponsor:         row.get(2)?,
      matched_sponsor_id: row.get(3)?,
      flag_updated_at:    row.get(4)?,
    })
  }

  pub fn into_target(self) -> Result<TargetRecord> {
    Ok(TargetRecord {
      target_id:       decode_uuid(&self.target_id)?,
      name:            self.name,
      is_sponsor:      self.is_sponsor != 0,
      matched_sponsor: self.matched_sponsor_id.as_deref().map(decode_uuid).transpose()?,
      flag_updated_at: self.flag_updated_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}
