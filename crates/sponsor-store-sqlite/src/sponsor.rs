//! [`SqliteSponsorStore`]: the sponsor directory as a JSON document table.

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use sponsor_core::{
  record::SponsorRecord,
  store::{Loaded, SkippedRecord, SponsorRepository},
};

use crate::{
  Error, Result,
  encode::{RawSponsor, SponsorDocument, encode_dt, encode_uuid},
  schema::SPONSOR_SCHEMA,
};

/// Projection of the fields the matching engine needs from a document.
const PROJECTION: &str = "doc_id,
  json_extract(body, '$.name'),
  json_extract(body, '$.alternate_names'),
  json_extract(body, '$.active')";

fn raw_sponsor(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSponsor> {
  Ok(RawSponsor {
    doc_id:          row.get(0)?,
    name:            row.get(1)?,
    alternate_names: row.get(2)?,
    active:          row.get(3)?,
  })
}

/// A sponsor directory backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteSponsorStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteSponsorStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SPONSOR_SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Insert or replace the document for `sponsor`.
  pub async fn put_sponsor(&self, sponsor: &SponsorRecord) -> Result<()> {
    let body = serde_json::to_value(SponsorDocument::from(sponsor))?;
    self.put_document(sponsor.sponsor_id, &body).await
  }

  /// Insert or replace a raw document. Fields beyond `name`,
  /// `alternate_names` and `active` are stored but never read back.
  pub async fn put_document(&self, id: Uuid, body: &serde_json::Value) -> Result<()> {
    let id_str   = encode_uuid(id);
    let body_str = body.to_string();
    let at_str   = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sponsor_documents (doc_id, body, updated_at)
           VALUES (?1, ?2, ?3)
           ON CONFLICT (doc_id) DO UPDATE
             SET body = excluded.body, updated_at = excluded.updated_at",
          rusqlite::params![id_str, body_str, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Set the `active` field of a document. Returns `false` if no document
  /// has this id.
  pub async fn set_active(&self, id: Uuid, active: bool) -> Result<bool> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(Utc::now());
    let flag   = if active { "true" } else { "false" };

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE sponsor_documents
           SET body = json_set(body, '$.active', json(?2)), updated_at = ?3
           WHERE doc_id = ?1",
          rusqlite::params![id_str, flag, at_str],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  /// Delete a document. Returns `false` if no document has this id.
  pub async fn delete_sponsor(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM sponsor_documents WHERE doc_id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }
}

// ─── SponsorRepository impl ──────────────────────────────────────────────────

impl SponsorRepository for SqliteSponsorStore {
  type Error = Error;

  async fn fetch_active_sponsors(&self) -> Result<Loaded<SponsorRecord>> {
    let raws: Vec<RawSponsor> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PROJECTION} FROM sponsor_documents
           WHERE json_extract(body, '$.active') = 1
           ORDER BY json_extract(body, '$.name'), doc_id"
        ))?;
        let rows = stmt
          .query_map([], raw_sponsor)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut loaded = Loaded::default();
    for raw in raws {
      let doc_id = raw.doc_id.clone();
      match raw.into_sponsor() {
        Ok(sponsor) => loaded.records.push(sponsor),
        Err(e) => {
          tracing::warn!(doc_id = %doc_id, error = %e, "skipping undecodable sponsor document");
          loaded.skipped.push(SkippedRecord { id: doc_id, reason: e.to_string() });
        }
      }
    }
    Ok(loaded)
  }

  async fn get_sponsor(&self, id: Uuid) -> Result<Option<SponsorRecord>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawSponsor> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {PROJECTION} FROM sponsor_documents WHERE doc_id = ?1"),
              rusqlite::params![id_str],
              raw_sponsor,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSponsor::into_sponsor).transpose()
  }

  async fn count_active(&self) -> Result<u64> {
    let count: i64 = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM sponsor_documents
           WHERE json_extract(body, '$.active') = 1",
          [],
          |row| row.get(0),
        )?)
      })
      .await?;
    Ok(count as u64)
  }
}
