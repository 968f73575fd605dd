//! [`SqliteTargetStore`]: the SQLite implementation of [`TargetRepository`].

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use sponsor_core::{
  record::{FlagStats, FlagUpdate, TargetRecord},
  store::{Loaded, SkippedRecord, TargetRepository},
};

use crate::{
  Error, Result,
  encode::{RawTarget, TARGET_COLUMNS, decode_dt, encode_dt, encode_uuid},
  schema::TARGET_SCHEMA,
};

/// Employer records backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteTargetStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteTargetStore {
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
        conn.execute_batch(TARGET_SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  #[cfg(test)]
  pub(crate) fn conn_for_tests(&self) -> &tokio_rusqlite::Connection { &self.conn }

  /// Insert a new, never-evaluated employer.
  pub async fn add_target(&self, name: impl Into<String>) -> Result<TargetRecord> {
    let target = TargetRecord::new(name);

    let id_str = encode_uuid(target.target_id);
    let name = target.name.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO employers (target_id, name) VALUES (?1, ?2)",
          rusqlite::params![id_str, name],
        )?;
        Ok(())
      })
      .await?;

    Ok(target)
  }

  /// Retrieve a target by UUID. Returns `None` if not found.
  pub async fn get_target(&self, id: Uuid) -> Result<Option<TargetRecord>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawTarget> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {TARGET_COLUMNS} FROM employers WHERE target_id = ?1"),
              rusqlite::params![id_str],
              RawTarget::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawTarget::into_target).transpose()
  }

  /// Run a target query with positional parameters and decode each row,
  /// skipping the ones that fail.
  async fn select_targets(
    &self,
    sql: String,
    params: Vec<rusqlite::types::Value>,
  ) -> Result<Loaded<TargetRecord>> {
    let raws: Vec<RawTarget> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawTarget::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut loaded = Loaded::default();
    for raw in raws {
      let target_id = raw.target_id.clone();
      match raw.into_target() {
        Ok(target) => loaded.records.push(target),
        Err(e) => {
          tracing::warn!(target_id = %target_id, error = %e, "skipping undecodable employer row");
          loaded.skipped.push(SkippedRecord { id: target_id, reason: e.to_string() });
        }
      }
    }
    Ok(loaded)
  }
}

// ─── TargetRepository impl ───────────────────────────────────────────────────

impl TargetRepository for SqliteTargetStore {
  type Error = Error;

  async fn fetch_stale_targets(
    &self,
    staleness_days: u32,
    limit: usize,
  ) -> Result<Loaded<TargetRecord>> {
    let cutoff = encode_dt(Utc::now() - Duration::days(i64::from(staleness_days)));
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);

    self
      .select_targets(
        format!(
          "SELECT {TARGET_COLUMNS} FROM employers
           WHERE flag_updated_at IS NULL OR flag_updated_at < ?1
           ORDER BY flag_updated_at IS NOT NULL, flag_updated_at, target_id
           LIMIT ?2"
        ),
        vec![cutoff.into(), limit.into()],
      )
      .await
  }

  async fn fetch_all_targets(&self) -> Result<Loaded<TargetRecord>> {
    self
      .select_targets(
        format!("SELECT {TARGET_COLUMNS} FROM employers ORDER BY rowid"),
        vec![],
      )
      .await
  }

  async fn fetch_flagged_targets(&self) -> Result<Loaded<TargetRecord>> {
    self
      .select_targets(
        format!(
          "SELECT {TARGET_COLUMNS} FROM employers
           WHERE is_sponsor = 1 AND matched_sponsor_id IS NOT NULL
           ORDER BY rowid"
        ),
        vec![],
      )
      .await
  }

  async fn update_flag(
    &self,
    id: Uuid,
    update: FlagUpdate,
    at: DateTime<Utc>,
  ) -> Result<()> {
    let id_str      = encode_uuid(id);
    let is_sponsor  = i64::from(update.is_sponsor());
    let sponsor_str = update.sponsor_id().map(encode_uuid);
    let at_str      = encode_dt(at);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE employers
           SET is_sponsor = ?2, matched_sponsor_id = ?3, flag_updated_at = ?4
           WHERE target_id = ?1",
          rusqlite::params![id_str, is_sponsor, sponsor_str, at_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::TargetNotFound(id));
    }
    Ok(())
  }

  async fn bulk_reset_flags(&self, ids: Vec<Uuid>, at: DateTime<Utc>) -> Result<u64> {
    let id_strs: Vec<String> = ids.into_iter().map(encode_uuid).collect();
    let at_str = encode_dt(at);

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut written = 0_u64;
        {
          let mut stmt = tx.prepare(
            "UPDATE employers
             SET is_sponsor = 0, matched_sponsor_id = NULL, flag_updated_at = ?2
             WHERE target_id = ?1",
          )?;
          for id in &id_strs {
            written += stmt.execute(rusqlite::params![id, at_str])? as u64;
          }
        }
        tx.commit()?;
        Ok(written)
      })
      .await?;

    Ok(written)
  }

  async fn flag_stats(&self) -> Result<FlagStats> {
    let (total, flagged, never_updated, last): (i64, i64, i64, Option<String>) = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*),
                  COALESCE(SUM(is_sponsor), 0),
                  COALESCE(SUM(flag_updated_at IS NULL), 0),
                  MAX(flag_updated_at)
           FROM employers",
          [],
          |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?)
      })
      .await?;

    Ok(FlagStats {
      total:           total as u64,
      flagged:         flagged as u64,
      never_updated:   never_updated as u64,
      last_updated_at: last.as_deref().map(decode_dt).transpose()?,
    })
  }
}
