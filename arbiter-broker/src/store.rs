//! Sqlite-backed append-only decision store.

use std::path::Path;
use std::sync::Mutex;

use arbiter_core::{Decision, FeatureVector, FillFeedback, ModelArtifact, ModelLineage, TraceId};
use rusqlite::{params, Connection};
use tracing::debug;

use crate::{BrokerResult, DecisionStore};

/// Persists the audit trail as JSON rows keyed by trace id. Payloads are
/// stored whole so the schema survives field additions without migrations.
pub struct SqliteDecisionStore {
    conn: Mutex<Connection>,
}

impl SqliteDecisionStore {
    pub fn new(path: &Path) -> BrokerResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests and replay runs.
    pub fn new_in_memory() -> BrokerResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> BrokerResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS features (
                trace_id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                payload TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS decisions (
                trace_id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                payload TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS feedback (
                trace_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                closed INTEGER NOT NULL,
                recorded_at TEXT NOT NULL,
                payload TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS artifacts (
                version TEXT PRIMARY KEY,
                lineage TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                payload TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_decisions_symbol ON decisions (symbol, recorded_at);
            CREATE INDEX IF NOT EXISTS idx_feedback_trace ON feedback (trace_id);",
        )?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl DecisionStore for SqliteDecisionStore {
    fn record_features(&self, features: &FeatureVector, trace_id: TraceId) -> BrokerResult<()> {
        let payload = serde_json::to_string(features)?;
        self.lock().execute(
            "INSERT OR REPLACE INTO features (trace_id, symbol, recorded_at, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                trace_id.to_string(),
                features.symbol,
                features.timestamp.to_rfc3339(),
                payload
            ],
        )?;
        Ok(())
    }

    fn record_decision(&self, decision: &Decision) -> BrokerResult<()> {
        let payload = serde_json::to_string(decision)?;
        self.lock().execute(
            "INSERT OR REPLACE INTO decisions (trace_id, symbol, recorded_at, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                decision.trace_id.to_string(),
                decision.symbol,
                decision.timestamp.to_rfc3339(),
                payload
            ],
        )?;
        debug!(
            target: "arbiter.store",
            trace_id = %decision.trace_id,
            action = decision.action.kind(),
            "persisted decision"
        );
        Ok(())
    }

    fn record_feedback(&self, feedback: &FillFeedback) -> BrokerResult<()> {
        let payload = serde_json::to_string(feedback)?;
        self.lock().execute(
            "INSERT INTO feedback (trace_id, symbol, closed, recorded_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                feedback.trace_id.to_string(),
                feedback.symbol,
                feedback.closed as i64,
                feedback.timestamp.to_rfc3339(),
                payload
            ],
        )?;
        Ok(())
    }

    fn record_artifact(&self, artifact: &ModelArtifact) -> BrokerResult<()> {
        let payload = serde_json::to_string(artifact)?;
        self.lock().execute(
            "INSERT OR REPLACE INTO artifacts (version, lineage, recorded_at, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                artifact.version.to_string(),
                artifact.lineage.to_string(),
                artifact.created_at.to_rfc3339(),
                payload
            ],
        )?;
        Ok(())
    }

    fn decision(&self, trace_id: TraceId) -> BrokerResult<Option<Decision>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT payload FROM decisions WHERE trace_id = ?1")?;
        let mut rows = stmt.query(params![trace_id.to_string()])?;
        match rows.next()? {
            Some(row) => {
                let payload: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&payload)?))
            }
            None => Ok(None),
        }
    }

    fn decisions_for(&self, symbol: &str, limit: usize) -> BrokerResult<Vec<Decision>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT payload FROM decisions WHERE symbol = ?1
             ORDER BY recorded_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![symbol, limit as i64], |row| {
            row.get::<_, String>(0)
        })?;
        let mut decisions = Vec::new();
        for payload in rows {
            decisions.push(serde_json::from_str(&payload?)?);
        }
        Ok(decisions)
    }

    fn feedback_count(&self, symbol: &str) -> BrokerResult<usize> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM feedback WHERE symbol = ?1",
            params![symbol],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn training_rows(&self, symbol: &str) -> BrokerResult<Vec<(FeatureVector, FillFeedback)>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT f.payload, fb.payload
             FROM feedback fb
             JOIN features f ON f.trace_id = fb.trace_id
             WHERE fb.symbol = ?1 AND fb.closed = 1
             ORDER BY fb.recorded_at ASC",
        )?;
        let rows = stmt.query_map(params![symbol], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut joined = Vec::new();
        for row in rows {
            let (features_json, feedback_json) = row?;
            joined.push((
                serde_json::from_str(&features_json)?,
                serde_json::from_str(&feedback_json)?,
            ));
        }
        Ok(joined)
    }

    fn latest_offline_candidate(&self) -> BrokerResult<Option<ModelArtifact>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT payload FROM artifacts WHERE lineage = ?1
             ORDER BY recorded_at DESC LIMIT 1",
        )?;
        let mut rows = stmt.query(params![ModelLineage::Offline.to_string()])?;
        match rows.next()? {
            Some(row) => {
                let payload: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&payload)?))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_core::{DecisionAction, Side};
    use chrono::Utc;

    fn features(trace: TraceId) -> (FeatureVector, TraceId) {
        (
            FeatureVector {
                symbol: "BTCUSDT".into(),
                timestamp: Utc::now(),
                ret_1: 0.01,
                momentum: 0.0,
                ma_ratio: 1.0,
                volatility: 0.01,
                volume_ratio: 1.0,
                rsi: 50.0,
                band_position: 0.5,
                win_rate: 0.5,
                fee_drag: 0.0,
                atr: 2.0,
                close: 100.0,
            },
            trace,
        )
    }

    fn decision(trace: TraceId) -> Decision {
        Decision {
            trace_id: trace,
            symbol: "BTCUSDT".into(),
            timestamp: Utc::now(),
            action: DecisionAction::Hold,
            confidence: 0.0,
            strategy: None,
            model_version: None,
            reference_price: 100.0,
            targets: None,
            dry_run: true,
        }
    }

    fn closing_feedback(trace: TraceId) -> FillFeedback {
        FillFeedback {
            trace_id: trace,
            symbol: "BTCUSDT".into(),
            side: Side::Sell,
            fill_price: 101.0,
            size: 1.0,
            fee_paid: 0.101,
            closed: true,
            realized_pnl_net: Some(0.8),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn round_trips_decisions_by_trace() {
        let store = SqliteDecisionStore::new_in_memory().unwrap();
        let trace = TraceId::new();
        let d = decision(trace);
        store.record_decision(&d).unwrap();
        assert_eq!(store.decision(trace).unwrap().unwrap(), d);
        assert!(store.decision(TraceId::new()).unwrap().is_none());
    }

    #[test]
    fn training_rows_join_features_with_closing_feedback() {
        let store = SqliteDecisionStore::new_in_memory().unwrap();
        let closed = TraceId::new();
        let open = TraceId::new();
        let (fv, _) = features(closed);
        store.record_features(&fv, closed).unwrap();
        let (fv2, _) = features(open);
        store.record_features(&fv2, open).unwrap();
        store.record_feedback(&closing_feedback(closed)).unwrap();
        let mut partial = closing_feedback(open);
        partial.closed = false;
        partial.realized_pnl_net = None;
        store.record_feedback(&partial).unwrap();

        let rows = store.training_rows("BTCUSDT").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1.trace_id, closed);
        assert_eq!(rows[0].1.realized_pnl_net, Some(0.8));
    }

    #[test]
    fn recent_decisions_are_scoped_by_symbol() {
        let store = SqliteDecisionStore::new_in_memory().unwrap();
        let mut other = decision(TraceId::new());
        other.symbol = "ETHUSDT".into();
        store.record_decision(&other).unwrap();
        store.record_decision(&decision(TraceId::new())).unwrap();
        store.record_decision(&decision(TraceId::new())).unwrap();
        assert_eq!(store.decisions_for("BTCUSDT", 10).unwrap().len(), 2);
        assert_eq!(store.decisions_for("ETHUSDT", 10).unwrap().len(), 1);
    }

    #[test]
    fn latest_offline_candidate_skips_online_artifacts() {
        let store = SqliteDecisionStore::new_in_memory().unwrap();
        assert!(store.latest_offline_candidate().unwrap().is_none());

        let seed = ModelArtifact::seed();
        store.record_artifact(&seed).unwrap();
        assert!(
            store.latest_offline_candidate().unwrap().is_none(),
            "online seeds are not candidates"
        );

        let mut older = ModelArtifact::seed();
        older.lineage = ModelLineage::Offline;
        older.created_at = Utc::now() - chrono::Duration::hours(1);
        store.record_artifact(&older).unwrap();
        let mut newer = ModelArtifact::seed();
        newer.lineage = ModelLineage::Offline;
        newer.created_at = Utc::now();
        store.record_artifact(&newer).unwrap();

        let found = store.latest_offline_candidate().unwrap().unwrap();
        assert_eq!(found.version, newer.version);
    }
}
