//! Day-boundary snapshot
//!
//! A plain-text file holding, per strategy-id, exactly the state needed
//! to restart without losing inventory or the spread mean estimate:
//! today's incremental net change, the spread EMA, both leg symbols, and
//! the two legs' yesterday positions (passive for leg 1, aggressive for
//! leg 2).
//!
//! The header line is frozen; external reporting tools parse it.

use crate::core::EngineError;
use std::fmt::Write as _;
use std::path::Path;
use tracing::warn;

/// Frozen header line.
pub const HEADER: &str = "StrategyID 2day avgPx m_origbaseName1 m_origbaseName2 ytd1 ytd2";

/// One persisted row
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRow {
    pub strategy_id: i32,
    /// Today's incremental net change on the passive leg.
    pub today_net: i64,
    /// Spread EMA at save time.
    pub avg_px: f64,
    pub leg1_symbol: String,
    pub leg2_symbol: String,
    /// Yesterday net passive position (leg 1).
    pub ytd_passive: i64,
    /// Yesterday net aggressive position (leg 2).
    pub ytd_aggressive: i64,
}

impl SnapshotRow {
    /// All-zero row for a strategy with no saved state.
    pub fn empty(strategy_id: i32) -> Self {
        Self {
            strategy_id,
            today_net: 0,
            avg_px: 0.0,
            leg1_symbol: String::new(),
            leg2_symbol: String::new(),
            ytd_passive: 0,
            ytd_aggressive: 0,
        }
    }
}

fn parse_row(line: &str) -> Option<SnapshotRow> {
    let mut it = line.split_whitespace();
    let row = SnapshotRow {
        strategy_id: it.next()?.parse().ok()?,
        today_net: it.next()?.parse().ok()?,
        avg_px: it.next()?.parse().ok()?,
        leg1_symbol: it.next()?.to_string(),
        leg2_symbol: it.next()?.to_string(),
        ytd_passive: it.next()?.parse().ok()?,
        ytd_aggressive: it.next()?.parse().ok()?,
    };
    Some(row)
}

/// Load the row for `strategy_id`.
///
/// A missing file, an unreadable file, or an absent row all degrade to
/// the zero row (logged once here); day-start state is never fatal.
pub fn load(path: &Path, strategy_id: i32) -> SnapshotRow {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "snapshot not loadable, starting from zero state"
            );
            return SnapshotRow::empty(strategy_id);
        }
    };

    for line in text.lines().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_row(line) {
            Some(row) if row.strategy_id == strategy_id => return row,
            Some(_) => continue,
            None => {
                warn!(path = %path.display(), line, "malformed snapshot row, skipping");
            }
        }
    }
    SnapshotRow::empty(strategy_id)
}

/// Load every well-formed row (other strategies' rows must survive a
/// save by this process).
pub fn load_all(path: &Path) -> Vec<SnapshotRow> {
    let Ok(text) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    text.lines()
        .skip(1)
        .filter_map(|l| parse_row(l.trim()))
        .collect()
}

/// Rewrite the whole file: header plus one row per strategy-id, with
/// `row` replacing (or appending to) any previous row for its id.
pub fn save(path: &Path, row: &SnapshotRow) -> Result<(), EngineError> {
    let mut rows = load_all(path);
    match rows.iter_mut().find(|r| r.strategy_id == row.strategy_id) {
        Some(existing) => *existing = row.clone(),
        None => rows.push(row.clone()),
    }

    let mut out = String::with_capacity(128);
    out.push_str(HEADER);
    out.push('\n');
    for r in &rows {
        // avgPx keeps six decimals to round-trip the EMA.
        let _ = writeln!(
            out,
            "{} {} {:.6} {} {} {} {}",
            r.strategy_id,
            r.today_net,
            r.avg_px,
            r.leg1_symbol,
            r.leg2_symbol,
            r.ytd_passive,
            r.ytd_aggressive
        );
    }

    std::fs::write(path, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_missing_file_loads_zero_row() {
        let dir = tempfile::tempdir().unwrap();
        let row = load(&dir.path().join("absent.txt"), 92201);
        assert_eq!(row, SnapshotRow::empty(92201));
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("day.txt");
        let row = SnapshotRow {
            strategy_id: 92201,
            today_net: 0,
            avg_px: 96.671581,
            leg1_symbol: "ag2603".into(),
            leg2_symbol: "ag2605".into(),
            ytd_passive: 83,
            ytd_aggressive: -83,
        };
        save(&path, &row).unwrap();

        let loaded = load(&path, 92201);
        assert_eq!(loaded.strategy_id, 92201);
        assert_relative_eq!(loaded.avg_px, 96.671581);
        assert_eq!(loaded.leg1_symbol, "ag2603");
        assert_eq!(loaded.leg2_symbol, "ag2605");
        assert_eq!(loaded.ytd_passive, 83);
        assert_eq!(loaded.ytd_aggressive, -83);
    }

    #[test]
    fn test_header_line_is_frozen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("day.txt");
        save(&path, &SnapshotRow::empty(1)).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text.lines().next().unwrap(),
            "StrategyID 2day avgPx m_origbaseName1 m_origbaseName2 ytd1 ytd2"
        );
    }

    #[test]
    fn test_other_rows_survive_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("day.txt");

        let mut a = SnapshotRow::empty(1);
        a.leg1_symbol = "cu2602".into();
        a.leg2_symbol = "cu2604".into();
        save(&path, &a).unwrap();

        let mut b = SnapshotRow::empty(2);
        b.leg1_symbol = "ag2603".into();
        b.leg2_symbol = "ag2605".into();
        b.ytd_passive = 7;
        save(&path, &b).unwrap();

        assert_eq!(load(&path, 1).leg1_symbol, "cu2602");
        assert_eq!(load(&path, 2).ytd_passive, 7);
        assert_eq!(load_all(&path).len(), 2);
    }

    #[test]
    fn test_save_overwrites_same_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("day.txt");

        let mut row = SnapshotRow::empty(1);
        row.leg1_symbol = "x".into();
        row.leg2_symbol = "y".into();
        row.today_net = 5;
        save(&path, &row).unwrap();
        row.today_net = 9;
        save(&path, &row).unwrap();

        assert_eq!(load(&path, 1).today_net, 9);
        assert_eq!(load_all(&path).len(), 1);
    }

    #[test]
    fn test_malformed_rows_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("day.txt");
        std::fs::write(
            &path,
            format!("{HEADER}\nnot a row at all\n92201 0 96.671581 ag2603 ag2605 83 -83\n"),
        )
        .unwrap();

        let row = load(&path, 92201);
        assert_eq!(row.ytd_passive, 83);
        assert_eq!(row.ytd_aggressive, -83);
    }
}
