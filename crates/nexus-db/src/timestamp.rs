//! Timestamps are stored as fixed-width UTC text so that string comparison in
//! SQL matches chronological order. The edit/unsend window check relies on it.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use rusqlite::Row;
use rusqlite::types::Type;

const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Drops sub-microsecond precision so a value survives a round trip through
/// the database unchanged.
pub fn truncate(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

pub fn to_sql(ts: DateTime<Utc>) -> String {
    ts.format(FORMAT).to_string()
}

pub fn parse(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, FORMAT).map(|ndt| ndt.and_utc())
}

pub(crate) fn column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn optional_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => parse(&raw)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn text_order_matches_time_order() {
        let base = Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap();
        let later = base + Duration::microseconds(1);
        let much_later = base + Duration::seconds(901);

        assert!(to_sql(base) < to_sql(later));
        assert!(to_sql(later) < to_sql(much_later));
    }

    #[test]
    fn truncated_value_survives_storage_format() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap() + Duration::nanoseconds(123_456_789);
        let stored = truncate(ts);
        assert_eq!(parse(&to_sql(stored)).unwrap(), stored);
    }
}
