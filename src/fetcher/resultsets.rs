//! Helpers for the stats API's tabular `resultSets` payloads
//!
//! Most stats endpoints return `{resultSets: [{name, headers, rowSet}]}`
//! with positional rows. These helpers give named-column access without
//! committing to a schema upstream of the synchronizers.

use std::collections::HashMap;

use serde_json::Value;

/// A named result set with header-indexed rows.
#[derive(Debug)]
pub struct ResultSet<'a> {
    columns: HashMap<&'a str, usize>,
    rows: &'a [Value],
}

/// Finds a result set by name, e.g. `TeamBackground` or `CommonPlayerInfo`.
pub fn find<'a>(payload: &'a Value, name: &str) -> Option<ResultSet<'a>> {
    payload
        .get("resultSets")?
        .as_array()?
        .iter()
        .find(|set| set.get("name").and_then(Value::as_str) == Some(name))
        .and_then(ResultSet::from_value)
}

/// The first result set, for endpoints that return exactly one.
pub fn first(payload: &Value) -> Option<ResultSet<'_>> {
    payload
        .get("resultSets")?
        .as_array()?
        .first()
        .and_then(ResultSet::from_value)
}

impl<'a> ResultSet<'a> {
    fn from_value(set: &'a Value) -> Option<Self> {
        let columns = set
            .get("headers")?
            .as_array()?
            .iter()
            .enumerate()
            .filter_map(|(i, h)| h.as_str().map(|name| (name, i)))
            .collect();
        let rows = set.get("rowSet")?.as_array()?.as_slice();
        Some(ResultSet { columns, rows })
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'a, '_>> {
        self.rows.iter().filter_map(|row| {
            row.as_array().map(|values| Row {
                columns: &self.columns,
                values,
            })
        })
    }

    pub fn first_row(&self) -> Option<Row<'a, '_>> {
        self.rows().next()
    }
}

/// One positional row with named-column lookup.
#[derive(Debug)]
pub struct Row<'a, 'b> {
    columns: &'b HashMap<&'a str, usize>,
    values: &'a Vec<Value>,
}

impl Row<'_, '_> {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .get(column)
            .and_then(|&index| self.values.get(index))
    }

    pub fn str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    pub fn i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    /// String form of a column that may arrive as string or number
    /// (`FROM_YEAR` does both across seasons).
    pub fn str_or_number(&self, column: &str) -> Option<String> {
        match self.get(column)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "resource": "teamdetails",
            "resultSets": [
                {
                    "name": "TeamBackground",
                    "headers": ["TEAM_ID", "ABBREVIATION", "NICKNAME", "YEARFOUNDED"],
                    "rowSet": [[1610612747, "LAL", "Lakers", 1948]]
                },
                {
                    "name": "TeamHistory",
                    "headers": ["TEAM_ID", "CITY"],
                    "rowSet": []
                }
            ]
        })
    }

    #[test]
    fn test_find_by_name() {
        let payload = sample();
        let set = find(&payload, "TeamBackground").unwrap();
        let row = set.first_row().unwrap();
        assert_eq!(row.i64("TEAM_ID"), Some(1610612747));
        assert_eq!(row.str("ABBREVIATION"), Some("LAL"));
        assert_eq!(row.i64("YEARFOUNDED"), Some(1948));
        assert!(row.get("MISSING").is_none());
    }

    #[test]
    fn test_find_missing_set() {
        let payload = sample();
        assert!(find(&payload, "NoSuchSet").is_none());
    }

    #[test]
    fn test_first_set_and_empty_rows() {
        let payload = sample();
        assert!(first(&payload).is_some());
        let history = find(&payload, "TeamHistory").unwrap();
        assert!(history.is_empty());
        assert!(history.first_row().is_none());
    }

    #[test]
    fn test_str_or_number() {
        let payload = json!({
            "resultSets": [{
                "name": "CommonAllPlayers",
                "headers": ["FROM_YEAR", "TO_YEAR"],
                "rowSet": [["2003", 2024]]
            }]
        });
        let set = first(&payload).unwrap();
        let row = set.first_row().unwrap();
        assert_eq!(row.str_or_number("FROM_YEAR"), Some("2003".to_string()));
        assert_eq!(row.str_or_number("TO_YEAR"), Some("2024".to_string()));
    }

    #[test]
    fn test_malformed_payload_yields_none() {
        assert!(find(&json!({"resultSets": "nope"}), "X").is_none());
        assert!(first(&json!({})).is_none());
    }
}
