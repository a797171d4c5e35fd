//! Subscription query parameters.
//!
//! Only the parameters in [`ALLOWED_PARAMS`] may travel from a client to the
//! upstream change feed. Everything else, most importantly any attempt to
//! pass a `where` filter, is dropped while parsing.

use crate::change_feed::Offset;
use crate::error::{ProtocolError, ProtocolResult};

/// Query parameters a client may send on a subscription request.
pub const ALLOWED_PARAMS: [&str; 5] = ["live", "table", "handle", "offset", "cursor"];

/// Query parameter carrying the server-side row filter upstream.
pub const WHERE_PARAM: &str = "where";

/// Parsed, allow-listed subscription parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionParams {
    /// Long-poll for new changes instead of returning immediately.
    pub live: bool,
    /// Table the subscription reads.
    pub table: Option<String>,
    /// Log handle the offset belongs to.
    pub handle: Option<String>,
    /// Position to resume from; absent means a fresh snapshot.
    pub offset: Option<Offset>,
    /// Opaque live cursor.
    pub cursor: Option<String>,
}

impl SubscriptionParams {
    /// Parameters for the initial snapshot request.
    pub fn initial() -> Self {
        Self {
            offset: Some(Offset::Before),
            ..Self::default()
        }
    }

    /// Parses query pairs, keeping only allow-listed parameters.
    ///
    /// Returns the parsed parameters and the names of the dropped ones.
    pub fn from_query_pairs<I, K, V>(pairs: I) -> ProtocolResult<(Self, Vec<String>)>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params = Self::default();
        let mut dropped = Vec::new();

        for (name, value) in pairs {
            let (name, value) = (name.as_ref(), value.as_ref());
            match name {
                "live" => params.live = parse_bool(name, value)?,
                "table" => params.table = Some(value.to_string()),
                "handle" => params.handle = Some(value.to_string()),
                "offset" => params.offset = Some(value.parse()?),
                "cursor" => params.cursor = Some(value.to_string()),
                other => dropped.push(other.to_string()),
            }
        }

        Ok((params, dropped))
    }

    /// Renders the parameters as query pairs, in allow-list order.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if self.live {
            pairs.push(("live".to_string(), "true".to_string()));
        }
        if let Some(ref table) = self.table {
            pairs.push(("table".to_string(), table.clone()));
        }
        if let Some(ref handle) = self.handle {
            pairs.push(("handle".to_string(), handle.clone()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset".to_string(), offset.to_string()));
        }
        if let Some(ref cursor) = self.cursor {
            pairs.push(("cursor".to_string(), cursor.clone()));
        }
        pairs
    }
}

fn parse_bool(name: &str, value: &str) -> ProtocolResult<bool> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" | "" => Ok(false),
        _ => Err(ProtocolError::invalid_param(name, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn drops_parameters_outside_the_allow_list() {
        let pairs = [
            ("table", "todos"),
            ("offset", "-1"),
            ("where", "true"),
            ("columns", "id"),
        ];
        let (params, dropped) = SubscriptionParams::from_query_pairs(pairs).unwrap();

        assert_eq!(params.table.as_deref(), Some("todos"));
        assert_eq!(params.offset, Some(Offset::Before));
        assert_eq!(dropped, vec!["where".to_string(), "columns".to_string()]);
    }

    #[test]
    fn parses_live_flag() {
        let (params, _) = SubscriptionParams::from_query_pairs([("live", "true")]).unwrap();
        assert!(params.live);
        assert!(SubscriptionParams::from_query_pairs([("live", "maybe")]).is_err());
    }

    #[test]
    fn rejects_bad_offsets() {
        assert!(SubscriptionParams::from_query_pairs([("offset", "soon")]).is_err());
    }

    #[test]
    fn query_pairs_never_contain_a_filter() {
        let params = SubscriptionParams {
            live: true,
            table: Some("todos".into()),
            handle: Some("h".into()),
            offset: Some(Offset::At(3)),
            cursor: Some("c".into()),
        };
        let pairs = params.to_query_pairs();
        assert_eq!(pairs.len(), 5);
        assert!(pairs.iter().all(|(k, _)| ALLOWED_PARAMS.contains(&k.as_str())));
    }

    proptest! {
        #[test]
        fn only_allow_listed_names_survive(
            names in proptest::collection::vec("[a-z]{1,8}", 0..12)
        ) {
            let pairs: Vec<(String, String)> =
                names.iter().map(|n| (n.clone(), "1".to_string())).collect();
            let (params, dropped) = SubscriptionParams::from_query_pairs(
                pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            )
            .unwrap();

            for (name, _) in params.to_query_pairs() {
                prop_assert!(ALLOWED_PARAMS.contains(&name.as_str()));
            }
            for name in dropped {
                prop_assert!(!ALLOWED_PARAMS.contains(&name.as_str()));
            }
        }
    }
}
