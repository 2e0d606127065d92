use serde_json::{json, Value};

use crate::backend::Record;
use crate::uri::Uri;

/// Backend-neutral filter predicate.
///
/// Query layers build an `Expr` without knowing which store will run it;
/// each backend renders or evaluates it in its own terms.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Matches every record.
    All,
    UriEq(Uri),
    UriIn(Vec<Uri>),
    /// Top-level field equals a JSON value. `Null` also matches a missing field.
    FieldEq(String, Value),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn uri_eq(uri: Uri) -> Self {
        Expr::UriEq(uri)
    }

    pub fn uri_in(uris: impl IntoIterator<Item = Uri>) -> Self {
        Expr::UriIn(uris.into_iter().collect())
    }

    pub fn field_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Expr::FieldEq(field.into(), value.into())
    }

    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut items) => {
                items.push(other);
                Expr::And(items)
            }
            Expr::All => other,
            first => Expr::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut items) => {
                items.push(other);
                Expr::Or(items)
            }
            first => Expr::Or(vec![first, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Evaluate against a stored record.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Expr::All => true,
            Expr::UriEq(uri) => &record.uri == uri,
            Expr::UriIn(uris) => uris.contains(&record.uri),
            Expr::FieldEq(field, expected) => match record.fields.get(field) {
                Some(actual) => actual == expected,
                None => expected.is_null(),
            },
            Expr::And(items) => items.iter().all(|e| e.matches(record)),
            Expr::Or(items) => items.iter().any(|e| e.matches(record)),
            Expr::Not(inner) => !inner.matches(record),
        }
    }

    /// SPARQL filter expression over `?{uri_var}` (fields bind to `?{field}`).
    pub fn to_sparql(&self, uri_var: &str) -> String {
        match self {
            Expr::All => "true".to_string(),
            Expr::UriEq(uri) => format!("?{} = {}", uri_var, sparql_iri(uri.as_str())),
            Expr::UriIn(uris) if uris.is_empty() => "false".to_string(),
            Expr::UriIn(uris) => {
                let items: Vec<String> = uris.iter().map(|u| sparql_iri(u.as_str())).collect();
                format!("?{} IN ({})", uri_var, items.join(", "))
            }
            Expr::FieldEq(field, value) => match value {
                Value::Null => format!("!BOUND(?{})", field),
                other => format!("?{} = {}", field, sparql_term(other)),
            },
            Expr::And(items) => join_sparql(items, uri_var, " && ", "true"),
            Expr::Or(items) => join_sparql(items, uri_var, " || ", "false"),
            Expr::Not(inner) => format!("!({})", inner.to_sparql(uri_var)),
        }
    }

    /// SQL `WHERE` fragment; `alias` qualifies column names when given.
    pub fn to_sql(&self, alias: Option<&str>, uri_column: &str) -> String {
        match self {
            Expr::All => "TRUE".to_string(),
            Expr::UriEq(uri) => format!(
                "{} = {}",
                qualified(alias, uri_column),
                sql_literal(uri.as_str())
            ),
            Expr::UriIn(uris) if uris.is_empty() => "FALSE".to_string(),
            Expr::UriIn(uris) => {
                let items: Vec<String> = uris.iter().map(|u| sql_literal(u.as_str())).collect();
                format!("{} IN ({})", qualified(alias, uri_column), items.join(", "))
            }
            Expr::FieldEq(field, Value::Null) => format!("{} IS NULL", qualified(alias, field)),
            Expr::FieldEq(field, value) => {
                format!("{} = {}", qualified(alias, field), sql_value(value))
            }
            Expr::And(items) => join_sql(items, alias, uri_column, " AND ", "TRUE"),
            Expr::Or(items) => join_sql(items, alias, uri_column, " OR ", "FALSE"),
            Expr::Not(inner) => format!("NOT ({})", inner.to_sql(alias, uri_column)),
        }
    }

    /// Mongo-style document filter.
    pub fn to_document(&self, uri_field: &str) -> Value {
        match self {
            Expr::All => json!({}),
            Expr::UriEq(uri) => json!({ uri_field: uri.as_str() }),
            Expr::UriIn(uris) => {
                let items: Vec<&str> = uris.iter().map(Uri::as_str).collect();
                json!({ uri_field: { "$in": items } })
            }
            Expr::FieldEq(field, value) => json!({ field.as_str(): value }),
            // Mongo rejects empty `$and`/`$or` arrays
            Expr::And(items) if items.is_empty() => json!({}),
            Expr::Or(items) if items.is_empty() => json!({ uri_field: { "$in": [] } }),
            Expr::And(items) => {
                let items: Vec<Value> = items.iter().map(|e| e.to_document(uri_field)).collect();
                json!({ "$and": items })
            }
            Expr::Or(items) => {
                let items: Vec<Value> = items.iter().map(|e| e.to_document(uri_field)).collect();
                json!({ "$or": items })
            }
            Expr::Not(inner) => json!({ "$nor": [inner.to_document(uri_field)] }),
        }
    }
}

fn join_sparql(items: &[Expr], uri_var: &str, sep: &str, empty: &str) -> String {
    if items.is_empty() {
        return empty.to_string();
    }
    let parts: Vec<String> = items.iter().map(|e| e.to_sparql(uri_var)).collect();
    format!("({})", parts.join(sep))
}

fn join_sql(items: &[Expr], alias: Option<&str>, uri_column: &str, sep: &str, empty: &str) -> String {
    if items.is_empty() {
        return empty.to_string();
    }
    let parts: Vec<String> = items.iter().map(|e| e.to_sql(alias, uri_column)).collect();
    format!("({})", parts.join(sep))
}

fn sparql_term(value: &Value) -> String {
    match value {
        Value::String(s) if Uri::is_uri_like(s) => sparql_iri(s),
        Value::String(s) => {
            format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
        }
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => format!("\"{}\"", other.to_string().replace('"', "\\\"")),
    }
}

/// `<iri>` with the characters IRIREF forbids percent-encoded.
fn sparql_iri(iri: &str) -> String {
    let mut out = String::with_capacity(iri.len() + 2);
    out.push('<');
    for ch in iri.chars() {
        match ch {
            '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\' => {
                out.push_str(&format!("%{:02X}", ch as u32));
            }
            c if (c as u32) <= 0x20 => out.push_str(&format!("%{:02X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('>');
    out
}

pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub(crate) fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub(crate) fn sql_value(value: &Value) -> String {
    match value {
        Value::String(s) => sql_literal(s),
        Value::Bool(b) => b.to_string().to_uppercase(),
        Value::Number(n) => n.to_string(),
        Value::Null => "NULL".to_string(),
        other => sql_literal(&other.to_string()),
    }
}

pub(crate) fn qualified(alias: Option<&str>, column: &str) -> String {
    match alias {
        Some(alias) => format!("{}.{}", alias, quote_ident(column)),
        None => quote_ident(column),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn uri(s: &str) -> Uri {
        Uri::parse(s).unwrap()
    }

    fn record(u: &str, name: &str) -> Record {
        let mut fields = Map::new();
        fields.insert("name".into(), Value::String(name.into()));
        Record {
            uri: uri(u),
            fields,
        }
    }

    #[test]
    fn uri_eq_matches_only_its_uri() {
        let expr = Expr::uri_eq(uri("http://example.org/plot/a"));
        assert!(expr.matches(&record("http://example.org/plot/a", "a")));
        assert!(!expr.matches(&record("http://example.org/plot/b", "b")));
    }

    #[test]
    fn field_null_matches_missing_field() {
        let expr = Expr::field_eq("description", Value::Null);
        assert!(expr.matches(&record("http://example.org/plot/a", "a")));
    }

    #[test]
    fn combinators_evaluate() {
        let a = record("http://example.org/plot/a", "a");
        let expr = Expr::field_eq("name", "a").and(Expr::uri_eq(uri("http://example.org/plot/a")));
        assert!(expr.matches(&a));
        assert!(!expr.clone().not().matches(&a));
        let either = Expr::field_eq("name", "zzz").or(Expr::All);
        assert!(either.matches(&a));
    }

    #[test]
    fn renders_sparql() {
        let expr = Expr::uri_eq(uri("http://example.org/plot/a"));
        assert_eq!(expr.to_sparql("uri"), "?uri = <http://example.org/plot/a>");

        let expr = Expr::field_eq("name", "say \"hi\"").and(Expr::field_eq("rank", 3));
        assert_eq!(expr.to_sparql("uri"), "(?name = \"say \\\"hi\\\"\" && ?rank = 3)");
    }

    #[test]
    fn renders_sql_with_escaping() {
        let expr = Expr::uri_in(vec![uri("http://example.org/a"), uri("http://example.org/b")]);
        assert_eq!(
            expr.to_sql(Some("p"), "uri"),
            "p.\"uri\" IN ('http://example.org/a', 'http://example.org/b')"
        );

        let expr = Expr::field_eq("name", "O'Brien");
        assert_eq!(expr.to_sql(None, "uri"), "\"name\" = 'O''Brien'");
    }

    #[test]
    fn renders_document_filter() {
        let expr = Expr::uri_eq(uri("http://example.org/a")).not();
        assert_eq!(
            expr.to_document("uri"),
            json!({ "$nor": [{ "uri": "http://example.org/a" }] })
        );
    }

    #[test]
    fn empty_combinators_render_valid_filters() {
        let a = record("http://example.org/a", "a");
        assert!(Expr::And(Vec::new()).matches(&a));
        assert!(!Expr::Or(Vec::new()).matches(&a));

        assert_eq!(Expr::And(Vec::new()).to_document("_id"), json!({}));
        assert_eq!(
            Expr::Or(Vec::new()).to_document("_id"),
            json!({ "_id": { "$in": [] } })
        );
        assert_eq!(Expr::Or(Vec::new()).to_sparql("uri"), "false");
        assert_eq!(Expr::And(Vec::new()).to_sql(None, "uri"), "TRUE");
    }

    #[test]
    fn sparql_iris_cannot_break_out() {
        let expr = Expr::uri_eq(uri("http://example.org/a>}DROP{<b"));
        assert_eq!(
            expr.to_sparql("uri"),
            "?uri = <http://example.org/a%3E%7DDROP%7B%3Cb>"
        );
        let expr = Expr::field_eq("site", "http://example.org/s\\\"x");
        assert_eq!(expr.to_sparql("uri"), "?site = <http://example.org/s%5C%22x>");
    }

    #[test]
    fn empty_in_never_matches() {
        let expr = Expr::uri_in(Vec::new());
        assert!(!expr.matches(&record("http://example.org/a", "a")));
        assert_eq!(expr.to_sql(None, "uri"), "FALSE");
    }
}
