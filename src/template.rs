//! URI template resolution.
//!
//! Supports the subset of RFC 6570 the API's templates use:
//!
//! | Form      | Expansion                                 |
//! |-----------|-------------------------------------------|
//! | `{x}`     | value, reserved characters percent-encoded |
//! | `{+x}`    | value, reserved characters kept           |
//! | `{?a,b}`  | `?a=..&b=..` for defined variables         |
//! | `{&a,b}`  | `&a=..&b=..` for defined variables         |
//!
//! A trailing `*` on a variable explodes list values into repeated pairs.

use crate::params::{ParamMap, ParamValue};
use crate::{Error, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

/// Name of the path parameter holding the API base URL.
pub const BASE_URL_PARAM: &str = "baseurl";

/// Everything except RFC 3986 unreserved characters.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Everything except unreserved and reserved characters (and `%`).
const RESERVED: &AsciiSet = &UNRESERVED
    .remove(b':')
    .remove(b'/')
    .remove(b'?')
    .remove(b'#')
    .remove(b'[')
    .remove(b']')
    .remove(b'@')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b'%');

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Simple,
    Reserved,
    Query,
    Continuation,
}

impl Operator {
    fn first(self) -> &'static str {
        match self {
            Operator::Simple | Operator::Reserved => "",
            Operator::Query => "?",
            Operator::Continuation => "&",
        }
    }

    fn separator(self) -> &'static str {
        match self {
            Operator::Simple | Operator::Reserved => ",",
            Operator::Query | Operator::Continuation => "&",
        }
    }

    fn named(self) -> bool {
        matches!(self, Operator::Query | Operator::Continuation)
    }

    fn encode(self, raw: &str) -> String {
        let set = match self {
            Operator::Reserved => RESERVED,
            _ => UNRESERVED,
        };
        utf8_percent_encode(raw, set).to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Variable {
    name: String,
    explode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Expression {
        operator: Operator,
        variables: Vec<Variable>,
    },
}

/// A parsed URI template.
///
/// # Examples
///
/// ```
/// use harvest_engine::{ParamMap, UriTemplate};
///
/// let template = UriTemplate::parse("/clients/{client_id}/contacts{?page}")?;
/// let vars: ParamMap = [("client_id", 7u32), ("page", 2u32)].into_iter().collect();
/// assert_eq!(template.expand(&vars), "/clients/7/contacts?page=2");
/// # Ok::<(), harvest_engine::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    parts: Vec<Part>,
}

impl UriTemplate {
    /// Parses a template string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for unbalanced braces, empty
    /// expressions and unsupported operators.
    pub fn parse(template: &str) -> Result<Self> {
        let mut parts = Vec::new();
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            if open > 0 {
                parts.push(Part::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| {
                Error::InvalidArgument(format!("unclosed expression in template `{}`", template))
            })?;
            parts.push(parse_expression(&after[..close], template)?);
            rest = &after[close + 1..];
        }
        if rest.contains('}') {
            return Err(Error::InvalidArgument(format!(
                "unmatched `}}` in template `{}`",
                template
            )));
        }
        if !rest.is_empty() {
            parts.push(Part::Literal(rest.to_string()));
        }

        Ok(Self { parts })
    }

    /// Returns `true` if the template has a `{+name}` expression for `name`.
    pub fn has_reserved_variable(&self, name: &str) -> bool {
        self.parts.iter().any(|part| match part {
            Part::Expression {
                operator: Operator::Reserved,
                variables,
            } => variables.iter().any(|v| v.name.eq_ignore_ascii_case(name)),
            _ => false,
        })
    }

    /// Expands the template. Variables missing from `vars` are omitted.
    pub fn expand(&self, vars: &ParamMap) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Expression {
                    operator,
                    variables,
                } => expand_expression(&mut out, *operator, variables, vars),
            }
        }
        out
    }
}

fn parse_expression(body: &str, template: &str) -> Result<Part> {
    let (operator, list) = match body.chars().next() {
        Some('+') => (Operator::Reserved, &body[1..]),
        Some('?') => (Operator::Query, &body[1..]),
        Some('&') => (Operator::Continuation, &body[1..]),
        Some(c) if c.is_ascii_alphanumeric() || c == '_' => (Operator::Simple, body),
        _ => {
            return Err(Error::InvalidArgument(format!(
                "unsupported expression `{{{}}}` in template `{}`",
                body, template
            )))
        }
    };

    let mut variables = Vec::new();
    for varspec in list.split(',') {
        let (name, explode) = match varspec.strip_suffix('*') {
            Some(name) => (name, true),
            None => (varspec, false),
        };
        if name.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "empty variable name in template `{}`",
                template
            )));
        }
        variables.push(Variable {
            name: name.to_string(),
            explode,
        });
    }

    Ok(Part::Expression {
        operator,
        variables,
    })
}

fn expand_expression(out: &mut String, operator: Operator, variables: &[Variable], vars: &ParamMap) {
    let mut pieces = Vec::new();

    for variable in variables {
        let Some(value) = vars.get(&variable.name) else {
            continue;
        };
        match value {
            ParamValue::List(items) if items.is_empty() => continue,
            ParamValue::List(items) if variable.explode && operator.named() => {
                for item in items {
                    pieces.push(format!("{}={}", variable.name, operator.encode(item)));
                }
            }
            ParamValue::List(items) => {
                let joiner = if variable.explode { operator.separator() } else { "," };
                let encoded: Vec<_> = items.iter().map(|i| operator.encode(i)).collect();
                let joined = encoded.join(joiner);
                if operator.named() {
                    pieces.push(format!("{}={}", variable.name, joined));
                } else {
                    pieces.push(joined);
                }
            }
            other => {
                let encoded = operator.encode(&other.sanitize());
                if operator.named() {
                    pieces.push(format!("{}={}", variable.name, encoded));
                } else {
                    pieces.push(encoded);
                }
            }
        }
    }

    if !pieces.is_empty() {
        out.push_str(operator.first());
        out.push_str(&pieces.join(operator.separator()));
    }
}

/// Resolves `template` against path and query parameters into a URL.
///
/// Path parameters are applied first and query parameters second, so a query
/// parameter shadows a path parameter of the same name.
///
/// # Errors
///
/// * [`Error::MissingBaseUrl`] if the template has `{+baseurl}` and `path`
///   has no `baseurl` entry.
/// * [`Error::InvalidArgument`] if the template cannot be parsed.
/// * [`Error::InvalidUrl`] if the expansion is not an absolute URL.
pub fn resolve(template: &str, path: &ParamMap, query: &ParamMap) -> Result<Url> {
    let parsed = UriTemplate::parse(template)?;
    if parsed.has_reserved_variable(BASE_URL_PARAM) && !path.contains_key(BASE_URL_PARAM) {
        return Err(Error::MissingBaseUrl);
    }

    let mut vars = path.clone();
    for (name, value) in query.iter() {
        vars.insert(name, value.clone());
    }

    Ok(Url::parse(&parsed.expand(&vars))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn base() -> ParamMap {
        [(BASE_URL_PARAM, "https://api.example.com/v2")]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_resolves_base_url_and_query() {
        let mut query = ParamMap::new();
        query.insert("is_active", true);
        query.insert("page", 2u32);

        let url = resolve("{+baseurl}/clients{?is_active,page}", &base(), &query).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v2/clients?is_active=true&page=2"
        );
    }

    #[test]
    fn test_missing_base_url() {
        let result = resolve("{+baseurl}/clients", &ParamMap::new(), &ParamMap::new());
        assert!(matches!(result, Err(Error::MissingBaseUrl)));
    }

    #[test]
    fn test_undefined_query_variables_are_omitted() {
        let url = resolve("{+baseurl}/clients{?is_active,page}", &base(), &ParamMap::new()).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v2/clients");

        let query: ParamMap = [("page", 3u32)].into_iter().collect();
        let url = resolve("{+baseurl}/clients{?is_active,page}", &base(), &query).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v2/clients?page=3");
    }

    #[test]
    fn test_simple_expansion_encodes_reserved_characters() {
        let mut path = base();
        path.insert("external_reference_id", "a/b c");
        let url = resolve("{+baseurl}/refs/{external_reference_id}", &path, &ParamMap::new()).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v2/refs/a%2Fb%20c");
    }

    #[test]
    fn test_query_values_are_percent_encoded() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let mut query = ParamMap::new();
        query.insert("updated_since", at);
        query.insert("q", "a&b=c");

        let url = resolve("{+baseurl}/time_entries{?updated_since,q}", &base(), &query).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v2/time_entries?updated_since=2024-01-02T03%3A04%3A05Z&q=a%26b%3Dc"
        );
    }

    #[test]
    fn test_query_continuation_and_lists() {
        let mut query = ParamMap::new();
        query.insert("ids", vec![1, 2]);
        query.insert("tags", vec!["x", "y"]);

        let template = UriTemplate::parse("/items?fixed=1{&ids,tags*}").unwrap();
        assert_eq!(template.expand(&query), "/items?fixed=1&ids=1,2&tags=x&tags=y");
    }

    #[test]
    fn test_query_shadows_path_parameter() {
        let mut path = base();
        path.insert("page", 1u32);
        let query: ParamMap = [("page", 9u32)].into_iter().collect();
        let url = resolve("{+baseurl}/users{?page}", &path, &query).unwrap();
        assert_eq!(url.query(), Some("page=9"));
    }

    #[test]
    fn test_malformed_templates() {
        assert!(matches!(
            UriTemplate::parse("/clients/{id"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            UriTemplate::parse("/clients/id}"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            UriTemplate::parse("/clients/{#frag}"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            UriTemplate::parse("/clients{?a,}"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_relative_expansion_is_invalid_url() {
        let result = resolve("/clients", &ParamMap::new(), &ParamMap::new());
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }
}
