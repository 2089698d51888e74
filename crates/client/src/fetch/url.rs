//! URL templating and query manipulation for resource requests.

use rescache_core::{Error, Params};
use serde_json::Value;
use url::Url;

/// Error type for URL construction failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid URL template: {0}")]
    Template(String),
}

impl From<UrlError> for Error {
    fn from(err: UrlError) -> Self {
        Error::Validation(err.to_string())
    }
}

/// Parse a URL string for use in a request.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Lowercase the host (done by the parser)
/// 4. Remove fragment (#...)
pub fn parse(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let mut parsed = Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Fill a URL template with positional arguments.
///
/// `{}` takes the next argument, `{N}` the argument at index N, and
/// `{{` / `}}` produce literal braces. String arguments are inserted as is,
/// other JSON values in their JSON form.
pub fn resolve_template(template: &str, args: &[Value]) -> Result<String, UrlError> {
    let mut out = String::with_capacity(template.len());
    let mut next_index = 0;
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => field.push(ch),
                        None => return Err(UrlError::Template(format!("unclosed placeholder in {template}"))),
                    }
                }
                let index = if field.is_empty() {
                    next_index += 1;
                    next_index - 1
                } else {
                    field
                        .parse::<usize>()
                        .map_err(|_| UrlError::Template(format!("unsupported placeholder {{{field}}}")))?
                };
                let arg = args
                    .get(index)
                    .ok_or_else(|| UrlError::Template(format!("missing argument {index} for {template}")))?;
                out.push_str(&arg_text(arg));
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(UrlError::Template(format!("single '}}' in {template}"))),
            other => out.push(other),
        }
    }

    Ok(out)
}

fn arg_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The URL without its `scheme://` prefix.
pub fn uri_from_url(url: &Url) -> String {
    let full = url.as_str();
    full.strip_prefix(&format!("{}://", url.scheme())).unwrap_or(full).to_string()
}

/// Set query parameters, replacing any with the same name.
///
/// The resulting query is ordered by parameter name so equal parameter
/// sets always render the same URL.
pub fn set_query_params(url: &mut Url, params: &Params) {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| !params.contains_key(&**name))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    pairs.extend(params.iter().map(|(name, value)| (name.clone(), value.clone())));
    write_query(url, pairs);
}

/// Remove every query parameter named in `names`.
pub fn del_query_params<'a>(url: &mut Url, names: impl IntoIterator<Item = &'a str>) {
    let names: Vec<&str> = names.into_iter().collect();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| !names.contains(&&**name))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    write_query(url, pairs);
}

fn write_query(url: &mut Url, mut pairs: Vec<(String, String)>) {
    pairs.sort_by(|(a, _), (b, _)| a.cmp(b));
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
}
