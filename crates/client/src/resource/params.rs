//! Auth and continuation parameter injection.
//!
//! Both kinds of parameters live in the URL query. Queries are kept sorted
//! by name, so removing the auth parameters again restores the request the
//! auth was applied to.

use rescache_core::{Configuration, Error, RequestDescriptor, ResourceRecord};

use super::ResourceKind;
use crate::fetch::{del_query_params, parse, set_query_params};

/// Merge the kind's auth parameters into the request URL.
pub fn with_auth<K: ResourceKind + ?Sized>(
    kind: &K, config: &Configuration, request: &RequestDescriptor,
) -> Result<RequestDescriptor, Error> {
    let auth = kind.auth_parameters(config);
    if auth.is_empty() {
        return Ok(request.clone());
    }

    let mut url = parse(&request.url)?;
    set_query_params(&mut url, &auth);
    Ok(RequestDescriptor { url: url.to_string(), ..request.clone() })
}

/// Remove the kind's auth parameters from the request URL.
pub fn without_auth<K: ResourceKind + ?Sized>(
    kind: &K, config: &Configuration, request: &RequestDescriptor,
) -> Result<RequestDescriptor, Error> {
    let auth = kind.auth_parameters(config);
    if auth.is_empty() {
        return Ok(request.clone());
    }

    let mut url = parse(&request.url)?;
    del_query_params(&mut url, auth.keys().map(String::as_str));
    Ok(RequestDescriptor { url: url.to_string(), ..request.clone() })
}

/// The request for the page after `record`.
///
/// `None` when the record was not successful or the kind reports no
/// continuation parameters for it.
pub fn next_request<K: ResourceKind + ?Sized>(
    kind: &K, config: &Configuration, request: &RequestDescriptor, record: &ResourceRecord,
) -> Result<Option<RequestDescriptor>, Error> {
    if !record.is_success() {
        return Ok(None);
    }
    let continuation = kind.next_parameters(config, record);
    if continuation.is_empty() {
        return Ok(None);
    }

    let mut url = parse(&request.url)?;
    set_query_params(&mut url, &continuation);
    Ok(Some(RequestDescriptor { url: url.to_string(), ..request.clone() }))
}
