//! Post-execution response diagnostics.
//!
//! After execution completes, the gateway walks the response's error list to
//! attach machine-readable status codes to directive-tagged fields, in the
//! response `extensions`. A client that tagged a field `@principalField` can
//! then distinguish "the principal data 404ed" from any other partial
//! failure without parsing error messages.
//!
//! This whole subsystem is a best-effort side channel: it never fails the
//! response, and any internal fault degrades to an empty extensions object.

use apollo_compiler::ast;
use serde_json_bytes::json;
use serde_json_bytes::Value;

use crate::graphql;
use crate::json_ext::Object;
use crate::spec;

/// Tags the one field whose failure should fail the whole request, from the
/// client's point of view.
pub const PRINCIPAL_FIELD_DIRECTIVE: &str = "principalField";

/// Tags the field resolving the canonical resource of the page being
/// rendered, so its upstream status can drive the page's HTTP status.
pub const CANONICAL_RESOURCE_DIRECTIVE: &str = "canonicalResource";

/// Tags a field backed by a rate-limited provider, surfacing 429s distinctly.
pub const RATE_LIMITED_DIRECTIVE: &str = "rateLimited";

/// The directives the walker runs for, in emission order.
const DIRECTIVES: &[&str] = &[
    PRINCIPAL_FIELD_DIRECTIVE,
    CANONICAL_RESOURCE_DIRECTIVE,
    RATE_LIMITED_DIRECTIVE,
];

/// Compute the `extensions` entry for one directive.
///
/// Finds the directive-tagged field's path in `document`, matches it against
/// the paths of the execution errors in `response`, flattens each matching
/// error into its leaf causes and takes the first cause that carries a
/// transport status code. Returns an empty object when any of those steps
/// comes up empty.
pub fn error_extension(
    document: &ast::Document,
    response: &graphql::Response,
    directive_name: &str,
) -> Object {
    let path = spec::resolve_path(document, directive_name);
    if path.is_empty() {
        return Object::new();
    }

    for error in &response.errors {
        let Some(error_path) = &error.path else {
            continue;
        };
        if !error_path.matches_field_path(&path) {
            continue;
        }
        if let Some(status_code) = flatten_causes(error)
            .iter()
            .find_map(cause_status_code)
        {
            let mut extension = Object::new();
            extension.insert(
                directive_name,
                json!({ "httpStatusCode": status_code }),
            );
            return extension;
        }
    }
    Object::new()
}

/// Compute the full `extensions` object for a response: one entry per
/// directive that is present in the document and has a matching error.
pub fn for_response(document: &ast::Document, response: &graphql::Response) -> Object {
    let mut extensions = Object::new();
    for directive_name in DIRECTIVES.iter().copied() {
        let mut extension = error_extension(document, response, directive_name);
        if let Some(value) = extension.remove(directive_name) {
            extensions.insert(directive_name, value);
        }
    }
    extensions
}

/// Decompose an error into its leaf causes.
///
/// An aggregate error (e.g. one combined from several failed sub-requests)
/// carries its underlying causes as an array of error objects under the
/// `causes` extension; anything else is its own single cause.
fn flatten_causes(error: &graphql::Error) -> Vec<Value> {
    match error.extensions.get("causes").and_then(Value::as_array) {
        Some(causes) => causes.clone(),
        None => vec![Value::Object(error.extensions.clone())],
    }
}

/// The transport status code carried by one flattened cause, if any.
///
/// Accepts both the `http: { status }` shape emitted by
/// [`crate::error::FetchError::to_graphql_error`] and a bare `statusCode`
/// member as some upstreams report it.
fn cause_status_code(cause: &Value) -> Option<u16> {
    let object = cause.as_object()?;
    let extensions = object
        .get("extensions")
        .and_then(Value::as_object)
        .unwrap_or(object);

    let status = extensions
        .get("http")
        .and_then(Value::as_object)
        .and_then(|http| http.get("status"))
        .or_else(|| extensions.get("statusCode"))?;
    status.as_u64().and_then(|code| u16::try_from(code).ok())
}
