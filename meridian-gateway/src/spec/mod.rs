//! GraphQL document handling: parsing and directive resolution.

mod directive;

use apollo_compiler::ast;
pub use directive::resolve_path;
pub use directive::validate_single_use;

use crate::error::SpecError;

/// Parse a GraphQL document.
///
/// This is a purely syntactic parse; validation against a schema happens in
/// the execution engine, not here.
pub fn parse(query: &str) -> Result<ast::Document, SpecError> {
    ast::Document::parse(query, "query.graphql").map_err(|errors| SpecError::ParseError {
        reason: errors.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_document() {
        let document = parse("{ artist(id: \"banksy\") { name } }").unwrap();
        assert_eq!(document.definitions.len(), 1);
    }

    #[test]
    fn reports_syntax_errors() {
        let error = parse("{ artist(id: ").unwrap_err();
        assert!(matches!(error, SpecError::ParseError { .. }));
    }
}
