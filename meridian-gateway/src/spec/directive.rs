//! Locating directive-tagged fields in a query document.
//!
//! Diagnostics directives such as `@principalField` tag at most one field per
//! operation. [`resolve_path`] computes the response path that field will
//! have, so post-execution passes can associate errors with it;
//! [`validate_single_use`] enforces the at-most-once rule before execution
//! begins.

use std::collections::HashMap;
use std::collections::HashSet;

use apollo_compiler::ast;

use crate::error::SpecError;

/// Compute the field path addressed by the first usage of `directive_name`.
///
/// Depth-first traversal of the document's selection trees, pushing each
/// field's alias-or-name on entry and popping on exit. Traversal halts as
/// soon as the directive is found and the path at that point is returned.
/// Returns an empty path when the directive does not occur.
///
/// Fragment spreads recurse into their definitions. An undefined fragment or
/// a spread cycle is skipped: such documents are rejected by validation
/// before they get here.
pub fn resolve_path(document: &ast::Document, directive_name: &str) -> Vec<String> {
    let fragments = fragment_map(document);
    let mut path = Vec::new();
    let mut spreading = HashSet::new();

    for definition in &document.definitions {
        if let ast::Definition::OperationDefinition(operation) = definition {
            if walk(
                &operation.selection_set,
                directive_name,
                &fragments,
                &mut path,
                &mut spreading,
            ) {
                return path;
            }
        }
    }
    Vec::new()
}

/// Reject documents that use `directive_name` on more than one field.
///
/// Enforced at query-validation time so the error surfaces before execution;
/// the resolver above never has to disambiguate.
pub fn validate_single_use(
    document: &ast::Document,
    directive_name: &str,
) -> Result<(), SpecError> {
    let mut usages = 0;
    for definition in &document.definitions {
        let selection_set = match definition {
            ast::Definition::OperationDefinition(operation) => &operation.selection_set,
            // Count fragments at their definition so a fragment spread twice
            // does not count its fields twice.
            ast::Definition::FragmentDefinition(fragment) => &fragment.selection_set,
            _ => continue,
        };
        usages += count_usages(selection_set, directive_name);
    }

    if usages > 1 {
        return Err(SpecError::DuplicateDirective {
            name: directive_name.to_string(),
        });
    }
    Ok(())
}

fn fragment_map(document: &ast::Document) -> HashMap<String, &ast::FragmentDefinition> {
    document
        .definitions
        .iter()
        .filter_map(|definition| match definition {
            ast::Definition::FragmentDefinition(fragment) => {
                Some((fragment.name.as_str().to_string(), fragment.as_ref()))
            }
            _ => None,
        })
        .collect()
}

fn walk(
    selection_set: &[ast::Selection],
    directive_name: &str,
    fragments: &HashMap<String, &ast::FragmentDefinition>,
    path: &mut Vec<String>,
    spreading: &mut HashSet<String>,
) -> bool {
    for selection in selection_set {
        match selection {
            ast::Selection::Field(field) => {
                let response_name = field.alias.as_ref().unwrap_or(&field.name);
                path.push(response_name.as_str().to_string());
                if has_directive(&field.directives, directive_name)
                    || walk(
                        &field.selection_set,
                        directive_name,
                        fragments,
                        path,
                        spreading,
                    )
                {
                    return true;
                }
                path.pop();
            }
            ast::Selection::FragmentSpread(spread) => {
                let name = spread.fragment_name.as_str();
                if spreading.insert(name.to_string()) {
                    if let Some(fragment) = fragments.get(name) {
                        if walk(
                            &fragment.selection_set,
                            directive_name,
                            fragments,
                            path,
                            spreading,
                        ) {
                            return true;
                        }
                    }
                    spreading.remove(name);
                }
            }
            ast::Selection::InlineFragment(inline) => {
                if walk(
                    &inline.selection_set,
                    directive_name,
                    fragments,
                    path,
                    spreading,
                ) {
                    return true;
                }
            }
        }
    }
    false
}

fn count_usages(selection_set: &[ast::Selection], directive_name: &str) -> usize {
    selection_set
        .iter()
        .map(|selection| match selection {
            ast::Selection::Field(field) => {
                usize::from(has_directive(&field.directives, directive_name))
                    + count_usages(&field.selection_set, directive_name)
            }
            ast::Selection::FragmentSpread(_) => 0,
            ast::Selection::InlineFragment(inline) => {
                count_usages(&inline.selection_set, directive_name)
            }
        })
        .sum()
}

fn has_directive(directives: &ast::DirectiveList, directive_name: &str) -> bool {
    directives
        .iter()
        .any(|directive| directive.name.as_str() == directive_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::parse;

    #[test]
    fn resolves_the_path_to_a_tagged_field() {
        let document = parse(
            "{
                artist(id: \"banksy\") {
                    artworksConnection(first: 10) @principalField {
                        edges { node { title } }
                    }
                }
            }",
        )
        .unwrap();
        assert_eq!(
            resolve_path(&document, "principalField"),
            vec!["artist", "artworksConnection"]
        );
    }

    #[test]
    fn aliases_take_precedence_over_field_names() {
        let document = parse(
            "{
                banksy: artist(id: \"banksy\") {
                    works: artworksConnection @principalField { totalCount }
                }
            }",
        )
        .unwrap();
        assert_eq!(
            resolve_path(&document, "principalField"),
            vec!["banksy", "works"]
        );
    }

    #[test]
    fn resolves_through_fragment_spreads() {
        let document = parse(
            "{
                artist(id: \"banksy\") { ...details }
            }
            fragment details on Artist {
                counts { artworks @principalField }
            }",
        )
        .unwrap();
        assert_eq!(
            resolve_path(&document, "principalField"),
            vec!["artist", "counts", "artworks"]
        );
    }

    #[test]
    fn resolves_through_inline_fragments() {
        let document = parse(
            "{
                node(id: \"abc\") {
                    ... on Artist { name @principalField }
                }
            }",
        )
        .unwrap();
        assert_eq!(resolve_path(&document, "principalField"), vec!["node", "name"]);
    }

    #[test]
    fn absent_directive_yields_an_empty_path() {
        let document = parse("{ artist(id: \"banksy\") { name } }").unwrap();
        assert!(resolve_path(&document, "principalField").is_empty());
    }

    #[test]
    fn traversal_halts_at_the_first_usage() {
        // Not a valid document per single-use validation, but the resolver
        // itself must still be deterministic: first usage in document order.
        let document = parse(
            "{
                artist(id: \"banksy\") { name @principalField }
                partner(id: \"gagosian\") { name @principalField }
            }",
        )
        .unwrap();
        assert_eq!(
            resolve_path(&document, "principalField"),
            vec!["artist", "name"]
        );
    }

    #[test]
    fn a_spread_cycle_does_not_hang_resolution() {
        let document = parse(
            "{ artist(id: \"banksy\") { ...a } }
            fragment a on Artist { ...b }
            fragment b on Artist { ...a }",
        )
        .unwrap();
        assert!(resolve_path(&document, "principalField").is_empty());
    }

    #[test]
    fn single_use_passes_validation() {
        let document = parse("{ artist(id: \"banksy\") { name @principalField } }").unwrap();
        assert!(validate_single_use(&document, "principalField").is_ok());
    }

    #[test]
    fn duplicate_use_fails_validation_naming_the_directive() {
        let document = parse(
            "{
                artist(id: \"banksy\") @principalField {
                    name @principalField
                }
            }",
        )
        .unwrap();
        let error = validate_single_use(&document, "principalField").unwrap_err();
        assert_eq!(error.to_string(), "can only use `@principalField` once");
    }

    #[test]
    fn duplicates_across_fragments_are_counted() {
        let document = parse(
            "{
                artist(id: \"banksy\") { name @principalField ...details }
            }
            fragment details on Artist {
                bio @principalField
            }",
        )
        .unwrap();
        assert!(validate_single_use(&document, "principalField").is_err());
    }

    #[test]
    fn different_directives_do_not_conflict() {
        let document = parse(
            "{
                artist(id: \"banksy\") {
                    name @principalField
                    bio @canonicalResource
                }
            }",
        )
        .unwrap();
        assert!(validate_single_use(&document, "principalField").is_ok());
        assert!(validate_single_use(&document, "canonicalResource").is_ok());
    }
}
