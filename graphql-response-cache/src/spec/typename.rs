use apollo_compiler::Node;
use apollo_compiler::ast;
use apollo_compiler::name;

/// Add the `__typename` meta field to every nested selection set of the document.
///
/// The selection set of an operation itself is left as is. Any other selection set (fields,
/// inline fragments and fragment definitions) gets `__typename` appended, unless it already
/// selects a field starting with `__`. Applying the rewrite twice gives the same document as
/// applying it once.
pub fn add_typename_to_document(document: &mut ast::Document) {
    for definition in document.definitions.iter_mut() {
        match definition {
            ast::Definition::OperationDefinition(operation) => {
                rewrite_nested(&mut operation.make_mut().selection_set);
            }
            ast::Definition::FragmentDefinition(fragment) => {
                add_typename(&mut fragment.make_mut().selection_set);
            }
            _ => {}
        }
    }
}

fn rewrite_nested(selections: &mut [ast::Selection]) {
    for selection in selections {
        match selection {
            ast::Selection::Field(field) => {
                // leaf field
                if field.selection_set.is_empty() {
                    continue;
                }
                add_typename(&mut field.make_mut().selection_set);
            }
            ast::Selection::InlineFragment(fragment) => {
                add_typename(&mut fragment.make_mut().selection_set);
            }
            ast::Selection::FragmentSpread(_) => {}
        }
    }
}

fn add_typename(selection_set: &mut Vec<ast::Selection>) {
    rewrite_nested(selection_set);

    let selects_meta_field = selection_set.iter().any(|selection| {
        matches!(selection, ast::Selection::Field(field) if field.name.starts_with("__"))
    });
    if !selects_meta_field {
        selection_set.push(ast::Selection::Field(Node::new(ast::Field {
            alias: None,
            name: name!("__typename"),
            arguments: Vec::new(),
            directives: ast::DirectiveList(Vec::new()),
            selection_set: Vec::new(),
        })));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(source: &str) -> String {
        let mut document = ast::Document::parse(source, "query.graphql").unwrap();
        add_typename_to_document(&mut document);
        document.to_string()
    }

    fn printed(source: &str) -> String {
        ast::Document::parse(source, "expected.graphql")
            .unwrap()
            .to_string()
    }

    #[test]
    fn it_adds_typename_to_nested_selections() {
        assert_eq!(
            rewrite("{ user(id: 1) { name friends { name } } }"),
            printed("{ user(id: 1) { name friends { name __typename } __typename } }")
        );
    }

    #[test]
    fn it_leaves_the_operation_selection_set_alone() {
        assert_eq!(rewrite("{ version }"), printed("{ version }"));
        assert_eq!(
            rewrite("mutation { updateUser(id: 1) { id } }"),
            printed("mutation { updateUser(id: 1) { id __typename } }")
        );
    }

    #[test]
    fn it_does_not_duplicate_typename() {
        assert_eq!(
            rewrite("{ user { __typename name } }"),
            printed("{ user { __typename name } }")
        );
    }

    #[test]
    fn it_skips_selections_with_meta_fields() {
        assert_eq!(
            rewrite("{ user { name __schema { types { name } } } }"),
            printed("{ user { name __schema { types { name __typename } __typename } } }")
        );
    }

    #[test]
    fn it_rewrites_fragments() {
        assert_eq!(
            rewrite(
                "query { node(id: 1) { ... on User { name } ...Post } } fragment Post on Post { title }"
            ),
            printed(
                "query { node(id: 1) { ... on User { name __typename } ...Post __typename } } fragment Post on Post { title __typename }"
            )
        );
    }

    #[test]
    fn rewrite_is_idempotent() {
        let once = rewrite("query Q($id: ID!) { user(id: $id) { name posts { title } } }");
        let twice = rewrite(&once);
        assert_eq!(once, twice);
    }
}
