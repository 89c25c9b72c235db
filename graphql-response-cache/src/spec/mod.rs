//! GraphQL document handling: operation lookup and the `__typename` rewrite.

use apollo_compiler::ast;
use displaydoc::Display;
use thiserror::Error;

mod typename;

pub use typename::add_typename_to_document;

/// GraphQL document errors.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SpecError {
    /// parsing error: {0}
    ParseError(String),
    /// operation '{0}' is not defined in the document
    UnknownOperation(String),
    /// the document defines several operations and no operation name was provided
    MissingOperationName,
    /// the document does not define any operation
    NoOperation,
}

/// Find the operation a request executes.
///
/// Without an operation name, the document must define exactly one operation.
pub(crate) fn find_operation<'doc>(
    document: &'doc ast::Document,
    operation_name: Option<&str>,
) -> Result<&'doc ast::OperationDefinition, SpecError> {
    let mut operations = document
        .definitions
        .iter()
        .filter_map(|definition| match definition {
            ast::Definition::OperationDefinition(operation) => Some(&**operation),
            _ => None,
        });

    match operation_name {
        Some(name) => operations
            .find(|operation| operation.name.as_ref().is_some_and(|n| n.as_str() == name))
            .ok_or_else(|| SpecError::UnknownOperation(name.to_string())),
        None => {
            let operation = operations.next().ok_or(SpecError::NoOperation)?;
            if operations.next().is_some() {
                return Err(SpecError::MissingOperationName);
            }
            Ok(operation)
        }
    }
}

#[cfg(test)]
mod tests {
    use apollo_compiler::ast::OperationType;

    use super::*;

    const DOCUMENT: &str = r#"
        query GetUser { user(id: 1) { name } }
        mutation UpdateUser { updateUser(id: 1, name: "B") { name } }
    "#;

    #[test]
    fn it_finds_named_operations() {
        let document = ast::Document::parse(DOCUMENT, "test.graphql").unwrap();
        let operation = find_operation(&document, Some("UpdateUser")).unwrap();
        assert_eq!(operation.operation_type, OperationType::Mutation);
        let operation = find_operation(&document, Some("GetUser")).unwrap();
        assert_eq!(operation.operation_type, OperationType::Query);
    }

    #[test]
    fn it_requires_a_name_when_several_operations_exist() {
        let document = ast::Document::parse(DOCUMENT, "test.graphql").unwrap();
        assert_eq!(
            find_operation(&document, None).unwrap_err(),
            SpecError::MissingOperationName
        );
        assert_eq!(
            find_operation(&document, Some("Other")).unwrap_err(),
            SpecError::UnknownOperation("Other".to_string())
        );
    }

    #[test]
    fn it_finds_the_single_anonymous_operation() {
        let document = ast::Document::parse("{ me { id } }", "test.graphql").unwrap();
        let operation = find_operation(&document, None).unwrap();
        assert_eq!(operation.operation_type, OperationType::Query);
    }
}
