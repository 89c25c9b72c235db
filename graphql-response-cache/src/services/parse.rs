//! Document parsing stage.

use std::sync::Arc;

use apollo_compiler::ast;
use static_assertions::assert_impl_all;
use tower::BoxError;

use crate::Context;

pub type BoxService = tower::util::BoxService<Request, Response, BoxError>;
pub type ServiceResult = Result<Response, BoxError>;

/// Limits applied by the parser.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParserOptions {
    /// Maximum nesting of selection sets and values.
    pub recursion_limit: Option<usize>,
    /// Maximum number of tokens in the document.
    pub token_limit: Option<usize>,
}

assert_impl_all!(Request: Send);
#[non_exhaustive]
pub struct Request {
    /// The raw GraphQL source.
    pub source: String,

    pub options: ParserOptions,

    pub context: Context,
}

#[buildstructor::buildstructor]
impl Request {
    #[builder(visibility = "pub")]
    fn new(source: String, options: Option<ParserOptions>, context: Option<Context>) -> Request {
        Self {
            source,
            options: options.unwrap_or_default(),
            context: context.unwrap_or_default(),
        }
    }
}

assert_impl_all!(Response: Send);
#[derive(Debug)]
#[non_exhaustive]
pub struct Response {
    /// The parsed document, as handed to execution.
    pub document: Arc<ast::Document>,

    pub context: Context,
}

#[buildstructor::buildstructor]
impl Response {
    #[builder(visibility = "pub")]
    fn new(document: Arc<ast::Document>, context: Context) -> Response {
        Self { document, context }
    }
}

/// Parse a request with `apollo-compiler`, without any rewrite.
pub fn parse(request: Request) -> ServiceResult {
    let mut parser = apollo_compiler::parser::Parser::new();
    if let Some(limit) = request.options.recursion_limit {
        parser = parser.recursion_limit(limit);
    }
    if let Some(limit) = request.options.token_limit {
        parser = parser.token_limit(limit);
    }
    let document = parser
        .parse_ast(request.source, "query.graphql")
        .map_err(|invalid| crate::SpecError::ParseError(invalid.errors.to_string()))?;

    Ok(Response::builder()
        .document(Arc::new(document))
        .context(request.context)
        .build())
}

/// The default parse stage: [`parse`] as a service.
pub fn service() -> BoxService {
    BoxService::new(tower::service_fn(|request: Request| {
        futures::future::ready(parse(request))
    }))
}
