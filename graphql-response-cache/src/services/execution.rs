//! Execution stage.

use std::sync::Arc;

use apollo_compiler::ast;
use futures::stream::BoxStream;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;
use static_assertions::assert_impl_all;
use tower::BoxError;

use crate::Context;
use crate::graphql;
use crate::json_ext::Object;
use crate::json_ext::Value;

pub type BoxService = tower::util::BoxService<Request, Response, BoxError>;
pub type ServiceResult = Result<Response, BoxError>;

assert_impl_all!(Request: Send);
#[non_exhaustive]
pub struct Request {
    /// The parsed document, after the parse stage rewrites.
    pub document: Arc<ast::Document>,

    pub operation_name: Option<String>,

    pub variables: Object,

    pub context: Context,
}

#[buildstructor::buildstructor]
impl Request {
    #[builder(visibility = "pub")]
    fn new(
        document: Arc<ast::Document>,
        operation_name: Option<String>,
        variables: Map<ByteString, Value>,
        context: Option<Context>,
    ) -> Request {
        Self {
            document,
            operation_name,
            variables,
            context: context.unwrap_or_default(),
        }
    }
}

assert_impl_all!(Response: Send);
/// The result of an execution: a single response, or a sequence of them for subscriptions and
/// incremental delivery.
pub enum Response {
    Single(graphql::Response),
    Stream(BoxStream<'static, graphql::Response>),
}

impl Response {
    pub fn is_stream(&self) -> bool {
        matches!(self, Response::Stream(_))
    }

    /// The response if the result is a single value.
    pub fn into_single(self) -> Option<graphql::Response> {
        match self {
            Response::Single(response) => Some(response),
            Response::Stream(_) => None,
        }
    }
}

impl From<graphql::Response> for Response {
    fn from(response: graphql::Response) -> Self {
        Response::Single(response)
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Response::Single(response) => f.debug_tuple("Single").field(response).finish(),
            Response::Stream(_) => f.debug_tuple("Stream").finish_non_exhaustive(),
        }
    }
}
