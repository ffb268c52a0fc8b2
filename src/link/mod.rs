//! Request pipeline
//!
//! A link takes a request and returns the stream of responses observed for it.
//! Links chain: each stage either answers a request itself or hands it to the
//! next link, down to the transport.

pub mod offline;
pub mod state;

pub use offline::{
    DequeuePredicate, DrainAbort, DrainReport, ExceptionHandler, MutationQueueLink,
    QueueLinkConfig, ResponseSink,
};
pub use state::{MutationState, MutationStates, StateChange};

use crate::error::LinkError;
use crate::operation::{OperationRequest, OperationResponse};
use futures::stream::BoxStream;
use std::sync::Arc;

pub type ResponseStream = BoxStream<'static, Result<OperationResponse, LinkError>>;

/// A pipeline stage or transport.
pub trait Link: Send + Sync {
    fn request(&self, request: OperationRequest) -> ResponseStream;
}

impl<L: Link + ?Sized> Link for Arc<L> {
    fn request(&self, request: OperationRequest) -> ResponseStream {
        (**self).request(request)
    }
}
