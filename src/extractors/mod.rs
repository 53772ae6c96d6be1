mod context;

pub use context::{RequestContext, REQUEST_ID_HEADER};
