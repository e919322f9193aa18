pub mod context;
pub mod error;
pub mod token;

pub use context::{ContextError, Ctx, RequestContext, RequestContextExt};
pub use error::{AppError, ErrorBody, ErrorKind, translate};
pub use token::{Token, TokenError, TokenIssuer};
