pub mod request_id;
pub mod user_id;

pub use request_id::{make_span_with_request_id, request_id_middleware, RequestId};
pub use user_id::{user_id_middleware, USER_ID_HEADER};
