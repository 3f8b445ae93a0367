pub const LINE_DELIMITER: &[u8] = b"\r\n";
pub const REQUEST_DELIMITER: &[u8] = b"\r\n\r\n";

pub mod codec;
pub mod json;
mod limit;
pub mod params;
mod response;

pub type Request = http::Request<Option<bytes::Bytes>>;
pub use json::{read_json, write_json, Envelope};
pub use params::read_id_param;
pub use response::{IntoResponse, Response};
