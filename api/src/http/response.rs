use bytes::Bytes;
use http::{header::CONTENT_LENGTH, HeaderMap, StatusCode};

use super::json::{write_json, Envelope};

pub type Response = http::Response<Option<Bytes>>;

pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for StatusCode {
    fn into_response(self) -> Response {
        let mut response = http::Response::new(None);
        *response.status_mut() = self;
        response.headers_mut().insert(CONTENT_LENGTH, 0.into());

        response
    }
}

impl<V> IntoResponse for Envelope<'_, V>
where
    V: serde::Serialize,
{
    fn into_response(self) -> Response {
        match write_json(StatusCode::OK, &self, &HeaderMap::new()) {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(%err, "failed to encode response envelope");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

impl<B: IntoResponse> IntoResponse for (StatusCode, B) {
    fn into_response(self) -> Response {
        let mut response = self.1.into_response();
        if response.status().is_success() {
            *response.status_mut() = self.0;
        }

        response
    }
}
