use http::{HeaderMap, Method, StatusCode};
use serde_json::json;

use crate::{
    domains::{MovieInput, MovieRef},
    http::{read_id_param, read_json, write_json, Envelope, IntoResponse, Request, Response},
    AppState,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn route_request(request: Request, app_state: AppState) -> Response {
    macro_rules! routes {
        (
            $($m:ident $p:literal $($v:ident)? => $f:expr),*
            $(, _ => $wc:expr)?
        ) => {
            $(if request.method() == Method::$m {
                let path = request.uri().path()
                    .strip_prefix($p)
                    .map(|s| s.strip_suffix("/").unwrap_or(s));
                if let Some(_path) = path {
                    $(let $v = _path;)?
                    return $f;
                }
            })*
            $(return $wc;)?
        };
    }

    routes!(
        GET "/v1/healthcheck" => healthcheck(app_state),
        GET "/v1/movies/" id => show_movie(id),
        POST "/v1/movies" => create_movie(request),
        _ => {
            let message = format!(
                "rota desconhecida {} {}",
                request.method(),
                request.uri().path()
            );
            error_response(StatusCode::NOT_FOUND, message)
        }
    );
}

fn healthcheck(app_state: AppState) -> Response {
    let data = Envelope::from([
        ("status", json!("available")),
        (
            "system_info",
            json!({ "environment": app_state.config.env, "version": VERSION }),
        ),
    ]);

    data.into_response()
}

fn create_movie(request: Request) -> Response {
    let input: MovieInput = match read_json(request) {
        Ok(input) => input,
        Err(err) => {
            tracing::debug!(%err, "rejected movie payload");
            return error_response(StatusCode::BAD_REQUEST, err.to_string());
        }
    };

    let data = Envelope::from([("movie", &input)]);
    match write_json(StatusCode::OK, &data, &HeaderMap::new()) {
        Ok(response) => response,
        Err(err) => server_error(err),
    }
}

fn show_movie(id: &str) -> Response {
    let Ok(id) = read_id_param(id) else {
        return not_found();
    };

    let data = Envelope::from([("movie", MovieRef { id })]);
    (StatusCode::OK, data).into_response()
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let data = Envelope::from([("error", message.into())]);
    (status, data).into_response()
}

fn not_found() -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        "o recurso solicitado não foi encontrado",
    )
}

fn server_error(err: impl std::fmt::Display) -> Response {
    tracing::error!(%err, "failed to handle request");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "o servidor encontrou um problema e não pôde processar a requisição",
    )
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::header::CONTENT_TYPE;
    use serde_json::Value;

    use super::*;
    use crate::config::Config;

    fn state() -> AppState {
        AppState {
            config: Config {
                server_address: "127.0.0.1:0".into(),
                env: "test".into(),
                timeout: 15,
            },
        }
    }

    fn request(method: Method, path: &str, body: Option<&str>) -> Request {
        http::Request::builder()
            .method(method)
            .uri(path)
            .body(body.map(|b| Bytes::copy_from_slice(b.as_bytes())))
            .expect("valid request")
    }

    fn json_body(response: &Response) -> Value {
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let body = response.body().as_deref().expect("response has a body");
        assert_eq!(body.last(), Some(&b'\n'));

        serde_json::from_slice(body).expect("valid json body")
    }

    #[tokio::test]
    async fn healthcheck_reports_availability() {
        let response = route_request(request(Method::GET, "/v1/healthcheck", None), state()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(&response),
            json!({
                "status": "available",
                "system_info": { "environment": "test", "version": VERSION },
            })
        );
    }

    #[tokio::test]
    async fn creates_movies_from_valid_payloads() {
        let body = r#"{"title": "Moana", "year": 2016, "runtime": 107, "genres": ["animation"]}"#;
        let response = route_request(request(Method::POST, "/v1/movies", Some(body)), state()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(&response),
            json!({
                "movie": { "title": "Moana", "year": 2016, "runtime": 107, "genres": ["animation"] },
            })
        );
    }

    #[tokio::test]
    async fn missing_movie_fields_are_zero_filled() {
        let body = r#"{"title": "x"}"#;
        let response = route_request(request(Method::POST, "/v1/movies", Some(body)), state()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(&response),
            json!({ "movie": { "title": "x", "year": 0, "runtime": 0, "genres": [] } })
        );
    }

    #[tokio::test]
    async fn rejects_invalid_movie_payloads() {
        let cases = [
            (None, "O corpo não pode ficar vazio"),
            (
                Some(r#"{"title": "Moana", "rating": 5}"#),
                r#"O corpo contém uma chave desconhecida "rating""#,
            ),
            (
                Some(r#"{"title": 1, "year": 2016, "runtime": 107}"#),
                r#"O corpo contém tipo JSON incorreto para o campo "title""#,
            ),
            (
                Some(r#"{"title": "Moana", "year": 2016, "runtime": 107}{}"#),
                "O corpo só pode conter um valor JSON",
            ),
            (
                Some(r#"{"title": 1, "year" 2016}"#),
                "O corpo está com JSON formatado incorretamente (no caractere 21)",
            ),
        ];

        for (body, message) in cases {
            let response = route_request(request(Method::POST, "/v1/movies", body), state()).await;

            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body:?}");
            assert_eq!(json_body(&response), json!({ "error": message }));
        }
    }

    #[tokio::test]
    async fn shows_movies_by_id() {
        let response = route_request(request(Method::GET, "/v1/movies/42", None), state()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(&response), json!({ "movie": { "id": 42 } }));
    }

    #[tokio::test]
    async fn invalid_ids_are_not_found() {
        for path in ["/v1/movies/0", "/v1/movies/-1", "/v1/movies/abc", "/v1/movies/"] {
            let response = route_request(request(Method::GET, path, None), state()).await;

            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
            assert_eq!(
                json_body(&response),
                json!({ "error": "o recurso solicitado não foi encontrado" })
            );
        }
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let response = route_request(request(Method::DELETE, "/v1/movies/1", None), state()).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            json_body(&response),
            json!({ "error": "rota desconhecida DELETE /v1/movies/1" })
        );
    }
}
