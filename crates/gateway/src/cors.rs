use {
    axum::{
        Json,
        extract::Request,
        http::{
            HeaderMap, HeaderValue, Method, StatusCode,
            header::{
                ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
                ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, ORIGIN,
            },
        },
        middleware::Next,
        response::{IntoResponse, Response},
    },
    kraken_protocol::{CORS_ALLOW_HEADERS, CORS_ALLOW_METHODS, CORS_MAX_AGE_SECS},
    serde_json::json,
};

/// Reflect the caller's `Origin` and answer preflights.
///
/// Requests without an `Origin` pass through untouched. An `OPTIONS` request
/// with an `Origin` is answered here with `{}` and never routed.
pub async fn cors(request: Request, next: Next) -> Response {
    let Some(origin) = request
        .headers()
        .get(ORIGIN)
        .filter(|v| !v.is_empty())
        .cloned()
    else {
        return next.run(request).await;
    };

    let mut response = if request.method() == Method::OPTIONS {
        (StatusCode::OK, Json(json!({}))).into_response()
    } else {
        next.run(request).await
    };
    apply_cors_headers(response.headers_mut(), origin);
    response
}

fn apply_cors_headers(headers: &mut HeaderMap, origin: HeaderValue) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from(CORS_MAX_AGE_SECS));
}
