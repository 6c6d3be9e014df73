//! # Extractors
//!
//! Bridges axum requests to the transport-neutral [`RequestParams`] and
//! [`RequestScope`] consumed by the resource pipeline.

use std::convert::Infallible;

use axum::body::Bytes;
use axum::extract::{Form, FromRequest, FromRequestParts, Query, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::request::Parts;
use axum::http::StatusCode;
use serde_json::Value;

use super::middleware::request_id_of;
use crate::auth::JwtClaims;
use crate::resource::{Reply, RequestParams, RequestScope};

fn bad_request(request_id: &str, message: impl Into<String>) -> Reply {
    Reply::failed(request_id, message).with_status(StatusCode::BAD_REQUEST)
}

impl<S> FromRequest<S> for RequestParams
where
    S: Send + Sync,
{
    type Rejection = Reply;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let request_id = request_id_of(req.extensions());

        let Query(query) = Query::<Vec<(String, String)>>::try_from_uri(req.uri())
            .map_err(|err| bad_request(&request_id, err.body_text()))?;

        let headers = req
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_owned(), v.to_owned()))
            })
            .collect();

        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let mut params = RequestParams {
            query,
            headers,
            ..RequestParams::default()
        };

        if content_type.starts_with("application/json") {
            let body = Bytes::from_request(req, state)
                .await
                .map_err(|err| bad_request(&request_id, err.body_text()))?;
            if !body.is_empty() {
                let value: Value = serde_json::from_slice(&body)
                    .map_err(|err| bad_request(&request_id, format!("Invalid JSON body: {err}")))?;
                match value {
                    Value::Object(map) => params.json = Some(map),
                    Value::Null => {}
                    _ => return Err(bad_request(&request_id, "JSON body must be an object")),
                }
            }
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(form) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(|err| bad_request(&request_id, err.body_text()))?;
            params.form = form;
        }

        Ok(params)
    }
}

impl<S> FromRequestParts<S> for RequestScope
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let scope = RequestScope::new(request_id_of(&parts.extensions));
        Ok(match parts.extensions.get::<JwtClaims>() {
            Some(claims) => scope.with_identity(claims.sub.clone()),
            None => scope,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_server::middleware::RequestId;
    use axum::body::Body;

    fn request(method: &str, uri: &str, content_type: Option<&str>, body: &str) -> Request {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header(CONTENT_TYPE, ct);
        }
        let mut req = builder
            .header("X-Custom", "yes")
            .body(Body::from(body.to_owned()))
            .unwrap();
        req.extensions_mut().insert(RequestId("rid-x".into()));
        req
    }

    #[tokio::test]
    async fn test_query_and_headers() {
        let req = request("GET", "/users?page=2&tag=a&tag=b", None, "");
        let params = RequestParams::from_request(req, &()).await.unwrap();
        assert_eq!(
            params.query,
            vec![
                ("page".to_string(), "2".to_string()),
                ("tag".to_string(), "a".to_string()),
                ("tag".to_string(), "b".to_string()),
            ]
        );
        assert!(params.headers.contains(&("x-custom".to_string(), "yes".to_string())));
        assert!(params.json.is_none());
    }

    #[tokio::test]
    async fn test_json_object_body() {
        let req = request("POST", "/users", Some("application/json"), r#"{"phone":"138"}"#);
        let params = RequestParams::from_request(req, &()).await.unwrap();
        assert_eq!(params.json.unwrap()["phone"], "138");
    }

    #[tokio::test]
    async fn test_empty_json_body_is_none() {
        let req = request("POST", "/users", Some("application/json"), "");
        let params = RequestParams::from_request(req, &()).await.unwrap();
        assert!(params.json.is_none());
    }

    #[tokio::test]
    async fn test_non_object_json_rejected() {
        let req = request("POST", "/users", Some("application/json"), "[1,2]");
        let reply = RequestParams::from_request(req, &()).await.unwrap_err();
        assert_eq!(reply.status(), StatusCode::BAD_REQUEST);
        assert_eq!(reply.envelope().request_id(), "rid-x");
        assert!(!reply.envelope().is_success());
    }

    #[tokio::test]
    async fn test_form_body() {
        let req = request(
            "POST",
            "/users",
            Some("application/x-www-form-urlencoded"),
            "real_name=Li+Lei&phone=139",
        );
        let params = RequestParams::from_request(req, &()).await.unwrap();
        assert!(params.form.contains(&("real_name".to_string(), "Li Lei".to_string())));
        assert!(params.form.contains(&("phone".to_string(), "139".to_string())));
    }

    #[tokio::test]
    async fn test_scope_reads_claims() {
        let req = request("GET", "/", None, "");
        let (mut parts, _) = req.into_parts();
        let scope = RequestScope::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(scope, RequestScope::new("rid-x"));

        parts.extensions.insert(JwtClaims {
            sub: "u-1".into(),
            iat: 0,
            exp: 0,
            iss: "restbase".into(),
            extra: Default::default(),
        });
        let scope = RequestScope::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(scope.identity.as_deref(), Some("u-1"));
    }
}
