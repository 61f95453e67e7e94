//! 可信身份中间件
//!
//! 认证由上游网关完成，服务只信任内部 header 传递的已认证身份。
//! 缺失身份标识的请求一律返回 401，不做任何回退猜测。

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// 网关注入的已认证身份 header
pub const IDENTITY_HEADER: &str = "x-user-id";

/// 无需身份的探针路径
const PROBE_PATHS: [&str; 2] = ["/health", "/ready"];

/// 已认证身份，注入请求扩展供处理器读取
#[derive(Clone, Debug)]
pub struct Identity(pub String);

impl Identity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 身份中间件
///
/// 从 `x-user-id` header 提取网关认证过的身份并注入请求扩展；
/// 探针路径直接放行。
pub async fn identity_middleware(mut request: Request, next: Next) -> Response {
    let path = request.uri().path();

    if PROBE_PATHS.iter().any(|p| path == *p) {
        return next.run(request).await;
    }

    let identity = request
        .headers()
        .get(IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from);

    match identity {
        Some(user_id) => {
            request.extensions_mut().insert(Identity(user_id));
            next.run(request).await
        }
        None => unauthenticated_response(),
    }
}

/// 生成 401 未认证响应
fn unauthenticated_response() -> Response {
    let body = json!({
        "success": false,
        "code": "UNAUTHENTICATED",
        "message": "缺少可信身份标识",
        "data": null
    });

    (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
}
