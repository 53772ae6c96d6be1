//! Standard response envelope: `{success, data, message, pagination?}`.

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pagination: Option<Pagination>,
}

impl<T> Envelope<T> {
    pub fn failure(message: impl Into<String>, data: T) -> Self {
        Envelope {
            success: false,
            data,
            message: message.into(),
            pagination: None,
        }
    }
}

pub fn success<T: Serialize>(status: StatusCode, data: T, message: impl Into<String>) -> (StatusCode, Json<Envelope<T>>) {
    (
        status,
        Json(Envelope {
            success: true,
            data,
            message: message.into(),
            pagination: None,
        }),
    )
}

pub fn success_ok<T: Serialize>(data: T, message: impl Into<String>) -> (StatusCode, Json<Envelope<T>>) {
    success(StatusCode::OK, data, message)
}

pub fn success_created<T: Serialize>(data: T, message: impl Into<String>) -> (StatusCode, Json<Envelope<T>>) {
    success(StatusCode::CREATED, data, message)
}

pub fn success_page<T: Serialize>(
    data: Vec<T>,
    message: impl Into<String>,
    pagination: Pagination,
) -> (StatusCode, Json<Envelope<Vec<T>>>) {
    (
        StatusCode::OK,
        Json(Envelope {
            success: true,
            data,
            message: message.into(),
            pagination: Some(pagination),
        }),
    )
}
