//! `GET /api`: every registered resource with its names and schema endpoint.

use crate::case::ResourceNames;
use crate::response::success_ok;
use crate::state::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Endpoint {
    pub method: &'static str,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct Endpoints {
    pub schema: Endpoint,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEntry {
    pub name: String,
    pub plural_name: String,
    pub snake_name: String,
    pub kebab_name: String,
    pub snake_plural_name: String,
    pub kebab_plural_name: String,
    pub endpoints: Endpoints,
}

impl ApiEntry {
    pub fn new(names: &ResourceNames, base_url: &str) -> Self {
        ApiEntry {
            name: names.singular.clone(),
            plural_name: names.plural.clone(),
            snake_name: names.snake_singular.clone(),
            kebab_name: names.kebab_singular.clone(),
            snake_plural_name: names.snake_plural.clone(),
            kebab_plural_name: names.kebab_plural.clone(),
            endpoints: Endpoints {
                schema: Endpoint {
                    method: "GET",
                    path: format!("{}/api/{}/schema", base_url.trim_end_matches('/'), names.kebab_plural),
                },
            },
        }
    }
}

pub async fn api_index(State(state): State<AppState>) -> impl IntoResponse {
    let entries: Vec<ApiEntry> = state
        .registry
        .resources()
        .iter()
        .map(|r| ApiEntry::new(r.names(), &state.config.api_base_url))
        .collect();
    success_ok(entries, "api")
}
