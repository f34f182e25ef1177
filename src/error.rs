use axum::{http::StatusCode, response::IntoResponse};

use crate::{bus::BusError, config::ConfigError, store::StoreError};

pub type AppResult<T> = Result<T, AppErr>;

/* ------------ relay 內部 ------------ */

/// A push to one client failed because its session is already gone.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("connection lost")]
pub struct ConnectionLost;

/* ------------ HTTP / 啟動 ------------ */

#[derive(thiserror::Error, Debug)]
pub enum AppErr {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config: {0}")]
    Config(#[from] ConfigError),

    #[error("Store: {0}")]
    Store(#[from] StoreError),

    #[error("Bus: {0}")]
    Bus(#[from] BusError),
}

impl IntoResponse for AppErr {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_maps_to_500() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "index.html");
        let resp = AppErr::from(err).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn startup_errors_render_as_500_too() {
        let resp = AppErr::from(StoreError::Unavailable("refused".into())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
