use axum::http::HeaderMap;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

const INTERNAL_KEY_HEADER: &str = "x-internal-api-key";

/// Gate for internal endpoints (the run trigger). When `INTERNAL_API_KEY`
/// is configured every caller must present it; when it is not configured the
/// gate is open in development and closed in production.
pub fn require_internal_key(state: &AppState, headers: &HeaderMap) -> AppResult<()> {
    let presented = headers
        .get(INTERNAL_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    match state.config.internal_api_key.as_deref() {
        Some(expected) => match presented {
            Some(key) if key == expected => Ok(()),
            Some(_) => Err(AppError::Forbidden(
                "Forbidden: invalid internal API key.".to_string(),
            )),
            None => Err(AppError::Unauthorized(
                "Unauthorized: missing internal API key.".to_string(),
            )),
        },
        None if state.config.is_production() => Err(AppError::Unauthorized(
            "Unauthorized: INTERNAL_API_KEY is not configured.".to_string(),
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::require_internal_key;
    use crate::config::AppConfig;
    use crate::state::AppState;
    use axum::http::HeaderMap;

    fn state_with(key: Option<&str>, environment: &str) -> AppState {
        let mut config = AppConfig::from_env();
        config.internal_api_key = key.map(ToOwned::to_owned);
        config.environment = environment.to_string();
        config.database_url = None;
        AppState::build(config).expect("state builds")
    }

    #[test]
    fn accepts_matching_key() {
        let state = state_with(Some("s3cret"), "production");
        let mut headers = HeaderMap::new();
        headers.insert("x-internal-api-key", "s3cret".parse().unwrap());
        assert!(require_internal_key(&state, &headers).is_ok());
    }

    #[test]
    fn rejects_wrong_or_missing_key() {
        let state = state_with(Some("s3cret"), "development");
        let mut headers = HeaderMap::new();
        assert!(require_internal_key(&state, &headers).is_err());
        headers.insert("x-internal-api-key", "wrong".parse().unwrap());
        assert!(require_internal_key(&state, &headers).is_err());
    }

    #[test]
    fn open_in_development_without_configured_key() {
        let state = state_with(None, "development");
        assert!(require_internal_key(&state, &HeaderMap::new()).is_ok());
    }

    #[test]
    fn closed_in_production_without_configured_key() {
        let state = state_with(None, "production");
        assert!(require_internal_key(&state, &HeaderMap::new()).is_err());
    }
}
