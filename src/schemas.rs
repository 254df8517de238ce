use serde::Deserialize;
use validator::Validate;

use crate::error::{AppError, AppResult};

pub fn validate_input<T: Validate>(input: &T) -> AppResult<()> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CardsQuery {
    #[validate(length(min = 1, max = 64))]
    pub org_id: String,
}

pub fn non_empty_opt(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::{non_empty_opt, validate_input, CardsQuery};

    #[test]
    fn non_empty_opt_trims_and_filters() {
        assert_eq!(non_empty_opt(Some("  a ")), Some("a".to_string()));
        assert_eq!(non_empty_opt(Some("   ")), None);
        assert_eq!(non_empty_opt(None), None);
    }

    #[test]
    fn cards_query_requires_org_id() {
        let bad = CardsQuery {
            org_id: String::new(),
        };
        assert!(validate_input(&bad).is_err());

        let ok = CardsQuery {
            org_id: "9e0a7b1c-8f1d-4a4f-8d2c-0f5b9f4a2d11".to_string(),
        };
        assert!(validate_input(&ok).is_ok());
    }
}
