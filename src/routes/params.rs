use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_PAGE_SIZE: i64 = 6;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Default, Clone, Copy, Deserialize, ToSchema, IntoParams)]
pub struct Pagination {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl Pagination {
    /// Returns `(page, limit, offset)` with the page floored at 1 and the limit clamped.
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1).saturating_mul(limit);
        (page, limit, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_first_page_of_six() {
        assert_eq!(Pagination::default().normalize(), (1, 6, 0));
    }

    #[test]
    fn clamps_out_of_range_values() {
        let pagination = Pagination {
            page: Some(-3),
            limit: Some(1000),
        };
        assert_eq!(pagination.normalize(), (1, MAX_PAGE_SIZE, 0));

        let pagination = Pagination {
            page: Some(3),
            limit: Some(0),
        };
        assert_eq!(pagination.normalize(), (3, 1, 2));
    }

    #[test]
    fn huge_page_saturates_offset() {
        let pagination = Pagination {
            page: Some(i64::MAX),
            limit: Some(6),
        };
        assert_eq!(pagination.normalize(), (i64::MAX, 6, i64::MAX));
    }
}
