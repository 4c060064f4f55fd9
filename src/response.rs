use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema, Clone, PartialEq)]
pub struct Meta {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub total: Option<i64>,
    pub next: Option<i64>,
    pub previous: Option<i64>,
}

impl Meta {
    pub fn new(page: i64, per_page: i64, total: i64) -> Self {
        let last_page = if total == 0 {
            1
        } else {
            (total + per_page - 1) / per_page
        };
        Self {
            page: Some(page),
            per_page: Some(per_page),
            total: Some(total),
            next: (page < last_page).then_some(page + 1),
            previous: (page > 1).then_some(page - 1),
        }
    }

    pub fn empty() -> Self {
        Self {
            page: None,
            per_page: None,
            total: None,
            next: None,
            previous: None,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub message: String,
    pub data: Option<T>,
    pub meta: Option<Meta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T, meta: Option<Meta>) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
            meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_links_neighbouring_pages() {
        let meta = Meta::new(2, 6, 20);
        assert_eq!(meta.next, Some(3));
        assert_eq!(meta.previous, Some(1));

        let last = Meta::new(4, 6, 20);
        assert_eq!(last.next, None);
        assert_eq!(last.previous, Some(3));
    }

    #[test]
    fn meta_for_empty_listing_has_no_links() {
        let meta = Meta::new(1, 6, 0);
        assert_eq!(meta.next, None);
        assert_eq!(meta.previous, None);
        assert_eq!(meta.total, Some(0));
    }
}
