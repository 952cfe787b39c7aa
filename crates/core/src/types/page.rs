use crate::error::CoreError;

/// One-based page-number pagination, clamped to a configured maximum size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn parse(
        page: Option<u32>,
        page_size: Option<u32>,
        default_size: u32,
        max_size: u32,
    ) -> Result<Self, CoreError> {
        let page = page.unwrap_or(1);
        if page == 0 {
            return Err(CoreError::InvalidPage("page starts at 1".to_string()));
        }
        let page_size = page_size.unwrap_or(default_size);
        if page_size == 0 {
            return Err(CoreError::InvalidPage("page_size must be positive".to_string()));
        }
        Ok(Self {
            page,
            page_size: page_size.min(max_size.max(1)),
        })
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }

    pub fn next_page(&self, total: i64) -> Option<u32> {
        let seen = self.offset() + self.limit();
        if seen < total {
            Some(self.page + 1)
        } else {
            None
        }
    }

    pub fn previous_page(&self) -> Option<u32> {
        if self.page > 1 {
            Some(self.page - 1)
        } else {
            None
        }
    }
}
