//! Page-number pagination with forgiving page tokens.
//!
//! Listings accept the `page` query parameter verbatim. Tokens that are not
//! integers resolve to the first page; numbers below one or past the last
//! page resolve to the last page. A listing with no rows still has a single
//! (empty) page, so every request resolves to a renderable window.

use std::num::NonZeroU32;

/// Page size used by the public post listings.
pub const DEFAULT_PER_PAGE: NonZeroU32 = NonZeroU32::new(3).unwrap();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    per_page: NonZeroU32,
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(DEFAULT_PER_PAGE)
    }
}

impl Paginator {
    pub fn new(per_page: NonZeroU32) -> Self {
        Self { per_page }
    }

    pub fn per_page(&self) -> u32 {
        self.per_page.get()
    }

    pub fn num_pages(&self, total: u64) -> u64 {
        total.div_ceil(u64::from(self.per_page.get())).max(1)
    }

    /// Resolve a raw page token against `total` rows.
    pub fn resolve(&self, token: Option<&str>, total: u64) -> PageWindow {
        let num_pages = self.num_pages(total);
        let number = match token.map(str::trim) {
            None => 1,
            Some(token) => match token.parse::<i64>() {
                Ok(value) if value < 1 => num_pages,
                Ok(value) => u64::try_from(value)
                    .ok()
                    .filter(|value| *value <= num_pages)
                    .unwrap_or(num_pages),
                // Integers too wide for i64 are still past the last page.
                Err(_) if is_integer_literal(token) => num_pages,
                Err(_) => 1,
            },
        };

        PageWindow {
            number,
            num_pages,
            per_page: self.per_page.get(),
            total,
        }
    }
}

fn is_integer_literal(token: &str) -> bool {
    let digits = token
        .strip_prefix('+')
        .or_else(|| token.strip_prefix('-'))
        .unwrap_or(token);
    !digits.is_empty() && digits.bytes().all(|byte| byte.is_ascii_digit())
}

/// A resolved page: which page is shown and how it relates to its neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: u64,
    pub num_pages: u64,
    pub per_page: u32,
    pub total: u64,
}

impl PageWindow {
    pub fn offset(&self) -> u64 {
        (self.number - 1) * u64::from(self.per_page)
    }

    pub fn limit(&self) -> u32 {
        self.per_page
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_other_pages(&self) -> bool {
        self.has_previous() || self.has_next()
    }

    pub fn previous_number(&self) -> Option<u64> {
        self.has_previous().then(|| self.number - 1)
    }

    pub fn next_number(&self) -> Option<u64> {
        self.has_next().then(|| self.number + 1)
    }

    /// 1-based index of the first item on this page, or 0 for an empty listing.
    pub fn start_index(&self) -> u64 {
        if self.total == 0 {
            0
        } else {
            self.offset() + 1
        }
    }

    /// 1-based index of the last item on this page.
    pub fn end_index(&self) -> u64 {
        if self.number == self.num_pages {
            self.total
        } else {
            self.number * u64::from(self.per_page)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub window: PageWindow,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, window: PageWindow) -> Self {
        Self { items, window }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paginator() -> Paginator {
        Paginator::default()
    }

    #[test]
    fn default_page_size_is_three() {
        assert_eq!(paginator().per_page(), 3);
        assert_eq!(DEFAULT_PER_PAGE.get(), 3);
    }

    #[test]
    fn empty_listing_has_one_page() {
        let window = paginator().resolve(None, 0);
        assert_eq!(window.number, 1);
        assert_eq!(window.num_pages, 1);
        assert_eq!(window.start_index(), 0);
        assert_eq!(window.end_index(), 0);
        assert!(!window.has_other_pages());
    }

    #[test]
    fn non_integer_tokens_fall_back_to_first_page() {
        for token in ["abc", "", "2.0", "1e2"] {
            let window = paginator().resolve(Some(token), 10);
            assert_eq!(window.number, 1, "token `{token}`");
        }
    }

    #[test]
    fn out_of_range_tokens_clamp_to_last_page() {
        for token in ["9999", "0", "-3", "99999999999999999"] {
            let window = paginator().resolve(Some(token), 10);
            assert_eq!(window.number, 4, "token `{token}`");
        }
    }

    #[test]
    fn integers_wider_than_i64_clamp_to_last_page() {
        for token in ["99999999999999999999", "+99999999999999999999", "-99999999999999999999"] {
            let window = paginator().resolve(Some(token), 10);
            assert_eq!(window.number, 4, "token `{token}`");
        }
        assert_eq!(paginator().resolve(Some("+"), 10).number, 1);
    }

    #[test]
    fn whitespace_around_numbers_is_ignored() {
        assert_eq!(paginator().resolve(Some(" 2 "), 10).number, 2);
    }

    #[test]
    fn window_arithmetic_matches_page_bounds() {
        let window = paginator().resolve(Some("2"), 7);
        assert_eq!(window.offset(), 3);
        assert_eq!(window.limit(), 3);
        assert_eq!(window.start_index(), 4);
        assert_eq!(window.end_index(), 6);
        assert_eq!(window.previous_number(), Some(1));
        assert_eq!(window.next_number(), Some(3));

        let last = paginator().resolve(Some("3"), 7);
        assert_eq!(last.end_index(), 7);
        assert_eq!(last.next_number(), None);
    }
}
