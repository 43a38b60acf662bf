//! Post-level rules: date-keyed addressing, excerpts and similar-post ranking.

use std::cmp::Ordering;

use time::{
    Date, Month, OffsetDateTime, UtcOffset, format_description::FormatItem,
    macros::format_description,
};
use uuid::Uuid;

use crate::domain::entities::PostRecord;

pub const HUMAN_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[month repr:long] [day padding:none], [year]");

/// Number of posts offered as "similar" on a detail page.
pub const SIMILAR_POSTS_LIMIT: usize = 4;

/// Number of words kept in list excerpts and feed descriptions.
pub const EXCERPT_WORDS: usize = 30;

/// The calendar day a post is published on, with its UTC day bounds.
///
/// A post is addressed by `(publish date, slug)`; the bounds form the
/// half-open range `[start, end)` used to match the publish timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishDate {
    date: Date,
    start: OffsetDateTime,
    end: OffsetDateTime,
}

impl PublishDate {
    /// Build a publish date from URL components. Returns `None` for
    /// impossible calendar dates (for example `2024/2/30`).
    pub fn from_path(year: i32, month: u8, day: u8) -> Option<Self> {
        let month = Month::try_from(month).ok()?;
        let date = Date::from_calendar_date(year, month, day).ok()?;
        Self::from_date(date)
    }

    /// Parse the raw `year`, `month` and `day` path segments.
    pub fn parse_segments(year: &str, month: &str, day: &str) -> Option<Self> {
        let year = year.parse::<i32>().ok()?;
        let month = month.parse::<u8>().ok()?;
        let day = day.parse::<u8>().ok()?;
        Self::from_path(year, month, day)
    }

    pub fn from_date(date: Date) -> Option<Self> {
        let next = date.next_day()?;
        Some(Self {
            date,
            start: date.midnight().assume_utc(),
            end: next.midnight().assume_utc(),
        })
    }

    pub fn of(timestamp: OffsetDateTime) -> Option<Self> {
        Self::from_date(timestamp.to_offset(UtcOffset::UTC).date())
    }

    pub fn date(&self) -> Date {
        self.date
    }

    pub fn start(&self) -> OffsetDateTime {
        self.start
    }

    pub fn end(&self) -> OffsetDateTime {
        self.end
    }

    pub fn contains(&self, timestamp: OffsetDateTime) -> bool {
        timestamp >= self.start && timestamp < self.end
    }
}

/// Canonical detail path: `/{year}/{month}/{day}/{slug}/`, without zero padding.
pub fn post_path(post: &PostRecord) -> String {
    let date = post.publish.to_offset(UtcOffset::UTC).date();
    format!(
        "/{}/{}/{}/{}/",
        date.year(),
        u8::from(date.month()),
        date.day(),
        post.slug
    )
}

pub fn share_path(post: &PostRecord) -> String {
    format!("/{}/share/", post.id)
}

pub fn format_human_date(timestamp: OffsetDateTime) -> String {
    let date = timestamp.to_offset(UtcOffset::UTC).date();
    date.format(HUMAN_DATE_FORMAT)
        .unwrap_or_else(|_| date.to_string())
}

/// Keep the first `limit` whitespace-separated words, marking the cut with `…`.
pub fn truncate_words(text: &str, limit: usize) -> String {
    let mut words = text.split_whitespace();
    let kept: Vec<&str> = words.by_ref().take(limit).collect();
    let mut output = kept.join(" ");
    if words.next().is_some() {
        output.push('…');
    }
    output
}

/// A published post sharing `shared_tags` tags with the post being viewed.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarCandidate {
    pub post: PostRecord,
    pub shared_tags: u32,
}

/// Order candidates by shared tag count, then publish time (both descending),
/// drop the source post and any candidate without a shared tag, and keep at
/// most `limit` entries.
pub fn rank_similar(
    mut candidates: Vec<SimilarCandidate>,
    source_id: Uuid,
    limit: usize,
) -> Vec<SimilarCandidate> {
    candidates.retain(|candidate| candidate.post.id != source_id && candidate.shared_tags > 0);
    candidates.sort_by(compare_similarity);
    candidates.truncate(limit);
    candidates
}

fn compare_similarity(left: &SimilarCandidate, right: &SimilarCandidate) -> Ordering {
    right
        .shared_tags
        .cmp(&left.shared_tags)
        .then(right.post.publish.cmp(&left.post.publish))
        .then(right.post.id.cmp(&left.post.id))
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::domain::types::PostStatus;

    fn post(slug: &str, publish: OffsetDateTime) -> PostRecord {
        PostRecord {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            title: slug.to_string(),
            body: String::new(),
            status: PostStatus::Published,
            publish,
            created_at: publish,
            updated_at: publish,
        }
    }

    fn candidate(slug: &str, publish: OffsetDateTime, shared_tags: u32) -> SimilarCandidate {
        SimilarCandidate {
            post: post(slug, publish),
            shared_tags,
        }
    }

    #[test]
    fn publish_date_rejects_impossible_days() {
        assert!(PublishDate::from_path(2024, 2, 30).is_none());
        assert!(PublishDate::from_path(2024, 13, 1).is_none());
        assert!(PublishDate::from_path(2024, 2, 29).is_some());
    }

    #[test]
    fn publish_date_parses_unpadded_segments() {
        let date = PublishDate::parse_segments("2023", "3", "07").expect("valid date");
        assert_eq!(date.start(), datetime!(2023-03-07 00:00 UTC));
        assert_eq!(date.end(), datetime!(2023-03-08 00:00 UTC));
        assert!(PublishDate::parse_segments("2023", "march", "7").is_none());
    }

    #[test]
    fn publish_date_bounds_are_half_open() {
        let date = PublishDate::from_path(2023, 12, 31).expect("valid date");
        assert!(date.contains(datetime!(2023-12-31 00:00 UTC)));
        assert!(date.contains(datetime!(2023-12-31 23:59:59 UTC)));
        assert!(!date.contains(datetime!(2024-01-01 00:00 UTC)));
    }

    #[test]
    fn post_path_uses_utc_calendar_without_padding() {
        let record = post("hello-world", datetime!(2024-01-05 23:30 -02:00));
        assert_eq!(post_path(&record), "/2024/1/6/hello-world/");
    }

    #[test]
    fn truncate_words_marks_cut() {
        assert_eq!(truncate_words("one two three", 5), "one two three");
        assert_eq!(truncate_words("one  two\nthree four", 2), "one two…");
        assert_eq!(truncate_words("", 3), "");
    }

    #[test]
    fn similar_posts_order_by_shared_tags_then_recency() {
        let source = post("source", datetime!(2024-01-01 00:00 UTC));
        let candidates = vec![
            candidate("one-old", datetime!(2023-01-01 00:00 UTC), 1),
            candidate("two", datetime!(2022-01-01 00:00 UTC), 2),
            candidate("one-new", datetime!(2023-06-01 00:00 UTC), 1),
            candidate("none", datetime!(2023-12-01 00:00 UTC), 0),
            SimilarCandidate {
                post: source.clone(),
                shared_tags: 2,
            },
        ];

        let ranked = rank_similar(candidates, source.id, SIMILAR_POSTS_LIMIT);
        let slugs: Vec<&str> = ranked.iter().map(|c| c.post.slug.as_str()).collect();
        assert_eq!(slugs, vec!["two", "one-new", "one-old"]);
    }

    #[test]
    fn similar_posts_are_capped_and_skip_untagged() {
        let source_id = Uuid::new_v4();
        let mut candidates: Vec<SimilarCandidate> = (0..6)
            .map(|day| {
                candidate(
                    &format!("post-{day}"),
                    datetime!(2024-01-01 00:00 UTC) + time::Duration::days(day),
                    1,
                )
            })
            .collect();
        candidates.push(candidate("unrelated", datetime!(2025-01-01 00:00 UTC), 0));

        let ranked = rank_similar(candidates, source_id, SIMILAR_POSTS_LIMIT);
        assert_eq!(ranked.len(), SIMILAR_POSTS_LIMIT);
        assert_eq!(ranked[0].post.slug, "post-5");
        assert!(ranked.iter().all(|c| c.post.slug != "unrelated"));
    }
}
