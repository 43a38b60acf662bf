//! RSS feed of the latest published posts.

use std::sync::Arc;

use thiserror::Error;
use time::format_description::well_known::Rfc2822;

use crate::application::repos::{PostsRepo, RepoError};
use crate::application::site::SiteInfo;
use crate::domain::posts::{EXCERPT_WORDS, post_path, truncate_words};

pub const FEED_ITEM_LIMIT: u32 = 5;

#[derive(Clone)]
pub struct SyndicationService {
    posts: Arc<dyn PostsRepo>,
    site: Arc<SiteInfo>,
}

#[derive(Debug, Error)]
pub enum SyndicationError {
    #[error("failed to list posts: {0}")]
    Posts(#[from] RepoError),
}

impl SyndicationService {
    pub fn new(posts: Arc<dyn PostsRepo>, site: Arc<SiteInfo>) -> Self {
        Self { posts, site }
    }

    /// Generate RSS 2.0 feed XML.
    pub async fn rss_feed(&self) -> Result<String, SyndicationError> {
        let posts = self.posts.list_recent_published(FEED_ITEM_LIMIT).await?;

        let mut items = String::new();
        for post in posts {
            let pub_date = post
                .publish
                .format(&Rfc2822)
                .unwrap_or_else(|_| post.publish.to_string());
            let link = self.site.absolute_url(&post_path(&post));
            items.push_str(&format!(
                "    <item>\n      <title>{}</title>\n      <link>{}</link>\n      <guid>{}</guid>\n      <pubDate>{}</pubDate>\n      <description>{}</description>\n    </item>\n",
                xml_escape(&post.title),
                xml_escape(&link),
                xml_escape(&link),
                pub_date,
                xml_escape(&truncate_words(&post.body, EXCERPT_WORDS)),
            ));
        }

        let channel = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\">\n  <channel>\n    <title>{}</title>\n    <link>{}</link>\n    <description>{}</description>\n{}  </channel>\n</rss>\n",
            xml_escape(&self.site.title),
            xml_escape(self.site.public_url().as_str()),
            xml_escape(&self.site.description),
            items
        );

        Ok(channel)
    }
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
