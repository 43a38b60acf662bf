//! Site identity shared by pages, feeds and outgoing mail.

use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteInfo {
    pub title: String,
    pub description: String,
    public_url: Url,
}

impl SiteInfo {
    /// `public_url` is normalised to end with `/` so relative joins keep its path.
    pub fn new(title: impl Into<String>, description: impl Into<String>, mut public_url: Url) -> Self {
        if !public_url.path().ends_with('/') {
            let path = format!("{}/", public_url.path());
            public_url.set_path(&path);
        }
        Self {
            title: title.into(),
            description: description.into(),
            public_url,
        }
    }

    pub fn public_url(&self) -> &Url {
        &self.public_url
    }

    /// Absolute URL for a site path such as `/2024/1/5/hello/`.
    pub fn absolute_url(&self, path: &str) -> String {
        match self.public_url.join(path.trim_start_matches('/')) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}{}", self.public_url, path.trim_start_matches('/')),
        }
    }
}
