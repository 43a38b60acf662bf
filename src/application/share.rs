use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::forms::{FORM_ERROR_FIELD, FieldErrors, ShareForm, ShareRequest};
use crate::application::mail::{Mailer, OutgoingMail};
use crate::application::repos::{PostsRepo, RepoError};
use crate::application::site::SiteInfo;
use crate::domain::entities::PostRecord;
use crate::domain::posts::post_path;

pub const METRIC_SHARES_SENT: &str = "quire_shares_sent_total";
pub const METRIC_SHARES_FAILED: &str = "quire_shares_failed_total";

#[derive(Debug, Clone)]
pub struct ShareOutcome {
    pub post: PostRecord,
    pub form: ShareForm,
    pub errors: FieldErrors,
    pub sent: bool,
}

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("post not found")]
    NotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct ShareService {
    posts: Arc<dyn PostsRepo>,
    mailer: Arc<dyn Mailer>,
    site: Arc<SiteInfo>,
    from_address: String,
}

impl ShareService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        mailer: Arc<dyn Mailer>,
        site: Arc<SiteInfo>,
        from_address: impl Into<String>,
    ) -> Self {
        Self {
            posts,
            mailer,
            site,
            from_address: from_address.into(),
        }
    }

    /// Empty share form for a published post.
    pub async fn load(&self, id: Uuid) -> Result<ShareOutcome, ShareError> {
        let post = self.find(id).await?;
        Ok(ShareOutcome {
            post,
            form: ShareForm::default(),
            errors: FieldErrors::new(),
            sent: false,
        })
    }

    /// Validate the form and mail the post link to the recipient.
    pub async fn share(&self, id: Uuid, form: ShareForm) -> Result<ShareOutcome, ShareError> {
        let post = self.find(id).await?;

        let request = match form.validate() {
            Ok(request) => request,
            Err(errors) => {
                return Ok(ShareOutcome {
                    post,
                    form: form.normalized(),
                    errors,
                    sent: false,
                });
            }
        };

        let mail = compose_share_mail(
            &self.from_address,
            &post,
            &self.site.absolute_url(&post_path(&post)),
            &request,
        );

        let mut errors = FieldErrors::new();
        let sent = match self.mailer.send(mail).await {
            Ok(()) => {
                metrics::counter!(METRIC_SHARES_SENT).increment(1);
                info!(
                    target = "quire::application::share",
                    post_id = %post.id,
                    transport = self.mailer.transport_name(),
                    "share mail sent"
                );
                true
            }
            Err(err) => {
                metrics::counter!(METRIC_SHARES_FAILED).increment(1);
                warn!(
                    target = "quire::application::share",
                    post_id = %post.id,
                    transport = self.mailer.transport_name(),
                    error = %err,
                    "share mail failed"
                );
                errors.add(
                    FORM_ERROR_FIELD,
                    "The message could not be sent. Please try again later.",
                );
                false
            }
        };

        Ok(ShareOutcome {
            post,
            form: form.normalized(),
            errors,
            sent,
        })
    }

    async fn find(&self, id: Uuid) -> Result<PostRecord, ShareError> {
        self.posts
            .find_published_by_id(id)
            .await?
            .ok_or(ShareError::NotFound)
    }
}

pub fn compose_share_mail(
    from: &str,
    post: &PostRecord,
    post_url: &str,
    request: &ShareRequest,
) -> OutgoingMail {
    let subject = format!(
        "{} ({}) recommends you reading \"{}\"",
        request.name, request.email, post.title
    );
    let body = format!(
        "Read \"{}\" at {}\n\n{}'s comments: {}",
        post.title, post_url, request.name, request.comments
    );
    OutgoingMail {
        from: from.to_string(),
        to: vec![request.to.clone()],
        subject,
        body,
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::domain::types::PostStatus;

    #[test]
    fn share_mail_uses_fixed_format() {
        let post = PostRecord {
            id: Uuid::new_v4(),
            slug: "hello".into(),
            title: "Hello".into(),
            body: String::new(),
            status: PostStatus::Published,
            publish: datetime!(2024-01-05 10:00 UTC),
            created_at: datetime!(2024-01-05 10:00 UTC),
            updated_at: datetime!(2024-01-05 10:00 UTC),
        };
        let request = ShareRequest {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            to: "bob@example.com".into(),
            comments: "Worth it".into(),
        };

        let mail = compose_share_mail(
            "admin@localhost",
            &post,
            "https://blog.example.com/2024/1/5/hello/",
            &request,
        );

        assert_eq!(mail.from, "admin@localhost");
        assert_eq!(mail.to, vec!["bob@example.com".to_string()]);
        assert_eq!(
            mail.subject,
            "Ada (ada@example.com) recommends you reading \"Hello\""
        );
        assert_eq!(
            mail.body,
            "Read \"Hello\" at https://blog.example.com/2024/1/5/hello/\n\nAda's comments: Worth it"
        );
    }
}
