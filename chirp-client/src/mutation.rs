//! The post composer: validates drafts as they are typed, submits them and
//! refreshes the feeds a new post appears in.

use crate::{cache::QueryCache, lock::mutex_lock};
use chirp_common::{
    error::ServiceError,
    model::post::Post,
    service::QueryService,
    validation::{ContentError, validate},
};
use std::{
    fmt::{Debug, Formatter},
    sync::{Arc, Mutex, MutexGuard},
};
use thiserror::Error;
use tracing::{debug, info};

const SOURCE: &str = "mutation";

pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to post! Please try again later.";

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub enum Submission {
    #[default]
    Idle,
    Pending,
    Succeeded,
    Failed,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct FormState {
    pub raw_value: String,
    pub touched: bool,
    /// Message to show under the input, from the validator or the last
    /// failed submission.
    pub validation_error: Option<String>,
    pub submission: Submission,
}

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum SubmitError {
    #[error("A submission is already pending")]
    AlreadyPending,
    #[error(transparent)]
    Invalid(#[from] ContentError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

pub struct PostComposer {
    cache: QueryCache,
    service: Arc<dyn QueryService>,
    form: Mutex<FormState>,
}

impl Debug for PostComposer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostComposer")
            .field("cache", &self.cache)
            .field("form", &*self.form())
            .finish_non_exhaustive()
    }
}

impl PostComposer {
    pub fn new(cache: QueryCache, service: Arc<dyn QueryService>) -> Self {
        Self {
            cache,
            service,
            form: Mutex::default(),
        }
    }

    fn form(&self) -> MutexGuard<'_, FormState> {
        mutex_lock(&self.form, SOURCE, "form")
    }

    #[must_use]
    pub fn state(&self) -> FormState {
        self.form().clone()
    }

    /// Records a keystroke and re-checks the draft for inline feedback.
    pub fn edit(&self, raw: impl Into<String>) -> FormState {
        let mut form = self.form();
        form.raw_value = raw.into();
        form.touched = true;
        form.validation_error = validate(&form.raw_value).err().map(|err| err.to_string());
        if matches!(form.submission, Submission::Succeeded | Submission::Failed) {
            form.submission = Submission::Idle;
        }
        form.clone()
    }

    /// Back to `Idle` after a finished submission. A pending one is left alone.
    pub fn reset(&self) {
        let mut form = self.form();
        if form.submission != Submission::Pending {
            form.submission = Submission::Idle;
        }
    }

    /// Validates `raw` and creates a post from it.
    ///
    /// On success the draft is cleared and every cached feed containing the
    /// author's posts is refetched; nothing is spliced into the cache by hand.
    /// On failure the draft is kept for another attempt.
    pub async fn submit(&self, raw: impl Into<String>) -> Result<Post, SubmitError> {
        let raw = raw.into();

        {
            let mut form = self.form();
            if form.submission == Submission::Pending {
                return Err(SubmitError::AlreadyPending);
            }

            form.raw_value.clone_from(&raw);
            form.touched = true;
            if let Err(err) = validate(&raw) {
                form.validation_error = Some(err.to_string());
                form.submission = Submission::Failed;
                return Err(err.into());
            }
            form.validation_error = None;
            form.submission = Submission::Pending;
        }

        let pending = PendingGuard {
            composer: self,
            armed: true,
        };
        let result = self.service.create_post(raw).await;
        pending.disarm();

        match result {
            Ok(post) => {
                {
                    let mut form = self.form();
                    form.raw_value.clear();
                    form.touched = false;
                    form.validation_error = None;
                    form.submission = Submission::Succeeded;
                }

                let author = post.author_id;
                let refreshed = self
                    .cache
                    .invalidate_matching(|key| key.includes_posts_by(author));
                info!(id = %post.id, %author, refreshed, "Created post");

                Ok(post)
            }
            Err(err) => {
                debug!(error = %err, "Creating post failed");

                let mut form = self.form();
                form.validation_error = Some(
                    err.field_message("content")
                        .unwrap_or(GENERIC_FAILURE_MESSAGE)
                        .to_owned(),
                );
                form.submission = Submission::Failed;

                Err(err.into())
            }
        }
    }
}

/// Puts the form back to `Idle` when a submission is dropped while the
/// service call is still outstanding.
struct PendingGuard<'a> {
    composer: &'a PostComposer,
    armed: bool,
}

impl PendingGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut form = self.composer.form();
        if form.submission == Submission::Pending {
            debug!("Submission dropped before the service answered");
            form.submission = Submission::Idle;
        }
    }
}
