use tracing::{Instrument, info};

use agora_store::{AuthProvider, TreeStore};
use agora_sync::{OptimisticMutator, ScreenScope, Settled};
use agora_types::Article;
use agora_types::api::PublishRequest;

use crate::error::AppError;
use crate::route::Route;
use crate::session::Session;

pub struct PublishScreen<S: TreeStore> {
    scope: ScreenScope,
    me: String,
    mutator: OptimisticMutator<S>,
}

impl<S: TreeStore> PublishScreen<S> {
    pub fn mount<A: AuthProvider>(session: &Session<S, A>) -> Result<Self, AppError> {
        Ok(Self {
            me: session.require_user()?,
            scope: ScreenScope::new("publish"),
            mutator: session.mutator(),
        })
    }

    /// Encode the optional image, write the article, and head back to the feed.
    pub async fn publish(&self, request: PublishRequest) -> Result<(Article, Route), AppError> {
        self.write_article(request)
            .instrument(self.scope.span().clone())
            .await
    }

    async fn write_article(&self, request: PublishRequest) -> Result<(Article, Route), AppError> {
        if request.text.trim().is_empty() && request.image.is_none() {
            return Err(AppError::Validation("write something or pick an image".into()));
        }

        let image = request
            .image
            .as_deref()
            .map(agora_media::encode)
            .transpose()
            .map_err(|e| AppError::Media(e.to_string()))?;

        let mutation = self.mutator.publish_article(&self.me, &request.text, image)?;
        match mutation.settle().await {
            Settled::Confirmed(article) | Settled::Diverged { local: article, .. } => {
                info!("Article {} published by {}", article.id, article.user_id);
                Ok((article, Route::Feed))
            }
            Settled::RolledBack { error, .. } => Err(error.into()),
        }
    }

    pub fn close(mut self) {
        self.scope.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::session;
    use agora_sync::fetch_record;
    use agora_types::paths;

    fn jpeg() -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
        bytes.resize(64, 0);
        bytes
    }

    #[tokio::test]
    async fn publishes_text_and_image() {
        let session = session();
        session.sign_up("me@x.y", "secret1").await.unwrap();
        let screen = PublishScreen::mount(&session).unwrap();

        let (article, next) = screen
            .publish(PublishRequest { text: "look".into(), image: Some(jpeg()) })
            .await
            .unwrap();
        assert_eq!(next, Route::Feed);

        let stored: Article = fetch_record(session.store(), &paths::article(&article.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.likes, 0);
        let image = agora_media::decode(stored.image_url.as_deref().unwrap()).unwrap();
        assert_eq!(image.bytes, jpeg());
        assert_eq!(screen.scope.name(), "publish");
        screen.close();
    }

    #[tokio::test]
    async fn bad_input_is_reported() {
        let session = session();
        session.sign_up("me@x.y", "secret1").await.unwrap();
        let screen = PublishScreen::mount(&session).unwrap();

        let empty = screen.publish(PublishRequest { text: "  ".into(), image: None }).await;
        assert!(matches!(empty, Err(AppError::Validation(_))));

        let not_image = screen
            .publish(PublishRequest { text: "hi".into(), image: Some(b"text".to_vec()) })
            .await;
        assert!(matches!(not_image, Err(AppError::Media(_))));
        assert_eq!(session.store().read_once(paths::ARTICLES).await.unwrap(), None);
    }
}
