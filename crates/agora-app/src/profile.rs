use tracing::info;

use agora_media::Image;
use agora_store::{AuthProvider, TreeStore};
use agora_sync::{DocumentSnapshot, OptimisticMutator, RemoteDocument, ScreenScope, Settled};
use agora_types::api::ProfileUpdate;
use agora_types::{UserProfile, paths};

use crate::error::AppError;
use crate::session::Session;

/// The signed-in user's own profile.
pub struct ProfileScreen<S: TreeStore> {
    scope: ScreenScope,
    me: String,
    profile: RemoteDocument<UserProfile>,
    snapshot: DocumentSnapshot<UserProfile>,
    mutator: OptimisticMutator<S>,
}

impl<S: TreeStore> ProfileScreen<S> {
    pub fn mount<A: AuthProvider>(session: &Session<S, A>) -> Result<Self, AppError> {
        let me = session.require_user()?;
        let mut scope = ScreenScope::new("profile");
        let profile = RemoteDocument::record(session.store(), &paths::user(&me));
        scope.track(profile.subscription());

        Ok(Self {
            scope,
            me,
            profile,
            snapshot: DocumentSnapshot::default(),
            mutator: session.mutator(),
        })
    }

    pub async fn refresh(&mut self) -> bool {
        match self.profile.next().await {
            Some(snapshot) => {
                self.snapshot = snapshot;
                true
            }
            None => false,
        }
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.snapshot.value.as_ref()
    }

    pub fn avatar(&self) -> Option<Image> {
        let payload = self.profile()?.profile_picture_base64.as_deref()?;
        agora_media::decode(payload).ok()
    }

    /// Save name and bio, plus a new avatar if one was picked. Without one,
    /// the current avatar stays.
    pub async fn save(&mut self, update: ProfileUpdate) -> Result<UserProfile, AppError> {
        if update.username.trim().is_empty() || update.bio.trim().is_empty() {
            return Err(AppError::Validation("username and bio are required".into()));
        }

        let previous = self.profile().cloned();
        let avatar = match update.avatar.as_deref() {
            Some(bytes) => Some(agora_media::encode(bytes).map_err(|e| AppError::Media(e.to_string()))?),
            None => previous.as_ref().and_then(|p| p.profile_picture_base64.clone()),
        };

        let profile = UserProfile {
            user_id: self.me.clone(),
            username: update.username,
            bio: update.bio,
            profile_picture_base64: avatar,
        };
        let mutation = self.mutator.save_profile(previous, profile)?;
        self.snapshot.value = Some(mutation.local().clone());

        match mutation.settle().await {
            Settled::Confirmed(saved) | Settled::Diverged { local: saved, .. } => {
                info!("Profile {} saved", saved.user_id);
                Ok(saved)
            }
            Settled::RolledBack { previous, error } => {
                self.snapshot.value = previous;
                Err(error.into())
            }
        }
    }

    pub fn close(mut self) {
        self.scope.close();
    }
}
