//! Actor profile administration (admin only).

use agricert_core::{ActorId, AgriError};
use agricert_state::{ActorPatch, ActorProfile, NewActor, Role};

use crate::auth::{require_role, CallerIdentity};
use crate::store::{StoreError, Write};

use super::Lifecycle;

impl Lifecycle {
    pub async fn register_actor(
        &self,
        caller: &CallerIdentity,
        input: NewActor,
    ) -> Result<ActorProfile, AgriError> {
        require_role(caller, &[Role::Admin])?;
        let profile = ActorProfile::create(self.ledger.next_actor_id(), input)?;

        let mut uow = self.ledger.begin();
        uow.stage(Write::InsertActor(profile.clone()));
        uow.commit().await?;

        tracing::info!(actor_id = %profile.id, role = %profile.role, "actor registered");
        Ok(profile)
    }

    pub async fn update_actor(
        &self,
        caller: &CallerIdentity,
        id: ActorId,
        patch: ActorPatch,
    ) -> Result<ActorProfile, AgriError> {
        require_role(caller, &[Role::Admin])?;
        let mut profile = self.load_actor(id, "Actor")?;
        profile.apply(patch)?;

        let mut uow = self.ledger.begin();
        uow.stage(Write::UpdateActor(profile.clone()));
        match uow.commit().await {
            Ok(()) => Ok(profile),
            Err(StoreError::GuardFailed(_)) => Err(AgriError::NotFound("Actor not found".into())),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_actors(
        &self,
        caller: &CallerIdentity,
        role: Option<Role>,
    ) -> Result<Vec<ActorProfile>, AgriError> {
        require_role(caller, &[Role::Admin])?;
        Ok(self
            .ledger
            .actors()
            .into_iter()
            .filter(|a| role.map_or(true, |r| a.role == r))
            .collect())
    }

    pub fn get_actor(&self, caller: &CallerIdentity, id: ActorId) -> Result<ActorProfile, AgriError> {
        require_role(caller, &[Role::Admin])?;
        self.load_actor(id, "Actor")
    }
}
