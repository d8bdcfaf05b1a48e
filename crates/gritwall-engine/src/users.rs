//! Profile reads and the onboarding profile update.

use gritwall_types::api::{PowerupInventory, UpdateProfileRequest, UserProfile};
use uuid::Uuid;

use crate::Engine;
use crate::error::{EngineError, EngineResult};

impl Engine {
    pub fn user_profile(&self, user_id: Uuid) -> EngineResult<UserProfile> {
        let u = self
            .db()
            .get_user_by_id(&user_id.to_string())?
            .ok_or(EngineError::NotFound("user not found"))?;
        Ok(UserProfile {
            user_id,
            email: u.email.clone(),
            username: u.username.clone(),
            name: u.name.clone(),
            avatar: u.avatar(),
            points: u.points,
            powerups: PowerupInventory {
                grief: u.powerup_grief_count,
                protec: u.powerup_protec_count,
            },
        })
    }

    /// Sets all profile fields at once. The client only ever sends the full
    /// profile, so partial updates are not supported.
    pub fn update_profile(&self, user_id: Uuid, req: UpdateProfileRequest) -> EngineResult<UserProfile> {
        let updated = self.db().update_profile(
            &user_id.to_string(),
            &req.username,
            &req.name,
            &req.avatar.animal,
            &req.avatar.background,
            &req.avatar.color,
        )?;
        if !updated {
            return Err(EngineError::NotFound("user not found"));
        }
        self.user_profile(user_id)
    }
}
