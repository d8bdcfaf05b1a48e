//! The friends graph: requests, the mutual friends list, and the leaderboard
//! narrowed to people you actually know.
//!
//! A friendship is a pair of directed edges. Sending a request writes one
//! pending edge; accepting stamps it and mirrors it, so "friends of" is a
//! plain scan of the accepted edges leaving a user.

use chrono::Utc;
use gritwall_db::ts;
use gritwall_types::api::{LeaderboardEntry, UserMiniBase};
use tracing::info;
use uuid::Uuid;

use crate::Engine;
use crate::error::{EngineError, EngineResult};
use crate::format;
use crate::store;

impl Engine {
    /// Sends a friend request. Re-sending towards the same user is a
    /// conflict, whether the first request is still pending or long accepted.
    pub fn send_friend_request(&self, user_id: Uuid, target_id: Uuid) -> EngineResult<()> {
        if user_id == target_id {
            return Err(EngineError::InvalidState("cannot befriend yourself"));
        }
        self.db()
            .get_user_by_id(&target_id.to_string())?
            .ok_or(EngineError::NotFound("user not found"))?;

        let created = self
            .db()
            .insert_contact(&user_id.to_string(), &target_id.to_string())?;
        if !created {
            return Err(EngineError::Conflict("friend request already exists"));
        }
        info!("User {} sent a friend request to {}", user_id, target_id);
        Ok(())
    }

    /// Requests waiting on this user's answer, ordered by sender username.
    pub fn pending_friend_requests(&self, user_id: Uuid) -> EngineResult<Vec<UserMiniBase>> {
        let rows = self.db().pending_request_users(&user_id.to_string())?;
        Ok(rows.iter().filter_map(format::user_mini_base).collect())
    }

    /// Accepts a pending request from `requester_id`. Accepting twice is a
    /// no-op; accepting a request that was never sent is an error.
    pub fn accept_friend_request(&self, user_id: Uuid, requester_id: Uuid) -> EngineResult<()> {
        if user_id == requester_id {
            return Err(EngineError::InvalidState("cannot befriend yourself"));
        }

        let req = self
            .db()
            .get_contact(&requester_id.to_string(), &user_id.to_string())?
            .ok_or(EngineError::NotFound("friend request not found"))?;
        if req.is_accepted() {
            return Ok(());
        }

        let now = ts::to_store(Utc::now());
        // A lost race here means another accept got in first; same outcome.
        self.db()
            .accept_contact(&requester_id.to_string(), &user_id.to_string(), &now)?;
        info!("User {} accepted a friend request from {}", user_id, requester_id);
        Ok(())
    }

    /// Severs whatever exists between the two users: a pending request in
    /// either direction or a full friendship. Removing nothing is fine.
    pub fn remove_contact(&self, user_id: Uuid, other_id: Uuid) -> EngineResult<()> {
        let removed = self
            .db()
            .delete_contact_pair(&user_id.to_string(), &other_id.to_string())?;
        if removed > 0 {
            info!("User {} removed contact {}", user_id, other_id);
        }
        Ok(())
    }

    pub fn friends_list(&self, user_id: Uuid) -> EngineResult<Vec<UserMiniBase>> {
        let rows = self.db().friends_of(&user_id.to_string())?;
        Ok(rows.iter().filter_map(format::user_mini_base).collect())
    }

    /// The failure leaderboard scoped to the user's contacts.
    pub fn friend_leaderboard(&self, user_id: Uuid) -> EngineResult<Vec<LeaderboardEntry>> {
        let now = ts::to_store(Utc::now());
        let rows = self.db().friend_leaderboard(
            &user_id.to_string(),
            &now,
            self.config().leaderboard_cap,
        )?;
        rows.iter().map(store::leaderboard_entry).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use uuid::Uuid;

    use crate::error::EngineError;
    use crate::testutil::{challenge, engine, user};

    #[test]
    fn request_then_accept_makes_the_friendship_mutual() {
        let e = engine();
        let a = user(&e, "alice");
        let b = user(&e, "bob");

        e.send_friend_request(a, b).unwrap();
        let pending: Vec<Uuid> = e
            .pending_friend_requests(b)
            .unwrap()
            .iter()
            .map(|u| u.user_id)
            .collect();
        assert_eq!(pending, vec![a]);
        assert!(e.friends_list(a).unwrap().is_empty());

        e.accept_friend_request(b, a).unwrap();
        assert!(e.pending_friend_requests(b).unwrap().is_empty());
        assert_eq!(e.friends_list(a).unwrap()[0].user_id, b);
        assert_eq!(e.friends_list(b).unwrap()[0].user_id, a);

        // A second accept changes nothing.
        e.accept_friend_request(b, a).unwrap();
        assert_eq!(e.friends_list(b).unwrap().len(), 1);
    }

    #[test]
    fn requests_are_validated() {
        let e = engine();
        let a = user(&e, "alice");
        let b = user(&e, "bob");

        assert!(matches!(
            e.send_friend_request(a, a),
            Err(EngineError::InvalidState(_))
        ));
        assert!(matches!(
            e.send_friend_request(a, Uuid::new_v4()),
            Err(EngineError::NotFound(_))
        ));

        e.send_friend_request(a, b).unwrap();
        assert!(matches!(
            e.send_friend_request(a, b),
            Err(EngineError::Conflict(_))
        ));

        // Accepting a request nobody sent.
        assert!(matches!(
            e.accept_friend_request(a, b),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn removal_severs_both_directions() {
        let e = engine();
        let a = user(&e, "alice");
        let b = user(&e, "bob");
        let c = user(&e, "carol");

        e.send_friend_request(a, b).unwrap();
        e.accept_friend_request(b, a).unwrap();
        e.remove_contact(a, b).unwrap();
        assert!(e.friends_list(a).unwrap().is_empty());
        assert!(e.friends_list(b).unwrap().is_empty());

        // Rejecting a pending request uses the same removal.
        e.send_friend_request(c, a).unwrap();
        e.remove_contact(a, c).unwrap();
        assert!(e.pending_friend_requests(a).unwrap().is_empty());

        // Removing an absent contact is a no-op.
        e.remove_contact(a, c).unwrap();
    }

    #[test]
    fn friend_leaderboard_only_ranks_contacts() {
        let e = engine();
        let me = user(&e, "me");
        let buddy = user(&e, "buddy");
        let stranger = user(&e, "stranger");

        e.send_friend_request(me, buddy).unwrap();
        e.accept_friend_request(buddy, me).unwrap();

        // Both fail a released challenge; only the buddy is in my scope.
        release(&e, &[buddy, stranger]);

        let mine: Vec<Uuid> = e
            .friend_leaderboard(me)
            .unwrap()
            .iter()
            .map(|r| r.user_id)
            .collect();
        assert_eq!(mine, vec![buddy]);

        let global = e.global_leaderboard().unwrap();
        assert_eq!(global.len(), 2);
    }

    fn release(e: &crate::Engine, members: &[Uuid]) {
        let cid = challenge(
            e,
            members[0],
            members,
            Duration::hours(-4),
            Duration::hours(-2),
        );
        let end = e
            .db()
            .get_challenge(&cid.to_string())
            .unwrap()
            .unwrap()
            .end_at;
        assert!(e.db().release_results(&cid.to_string(), &end).unwrap());
    }
}
