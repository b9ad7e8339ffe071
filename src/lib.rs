//! Team match challenges for amateur sports.
//!
//! A team sends a *challenge*, either directly to one opponent or open to any team. Direct
//! challenges are accepted or declined by the receiver; open challenges collect
//! *acceptance requests* and the sender approves exactly one of them. Every change goes through
//! [`Challenge::play`], which checks the actor's team membership and the current status and
//! leaves the challenge untouched when it refuses.
//!
//! The `server` feature adds the HTTP authority (axum + SQLite) and the `client` feature a
//! reqwest client. The client-side cache, command and permission types are always available.
//!
//! ## Example usage
//! ```
//! use matchday::{Actor, Challenge, ChallengeStatus, ChallengeTransition, NewChallenge, TransitionSuccess};
//! use uuid::Uuid;
//!
//! let (hawks, eagles, falcons) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
//! let alice = Actor::new(Uuid::new_v4(), vec![hawks]);
//! let bob = Actor::new(Uuid::new_v4(), vec![eagles]);
//! let carol = Actor::new(Uuid::new_v4(), vec![falcons]);
//!
//! let draft = NewChallenge {
//!     sender_team_id: hawks,
//!     receiver_team_id: None,
//!     sport: "football".to_string(),
//!     message: Some("Sunday, 10am".to_string()),
//!     scheduled_at: 10_000,
//!     expires_at: Some(5_000),
//! };
//! let mut challenge = Challenge::create(&alice, draft, 0).unwrap();
//! assert_eq!(challenge.get_status(), ChallengeStatus::Open);
//!
//! let first = match challenge.play(&bob, ChallengeTransition::RequestAcceptance { team_id: eagles }, 10) {
//!     Ok(TransitionSuccess::RequestCreated { request_id }) => request_id,
//!     other => panic!("unexpected {:?}", other),
//! };
//! challenge.play(&carol, ChallengeTransition::RequestAcceptance { team_id: falcons }, 20).unwrap();
//!
//! challenge.play(&alice, ChallengeTransition::ApproveRequest { request_id: first }, 30).unwrap();
//! assert_eq!(challenge.get_status(), ChallengeStatus::Accepted);
//! assert_eq!(challenge.get_first_acceptor_team_id(), Some(eagles));
//! assert_eq!(challenge.pending_request_count(), 0);
//! ```

pub mod acceptance;
pub mod cache;
pub mod challenge;
pub mod command;
pub mod listing;
pub mod matches;
pub mod permissions;
pub mod session;
pub mod teams;
mod result;

#[cfg(feature = "server")]
pub mod api;
#[cfg(feature = "server")]
pub mod challenge_manager;
#[cfg(feature = "server")]
pub mod config;
#[cfg(feature = "server")]
pub mod sqlite_store;
#[cfg(feature = "server")]
pub mod validation;

#[cfg(feature = "client")]
pub mod client;

#[cfg(test)]
mod tests;

pub use result::*;
pub use acceptance::{AcceptanceRequest, AcceptanceStatus};
pub use challenge::{Challenge, ChallengeStatus, ChallengeTransition, ChallengeView, Countdown, NewChallenge};
pub use permissions::{derive_permissions, PermissionSet};
pub use teams::{Actor, Team, User};
