use ntest::test_case;
use uuid::Uuid;
use crate::acceptance::AcceptanceStatus;
use crate::challenge::{Challenge, ChallengeStatus, ChallengeTransition, NewChallenge};
use crate::result::{ErrorKind, TransitionError, TransitionSuccess};
use crate::teams::Actor;

const DAY: u64 = 86_400;
const NOW: u64 = 1_000_000;

struct Teams {
    sender: Uuid,
    receiver: Uuid,
    other: Uuid,
    alice: Actor,
    bob: Actor,
    carol: Actor,
    outsider: Actor,
}

fn teams() -> Teams {
    let (sender, receiver, other) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    Teams {
        sender,
        receiver,
        other,
        alice: Actor::new(Uuid::new_v4(), vec![sender]),
        bob: Actor::new(Uuid::new_v4(), vec![receiver]),
        carol: Actor::new(Uuid::new_v4(), vec![other]),
        outsider: Actor::new(Uuid::new_v4(), vec![]),
    }
}

fn draft(t: &Teams, receiver: Option<Uuid>, expires_at: Option<u64>) -> NewChallenge {
    NewChallenge {
        sender_team_id: t.sender,
        receiver_team_id: receiver,
        sport: "football".to_string(),
        message: None,
        scheduled_at: NOW + 2 * DAY,
        expires_at,
    }
}

fn direct(t: &Teams) -> Challenge {
    Challenge::create(&t.alice, draft(t, Some(t.receiver), None), NOW).unwrap()
}

fn open(t: &Teams) -> Challenge {
    Challenge::create(&t.alice, draft(t, None, None), NOW).unwrap()
}

fn request(challenge: &mut Challenge, actor: &Actor, team_id: Uuid) -> Uuid {
    match challenge.play(actor, ChallengeTransition::RequestAcceptance { team_id }, NOW + 1) {
        Ok(TransitionSuccess::RequestCreated { request_id }) => request_id,
        other => panic!("expected request to be created, got {:?}", other),
    }
}

/// Drive a fresh challenge into the named terminal status.
fn terminal(t: &Teams, status: &str) -> Challenge {
    let mut c = direct(t);
    match status {
        "DECLINED" => {
            c.play(&t.bob, ChallengeTransition::Decline, NOW + 1).unwrap();
        }
        "EXPIRED" => {
            c.play(&t.bob, ChallengeTransition::Accept { team_id: t.receiver }, NOW + 1).unwrap();
            c.play(&t.alice, ChallengeTransition::Expire, NOW + 2).unwrap();
        }
        "COMPLETED" => {
            c.play(&t.bob, ChallengeTransition::Accept { team_id: t.receiver }, NOW + 1).unwrap();
            c.play(&t.bob, ChallengeTransition::Complete, NOW + 2).unwrap();
        }
        _ => unreachable!(),
    }
    assert_eq!(c.get_status().to_string(), status);
    c
}

#[test]
fn test_create_direct_is_pending_and_open_is_open() {
    let t = teams();
    assert_eq!(direct(&t).get_status(), ChallengeStatus::Pending);
    assert_eq!(open(&t).get_status(), ChallengeStatus::Open);
}

#[test]
fn test_create_requires_sender_membership() {
    let t = teams();
    let result = Challenge::create(&t.bob, draft(&t, None, None), NOW);
    assert_eq!(result, Err(TransitionError::NotSenderMember));
}

#[test]
fn test_create_rejects_same_team() {
    let t = teams();
    let result = Challenge::create(&t.alice, draft(&t, Some(t.sender), None), NOW);
    assert_eq!(result, Err(TransitionError::SameTeam));
}

#[test_case(0)]
#[test_case(1)]
fn test_expiry_must_be_strictly_before_schedule(offset_after: u64) {
    let t = teams();
    let scheduled_at = NOW + 2 * DAY;
    let result = Challenge::create(&t.alice, draft(&t, None, Some(scheduled_at + offset_after)), NOW);
    assert_eq!(result, Err(TransitionError::ExpiryNotBeforeSchedule));

    let ok = Challenge::create(&t.alice, draft(&t, None, Some(scheduled_at - 1)), NOW).unwrap();
    assert!(ok.get_expires_at().unwrap() < ok.get_scheduled_at());
}

#[test_case("DECLINED")]
#[test_case("EXPIRED")]
#[test_case("COMPLETED")]
fn test_terminal_states_refuse_every_transition(status: &str) {
    let t = teams();
    let c = terminal(&t, status);
    let transitions = vec![
        ChallengeTransition::Accept { team_id: t.receiver },
        ChallengeTransition::Decline,
        ChallengeTransition::Withdraw,
        ChallengeTransition::Expire,
        ChallengeTransition::RequestAcceptance { team_id: t.other },
        ChallengeTransition::ApproveRequest { request_id: Uuid::new_v4() },
        ChallengeTransition::WithdrawRequest { request_id: Uuid::new_v4() },
        ChallengeTransition::Complete,
    ];
    for transition in transitions {
        for actor in [&t.alice, &t.bob, &t.carol] {
            let mut attempt = c.clone();
            let err = attempt.play(actor, transition.clone(), NOW + 10).unwrap_err();
            assert_eq!(err, TransitionError::Terminal(c.get_status()));
            assert_eq!(err.kind(), ErrorKind::Conflict);
            assert_eq!(attempt, c, "{:?} mutated a terminal challenge", transition);
        }
    }
}

#[test]
fn test_direct_challenge_never_enters_request_workflow() {
    let t = teams();
    let mut c = direct(&t);
    let before = c.clone();

    let err = c.play(&t.carol, ChallengeTransition::RequestAcceptance { team_id: t.other }, NOW + 1).unwrap_err();
    assert!(matches!(err, TransitionError::InvalidState { status: ChallengeStatus::Pending, .. }));
    let err = c.play(&t.alice, ChallengeTransition::ApproveRequest { request_id: Uuid::new_v4() }, NOW + 1).unwrap_err();
    assert!(matches!(err, TransitionError::InvalidState { .. }));
    assert_eq!(c, before);
    assert!(c.get_acceptance_requests().is_empty());
}

#[test]
fn test_accept_direct_by_receiver() {
    let t = teams();
    let mut c = direct(&t);
    let result = c.play(&t.bob, ChallengeTransition::Accept { team_id: t.receiver }, NOW + 5).unwrap();
    let TransitionSuccess::Accepted { match_id } = result else { panic!("expected Accepted") };
    assert_eq!(c.get_status(), ChallengeStatus::Accepted);
    assert_eq!(c.get_match_id(), Some(match_id));
    assert_eq!(c.view().updated_at, NOW + 5);
}

#[test]
fn test_accept_guards() {
    let t = teams();
    let mut c = direct(&t);
    let before = c.clone();

    assert_eq!(
        c.play(&t.carol, ChallengeTransition::Accept { team_id: t.receiver }, NOW + 1),
        Err(TransitionError::NotReceiverMember)
    );
    assert_eq!(
        c.play(&t.carol, ChallengeTransition::Accept { team_id: t.other }, NOW + 1),
        Err(TransitionError::WrongReceiver(t.other))
    );
    assert_eq!(
        c.play(&t.alice, ChallengeTransition::Decline, NOW + 1),
        Err(TransitionError::NotReceiverMember)
    );
    assert_eq!(c, before);
}

#[test]
fn test_direct_accept_on_open_challenge_is_invalid_state() {
    let t = teams();
    let mut c = open(&t);
    let err = c.play(&t.bob, ChallengeTransition::Accept { team_id: t.receiver }, NOW + 1).unwrap_err();
    assert_eq!(err, TransitionError::invalid_state("accept", ChallengeStatus::Open));
}

#[test]
fn test_decline_by_receiver() {
    let t = teams();
    let mut c = direct(&t);
    assert_eq!(c.play(&t.bob, ChallengeTransition::Decline, NOW + 1), Ok(TransitionSuccess::Declined));
    assert_eq!(c.get_status(), ChallengeStatus::Declined);
}

#[test]
fn test_single_approval_rejects_all_siblings() {
    let t = teams();
    let mut c = open(&t);
    let mut requesters = Vec::new();
    for _ in 0..4 {
        let team = Uuid::new_v4();
        requesters.push((Actor::new(Uuid::new_v4(), vec![team]), team));
    }
    let ids: Vec<Uuid> = requesters.iter().map(|(actor, team)| request(&mut c, actor, *team)).collect();
    assert_eq!(c.pending_request_count(), 4);

    let winner = ids[2];
    let result = c.play(&t.alice, ChallengeTransition::ApproveRequest { request_id: winner }, NOW + 10).unwrap();
    let TransitionSuccess::RequestApproved { rejected_requests, .. } = result else { panic!("expected approval") };
    assert_eq!(rejected_requests.len(), 3);
    assert!(!rejected_requests.contains(&winner));

    let approved: Vec<_> = c.get_acceptance_requests().iter().filter(|r| r.status == AcceptanceStatus::Approved).collect();
    let rejected = c.get_acceptance_requests().iter().filter(|r| r.status == AcceptanceStatus::Rejected).count();
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0].id, winner);
    assert_eq!(rejected, 3);
    assert_eq!(c.get_status(), ChallengeStatus::Accepted);
    assert_eq!(c.get_first_acceptor_team_id(), Some(requesters[2].1));
    assert!(c.get_acceptance_requests().iter().all(|r| r.resolved_at == Some(NOW + 10)));
}

#[test]
fn test_second_approval_is_conflict() {
    let t = teams();
    let mut c = open(&t);
    let first = request(&mut c, &t.bob, t.receiver);
    let second = request(&mut c, &t.carol, t.other);

    c.play(&t.alice, ChallengeTransition::ApproveRequest { request_id: first }, NOW + 2).unwrap();
    let before = c.clone();
    let err = c.play(&t.alice, ChallengeTransition::ApproveRequest { request_id: second }, NOW + 3).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(c, before);
}

#[test]
fn test_duplicate_request_rejected_first_unaffected() {
    let t = teams();
    let mut c = open(&t);
    let first = request(&mut c, &t.bob, t.receiver);
    let snapshot = c.get_acceptance_request(first).cloned();

    let err = c.play(&t.bob, ChallengeTransition::RequestAcceptance { team_id: t.receiver }, NOW + 2).unwrap_err();
    assert_eq!(err, TransitionError::DuplicateRequest(t.receiver));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(c.get_acceptance_request(first).cloned(), snapshot);
    assert_eq!(c.get_acceptance_requests().len(), 1);
}

#[test]
fn test_request_again_after_withdrawing() {
    let t = teams();
    let mut c = open(&t);
    let first = request(&mut c, &t.bob, t.receiver);
    c.play(&t.bob, ChallengeTransition::WithdrawRequest { request_id: first }, NOW + 2).unwrap();
    let second = request(&mut c, &t.bob, t.receiver);
    assert_ne!(first, second);
    assert_eq!(c.pending_request_count(), 1);
}

#[test]
fn test_request_guards() {
    let t = teams();
    let mut c = open(&t);
    assert_eq!(
        c.play(&t.alice, ChallengeTransition::RequestAcceptance { team_id: t.sender }, NOW + 1),
        Err(TransitionError::SenderCannotRequest)
    );
    assert_eq!(
        c.play(&t.outsider, ChallengeTransition::RequestAcceptance { team_id: t.receiver }, NOW + 1),
        Err(TransitionError::NotTeamMember(t.receiver))
    );
}

#[test]
fn test_only_sender_approves() {
    let t = teams();
    let mut c = open(&t);
    let id = request(&mut c, &t.bob, t.receiver);
    assert_eq!(
        c.play(&t.bob, ChallengeTransition::ApproveRequest { request_id: id }, NOW + 2),
        Err(TransitionError::NotSenderMember)
    );
    assert_eq!(
        c.play(&t.alice, ChallengeTransition::ApproveRequest { request_id: Uuid::new_v4() }, NOW + 2).unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn test_withdraw_request_only_by_requesting_team() {
    let t = teams();
    let mut c = open(&t);
    let id = request(&mut c, &t.bob, t.receiver);
    assert_eq!(
        c.play(&t.carol, ChallengeTransition::WithdrawRequest { request_id: id }, NOW + 2),
        Err(TransitionError::NotTeamMember(t.receiver))
    );
    assert_eq!(
        c.play(&t.bob, ChallengeTransition::WithdrawRequest { request_id: id }, NOW + 2),
        Ok(TransitionSuccess::RequestWithdrawn { request_id: id })
    );
    assert_eq!(c.get_acceptance_request(id).unwrap().status, AcceptanceStatus::Withdrawn);
    assert_eq!(
        c.play(&t.bob, ChallengeTransition::WithdrawRequest { request_id: id }, NOW + 3),
        Err(TransitionError::RequestNotPending(id))
    );
}

#[test]
fn test_scenario_open_challenge_approved() {
    let t = teams();
    let mut c = open(&t);
    assert!(c.get_expires_at().is_none());

    let b_request = request(&mut c, &t.bob, t.receiver);
    let other_request = request(&mut c, &t.carol, t.other);
    c.play(&t.alice, ChallengeTransition::ApproveRequest { request_id: b_request }, NOW + 5).unwrap();

    assert_eq!(c.get_status(), ChallengeStatus::Accepted);
    assert_eq!(c.get_first_acceptor_team_id(), Some(t.receiver));
    assert_eq!(c.get_acceptance_request(other_request).unwrap().status, AcceptanceStatus::Rejected);
    assert_eq!(c.view().opponent_team_id(), Some(t.receiver));
}

#[test]
fn test_scenario_elapsed_direct_challenge_expires() {
    let t = teams();
    let mut c = Challenge::create(&t.alice, draft(&t, Some(t.receiver), Some(NOW - 1)), NOW).unwrap();
    assert_eq!(c.get_status(), ChallengeStatus::Pending);

    let result = c.play(&t.outsider, ChallengeTransition::Expire, NOW).unwrap();
    assert_eq!(result, TransitionSuccess::Expired { rejected_requests: vec![] });
    assert_eq!(c.get_status(), ChallengeStatus::Expired);

    let err = c.play(&t.bob, ChallengeTransition::Accept { team_id: t.receiver }, NOW + 1).unwrap_err();
    assert_eq!(err, TransitionError::Terminal(ChallengeStatus::Expired));
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[test]
fn test_expire_before_deadline_refused() {
    let t = teams();
    let mut c = Challenge::create(&t.alice, draft(&t, None, Some(NOW + DAY)), NOW).unwrap();
    assert_eq!(c.play(&t.alice, ChallengeTransition::Expire, NOW + 10), Err(TransitionError::NotYetExpired));
    assert_eq!(c.get_status(), ChallengeStatus::Open);
    assert!(c.expire_if_due(NOW + 10).is_none());
    assert_eq!(c.expire_if_due(NOW + DAY), Some(vec![]));
}

#[test]
fn test_forfeit_accepted_challenge_by_sender_only() {
    let t = teams();
    let mut c = direct(&t);
    c.play(&t.bob, ChallengeTransition::Accept { team_id: t.receiver }, NOW + 1).unwrap();
    assert_eq!(c.play(&t.bob, ChallengeTransition::Expire, NOW + 2), Err(TransitionError::NotSenderMember));
    c.play(&t.alice, ChallengeTransition::Expire, NOW + 2).unwrap();
    assert_eq!(c.get_status(), ChallengeStatus::Expired);
}

#[test]
fn test_scenario_withdraw_open_challenge_with_pending_requests() {
    let t = teams();
    let mut c = open(&t);
    let first = request(&mut c, &t.bob, t.receiver);
    let second = request(&mut c, &t.carol, t.other);

    let result = c.play(&t.alice, ChallengeTransition::Withdraw, NOW + 5).unwrap();
    let TransitionSuccess::Withdrawn { mut rejected_requests } = result else { panic!("expected Withdrawn") };
    rejected_requests.sort();
    let mut expected = vec![first, second];
    expected.sort();
    assert_eq!(rejected_requests, expected);

    assert_eq!(c.get_status(), ChallengeStatus::Declined);
    assert_eq!(c.pending_request_count(), 0);
    assert!(c.get_acceptance_requests().iter().all(|r| r.status == AcceptanceStatus::Rejected));
}

#[test]
fn test_expiry_rejects_pending_requests() {
    let t = teams();
    let mut c = Challenge::create(&t.alice, draft(&t, None, Some(NOW + 100)), NOW).unwrap();
    let id = request(&mut c, &t.bob, t.receiver);
    assert_eq!(c.expire_if_due(NOW + 100), Some(vec![id]));
    assert_eq!(c.get_acceptance_request(id).unwrap().status, AcceptanceStatus::Rejected);
}

#[test]
fn test_complete_requires_participant() {
    let t = teams();
    let mut c = open(&t);
    let id = request(&mut c, &t.bob, t.receiver);
    c.play(&t.alice, ChallengeTransition::ApproveRequest { request_id: id }, NOW + 2).unwrap();

    assert_eq!(c.play(&t.carol, ChallengeTransition::Complete, NOW + 3), Err(TransitionError::NotParticipant));
    assert_eq!(c.play(&t.bob, ChallengeTransition::Complete, NOW + 3), Ok(TransitionSuccess::Completed));
}

#[test]
fn test_withdraw_only_before_acceptance() {
    let t = teams();
    let mut c = direct(&t);
    assert_eq!(c.play(&t.bob, ChallengeTransition::Withdraw, NOW + 1), Err(TransitionError::NotSenderMember));
    c.play(&t.bob, ChallengeTransition::Accept { team_id: t.receiver }, NOW + 1).unwrap();
    let err = c.play(&t.alice, ChallengeTransition::Withdraw, NOW + 2).unwrap_err();
    assert_eq!(err, TransitionError::invalid_state("withdraw", ChallengeStatus::Accepted));
}

#[test]
fn test_challenge_serde_roundtrip_keeps_requests() {
    let t = teams();
    let mut c = open(&t);
    request(&mut c, &t.bob, t.receiver);
    let json = serde_json::to_string(&c).unwrap();
    let restored: Challenge = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, c);
    assert!(json.contains("\"PENDING_APPROVAL\""));
}
