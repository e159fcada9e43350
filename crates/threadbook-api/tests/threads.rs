mod common;

use common::Harness;
use threadbook_api::CoreError;
use threadbook_gateway::channels;
use threadbook_types::models::ThreadType;

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn public_thread_enrolls_every_spool_member() {
    let h = Harness::new();
    let thread = h
        .state
        .threads
        .create_thread(h.alice, h.team, "standup", "public")
        .await
        .unwrap();

    assert_eq!(thread.thread_type, ThreadType::Public);
    assert!(!thread.is_closed);
    assert_eq!(
        h.state.oracle.thread_members(thread.id).await.unwrap(),
        vec![h.alice, h.bob, h.carol]
    );
    assert!(!h.state.oracle.is_member(h.dave, thread.id).await.unwrap());

    // One thread.created per member, on their own channel, with a usable token.
    let created = h.publisher.of_type("thread.created");
    assert_eq!(created.len(), 3);
    let channel = channels::thread_channel(thread.id);
    for user in [h.alice, h.bob, h.carol] {
        let events = h.publisher.sent_to(&channels::user_channel(user));
        assert_eq!(events.len(), 1);
        let payload = &events[0]["payload"];
        assert_eq!(payload["channel"], channel.as_str());
        let claims = h
            .verifier
            .verify_subscribe(payload["token"].as_str().unwrap(), &channel)
            .unwrap();
        assert_eq!(claims.sub, user.to_string());
    }
}

#[tokio::test]
async fn private_thread_starts_with_creator_only() {
    let h = Harness::new();
    let thread = h
        .state
        .threads
        .create_thread(h.alice, h.team, "secret plans", "private")
        .await
        .unwrap();

    assert_eq!(h.state.oracle.thread_members(thread.id).await.unwrap(), vec![h.alice]);
    assert_eq!(h.publisher.of_type("thread.created").len(), 1);
    assert!(h.publisher.sent_to(&channels::user_channel(h.bob)).is_empty());
}

#[tokio::test]
async fn create_rejects_bad_input_before_writing() {
    let h = Harness::new();
    let threads = &h.state.threads;

    assert!(matches!(
        threads.create_thread(h.alice, h.team, "t", "secret").await,
        Err(CoreError::InvalidType(_))
    ));
    assert!(matches!(
        threads.create_thread(h.alice, h.team, "   ", "public").await,
        Err(CoreError::InvalidInput(_))
    ));
    assert!(matches!(
        threads.create_thread(h.dave, h.team, "intruder", "public").await,
        Err(CoreError::Forbidden)
    ));

    assert!(threads.get_by_spool_id(h.alice, h.team).await.unwrap().is_empty());
    assert!(h.publisher.sent().is_empty());
}

#[tokio::test]
async fn listing_hides_private_threads_from_non_members() {
    let h = Harness::new();
    let threads = &h.state.threads;
    let public = threads.create_thread(h.alice, h.team, "lobby", "public").await.unwrap();
    let private = threads.create_thread(h.alice, h.team, "dm", "private").await.unwrap();

    let for_bob: Vec<_> = threads
        .get_by_spool_id(h.bob, h.team)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(for_bob, vec![public.id]);

    let for_alice = threads.get_by_spool_id(h.alice, h.team).await.unwrap();
    assert_eq!(for_alice.len(), 2);
    assert!(for_alice.iter().any(|t| t.id == private.id));

    assert!(threads.get_by_spool_id(h.dave, h.team).await.unwrap().is_empty());
}

#[tokio::test]
async fn only_creator_updates_and_members_hear_about_it() {
    let h = Harness::new();
    let threads = &h.state.threads;
    let thread = threads.create_thread(h.alice, h.team, "lobby", "public").await.unwrap();
    h.publisher.clear();

    assert!(matches!(
        threads.update_thread(thread.id, h.bob, Some("hijacked"), None).await,
        Err(CoreError::Forbidden)
    ));
    assert!(matches!(
        threads.update_thread(thread.id, h.alice, None, Some("hidden")).await,
        Err(CoreError::InvalidType(_))
    ));
    assert!(matches!(
        threads.update_thread(9999, h.alice, Some("x"), None).await,
        Err(CoreError::ThreadNotFound)
    ));
    assert!(h.publisher.sent().is_empty());

    let updated = threads
        .update_thread(thread.id, h.alice, Some("town hall"), None)
        .await
        .unwrap();
    assert_eq!(updated.title, "town hall");
    assert_eq!(updated.thread_type, ThreadType::Public);
    assert!(updated.updated_at >= thread.updated_at);

    let events = h.publisher.of_type("thread.updated");
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|(_, e)| e["payload"]["title"] == "town hall"));
}

#[tokio::test]
async fn type_change_keeps_membership() {
    let h = Harness::new();
    let threads = &h.state.threads;
    let thread = threads.create_thread(h.alice, h.team, "lobby", "public").await.unwrap();

    let updated = threads
        .update_thread(thread.id, h.alice, None, Some("private"))
        .await
        .unwrap();
    assert_eq!(updated.thread_type, ThreadType::Private);
    assert_eq!(updated.title, "lobby");
    assert_eq!(
        h.state.oracle.thread_members(thread.id).await.unwrap(),
        vec![h.alice, h.bob, h.carol]
    );
}

#[tokio::test]
async fn closing_is_creator_only_and_repeatable() {
    let h = Harness::new();
    let threads = &h.state.threads;
    let thread = threads.create_thread(h.alice, h.team, "lobby", "public").await.unwrap();

    assert!(matches!(threads.close_thread(thread.id, h.bob).await, Err(CoreError::Forbidden)));
    assert!(matches!(threads.close_thread(4242, h.alice).await, Err(CoreError::ThreadNotFound)));

    let closed = threads.close_thread(thread.id, h.alice).await.unwrap();
    assert!(closed.is_closed);
    let again = threads.close_thread(thread.id, h.alice).await.unwrap();
    assert!(again.is_closed);

    // Closed stays closed through later edits.
    let renamed = threads.update_thread(thread.id, h.alice, Some("archive"), None).await.unwrap();
    assert!(renamed.is_closed);

    assert_eq!(h.publisher.of_type("thread.closed").len(), 6);
}

#[tokio::test]
async fn invite_adds_member_with_token_and_is_idempotent() {
    let h = Harness::new();
    let threads = &h.state.threads;
    let thread = threads.create_thread(h.alice, h.team, "dm", "private").await.unwrap();
    h.publisher.clear();

    threads.invite_to_thread(h.alice, &names(&["bob"]), thread.id).await.unwrap();
    assert!(h.state.oracle.is_member(h.bob, thread.id).await.unwrap());

    let invited = h.publisher.sent_to(&channels::user_channel(h.bob));
    assert_eq!(invited.len(), 1);
    assert_eq!(invited[0]["type"], "thread.invited");
    let channel = channels::thread_channel(thread.id);
    h.verifier
        .verify_subscribe(invited[0]["payload"]["token"].as_str().unwrap(), &channel)
        .unwrap();

    // Second invite: same membership, no second event.
    threads.invite_to_thread(h.alice, &names(&["bob"]), thread.id).await.unwrap();
    assert_eq!(h.state.oracle.thread_members(thread.id).await.unwrap(), vec![h.alice, h.bob]);
    assert_eq!(h.publisher.sent_to(&channels::user_channel(h.bob)).len(), 1);
}

#[tokio::test]
async fn invite_batch_skips_unknown_and_outside_users() {
    let h = Harness::new();
    let threads = &h.state.threads;
    let thread = threads.create_thread(h.alice, h.team, "dm", "private").await.unwrap();
    h.publisher.clear();

    threads
        .invite_to_thread(h.alice, &names(&["ghost", "dave", " carol "]), thread.id)
        .await
        .unwrap();

    assert_eq!(h.state.oracle.thread_members(thread.id).await.unwrap(), vec![h.alice, h.carol]);
    assert!(h.publisher.sent_to(&channels::user_channel(h.dave)).is_empty());
    assert_eq!(h.publisher.of_type("thread.invited").len(), 1);
}

#[tokio::test]
async fn invite_authorization_applies_to_whole_batch() {
    let h = Harness::new();
    let threads = &h.state.threads;
    let public = threads.create_thread(h.alice, h.team, "lobby", "public").await.unwrap();
    let private = threads.create_thread(h.alice, h.team, "dm", "private").await.unwrap();
    threads.invite_to_thread(h.alice, &names(&["bob"]), private.id).await.unwrap();

    assert!(matches!(
        threads.invite_to_thread(h.alice, &names(&["carol"]), public.id).await,
        Err(CoreError::Forbidden)
    ));
    // Members other than the creator cannot invite.
    assert!(matches!(
        threads.invite_to_thread(h.bob, &names(&["carol"]), private.id).await,
        Err(CoreError::Forbidden)
    ));
    assert!(matches!(
        threads.invite_to_thread(h.alice, &names(&["carol"]), 777).await,
        Err(CoreError::ThreadNotFound)
    ));
    assert!(matches!(
        threads.invite_to_thread(h.alice, &names(&["  "]), private.id).await,
        Err(CoreError::InvalidInput(_))
    ));
    assert!(!h.state.oracle.is_member(h.carol, private.id).await.unwrap());
}

#[tokio::test]
async fn broker_outage_does_not_fail_mutations() {
    let h = Harness::new();
    h.publisher.go_down();
    let threads = &h.state.threads;

    let thread = threads.create_thread(h.alice, h.team, "dm", "private").await.unwrap();
    threads.invite_to_thread(h.alice, &names(&["bob"]), thread.id).await.unwrap();
    threads.update_thread(thread.id, h.alice, Some("renamed"), None).await.unwrap();
    threads.close_thread(thread.id, h.alice).await.unwrap();

    assert!(h.state.oracle.is_member(h.bob, thread.id).await.unwrap());
    let stored = h.db.get_thread(thread.id).unwrap().unwrap();
    assert_eq!(stored.title, "renamed");
    assert!(stored.is_closed);
    assert!(h.publisher.sent().is_empty());
}

#[tokio::test]
async fn leaving_spool_drops_thread_memberships() {
    let h = Harness::new();
    let thread = h
        .state
        .threads
        .create_thread(h.alice, h.team, "lobby", "public")
        .await
        .unwrap();

    h.db.leave_spool(h.team, h.bob).unwrap();
    assert!(!h.state.oracle.is_member(h.bob, thread.id).await.unwrap());
    assert!(h.state.threads.get_by_spool_id(h.bob, h.team).await.unwrap().is_empty());
}
