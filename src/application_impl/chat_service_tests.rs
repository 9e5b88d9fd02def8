use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const ALICE: MemberId = MemberId(1);
const BOB: MemberId = MemberId(2);
const CAROL: MemberId = MemberId(3);
const DAVE: MemberId = MemberId(4);

const BIKE: ListingId = ListingId(42);

struct Harness {
    store: Arc<MemoryStore>,
    tx_manager: Arc<dyn TxManager>,
    outbox: Arc<dyn OutboxRepo>,
    service: Arc<RealChatService>,
}

fn service_on(store: Arc<MemoryStore>, room_repo: Arc<dyn RoomRepo>) -> Arc<RealChatService> {
    Arc::new(RealChatService::new(
        room_repo,
        Arc::new(MemoryMessageRepo::new(store.clone())),
        Arc::new(MemoryParticipantRepo::new(store.clone())),
        Arc::new(MemoryListingRepo::new(store.clone())),
        Arc::new(MemoryMemberRepo::new(store.clone())),
        Arc::new(MemoryOutboxRepo::new(store.clone())),
        Arc::new(MemoryTxManager),
        PublicUrlBuilder::new("https://cdn.test/", "/user.png", "/no-image.png"),
    ))
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());

    store
        .upsert_member(MemberProfile {
            member_id: ALICE,
            nickname: "alice".to_string(),
            email: Some("alice@example.com".to_string()),
            avatar_file: Some("alice.png".to_string()),
        })
        .expect("seed alice");
    store
        .upsert_member(MemberProfile {
            member_id: BOB,
            nickname: "bob".to_string(),
            email: Some("bob@example.com".to_string()),
            avatar_file: None,
        })
        .expect("seed bob");
    store
        .upsert_member(MemberProfile {
            member_id: CAROL,
            nickname: "carol".to_string(),
            email: None,
            avatar_file: None,
        })
        .expect("seed carol");
    store
        .upsert_listing(ListingCard {
            listing_id: BIKE,
            seller_id: BOB,
            title: "city bike".to_string(),
            price: Some(120_000),
            thumb_file: Some("bike.jpg".to_string()),
        })
        .expect("seed listing");

    let service = service_on(store.clone(), Arc::new(MemoryRoomRepo::new(store.clone())));

    Harness {
        outbox: Arc::new(MemoryOutboxRepo::new(store.clone())),
        tx_manager: Arc::new(MemoryTxManager),
        store,
        service,
    }
}

async fn drain_outbox(h: &Harness) -> Vec<OutboxEvent> {
    let mut tx = h.tx_manager.begin().await.expect("begin");
    let batch = h
        .outbox
        .claim_ready_batch_in_tx(&mut *tx, chrono::Utc::now(), 64)
        .await
        .expect("claim");
    tx.commit().await.expect("commit");
    batch
}

async fn read_position(h: &Harness, room_id: RoomId, member_id: MemberId) -> Option<MessageId> {
    let state = h.store.lock().expect("lock");
    state
        .participants
        .get(&ParticipantKey::new(room_id, member_id))
        .copied()
        .flatten()
}

// region room directory

#[tokio::test]
async fn open_creates_room_with_both_participants() {
    let h = harness();

    let opened = h.service.open_or_get_room(BIKE, ALICE).await.expect("open");
    assert_eq!(opened.listing_id, Some(BIKE));
    assert_eq!(opened.buyer_id, ALICE);
    assert_eq!(opened.seller_id, BOB);

    h.service
        .verify_participant(opened.room_id, ALICE)
        .await
        .expect("buyer is a participant");
    h.service
        .verify_participant(opened.room_id, BOB)
        .await
        .expect("seller is a participant");
}

#[tokio::test]
async fn open_is_idempotent() {
    let h = harness();

    let first = h.service.open_or_get_room(BIKE, ALICE).await.expect("open");
    let second = h.service.open_or_get_room(BIKE, ALICE).await.expect("reopen");

    assert_eq!(first.room_id, second.room_id);
    let state = h.store.lock().expect("lock");
    assert_eq!(state.rooms.len(), 1);
}

#[tokio::test]
async fn open_unknown_listing_fails() {
    let h = harness();

    let err = h
        .service
        .open_or_get_room(ListingId(999), ALICE)
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::ListingNotFound));
}

#[tokio::test]
async fn open_own_listing_fails() {
    let h = harness();

    let err = h.service.open_or_get_room(BIKE, BOB).await.unwrap_err();
    assert!(matches!(err, ChatError::SelfChat));

    let state = h.store.lock().expect("lock");
    assert!(state.rooms.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_opens_converge_on_one_room() {
    let h = harness();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = h.service.clone();
        handles.push(tokio::spawn(async move {
            service.open_or_get_room(BIKE, ALICE).await
        }));
    }

    let mut room_ids = Vec::new();
    for handle in handles {
        let opened = handle.await.expect("join").expect("open");
        room_ids.push(opened.room_id);
    }

    let first = room_ids[0];
    assert!(room_ids.iter().all(|id| *id == first));
    let state = h.store.lock().expect("lock");
    assert_eq!(state.rooms.len(), 1);
}

/// Room repo that reports "no room" on the first lookup even when one
/// exists, forcing the service down the create → duplicate-key → re-fetch
/// path that a real creation race takes.
struct RacingRoomRepo {
    inner: MemoryRoomRepo,
    lies_left: AtomicUsize,
}

#[async_trait::async_trait]
impl RoomRepo for RacingRoomRepo {
    async fn find_for_pair_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        listing_id: Option<ListingId>,
        pair: &MemberPair,
    ) -> Result<Option<RoomRecord>, ChatError> {
        if self
            .lies_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(None);
        }
        self.inner.find_for_pair_in_tx(tx, listing_id, pair).await
    }

    async fn create_with_participants_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        listing_id: Option<ListingId>,
        pair: &MemberPair,
    ) -> Result<RoomRecord, RoomCreateError> {
        self.inner
            .create_with_participants_in_tx(tx, listing_id, pair)
            .await
    }

    async fn get_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        room_id: RoomId,
    ) -> Result<Option<RoomRecord>, ChatError> {
        self.inner.get_in_tx(tx, room_id).await
    }

    async fn participants_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        room_id: RoomId,
    ) -> Result<Vec<MemberId>, ChatError> {
        self.inner.participants_in_tx(tx, room_id).await
    }

    async fn delete_cascade_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        room_id: RoomId,
    ) -> Result<(), ChatError> {
        self.inner.delete_cascade_in_tx(tx, room_id).await
    }

    async fn list_summaries_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        member_id: MemberId,
    ) -> Result<Vec<RoomListRow>, ChatError> {
        self.inner.list_summaries_in_tx(tx, member_id).await
    }
}

#[tokio::test]
async fn losing_creator_receives_winner_room() {
    let h = harness();

    let winner = h.service.open_or_get_room(BIKE, ALICE).await.expect("open");

    // A second instance whose first lookup misses, as if both callers
    // passed the existence check before either had committed.
    let racing = service_on(
        h.store.clone(),
        Arc::new(RacingRoomRepo {
            inner: MemoryRoomRepo::new(h.store.clone()),
            lies_left: AtomicUsize::new(1),
        }),
    );

    let loser = racing.open_or_get_room(BIKE, ALICE).await.expect("open");
    assert_eq!(loser.room_id, winner.room_id);

    let state = h.store.lock().expect("lock");
    assert_eq!(state.rooms.len(), 1);
}

// endregion

// region message store

#[tokio::test]
async fn message_ids_and_timestamps_are_monotonic() {
    let h = harness();
    let room = h.service.open_or_get_room(BIKE, ALICE).await.expect("open");

    for text in ["one", "two", "three"] {
        h.service
            .send_message(room.room_id, ALICE, text)
            .await
            .expect("send");
    }

    let messages = h
        .service
        .list_messages(room.room_id, None, None, PageSize::DEFAULT)
        .await
        .expect("list");
    assert_eq!(messages.len(), 3);

    for pair in messages.windows(2) {
        assert!(pair[0].message_id < pair[1].message_id);
        assert!(pair[0].inserted_at <= pair[1].inserted_at);
    }
}

#[tokio::test]
async fn send_trims_ratchets_sender_and_queues_broadcast() {
    let h = harness();
    let room = h.service.open_or_get_room(BIKE, ALICE).await.expect("open");

    let record = h
        .service
        .send_message(room.room_id, ALICE, "  hi bob  ")
        .await
        .expect("send");
    assert_eq!(record.content, "hi bob");

    // Sending implies having read up to the new message.
    assert_eq!(
        read_position(&h, room.room_id, ALICE).await,
        Some(record.message_id)
    );
    assert_eq!(read_position(&h, room.room_id, BOB).await, None);

    let batch = drain_outbox(&h).await;
    assert_eq!(batch.len(), 1);
    let envelope: S2CEnvelope =
        serde_json::from_value(batch[0].payload_json.clone()).expect("decode envelope");
    assert_eq!(envelope.room_id, room.room_id);
    assert_eq!(envelope.receivers, vec![ALICE, BOB]);
    match envelope.body {
        S2CEvent::ChatMessageNew(new) => {
            assert_eq!(new.message_id, record.message_id);
            assert_eq!(new.sender_id, ALICE);
            assert_eq!(new.sender_nickname, "alice");
            assert_eq!(new.sender_avatar_url, "https://cdn.test/member/1/alice.png");
            assert_eq!(new.content, "hi bob");
        }
        other => panic!("expected ChatMessageNew, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_content_is_rejected_without_side_effects() {
    let h = harness();
    let room = h.service.open_or_get_room(BIKE, ALICE).await.expect("open");

    for content in ["", "   ", "\n\t"] {
        let err = h
            .service
            .send_message(room.room_id, ALICE, content)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::EmptyMessage));
    }

    let state = h.store.lock().expect("lock");
    assert!(state.messages.is_empty());
    assert!(state.outbox.is_empty());
}

#[tokio::test]
async fn send_to_unknown_room_fails() {
    let h = harness();

    let err = h
        .service
        .send_message(RoomId(404), ALICE, "hello?")
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::RoomNotFound));
}

#[tokio::test]
async fn send_by_non_participant_fails() {
    let h = harness();
    let room = h.service.open_or_get_room(BIKE, ALICE).await.expect("open");

    let err = h
        .service
        .send_message(room.room_id, CAROL, "let me in")
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::NotParticipant));
}

#[tokio::test]
async fn history_cursors() {
    let h = harness();
    let room = h.service.open_or_get_room(BIKE, ALICE).await.expect("open");

    let mut ids = Vec::new();
    for i in 1..=5 {
        let sender = if i % 2 == 0 { BOB } else { ALICE };
        let record = h
            .service
            .send_message(room.room_id, sender, &format!("m{i}"))
            .await
            .expect("send");
        ids.push(record.message_id);
    }

    let full = h
        .service
        .list_messages(room.room_id, None, None, PageSize(100))
        .await
        .expect("full");
    assert_eq!(
        full.iter().map(|m| m.message_id).collect::<Vec<_>>(),
        ids
    );

    // after: everything strictly newer, ascending, unbounded.
    let after = h
        .service
        .list_messages(room.room_id, None, Some(ids[1]), PageSize(1))
        .await
        .expect("after");
    assert_eq!(
        after.iter().map(|m| m.message_id).collect::<Vec<_>>(),
        full.iter()
            .filter(|m| m.message_id > ids[1])
            .map(|m| m.message_id)
            .collect::<Vec<_>>()
    );

    // before: bounded window ending just below the cursor, oldest-first.
    let before = h
        .service
        .list_messages(room.room_id, Some(ids[3]), None, PageSize(2))
        .await
        .expect("before");
    assert_eq!(
        before.iter().map(|m| m.message_id).collect::<Vec<_>>(),
        vec![ids[1], ids[2]]
    );

    // no cursor: latest window, oldest-first.
    let latest = h
        .service
        .list_messages(room.room_id, None, None, PageSize(2))
        .await
        .expect("latest");
    assert_eq!(
        latest.iter().map(|m| m.message_id).collect::<Vec<_>>(),
        vec![ids[3], ids[4]]
    );

    // both cursors: after wins.
    let both = h
        .service
        .list_messages(room.room_id, Some(ids[1]), Some(ids[3]), PageSize(1))
        .await
        .expect("both");
    assert_eq!(
        both.iter().map(|m| m.message_id).collect::<Vec<_>>(),
        vec![ids[4]]
    );
}

// endregion

// region read tracker

#[tokio::test]
async fn mark_read_is_monotonic() {
    let h = harness();
    let room = h.service.open_or_get_room(BIKE, ALICE).await.expect("open");

    for i in 1..=5 {
        h.service
            .send_message(room.room_id, ALICE, &format!("m{i}"))
            .await
            .expect("send");
    }

    h.service
        .mark_read(room.room_id, BOB, Some(MessageId(5)))
        .await
        .expect("mark 5");
    h.service
        .mark_read(room.room_id, BOB, Some(MessageId(3)))
        .await
        .expect("mark 3");

    assert_eq!(read_position(&h, room.room_id, BOB).await, Some(MessageId(5)));
}

#[tokio::test]
async fn mark_read_without_cursor_is_noop() {
    let h = harness();
    let room = h.service.open_or_get_room(BIKE, ALICE).await.expect("open");

    h.service
        .mark_read(room.room_id, BOB, None)
        .await
        .expect("noop");
    assert_eq!(read_position(&h, room.room_id, BOB).await, None);
}

#[tokio::test]
async fn unread_count_tracks_counterpart_messages() {
    let h = harness();
    let room = h.service.open_or_get_room(BIKE, ALICE).await.expect("open");

    let mut last = None;
    for i in 1..=3 {
        let record = h
            .service
            .send_message(room.room_id, ALICE, &format!("ping {i}"))
            .await
            .expect("send");
        last = Some(record.message_id);
    }

    let bob_rooms = h.service.list_my_rooms(BOB).await.expect("bob rooms");
    assert_eq!(bob_rooms.len(), 1);
    assert_eq!(bob_rooms[0].unread_count, 3);

    // The sender's own messages never count against them.
    let alice_rooms = h.service.list_my_rooms(ALICE).await.expect("alice rooms");
    assert_eq!(alice_rooms[0].unread_count, 0);

    h.service
        .mark_read(room.room_id, BOB, last)
        .await
        .expect("mark read");
    let bob_rooms = h.service.list_my_rooms(BOB).await.expect("bob rooms");
    assert_eq!(bob_rooms[0].unread_count, 0);
}

// endregion

// region room list aggregator

#[tokio::test]
async fn my_rooms_orders_by_activity_then_creation() {
    let h = harness();
    h.store
        .upsert_member(MemberProfile {
            member_id: DAVE,
            nickname: "dave".to_string(),
            email: None,
            avatar_file: None,
        })
        .expect("seed dave");
    h.store
        .upsert_listing(ListingCard {
            listing_id: ListingId(43),
            seller_id: CAROL,
            title: "keyboard".to_string(),
            price: Some(30_000),
            thumb_file: None,
        })
        .expect("seed listing 43");
    h.store
        .upsert_listing(ListingCard {
            listing_id: ListingId(44),
            seller_id: DAVE,
            title: "monitor".to_string(),
            price: None,
            thumb_file: None,
        })
        .expect("seed listing 44");

    let with_bob = h.service.open_or_get_room(BIKE, ALICE).await.expect("open");
    let with_carol = h
        .service
        .open_or_get_room(ListingId(43), ALICE)
        .await
        .expect("open");
    let with_dave = h
        .service
        .open_or_get_room(ListingId(44), ALICE)
        .await
        .expect("open");

    // Activity in bob's room first, then carol's; dave's stays silent.
    h.service
        .send_message(with_bob.room_id, ALICE, "old")
        .await
        .expect("send");
    h.service
        .send_message(with_carol.room_id, CAROL, "newer")
        .await
        .expect("send");

    let rooms = h.service.list_my_rooms(ALICE).await.expect("rooms");
    let ordered: Vec<RoomId> = rooms.iter().map(|r| r.room_id).collect();
    assert_eq!(
        ordered,
        vec![with_carol.room_id, with_bob.room_id, with_dave.room_id]
    );

    let carol_room = &rooms[0];
    assert_eq!(carol_room.listing_title.as_deref(), Some("keyboard"));
    assert_eq!(carol_room.other_member_id, CAROL);
    assert_eq!(carol_room.other_nickname, "carol");
    let snippet = carol_room.last_message.as_ref().expect("snippet");
    assert_eq!(snippet.content, "newer");
    assert_eq!(snippet.sender_id, CAROL);
    assert_eq!(snippet.sender_avatar_url, "/user.png");

    assert!(rooms[2].last_message.is_none());
}

#[tokio::test]
async fn withdrawn_counterpart_degrades_to_placeholder() {
    let h = harness();
    let room = h.service.open_or_get_room(BIKE, ALICE).await.expect("open");
    h.service
        .send_message(room.room_id, BOB, "still here?")
        .await
        .expect("send");

    h.store.remove_member(BOB).expect("withdraw bob");

    let rooms = h.service.list_my_rooms(ALICE).await.expect("rooms");
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].other_nickname, WITHDRAWN_MEMBER);
    let snippet = rooms[0].last_message.as_ref().expect("snippet");
    assert_eq!(snippet.sender_nickname, WITHDRAWN_MEMBER);
}

// endregion

// region room detail and delete

#[tokio::test]
async fn room_detail_resolves_listing_and_parties() {
    let h = harness();
    let room = h.service.open_or_get_room(BIKE, ALICE).await.expect("open");

    let detail = h.service.room_detail(room.room_id).await.expect("detail");
    assert_eq!(detail.listing_id, BIKE);
    assert_eq!(detail.listing_title, "city bike");
    assert_eq!(detail.listing_price, Some(120_000));
    assert_eq!(detail.listing_thumb_url, "https://cdn.test/listing/42/bike.jpg");
    assert_eq!(detail.seller.member_id, BOB);
    assert_eq!(detail.seller.nickname, "bob");
    let buyer = detail.buyer.expect("buyer");
    assert_eq!(buyer.member_id, ALICE);
    assert_eq!(buyer.avatar_url, "https://cdn.test/member/1/alice.png");
}

#[tokio::test]
async fn room_detail_unknown_room_fails() {
    let h = harness();
    let err = h.service.room_detail(RoomId(404)).await.unwrap_err();
    assert!(matches!(err, ChatError::RoomNotFound));
}

#[tokio::test]
async fn delete_requires_participation() {
    let h = harness();
    let room = h.service.open_or_get_room(BIKE, ALICE).await.expect("open");

    let err = h
        .service
        .delete_room(room.room_id, CAROL)
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::NotParticipant));
}

#[tokio::test]
async fn delete_cascades_and_frees_the_pair_key() {
    let h = harness();
    let room = h.service.open_or_get_room(BIKE, ALICE).await.expect("open");
    h.service
        .send_message(room.room_id, ALICE, "bye")
        .await
        .expect("send");

    h.service
        .delete_room(room.room_id, ALICE)
        .await
        .expect("delete");

    {
        let state = h.store.lock().expect("lock");
        assert!(state.rooms.is_empty());
        assert!(state.participants.is_empty());
        assert!(state.messages.is_empty());
    }

    // A later open creates a fresh room rather than resurrecting the old id.
    let reopened = h.service.open_or_get_room(BIKE, ALICE).await.expect("open");
    assert_ne!(reopened.room_id, room.room_id);
}

// endregion

// region end-to-end scenario

#[tokio::test]
async fn first_contact_scenario() {
    let h = harness();

    // A opens a room on B's listing.
    let opened = h.service.open_or_get_room(BIKE, ALICE).await.expect("open");
    assert_eq!(opened.buyer_id, ALICE);
    assert_eq!(opened.seller_id, BOB);

    // A says hi; their own read position follows the message.
    let record = h
        .service
        .send_message(opened.room_id, ALICE, "hi")
        .await
        .expect("send");
    assert_eq!(
        read_position(&h, opened.room_id, ALICE).await,
        Some(record.message_id)
    );

    // B pulls history.
    let messages = h
        .service
        .list_messages(opened.room_id, None, None, PageSize::DEFAULT)
        .await
        .expect("list");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "hi");
    assert_eq!(messages[0].sender_id, ALICE);

    // B acks it; unread drops to zero.
    h.service
        .mark_read(opened.room_id, BOB, Some(record.message_id))
        .await
        .expect("mark read");
    let bob_rooms = h.service.list_my_rooms(BOB).await.expect("rooms");
    assert_eq!(bob_rooms[0].unread_count, 0);

    // Reopening converges on the same room.
    let again = h.service.open_or_get_room(BIKE, ALICE).await.expect("reopen");
    assert_eq!(again.room_id, opened.room_id);
}

// endregion
