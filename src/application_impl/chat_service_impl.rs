use crate::application_impl::PublicUrlBuilder;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use std::sync::Arc;

pub struct RealChatService {
    room_repo: Arc<dyn RoomRepo>,
    message_repo: Arc<dyn MessageRepo>,
    participant_repo: Arc<dyn ParticipantRepo>,
    listing_repo: Arc<dyn ListingRepo>,
    member_repo: Arc<dyn MemberRepo>,
    outbox_repo: Arc<dyn OutboxRepo>,
    tx_manager: Arc<dyn TxManager>,
    urls: PublicUrlBuilder,
}

impl RealChatService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        room_repo: Arc<dyn RoomRepo>,
        message_repo: Arc<dyn MessageRepo>,
        participant_repo: Arc<dyn ParticipantRepo>,
        listing_repo: Arc<dyn ListingRepo>,
        member_repo: Arc<dyn MemberRepo>,
        outbox_repo: Arc<dyn OutboxRepo>,
        tx_manager: Arc<dyn TxManager>,
        urls: PublicUrlBuilder,
    ) -> Self {
        Self {
            room_repo,
            message_repo,
            participant_repo,
            listing_repo,
            member_repo,
            outbox_repo,
            tx_manager,
            urls,
        }
    }

    /// Display fields for a member, degrading to the withdrawn-member
    /// placeholder instead of failing the surrounding operation.
    async fn display_of<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        member_id: MemberId,
    ) -> (String, String) {
        match self.member_repo.get_profile_in_tx(tx, member_id).await {
            Ok(Some(profile)) => {
                let avatar = self
                    .urls
                    .member_avatar_url(member_id, profile.avatar_file.as_deref());
                (profile.nickname, avatar)
            }
            Ok(None) => (
                WITHDRAWN_MEMBER.to_owned(),
                self.urls.member_avatar_url(member_id, None),
            ),
            Err(e) => {
                tracing::warn!("member display lookup failed for {member_id}: {e}");
                (
                    WITHDRAWN_MEMBER.to_owned(),
                    self.urls.member_avatar_url(member_id, None),
                )
            }
        }
    }

    fn snippet_of(&self, row: &RoomListRow) -> Option<MessageSnippet> {
        let (message_id, sender_id) = match (row.last_message_id, row.last_sender_id) {
            (Some(message_id), Some(sender_id)) => (message_id, sender_id),
            _ => return None,
        };

        let sender_nickname = row
            .last_sender_nickname
            .clone()
            .unwrap_or_else(|| WITHDRAWN_MEMBER.to_owned());
        let sender_avatar_url = self
            .urls
            .member_avatar_url(sender_id, row.last_sender_avatar_file.as_deref());

        Some(MessageSnippet {
            message_id,
            content: row.last_content.clone().unwrap_or_default(),
            inserted_at: row.last_inserted_at.unwrap_or(row.created_at),
            sender_id,
            sender_nickname,
            sender_avatar_url,
        })
    }
}

fn store_err(e: anyhow::Error) -> ChatError {
    ChatError::Store(e.to_string())
}

#[async_trait::async_trait]
impl ChatService for RealChatService {
    async fn open_or_get_room(
        &self,
        listing_id: ListingId,
        requester: MemberId,
    ) -> Result<OpenedRoom, ChatError> {
        let mut tx = self.tx_manager.begin().await.map_err(store_err)?;

        let listing = self
            .listing_repo
            .get_card_in_tx(&mut *tx, listing_id)
            .await?
            .ok_or(ChatError::ListingNotFound)?;

        let seller_id = listing.seller_id;
        if requester == seller_id {
            return Err(ChatError::SelfChat);
        }

        let pair = MemberPair::new(requester, seller_id);

        if let Some(room) = self
            .room_repo
            .find_for_pair_in_tx(&mut *tx, Some(listing_id), &pair)
            .await?
        {
            tx.commit().await.map_err(store_err)?;
            return Ok(OpenedRoom {
                room_id: room.room_id,
                listing_id: room.listing_id,
                buyer_id: requester,
                seller_id,
            });
        }

        match self
            .room_repo
            .create_with_participants_in_tx(&mut *tx, Some(listing_id), &pair)
            .await
        {
            Ok(room) => {
                tx.commit().await.map_err(store_err)?;
                Ok(OpenedRoom {
                    room_id: room.room_id,
                    listing_id: room.listing_id,
                    buyer_id: requester,
                    seller_id,
                })
            }
            Err(RoomCreateError::Duplicate) => {
                // Lost the creation race; the unique key guarantees the
                // winner's room is there to fetch.
                if let Err(e) = tx.rollback().await {
                    tracing::trace!("rollback after duplicate room create: {e}");
                }

                let mut tx = self.tx_manager.begin().await.map_err(store_err)?;
                let room = self
                    .room_repo
                    .find_for_pair_in_tx(&mut *tx, Some(listing_id), &pair)
                    .await?
                    .ok_or_else(|| {
                        ChatError::Store("room missing after duplicate-key create".to_owned())
                    })?;
                tx.commit().await.map_err(store_err)?;

                Ok(OpenedRoom {
                    room_id: room.room_id,
                    listing_id: room.listing_id,
                    buyer_id: requester,
                    seller_id,
                })
            }
            Err(RoomCreateError::Store(e)) => Err(ChatError::Store(e)),
        }
    }

    async fn send_message(
        &self,
        room_id: RoomId,
        sender: MemberId,
        content: &str,
    ) -> Result<MessageRecord, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let mut tx = self.tx_manager.begin().await.map_err(store_err)?;

        self.room_repo
            .get_in_tx(&mut *tx, room_id)
            .await?
            .ok_or(ChatError::RoomNotFound)?;

        let is_participant = self
            .participant_repo
            .exists_in_tx(&mut *tx, &ParticipantKey::new(room_id, sender))
            .await?;
        if !is_participant {
            return Err(ChatError::NotParticipant);
        }

        let record = self
            .message_repo
            .insert_in_tx(&mut *tx, room_id, sender, content)
            .await?;

        // Sending implies having read everything up to the new message.
        self.participant_repo
            .mark_read_in_tx(
                &mut *tx,
                &ParticipantKey::new(room_id, sender),
                record.message_id,
            )
            .await?;

        let receivers = self.room_repo.participants_in_tx(&mut *tx, room_id).await?;

        let (sender_nickname, sender_avatar_url) = self.display_of(&mut *tx, sender).await;
        let event = OutboxEvent::new(
            EventType::ChatMessageNew,
            Some(room_id.to_string()),
            receivers.clone(),
            &S2CEnvelope {
                room_id,
                receivers,
                body: S2CEvent::ChatMessageNew(ChatMessageNew {
                    room_id,
                    message_id: record.message_id,
                    sender_id: record.sender_id,
                    sender_nickname,
                    sender_avatar_url,
                    content: record.content.clone(),
                    inserted_at: record.inserted_at,
                }),
            },
        )
        .map_err(|e| ChatError::Store(format!("compose chat.message.new event: {e}")))?;
        self.outbox_repo
            .enqueue_in_tx(&mut *tx, &event)
            .await
            .map_err(|e| ChatError::Store(format!("enqueue chat.message.new event: {e}")))?;

        tx.commit().await.map_err(store_err)?;

        Ok(record)
    }

    async fn list_messages(
        &self,
        room_id: RoomId,
        before_id: Option<MessageId>,
        after_id: Option<MessageId>,
        limit: PageSize,
    ) -> Result<Vec<MessageRecord>, ChatError> {
        let mut tx = self.tx_manager.begin().await.map_err(store_err)?;

        // `after_id` wins when both cursors are supplied; see the API docs.
        let page = if let Some(after) = after_id {
            self.message_repo
                .list_after_in_tx(&mut *tx, room_id, after)
                .await?
        } else {
            self.message_repo
                .list_before_in_tx(&mut *tx, room_id, before_id, limit)
                .await?
        };

        tx.commit().await.map_err(store_err)?;

        Ok(page)
    }

    async fn mark_read(
        &self,
        room_id: RoomId,
        member_id: MemberId,
        last_message_id: Option<MessageId>,
    ) -> Result<(), ChatError> {
        let Some(last_message_id) = last_message_id else {
            return Ok(());
        };

        let mut tx = self.tx_manager.begin().await.map_err(store_err)?;
        self.participant_repo
            .mark_read_in_tx(
                &mut *tx,
                &ParticipantKey::new(room_id, member_id),
                last_message_id,
            )
            .await?;
        tx.commit().await.map_err(store_err)?;

        Ok(())
    }

    async fn list_my_rooms(&self, member_id: MemberId) -> Result<Vec<RoomSummary>, ChatError> {
        let mut tx = self.tx_manager.begin().await.map_err(store_err)?;
        let rows = self
            .room_repo
            .list_summaries_in_tx(&mut *tx, member_id)
            .await?;
        tx.commit().await.map_err(store_err)?;

        let summaries = rows
            .iter()
            .map(|row| RoomSummary {
                room_id: row.room_id,
                listing_id: row.listing_id,
                listing_title: row.listing_title.clone(),
                other_member_id: row.other_member_id,
                other_nickname: row
                    .other_nickname
                    .clone()
                    .unwrap_or_else(|| WITHDRAWN_MEMBER.to_owned()),
                other_email: row.other_email.clone(),
                last_message: self.snippet_of(row),
                unread_count: row.unread_count,
            })
            .collect();

        Ok(summaries)
    }

    async fn room_detail(&self, room_id: RoomId) -> Result<RoomDetail, ChatError> {
        let mut tx = self.tx_manager.begin().await.map_err(store_err)?;

        let room = self
            .room_repo
            .get_in_tx(&mut *tx, room_id)
            .await?
            .ok_or(ChatError::RoomNotFound)?;
        let listing_id = room.listing_id.ok_or(ChatError::ListingNotFound)?;
        let listing = self
            .listing_repo
            .get_card_in_tx(&mut *tx, listing_id)
            .await?
            .ok_or(ChatError::ListingNotFound)?;

        let participants = self.room_repo.participants_in_tx(&mut *tx, room_id).await?;
        let buyer_id = participants
            .iter()
            .copied()
            .find(|m| *m != listing.seller_id);

        let (seller_nickname, seller_avatar_url) =
            self.display_of(&mut *tx, listing.seller_id).await;
        let seller = PartyDisplay {
            member_id: listing.seller_id,
            nickname: seller_nickname,
            avatar_url: seller_avatar_url,
        };

        let buyer = match buyer_id {
            Some(buyer_id) => {
                let (nickname, avatar_url) = self.display_of(&mut *tx, buyer_id).await;
                Some(PartyDisplay {
                    member_id: buyer_id,
                    nickname,
                    avatar_url,
                })
            }
            None => None,
        };

        tx.commit().await.map_err(store_err)?;

        Ok(RoomDetail {
            room_id: room.room_id,
            listing_id,
            listing_title: listing.title.clone(),
            listing_price: listing.price,
            listing_thumb_url: self
                .urls
                .listing_thumb_url(listing_id, listing.thumb_file.as_deref()),
            seller,
            buyer,
        })
    }

    async fn delete_room(&self, room_id: RoomId, requester: MemberId) -> Result<(), ChatError> {
        let mut tx = self.tx_manager.begin().await.map_err(store_err)?;

        let is_participant = self
            .participant_repo
            .exists_in_tx(&mut *tx, &ParticipantKey::new(room_id, requester))
            .await?;
        if !is_participant {
            return Err(ChatError::NotParticipant);
        }

        self.room_repo
            .get_in_tx(&mut *tx, room_id)
            .await?
            .ok_or(ChatError::RoomNotFound)?;

        self.room_repo.delete_cascade_in_tx(&mut *tx, room_id).await?;

        tx.commit().await.map_err(store_err)?;

        Ok(())
    }

    async fn verify_participant(
        &self,
        room_id: RoomId,
        member_id: MemberId,
    ) -> Result<(), ChatError> {
        let mut tx = self.tx_manager.begin().await.map_err(store_err)?;
        let ok = self
            .participant_repo
            .exists_in_tx(&mut *tx, &ParticipantKey::new(room_id, member_id))
            .await?;
        tx.commit().await.map_err(store_err)?;

        if ok { Ok(()) } else { Err(ChatError::NotParticipant) }
    }
}
