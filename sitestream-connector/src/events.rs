use crate::error::DecodeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one account multiplexed onto a shared site-stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(pub u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for SubscriberId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub screen_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: u64,
    pub text: String,
    pub user: User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDeletionNotice {
    pub status_id: u64,
    pub user_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserList {
    pub id: u64,
    pub name: String,
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessage {
    pub id: u64,
    pub text: String,
    pub sender: User,
    pub recipient: User,
}

/// One event read from a stream connection.
///
/// Each variant carries the payloads relevant to its kind. Handlers receive
/// the whole enum and match on the variants they care about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    Status(Status),
    StatusDeletion(StatusDeletionNotice),
    /// The ids of the subscriber's friends, sent once when the stream opens.
    FriendList {
        friend_ids: Vec<u64>,
    },
    Favorite {
        source: User,
        target: User,
        status: Status,
    },
    Unfavorite {
        source: User,
        target: User,
        status: Status,
    },
    Follow {
        source: User,
        target: User,
    },
    Unfollow {
        source: User,
        target: User,
    },
    UserListMemberAddition {
        member: User,
        owner: User,
        list: UserList,
    },
    UserListMemberDeletion {
        member: User,
        owner: User,
        list: UserList,
    },
    UserListSubscription {
        subscriber: User,
        owner: User,
        list: UserList,
    },
    UserListUnsubscription {
        subscriber: User,
        owner: User,
        list: UserList,
    },
    UserListCreation {
        owner: User,
        list: UserList,
    },
    UserListUpdate {
        owner: User,
        list: UserList,
    },
    UserListDeletion {
        owner: User,
        list: UserList,
    },
    UserProfileUpdate(User),
    Block {
        source: User,
        target: User,
    },
    Unblock {
        source: User,
        target: User,
    },
    DirectMessage(DirectMessage),
    DirectMessageDeletion {
        direct_message_id: u64,
        user_id: u64,
    },
}

/// Fieldless mirror of [`StreamEvent`], used for logging and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Status,
    StatusDeletion,
    FriendList,
    Favorite,
    Unfavorite,
    Follow,
    Unfollow,
    UserListMemberAddition,
    UserListMemberDeletion,
    UserListSubscription,
    UserListUnsubscription,
    UserListCreation,
    UserListUpdate,
    UserListDeletion,
    UserProfileUpdate,
    Block,
    Unblock,
    DirectMessage,
    DirectMessageDeletion,
}

impl StreamEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            StreamEvent::Status(_) => EventKind::Status,
            StreamEvent::StatusDeletion(_) => EventKind::StatusDeletion,
            StreamEvent::FriendList { .. } => EventKind::FriendList,
            StreamEvent::Favorite { .. } => EventKind::Favorite,
            StreamEvent::Unfavorite { .. } => EventKind::Unfavorite,
            StreamEvent::Follow { .. } => EventKind::Follow,
            StreamEvent::Unfollow { .. } => EventKind::Unfollow,
            StreamEvent::UserListMemberAddition { .. } => EventKind::UserListMemberAddition,
            StreamEvent::UserListMemberDeletion { .. } => EventKind::UserListMemberDeletion,
            StreamEvent::UserListSubscription { .. } => EventKind::UserListSubscription,
            StreamEvent::UserListUnsubscription { .. } => EventKind::UserListUnsubscription,
            StreamEvent::UserListCreation { .. } => EventKind::UserListCreation,
            StreamEvent::UserListUpdate { .. } => EventKind::UserListUpdate,
            StreamEvent::UserListDeletion { .. } => EventKind::UserListDeletion,
            StreamEvent::UserProfileUpdate(_) => EventKind::UserProfileUpdate,
            StreamEvent::Block { .. } => EventKind::Block,
            StreamEvent::Unblock { .. } => EventKind::Unblock,
            StreamEvent::DirectMessage(_) => EventKind::DirectMessage,
            StreamEvent::DirectMessageDeletion { .. } => EventKind::DirectMessageDeletion,
        }
    }
}

/// The result of decoding one stream line.
///
/// `subscriber` is the `for_user` tag of a multiplexed (site) stream, or
/// `None` on a single-user stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub subscriber: Option<SubscriberId>,
    pub event: StreamEvent,
}

impl DecodedEvent {
    pub fn for_subscriber(subscriber: SubscriberId, event: StreamEvent) -> Self {
        Self {
            subscriber: Some(subscriber),
            event,
        }
    }

    pub fn global(event: StreamEvent) -> Self {
        Self {
            subscriber: None,
            event,
        }
    }
}

/// Turns one line of streamed text into a tagged event.
///
/// Implementations must be cheap to call from the router task and must not
/// block. Unknown event kinds are reported as a [`DecodeError`].
pub trait EventDecoder: Send + Sync {
    fn decode(&self, line: &str) -> Result<DecodedEvent, DecodeError>;
}

impl<F> EventDecoder for F
where
    F: Fn(&str) -> Result<DecodedEvent, DecodeError> + Send + Sync,
{
    fn decode(&self, line: &str) -> Result<DecodedEvent, DecodeError> {
        self(line)
    }
}
