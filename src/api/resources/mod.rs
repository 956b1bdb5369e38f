//! Typed Lighthouse resources and their services.
//!
//! Each submodule holds the record type mirroring the server's JSON, the
//! narrow view sent on create/update, and a thin wrapper around
//! [`ResourceService`](super::service::ResourceService) adding the
//! resource's extra operations.

mod bins;
mod changesets;
mod messages;
mod milestones;
mod plans;
mod projects;
mod tickets;
mod tokens;
mod users;

pub use bins::{Bin, BinView, Bins};
pub use changesets::{Changeset, ChangesetView, Changesets};
pub use messages::{CommentView, Message, MessageView, Messages};
pub use milestones::{Milestone, MilestoneView, Milestones};
pub use plans::{Plan, Plans};
pub use projects::{Membership, Project, ProjectView, Projects, StatesList, Todos};
pub use tickets::{
    parse_ticket_number, AlphabeticalTag, Attachment, AttachmentEntry, BulkEditOptions,
    DiffableAttributes, Tag, TagEntry, Ticket, TicketListOptions, TicketUpdateView, TicketVersion,
    TicketView, Tickets, DEFAULT_LIMIT, MAX_LIMIT,
};
pub use tokens::{Token, Tokens};
pub use users::{Profiles, User, UserView, Users};

use serde::{Deserialize, Deserializer};

/// Deserialize `null` as the type's default.
///
/// The server sends `null` for unset strings and foreign keys.
pub(crate) fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// `skip_serializing_if` helper for zero IDs.
pub(crate) fn is_zero(value: &u64) -> bool {
    *value == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, Default)]
    struct Sample {
        #[serde(default, deserialize_with = "null_default")]
        name: String,
        #[serde(default, deserialize_with = "null_default")]
        milestone_id: u64,
    }

    #[test]
    fn test_null_becomes_default() {
        let sample: Sample = serde_json::from_str(r#"{"name":null,"milestone_id":null}"#).unwrap();
        assert_eq!(sample.name, "");
        assert_eq!(sample.milestone_id, 0);

        let sample: Sample = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(sample.milestone_id, 0);

        let sample: Sample = serde_json::from_str(r#"{"name":"web","milestone_id":4}"#).unwrap();
        assert_eq!(sample.name, "web");
        assert_eq!(sample.milestone_id, 4);
    }
}
