//! Remix notifications sent to the author of a remixed project.

use serde::{Deserialize, Serialize};

use crate::{ProjectId, UserId};

/// "Your project was remixed" notice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemixNotification {
    /// Author of the remixed (parent) project; the recipient.
    pub parent_author: UserId,
    /// Author of the new remix.
    pub child_author: UserId,
    pub parent_project: ProjectId,
    pub child_project: ProjectId,
}
