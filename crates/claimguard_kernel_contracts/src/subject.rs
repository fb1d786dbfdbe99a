#![forbid(unsafe_code)]

use std::fmt;

use crate::claim::PlayerId;

/// Who is issuing a request. The console is not bound by claim ACLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    Player(PlayerId),
    Console,
}

impl Subject {
    pub fn player_id(&self) -> Option<&PlayerId> {
        match self {
            Subject::Player(id) => Some(id),
            Subject::Console => None,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Player(id) => write!(f, "player:{id}"),
            Subject::Console => f.write_str("console"),
        }
    }
}
