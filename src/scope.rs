//! Ownership scoping. Every store call carries a [`Scope`]; records outside it
//! behave exactly like records that do not exist.

use crate::models::{Folder, Note, User, UserId};

pub trait Owned {
    fn owner(&self) -> UserId;
}

impl Owned for Folder {
    fn owner(&self) -> UserId {
        self.owner
    }
}

impl Owned for Note {
    fn owner(&self) -> UserId {
        self.owner
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope {
    owner: UserId,
}

impl Scope {
    pub const fn of(user: &User) -> Self {
        Self { owner: user.id }
    }

    pub const fn owner(self) -> UserId {
        self.owner
    }

    pub fn admits<T: Owned>(self, record: &T) -> bool {
        record.owner() == self.owner
    }
}
