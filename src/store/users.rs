use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::models::{NewUser, Page, User};

/// The in-memory substitute for a real database.
///
/// An ordered, append-only sequence of users. Constructed explicitly and
/// shared as `Arc<UserStore>` so tests and the demo each own their
/// lifecycle; there is no process-wide instance.
///
/// Invariant: IDs are unique for the lifetime of the store.
pub struct UserStore {
    users: Mutex<Vec<User>>,
    next_id: AtomicI64,
}

impl UserStore {
    /// Create an empty store. IDs start at 1.
    pub fn new() -> Self {
        Self {
            users: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Create a store seeded with the five canonical demo users (ids 1..=5).
    pub fn with_seed_users() -> Self {
        let seed = [
            ("John Doe", "john@example.com", "Developer"),
            ("Jane Smith", "jane@example.com", "Designer"),
            ("Bob Johnson", "bob@example.com", "Manager"),
            ("Alice Williams", "alice@example.com", "Developer"),
            ("Charlie Brown", "charlie@example.com", "Tester"),
        ];

        let users: Vec<User> = seed
            .iter()
            .enumerate()
            .map(|(i, (name, email, role))| User {
                id: i as i64 + 1,
                name: name.to_string(),
                email: email.to_string(),
                role: role.to_string(),
            })
            .collect();

        let next_id = users.len() as i64 + 1;
        Self {
            users: Mutex::new(users),
            next_id: AtomicI64::new(next_id),
        }
    }

    // Recover from poisoning rather than panic: the store holds plain data
    // and stays consistent even if a holder panicked mid-read.
    fn lock(&self) -> MutexGuard<'_, Vec<User>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Full copy of the current store contents, in insertion order.
    pub fn snapshot(&self) -> Vec<User> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains_id(&self, id: i64) -> bool {
        self.lock().iter().any(|u| u.id == id)
    }

    /// Append a new user, assigning the next monotonic id.
    pub fn insert(&self, new: NewUser) -> User {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let user = User {
            id,
            name: new.name,
            email: new.email,
            role: new.role,
        };
        debug!(id, name = %user.name, "user appended to store");
        self.lock().push(user.clone());
        user
    }

    /// The page of `size` users starting at offset `start`.
    ///
    /// Returns `None` when `start` points past the end of a non-empty store
    /// (a token the paginated fetcher never hands out). On an empty store,
    /// offset 0 yields an empty final page.
    pub fn page(&self, start: u32, size: usize) -> Option<Page> {
        let users = self.lock();
        let start = start as usize;
        if start > 0 && start >= users.len() {
            return None;
        }

        let end = (start + size).min(users.len());
        let slice = users.get(start..end).map(<[User]>::to_vec).unwrap_or_default();
        let next_page_token = if end < users.len() {
            Some(end as u32)
        } else {
            None
        };

        Some(Page {
            users: slice,
            next_page_token,
        })
    }
}

impl Default for UserStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
