use cropshare_core::UserId;

/// Authenticated user for a request.
///
/// Identity is established upstream (gateway/identity layer); this carries
/// the result into handlers. Immutable and required for all order routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UserContext {
    user_id: UserId,
}

impl UserContext {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}
