use crate::core::strong_types::UserId;

/// The signed-in identity every write is performed as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerContext {
    pub user_id: UserId,
}

impl ViewerContext {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        ViewerContext {
            user_id: user_id.into(),
        }
    }
}
