use serde::{Deserialize, Serialize};

use crate::error::FileTreeError;

/// The caller on whose behalf an operation runs. Stamps `creator_id` / `updater_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    user_id: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Identity {
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub(crate) fn ensure_present(&self) -> Result<(), FileTreeError> {
        if self.user_id.trim().is_empty() {
            return Err(FileTreeError::InvalidArgument(
                "caller user id is required".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_blank_identity_is_rejected() {
        let err = Identity::new("  ").ensure_present().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(Identity::new("1001").ensure_present().is_ok());
    }
}
