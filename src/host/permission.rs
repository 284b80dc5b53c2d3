use async_trait::async_trait;

use super::{PermissionPrompt, PermissionStatus};

/// Permission prompt with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct StaticPermission {
    status: PermissionStatus,
    required: bool,
}

impl StaticPermission {
    pub fn granted() -> Self {
        Self {
            status: PermissionStatus::Granted,
            required: true,
        }
    }

    pub fn denied() -> Self {
        Self {
            status: PermissionStatus::Denied,
            required: true,
        }
    }

    /// Host versions that show the indicator without asking.
    pub fn not_required() -> Self {
        Self {
            status: PermissionStatus::Granted,
            required: false,
        }
    }
}

#[async_trait]
impl PermissionPrompt for StaticPermission {
    fn required(&self) -> bool {
        self.required
    }

    async fn check(&self) -> PermissionStatus {
        self.status
    }

    async fn request(&self) -> PermissionStatus {
        self.status
    }
}
